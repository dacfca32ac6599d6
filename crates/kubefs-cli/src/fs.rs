//! The filesystem adapter (component F): implements `fuser::Filesystem`
//! against the resolved node tree. `fuser` is inode-based; the tree is
//! path-based, so this struct is the reconciling layer, assigning stable
//! inode numbers to resolved paths and reusing them across calls.
//!
//! FUSE callbacks are synchronous; node/resolver calls are `async fn`. One
//! `tokio::runtime::Handle::block_on` per upcall bridges the two, the
//! inverse of the `#[tokio::main]`-wrapped synchronous CLI bodies this
//! workspace's Kubernetes integration crate is normally driven from.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use kubefs_core::Stat;
use kubefs_kube::{resolve, Node, NodeContext};

use crate::errno::{errno_for, FsError};

const TTL: Duration = Duration::from_secs(1);

/// Per-path write state. Created lazily on the first read or write of an
/// open handle; dropped when the last handle on the path closes.
struct FileState {
    buffer: Option<Vec<u8>>,
    dirty: bool,
    truncate_override: Option<u64>,
    open_count: u64,
}

impl FileState {
    fn new() -> Self {
        Self { buffer: None, dirty: false, truncate_override: None, open_count: 0 }
    }
}

struct InodeTable {
    next_ino: u64,
    path_to_ino: HashMap<PathBuf, u64>,
    ino_to_path: HashMap<u64, PathBuf>,
}

impl InodeTable {
    fn new() -> Self {
        let mut table = Self {
            next_ino: 2,
            path_to_ino: HashMap::new(),
            ino_to_path: HashMap::new(),
        };
        table.path_to_ino.insert(PathBuf::from("/"), 1);
        table.ino_to_path.insert(1, PathBuf::from("/"));
        table
    }

    fn ino_for(&mut self, path: &Path) -> u64 {
        if let Some(&ino) = self.path_to_ino.get(path) {
            return ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.path_to_ino.insert(path.to_path_buf(), ino);
        self.ino_to_path.insert(ino, path.to_path_buf());
        ino
    }

    fn path_for(&self, ino: u64) -> Option<PathBuf> {
        self.ino_to_path.get(&ino).cloned()
    }
}

pub struct KubeFs {
    ctx: NodeContext,
    root: Node,
    runtime: tokio::runtime::Handle,
    inodes: Mutex<InodeTable>,
    files: Mutex<HashMap<PathBuf, FileState>>,
}

impl KubeFs {
    pub fn new(ctx: NodeContext, runtime: tokio::runtime::Handle) -> Self {
        Self {
            ctx,
            root: Node::Root,
            runtime,
            inodes: Mutex::new(InodeTable::new()),
            files: Mutex::new(HashMap::new()),
        }
    }

    fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    fn resolve_path(&self, path: &Path) -> Result<Node, FsError> {
        let path_str = path.to_string_lossy();
        self.block_on(resolve(&self.root, &path_str, &self.ctx)).map_err(FsError::from)
    }

    fn attr_for(&self, ino: u64, node: &Node, path: &Path) -> Result<FileAttr, FsError> {
        let stat = self.block_on(node.get_stat(&self.ctx))?;
        let override_size = self.files.lock().unwrap().get(path).and_then(|f| {
            f.truncate_override
                .or_else(|| f.buffer.as_ref().map(|b| b.len() as u64))
        });
        Ok(make_attr(ino, node, stat, override_size))
    }

    fn path_for_ino(&self, ino: u64) -> Option<PathBuf> {
        self.inodes.lock().unwrap().path_for(ino)
    }
}

fn make_attr(ino: u64, node: &Node, stat: Stat, size_override: Option<u64>) -> FileAttr {
    let is_dir = node.is_dir();
    let size = size_override.or(stat.st_size).unwrap_or(0);
    let to_time = |secs: Option<i64>| {
        secs.map(|s| UNIX_EPOCH + Duration::from_secs(s.max(0) as u64))
            .unwrap_or(UNIX_EPOCH)
    };
    FileAttr {
        ino,
        size,
        blocks: size.div_ceil(512),
        atime: to_time(stat.st_mtime),
        mtime: to_time(stat.st_mtime),
        ctime: to_time(stat.st_ctime),
        crtime: UNIX_EPOCH,
        kind: if is_dir { FileType::Directory } else { FileType::RegularFile },
        perm: if is_dir { 0o777 } else { 0o666 },
        nlink: if is_dir { 2 } else { 1 },
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

impl Filesystem for KubeFs {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_path) = self.path_for_ino(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let child_path = join(&parent_path, name);
        match self.resolve_path(&child_path) {
            Ok(node) => {
                let ino = self.inodes.lock().unwrap().ino_for(&child_path);
                match self.attr_for(ino, &node, &child_path) {
                    Ok(attr) => reply.entry(&TTL, &attr, 0),
                    Err(err) => reply.error(errno_for(&err)),
                }
            }
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.path_for_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.resolve_path(&path) {
            Ok(node) => match self.attr_for(ino, &node, &path) {
                Ok(attr) => reply.attr(&TTL, &attr),
                Err(err) => reply.error(errno_for(&err)),
            },
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn readdir(&mut self, _req: &Request, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let Some(path) = self.path_for_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let node = match self.resolve_path(&path) {
            Ok(node) => node,
            Err(err) => {
                reply.error(errno_for(&err));
                return;
            }
        };
        if !node.is_dir() {
            reply.error(libc::ENOTDIR);
            return;
        }
        let children = match self.block_on(node.get_children(&self.ctx)) {
            Ok(children) => children,
            Err(err) => {
                reply.error(errno_for(&FsError::from(err)));
                return;
            }
        };

        let mut entries: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (ino, FileType::Directory, "..".to_string()),
        ];
        for child in &children {
            let child_path = join(&path, OsStr::new(&child.name()));
            let child_ino = self.inodes.lock().unwrap().ino_for(&child_path);
            let kind = if child.is_dir() { FileType::Directory } else { FileType::RegularFile };
            entries.push((child_ino, kind, child.name()));
        }

        for (i, (entry_ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(entry_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_for_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let node = match self.resolve_path(&path) {
            Ok(node) => node,
            Err(err) => {
                reply.error(errno_for(&err));
                return;
            }
        };
        if node.is_dir() {
            reply.error(errno_for(&FsError::WriteToDirectory));
            return;
        }

        let mut files = self.files.lock().unwrap();
        let state = files.entry(path.clone()).or_insert_with(FileState::new);
        state.open_count += 1;
        if flags & libc::O_TRUNC != 0 {
            state.truncate_override = Some(0);
            state.buffer = Some(Vec::new());
            state.dirty = true;
        }
        reply.opened(0, 0);
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(path) = self.path_for_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let node = match self.resolve_path(&path) {
            Ok(node) => node,
            Err(err) => {
                reply.error(errno_for(&err));
                return;
            }
        };

        let data = {
            let mut files = self.files.lock().unwrap();
            let state = files.entry(path.clone()).or_insert_with(FileState::new);
            if state.buffer.is_none() {
                drop(files);
                let body = match self.block_on(node.read(&self.ctx)) {
                    Ok(body) => body,
                    Err(err) => {
                        reply.error(errno_for(&FsError::from(err)));
                        return;
                    }
                };
                files = self.files.lock().unwrap();
                let state = files.entry(path.clone()).or_insert_with(FileState::new);
                if state.buffer.is_none() {
                    state.buffer = Some(body);
                }
            }
            files.get(&path).and_then(|s| s.buffer.clone()).unwrap_or_default()
        };

        let offset = offset as usize;
        if offset >= data.len() {
            reply.data(&[]);
            return;
        }
        let end = (offset + size as usize).min(data.len());
        reply.data(&data[offset..end]);
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(path) = self.path_for_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if data.is_empty() {
            reply.written(0);
            return;
        }

        // Mirrors `read`'s ensure-buffer step: a write against a handle that
        // has never been read or truncated (no O_TRUNC) must splice against
        // the object's current body, not an empty buffer, or a short pwrite
        // at a nonzero offset would zero-fill everything before it.
        let needs_fetch = self.files.lock().unwrap().get(&path).map(|s| s.buffer.is_none()).unwrap_or(true);
        if needs_fetch {
            let node = match self.resolve_path(&path) {
                Ok(node) => node,
                Err(err) => {
                    reply.error(errno_for(&err));
                    return;
                }
            };
            let body = match self.block_on(node.read(&self.ctx)) {
                Ok(body) => body,
                Err(err) => {
                    reply.error(errno_for(&FsError::from(err)));
                    return;
                }
            };
            let mut files = self.files.lock().unwrap();
            let state = files.entry(path.clone()).or_insert_with(FileState::new);
            if state.buffer.is_none() {
                state.buffer = Some(body);
            }
        }

        let mut files = self.files.lock().unwrap();
        let state = files.entry(path).or_insert_with(FileState::new);
        let mut buffer = state.buffer.take().unwrap_or_default();
        let offset = offset as usize;
        if offset > buffer.len() {
            buffer.resize(offset, 0);
        }
        let end = offset + data.len();
        if end > buffer.len() {
            buffer.resize(end, 0);
        }
        buffer[offset..end].copy_from_slice(data);
        state.buffer = Some(buffer);
        state.dirty = true;
        state.truncate_override = None;
        reply.written(data.len() as u32);
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.path_for_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let node = match self.resolve_path(&path) {
            Ok(node) => node,
            Err(err) => {
                reply.error(errno_for(&err));
                return;
            }
        };

        if let Some(new_size) = size {
            // Mirrors `write`'s ensure-buffer step: truncating a handle that
            // has never been read or written must slice the object's actual
            // body, not zero-fill from nothing, unless the target size is 0
            // (an O_TRUNC-shaped truncate, which never needs the old body).
            let needs_fetch =
                new_size > 0 && self.files.lock().unwrap().get(&path).map(|s| s.buffer.is_none()).unwrap_or(true);
            if needs_fetch {
                let body = match self.block_on(node.read(&self.ctx)) {
                    Ok(body) => body,
                    Err(err) => {
                        reply.error(errno_for(&FsError::from(err)));
                        return;
                    }
                };
                let mut files = self.files.lock().unwrap();
                let state = files.entry(path.clone()).or_insert_with(FileState::new);
                if state.buffer.is_none() {
                    state.buffer = Some(body);
                }
            }

            let mut files = self.files.lock().unwrap();
            let state = files.entry(path.clone()).or_insert_with(FileState::new);
            state.truncate_override = Some(new_size);
            let mut buffer = state.buffer.take().unwrap_or_default();
            buffer.resize(new_size as usize, 0);
            state.buffer = Some(buffer);
            state.dirty = true;
        }

        match self.attr_for(ino, &node, &path) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn flush(&mut self, _req: &Request, ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let Some(path) = self.path_for_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let node = match self.resolve_path(&path) {
            Ok(node) => node,
            Err(err) => {
                reply.error(errno_for(&err));
                return;
            }
        };

        let pending = {
            let files = self.files.lock().unwrap();
            files.get(&path).and_then(|state| {
                if state.dirty { state.buffer.clone() } else { None }
            })
        };
        let Some(body) = pending else {
            reply.ok();
            return;
        };

        let Some((descriptor, namespace, name)) = node.writable_target() else {
            reply.error(errno_for(&FsError::ReadOnly));
            return;
        };
        let yaml = String::from_utf8_lossy(&body).into_owned();
        let result = self.block_on(self.ctx.api.put_object_yaml(descriptor, namespace, name, &yaml));
        match result {
            Ok(()) => {
                if let Some(state) = self.files.lock().unwrap().get_mut(&path) {
                    state.dirty = false;
                }
                reply.ok();
            }
            Err(err) => reply.error(errno_for(&FsError::from(err))),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let Some(path) = self.path_for_ino(ino) else {
            reply.ok();
            return;
        };
        let mut files = self.files.lock().unwrap();
        if let Some(state) = files.get_mut(&path) {
            state.open_count = state.open_count.saturating_sub(1);
            if state.open_count == 0 {
                files.remove(&path);
            }
        }
        reply.ok();
    }

    fn fsync(&mut self, req: &Request, ino: u64, fh: u64, _datasync: bool, reply: ReplyEmpty) {
        self.flush(req, ino, fh, 0, reply);
    }
}

fn join(parent: &Path, name: &OsStr) -> PathBuf {
    if parent == Path::new("/") {
        let mut p = PathBuf::from("/");
        p.push(name);
        p
    } else {
        parent.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_under_root_does_not_double_the_leading_slash() {
        assert_eq!(join(Path::new("/"), OsStr::new("default")), PathBuf::from("/default"));
    }

    #[test]
    fn join_under_a_non_root_directory_appends_normally() {
        assert_eq!(
            join(Path::new("/default"), OsStr::new("web.yaml")),
            PathBuf::from("/default/web.yaml")
        );
    }

    #[test]
    fn root_gets_inode_one() {
        let table = InodeTable::new();
        assert_eq!(table.path_for(1), Some(PathBuf::from("/")));
    }

    #[test]
    fn ino_for_is_stable_across_repeated_lookups() {
        let mut table = InodeTable::new();
        let path = PathBuf::from("/default/_/Pod");
        let first = table.ino_for(&path);
        let second = table.ino_for(&path);
        assert_eq!(first, second);
        assert_ne!(first, 1);
    }

    #[test]
    fn distinct_paths_get_distinct_inodes() {
        let mut table = InodeTable::new();
        let a = table.ino_for(&PathBuf::from("/default"));
        let b = table.ino_for(&PathBuf::from("/kube-public"));
        assert_ne!(a, b);
        assert_eq!(table.path_for(a), Some(PathBuf::from("/default")));
        assert_eq!(table.path_for(b), Some(PathBuf::from("/kube-public")));
    }

    #[test]
    fn make_attr_directory_uses_fixed_mode_and_nlink() {
        let attr = make_attr(2, &Node::Root, Stat::default(), None);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.perm, 0o777);
        assert_eq!(attr.nlink, 2);
        assert_eq!(attr.size, 0);
    }

    #[test]
    fn make_attr_file_uses_fixed_mode_and_nlink() {
        let node = Node::EmptyFile { name: ".metadata_never_index".to_string() };
        let attr = make_attr(5, &node, Stat::default(), None);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, 0o666);
        assert_eq!(attr.nlink, 1);
    }

    #[test]
    fn make_attr_prefers_size_override_over_stat() {
        let stat = Stat { st_size: Some(10), st_ctime: None, st_mtime: None };
        let node = Node::EmptyFile { name: "x".to_string() };
        let attr = make_attr(5, &node, stat, Some(42));
        assert_eq!(attr.size, 42);
    }

    #[test]
    fn make_attr_falls_back_to_stat_size_without_an_override() {
        let stat = Stat { st_size: Some(10), st_ctime: None, st_mtime: None };
        let node = Node::EmptyFile { name: "x".to_string() };
        let attr = make_attr(5, &node, stat, None);
        assert_eq!(attr.size, 10);
    }
}
