//! The error mapper (component G): the single point where node/resolver
//! failures become a POSIX errno handed to `reply.error(..)`. No upcall
//! body inlines this table; every callback goes through `errno_for`.

use kubefs_core::ResolveError;
use kubefs_kube::{KubeError, LookupError};
use thiserror::Error;

/// Every way a filesystem upcall can fail, beyond the node/resolver layer.
#[derive(Debug, Error)]
pub enum FsError {
    #[error(transparent)]
    Kube(#[from] KubeError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Write attempted on a node with no writable target (a directory, or
    /// the `.metadata_never_index` sentinel).
    #[error("node is read-only")]
    ReadOnly,

    /// `open` requested write access on a directory node.
    #[error("cannot open a directory for writing")]
    WriteToDirectory,
}

impl From<LookupError> for FsError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::Resolve(e) => FsError::Resolve(e),
            LookupError::Kube(e) => FsError::Kube(e),
        }
    }
}

/// Maps a failure to the POSIX errno the kernel expects, negated by the
/// caller when handed to `reply.error`.
pub fn errno_for(err: &FsError) -> i32 {
    match err {
        FsError::Resolve(ResolveError::NotADirectory { .. }) => libc::ENOTDIR,
        FsError::Resolve(ResolveError::NotFound { .. }) => libc::ENOENT,
        FsError::ReadOnly | FsError::WriteToDirectory => libc::EACCES,
        FsError::Kube(kube_err) => match kube_err.status_code() {
            Some(400) => libc::EINVAL,
            Some(404) => libc::ENOENT,
            Some(422) => libc::EINVAL,
            _ => {
                tracing::warn!(error = %kube_err, "upcall failed with an unclassified Kubernetes error, returning EIO");
                libc::EIO
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_a_directory_maps_to_enotdir() {
        let err = FsError::Resolve(ResolveError::NotADirectory { path: "/x".to_string() });
        assert_eq!(errno_for(&err), libc::ENOTDIR);
    }

    #[test]
    fn not_found_maps_to_enoent() {
        let err = FsError::Resolve(ResolveError::NotFound { path: "/x".to_string() });
        assert_eq!(errno_for(&err), libc::ENOENT);
    }

    #[test]
    fn read_only_maps_to_eacces() {
        assert_eq!(errno_for(&FsError::ReadOnly), libc::EACCES);
        assert_eq!(errno_for(&FsError::WriteToDirectory), libc::EACCES);
    }

    #[test]
    fn lookup_error_conversion_preserves_variant() {
        let lookup = LookupError::Resolve(ResolveError::NotFound { path: "/x".to_string() });
        let fs_err: FsError = lookup.into();
        assert_eq!(errno_for(&fs_err), libc::ENOENT);
    }
}
