//! Mounts a live Kubernetes cluster as a read/write FUSE filesystem.
//!
//! `kubefs [fuse-options] <mountpoint>`. Discovery and the initial client
//! handshake happen before the mount call; a failure there is fatal (exit
//! 2). Once mounted, `SIGINT`/`SIGTERM` trigger a clean unmount.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fuser::MountOption;
use kubefs_core::Config;
use kubefs_kube::{ApiClient, DiscoveryEngine, NamespaceInfo, NamespaceWatcher, NodeCaches, NodeContext};
use tracing_subscriber::EnvFilter;

mod error;
mod errno;
mod exit_codes;
mod fs;

use error::{CliError, Result};
use fs::KubeFs;

/// Mount a live Kubernetes cluster as a read/write FUSE filesystem.
#[derive(Parser, Debug)]
#[command(name = "kubefs")]
#[command(author = "kubefs contributors")]
#[command(version)]
#[command(about = "Mount a live Kubernetes cluster as a read/write FUSE filesystem", long_about = None)]
struct Cli {
    /// Directory to mount the filesystem at
    mountpoint: PathBuf,

    /// Run in the foreground instead of daemonizing
    #[arg(short = 'f', long)]
    foreground: bool,

    /// Enable FUSE kernel-level debug logging
    #[arg(short = 'd', long)]
    debug: bool,

    /// Extra mount options, comma-separated (passed through to FUSE)
    #[arg(short = 'o', long = "options")]
    options: Option<String>,

    /// How long a directory listing or object body stays cached
    #[arg(long = "cache-ttl-seconds", env = "CACHE_TTL_SECONDS", default_value_t = 5)]
    cache_ttl_seconds: u64,

    /// Omit kind directories with no objects
    #[arg(long = "exclude-empty-kinds", env = "EXCLUDE_EMPTY_KINDS", default_value_t = true)]
    exclude_empty_kinds: bool,

    /// Omit resource-group directories with no non-empty kinds
    #[arg(long = "exclude-empty-resource-groups", env = "EXCLUDE_EMPTY_RESOURCE_GROUPS", default_value_t = true)]
    exclude_empty_resource_groups: bool,

    /// Hoist the core ("") resource group's kinds into the namespace directory
    #[arg(long = "expand-core-resource-group", env = "EXPAND_CORE_RESOURCE_GROUP", default_value_t = true)]
    expand_core_resource_group: bool,

    /// Hoist undotted (single-word) resource groups' kinds into the namespace directory
    #[arg(long = "expand-undotted-resource-groups", env = "EXPAND_UNDOTTED_RESOURCE_GROUPS", default_value_t = true)]
    expand_undotted_resource_groups: bool,

    /// Upper bound on concurrent upstream requests issued while pruning empty directories
    #[arg(long = "max-parallel-requests", env = "MAX_PARALLEL_REQUESTS", default_value_t = 20)]
    max_parallel_requests: usize,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            cache_ttl: Duration::from_secs(self.cache_ttl_seconds),
            exclude_empty_kinds: self.exclude_empty_kinds,
            exclude_empty_resource_groups: self.exclude_empty_resource_groups,
            expand_core_resource_group: self.expand_core_resource_group,
            expand_undotted_resource_groups: self.expand_undotted_resource_groups,
            max_parallel_requests: self.max_parallel_requests,
        }
    }

    fn mount_options(&self) -> Vec<MountOption> {
        let mut opts = vec![MountOption::FSName("kubefs".to_string())];
        if self.debug {
            opts.push(MountOption::CUSTOM("debug".to_string()));
        }
        if let Some(raw) = &self.options {
            for part in raw.split(',').filter(|p| !p.is_empty()) {
                opts.push(MountOption::CUSTOM(part.to_string()));
            }
        }
        opts
    }
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            eprintln!("kubefs: {err}");
            err.exit_code()
        }
    };
    std::process::exit(code);
}

/// A mountpoint must exist and be a directory before `fuser` will let us
/// mount onto it; checking up front turns a confusing FUSE-level failure
/// into a clear option error at exit code 1.
fn check_mountpoint(path: &std::path::Path) -> Result<()> {
    if !path.is_dir() {
        return Err(CliError::option(format!("mountpoint {} is not a directory", path.display())));
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    check_mountpoint(&cli.mountpoint)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::from)?;
    let handle = runtime.handle().clone();

    let config = Arc::new(cli.config());
    let mount_options = cli.mount_options();

    let (api, discovery, initial_namespaces) = runtime.block_on(async {
        let api = ApiClient::from_env().await?;
        let discovery = DiscoveryEngine::run(api.raw_client()).await?;
        let namespaces = api
            .list_namespaces()
            .await?
            .into_iter()
            .map(|ns| NamespaceInfo {
                name: ns.metadata.name.unwrap_or_default(),
                created_at: ns.metadata.creation_timestamp.map(|t| t.0),
            })
            .collect::<Vec<_>>();
        Ok::<_, kubefs_kube::KubeError>((api, discovery, namespaces))
    })?;
    tracing::info!(
        namespaced_groups = discovery.namespaced.len(),
        global_groups = discovery.global.len(),
        namespaces = initial_namespaces.len(),
        "discovery complete"
    );

    let watcher = NamespaceWatcher::spawn(api.clone(), initial_namespaces, &handle);

    let ctx = NodeContext {
        discovery: Arc::new(discovery),
        api,
        caches: Arc::new(NodeCaches::new(config.cache_ttl)),
        config,
        watcher: Arc::new(watcher),
    };

    let kubefs = KubeFs::new(ctx, handle);
    let session = fuser::spawn_mount2(kubefs, &cli.mountpoint, &mount_options)
        .map_err(|e| CliError::mount(e.to_string()))?;
    tracing::info!(mountpoint = %cli.mountpoint.display(), "mounted");

    runtime.block_on(wait_for_shutdown_signal());
    tracing::info!("shutdown signal received, unmounting");
    drop(session);
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_mountpoint_accepts_an_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_mountpoint(dir.path()).is_ok());
    }

    #[test]
    fn check_mountpoint_rejects_a_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("not-a-dir");
        std::fs::write(&file_path, b"").unwrap();
        assert!(check_mountpoint(&file_path).is_err());
    }

    #[test]
    fn check_mountpoint_rejects_a_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_mountpoint(&dir.path().join("does-not-exist")).is_err());
    }
}
