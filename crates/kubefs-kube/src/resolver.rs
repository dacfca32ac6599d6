//! The path resolver (component E): walks `/`-separated path segments down
//! the tree from `Root`, reusing each visited directory's cached
//! `get_children` rather than maintaining a resolver-local cache.

use kubefs_core::ResolveError;
use thiserror::Error;

use crate::error::KubeError;
use crate::node::{Node, NodeContext};

/// Either the resolver itself failed (bad path shape) or a node it visited
/// along the way failed to fetch its children from the cluster.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Kube(#[from] KubeError),
}

/// Resolves `path` against `root`. A single empty segment (bare `/`)
/// denotes Root; any other path walks segment by segment, failing
/// `NotADirectory` if a non-leaf segment lands on a file, or `NotFound` if
/// no child matches.
pub async fn resolve(root: &Node, path: &str, ctx: &NodeContext) -> Result<Node, LookupError> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err(ResolveError::NotFound { path: path.to_string() }.into());
    };
    if rest.is_empty() {
        return Ok(root.clone());
    }

    let mut current = root.clone();
    for segment in rest.split('/') {
        if !current.is_dir() {
            return Err(ResolveError::NotADirectory { path: path.to_string() }.into());
        }
        let children = current.get_children(ctx).await?;
        current = children
            .into_iter()
            .find(|child| child.name() == segment)
            .ok_or_else(|| ResolveError::NotFound { path: path.to_string() })?;
    }
    Ok(current)
}
