//! Confinement of client-supplied paths to the allowed roots.
//!
//! Every request path is joined to each root in turn and canonicalized
//! against the real filesystem. Membership is checked on the canonical
//! result, so `..` segments and symlinks pointing outside a root are caught
//! no matter how they are spelled.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::roots::RootRegistry;

/// Default maximum request path length in bytes.
pub const DEFAULT_MAX_PATH_LEN: usize = 4096;

/// Reasons a request path is rejected.
///
/// Callers must not forward the distinction to clients; all three map to the
/// same generic not-found response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The path escapes every root, is absolute, or is malformed.
    #[error("path escapes the allowed roots")]
    Traversal,

    /// The path does not exist or cannot be inspected.
    #[error("path not found")]
    NotFound,

    /// The path exceeds the configured maximum length.
    #[error("path exceeds maximum length")]
    TooLong,
}

/// A request path confined to one of the allowed roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    root: usize,
    canonical: PathBuf,
    relative: String,
}

impl ResolvedPath {
    /// Index of the owning root.
    pub fn root(&self) -> usize {
        self.root
    }

    /// Canonical absolute path.
    pub fn canonical(&self) -> &Path {
        &self.canonical
    }

    /// Slash-delimited path relative to the owning root ("" for the root).
    pub fn relative(&self) -> &str {
        &self.relative
    }

    /// Whether this is the root directory itself.
    pub fn is_root(&self) -> bool {
        self.relative.is_empty()
    }

    /// Final path component, or the root's own name.
    pub fn file_name(&self) -> String {
        self.canonical
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "/".to_string())
    }

    /// Parent directory relative to the root, absent at the root.
    pub fn parent_relative(&self) -> Option<String> {
        if self.is_root() {
            return None;
        }
        Some(
            self.relative
                .rsplit_once('/')
                .map(|(parent, _)| parent.to_string())
                .unwrap_or_default(),
        )
    }
}

/// Resolves request paths against a [`RootRegistry`].
#[derive(Debug, Clone)]
pub struct PathResolver {
    registry: Arc<RootRegistry>,
    max_path_len: usize,
}

impl PathResolver {
    /// Create a resolver with the default maximum path length.
    pub fn new(registry: Arc<RootRegistry>) -> Self {
        Self {
            registry,
            max_path_len: DEFAULT_MAX_PATH_LEN,
        }
    }

    /// Set the maximum accepted request path length in bytes.
    pub fn with_max_path_len(mut self, max_path_len: usize) -> Self {
        self.max_path_len = max_path_len;
        self
    }

    /// The registry this resolver confines to.
    pub fn registry(&self) -> &Arc<RootRegistry> {
        &self.registry
    }

    /// Resolve a root-relative request path against every root in order.
    ///
    /// The first root whose join canonicalizes into some allowed root wins.
    /// The result is relative to the root that actually contains it, which
    /// differs from the joined root only when a symlink crosses roots.
    pub fn resolve(&self, request: &str) -> Result<ResolvedPath, ResolveError> {
        self.resolve_with(request, None)
    }

    /// Resolve a request path joined to a single root.
    pub fn resolve_in(&self, root: usize, request: &str) -> Result<ResolvedPath, ResolveError> {
        self.resolve_with(request, Some(root))
    }

    fn resolve_with(&self, request: &str, only: Option<usize>) -> Result<ResolvedPath, ResolveError> {
        let relative = self.check_request(request)?;

        let mut escaped = false;
        for (index, root) in self.registry.roots().iter().enumerate() {
            if only.is_some_and(|wanted| wanted != index) {
                continue;
            }

            let joined = root.path().join(relative);
            let canonical = match fs::canonicalize(&joined) {
                Ok(p) => p,
                Err(e) => {
                    // Permission and I/O errors fold into not-found.
                    debug!(path = %joined.display(), error = %e, "Cannot canonicalize request path");
                    continue;
                }
            };

            // Prefer the root the request was joined to; a symlink may
            // also land inside another allowed root.
            let owner = if root.contains(&canonical) {
                Some((index, root))
            } else {
                self.registry
                    .find(&canonical)
                    .and_then(|found| self.registry.get(found).map(|r| (found, r)))
            };
            if let Some((owner, owner_root)) = owner {
                let relative = relative_string(owner_root.path(), &canonical);
                return Ok(ResolvedPath {
                    root: owner,
                    canonical,
                    relative,
                });
            }

            warn!(
                request = %request,
                resolved = %canonical.display(),
                "Rejected request path resolving outside its root"
            );
            escaped = true;
        }

        if escaped || climbs_above_root(relative) {
            return Err(ResolveError::Traversal);
        }
        Err(ResolveError::NotFound)
    }

    /// Syntactic pre-checks that never touch the filesystem.
    fn check_request<'a>(&self, request: &'a str) -> Result<&'a Path, ResolveError> {
        if request.len() > self.max_path_len {
            return Err(ResolveError::TooLong);
        }
        if request.contains('\0') {
            warn!("Rejected request path containing NUL byte");
            return Err(ResolveError::Traversal);
        }

        let path = Path::new(request);
        let anchored = path
            .components()
            .any(|c| matches!(c, Component::RootDir | Component::Prefix(_)));
        if path.is_absolute() || anchored || request.starts_with('\\') {
            warn!(request = %request, "Rejected absolute request path");
            return Err(ResolveError::Traversal);
        }

        Ok(path)
    }
}

/// Whether a relative path lexically climbs above its starting directory.
fn climbs_above_root(path: &Path) -> bool {
    let mut depth: i64 = 0;
    for component in path.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

/// Slash-delimited form of `canonical` below `root`.
fn relative_string(root: &Path, canonical: &Path) -> String {
    canonical
        .strip_prefix(root)
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}
