//! Registry of allowed roots.
//!
//! Roots are canonicalized once at startup and never change afterwards, so
//! the registry can be shared behind an `Arc` by any number of concurrent
//! requests without locking.

use std::fs;
use std::path::{Path, PathBuf};

use protocol::RootInfo;
use thiserror::Error;

/// Errors that can occur while registering allowed roots.
#[derive(Debug, Error)]
pub enum RootError {
    /// The configured root is not an absolute path.
    #[error("allowed root must be absolute: {0}")]
    Relative(PathBuf),

    /// The configured root is an empty string.
    #[error("allowed root must not be empty")]
    Empty,

    /// The configured root could not be canonicalized.
    #[error("cannot canonicalize allowed root {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configured root is not a directory.
    #[error("allowed root is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// An absolute, canonical directory the daemon may serve from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedRoot {
    path: PathBuf,
}

impl AllowedRoot {
    /// Canonicalize and register a root.
    pub fn new(path: &Path) -> Result<Self, RootError> {
        if path.as_os_str().is_empty() {
            return Err(RootError::Empty);
        }
        if !path.is_absolute() {
            return Err(RootError::Relative(path.to_path_buf()));
        }

        let canonical = fs::canonicalize(path).map_err(|source| RootError::Canonicalize {
            path: path.to_path_buf(),
            source,
        })?;

        if !canonical.is_dir() {
            return Err(RootError::NotADirectory(canonical));
        }

        Ok(Self { path: canonical })
    }

    /// Canonical path of the root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Display name: the last path component, or "/" for the filesystem root.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "/".to_string())
    }

    /// Whether a canonical path is this root or lies beneath it.
    ///
    /// `Path::starts_with` compares whole components, so `/data2` is not
    /// inside `/data`.
    pub fn contains(&self, canonical: &Path) -> bool {
        canonical.starts_with(&self.path)
    }
}

/// Ordered set of allowed roots.
///
/// An empty registry is valid and serves nothing.
#[derive(Debug, Clone, Default)]
pub struct RootRegistry {
    roots: Vec<AllowedRoot>,
}

impl RootRegistry {
    /// Register the given roots in order.
    pub fn new<I, P>(paths: I) -> Result<Self, RootError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut roots: Vec<AllowedRoot> = Vec::new();
        for path in paths {
            let root = AllowedRoot::new(path.as_ref())?;
            if roots.contains(&root) {
                tracing::debug!(root = %root.path.display(), "Skipping duplicate allowed root");
                continue;
            }
            roots.push(root);
        }
        Ok(Self { roots })
    }

    /// A registry with no roots.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registered roots in configuration order.
    pub fn roots(&self) -> &[AllowedRoot] {
        &self.roots
    }

    /// Root at the given index.
    pub fn get(&self, index: usize) -> Option<&AllowedRoot> {
        self.roots.get(index)
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Index of the first root containing the canonical path.
    pub fn find(&self, canonical: &Path) -> Option<usize> {
        self.roots.iter().position(|root| root.contains(canonical))
    }

    /// Whether the canonical path is confined to some root.
    pub fn is_confined(&self, canonical: &Path) -> bool {
        self.find(canonical).is_some()
    }

    /// Roots as advertised to clients.
    pub fn to_protocol(&self) -> Vec<RootInfo> {
        self.roots
            .iter()
            .enumerate()
            .map(|(index, root)| RootInfo {
                index,
                name: root.name(),
                path: root.path.to_string_lossy().to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    #[test]
    fn test_root_is_canonicalized() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("data")).unwrap();
        symlink(temp_dir.path().join("data"), temp_dir.path().join("alias")).unwrap();

        let root = AllowedRoot::new(&temp_dir.path().join("alias")).unwrap();
        let expected = fs::canonicalize(temp_dir.path().join("data")).unwrap();
        assert_eq!(root.path(), expected.as_path());
        assert_eq!(root.name(), "data");
    }

    #[test]
    fn test_relative_root_rejected() {
        let result = AllowedRoot::new(Path::new("relative/dir"));
        assert!(matches!(result, Err(RootError::Relative(_))));
    }

    #[test]
    fn test_empty_root_rejected() {
        let result = AllowedRoot::new(Path::new(""));
        assert!(matches!(result, Err(RootError::Empty)));
    }

    #[test]
    fn test_missing_root_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let result = AllowedRoot::new(&temp_dir.path().join("missing"));
        assert!(matches!(result, Err(RootError::Canonicalize { .. })));
    }

    #[test]
    fn test_file_root_rejected() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("file.txt"), "x").unwrap();
        let result = AllowedRoot::new(&temp_dir.path().join("file.txt"));
        assert!(matches!(result, Err(RootError::NotADirectory(_))));
    }

    #[test]
    fn test_sibling_prefix_not_contained() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("data")).unwrap();
        fs::create_dir_all(temp_dir.path().join("data2")).unwrap();

        let registry = RootRegistry::new([temp_dir.path().join("data")]).unwrap();
        let sibling = fs::canonicalize(temp_dir.path().join("data2")).unwrap();
        assert!(!registry.is_confined(&sibling));
    }

    #[test]
    fn test_find_returns_first_matching_root() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("outer/inner")).unwrap();

        let registry = RootRegistry::new([
            temp_dir.path().join("outer/inner"),
            temp_dir.path().join("outer"),
        ])
        .unwrap();

        let inner = fs::canonicalize(temp_dir.path().join("outer/inner")).unwrap();
        assert_eq!(registry.find(&inner), Some(0));
        let outer = fs::canonicalize(temp_dir.path().join("outer")).unwrap();
        assert_eq!(registry.find(&outer), Some(1));
    }

    #[test]
    fn test_duplicate_roots_collapsed() {
        let temp_dir = TempDir::new().unwrap();
        let registry =
            RootRegistry::new([temp_dir.path().to_path_buf(), temp_dir.path().to_path_buf()])
                .unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_registry_confines_nothing() {
        let registry = RootRegistry::empty();
        assert!(registry.is_empty());
        assert!(!registry.is_confined(Path::new("/")));
    }

    #[test]
    fn test_to_protocol() {
        let temp_dir = TempDir::new().unwrap();
        let registry = RootRegistry::new([temp_dir.path()]).unwrap();
        let infos = registry.to_protocol();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].index, 0);
        assert_eq!(
            infos[0].path,
            fs::canonicalize(temp_dir.path()).unwrap().to_string_lossy()
        );
    }
}
