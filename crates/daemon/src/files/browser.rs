//! Directory listing inside the allowed roots.
//!
//! Listings never recurse and never skip a child: anything that cannot be
//! inspected, and any symlink whose target leaves every root, is reported as
//! [`FileEntryKind::Inaccessible`].

use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use protocol::{DirectoryListing, FileEntry, FileEntryKind};
use tracing::{debug, warn};

use super::classify::classify;
use super::resolver::ResolvedPath;
use super::roots::RootRegistry;
use super::FileError;

/// A directory entry with metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Path of the entry itself, not of its symlink target.
    pub path: PathBuf,
    /// Entry type after at most one symlink hop.
    pub kind: FileEntryKind,
    /// Size in bytes; absent for directories and inaccessible entries.
    pub size: Option<u64>,
    /// Last modified timestamp.
    pub modified: Option<SystemTime>,
}

impl DirectoryEntry {
    /// Convert to protocol FileEntry.
    pub fn to_protocol(&self) -> FileEntry {
        let modified = self.modified.map(|m| {
            m.duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        });

        FileEntry {
            name: self.name.clone(),
            kind: self.kind,
            size: self.size,
            modified,
            preview: self.kind.is_file().then(|| classify(&self.name)),
        }
    }

    fn inaccessible(name: String, path: PathBuf) -> Self {
        Self {
            name,
            path,
            kind: FileEntryKind::Inaccessible,
            size: None,
            modified: None,
        }
    }
}

/// Lists resolved directories.
#[derive(Debug, Clone)]
pub struct DirectoryLister {
    registry: Arc<RootRegistry>,
}

impl DirectoryLister {
    /// Create a lister that checks symlink targets against `registry`.
    pub fn new(registry: Arc<RootRegistry>) -> Self {
        Self { registry }
    }

    /// List contents of a directory.
    ///
    /// Entries are ordered directories first (including symlinks to
    /// directories), then case-insensitively by name. Hidden files (starting
    /// with '.') are included if `include_hidden` is true.
    pub fn list_directory(
        &self,
        dir: &ResolvedPath,
        include_hidden: bool,
    ) -> Result<Vec<DirectoryEntry>, FileError> {
        let canonical = dir.canonical();

        let metadata = fs::metadata(canonical).map_err(|e| FileError::from_io(canonical, e))?;
        if !metadata.is_dir() {
            return Err(FileError::NotADirectory(canonical.to_path_buf()));
        }

        let entries = fs::read_dir(canonical).map_err(|e| FileError::from_io(canonical, e))?;

        let mut results = Vec::new();
        for entry_result in entries {
            let entry = entry_result.map_err(|source| FileError::Io {
                path: canonical.to_path_buf(),
                source,
            })?;

            let name = entry.file_name().to_string_lossy().to_string();
            if !include_hidden && name.starts_with('.') {
                continue;
            }

            results.push(self.inspect(name, entry.path()));
        }

        results.sort_by(|a, b| {
            b.kind
                .is_dir()
                .cmp(&a.kind.is_dir())
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
                .then_with(|| a.name.cmp(&b.name))
        });

        debug!(
            path = %canonical.display(),
            entries = results.len(),
            "Listed directory"
        );
        Ok(results)
    }

    /// List a directory into the wire listing, including its parent link.
    pub fn listing(
        &self,
        dir: &ResolvedPath,
        include_hidden: bool,
    ) -> Result<DirectoryListing, FileError> {
        let entries = self.list_directory(dir, include_hidden)?;
        Ok(DirectoryListing {
            root: dir.root(),
            path: dir.relative().to_string(),
            parent: dir.parent_relative(),
            entries: entries.iter().map(DirectoryEntry::to_protocol).collect(),
        })
    }

    /// Classify one child without following more than one symlink hop.
    fn inspect(&self, name: String, path: PathBuf) -> DirectoryEntry {
        let link_metadata = match fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Cannot stat directory entry");
                return DirectoryEntry::inaccessible(name, path);
            }
        };

        if !link_metadata.file_type().is_symlink() {
            let kind = if link_metadata.is_dir() {
                FileEntryKind::Directory
            } else if link_metadata.is_file() {
                FileEntryKind::File
            } else {
                FileEntryKind::Other
            };
            return entry_from_metadata(name, path, kind, &link_metadata);
        }

        let Some(target) = self.confined_target(&path) else {
            return DirectoryEntry::inaccessible(name, path);
        };

        match fs::metadata(&target) {
            Ok(m) if m.is_dir() => {
                entry_from_metadata(name, path, FileEntryKind::SymlinkDirectory, &m)
            }
            Ok(m) if m.is_file() => entry_from_metadata(name, path, FileEntryKind::SymlinkFile, &m),
            Ok(m) => entry_from_metadata(name, path, FileEntryKind::Other, &m),
            Err(e) => {
                debug!(path = %target.display(), error = %e, "Cannot stat symlink target");
                DirectoryEntry::inaccessible(name, path)
            }
        }
    }

    /// Canonical symlink target, if it stays inside some root.
    fn confined_target(&self, link: &Path) -> Option<PathBuf> {
        let target = fs::read_link(link).ok()?;
        let absolute = if target.is_relative() {
            link.parent().map(|p| p.join(&target)).unwrap_or(target)
        } else {
            target
        };

        let canonical = match fs::canonicalize(&absolute) {
            Ok(c) => c,
            Err(e) => {
                debug!(link = %link.display(), error = %e, "Dangling symlink");
                return None;
            }
        };

        if self.registry.is_confined(&canonical) {
            Some(canonical)
        } else {
            warn!(
                link = %link.display(),
                target = %canonical.display(),
                "Symlink points outside the allowed roots"
            );
            None
        }
    }
}

fn entry_from_metadata(
    name: String,
    path: PathBuf,
    kind: FileEntryKind,
    metadata: &Metadata,
) -> DirectoryEntry {
    let size = (!kind.is_dir()).then(|| metadata.len());
    DirectoryEntry {
        name,
        path,
        kind,
        size,
        modified: metadata.modified().ok(),
    }
}
