//! Wire types exchanged between the RootView daemon and its clients.
//!
//! Directory listings, text previews and errors travel as JSON. Mesh payloads
//! can additionally be encoded as MessagePack, which keeps large vertex
//! arrays compact.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Preview strategy for a file, derived from its name alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewKind {
    /// Served as plain bytes with an image MIME type.
    Image,
    /// Served with byte-range support for seeking.
    Video,
    /// Decoded as UTF-8 for highlighted preview.
    Text,
    /// Parsed as a `.ply` point cloud or mesh.
    Mesh,
    /// Raw download only.
    Unsupported,
}

impl PreviewKind {
    /// Lowercase name as used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Text => "text",
            Self::Mesh => "mesh",
            Self::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for PreviewKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Directory Listing
// ============================================================================

/// Type of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link to a regular file inside the roots.
    SymlinkFile,
    /// Symbolic link to a directory inside the roots.
    SymlinkDirectory,
    /// Other (device, socket, fifo, etc.).
    Other,
    /// Entry whose target lies outside every root or cannot be inspected.
    Inaccessible,
}

impl FileEntryKind {
    /// Whether the entry can be navigated into.
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory | Self::SymlinkDirectory)
    }

    /// Whether the entry resolves to a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, Self::File | Self::SymlinkFile)
    }
}

/// A single file or directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: FileEntryKind,
    /// Size in bytes; absent for directories and inaccessible entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Last modified timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<u64>,
    /// Preview strategy, present for files only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<PreviewKind>,
}

/// Response with an ordered directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryListing {
    /// Index of the root the directory was resolved under.
    pub root: usize,
    /// Listed directory, relative to its root ("" for the root itself).
    pub path: String,
    /// Parent directory relative to the root, absent at the root.
    pub parent: Option<String>,
    /// Entries: directories first, then case-insensitive by name.
    pub entries: Vec<FileEntry>,
}

/// A configured root as advertised to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootInfo {
    /// Position in the configured root list.
    pub index: usize,
    /// Display name (last path component).
    pub name: String,
    /// Canonical absolute path.
    pub path: String,
}

/// Classification of a single file without reading its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Path relative to its root.
    pub path: String,
    /// Preview strategy.
    pub preview: PreviewKind,
    /// MIME type used for raw delivery.
    pub content_type: String,
}

// ============================================================================
// Previews
// ============================================================================

/// Decoded text preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPreview {
    /// Path relative to its root.
    pub path: String,
    /// Decoded content, possibly truncated.
    pub content: String,
    /// Always "utf-8"; other encodings are rejected.
    pub encoding: String,
    /// Whether the content was cut at `max_bytes`.
    pub truncated: bool,
    /// Full file size in bytes.
    pub size: u64,
    /// Preview cap in bytes.
    pub max_bytes: u64,
}

/// Decoded point cloud or mesh ready for a 3D viewer.
///
/// Each vertex is `[x, y, z, r, g, b]` with colors in 0-255. Faces index
/// into `vertices`; `faces` is absent for pure point clouds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshPayload {
    /// Number of vertices.
    pub vertex_count: usize,
    /// Number of faces kept after validation.
    pub face_count: usize,
    /// Whether the source declared per-vertex colors.
    pub has_color: bool,
    /// Vertex tuples.
    pub vertices: Vec<[f64; 6]>,
    /// Face index lists.
    pub faces: Option<Vec<Vec<u32>>>,
}

impl MeshPayload {
    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Serialize to MessagePack with named fields.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error message returned to clients.
///
/// Messages are generic by construction; filesystem detail stays in the
/// server log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error code for programmatic handling.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// Whether the client can fall back (e.g., offer a raw download).
    pub recoverable: bool,
}

/// Error codes for common error conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Missing, inaccessible or outside every root.
    NotFound,
    /// Listing requested on something that is not a directory.
    NotADirectory,
    /// The file exists but cannot be previewed in the requested mode.
    NotPreviewable,
    /// Invalid request or parameters.
    InvalidRequest,
    /// Server-side error.
    InternalError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_kind_wire_names() {
        let json = serde_json::to_string(&PreviewKind::Unsupported).unwrap();
        assert_eq!(json, "\"unsupported\"");
        assert_eq!(PreviewKind::Mesh.to_string(), "mesh");
    }

    #[test]
    fn test_file_entry_omits_absent_size() {
        let entry = FileEntry {
            name: "docs".to_string(),
            kind: FileEntryKind::Directory,
            size: None,
            modified: Some(1704067200),
            preview: None,
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "directory");
        assert!(json.get("size").is_none());
        assert!(json.get("preview").is_none());
        assert_eq!(json["modified"], 1704067200);
    }

    #[test]
    fn test_directory_listing_json_roundtrip() {
        let listing = DirectoryListing {
            root: 0,
            path: "photos/2024".to_string(),
            parent: Some("photos".to_string()),
            entries: vec![
                FileEntry {
                    name: "raw".to_string(),
                    kind: FileEntryKind::SymlinkDirectory,
                    size: None,
                    modified: Some(1704067200),
                    preview: None,
                },
                FileEntry {
                    name: "beach.jpg".to_string(),
                    kind: FileEntryKind::File,
                    size: Some(2048),
                    modified: Some(1704067200),
                    preview: Some(PreviewKind::Image),
                },
                FileEntry {
                    name: "escape".to_string(),
                    kind: FileEntryKind::Inaccessible,
                    size: None,
                    modified: None,
                    preview: None,
                },
            ],
        };

        let json = serde_json::to_string(&listing).unwrap();
        let decoded: DirectoryListing = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, listing);
    }

    #[test]
    fn test_entry_kind_helpers() {
        assert!(FileEntryKind::SymlinkDirectory.is_dir());
        assert!(!FileEntryKind::Inaccessible.is_dir());
        assert!(FileEntryKind::SymlinkFile.is_file());
        assert!(!FileEntryKind::Other.is_file());
    }

    #[test]
    fn test_mesh_payload_vertex_shape() {
        let payload = MeshPayload {
            vertex_count: 1,
            face_count: 0,
            has_color: true,
            vertices: vec![[0.5, -1.0, 2.0, 255.0, 0.0, 10.0]],
            faces: None,
        };

        let json: serde_json::Value = serde_json::from_slice(&payload.to_json().unwrap()).unwrap();
        assert_eq!(json["vertices"][0].as_array().unwrap().len(), 6);
        assert!(json["faces"].is_null());
    }

    #[test]
    fn test_mesh_payload_msgpack_roundtrip() {
        let payload = MeshPayload {
            vertex_count: 3,
            face_count: 1,
            has_color: false,
            vertices: vec![
                [0.0, 0.0, 0.0, 200.0, 200.0, 200.0],
                [1.0, 0.0, 0.0, 200.0, 200.0, 200.0],
                [0.0, 1.0, 0.0, 200.0, 200.0, 200.0],
            ],
            faces: Some(vec![vec![0, 1, 2]]),
        };

        let bytes = payload.to_msgpack().unwrap();
        assert_eq!(MeshPayload::from_msgpack(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_error_message_codes() {
        let msg = ErrorMessage {
            code: ErrorCode::NotPreviewable,
            message: "file cannot be previewed".to_string(),
            recoverable: true,
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["code"], "not_previewable");
        assert_eq!(json["recoverable"], true);
    }
}
