//! Confined file access: root registry, path resolution, directory listing,
//! classification and content delivery.
//!
//! # Security
//!
//! Every path a client sends goes through [`PathResolver`] before any other
//! component touches the filesystem. Rejections are indistinguishable from
//! missing files on the wire; the actual reason is only logged.

pub mod browser;
pub mod classify;
pub mod delivery;
pub mod range;
pub mod resolver;
pub mod roots;

use std::io;
use std::path::{Path, PathBuf};

use protocol::{ErrorCode, ErrorMessage};
use thiserror::Error;

use crate::mesh::DecodeError;

pub use browser::{DirectoryEntry, DirectoryLister};
pub use classify::{classify, content_type};
pub use delivery::{
    ContentDelivery, Delivery, DeliveryBody, DeliveryOptions, DeliveryStatus, MeshFormat,
};
pub use range::RangeRequest;
pub use resolver::{PathResolver, ResolveError, ResolvedPath};
pub use roots::{AllowedRoot, RootError, RootRegistry};

/// Why a file cannot be previewed in the requested mode.
#[derive(Debug, Error)]
pub enum PreviewError {
    /// Text preview on content that is not valid UTF-8.
    #[error("content is not valid UTF-8")]
    InvalidEncoding,

    /// The mesh could not be decoded.
    #[error("mesh decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// The decoded preview could not be serialized.
    #[error("preview encoding failed: {0}")]
    Encode(#[from] protocol::ProtocolError),
}

/// Errors that can occur while serving a confined path.
#[derive(Debug, Error)]
pub enum FileError {
    /// The request path was rejected by the resolver.
    #[error("path rejected: {0}")]
    Rejected(#[from] ResolveError),

    /// The file vanished or became unreadable after resolution.
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// A listing was requested on something that is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The file exists but cannot be previewed in this mode.
    #[error("not previewable: {0}")]
    NotPreviewable(#[from] PreviewError),

    /// IO error.
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FileError {
    /// Map an IO error on `path`, folding missing and forbidden files into
    /// [`FileError::NotFound`].
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                Self::NotFound(path.to_path_buf())
            }
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    /// Wire error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Rejected(_) | Self::NotFound(_) => ErrorCode::NotFound,
            Self::NotADirectory(_) => ErrorCode::NotADirectory,
            Self::NotPreviewable(_) => ErrorCode::NotPreviewable,
            Self::Io { .. } => ErrorCode::InternalError,
        }
    }

    /// HTTP status class for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Rejected(_) | Self::NotFound(_) => 404,
            Self::NotPreviewable(_) => 422,
            Self::NotADirectory(_) | Self::Io { .. } => 500,
        }
    }

    /// Convert to the client-facing error message.
    ///
    /// The message is generic for every variant: no filesystem path, OS
    /// error text or rejection reason is included.
    pub fn to_error_message(&self) -> ErrorMessage {
        let (message, recoverable) = match self {
            Self::Rejected(_) | Self::NotFound(_) => ("not found", false),
            Self::NotADirectory(_) => ("not a directory", false),
            Self::NotPreviewable(_) => ("preview unavailable; download the raw file instead", true),
            Self::Io { .. } => ("internal error", false),
        };
        ErrorMessage {
            code: self.code(),
            message: message.to_string(),
            recoverable,
        }
    }
}
