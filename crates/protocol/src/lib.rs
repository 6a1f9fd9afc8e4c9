//! # RootView Protocol Library
//!
//! Wire types shared by the RootView daemon and its clients.
//!
//! ## Overview
//!
//! - **Listings**: [`DirectoryListing`] with ordered [`FileEntry`] values
//! - **Previews**: [`TextPreview`] and [`MeshPayload`] bodies
//! - **Errors**: [`ErrorMessage`] with a machine-readable [`ErrorCode`]
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{MeshPayload, PreviewKind};
//!
//! let payload = MeshPayload {
//!     vertex_count: 1,
//!     face_count: 0,
//!     has_color: false,
//!     vertices: vec![[0.0, 0.0, 0.0, 200.0, 200.0, 200.0]],
//!     faces: None,
//! };
//!
//! let bytes = payload.to_msgpack().unwrap();
//! assert_eq!(MeshPayload::from_msgpack(&bytes).unwrap(), payload);
//! assert_eq!(PreviewKind::Mesh.as_str(), "mesh");
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Wire type definitions
//! - [`error`]: Error types

pub mod error;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use messages::{
    Classification, DirectoryListing, ErrorCode, ErrorMessage, FileEntry, FileEntryKind,
    MeshPayload, PreviewKind, RootInfo, TextPreview,
};
