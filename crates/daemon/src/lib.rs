//! # RootView Daemon Library
//!
//! Browse and preview files inside a fixed set of allowed root directories
//! over HTTP, without ever serving anything outside them.
//!
//! ## Overview
//!
//! - **Path confinement**: every client path is resolved against the real
//!   filesystem and re-checked for membership in an allowed root
//! - **Directory listing**: ordered entries, one symlink hop, never recursive
//! - **Previews**: images and video with byte ranges, capped UTF-8 text, and
//!   `.ply` point clouds and meshes decoded to a compact wire format
//!
//! ## Architecture
//!
//! ```text
//! request ──▶ PathResolver ──▶ DirectoryLister      (directories)
//!                        └──▶ ContentDelivery      (files)
//!                               ├─ classify
//!                               └─ MeshDecoder      (.ply)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::{Config, HttpServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load_default()?;
//!     config.apply_env_overrides();
//!     config.validate()?;
//!
//!     let server = HttpServer::from_config(&config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`files`]: Roots, path resolution, listing, classification, delivery
//! - [`mesh`]: `.ply` decoding
//! - [`router`]: HTTP routes and error mapping
//! - [`server`]: Listener lifecycle and shutdown

pub mod config;
pub mod files;
pub mod mesh;
pub mod router;
pub mod server;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::Config;

// Re-export files types for convenience
pub use files::{
    classify, ContentDelivery, DirectoryEntry, DirectoryLister, FileError, PathResolver,
    PreviewError, RangeRequest, ResolveError, ResolvedPath, RootRegistry,
};

// Re-export mesh types for convenience
pub use mesh::{DecodeError, MeshData, MeshDecoder, MeshLimits};

// Re-export router and server types for convenience
pub use router::{build_router, AppState, RouterError};
pub use server::{wait_for_shutdown_signal, HttpServer};
