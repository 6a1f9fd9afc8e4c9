//! Content delivery for resolved files.
//!
//! Raw modes (image, video, unsupported) stream the file in bounded chunks
//! with single byte-range support. Text is read up to a cap and decoded as
//! UTF-8. Meshes are decoded on a blocking worker and serialized as JSON or
//! MessagePack.
//!
//! Streams own their file handle; dropping a [`Delivery`] (for example when
//! the client disconnects) closes the file.

use std::io::{self, BufReader, SeekFrom};

use bytes::Bytes;
use protocol::{MeshPayload, PreviewKind, TextPreview};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use super::classify::content_type;
use super::range::RangeRequest;
use super::resolver::ResolvedPath;
use super::{FileError, PreviewError};
use crate::mesh::{MeshData, MeshDecoder, MeshLimits};

/// Default chunk size for streamed bodies (64KB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Maximum chunk size (1MB).
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Default text preview cap (512KB).
pub const DEFAULT_MAX_TEXT_BYTES: u64 = 512 * 1024;

/// Byte stream over a bounded span of an open file.
pub type FileStream = ReaderStream<Take<File>>;

/// Response status of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// 200: full content.
    Ok,
    /// 206: the requested byte span.
    PartialContent,
    /// 416: the range lies outside the file.
    RangeNotSatisfiable,
}

impl DeliveryStatus {
    /// HTTP status code.
    pub fn code(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::PartialContent => 206,
            Self::RangeNotSatisfiable => 416,
        }
    }
}

/// Response body of a delivery.
pub enum DeliveryBody {
    /// No body.
    Empty,
    /// Streamed file bytes.
    Stream(FileStream),
    /// A fully serialized preview.
    Bytes(Bytes),
}

impl std::fmt::Debug for DeliveryBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
        }
    }
}

/// Status, headers and body for one file response.
#[derive(Debug)]
pub struct Delivery {
    pub status: DeliveryStatus,
    pub headers: Vec<(&'static str, String)>,
    pub body: DeliveryBody,
}

impl Delivery {
    /// Value of the first header with the given (lowercase) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    fn serialized(content_type: &str, bytes: Vec<u8>) -> Self {
        Self {
            status: DeliveryStatus::Ok,
            headers: vec![
                ("content-type", content_type.to_string()),
                ("content-length", bytes.len().to_string()),
                ("x-content-type-options", "nosniff".to_string()),
            ],
            body: DeliveryBody::Bytes(Bytes::from(bytes)),
        }
    }
}

/// Wire encoding for mesh previews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeshFormat {
    #[default]
    Json,
    MessagePack,
}

impl MeshFormat {
    /// Parse a `format` query value; absent means JSON.
    pub fn parse(value: Option<&str>) -> Option<Self> {
        match value.map(str::to_ascii_lowercase).as_deref() {
            None | Some("json") => Some(Self::Json),
            Some("msgpack") | Some("messagepack") => Some(Self::MessagePack),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::MessagePack => "application/msgpack",
        }
    }

    fn encode(&self, payload: &MeshPayload) -> Result<Vec<u8>, FileError> {
        let bytes = match self {
            Self::Json => payload.to_json(),
            Self::MessagePack => payload.to_msgpack(),
        };
        bytes.map_err(|e| PreviewError::Encode(e).into())
    }
}

/// Delivery limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOptions {
    pub chunk_size: usize,
    pub max_text_bytes: u64,
    pub mesh_limits: MeshLimits,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_text_bytes: DEFAULT_MAX_TEXT_BYTES,
            mesh_limits: MeshLimits::default(),
        }
    }
}

/// Produces responses for resolved files.
#[derive(Debug, Clone, Default)]
pub struct ContentDelivery {
    options: DeliveryOptions,
}

impl ContentDelivery {
    /// Create a delivery handler.
    pub fn new(options: DeliveryOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DeliveryOptions {
        &self.options
    }

    /// Deliver a file according to its classification.
    pub async fn deliver(
        &self,
        resolved: &ResolvedPath,
        kind: PreviewKind,
        range: Option<&str>,
        mesh_format: MeshFormat,
    ) -> Result<Delivery, FileError> {
        match kind {
            PreviewKind::Image | PreviewKind::Video => self.deliver_raw(resolved, range).await,
            PreviewKind::Unsupported => {
                let mut delivery = self.deliver_raw(resolved, range).await?;
                delivery.headers.retain(|(name, _)| *name != "content-type");
                delivery
                    .headers
                    .push(("content-type", super::classify::OCTET_STREAM.to_string()));
                delivery.headers.push((
                    "content-disposition",
                    format!("attachment; filename=\"{}\"", attachment_name(&resolved.file_name())),
                ));
                Ok(delivery)
            }
            PreviewKind::Text => {
                let preview = self.deliver_text(resolved).await?;
                let bytes = serde_json::to_vec(&preview)
                    .map_err(|e| PreviewError::Encode(e.into()))?;
                Ok(Delivery::serialized("application/json", bytes))
            }
            PreviewKind::Mesh => {
                let mesh = self.decode_mesh(resolved).await?;
                let bytes = mesh_format.encode(&mesh.to_payload())?;
                Ok(Delivery::serialized(mesh_format.content_type(), bytes))
            }
        }
    }

    /// Stream the raw bytes of a file, honoring a single byte range.
    pub async fn deliver_raw(
        &self,
        resolved: &ResolvedPath,
        range: Option<&str>,
    ) -> Result<Delivery, FileError> {
        let path = resolved.canonical();
        let mut file = File::open(path)
            .await
            .map_err(|e| FileError::from_io(path, e))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| FileError::from_io(path, e))?;
        if !metadata.is_file() {
            debug!(path = %path.display(), "Raw delivery requested on a non-file");
            return Err(FileError::NotFound(path.to_path_buf()));
        }

        let size = metadata.len();
        let mut headers = vec![
            ("content-type", content_type(&resolved.file_name()).to_string()),
            ("accept-ranges", "bytes".to_string()),
            ("x-content-type-options", "nosniff".to_string()),
        ];

        let (status, start, len) = match RangeRequest::parse(range, size) {
            RangeRequest::Full => (DeliveryStatus::Ok, 0, size),
            RangeRequest::Partial { start, end } => {
                headers.push(("content-range", format!("bytes {start}-{end}/{size}")));
                (DeliveryStatus::PartialContent, start, end - start + 1)
            }
            RangeRequest::Unsatisfiable => {
                debug!(path = %path.display(), range = ?range, size, "Unsatisfiable range");
                headers.push(("content-range", format!("bytes */{size}")));
                headers.push(("content-length", "0".to_string()));
                return Ok(Delivery {
                    status: DeliveryStatus::RangeNotSatisfiable,
                    headers,
                    body: DeliveryBody::Empty,
                });
            }
        };

        if start > 0 {
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|e| FileError::from_io(path, e))?;
        }
        headers.push(("content-length", len.to_string()));

        let stream = ReaderStream::with_capacity(file.take(len), self.options.chunk_size);
        Ok(Delivery {
            status,
            headers,
            body: DeliveryBody::Stream(stream),
        })
    }

    /// Read a capped text preview.
    ///
    /// Invalid UTF-8 fails with [`PreviewError::InvalidEncoding`] rather than
    /// being replaced. A multi-byte sequence cut by the cap is dropped.
    pub async fn deliver_text(&self, resolved: &ResolvedPath) -> Result<TextPreview, FileError> {
        let path = resolved.canonical();
        let file = File::open(path)
            .await
            .map_err(|e| FileError::from_io(path, e))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| FileError::from_io(path, e))?;
        if !metadata.is_file() {
            debug!(path = %path.display(), "Text preview requested on a non-file");
            return Err(FileError::NotFound(path.to_path_buf()));
        }
        let size = metadata.len();

        let max = self.options.max_text_bytes;
        let limit = max.saturating_add(1);
        let mut buf = Vec::with_capacity(size.min(limit) as usize);
        file.take(limit)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| FileError::from_io(path, e))?;

        let truncated = buf.len() as u64 > max;
        if truncated {
            buf.truncate(max as usize);
        }

        let content = match String::from_utf8(buf) {
            Ok(content) => content,
            Err(e) if truncated && e.utf8_error().error_len().is_none() => {
                let valid = e.utf8_error().valid_up_to();
                let mut bytes = e.into_bytes();
                bytes.truncate(valid);
                String::from_utf8(bytes).map_err(|_| PreviewError::InvalidEncoding)?
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Text preview is not UTF-8");
                return Err(PreviewError::InvalidEncoding.into());
            }
        };

        Ok(TextPreview {
            path: resolved.relative().to_string(),
            content,
            encoding: "utf-8".to_string(),
            truncated,
            size,
            max_bytes: max,
        })
    }

    /// Decode a mesh on a blocking worker thread.
    pub async fn decode_mesh(&self, resolved: &ResolvedPath) -> Result<MeshData, FileError> {
        let path = resolved.canonical().to_path_buf();
        let decoder = MeshDecoder::new(self.options.mesh_limits);

        let worker_path = path.clone();
        let result = tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&worker_path)
                .map_err(|e| FileError::from_io(&worker_path, e))?;
            let metadata = file
                .metadata()
                .map_err(|e| FileError::from_io(&worker_path, e))?;
            if !metadata.is_file() {
                return Err(FileError::NotFound(worker_path.clone()));
            }
            decoder
                .decode(BufReader::new(file))
                .map_err(|e| FileError::from(PreviewError::Decode(e)))
        })
        .await;

        match result {
            Ok(Ok(mesh)) => {
                debug!(
                    path = %path.display(),
                    vertices = mesh.vertices.len(),
                    faces = mesh.faces.as_ref().map_or(0, Vec::len),
                    "Decoded mesh"
                );
                Ok(mesh)
            }
            Ok(Err(e)) => Err(e),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Mesh decode worker failed");
                Err(FileError::Io {
                    path,
                    source: io::Error::other(e),
                })
            }
        }
    }
}

/// File name safe to place inside a quoted header parameter.
fn attachment_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            ' ' => c,
            _ if c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::resolver::PathResolver;
    use crate::files::roots::RootRegistry;
    use futures_util::StreamExt;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn resolver_for(dir: &Path) -> PathResolver {
        PathResolver::new(Arc::new(RootRegistry::new([dir]).unwrap()))
    }

    async fn body_bytes(delivery: Delivery) -> Vec<u8> {
        match delivery.body {
            DeliveryBody::Empty => Vec::new(),
            DeliveryBody::Bytes(b) => b.to_vec(),
            DeliveryBody::Stream(mut stream) => {
                let mut out = Vec::new();
                while let Some(chunk) = stream.next().await {
                    out.extend_from_slice(&chunk.unwrap());
                }
                out
            }
        }
    }

    fn video_bytes() -> Vec<u8> {
        (0..10_000u32).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_full_file_without_range() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("clip.mp4"), video_bytes()).unwrap();
        let resolved = resolver_for(temp_dir.path()).resolve("clip.mp4").unwrap();

        let delivery = ContentDelivery::default()
            .deliver(&resolved, PreviewKind::Video, None, MeshFormat::Json)
            .await
            .unwrap();

        assert_eq!(delivery.status, DeliveryStatus::Ok);
        assert_eq!(delivery.header("accept-ranges"), Some("bytes"));
        assert_eq!(delivery.header("content-type"), Some("video/mp4"));
        assert_eq!(delivery.header("content-length"), Some("10000"));
        assert_eq!(body_bytes(delivery).await, video_bytes());
    }

    #[tokio::test]
    async fn test_range_halves_concatenate() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("clip.mp4"), video_bytes()).unwrap();
        let resolved = resolver_for(temp_dir.path()).resolve("clip.mp4").unwrap();
        // Small chunks so each half spans several stream items.
        let delivery = ContentDelivery::new(DeliveryOptions {
            chunk_size: 1000,
            ..DeliveryOptions::default()
        });

        let first = delivery
            .deliver_raw(&resolved, Some("bytes=0-4999"))
            .await
            .unwrap();
        assert_eq!(first.status, DeliveryStatus::PartialContent);
        assert_eq!(first.header("content-range"), Some("bytes 0-4999/10000"));
        assert_eq!(first.header("content-length"), Some("5000"));

        let second = delivery.deliver_raw(&resolved, Some("bytes=5000-")).await.unwrap();
        assert_eq!(second.header("content-range"), Some("bytes 5000-9999/10000"));

        let mut joined = body_bytes(first).await;
        joined.extend(body_bytes(second).await);
        assert_eq!(joined, video_bytes());
    }

    #[tokio::test]
    async fn test_unsatisfiable_range() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("clip.webm"), video_bytes()).unwrap();
        let resolved = resolver_for(temp_dir.path()).resolve("clip.webm").unwrap();

        let delivery = ContentDelivery::default()
            .deliver_raw(&resolved, Some("bytes=999999999-"))
            .await
            .unwrap();

        assert_eq!(delivery.status.code(), 416);
        assert_eq!(delivery.header("content-range"), Some("bytes */10000"));
        assert!(matches!(delivery.body, DeliveryBody::Empty));
    }

    #[tokio::test]
    async fn test_range_on_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("empty.mp4"), b"").unwrap();
        let resolved = resolver_for(temp_dir.path()).resolve("empty.mp4").unwrap();
        let delivery = ContentDelivery::default();

        let ranged = delivery.deliver_raw(&resolved, Some("bytes=0-")).await.unwrap();
        assert_eq!(ranged.status, DeliveryStatus::RangeNotSatisfiable);
        assert_eq!(ranged.header("content-range"), Some("bytes */0"));

        let full = delivery.deliver_raw(&resolved, None).await.unwrap();
        assert_eq!(full.status, DeliveryStatus::Ok);
        assert!(body_bytes(full).await.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_is_attachment() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("data \"v2\".bin"), b"\x00\x01\x02").unwrap();
        let resolved = resolver_for(temp_dir.path()).resolve("data \"v2\".bin").unwrap();

        let delivery = ContentDelivery::default()
            .deliver(&resolved, PreviewKind::Unsupported, None, MeshFormat::Json)
            .await
            .unwrap();

        assert_eq!(delivery.header("content-type"), Some("application/octet-stream"));
        assert_eq!(
            delivery.header("content-disposition"),
            Some("attachment; filename=\"data _v2_.bin\"")
        );
        assert_eq!(body_bytes(delivery).await, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_text_preview() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("notes.md"), "# Title\nbody\n").unwrap();
        let resolved = resolver_for(temp_dir.path()).resolve("notes.md").unwrap();

        let preview = ContentDelivery::default().deliver_text(&resolved).await.unwrap();
        assert_eq!(preview.content, "# Title\nbody\n");
        assert_eq!(preview.encoding, "utf-8");
        assert!(!preview.truncated);
        assert_eq!(preview.size, 13);
        assert_eq!(preview.path, "notes.md");
    }

    #[tokio::test]
    async fn test_text_preview_truncated() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("big.log"), "x".repeat(2048)).unwrap();
        let resolved = resolver_for(temp_dir.path()).resolve("big.log").unwrap();
        let delivery = ContentDelivery::new(DeliveryOptions {
            max_text_bytes: 1024,
            ..DeliveryOptions::default()
        });

        let preview = delivery.deliver_text(&resolved).await.unwrap();
        assert!(preview.truncated);
        assert_eq!(preview.content.len(), 1024);
        assert_eq!(preview.size, 2048);
        assert_eq!(preview.max_bytes, 1024);
    }

    #[tokio::test]
    async fn test_text_exactly_at_cap_is_not_truncated() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("cap.txt"), "y".repeat(64)).unwrap();
        let resolved = resolver_for(temp_dir.path()).resolve("cap.txt").unwrap();
        let delivery = ContentDelivery::new(DeliveryOptions {
            max_text_bytes: 64,
            ..DeliveryOptions::default()
        });

        let preview = delivery.deliver_text(&resolved).await.unwrap();
        assert!(!preview.truncated);
        assert_eq!(preview.content.len(), 64);
    }

    #[tokio::test]
    async fn test_truncation_drops_split_character() {
        let temp_dir = TempDir::new().unwrap();
        // "é" is two bytes; a cap of 4 cuts the second one in half.
        fs::write(temp_dir.path().join("accents.txt"), "aéé").unwrap();
        let resolved = resolver_for(temp_dir.path()).resolve("accents.txt").unwrap();
        let delivery = ContentDelivery::new(DeliveryOptions {
            max_text_bytes: 4,
            ..DeliveryOptions::default()
        });

        let preview = delivery.deliver_text(&resolved).await.unwrap();
        assert!(preview.truncated);
        assert_eq!(preview.content, "aé");
    }

    #[tokio::test]
    async fn test_invalid_utf8_fails_closed() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("latin1.txt"), b"caf\xe9 au lait").unwrap();
        let resolved = resolver_for(temp_dir.path()).resolve("latin1.txt").unwrap();

        let result = ContentDelivery::default().deliver_text(&resolved).await;
        assert!(matches!(
            result,
            Err(FileError::NotPreviewable(PreviewError::InvalidEncoding))
        ));
    }

    #[tokio::test]
    async fn test_mesh_preview_formats() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("tri.ply"),
            "ply\nformat ascii 1.0\nelement vertex 3\nproperty float x\nproperty float y\n\
             property float z\nelement face 1\nproperty list uchar int vertex_indices\nend_header\n\
             0 0 0\n1 0 0\n0 1 0\n3 0 1 2\n",
        )
        .unwrap();
        let resolved = resolver_for(temp_dir.path()).resolve("tri.ply").unwrap();
        let delivery = ContentDelivery::default();

        let json = delivery
            .deliver(&resolved, PreviewKind::Mesh, None, MeshFormat::Json)
            .await
            .unwrap();
        assert_eq!(json.header("content-type"), Some("application/json"));
        let payload: MeshPayload = serde_json::from_slice(&body_bytes(json).await).unwrap();
        assert_eq!(payload.vertex_count, 3);
        assert_eq!(payload.faces, Some(vec![vec![0, 1, 2]]));

        let packed = delivery
            .deliver(&resolved, PreviewKind::Mesh, None, MeshFormat::MessagePack)
            .await
            .unwrap();
        assert_eq!(packed.header("content-type"), Some("application/msgpack"));
        let decoded = MeshPayload::from_msgpack(&body_bytes(packed).await).unwrap();
        assert_eq!(decoded, payload);
    }

    #[tokio::test]
    async fn test_broken_mesh_is_not_previewable() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("bad.ply"), "not a ply file").unwrap();
        let resolved = resolver_for(temp_dir.path()).resolve("bad.ply").unwrap();

        let err = ContentDelivery::default().decode_mesh(&resolved).await.unwrap_err();
        assert_eq!(err.status_code(), 422);
    }

    #[tokio::test]
    async fn test_unbounded_text_cap() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("notes.md"), "# Notes\n").unwrap();
        let resolved = resolver_for(temp_dir.path()).resolve("notes.md").unwrap();
        let delivery = ContentDelivery::new(DeliveryOptions {
            max_text_bytes: u64::MAX,
            ..DeliveryOptions::default()
        });

        let preview = delivery.deliver_text(&resolved).await.unwrap();
        assert_eq!(preview.content, "# Notes\n");
        assert!(!preview.truncated);
    }

    #[tokio::test]
    async fn test_preview_of_directory_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("drafts.txt")).unwrap();
        fs::create_dir(temp_dir.path().join("scans.ply")).unwrap();
        let resolver = resolver_for(temp_dir.path());
        let delivery = ContentDelivery::default();

        let text = resolver.resolve("drafts.txt").unwrap();
        let err = delivery
            .deliver(&text, PreviewKind::Text, None, MeshFormat::Json)
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::NotFound(_)));
        assert_eq!(err.status_code(), 404);

        let mesh = resolver.resolve("scans.ply").unwrap();
        let err = delivery.decode_mesh(&mesh).await.unwrap_err();
        assert!(matches!(err, FileError::NotFound(_)));
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_vanished_file_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("photo.png"), b"png").unwrap();
        let resolved = resolver_for(temp_dir.path()).resolve("photo.png").unwrap();
        fs::remove_file(temp_dir.path().join("photo.png")).unwrap();

        let result = ContentDelivery::default().deliver_raw(&resolved, None).await;
        assert!(matches!(result, Err(FileError::NotFound(_))));
    }

    #[test]
    fn test_mesh_format_parse() {
        assert_eq!(MeshFormat::parse(None), Some(MeshFormat::Json));
        assert_eq!(MeshFormat::parse(Some("MsgPack")), Some(MeshFormat::MessagePack));
        assert_eq!(MeshFormat::parse(Some("xml")), None);
    }
}
