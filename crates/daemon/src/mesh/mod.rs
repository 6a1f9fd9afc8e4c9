//! `.ply` point cloud and mesh decoding.
//!
//! Decoding runs in two phases: [`header::parse_header`] builds a schema
//! table from the header, then the body is read against that schema with an
//! ASCII or binary `ValueSource`. Elements other than `vertex` and
//! `face` are skipped using their declared layout alone.
//!
//! # Example
//!
//! ```rust
//! use daemon::mesh::MeshDecoder;
//!
//! let ply = b"ply\nformat ascii 1.0\nelement vertex 1\n\
//! property float x\nproperty float y\nproperty float z\nend_header\n1 2 3\n";
//! let mesh = MeshDecoder::default().decode(&ply[..]).unwrap();
//! assert_eq!(mesh.vertices[0].position, [1.0, 2.0, 3.0]);
//! assert!(mesh.faces.is_none());
//! ```

pub mod body;
pub mod header;

use std::io::{self, BufRead};

use protocol::MeshPayload;
use thiserror::Error;
use tracing::debug;

use body::{AsciiSource, BinarySource, ValueSource};
use header::{Format, Header, PropertyKind, ScalarType};

/// Color used for vertices when the source declares none.
pub const DEFAULT_COLOR: [u8; 3] = [200, 200, 200];

/// Default maximum number of vertices accepted.
pub const DEFAULT_MAX_VERTICES: u64 = 5_000_000;

/// Default maximum number of faces accepted.
pub const DEFAULT_MAX_FACES: u64 = 10_000_000;

/// Longest face index list accepted.
const MAX_FACE_ARITY: u64 = 1024;

/// Upper bound on capacity reserved from header counts before the body is
/// seen.
const MAX_PREALLOCATION: u64 = 1 << 16;

/// Errors that can occur while decoding a `.ply` file.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The header is malformed; the body layout is unknowable.
    #[error("malformed header: {0}")]
    BadHeader(String),

    /// The body ends before the declared element counts.
    #[error("body is shorter than the header declares")]
    Truncated,

    /// A body value cannot be interpreted.
    #[error("malformed body: {0}")]
    Malformed(String),

    /// No vertices were decoded.
    #[error("mesh has no vertices")]
    NoVertices,

    /// An element count exceeds the configured limit.
    #[error("{element} count {count} exceeds limit of {limit}")]
    TooLarge {
        element: String,
        count: u64,
        limit: u64,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for DecodeError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            DecodeError::Truncated
        } else {
            DecodeError::Io(err)
        }
    }
}

/// A decoded vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: [f64; 3],
    pub color: [u8; 3],
}

/// Decoded point cloud or mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    /// Present only when the file declares a face element.
    pub faces: Option<Vec<Vec<u32>>>,
    /// Whether colors came from the file rather than [`DEFAULT_COLOR`].
    pub has_color: bool,
    /// Faces dropped for referencing a vertex that does not exist.
    pub skipped_faces: usize,
}

impl MeshData {
    /// Convert to the wire payload of `[x, y, z, r, g, b]` tuples.
    pub fn to_payload(&self) -> MeshPayload {
        MeshPayload {
            vertex_count: self.vertices.len(),
            face_count: self.faces.as_ref().map_or(0, Vec::len),
            has_color: self.has_color,
            vertices: self
                .vertices
                .iter()
                .map(|v| {
                    [
                        v.position[0],
                        v.position[1],
                        v.position[2],
                        f64::from(v.color[0]),
                        f64::from(v.color[1]),
                        f64::from(v.color[2]),
                    ]
                })
                .collect(),
            faces: self.faces.clone(),
        }
    }
}

/// Element count limits applied before the body is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshLimits {
    pub max_vertices: u64,
    pub max_faces: u64,
}

impl Default for MeshLimits {
    fn default() -> Self {
        Self {
            max_vertices: DEFAULT_MAX_VERTICES,
            max_faces: DEFAULT_MAX_FACES,
        }
    }
}

/// Where the interesting properties live inside the vertex and face records.
struct Layout {
    vertex: usize,
    position: [usize; 3],
    color: Option<[usize; 3]>,
    face: Option<(usize, usize)>,
}

impl Layout {
    fn from_header(header: &Header) -> Result<Self, DecodeError> {
        let vertex = header
            .element_index("vertex")
            .ok_or_else(|| DecodeError::BadHeader("no vertex element".to_string()))?;
        let element = &header.elements[vertex];

        let scalar = |names: &[&str]| {
            element
                .property_index(names)
                .filter(|&i| matches!(element.properties[i].kind, PropertyKind::Scalar(_)))
        };

        let (Some(x), Some(y), Some(z)) = (scalar(&["x"]), scalar(&["y"]), scalar(&["z"])) else {
            return Err(DecodeError::BadHeader(
                "vertex element lacks x/y/z properties".to_string(),
            ));
        };

        let color = match (
            scalar(&["red", "r", "diffuse_red"]),
            scalar(&["green", "g", "diffuse_green"]),
            scalar(&["blue", "b", "diffuse_blue"]),
        ) {
            (Some(r), Some(g), Some(b)) => Some([r, g, b]),
            _ => None,
        };

        let face = header.element_index("face").and_then(|index| {
            header.elements[index]
                .property_index(&["vertex_indices", "vertex_index"])
                .filter(|&p| {
                    matches!(
                        header.elements[index].properties[p].kind,
                        PropertyKind::List { .. }
                    )
                })
                .map(|p| (index, p))
        });

        Ok(Self {
            vertex,
            position: [x, y, z],
            color,
            face,
        })
    }
}

/// Normalize a color channel to 0-255.
///
/// Float channels are taken as 0-1 intensities; integer channels are
/// clamped.
fn normalize_color(value: f64, ty: ScalarType) -> u8 {
    if ty.is_float() {
        (value.clamp(0.0, 1.0) * 255.0).round() as u8
    } else {
        value.clamp(0.0, 255.0) as u8
    }
}

/// Streaming `.ply` decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshDecoder {
    limits: MeshLimits,
}

impl MeshDecoder {
    pub fn new(limits: MeshLimits) -> Self {
        Self { limits }
    }

    /// Decode a complete `.ply` stream.
    pub fn decode<R: BufRead>(&self, mut reader: R) -> Result<MeshData, DecodeError> {
        let header = header::parse_header(&mut reader)?;
        let layout = Layout::from_header(&header)?;
        self.check_limits(&header, &layout)?;

        debug!(
            format = ?header.format,
            vertices = header.elements[layout.vertex].count,
            elements = header.elements.len(),
            "Decoding ply body"
        );

        match header.format {
            Format::Ascii => self.decode_body(AsciiSource::new(reader), &header, &layout),
            Format::BinaryLittleEndian => {
                self.decode_body(BinarySource::new(reader, false), &header, &layout)
            }
            Format::BinaryBigEndian => {
                self.decode_body(BinarySource::new(reader, true), &header, &layout)
            }
        }
    }

    fn check_limits(&self, header: &Header, layout: &Layout) -> Result<(), DecodeError> {
        let vertices = header.elements[layout.vertex].count;
        if vertices > self.limits.max_vertices {
            return Err(DecodeError::TooLarge {
                element: "vertex".to_string(),
                count: vertices,
                limit: self.limits.max_vertices,
            });
        }
        if let Some((face, _)) = layout.face {
            let faces = header.elements[face].count;
            if faces > self.limits.max_faces {
                return Err(DecodeError::TooLarge {
                    element: "face".to_string(),
                    count: faces,
                    limit: self.limits.max_faces,
                });
            }
        }

        // Any other element is bounded by the combined budget.
        let limit = self.limits.max_vertices.saturating_add(self.limits.max_faces);
        if let Some(element) = header.elements.iter().find(|e| e.count > limit) {
            return Err(DecodeError::TooLarge {
                element: element.name.clone(),
                count: element.count,
                limit,
            });
        }
        Ok(())
    }

    fn decode_body<S: ValueSource>(
        &self,
        mut source: S,
        header: &Header,
        layout: &Layout,
    ) -> Result<MeshData, DecodeError> {
        let mut vertices = Vec::new();
        let mut faces: Option<Vec<Vec<u32>>> = None;
        let mut skipped_faces = 0;
        let mut record = Vec::new();

        for (index, element) in header.elements.iter().enumerate() {
            if index == layout.vertex {
                vertices.reserve(element.count.min(MAX_PREALLOCATION) as usize);
                for _ in 0..element.count {
                    record.clear();
                    for property in &element.properties {
                        match property.kind {
                            PropertyKind::Scalar(ty) => record.push(source.read_scalar(ty)?),
                            PropertyKind::List { count, item } => {
                                let len = source.read_list_len(count)?;
                                source.skip_values(item, len)?;
                                record.push(0.0);
                            }
                        }
                    }
                    vertices.push(build_vertex(&record, element, layout)?);
                }
            } else if let Some((_, list)) = layout.face.filter(|(face, _)| *face == index) {
                let total = vertices.len() as f64;
                let mut kept = Vec::with_capacity(element.count.min(MAX_PREALLOCATION) as usize);
                for _ in 0..element.count {
                    let mut indices = None;
                    for (p, property) in element.properties.iter().enumerate() {
                        match property.kind {
                            PropertyKind::List { count, item } if p == list => {
                                let len = source.read_list_len(count)?;
                                if len > MAX_FACE_ARITY {
                                    return Err(DecodeError::Malformed(format!(
                                        "face with {len} indices"
                                    )));
                                }
                                let mut values = Vec::with_capacity(len as usize);
                                for _ in 0..len {
                                    values.push(source.read_scalar(item)?);
                                }
                                indices = Some(values);
                            }
                            PropertyKind::List { count, item } => {
                                let len = source.read_list_len(count)?;
                                source.skip_values(item, len)?;
                            }
                            PropertyKind::Scalar(ty) => source.skip_values(ty, 1)?,
                        }
                    }

                    let valid = indices.and_then(|values| {
                        values
                            .into_iter()
                            .map(|v| (v >= 0.0 && v.fract() == 0.0 && v < total).then_some(v as u32))
                            .collect::<Option<Vec<u32>>>()
                    });
                    match valid {
                        Some(face) => kept.push(face),
                        None => skipped_faces += 1,
                    }
                }
                faces = Some(kept);
            } else {
                debug!(element = %element.name, count = element.count, "Skipping ply element");
                source.skip_element(element)?;
            }
        }

        if vertices.is_empty() {
            return Err(DecodeError::NoVertices);
        }
        if skipped_faces > 0 {
            debug!(skipped_faces, "Dropped faces with out-of-range indices");
        }

        Ok(MeshData {
            vertices,
            faces,
            has_color: layout.color.is_some(),
            skipped_faces,
        })
    }
}

fn build_vertex(
    record: &[f64],
    element: &header::ElementDef,
    layout: &Layout,
) -> Result<Vertex, DecodeError> {
    let position = layout.position.map(|i| record[i]);
    if position.iter().any(|c| !c.is_finite()) {
        return Err(DecodeError::Malformed("non-finite vertex coordinate".to_string()));
    }

    let color = match layout.color {
        Some(channels) => channels.map(|i| match element.properties[i].kind {
            PropertyKind::Scalar(ty) => normalize_color(record[i], ty),
            PropertyKind::List { .. } => DEFAULT_COLOR[0],
        }),
        None => DEFAULT_COLOR,
    };

    Ok(Vertex { position, color })
}
