//! PLY header parsing into a schema table.
//!
//! The header fully determines the body layout, so it is parsed into an
//! ordered list of element descriptors before any body byte is read.

use std::io::{BufRead, Read};

use super::DecodeError;

/// Upper bound on the header size; real headers are a few hundred bytes.
pub const MAX_HEADER_BYTES: u64 = 64 * 1024;

/// Body encoding declared by the `format` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

/// Scalar property type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

impl ScalarType {
    /// Parse both the classic and the sized type names.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "char" | "int8" => Self::Int8,
            "uchar" | "uint8" => Self::UInt8,
            "short" | "int16" => Self::Int16,
            "ushort" | "uint16" => Self::UInt16,
            "int" | "int32" => Self::Int32,
            "uint" | "uint32" => Self::UInt32,
            "float" | "float32" => Self::Float32,
            "double" | "float64" => Self::Float64,
            _ => return None,
        })
    }

    /// Width in bytes in binary bodies.
    pub fn width(&self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }
}

/// Shape of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Scalar(ScalarType),
    /// Variable-length list: a count followed by that many items.
    List { count: ScalarType, item: ScalarType },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDef {
    pub name: String,
    pub kind: PropertyKind,
}

/// One `element` block with its ordered properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDef {
    pub name: String,
    pub count: u64,
    pub properties: Vec<PropertyDef>,
}

impl ElementDef {
    /// Bytes per record in binary bodies, when no property is a list.
    pub fn record_width(&self) -> Option<usize> {
        self.properties
            .iter()
            .map(|p| match p.kind {
                PropertyKind::Scalar(ty) => Some(ty.width()),
                PropertyKind::List { .. } => None,
            })
            .sum()
    }

    /// Position of the first property with one of the given names.
    pub fn property_index(&self, names: &[&str]) -> Option<usize> {
        self.properties
            .iter()
            .position(|p| names.contains(&p.name.as_str()))
    }
}

/// Parsed header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub format: Format,
    pub elements: Vec<ElementDef>,
}

impl Header {
    /// Position of the element with the given name.
    pub fn element_index(&self, name: &str) -> Option<usize> {
        self.elements.iter().position(|e| e.name == name)
    }
}

fn bad(msg: impl Into<String>) -> DecodeError {
    DecodeError::BadHeader(msg.into())
}

/// Read header lines up to and including `end_header`.
///
/// The reader is left positioned at the first body byte.
pub fn parse_header<R: BufRead>(reader: &mut R) -> Result<Header, DecodeError> {
    let mut budget = MAX_HEADER_BYTES;
    let mut line = Vec::new();
    let mut first = true;
    let mut format = None;
    let mut elements: Vec<ElementDef> = Vec::new();

    loop {
        line.clear();
        let read = (&mut *reader).take(budget).read_until(b'\n', &mut line)?;
        if read == 0 || !line.ends_with(b"\n") {
            return Err(bad("missing end_header"));
        }
        budget -= read as u64;

        let text = std::str::from_utf8(&line).map_err(|_| bad("header is not ASCII"))?;
        let mut words = text.split_whitespace();
        let keyword = words.next();

        if first {
            if keyword != Some("ply") || words.next().is_some() {
                return Err(bad("missing ply magic"));
            }
            first = false;
            continue;
        }

        match keyword {
            None | Some("comment") | Some("obj_info") => {}
            Some("format") => {
                let parsed = match words.next() {
                    Some("ascii") => Format::Ascii,
                    Some("binary_little_endian") => Format::BinaryLittleEndian,
                    Some("binary_big_endian") => Format::BinaryBigEndian,
                    other => return Err(bad(format!("unknown format {other:?}"))),
                };
                if words.next().is_none() {
                    return Err(bad("format line without version"));
                }
                if format.replace(parsed).is_some() {
                    return Err(bad("duplicate format line"));
                }
            }
            Some("element") => {
                let (Some(name), Some(count), None) = (words.next(), words.next(), words.next())
                else {
                    return Err(bad("malformed element line"));
                };
                let count = count
                    .parse::<u64>()
                    .map_err(|_| bad(format!("invalid count for element {name}")))?;
                elements.push(ElementDef {
                    name: name.to_string(),
                    count,
                    properties: Vec::new(),
                });
            }
            Some("property") => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| bad("property declared before any element"))?;
                let words: Vec<&str> = words.collect();
                let property = match words.as_slice() {
                    ["list", count, item, name] => PropertyDef {
                        name: name.to_string(),
                        kind: PropertyKind::List {
                            count: parse_type(count)?,
                            item: parse_type(item)?,
                        },
                    },
                    [ty, name] => PropertyDef {
                        name: name.to_string(),
                        kind: PropertyKind::Scalar(parse_type(ty)?),
                    },
                    _ => return Err(bad("malformed property line")),
                };
                if let PropertyKind::List { count, .. } = property.kind {
                    if count.is_float() {
                        return Err(bad(format!("list {} has a float count", property.name)));
                    }
                }
                element.properties.push(property);
            }
            Some("end_header") => break,
            Some(other) => return Err(bad(format!("unknown header keyword {other}"))),
        }
    }

    let format = format.ok_or_else(|| bad("missing format line"))?;
    Ok(Header { format, elements })
}

fn parse_type(name: &str) -> Result<ScalarType, DecodeError> {
    ScalarType::parse(name).ok_or_else(|| bad(format!("unknown property type {name}")))
}
