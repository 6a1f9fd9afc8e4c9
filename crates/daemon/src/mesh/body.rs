//! Value readers for the PLY body encodings.
//!
//! Both readers hand out every scalar as `f64`, which represents all PLY
//! scalar types exactly.

use std::collections::VecDeque;
use std::io::{self, BufRead, Read};

use super::header::{ElementDef, PropertyKind, ScalarType};
use super::DecodeError;

/// Sequential source of typed values from a PLY body.
pub(crate) trait ValueSource {
    fn read_scalar(&mut self, ty: ScalarType) -> Result<f64, DecodeError>;

    /// Read a list length, which must be a non-negative integer.
    fn read_list_len(&mut self, ty: ScalarType) -> Result<u64, DecodeError> {
        let value = self.read_scalar(ty)?;
        if value < 0.0 || value.fract() != 0.0 {
            return Err(DecodeError::Malformed(format!("invalid list length {value}")));
        }
        Ok(value as u64)
    }

    fn skip_values(&mut self, ty: ScalarType, count: u64) -> Result<(), DecodeError> {
        for _ in 0..count {
            self.read_scalar(ty)?;
        }
        Ok(())
    }

    /// Consume a whole element without interpreting it.
    fn skip_element(&mut self, element: &ElementDef) -> Result<(), DecodeError> {
        // Records without properties occupy no bytes or tokens.
        if element.properties.is_empty() {
            return Ok(());
        }
        for _ in 0..element.count {
            for property in &element.properties {
                match property.kind {
                    PropertyKind::Scalar(ty) => self.skip_values(ty, 1)?,
                    PropertyKind::List { count, item } => {
                        let len = self.read_list_len(count)?;
                        self.skip_values(item, len)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Whitespace-delimited ASCII body.
pub(crate) struct AsciiSource<R> {
    reader: R,
    pending: VecDeque<String>,
    line: String,
}

impl<R: BufRead> AsciiSource<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            pending: VecDeque::new(),
            line: String::new(),
        }
    }

    fn next_token(&mut self) -> Result<String, DecodeError> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Ok(token);
            }
            self.line.clear();
            let read = self.reader.read_line(&mut self.line).map_err(|e| {
                if e.kind() == io::ErrorKind::InvalidData {
                    DecodeError::Malformed("body is not valid text".to_string())
                } else {
                    e.into()
                }
            })?;
            if read == 0 {
                return Err(DecodeError::Truncated);
            }
            self.pending
                .extend(self.line.split_whitespace().map(str::to_string));
        }
    }
}

impl<R: BufRead> ValueSource for AsciiSource<R> {
    fn read_scalar(&mut self, ty: ScalarType) -> Result<f64, DecodeError> {
        let token = self.next_token()?;
        let value = if ty.is_float() {
            token.parse::<f64>().ok()
        } else {
            token.parse::<i64>().ok().map(|v| v as f64)
        };
        value.ok_or_else(|| DecodeError::Malformed(format!("invalid value {token:?}")))
    }
}

/// Fixed-width binary body in either byte order.
pub(crate) struct BinarySource<R> {
    reader: R,
    big_endian: bool,
}

impl<R: Read> BinarySource<R> {
    pub(crate) fn new(reader: R, big_endian: bool) -> Self {
        Self { reader, big_endian }
    }

    fn skip_bytes(&mut self, len: u64) -> Result<(), DecodeError> {
        let copied = io::copy(&mut (&mut self.reader).take(len), &mut io::sink())?;
        if copied < len {
            return Err(DecodeError::Truncated);
        }
        Ok(())
    }
}

macro_rules! decode_number {
    ($ty:ty, $bytes:expr, $big:expr) => {{
        let mut raw = [0u8; std::mem::size_of::<$ty>()];
        raw.copy_from_slice($bytes);
        if $big {
            <$ty>::from_be_bytes(raw) as f64
        } else {
            <$ty>::from_le_bytes(raw) as f64
        }
    }};
}

impl<R: Read> ValueSource for BinarySource<R> {
    fn read_scalar(&mut self, ty: ScalarType) -> Result<f64, DecodeError> {
        let mut buf = [0u8; 8];
        let bytes = &mut buf[..ty.width()];
        self.reader.read_exact(bytes)?;
        let big = self.big_endian;

        Ok(match ty {
            ScalarType::Int8 => decode_number!(i8, bytes, big),
            ScalarType::UInt8 => decode_number!(u8, bytes, big),
            ScalarType::Int16 => decode_number!(i16, bytes, big),
            ScalarType::UInt16 => decode_number!(u16, bytes, big),
            ScalarType::Int32 => decode_number!(i32, bytes, big),
            ScalarType::UInt32 => decode_number!(u32, bytes, big),
            ScalarType::Float32 => decode_number!(f32, bytes, big),
            ScalarType::Float64 => decode_number!(f64, bytes, big),
        })
    }

    fn skip_values(&mut self, ty: ScalarType, count: u64) -> Result<(), DecodeError> {
        let len = count
            .checked_mul(ty.width() as u64)
            .ok_or(DecodeError::Truncated)?;
        self.skip_bytes(len)
    }

    fn skip_element(&mut self, element: &ElementDef) -> Result<(), DecodeError> {
        match element.record_width() {
            Some(width) => {
                let len = element
                    .count
                    .checked_mul(width as u64)
                    .ok_or(DecodeError::Truncated)?;
                self.skip_bytes(len)
            }
            None => {
                for _ in 0..element.count {
                    for property in &element.properties {
                        match property.kind {
                            PropertyKind::Scalar(ty) => self.skip_values(ty, 1)?,
                            PropertyKind::List { count, item } => {
                                let len = self.read_list_len(count)?;
                                self.skip_values(item, len)?;
                            }
                        }
                    }
                }
                Ok(())
            }
        }
    }
}
