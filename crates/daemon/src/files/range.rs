//! HTTP `Range` header parsing for single byte ranges.

/// Outcome of matching a `Range` header against a file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No usable range; serve the whole file.
    Full,
    /// Inclusive byte span within the file.
    Partial { start: u64, end: u64 },
    /// The range cannot be satisfied for this size.
    Unsatisfiable,
}

impl RangeRequest {
    /// Parse a `Range` header value against the current file size.
    ///
    /// Malformed headers, non-byte units and multi-range requests are
    /// ignored and yield [`RangeRequest::Full`], which HTTP permits.
    pub fn parse(header: Option<&str>, size: u64) -> Self {
        let Some(header) = header else {
            return Self::Full;
        };
        let Some(spec) = header.trim().strip_prefix("bytes=") else {
            return Self::Full;
        };
        if spec.contains(',') {
            return Self::Full;
        }
        let Some((first, last)) = spec.trim().split_once('-') else {
            return Self::Full;
        };
        let (first, last) = (first.trim(), last.trim());

        if first.is_empty() {
            // Suffix form: the last N bytes.
            let Ok(suffix) = last.parse::<u64>() else {
                return Self::Full;
            };
            if suffix == 0 || size == 0 {
                return Self::Unsatisfiable;
            }
            let start = size.saturating_sub(suffix);
            return Self::Partial {
                start,
                end: size - 1,
            };
        }

        let Ok(start) = first.parse::<u64>() else {
            return Self::Full;
        };
        let end = if last.is_empty() {
            None
        } else {
            match last.parse::<u64>() {
                Ok(end) if end >= start => Some(end),
                _ => return Self::Full,
            }
        };

        if start >= size {
            return Self::Unsatisfiable;
        }

        let end = end.map_or(size - 1, |end| end.min(size - 1));
        Self::Partial { start, end }
    }
}
