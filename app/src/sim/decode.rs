//! Schema-aware telemetry payload reader.
//!
//! Payloads arrive as packed little-endian bytes laid out exactly as the
//! registered data model describes. Each variable position has an explicit
//! kind and stride; consumers read fields in schema order.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use super::VarKind;

/// Fixed stride of a variable kind, or `None` for variable-length kinds.
pub fn stride(kind: VarKind) -> Option<usize> {
    match kind {
        VarKind::I32 | VarKind::F32 => Some(4),
        VarKind::I64 | VarKind::F64 => Some(8),
        VarKind::Str8 => Some(8),
        VarKind::Str32 => Some(32),
        VarKind::Str64 => Some(64),
        VarKind::Str128 => Some(128),
        VarKind::Str256 => Some(256),
        VarKind::Str260 => Some(260),
        VarKind::StrV => None,
        VarKind::LatLonAlt | VarKind::Xyz => Some(24),
        VarKind::InitPosition => Some(56),
        VarKind::MarkerState => Some(68),
        VarKind::Waypoint => Some(48),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncated {
    pub need: usize,
    pub have: usize,
}

impl fmt::Display for Truncated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "telemetry payload truncated: need {} bytes, have {}",
            self.need, self.have
        )
    }
}

impl std::error::Error for Truncated {}

/// Sequential reader over one telemetry payload.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Truncated> {
        let end = self.pos.checked_add(len).ok_or(Truncated {
            need: len,
            have: self.buf.len() - self.pos,
        })?;
        if end > self.buf.len() {
            return Err(Truncated {
                need: len,
                have: self.buf.len() - self.pos,
            });
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn i32(&mut self) -> Result<i32, Truncated> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn i64(&mut self) -> Result<i64, Truncated> {
        Ok(LittleEndian::read_i64(self.take(8)?))
    }

    pub fn f32(&mut self) -> Result<f32, Truncated> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    pub fn f64(&mut self) -> Result<f64, Truncated> {
        Ok(LittleEndian::read_f64(self.take(8)?))
    }

    /// Fixed-width string field: NUL-terminated within `width` bytes.
    pub fn str_fixed(&mut self, width: usize) -> Result<String, Truncated> {
        let raw = self.take(width)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_str(buf: &mut Vec<u8>, s: &str, width: usize) {
        let bytes = s.as_bytes();
        buf.extend_from_slice(&bytes[..bytes.len().min(width)]);
        buf.resize(buf.len() + width.saturating_sub(bytes.len()), 0);
    }

    #[test]
    fn reads_in_schema_order() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&13.4f64.to_le_bytes());
        payload.extend_from_slice(&(-2500i32).to_le_bytes());
        put_str(&mut payload, "DLH123", 32);

        let mut rd = Reader::new(&payload);
        assert_eq!(rd.f64().unwrap(), 13.4);
        assert_eq!(rd.i32().unwrap(), -2500);
        assert_eq!(rd.str_fixed(32).unwrap(), "DLH123");
        assert_eq!(rd.remaining(), 0);
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let payload = [0u8; 6];
        let mut rd = Reader::new(&payload);
        rd.i32().unwrap();
        let err = rd.f64().unwrap_err();
        assert_eq!(err, Truncated { need: 8, have: 2 });
    }

    #[test]
    fn unterminated_string_uses_full_width() {
        let payload = *b"ABCDEFGH";
        let mut rd = Reader::new(&payload);
        assert_eq!(rd.str_fixed(8).unwrap(), "ABCDEFGH");
    }

    #[test]
    fn strides_match_wire_layout() {
        assert_eq!(stride(VarKind::I32), Some(4));
        assert_eq!(stride(VarKind::F64), Some(8));
        assert_eq!(stride(VarKind::Str260), Some(260));
        assert_eq!(stride(VarKind::StrV), None);
        assert_eq!(stride(VarKind::LatLonAlt), Some(24));
    }
}
