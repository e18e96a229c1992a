use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::varint;

/// Append-only sequence of strictly increasing u32 values, stored as varint
/// deltas over the preceding value.
///
/// In memory the delta stream is followed by a plain 4-byte copy of the last
/// absolute value so that appending does not require re-scanning. The
/// serialized form strips that tail; it is rebuilt on load.
#[derive(Debug, Default, Clone)]
pub struct UintVector {
    // Delta varints, then 4 bytes holding the last absolute value.
    // Empty when no value has been appended.
    data: Vec<u8>,
    len: usize,
}

impl UintVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of values appended.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends a value. The value must be strictly greater than the last one
    /// appended and the gap must fit a 4-byte varint.
    pub fn append(&mut self, value: u32) -> Result<()> {
        if self.data.is_empty() {
            if value > varint::MAX_VALUE {
                return Err(Error::Precondition(format!(
                    "value {value} exceeds the varint range"
                )));
            }
            self.push_delta(value);
            self.push_tail(value);
            self.len = 1;
            return Ok(());
        }

        let last = self.pop_tail();
        if value <= last {
            self.push_tail(last);
            return Err(Error::Precondition(format!(
                "uint vector values must increase: {value} after {last}"
            )));
        }
        let delta = value - last;
        if delta > varint::MAX_VALUE {
            self.push_tail(last);
            return Err(Error::Precondition(format!(
                "delta {delta} exceeds the varint range"
            )));
        }
        self.push_delta(delta);
        self.push_tail(value);
        self.len += 1;
        Ok(())
    }

    /// Reconstructs the full sequence.
    pub fn unpack(&self) -> Vec<u32> {
        let mut values = Vec::with_capacity(self.len);
        if self.data.is_empty() {
            return values;
        }
        let deltas = &self.data[..self.data.len() - 4];
        let mut offset = 0;
        let mut value = 0u32;
        while offset < deltas.len() {
            let (delta, nbytes) =
                varint::read(&deltas[offset..]).expect("in-memory delta stream is well-formed");
            offset += nbytes;
            value = if values.is_empty() { delta } else { value + delta };
            values.push(value);
        }
        values
    }

    /// The last value appended, if any.
    pub fn last(&self) -> Option<u32> {
        if self.data.is_empty() {
            return None;
        }
        let tail = &self.data[self.data.len() - 4..];
        Some(u32::from_le_bytes(tail.try_into().expect("tail is 4 bytes")))
    }

    /// Writes `[payload_len: u32][delta varints]`, without the absolute tail.
    pub fn serialize_into<W: Write>(&self, writer: &mut W) -> Result<()> {
        let payload_len = self.data.len().saturating_sub(4);
        writer.write_u32::<LittleEndian>(payload_len as u32)?;
        writer.write_all(&self.data[..payload_len])?;
        Ok(())
    }

    /// Reads the form written by [`serialize_into`](Self::serialize_into),
    /// rebuilding the in-memory absolute tail.
    pub fn deserialize_from<R: Read>(reader: &mut R) -> Result<Self> {
        let payload_len = reader.read_u32::<LittleEndian>()? as usize;
        let mut data = vec![0u8; payload_len];
        reader.read_exact(&mut data)?;

        // Walk the deltas to recover the count and the last absolute value.
        let mut offset = 0;
        let mut len = 0;
        let mut value = 0u32;
        while offset < payload_len {
            let (delta, nbytes) = varint::read(&data[offset..]).ok_or_else(|| {
                Error::Corrupted("truncated varint in uint vector payload".into())
            })?;
            offset += nbytes;
            value = if len == 0 { delta } else { value.checked_add(delta).ok_or_else(|| {
                Error::Corrupted("uint vector delta overflows u32".into())
            })? };
            len += 1;
        }
        let mut vector = Self { data, len };
        if len > 0 {
            vector.push_tail(value);
        }
        Ok(vector)
    }

    fn push_delta(&mut self, delta: u32) {
        let mut buf = [0u8; 4];
        let nbytes = varint::write(delta, &mut buf);
        self.data.extend_from_slice(&buf[..nbytes]);
    }

    fn push_tail(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    fn pop_tail(&mut self) -> u32 {
        let at = self.data.len() - 4;
        let tail = &self.data[at..];
        let value = u32::from_le_bytes(tail.try_into().expect("tail is 4 bytes"));
        self.data.truncate(at);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_unpack() {
        let mut vector = UintVector::new();
        let values = [0u32, 1, 2, 100, 10_000, 5_000_000, 5_000_001];
        for &value in &values {
            vector.append(value).unwrap();
        }
        assert_eq!(vector.unpack(), values);
        assert_eq!(vector.len(), values.len());
        assert_eq!(vector.last(), Some(5_000_001));
    }

    #[test]
    fn test_empty() {
        let vector = UintVector::new();
        assert!(vector.is_empty());
        assert!(vector.unpack().is_empty());
        assert_eq!(vector.last(), None);
    }

    #[test]
    fn test_rejects_non_increasing() {
        let mut vector = UintVector::new();
        vector.append(10).unwrap();
        assert!(vector.append(10).is_err());
        assert!(vector.append(3).is_err());
        // A failed append leaves the vector usable.
        vector.append(11).unwrap();
        assert_eq!(vector.unpack(), [10, 11]);
    }

    #[test]
    fn test_rejects_oversized_gap() {
        let mut vector = UintVector::new();
        vector.append(0).unwrap();
        assert!(vector.append(varint::MAX_VALUE + 1).is_err());
        vector.append(varint::MAX_VALUE).unwrap();
        assert_eq!(vector.unpack(), [0, varint::MAX_VALUE]);
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut vector = UintVector::new();
        for value in (0..1000u32).map(|i| i * 7) {
            vector.append(value).unwrap();
        }

        let mut buf = Vec::new();
        vector.serialize_into(&mut buf).unwrap();
        // The 4-byte absolute tail is stripped on serialize.
        assert_eq!(buf.len(), 4 + vector.data.len() - 4);

        let restored = UintVector::deserialize_from(&mut buf.as_slice()).unwrap();
        assert_eq!(restored.unpack(), vector.unpack());
        assert_eq!(restored.last(), vector.last());

        // The restored vector accepts further appends.
        let mut restored = restored;
        restored.append(7 * 1000).unwrap();
        assert_eq!(restored.len(), 1001);
    }

    #[test]
    fn test_serialize_empty() {
        let vector = UintVector::new();
        let mut buf = Vec::new();
        vector.serialize_into(&mut buf).unwrap();
        assert_eq!(buf, 0u32.to_le_bytes());
        let restored = UintVector::deserialize_from(&mut buf.as_slice()).unwrap();
        assert!(restored.is_empty());
    }

    #[test]
    fn test_deserialize_truncated_payload() {
        let mut vector = UintVector::new();
        vector.append(1 << 20).unwrap();
        let mut buf = Vec::new();
        vector.serialize_into(&mut buf).unwrap();
        buf.truncate(buf.len() - 1);
        // The payload header now promises more bytes than present.
        assert!(UintVector::deserialize_from(&mut buf.as_slice()).is_err());
    }
}
