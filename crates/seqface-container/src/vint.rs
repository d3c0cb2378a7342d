//! Hadoop `WritableUtils` zero-compressed variable-length integers.
//!
//! Values in `-112..=127` take a single byte. Anything else is a length
//! marker byte followed by the big-endian magnitude (one's complement for
//! negative values).

use std::io::{self, Read, Write};

/// Number of bytes (marker included) a VInt starting with `first` occupies.
pub fn decoded_size(first: i8) -> usize {
    if first >= -112 {
        1
    } else if first < -120 {
        (-119 - first as i32) as usize
    } else {
        (-111 - first as i32) as usize
    }
}

fn is_negative(first: i8) -> bool {
    first < -120 || (-112..0).contains(&first)
}

/// Read a VLong from `reader`.
pub fn read_vlong<R: Read>(reader: &mut R) -> io::Result<i64> {
    let mut first = [0u8; 1];
    reader.read_exact(&mut first)?;
    let first = first[0] as i8;
    let len = decoded_size(first);
    if len == 1 {
        return Ok(first as i64);
    }
    let mut buf = [0u8; 8];
    let tail = &mut buf[..len - 1];
    reader.read_exact(tail)?;
    let magnitude = tail.iter().fold(0i64, |acc, &b| (acc << 8) | b as i64);
    Ok(if is_negative(first) {
        magnitude ^ -1
    } else {
        magnitude
    })
}

/// Read a VInt, rejecting values outside `i32`.
pub fn read_vint<R: Read>(reader: &mut R) -> io::Result<i32> {
    let value = read_vlong(reader)?;
    i32::try_from(value).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("vint {value} does not fit in 32 bits"),
        )
    })
}

/// Decode a VInt from the front of `bytes`, returning the value and the
/// number of bytes consumed.
pub fn decode_vint(bytes: &[u8]) -> io::Result<(i32, usize)> {
    let first = *bytes
        .first()
        .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))? as i8;
    let size = decoded_size(first);
    let mut cursor = bytes;
    let value = read_vint(&mut cursor)?;
    Ok((value, size))
}

/// Write `value` as a VLong.
pub fn write_vlong<W: Write>(writer: &mut W, value: i64) -> io::Result<()> {
    if (-112..=127).contains(&value) {
        return writer.write_all(&[value as i8 as u8]);
    }

    let (magnitude, mut marker) = if value < 0 {
        (value ^ -1, -120i32)
    } else {
        (value, -112i32)
    };
    let mut tmp = magnitude;
    while tmp != 0 {
        tmp >>= 8;
        marker -= 1;
    }
    writer.write_all(&[marker as i8 as u8])?;

    let len: i32 = if marker < -120 {
        -(marker + 120)
    } else {
        -(marker + 112)
    };
    for idx in (0..len as u32).rev() {
        writer.write_all(&[((magnitude >> (idx * 8)) & 0xFF) as u8])?;
    }
    Ok(())
}

pub fn write_vint<W: Write>(writer: &mut W, value: i32) -> io::Result<()> {
    write_vlong(writer, value as i64)
}

/// Encoded size of `value` in bytes.
pub fn encoded_size(value: i64) -> usize {
    let mut sink = Vec::with_capacity(9);
    // Writing into a Vec cannot fail.
    let _ = write_vlong(&mut sink, value);
    sink.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: i64) -> Vec<u8> {
        let mut out = Vec::new();
        write_vlong(&mut out, value).unwrap();
        out
    }

    #[test]
    fn small_values_are_one_byte() {
        for v in [-112i64, -1, 0, 1, 127] {
            let bytes = encode(v);
            assert_eq!(bytes.len(), 1, "value {v}");
            assert_eq!(read_vlong(&mut bytes.as_slice()).unwrap(), v);
        }
    }

    #[test]
    fn known_hadoop_encodings() {
        // 128 -> marker -113 (0x8F) then 0x80
        assert_eq!(encode(128), vec![0x8F, 0x80]);
        // 300 -> marker -114 (0x8E) then 0x01 0x2C
        assert_eq!(encode(300), vec![0x8E, 0x01, 0x2C]);
        // -113 -> marker -121 (0x87) then 0x70
        assert_eq!(encode(-113), vec![0x87, 0x70]);
    }

    #[test]
    fn boundary_values_survive() {
        for v in [
            128i64,
            255,
            256,
            65_535,
            65_536,
            -113,
            -256,
            i32::MAX as i64,
            i32::MIN as i64,
            i64::MAX,
            i64::MIN,
        ] {
            let bytes = encode(v);
            assert_eq!(bytes.len(), encoded_size(v));
            assert_eq!(decoded_size(bytes[0] as i8), bytes.len());
            assert_eq!(read_vlong(&mut bytes.as_slice()).unwrap(), v, "value {v}");
        }
    }

    #[test]
    fn vint_rejects_wide_values() {
        let bytes = encode(i64::from(i32::MAX) + 1);
        assert!(read_vint(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn decode_reports_consumed_bytes() {
        let mut bytes = encode(1000);
        bytes.extend_from_slice(b"tail");
        let (value, used) = decode_vint(&bytes).unwrap();
        assert_eq!(value, 1000);
        assert_eq!(&bytes[used..], b"tail");
    }

    #[test]
    fn truncated_input_errors() {
        let bytes = encode(70_000);
        assert!(read_vlong(&mut &bytes[..bytes.len() - 1]).is_err());
        assert!(decode_vint(&[]).is_err());
    }
}
