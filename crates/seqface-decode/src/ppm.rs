//! Raw binary Portable Pixmap / Graymap decoder (`P6` and `P5`).
//!
//! Header: magic, then width, height and maxval as ASCII decimals separated
//! by whitespace or `#` comments, then exactly one whitespace byte before the
//! samples. Samples are one byte when maxval <= 255, otherwise two bytes
//! big-endian. Output is always 8-bit RGB.

use seqface_core::{IngestError, Raster, RasterDecoder, Result};

pub const MAX_MAXVAL: u32 = 65_535;

/// Which raw variant the magic token selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpmKind {
    /// `P6`: three samples per pixel.
    Pixmap,
    /// `P5`: one sample per pixel.
    Graymap,
}

impl PpmKind {
    pub fn channels(&self) -> usize {
        match self {
            PpmKind::Pixmap => 3,
            PpmKind::Graymap => 1,
        }
    }
}

/// Parsed header plus the offset of the first sample byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PpmHeader {
    pub kind: PpmKind,
    pub width: u32,
    pub height: u32,
    pub maxval: u32,
    pub data_offset: usize,
}

impl PpmHeader {
    pub fn bytes_per_sample(&self) -> usize {
        if self.maxval <= 255 {
            1
        } else {
            2
        }
    }

    /// Sample bytes required after the header.
    pub fn data_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.kind.channels())?
            .checked_mul(self.bytes_per_sample())
    }
}

fn decode_err(msg: impl Into<String>) -> IngestError {
    IngestError::Decode(format!("ppm: {}", msg.into()))
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Skip whitespace and `#` comments (up to and including the line end).
    fn skip_separators(&mut self) {
        while let Some(b) = self.peek() {
            if is_whitespace(b) {
                self.pos += 1;
            } else if b == b'#' {
                while let Some(c) = self.peek() {
                    self.pos += 1;
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn read_uint(&mut self, field: &str) -> Result<u32> {
        self.skip_separators();
        let start = self.pos;
        let mut value: u32 = 0;
        while let Some(b) = self.peek().filter(u8::is_ascii_digit) {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add((b - b'0') as u32))
                .ok_or_else(|| decode_err(format!("{field} is too large")))?;
            self.pos += 1;
        }
        if self.pos == start {
            return Err(match self.peek() {
                None => decode_err(format!("header ends before {field}")),
                Some(b) => decode_err(format!("expected {field}, found byte 0x{b:02x}")),
            });
        }
        Ok(value)
    }
}

/// Parse and validate the header at the start of `bytes`.
pub fn parse_header(bytes: &[u8]) -> Result<PpmHeader> {
    let kind = match bytes.get(..2) {
        Some(b"P6") => PpmKind::Pixmap,
        Some(b"P5") => PpmKind::Graymap,
        Some([b'P', v @ b'1'..=b'4']) => {
            return Err(decode_err(format!(
                "variant P{} is not supported, only raw P5/P6",
                *v as char
            )))
        }
        _ => return Err(decode_err("unrecognized magic token")),
    };

    let mut cursor = Cursor { bytes, pos: 2 };
    match cursor.peek() {
        Some(b) if is_whitespace(b) || b == b'#' => {}
        Some(_) => return Err(decode_err("magic token must be followed by whitespace")),
        None => return Err(decode_err("header ends after magic token")),
    }

    let width = cursor.read_uint("width")?;
    let height = cursor.read_uint("height")?;
    let maxval = cursor.read_uint("maxval")?;

    if width == 0 || height == 0 {
        return Err(decode_err(format!(
            "dimensions must be positive, got {width}x{height}"
        )));
    }
    if maxval == 0 || maxval > MAX_MAXVAL {
        return Err(decode_err(format!("maxval {maxval} outside 1..=65535")));
    }

    match cursor.peek() {
        Some(b) if is_whitespace(b) => cursor.pos += 1,
        Some(b) => {
            return Err(decode_err(format!(
                "expected one whitespace byte after maxval, found 0x{b:02x}"
            )))
        }
        None => return Err(decode_err("header ends after maxval")),
    }

    Ok(PpmHeader {
        kind,
        width,
        height,
        maxval,
        data_offset: cursor.pos,
    })
}

/// Decode a raw P5/P6 payload into an RGB8 raster.
pub fn decode(bytes: &[u8]) -> Result<Raster> {
    let header = parse_header(bytes)?;
    let needed = header
        .data_len()
        .ok_or_else(|| decode_err(format!("{}x{} is too large", header.width, header.height)))?;
    let available = bytes.len() - header.data_offset;
    if available < needed {
        return Err(decode_err(format!(
            "payload too short: {needed} sample bytes required, {available} present"
        )));
    }
    let data = &bytes[header.data_offset..header.data_offset + needed];

    let maxval = header.maxval;
    let scale = |sample: u32| -> u8 {
        if maxval == 255 {
            sample.min(255) as u8
        } else {
            let sample = sample.min(maxval);
            ((sample * 255 + maxval / 2) / maxval) as u8
        }
    };

    let bps = header.bytes_per_sample();
    let samples = data.chunks_exact(bps).map(|c| {
        if bps == 1 {
            c[0] as u32
        } else {
            (c[0] as u32) << 8 | c[1] as u32
        }
    });

    let pixel_count = header.width as usize * header.height as usize;
    let mut pixels = Vec::with_capacity(pixel_count * Raster::CHANNELS);
    match header.kind {
        PpmKind::Pixmap => pixels.extend(samples.map(scale)),
        PpmKind::Graymap => {
            for gray in samples.map(scale) {
                pixels.extend_from_slice(&[gray, gray, gray]);
            }
        }
    }

    Raster::from_rgb8(header.width, header.height, pixels)
}

/// Encode a raster as a raw `P6` image with maxval 255.
pub fn encode(raster: &Raster) -> Vec<u8> {
    let header = format!("P6\n{} {}\n255\n", raster.width(), raster.height());
    let mut out = Vec::with_capacity(header.len() + raster.pixels().len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(raster.pixels());
    out
}

/// [`RasterDecoder`] for raw PPM/PGM payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct PpmDecoder;

impl RasterDecoder for PpmDecoder {
    fn name(&self) -> &str {
        "ppm"
    }

    fn decode(&self, payload: &[u8]) -> Result<Raster> {
        decode(payload)
    }
}
