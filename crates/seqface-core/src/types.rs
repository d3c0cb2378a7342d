use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// One (key, payload) pair pulled out of a container file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    /// Logical file name of the image stored in this record.
    pub key: String,
    /// Raw encoded image bytes.
    pub payload: Vec<u8>,
}

impl ContainerRecord {
    pub fn new(key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }
}

/// Decoded, format-independent pixel grid.
///
/// Pixels are row-major 8-bit RGB triples regardless of the source format,
/// so `pixels().len() == width * height * 3` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    color_depth: u8,
}

impl Raster {
    /// Channels per pixel in `pixels`.
    pub const CHANNELS: usize = 3;

    /// Wrap an RGB8 buffer, checking the dimension invariant.
    pub fn from_rgb8(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(IngestError::Decode(format!(
                "raster dimensions must be positive, got {width}x{height}"
            )));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(Self::CHANNELS))
            .ok_or_else(|| IngestError::Decode(format!("raster {width}x{height} too large")))?;
        if pixels.len() != expected {
            return Err(IngestError::Decode(format!(
                "raster {width}x{height} needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
            color_depth: 8,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bits per channel of `pixels`.
    pub fn color_depth(&self) -> u8 {
        self.color_depth
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGB triple at `(x, y)`, or `None` outside the raster.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        Some([self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]])
    }

    /// BT.601 luma, one byte per pixel.
    pub fn to_luma8(&self) -> Vec<u8> {
        self.pixels
            .chunks_exact(Self::CHANNELS)
            .map(|px| {
                let r = px[0] as u32;
                let g = px[1] as u32;
                let b = px[2] as u32;
                ((r * 77 + g * 150 + b * 29) >> 8) as u8
            })
            .collect()
    }
}

/// Which decoder a record key routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatTag {
    /// PNG, JPEG or GIF, handled by the general-purpose codec.
    StandardRaster,
    /// Raw binary Portable Pixmap (P5/P6).
    PpmRaster,
    /// Matches no known extension.
    Unsupported,
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormatTag::StandardRaster => "standard",
            FormatTag::PpmRaster => "ppm",
            FormatTag::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}

/// Successful detection for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionOutcome {
    pub source_key: String,
    /// Container location the record came from.
    pub container: String,
    /// Zero-based position of the record inside its container.
    pub record_index: u64,
    /// Host that processed the record.
    pub host: String,
    pub face_count: u32,
}

impl DetectionOutcome {
    /// 0 = nothing detected, n = n objects.
    pub fn return_code(&self) -> i64 {
        i64::from(self.face_count)
    }
}

/// Why a record produced no outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Empty payload, undecodable key, or a truncated/corrupt record frame.
    InvalidRecord,
    UnsupportedFormat,
    DecodeError,
    DetectionFailure,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::InvalidRecord => "invalid_record",
            SkipReason::UnsupportedFormat => "unsupported_format",
            SkipReason::DecodeError => "decode_error",
            SkipReason::DetectionFailure => "detection_failure",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&IngestError> for SkipReason {
    fn from(err: &IngestError) -> Self {
        match err {
            IngestError::UnsupportedFormat(_) => SkipReason::UnsupportedFormat,
            IngestError::Decode(_) => SkipReason::DecodeError,
            IngestError::Detection(_) => SkipReason::DetectionFailure,
            _ => SkipReason::InvalidRecord,
        }
    }
}

/// A record that was read but not turned into an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub source_key: String,
    pub container: String,
    pub record_index: u64,
    pub reason: SkipReason,
    pub message: String,
}

impl SkippedRecord {
    /// Negative return code signalling an error for this record.
    pub fn return_code(&self) -> i64 {
        -1
    }
}

/// One entry per record pulled from a container, in reader order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordEntry {
    Detected(DetectionOutcome),
    Skipped(SkippedRecord),
}

impl RecordEntry {
    pub fn source_key(&self) -> &str {
        match self {
            RecordEntry::Detected(o) => &o.source_key,
            RecordEntry::Skipped(s) => &s.source_key,
        }
    }

    pub fn return_code(&self) -> i64 {
        match self {
            RecordEntry::Detected(o) => o.return_code(),
            RecordEntry::Skipped(s) => s.return_code(),
        }
    }
}

/// A location that could not be opened or listed at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationFailure {
    pub location: String,
    pub reason: String,
}

/// Aggregated result of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Every record seen, in container discovery order then reader order.
    pub entries: Vec<RecordEntry>,
    pub failed_locations: Vec<LocationFailure>,
    /// Set when the run was stopped before all records were pulled.
    pub cancelled: bool,
}

impl BatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful outcomes, in order.
    pub fn outcomes(&self) -> impl Iterator<Item = &DetectionOutcome> {
        self.entries.iter().filter_map(|e| match e {
            RecordEntry::Detected(o) => Some(o),
            RecordEntry::Skipped(_) => None,
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = &SkippedRecord> {
        self.entries.iter().filter_map(|e| match e {
            RecordEntry::Skipped(s) => Some(s),
            RecordEntry::Detected(_) => None,
        })
    }

    pub fn outcome_count(&self) -> usize {
        self.outcomes().count()
    }

    pub fn skip_count(&self) -> usize {
        self.skipped().count()
    }

    /// Total objects detected across all outcomes.
    pub fn total_faces(&self) -> u64 {
        self.outcomes().map(|o| u64::from(o.face_count)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.failed_locations.is_empty()
    }

    /// Append another result after this one, keeping both orders.
    pub fn append(&mut self, mut other: BatchResult) {
        self.entries.append(&mut other.entries);
        self.failed_locations.append(&mut other.failed_locations);
        self.cancelled |= other.cancelled;
    }
}
