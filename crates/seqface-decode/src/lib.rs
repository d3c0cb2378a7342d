pub mod classify;
pub mod image;
pub mod ppm;

pub use self::image::StandardDecoder;
pub use classify::classify;
pub use ppm::PpmDecoder;

use std::fmt;
use std::sync::Arc;

use seqface_core::{ContainerRecord, FormatTag, IngestError, Raster, RasterDecoder, Result};

/// Unified decoder that routes each record to the decoder its key selects.
///
/// Both slots default to the built-in decoders and can be replaced, which is
/// how callers plug in an alternative codec.
#[derive(Clone)]
pub struct Decoder {
    standard: Arc<dyn RasterDecoder>,
    ppm: Arc<dyn RasterDecoder>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            standard: Arc::new(StandardDecoder::new()),
            ppm: Arc::new(PpmDecoder),
        }
    }
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("standard", &self.standard.name())
            .field("ppm", &self.ppm.name())
            .finish()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the decoder used for PNG/JPEG/GIF keys.
    pub fn with_standard(mut self, decoder: Arc<dyn RasterDecoder>) -> Self {
        self.standard = decoder;
        self
    }

    /// Replace the decoder used for PPM keys.
    pub fn with_ppm(mut self, decoder: Arc<dyn RasterDecoder>) -> Self {
        self.ppm = decoder;
        self
    }

    /// Decoder for a classified record, or `None` for unsupported keys.
    pub fn decoder_for(&self, tag: FormatTag) -> Option<&dyn RasterDecoder> {
        match tag {
            FormatTag::StandardRaster => Some(self.standard.as_ref()),
            FormatTag::PpmRaster => Some(self.ppm.as_ref()),
            FormatTag::Unsupported => None,
        }
    }

    /// Classify `record` by key and decode its payload.
    ///
    /// Unsupported keys fail with `UnsupportedFormat` without touching the
    /// payload; malformed payloads fail with `Decode`.
    pub fn decode(&self, record: &ContainerRecord) -> Result<(FormatTag, Raster)> {
        let tag = classify(&record.key);
        let decoder = self
            .decoder_for(tag)
            .ok_or_else(|| IngestError::UnsupportedFormat(record.key.clone()))?;
        let raster = decoder.decode(&record.payload)?;
        tracing::debug!(
            key = %record.key,
            decoder = decoder.name(),
            width = raster.width(),
            height = raster.height(),
            "decoded record"
        );
        Ok((tag, raster))
    }
}
