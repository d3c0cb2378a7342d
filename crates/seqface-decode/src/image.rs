use image::ImageFormat;

use seqface_core::{IngestError, Raster, RasterDecoder, Result};

/// Decodes PNG, JPEG and GIF payloads through the `image` crate.
///
/// The container format is sniffed from magic bytes rather than trusted from
/// the record key; anything outside those three fails as a decode error.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardDecoder;

impl StandardDecoder {
    pub fn new() -> Self {
        Self
    }

    fn sniff(data: &[u8]) -> Result<ImageFormat> {
        let format =
            image::guess_format(data).map_err(|e| IngestError::Decode(e.to_string()))?;
        match format {
            ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif => Ok(format),
            other => Err(IngestError::Decode(format!(
                "unsupported internal encoding {other:?}"
            ))),
        }
    }
}

impl RasterDecoder for StandardDecoder {
    fn name(&self) -> &str {
        "standard"
    }

    fn decode(&self, payload: &[u8]) -> Result<Raster> {
        let format = Self::sniff(payload)?;
        let img = image::load_from_memory_with_format(payload, format)
            .map_err(|e| IngestError::Decode(e.to_string()))?;

        let rgb = img.to_rgb8();
        let width = rgb.width();
        let height = rgb.height();
        tracing::trace!(?format, width, height, "decoded standard raster");

        Raster::from_rgb8(width, height, rgb.into_raw())
    }
}
