use crate::error::Result;
use crate::types::Raster;

/// Turns an encoded payload into a canonical [`Raster`].
///
/// Implementations fail with [`crate::IngestError::Decode`] when the bytes
/// are not valid for the format they handle.
pub trait RasterDecoder: Send + Sync {
    /// Human-readable name for tracing.
    fn name(&self) -> &str;

    fn decode(&self, payload: &[u8]) -> Result<Raster>;
}

/// External object-detection collaborator (faces, eyes, ...).
///
/// Returns the number of objects found. A negative count is treated as a
/// detection failure by the batch driver, as is a returned error.
pub trait ObjectDetector: Send + Sync {
    /// Human-readable name for tracing.
    fn name(&self) -> &str;

    fn detect(&self, raster: &Raster) -> Result<i64>;
}
