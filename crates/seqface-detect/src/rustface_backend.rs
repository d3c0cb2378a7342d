use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use seqface_core::{IngestError, ObjectDetector, Raster, Result};

use crate::config::DetectorConfig;

/// Face counter backed by the `rustface` crate (SeetaFace engine).
///
/// The model is loaded once; each call builds a detector from a clone of it,
/// so one instance can be shared across worker threads.
pub struct RustfaceDetector {
    model: rustface::Model,
    config: DetectorConfig,
}

impl RustfaceDetector {
    /// Load the model named by `config.model_path`.
    pub fn from_config(config: DetectorConfig) -> Result<Self> {
        let path = config.model_path.clone().ok_or_else(|| {
            IngestError::Config("detector.model_path is required for face detection".into())
        })?;
        Self::from_path(path, config)
    }

    pub fn from_path(path: impl AsRef<Path>, config: DetectorConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            IngestError::Config(format!("cannot open face model {}: {e}", path.display()))
        })?;
        tracing::info!(model = %path.display(), "loading SeetaFace model");
        Self::from_reader(BufReader::new(file), config)
    }

    pub fn from_reader<R: Read>(reader: R, config: DetectorConfig) -> Result<Self> {
        let model = rustface::read_model(reader)
            .map_err(|e| IngestError::Config(format!("invalid face model: {e}")))?;
        Ok(Self { model, config })
    }
}

impl ObjectDetector for RustfaceDetector {
    fn name(&self) -> &str {
        "rustface"
    }

    fn detect(&self, raster: &Raster) -> Result<i64> {
        let gray = raster.to_luma8();
        let width = raster.width();
        let height = raster.height();

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.config.min_face_size);
        detector.set_score_thresh(self.config.score_threshold);
        detector.set_pyramid_scale_factor(self.config.pyramid_scale_factor);
        let (step_x, step_y) = self.config.slide_window_step;
        detector.set_slide_window_step(step_x, step_y);

        let faces = detector.detect(&rustface::ImageData::new(&gray, width, height));

        for face in &faces {
            let bbox = face.bbox();
            tracing::debug!(
                x = bbox.x(),
                y = bbox.y(),
                w = bbox.width(),
                h = bbox.height(),
                score = face.score(),
                "face"
            );
        }
        tracing::debug!(width, height, faces = faces.len(), "face detection complete");

        Ok(faces.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_path_is_config_error() {
        let err = RustfaceDetector::from_config(DetectorConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn unreadable_model_file_is_config_error() {
        let err = RustfaceDetector::from_path("/no/such/model.bin", DetectorConfig::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("/no/such/model.bin"));
    }

    #[test]
    fn empty_model_is_rejected() {
        let result = RustfaceDetector::from_reader(&b""[..], DetectorConfig::default());
        assert!(matches!(result, Err(IngestError::Config(_))));
    }
}
