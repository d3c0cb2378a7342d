use serde::{Deserialize, Serialize};

/// Tuning for the face detection backend.
///
/// Defaults match the settings the SeetaFace frontal model is usually run
/// with: 20px minimum face, score threshold 2.0, 0.8 pyramid step, 4px
/// sliding window stride.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Path to the SeetaFace model file (`seeta_fd_frontal_v1.0.bin`).
    pub model_path: Option<String>,
    /// Smallest face, in pixels, the detector searches for.
    pub min_face_size: u32,
    /// Classifier score a window needs to count as a face.
    pub score_threshold: f64,
    /// Scale step between image pyramid levels (0, 1).
    pub pyramid_scale_factor: f32,
    /// Sliding window stride (x, y) in pixels.
    pub slide_window_step: (u32, u32),
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            min_face_size: 20,
            score_threshold: 2.0,
            pyramid_scale_factor: 0.8,
            slide_window_step: (4, 4),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: DetectorConfig =
            serde_json::from_str(r#"{"model_path": "models/seeta.bin", "min_face_size": 32}"#)
                .unwrap();
        assert_eq!(cfg.model_path.as_deref(), Some("models/seeta.bin"));
        assert_eq!(cfg.min_face_size, 32);
        assert_eq!(cfg.slide_window_step, (4, 4));
        assert!((cfg.score_threshold - 2.0).abs() < f64::EPSILON);
    }
}
