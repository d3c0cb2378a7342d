use std::path::Path;

use serde::{Deserialize, Serialize};

use seqface_container::StorageConfig;
use seqface_core::{IngestError, Result};
use seqface_detect::DetectorConfig;

/// Configuration for a batch ingestion run.
///
/// Loaded from JSON (every field optional) and then overridden by CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Suffix a file name must end with to be picked up when a directory
    /// location is enumerated.
    pub extension: String,
    /// Containers processed at once by the concurrent driver.
    pub workers: usize,
    /// Label attached to every outcome and log line. Defaults to the machine's
    /// host name.
    pub host_label: String,
    pub storage: StorageConfig,
    pub detector: DetectorConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            extension: "seq".to_string(),
            workers: 4,
            host_label: default_host_label(),
            storage: StorageConfig::default(),
            detector: DetectorConfig::default(),
        }
    }
}

impl BatchConfig {
    /// Preset for a cluster where bare paths live on HDFS, e.g.
    /// `hdfs://namenode:8020`.
    pub fn hdfs(default_fs: impl Into<String>) -> Self {
        Self {
            storage: StorageConfig {
                default_fs: Some(default_fs.into()),
                ..StorageConfig::default()
            },
            ..Self::default()
        }
    }

    /// Read a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            IngestError::Config(format!("invalid config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(IngestError::Config("workers must be at least 1".into()));
        }
        if self.storage.buffer_size == 0 {
            return Err(IngestError::Config("storage.buffer_size must be non-zero".into()));
        }
        Ok(())
    }
}

/// Machine name as reported by the OS, or `localhost` when it cannot be
/// resolved to UTF-8.
fn default_host_label() -> String {
    match gethostname::gethostname().into_string() {
        Ok(name) if !name.is_empty() => name,
        other => {
            tracing::warn!(hostname = ?other, "cannot resolve host name, using localhost");
            "localhost".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        let cfg = BatchConfig::default();
        assert_eq!(cfg.extension, "seq");
        assert_eq!(cfg.workers, 4);
        assert!(!cfg.host_label.is_empty());
        assert!(cfg.storage.default_fs.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn host_label_comes_from_the_os_not_the_environment() {
        std::env::set_var("HOSTNAME", "seqface-env-only-label");
        let label = BatchConfig::default().host_label;
        std::env::remove_var("HOSTNAME");

        assert_ne!(label, "seqface-env-only-label");
        let expected = gethostname::gethostname()
            .into_string()
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string());
        assert_eq!(label, expected);
    }

    #[test]
    fn hdfs_preset_sets_default_fs() {
        let cfg = BatchConfig::hdfs("hdfs://namenode:8020");
        assert_eq!(cfg.storage.default_fs.as_deref(), Some("hdfs://namenode:8020"));
        assert_eq!(cfg.workers, 4);
    }

    #[test]
    fn load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"workers": 2, "host_label": "node-7", "detector": {{"min_face_size": 40}}}}"#
        )
        .unwrap();

        let cfg = BatchConfig::load(file.path()).unwrap();
        assert_eq!(cfg.workers, 2);
        assert_eq!(cfg.host_label, "node-7");
        assert_eq!(cfg.extension, "seq");
        assert_eq!(cfg.detector.min_face_size, 40);
    }

    #[test]
    fn load_rejects_zero_workers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"workers": 0}}"#).unwrap();
        let err = BatchConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn load_missing_file() {
        let err = BatchConfig::load("/no/such/seqface.json").unwrap_err();
        assert!(err.to_string().contains("/no/such/seqface.json"));
    }
}
