use std::collections::HashMap;
use std::fs;
use std::io::{self, BufReader, Read};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use seqface_core::{IngestError, Result};

use crate::location::{Location, Scheme};
use crate::sequence::SequenceFileReader;

/// Storage settings passed explicitly to [`Storage::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base URI that bare absolute paths resolve against,
    /// e.g. `hdfs://master:8020`. `None` keeps bare paths local.
    pub default_fs: Option<String>,
    /// Read buffer size for container streams, in bytes.
    pub buffer_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_fs: None,
            buffer_size: 64 * 1024,
        }
    }
}

/// Client for one storage family (local disk, HDFS, S3, ...).
///
/// Authentication, retries and connection management belong to the
/// implementation; the ingestion core only opens streams and lists
/// directories through this seam.
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Open a byte stream over the container at `location`.
    fn open(&self, location: &Location) -> io::Result<Box<dyn Read + Send>>;

    /// Enumerate non-empty, non-symlink files under `location` whose name ends
    /// with `extension`, in a stable order. A file location lists as itself.
    fn list(&self, location: &Location, extension: &str) -> io::Result<Vec<Location>>;
}

/// Local filesystem backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl StorageBackend for LocalFs {
    fn name(&self) -> &str {
        "local"
    }

    fn open(&self, location: &Location) -> io::Result<Box<dyn Read + Send>> {
        let path = local_path(location)?;
        Ok(Box::new(fs::File::open(path)?))
    }

    fn list(&self, location: &Location, extension: &str) -> io::Result<Vec<Location>> {
        let path = local_path(location)?;
        let meta = fs::metadata(&path)?;
        if !meta.is_dir() {
            return Ok(vec![location.clone()]);
        }

        let mut found = Vec::new();
        for entry in fs::read_dir(&path)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_symlink() || !file_type.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(extension) {
                continue;
            }
            let len = entry.metadata()?.len();
            if len == 0 {
                tracing::debug!(file = %name, "skipping empty container");
                continue;
            }
            tracing::debug!(file = %name, len, "discovered container");
            found.push(name);
        }
        found.sort();

        Ok(found.iter().map(|name| location.join(name)).collect())
    }
}

fn local_path(location: &Location) -> io::Result<std::path::PathBuf> {
    location.to_path().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{location} is not a local location"),
        )
    })
}

/// Registry of storage backends keyed by scheme, plus the storage settings.
pub struct Storage {
    config: StorageConfig,
    backends: HashMap<Scheme, Arc<dyn StorageBackend>>,
}

impl Storage {
    /// Create a registry with the local filesystem backend installed.
    pub fn new(config: StorageConfig) -> Self {
        let mut backends: HashMap<Scheme, Arc<dyn StorageBackend>> = HashMap::new();
        backends.insert(Scheme::Local, Arc::new(LocalFs));
        Self { config, backends }
    }

    /// Register (or replace) the client used for `scheme`.
    pub fn with_backend(mut self, scheme: Scheme, backend: Arc<dyn StorageBackend>) -> Self {
        self.backends.insert(scheme, backend);
        self
    }

    /// Parse `uri` using the configured default filesystem.
    pub fn resolve(&self, uri: &str) -> Result<Location> {
        Location::parse(uri, self.config.default_fs.as_deref())
    }

    fn backend(&self, location: &Location) -> Result<&Arc<dyn StorageBackend>> {
        self.backends.get(&location.scheme()).ok_or_else(|| {
            IngestError::storage(
                location.as_str(),
                format!("no storage client registered for {} locations", location.scheme()),
            )
        })
    }

    /// Enumerate candidate containers under `location`.
    pub fn list(&self, location: &Location, extension: &str) -> Result<Vec<Location>> {
        let backend = self.backend(location)?;
        backend
            .list(location, extension)
            .map_err(|e| IngestError::storage(location.as_str(), e))
    }

    /// Open the raw byte stream of a container.
    pub fn open_stream(&self, location: &Location) -> Result<Box<dyn Read + Send>> {
        let backend = self.backend(location)?;
        tracing::debug!(location = %location, backend = backend.name(), "opening container");
        backend
            .open(location)
            .map_err(|e| IngestError::storage(location.as_str(), e))
    }

    /// Open a container and parse its header, ready to pull records.
    pub fn open_container(
        &self,
        location: &Location,
    ) -> Result<SequenceFileReader<BufReader<Box<dyn Read + Send>>>> {
        let stream = self.open_stream(location)?;
        let reader = BufReader::with_capacity(self.config.buffer_size.max(1), stream);
        SequenceFileReader::new(reader)
            .map_err(|e| IngestError::storage(location.as_str(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unreachable;

    impl StorageBackend for Unreachable {
        fn name(&self) -> &str {
            "unreachable"
        }

        fn open(&self, _location: &Location) -> io::Result<Box<dyn Read + Send>> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "namenode down"))
        }

        fn list(&self, _location: &Location, _extension: &str) -> io::Result<Vec<Location>> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "namenode down"))
        }
    }

    #[test]
    fn lists_matching_non_empty_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.seq"), b"x").unwrap();
        fs::write(dir.path().join("a.seq"), b"x").unwrap();
        fs::write(dir.path().join("empty.seq"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("sub.seq")).unwrap();

        let storage = Storage::new(StorageConfig::default());
        let loc = Location::local(dir.path());
        let found = storage.list(&loc, "seq").unwrap();
        let names: Vec<_> = found.iter().map(|l| l.file_name().to_string()).collect();
        assert_eq!(names, ["a.seq", "b.seq"]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_listed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("real.seq"), b"x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.seq"), dir.path().join("link.seq"))
            .unwrap();

        let found = LocalFs.list(&Location::local(dir.path()), "seq").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_name(), "real.seq");
    }

    #[test]
    fn file_location_lists_as_itself() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("one.bin");
        fs::write(&file, b"x").unwrap();
        let loc = Location::local(&file);
        assert_eq!(LocalFs.list(&loc, "seq").unwrap(), vec![loc]);
    }

    #[test]
    fn missing_backend_is_storage_unavailable() {
        let storage = Storage::new(StorageConfig::default());
        let loc = storage.resolve("hdfs://master:8020/a.seq").unwrap();
        let err = storage.open_stream(&loc).err().unwrap();
        assert!(matches!(err, IngestError::StorageUnavailable { .. }));
    }

    #[test]
    fn backend_errors_map_to_storage_unavailable() {
        let storage = Storage::new(StorageConfig::default())
            .with_backend(Scheme::Hdfs, Arc::new(Unreachable));
        let loc = storage.resolve("hdfs://master:8020/dir").unwrap();
        assert!(matches!(
            storage.list(&loc, "seq"),
            Err(IngestError::StorageUnavailable { .. })
        ));
        assert!(matches!(
            storage.open_container(&loc),
            Err(IngestError::StorageUnavailable { .. })
        ));
    }

    #[test]
    fn missing_local_file_is_storage_unavailable() {
        let storage = Storage::new(StorageConfig::default());
        let loc = Location::local("/definitely/not/here.seq");
        assert!(matches!(
            storage.open_container(&loc),
            Err(IngestError::StorageUnavailable { .. })
        ));
    }
}
