pub mod location;
pub mod sequence;
pub mod storage;
pub mod vint;

pub use location::{Location, Scheme};
pub use sequence::{RecordError, SequenceFileHeader, SequenceFileReader, SequenceFileWriter};
pub use storage::{LocalFs, Storage, StorageBackend, StorageConfig};

use std::io::{BufReader, Read};

use seqface_core::Result;

/// Record cursor over a container opened through [`Storage`].
pub type ContainerReader = SequenceFileReader<BufReader<Box<dyn Read + Send>>>;

/// Resolve `uri` and open it as a container.
///
/// Fails with `StorageUnavailable` when the scheme is unrecognized, no client
/// is registered for it, the store cannot be reached, or the header is not a
/// readable container.
pub fn open(storage: &Storage, uri: &str) -> Result<ContainerReader> {
    let location = storage.resolve(uri)?;
    storage.open_container(&location)
}
