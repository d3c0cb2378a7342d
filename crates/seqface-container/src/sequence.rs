//! Hadoop SequenceFile container codec (uncompressed, `Text` keys,
//! `BytesWritable` values).
//!
//! Layout:
//!
//! ```text
//! header : "SEQ" version keyClass valueClass compressed blockCompressed
//!          [codec] [metadata] sync[16]
//! record : i32 recordLen, i32 keyLen, key[keyLen], value[recordLen - keyLen]
//! sync   : i32 -1, sync[16]          (may appear between any two records)
//! ```
//!
//! All fixed-width integers are big-endian. Class names, metadata and keys
//! are Hadoop `Text` (VInt length + UTF-8); values are `BytesWritable`
//! (i32 length + bytes).

use std::io::{self, Read, Write};

use rand::Rng;
use thiserror::Error;

use seqface_core::ContainerRecord;

use crate::vint;

pub const MAGIC: &[u8; 3] = b"SEQ";
pub const CURRENT_VERSION: u8 = 6;
/// Oldest header layout with the compression flags we rely on.
pub const MIN_VERSION: u8 = 4;
pub const SYNC_SIZE: usize = 16;
/// Writer inserts a sync escape once this many bytes follow the last one.
pub const SYNC_INTERVAL: usize = 100 * (4 + SYNC_SIZE);
pub const TEXT_CLASS: &str = "org.apache.hadoop.io.Text";
pub const BYTES_WRITABLE_CLASS: &str = "org.apache.hadoop.io.BytesWritable";

const SYNC_ESCAPE: i32 = -1;
/// Refuse header strings longer than this; real class names are short.
const MAX_HEADER_TEXT: usize = 64 * 1024;

/// Parsed SequenceFile header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceFileHeader {
    pub version: u8,
    pub key_class: String,
    pub value_class: String,
    pub compressed: bool,
    pub block_compressed: bool,
    pub codec: Option<String>,
    pub metadata: Vec<(String, String)>,
    pub sync: [u8; SYNC_SIZE],
}

/// Per-record read failure.
///
/// `EmptyPayload`, `InvalidKey` and `Malformed` leave the stream aligned on
/// the next record. `Truncated` and `Corrupt` end the iteration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record {index} ({key}) has an empty payload")]
    EmptyPayload { index: u64, key: String },

    #[error("record {index} has an unreadable key: {reason}")]
    InvalidKey {
        index: u64,
        key: String,
        reason: String,
    },

    #[error("record {index} ({key}) is malformed: {reason}")]
    Malformed {
        index: u64,
        key: String,
        reason: String,
    },

    #[error("container truncated at record {index}: {reason}")]
    Truncated { index: u64, reason: String },

    #[error("container corrupt at record {index}: {reason}")]
    Corrupt { index: u64, reason: String },
}

impl RecordError {
    /// Ordinal of the record inside its container.
    pub fn index(&self) -> u64 {
        match self {
            RecordError::EmptyPayload { index, .. }
            | RecordError::InvalidKey { index, .. }
            | RecordError::Malformed { index, .. }
            | RecordError::Truncated { index, .. }
            | RecordError::Corrupt { index, .. } => *index,
        }
    }

    /// Best-effort key of the failed record, if one was read.
    pub fn key(&self) -> Option<&str> {
        match self {
            RecordError::EmptyPayload { key, .. }
            | RecordError::InvalidKey { key, .. }
            | RecordError::Malformed { key, .. } => Some(key),
            RecordError::Truncated { .. } | RecordError::Corrupt { .. } => None,
        }
    }

    /// Whether the reader stops after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RecordError::Truncated { .. } | RecordError::Corrupt { .. }
        )
    }
}

/// Forward-only, single-pass record cursor over a SequenceFile stream.
///
/// Dropping the reader drops (and thereby closes) the underlying stream.
pub struct SequenceFileReader<R> {
    inner: R,
    header: SequenceFileHeader,
    next_index: u64,
    done: bool,
}

impl<R: Read> SequenceFileReader<R> {
    /// Parse the header. Fails with `InvalidData` for anything other than an
    /// uncompressed `Text`/`BytesWritable` container.
    pub fn new(mut inner: R) -> io::Result<Self> {
        let header = read_header(&mut inner)?;
        tracing::debug!(
            version = header.version,
            key_class = %header.key_class,
            value_class = %header.value_class,
            metadata = header.metadata.len(),
            "read container header"
        );
        Ok(Self {
            inner,
            header,
            next_index: 0,
            done: false,
        })
    }

    pub fn header(&self) -> &SequenceFileHeader {
        &self.header
    }

    /// Records handed out so far (including skippable failures).
    pub fn records_read(&self) -> u64 {
        self.next_index
    }

    fn fail(&mut self, err: RecordError) -> Option<Result<ContainerRecord, RecordError>> {
        self.done = true;
        Some(Err(err))
    }

    fn read_frame(&mut self) -> Option<Result<ContainerRecord, RecordError>> {
        let index = self.next_index;
        loop {
            let mut len_buf = [0u8; 4];
            match read_or_eof(&mut self.inner, &mut len_buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(4) => {}
                Ok(n) => {
                    return self.fail(RecordError::Truncated {
                        index,
                        reason: format!("{n} of 4 length bytes"),
                    })
                }
                Err(e) => {
                    return self.fail(RecordError::Truncated {
                        index,
                        reason: e.to_string(),
                    })
                }
            }

            let record_len = i32::from_be_bytes(len_buf);
            if record_len == SYNC_ESCAPE {
                let mut sync = [0u8; SYNC_SIZE];
                if let Err(e) = self.inner.read_exact(&mut sync) {
                    return self.fail(RecordError::Truncated {
                        index,
                        reason: format!("sync marker: {e}"),
                    });
                }
                if sync != self.header.sync {
                    return self.fail(RecordError::Corrupt {
                        index,
                        reason: "sync marker does not match header".into(),
                    });
                }
                continue;
            }
            if record_len < 0 {
                return self.fail(RecordError::Corrupt {
                    index,
                    reason: format!("negative record length {record_len}"),
                });
            }

            let mut key_len_buf = [0u8; 4];
            if let Err(e) = self.inner.read_exact(&mut key_len_buf) {
                return self.fail(RecordError::Truncated {
                    index,
                    reason: format!("key length: {e}"),
                });
            }
            let key_len = i32::from_be_bytes(key_len_buf);
            if key_len < 0 || key_len > record_len {
                return self.fail(RecordError::Corrupt {
                    index,
                    reason: format!("key length {key_len} outside record length {record_len}"),
                });
            }

            let key_bytes = match read_bounded(&mut self.inner, key_len as usize) {
                Ok(bytes) => bytes,
                Err(reason) => return self.fail(RecordError::Truncated { index, reason }),
            };
            let value_bytes = match read_bounded(&mut self.inner, (record_len - key_len) as usize)
            {
                Ok(bytes) => bytes,
                Err(reason) => return self.fail(RecordError::Truncated { index, reason }),
            };

            self.next_index += 1;
            return Some(parse_record(index, &key_bytes, value_bytes));
        }
    }
}

impl<R: Read> Iterator for SequenceFileReader<R> {
    type Item = Result<ContainerRecord, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.read_frame()
    }
}

/// Decode one framed record. The frame itself was already validated.
fn parse_record(
    index: u64,
    key_bytes: &[u8],
    value_bytes: Vec<u8>,
) -> Result<ContainerRecord, RecordError> {
    let lossy = || String::from_utf8_lossy(key_bytes).into_owned();

    let (text_len, used) = vint::decode_vint(key_bytes).map_err(|e| RecordError::InvalidKey {
        index,
        key: lossy(),
        reason: format!("text length prefix: {e}"),
    })?;
    if text_len < 0 || used + text_len as usize != key_bytes.len() {
        return Err(RecordError::InvalidKey {
            index,
            key: lossy(),
            reason: format!(
                "text length {text_len} disagrees with key length {}",
                key_bytes.len() - used
            ),
        });
    }
    let text = &key_bytes[used..];
    let key = std::str::from_utf8(text)
        .map_err(|e| RecordError::InvalidKey {
            index,
            key: String::from_utf8_lossy(text).into_owned(),
            reason: e.to_string(),
        })?
        .to_string();

    if value_bytes.len() < 4 {
        return Err(RecordError::Malformed {
            index,
            key,
            reason: format!("value of {} bytes has no length prefix", value_bytes.len()),
        });
    }
    let payload_len = i32::from_be_bytes([
        value_bytes[0],
        value_bytes[1],
        value_bytes[2],
        value_bytes[3],
    ]);
    if payload_len < 0 || payload_len as usize != value_bytes.len() - 4 {
        return Err(RecordError::Malformed {
            index,
            key,
            reason: format!(
                "payload length {payload_len} disagrees with value length {}",
                value_bytes.len() - 4
            ),
        });
    }
    if payload_len == 0 {
        return Err(RecordError::EmptyPayload { index, key });
    }

    let mut payload = value_bytes;
    payload.drain(..4);
    Ok(ContainerRecord { key, payload })
}

/// Fill `buf`, returning 0 on a clean EOF before the first byte, or the
/// number of bytes read if the stream ended part way.
fn read_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read exactly `len` bytes without trusting `len` for the allocation.
fn read_bounded<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(len.min(1 << 20));
    reader
        .take(len as u64)
        .read_to_end(&mut out)
        .map_err(|e| e.to_string())?;
    if out.len() != len {
        return Err(format!("expected {len} bytes, stream had {}", out.len()));
    }
    Ok(out)
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn read_text<R: Read>(reader: &mut R) -> io::Result<String> {
    let len = vint::read_vint(reader)?;
    if len < 0 || len as usize > MAX_HEADER_TEXT {
        return Err(invalid(format!("header text length {len} out of range")));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| invalid(format!("header text is not UTF-8: {e}")))
}

fn read_bool<R: Read>(reader: &mut R) -> io::Result<bool> {
    let mut b = [0u8; 1];
    reader.read_exact(&mut b)?;
    Ok(b[0] != 0)
}

fn read_header<R: Read>(reader: &mut R) -> io::Result<SequenceFileHeader> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic[..3] != MAGIC {
        return Err(invalid("not a SequenceFile (bad magic)"));
    }
    let version = magic[3];
    if !(MIN_VERSION..=CURRENT_VERSION).contains(&version) {
        return Err(invalid(format!("unsupported SequenceFile version {version}")));
    }

    let key_class = read_text(reader)?;
    let value_class = read_text(reader)?;
    let compressed = read_bool(reader)?;
    let block_compressed = read_bool(reader)?;
    let codec = if compressed && version >= 5 {
        Some(read_text(reader)?)
    } else {
        None
    };

    let mut metadata = Vec::new();
    if version >= 6 {
        let mut count = [0u8; 4];
        reader.read_exact(&mut count)?;
        let count = i32::from_be_bytes(count);
        if count < 0 {
            return Err(invalid(format!("negative metadata count {count}")));
        }
        for _ in 0..count {
            let k = read_text(reader)?;
            let v = read_text(reader)?;
            metadata.push((k, v));
        }
    }

    let mut sync = [0u8; SYNC_SIZE];
    reader.read_exact(&mut sync)?;

    if compressed || block_compressed {
        return Err(invalid(format!(
            "compressed containers are not supported (codec {})",
            codec.as_deref().unwrap_or("default")
        )));
    }
    if key_class != TEXT_CLASS {
        return Err(invalid(format!("unsupported key class {key_class}")));
    }
    if value_class != BYTES_WRITABLE_CLASS {
        return Err(invalid(format!("unsupported value class {value_class}")));
    }

    Ok(SequenceFileHeader {
        version,
        key_class,
        value_class,
        compressed,
        block_compressed,
        codec,
        metadata,
        sync,
    })
}

/// Writes uncompressed `Text` -> `BytesWritable` SequenceFiles.
pub struct SequenceFileWriter<W: Write> {
    inner: W,
    sync: [u8; SYNC_SIZE],
    bytes_since_sync: usize,
    records: u64,
}

impl<W: Write> SequenceFileWriter<W> {
    /// Start a container with a freshly generated sync marker.
    pub fn new(inner: W) -> io::Result<Self> {
        Self::with_sync(inner, generate_sync(), &[])
    }

    /// Start a container with an explicit sync marker and header metadata.
    pub fn with_sync(
        mut inner: W,
        sync: [u8; SYNC_SIZE],
        metadata: &[(String, String)],
    ) -> io::Result<Self> {
        inner.write_all(MAGIC)?;
        inner.write_all(&[CURRENT_VERSION])?;
        write_text(&mut inner, TEXT_CLASS)?;
        write_text(&mut inner, BYTES_WRITABLE_CLASS)?;
        inner.write_all(&[0, 0])?;
        inner.write_all(&(metadata.len() as i32).to_be_bytes())?;
        for (k, v) in metadata {
            write_text(&mut inner, k)?;
            write_text(&mut inner, v)?;
        }
        inner.write_all(&sync)?;

        Ok(Self {
            inner,
            sync,
            bytes_since_sync: 0,
            records: 0,
        })
    }

    /// Append one image under `key`.
    pub fn append(&mut self, key: &str, payload: &[u8]) -> io::Result<()> {
        if self.bytes_since_sync >= SYNC_INTERVAL {
            self.inner.write_all(&SYNC_ESCAPE.to_be_bytes())?;
            self.inner.write_all(&self.sync)?;
            self.bytes_since_sync = 0;
        }

        let mut key_bytes = Vec::with_capacity(key.len() + 5);
        write_text(&mut key_bytes, key)?;

        let payload_len = i32::try_from(payload.len())
            .map_err(|_| invalid(format!("payload of {} bytes is too large", payload.len())))?;
        let record_len = key_bytes.len() + 4 + payload.len();
        let record_len = i32::try_from(record_len)
            .map_err(|_| invalid(format!("record of {record_len} bytes is too large")))?;

        self.inner.write_all(&record_len.to_be_bytes())?;
        self.inner.write_all(&(key_bytes.len() as i32).to_be_bytes())?;
        self.inner.write_all(&key_bytes)?;
        self.inner.write_all(&payload_len.to_be_bytes())?;
        self.inner.write_all(payload)?;

        self.bytes_since_sync += 8 + record_len as usize;
        self.records += 1;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

fn write_text<W: Write>(writer: &mut W, text: &str) -> io::Result<()> {
    vint::write_vint(writer, text.len() as i32)?;
    writer.write_all(text.as_bytes())
}

fn generate_sync() -> [u8; SYNC_SIZE] {
    let mut sync = [0u8; SYNC_SIZE];
    rand::thread_rng().fill(&mut sync[..]);
    sync
}
