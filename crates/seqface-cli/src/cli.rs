use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use seqface_container::SequenceFileWriter;
use seqface_core::{BatchResult, FormatTag, RecordEntry};

#[derive(Parser)]
#[command(
    name = "seqface",
    version,
    about = "Face counting over images packed in SequenceFile containers"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to batch config file (JSON).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    /// SeetaFace model file; overrides detector.model_path.
    #[arg(long, global = true)]
    pub model: Option<PathBuf>,

    /// Serve Prometheus metrics on this address while running.
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Count faces in every image of one container.
    Process {
        /// Container URI (hdfs://, s3n://, file:// or a path).
        #[arg(required = true)]
        input: String,
        /// Output format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Process containers under one or more locations concurrently.
    Batch {
        /// Container files or directories.
        #[arg(required = true)]
        locations: Vec<String>,
        /// File name suffix used when enumerating directories.
        #[arg(long)]
        ext: Option<String>,
        /// Number of containers processed at once.
        #[arg(long)]
        workers: Option<usize>,
        /// Output format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Pack image files into a new container, keyed by file name.
    Pack {
        /// Container to create.
        #[arg(required = true)]
        output: PathBuf,
        /// Images to add, in order.
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Jsonl,
}

/// Exit status: 130 when cancelled, 1 when a location failed, else 0.
pub fn exit_code(result: &BatchResult) -> u8 {
    if result.cancelled {
        130
    } else if !result.failed_locations.is_empty() {
        1
    } else {
        0
    }
}

/// Write `result` to `out`. Text mode puts the summary on stderr.
pub fn render(
    result: &BatchResult,
    format: &OutputFormat,
    out: &mut impl Write,
) -> io::Result<()> {
    match format {
        OutputFormat::Text => {
            for entry in &result.entries {
                match entry {
                    RecordEntry::Detected(o) => writeln!(
                        out,
                        "{}\t{}\t{}\t{}",
                        o.host,
                        o.container,
                        o.source_key,
                        o.return_code()
                    )?,
                    RecordEntry::Skipped(s) => writeln!(
                        out,
                        "-\t{}\t{}\t{}\t{}",
                        s.container,
                        s.source_key,
                        s.return_code(),
                        s.reason
                    )?,
                }
            }
            for failure in &result.failed_locations {
                writeln!(out, "!\t{}\t{}", failure.location, failure.reason)?;
            }
            eprintln!(
                "\n[{} images | {} faces | {} skipped | {} failed locations{}]",
                result.outcome_count(),
                result.total_faces(),
                result.skip_count(),
                result.failed_locations.len(),
                if result.cancelled { " | cancelled" } else { "" }
            );
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, result)?;
            writeln!(out)?;
        }
        OutputFormat::Jsonl => {
            for entry in &result.entries {
                serde_json::to_writer(&mut *out, entry)?;
                writeln!(out)?;
            }
        }
    }
    out.flush()
}

/// Write `images` into a new container at `output`. Returns the record count.
pub fn pack(output: &Path, images: &[PathBuf]) -> anyhow::Result<u64> {
    let file = File::create(output)?;
    let mut writer = SequenceFileWriter::new(BufWriter::new(file))?;

    for path in images {
        let key = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow::anyhow!("{} has no file name", path.display()))?;
        if seqface_decode::classify(&key) == FormatTag::Unsupported {
            tracing::warn!(
                key = %key,
                "no decoder matches this name; it will be skipped on ingest"
            );
        }
        let payload = std::fs::read(path)?;
        writer.append(&key, &payload)?;
        tracing::debug!(key = %key, bytes = payload.len(), "packed image");
    }

    let records = writer.records_written();
    writer.finish()?.flush()?;
    tracing::info!(output = %output.display(), records, "container written");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use seqface_container::{Storage, StorageConfig};
    use seqface_core::{DetectionOutcome, LocationFailure, SkipReason, SkippedRecord};

    use super::*;

    fn sample() -> BatchResult {
        let mut result = BatchResult::new();
        result.entries.push(RecordEntry::Detected(DetectionOutcome {
            source_key: "img1.ppm".into(),
            container: "/data/a.seq".into(),
            record_index: 0,
            host: "node-1".into(),
            face_count: 2,
        }));
        result.entries.push(RecordEntry::Skipped(SkippedRecord {
            source_key: "img3.bmp".into(),
            container: "/data/a.seq".into(),
            record_index: 1,
            reason: SkipReason::UnsupportedFormat,
            message: "unsupported image format: img3.bmp".into(),
        }));
        result
    }

    #[test]
    fn exit_codes() {
        let mut result = sample();
        assert_eq!(exit_code(&result), 0);
        result.failed_locations.push(LocationFailure {
            location: "hdfs://nn/x".into(),
            reason: "unreachable".into(),
        });
        assert_eq!(exit_code(&result), 1);
        result.cancelled = true;
        assert_eq!(exit_code(&result), 130);
    }

    #[test]
    fn text_lines_carry_return_codes() {
        let mut out = Vec::new();
        render(&sample(), &OutputFormat::Text, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "node-1\t/data/a.seq\timg1.ppm\t2");
        assert_eq!(lines[1], "-\t/data/a.seq\timg3.bmp\t-1\tunsupported_format");
    }

    #[test]
    fn jsonl_is_one_entry_per_line() {
        let mut out = Vec::new();
        render(&sample(), &OutputFormat::Jsonl, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["status"], "detected");
        assert_eq!(first["face_count"], 2);
    }

    #[test]
    fn pack_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.ppm");
        let b = dir.path().join("b.jpg");
        std::fs::write(&a, b"P6\n1 1\n255\n\x01\x02\x03").unwrap();
        std::fs::write(&b, b"\xFF\xD8junk").unwrap();
        let output = dir.path().join("out.seq");

        assert_eq!(pack(&output, &[a, b]).unwrap(), 2);

        let storage = Storage::new(StorageConfig::default());
        let reader = seqface_container::open(&storage, &output.to_string_lossy()).unwrap();
        let keys: Vec<_> = reader.map(|r| r.unwrap().key).collect();
        assert_eq!(keys, ["a.ppm", "b.jpg"]);
    }
}
