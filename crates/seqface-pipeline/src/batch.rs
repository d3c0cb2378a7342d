use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use seqface_container::{Location, RecordError, Storage};
use seqface_core::{
    BatchResult, ContainerRecord, DetectionOutcome, IngestError, LocationFailure,
    ObjectDetector, Raster, RecordEntry, Result, SkipReason, SkippedRecord,
};
use seqface_decode::Decoder;

use crate::cancel::CancelFlag;
use crate::config::BatchConfig;
use crate::scheduler::ContainerScheduler;

/// Containers found under the requested locations, plus the locations that
/// could not be enumerated at all.
#[derive(Debug, Default)]
pub struct Discovery {
    pub containers: Vec<Location>,
    pub failures: Vec<LocationFailure>,
}

/// The ingestion pipeline: read records → classify → decode → detect.
///
/// Storage-level failures are fatal for their location only; every
/// per-record failure becomes a skip entry in the result.
pub struct BatchDriver {
    storage: Arc<Storage>,
    decoder: Decoder,
    detector: Arc<dyn ObjectDetector>,
    config: BatchConfig,
}

impl BatchDriver {
    pub fn new(
        storage: Arc<Storage>,
        detector: Arc<dyn ObjectDetector>,
        config: BatchConfig,
    ) -> Self {
        tracing::info!(
            detector = detector.name(),
            host = %config.host_label,
            workers = config.workers,
            "batch driver ready"
        );
        Self {
            storage,
            decoder: Decoder::new(),
            detector,
            config,
        }
    }

    /// Replace the record decoder.
    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Process every container under `locations` one after another.
    pub fn process(&self, locations: &[String], extension: &str) -> BatchResult {
        self.process_with_cancel(locations, extension, &CancelFlag::new())
    }

    /// Sequential run that stops pulling records once `cancel` is set.
    pub fn process_with_cancel(
        &self,
        locations: &[String],
        extension: &str,
        cancel: &CancelFlag,
    ) -> BatchResult {
        let start = Instant::now();
        let discovery = self.discover(locations, extension);

        let mut result = BatchResult::new();
        result.failed_locations = discovery.failures;

        for location in &discovery.containers {
            if cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }
            result.append(self.process_location(location, cancel));
        }

        log_summary(&result, start);
        result
    }

    /// Concurrent run: containers are handed to up to `config.workers`
    /// blocking tasks, and their reports are merged in discovery order.
    pub async fn process_concurrent(
        self: &Arc<Self>,
        locations: &[String],
        extension: &str,
        cancel: &CancelFlag,
    ) -> BatchResult {
        let start = Instant::now();

        let driver = Arc::clone(self);
        let owned = locations.to_vec();
        let extension = extension.to_string();
        let discovery = match tokio::task::spawn_blocking(move || {
            driver.discover(&owned, &extension)
        })
        .await
        {
            Ok(discovery) => discovery,
            Err(e) => {
                tracing::error!(error = %e, "container discovery aborted");
                Discovery {
                    containers: Vec::new(),
                    failures: locations
                        .iter()
                        .map(|l| LocationFailure {
                            location: l.clone(),
                            reason: format!("discovery aborted: {e}"),
                        })
                        .collect(),
                }
            }
        };

        let mut result = BatchResult::new();
        result.failed_locations = discovery.failures;

        let scheduler = ContainerScheduler::new(self.config.workers);
        result.append(
            scheduler
                .run(Arc::clone(self), discovery.containers, cancel.clone())
                .await,
        );

        log_summary(&result, start);
        result
    }

    /// Expand each location into the containers it names.
    ///
    /// A directory contributes its files ending in `extension`; a file
    /// contributes itself.
    pub fn discover(&self, locations: &[String], extension: &str) -> Discovery {
        let mut discovery = Discovery::default();

        for uri in locations {
            let listed = self
                .storage
                .resolve(uri)
                .and_then(|location| self.storage.list(&location, extension));
            match listed {
                Ok(containers) => {
                    tracing::debug!(
                        location = %uri,
                        containers = containers.len(),
                        "enumerated location"
                    );
                    discovery.containers.extend(containers);
                }
                Err(e) => discovery.failures.push(location_failure(uri, &e)),
            }
        }

        discovery
    }

    /// Process one container, converting an open failure into a failed
    /// location entry.
    pub fn process_location(&self, location: &Location, cancel: &CancelFlag) -> BatchResult {
        match self.process_container(location, cancel) {
            Ok(result) => result,
            Err(e) => {
                let mut result = BatchResult::new();
                result
                    .failed_locations
                    .push(location_failure(location.as_str(), &e));
                result
            }
        }
    }

    /// Pull every record of one container.
    ///
    /// Fails only when the container cannot be opened. The reader is dropped,
    /// closing the stream, before this returns on every path.
    pub fn process_container(
        &self,
        location: &Location,
        cancel: &CancelFlag,
    ) -> Result<BatchResult> {
        let mut reader = self.storage.open_container(location)?;
        let container = location.as_str();
        let mut result = BatchResult::new();

        loop {
            if cancel.is_cancelled() {
                tracing::info!(
                    container,
                    pulled = reader.records_read(),
                    "cancelled, stopping container"
                );
                result.cancelled = true;
                break;
            }
            let Some(next) = reader.next() else { break };
            let entry = match next {
                Ok(record) => {
                    let index = reader.records_read() - 1;
                    self.process_record(&record, container, index)
                }
                Err(e) => self.skip_unreadable(&e, container),
            };
            result.entries.push(entry);
        }

        tracing::debug!(
            container,
            records = result.entries.len(),
            faces = result.total_faces(),
            skipped = result.skip_count(),
            "container done"
        );
        Ok(result)
    }

    /// Classify, decode and detect one record.
    pub fn process_record(
        &self,
        record: &ContainerRecord,
        container: &str,
        index: u64,
    ) -> RecordEntry {
        match self.detect_record(record) {
            Ok(face_count) => {
                tracing::info!(
                    hostname = %self.config.host_label,
                    filename = %record.key,
                    faces = face_count,
                    "processed record"
                );
                metrics::counter!("seqface_records_total", "status" => "detected").increment(1);
                RecordEntry::Detected(DetectionOutcome {
                    source_key: record.key.clone(),
                    container: container.to_string(),
                    record_index: index,
                    host: self.config.host_label.clone(),
                    face_count,
                })
            }
            Err(e) => self.skip(
                record.key.clone(),
                container,
                index,
                SkipReason::from(&e),
                e.to_string(),
            ),
        }
    }

    fn detect_record(&self, record: &ContainerRecord) -> Result<u32> {
        let raster = self.run_decoder(record)?;
        let count = self.run_detector(&raster)?;
        u32::try_from(count).map_err(|_| {
            IngestError::Detection(format!(
                "{} returned invalid count {count}",
                self.detector.name()
            ))
        })
    }

    /// Decode `record`, reporting a panicking decoder as a decode error.
    fn run_decoder(&self, record: &ContainerRecord) -> Result<Raster> {
        let decoder = &self.decoder;
        match panic::catch_unwind(AssertUnwindSafe(|| decoder.decode(record))) {
            Ok(decoded) => decoded.map(|(_, raster)| raster),
            Err(payload) => Err(IngestError::Decode(format!(
                "decoder panicked on {}: {}",
                record.key,
                panic_message(payload.as_ref())
            ))),
        }
    }

    /// Call the collaborator, treating a panic or any error it raises as a
    /// detection failure.
    fn run_detector(&self, raster: &Raster) -> Result<i64> {
        let detector = &self.detector;
        match panic::catch_unwind(AssertUnwindSafe(|| detector.detect(raster))) {
            Ok(Ok(count)) => Ok(count),
            Ok(Err(IngestError::Detection(msg))) => Err(IngestError::Detection(msg)),
            Ok(Err(e)) => Err(IngestError::Detection(e.to_string())),
            Err(payload) => Err(IngestError::Detection(format!(
                "{} panicked: {}",
                detector.name(),
                panic_message(payload.as_ref())
            ))),
        }
    }

    fn skip_unreadable(&self, err: &RecordError, container: &str) -> RecordEntry {
        let key = err.key().unwrap_or_default().to_string();
        self.skip(key, container, err.index(), SkipReason::InvalidRecord, err.to_string())
    }

    fn skip(
        &self,
        source_key: String,
        container: &str,
        record_index: u64,
        reason: SkipReason,
        message: String,
    ) -> RecordEntry {
        tracing::warn!(
            container,
            key = %source_key,
            record = record_index,
            %reason,
            error = %message,
            "skipping record"
        );
        metrics::counter!("seqface_records_total", "status" => reason.as_str()).increment(1);
        RecordEntry::Skipped(SkippedRecord {
            source_key,
            container: container.to_string(),
            record_index,
            reason,
            message,
        })
    }
}

fn location_failure(location: &str, err: &IngestError) -> LocationFailure {
    tracing::error!(location, error = %err, "location unavailable");
    metrics::counter!("seqface_locations_failed_total").increment(1);
    let reason = match err {
        IngestError::StorageUnavailable { reason, .. } => reason.clone(),
        other => other.to_string(),
    };
    LocationFailure {
        location: location.to_string(),
        reason,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

fn log_summary(result: &BatchResult, start: Instant) {
    tracing::info!(
        outcomes = result.outcome_count(),
        skipped = result.skip_count(),
        faces = result.total_faces(),
        failed_locations = result.failed_locations.len(),
        cancelled = result.cancelled,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "batch complete"
    );
}
