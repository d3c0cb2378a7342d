use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;

use seqface_container::Location;
use seqface_core::{BatchResult, LocationFailure};

use crate::batch::BatchDriver;
use crate::cancel::CancelFlag;

/// Runs containers on blocking worker tasks, at most `max_concurrent` at a
/// time.
///
/// Each worker owns its reader for the whole container. Reports land in a
/// slot per container, so the merged result follows discovery order no
/// matter which worker finishes first.
pub struct ContainerScheduler {
    max_concurrent: usize,
}

/// Append-only sink shared by the workers.
struct ResultSink {
    slots: Mutex<Vec<Option<BatchResult>>>,
}

impl ResultSink {
    fn with_slots(n: usize) -> Self {
        Self {
            slots: Mutex::new((0..n).map(|_| None).collect()),
        }
    }

    fn put(&self, slot: usize, report: BatchResult) {
        self.slots.lock()[slot] = Some(report);
    }

    /// Concatenate the filled slots in order. Empty slots belong to
    /// containers that were never started.
    fn merge(&self) -> BatchResult {
        let mut merged = BatchResult::new();
        for report in self.slots.lock().drain(..).flatten() {
            merged.append(report);
        }
        merged
    }
}

impl ContainerScheduler {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Process `containers` and merge their reports.
    ///
    /// Once `cancel` is set no further containers are started, running
    /// workers stop at their next record pull, and the partial result comes
    /// back with `cancelled` set.
    pub async fn run(
        &self,
        driver: Arc<BatchDriver>,
        containers: Vec<Location>,
        cancel: CancelFlag,
    ) -> BatchResult {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let sink = Arc::new(ResultSink::with_slots(containers.len()));
        let mut handles = Vec::with_capacity(containers.len());

        tracing::debug!(
            containers = containers.len(),
            workers = self.max_concurrent,
            "scheduling containers"
        );

        for (slot, location) in containers.into_iter().enumerate() {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            if cancel.is_cancelled() {
                break;
            }

            let driver = Arc::clone(&driver);
            let sink = Arc::clone(&sink);
            let cancel = cancel.clone();
            let name = location.as_str().to_string();
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let report = driver.process_location(&location, &cancel);
                sink.put(slot, report);
            });
            handles.push((slot, name, handle));
        }

        for (slot, name, handle) in handles {
            if let Err(e) = handle.await {
                tracing::error!(container = %name, error = %e, "container worker aborted");
                let mut report = BatchResult::new();
                report.failed_locations.push(LocationFailure {
                    location: name,
                    reason: format!("worker aborted: {e}"),
                });
                sink.put(slot, report);
            }
        }

        let mut result = sink.merge();
        if cancel.is_cancelled() {
            result.cancelled = true;
        }
        result
    }
}
