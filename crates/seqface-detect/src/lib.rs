//! Detection collaborators for the ingestion pipeline.
//!
//! The pipeline only needs an [`ObjectDetector`](seqface_core::ObjectDetector);
//! this crate provides the SeetaFace-backed face counter used by the CLI.

pub mod config;
#[cfg(feature = "rustface")]
pub mod rustface_backend;

pub use config::DetectorConfig;
#[cfg(feature = "rustface")]
pub use rustface_backend::RustfaceDetector;
