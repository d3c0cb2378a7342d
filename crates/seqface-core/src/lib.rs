pub mod error;
pub mod traits;
pub mod types;

pub use error::{IngestError, Result};
pub use traits::{ObjectDetector, RasterDecoder};
pub use types::*;
