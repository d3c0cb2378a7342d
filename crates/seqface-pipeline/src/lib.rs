pub mod batch;
pub mod cancel;
pub mod config;
pub mod scheduler;

pub use batch::{BatchDriver, Discovery};
pub use cancel::CancelFlag;
pub use config::BatchConfig;
pub use scheduler::ContainerScheduler;
