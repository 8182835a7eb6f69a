pub mod queue;
pub mod stats;

pub use queue::{
    AdmissionError, AdmissionQueue, CategoryId, Priority, QueueConfig, QueueItem,
};
pub use stats::QueueStats;
