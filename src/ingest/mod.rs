pub mod reconciler;
pub mod scheduler;

pub use reconciler::{CycleStats, IngestOptions, Reconciler};
pub use scheduler::{IngestScheduler, RetryPolicy};
