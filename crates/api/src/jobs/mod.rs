//! Background jobs.

mod device_liveness;
mod pool_metrics;
mod scheduler;
mod task_tick;

pub use device_liveness::DeviceLivenessJob;
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{Job, JobScheduler};
pub use task_tick::TaskTickJob;
