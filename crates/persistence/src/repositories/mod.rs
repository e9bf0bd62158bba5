//! PostgreSQL implementations of the domain storage traits.

pub mod alert;
pub mod audit_log;
pub mod call;
pub mod command;
pub mod device;
pub mod sms;
pub mod task;

pub use alert::AlertRepository;
pub use audit_log::AuditLogRepository;
pub use call::CallRepository;
pub use command::CommandRepository;
pub use device::DeviceRepository;
pub use sms::SmsRepository;
pub use task::TaskRepository;

use domain::store::Stores;
use sqlx::PgPool;
use std::sync::Arc;

/// Builds the store handles for the engine services from one pool.
pub fn pg_stores(pool: PgPool) -> Stores {
    Stores {
        devices: Arc::new(DeviceRepository::new(pool.clone())),
        calls: Arc::new(CallRepository::new(pool.clone())),
        sms: Arc::new(SmsRepository::new(pool.clone())),
        commands: Arc::new(CommandRepository::new(pool.clone())),
        alerts: Arc::new(AlertRepository::new(pool.clone())),
        tasks: Arc::new(TaskRepository::new(pool.clone())),
        audit: Arc::new(AuditLogRepository::new(pool)),
    }
}
