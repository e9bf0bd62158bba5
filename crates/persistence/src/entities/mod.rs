//! Entity definitions (database row mappings).

pub mod alert;
pub mod audit_log;
pub mod call;
pub mod command;
pub mod device;
pub mod sms;
pub mod task;

pub use alert::AlertEntity;
pub use audit_log::AuditLogEntity;
pub use call::CallRecordEntity;
pub use command::CommandHistoryEntity;
pub use device::{DeviceEntity, DeviceStatusEntity, SlotEntity};
pub use sms::SmsMessageEntity;
pub use task::ScheduledTaskEntity;
