//! Domain services for the GSM gateway.
//!
//! Services contain business logic and collaborator interfaces that operate on domain models.

pub mod audit;
pub mod notification;
pub mod sms_classifier;

pub use audit::{audit_helpers, AuditLogBuilder};
pub use notification::{
    AlertNotification, AlertNotifier, MockNotificationService, NoopNotifier, NotificationResult,
};
pub use sms_classifier::{KeywordClassifier, SmsClassifier};
