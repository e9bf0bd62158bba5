//! Domain models for the GSM gateway.

pub mod alert;
pub mod audit_log;
pub mod batch;
pub mod call;
pub mod command;
pub mod device;
pub mod device_status;
pub mod event;
pub mod slot;
pub mod sms;
pub mod task;

pub use alert::{Alert, AlertFilter, AlertKind, AlertLevel, NewAlert};
pub use audit_log::{AuditAction, AuditLog, CreateAuditLogInput, ListAuditLogsQuery};
pub use batch::{BatchResult, BatchState, BatchStatus, StartBatchRequest, StartBatchResponse};
pub use call::{CallDirection, CallKey, CallRecord, CallStatus, NewCall};
pub use command::{
    CommandName, CommandParams, CommandRecord, CommandRequest, CommandStatus, NewCommand,
};
pub use device::{
    Device, DeviceStatus, DeviceView, NewDevice, RegisterDeviceRequest, UpdateDeviceRequest,
};
pub use device_status::{DeviceStatusSample, NewStatusSample};
pub use event::{DeviceEvent, EventPayload};
pub use slot::{SimStatus, Slot, SlotUpdate};
pub use sms::{
    BatchSmsRequest, BatchSmsSender, ExtractedData, NewSms, PhoneList, SendSmsRequest,
    SmsCategory, SmsDirection, SmsFilter, SmsMessage, SmsStatus,
};
pub use task::{
    CreateTaskRequest, DuePolicy, NewTask, Schedule, ScheduledTask, TaskAction, TaskPatch,
    TaskTrigger, UpdateTaskRequest,
};
