//! Domain layer for the GSM gateway backend.
//!
//! This crate contains:
//! - Domain models (Device, Slot, CallRecord, SmsMessage, CommandRecord, Alert, ScheduledTask)
//! - The device event payload accessor and classifier
//! - Storage traits implemented by the persistence crate
//! - Collaborator services (notification, SMS classification, audit)
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use error::{GatewayError, StoreError};
