//! HTTP route handlers.

pub mod alerts;
pub mod audit;
pub mod batch;
pub mod callback;
pub mod calls;
pub mod commands;
pub mod cron;
pub mod devices;
pub mod health;
pub mod sms;
pub mod tasks;
