//! Persistence layer for the GSM gateway backend.
//!
//! This crate contains:
//! - Database connection management and embedded migrations
//! - Entity definitions (database row mappings)
//! - PostgreSQL repositories implementing the domain storage traits
//! - An in-process store implementing the same traits

pub mod db;
pub mod entities;
pub mod memory;
pub mod metrics;
pub mod repositories;

pub use memory::MemoryStore;
pub use repositories::pg_stores;
