//! Shared utilities and common types for the GSM gateway backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Device credential hashing and transaction ids
//! - Page/limit pagination
//! - Common validation logic

pub mod crypto;
pub mod pagination;
pub mod validation;
