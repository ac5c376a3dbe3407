//! Livechat Shared Types and Utilities
//!
//! This crate contains domain types, errors, and database helpers shared by
//! the live-chat core.

pub mod db;
pub mod error;
pub mod types;

pub use db::*;
pub use error::*;
pub use types::*;
