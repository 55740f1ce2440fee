//! Database Module
//!
//! # Module Structure
//! - `core`: `Database` struct, construction, type and index declaration, stats
//! - `crud`: bulk creation, committed-state reads, bulk update and delete
//! - `query`: query, count and explain over the last committed version

pub mod core;
pub mod crud;
pub mod query;

pub use self::core::{Database, DatabaseStats};
