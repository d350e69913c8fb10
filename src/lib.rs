//! PostgreSQL Backup Controller Library
//!
//! This library provides the core functionality for the PostgreSQL backup controller:
//! `PostgresBackup` resources are turned into `pg_dump` pods whose output is
//! archived to Azure Blob Storage.
//!
//! ## Quick Start
//!
//! ```rust
//! use postgres_backup_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

// Re-export modules so they can be tested
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod storage;
