//! # Controller
//!
//! Core controller modules for the PostgresBackup controller.
//!
//! - `backoff`: Fibonacci and exponential backoff for retries
//! - `reconciler`: Core reconciliation logic
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod reconciler;
pub mod server;
