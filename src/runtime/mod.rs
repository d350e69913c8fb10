//! # Runtime
//!
//! Controller process wiring.
//!
//! - `initialization`: tracing, metrics, HTTP server, Kubernetes client, reconciler
//! - `watch_loop`: the kube-runtime controller and its restart loop
//! - `error_policy`: requeue backoff for failed attempts and watch stream errors

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
