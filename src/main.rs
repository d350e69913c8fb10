//! # PostgreSQL Backup Controller
//!
//! A Kubernetes controller that backs up PostgreSQL databases to Azure Blob Storage.
//!
//! ## Overview
//!
//! For every `PostgresBackup` resource the controller:
//!
//! 1. **Resolves credentials** - Reads the database password and storage account key from Secrets
//! 2. **Runs pg_dump** - Submits a short-lived pod owned by the resource
//! 3. **Archives the dump** - Uploads it to Azure Blob Storage with Shared Key authorization
//! 4. **Records the outcome** - Writes `lastBackupTime` and `backupStatus`, then requeues after 24 hours
//!
//! ## Features
//!
//! - **Manual trigger**: `pbctl trigger` requests an immediate backup
//! - **Bounded waits**: Dump pods are abandoned after a configurable deadline
//! - **Prometheus metrics**: Exposes metrics for monitoring and observability
//! - **Health probes**: HTTP endpoints for liveness and readiness checks

use anyhow::Result;
use postgres_backup_controller::runtime::{initialization::initialize, watch_loop::run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    run_watch_loop(
        init.backups,
        init.reconciler,
        init.server_state,
        init.controller_config,
    )
    .await
}
