//! # Trigger Command
//!
//! Command to request an immediate backup.

use anyhow::{Context, Result};
use kube::{
    api::{Api, Patch, PatchParams},
    Client,
};
use postgres_backup_controller::constants::BACKUP_NOW_ANNOTATION;
use postgres_backup_controller::crd::PostgresBackup;
use serde_json::json;

/// Request a backup by setting the backup-now annotation
///
/// The annotation value is the current time, so every invocation produces a
/// new token the controller has not handled yet.
pub async fn trigger_command(client: Client, name: String, namespace: Option<String>) -> Result<()> {
    let ns = namespace.as_deref().unwrap_or("default");
    let api: Api<PostgresBackup> = Api::namespaced(client, ns);

    let token = chrono::Utc::now().to_rfc3339();
    let patch = json!({
        "metadata": {
            "annotations": {
                BACKUP_NOW_ANNOTATION: token
            }
        }
    });

    api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .with_context(|| format!("Failed to trigger backup for PostgresBackup '{ns}/{name}'"))?;

    println!("Backup requested for PostgresBackup '{ns}/{name}' (token {token})");
    println!("Follow progress with: pbctl status {name} -n {ns}");
    Ok(())
}
