//! # List Command
//!
//! Command to list PostgresBackup resources.

use anyhow::{Context, Result};
use kube::{api::Api, Client};
use postgres_backup_controller::crd::PostgresBackup;

/// List PostgresBackup resources in one namespace, or all when `namespace` is `None`
pub async fn list_command(client: Client, namespace: Option<String>) -> Result<()> {
    let api: Api<PostgresBackup> = if let Some(ns) = &namespace {
        println!("Listing PostgresBackup resources in namespace '{ns}'...");
        Api::namespaced(client, ns)
    } else {
        println!("Listing PostgresBackup resources in all namespaces...");
        Api::all(client)
    };

    let backups = api
        .list(&kube::api::ListParams::default())
        .await
        .context("Failed to list PostgresBackup resources")?;

    if backups.items.is_empty() {
        println!("No PostgresBackup resources found.");
        return Ok(());
    }

    println!(
        "\n{:<30} {:<20} {:<10} {:<27} {:<30}",
        "NAME", "NAMESPACE", "STATUS", "LAST BACKUP", "ACTIVE WORKLOAD"
    );
    println!("{}", "-".repeat(117));

    for backup in backups.items {
        let name = backup.metadata.name.as_deref().unwrap_or("<unknown>");
        let ns = backup.metadata.namespace.as_deref().unwrap_or("<unknown>");
        let status = backup.status.as_ref();

        let backup_status = status
            .and_then(|s| s.backup_status.as_deref())
            .unwrap_or("-");
        let last_backup = status
            .and_then(|s| s.last_backup_time.as_deref())
            .unwrap_or("-");
        let active = status
            .and_then(|s| s.active_workload.as_deref())
            .unwrap_or("-");

        println!("{name:<30} {ns:<20} {backup_status:<10} {last_backup:<27} {active:<30}");
    }

    Ok(())
}
