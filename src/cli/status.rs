//! # Status Command
//!
//! Command to show the status of a PostgresBackup resource.

use anyhow::{Context, Result};
use kube::{api::Api, Client};
use postgres_backup_controller::crd::PostgresBackup;

/// Print spec and status of a single PostgresBackup
pub async fn status_command(client: Client, name: String, namespace: Option<String>) -> Result<()> {
    let ns = namespace.as_deref().unwrap_or("default");
    let api: Api<PostgresBackup> = Api::namespaced(client, ns);

    let backup = api
        .get(&name)
        .await
        .with_context(|| format!("Failed to get PostgresBackup '{ns}/{name}'"))?;

    let spec = &backup.spec;
    println!("PostgresBackup: {ns}/{name}");
    println!();
    println!("Database:");
    println!("  Host:            {}:{}", spec.host, spec.port);
    println!("  User:            {}", spec.user);
    println!("  Database:        {}", spec.db_name);
    println!("  Password secret: {}[{}]", spec.postgres_secret.name, spec.postgres_secret.key);
    println!();
    println!("Destination:");
    println!("  Storage account: {}", spec.storage_account);
    println!("  Container:       {}", spec.container_name);
    println!("  Key secret:      {}[{}]", spec.azure_secret.name, spec.azure_secret.key);
    println!();

    let Some(status) = backup.status.as_ref() else {
        println!("Status: not yet reconciled");
        return Ok(());
    };

    let or_dash = |value: Option<&str>| value.unwrap_or("-").to_string();
    println!("Status:");
    println!("  Backup status:       {}", or_dash(status.backup_status.as_deref()));
    println!("  Last backup:         {}", or_dash(status.last_backup_time.as_deref()));
    println!("  Next backup:         {}", or_dash(status.next_backup_time.as_deref()));
    println!(
        "  Observed generation: {}",
        status
            .observed_generation
            .map_or_else(|| "-".to_string(), |g| g.to_string())
    );
    println!("  Active workload:     {}", or_dash(status.active_workload.as_deref()));
    println!("  Workload phase:      {}", or_dash(status.workload_phase.as_deref()));
    println!("  Handled trigger:     {}", or_dash(status.handled_trigger.as_deref()));
    if !status.pending_cleanup.is_empty() {
        println!("  Pending cleanup:     {}", status.pending_cleanup.join(", "));
    }

    Ok(())
}
