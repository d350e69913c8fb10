//! # PostgresBackup Spec
//!
//! Desired state of a scheduled PostgreSQL backup.

use serde::{Deserialize, Serialize};

/// PostgresBackup Custom Resource Definition
///
/// Declares a PostgreSQL database to dump and the Azure Blob Storage container
/// that receives the dump. Credentials are referenced by secret name and key and
/// resolved from the resource's own namespace on every backup attempt.
///
/// # Example
///
/// ```yaml
/// apiVersion: database.muntashirislam.com/v1alpha1
/// kind: PostgresBackup
/// metadata:
///   name: appdb-nightly
///   namespace: default
/// spec:
///   host: db.internal
///   port: 5432
///   user: app
///   dbName: appdb
///   containerName: backups
///   storageAccount: acct1
///   postgresSecret:
///     name: pgsec
///     key: password
///   azureSecret:
///     name: azsec
///     key: key
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "PostgresBackup",
    group = "database.muntashirislam.com",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::PostgresBackupStatus",
    shortname = "pgb",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.backupStatus"}, {"name":"Last Backup", "type":"string", "jsonPath":".status.lastBackupTime"}, {"name":"Active Workload", "type":"string", "jsonPath":".status.activeWorkload"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PostgresBackupSpec {
    /// PostgreSQL server hostname
    pub host: String,
    /// PostgreSQL server port
    pub port: i32,
    /// Role used by pg_dump
    pub user: String,
    /// Database to dump
    pub db_name: String,
    /// Blob container that receives `{resourceName}.sql`
    pub container_name: String,
    /// Azure storage account name (used for the endpoint and Shared Key auth)
    pub storage_account: String,
    /// Secret holding the database password
    pub postgres_secret: SecretKeyRef,
    /// Secret holding the storage account shared key
    pub azure_secret: SecretKeyRef,
}

/// Reference to one key of a Secret in the resource's namespace
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct SecretKeyRef {
    /// Secret name
    pub name: String,
    /// Key within the secret's data
    pub key: String,
}
