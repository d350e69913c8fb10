//! # CRD Generator
//!
//! Generates the Kubernetes CustomResourceDefinition (CRD) YAML for the
//! `PostgresBackup` resource from its Rust type definition.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/postgresbackup.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::core::CustomResourceExt;
use postgres_backup_controller::crd::PostgresBackup;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&PostgresBackup::crd())?);
    Ok(())
}
