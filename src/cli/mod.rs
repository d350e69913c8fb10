//! # PBCTL CLI
//!
//! Command-line interface for the PostgreSQL backup controller.
//!
//! ## Usage
//!
//! ```bash
//! # List PostgresBackup resources in a namespace
//! pbctl list -n databases
//!
//! # List PostgresBackup resources in all namespaces
//! pbctl list -A
//!
//! # Show status of a PostgresBackup
//! pbctl status nightly -n databases
//!
//! # Request an immediate backup
//! pbctl trigger nightly -n databases
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube::Client;

mod list;
mod status;
mod trigger;

/// PostgreSQL backup controller CLI
#[derive(Parser)]
#[command(name = "pbctl")]
#[command(
    about = "PostgreSQL backup controller CLI",
    long_about = None,
    after_help = "\
Examples:
  pbctl list -A
  pbctl status nightly --namespace databases
  pbctl trigger nightly --namespace databases
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List PostgresBackup resources
    List {
        /// Kubernetes namespace (defaults to "default")
        #[arg(short, long, conflicts_with = "all_namespaces")]
        namespace: Option<String>,

        /// List resources in all namespaces
        #[arg(short = 'A', long)]
        all_namespaces: bool,
    },
    /// Show the status of a PostgresBackup resource
    Status {
        /// Name of the PostgresBackup resource
        #[arg(value_name = "NAME")]
        name: String,

        /// Kubernetes namespace (defaults to "default")
        #[arg(short, long)]
        namespace: Option<String>,
    },
    /// Request an immediate backup of a PostgresBackup resource
    Trigger {
        /// Name of the PostgresBackup resource
        #[arg(value_name = "NAME")]
        name: String,

        /// Kubernetes namespace (defaults to "default")
        #[arg(short, long)]
        namespace: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Configure rustls crypto provider FIRST, before any other operations
    // Required for rustls 0.23+ when no default provider is set via features
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err(anyhow::anyhow!("Failed to install rustls crypto provider"));
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pbctl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;

    match cli.command {
        Commands::List {
            namespace,
            all_namespaces,
        } => {
            let scope = if all_namespaces {
                None
            } else {
                Some(namespace.unwrap_or_else(|| "default".to_string()))
            };
            list::list_command(client, scope).await
        }
        Commands::Status { name, namespace } => {
            status::status_command(client, name, namespace).await
        }
        Commands::Trigger { name, namespace } => {
            trigger::trigger_command(client, name, namespace).await
        }
    }
}
