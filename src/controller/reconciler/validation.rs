//! # Validation
//!
//! Validates a PostgresBackup spec before any secret is read.

use crate::controller::reconciler::types::ReconcilerError;
use crate::crd::{PostgresBackupSpec, SecretKeyRef};
use regex::Regex;

type Result<T> = std::result::Result<T, ReconcilerError>;

fn invalid(message: impl Into<String>) -> ReconcilerError {
    ReconcilerError::Validation(message.into())
}

/// Validate every field of a PostgresBackup spec
///
/// # Errors
/// Returns [`ReconcilerError::Validation`] describing the first invalid field
pub fn validate_spec(spec: &PostgresBackupSpec) -> Result<()> {
    validate_not_empty(&spec.host, "host")?;
    validate_not_empty(&spec.user, "user")?;
    validate_not_empty(&spec.db_name, "dbName")?;
    validate_port(spec.port)?;
    validate_container_name(&spec.container_name)?;
    validate_storage_account(&spec.storage_account)?;
    validate_secret_ref(&spec.postgres_secret, "postgresSecret")?;
    validate_secret_ref(&spec.azure_secret, "azureSecret")?;
    Ok(())
}

fn validate_not_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{field_name} cannot be empty")));
    }
    Ok(())
}

/// Validate TCP port
/// Range: 1-65535
pub fn validate_port(port: i32) -> Result<()> {
    if !(1..=65535).contains(&port) {
        return Err(invalid(format!(
            "port must be between 1 and 65535 (got {port})"
        )));
    }
    Ok(())
}

/// Validate Azure blob container name
/// Format: lowercase alphanumeric and single hyphens
/// Length: 3-63 characters
/// Must start and end with a letter or digit
pub fn validate_container_name(name: &str) -> Result<()> {
    if !(3..=63).contains(&name.len()) {
        return Err(invalid(format!(
            "containerName '{name}' must be between 3 and 63 characters (got {})",
            name.len()
        )));
    }

    // No consecutive hyphens, no leading/trailing hyphen
    let container_regex = Regex::new(r"^[a-z0-9](?:[a-z0-9]|-[a-z0-9])*$")
        .map_err(|e| invalid(format!("Failed to compile regex: {e}")))?;

    if !container_regex.is_match(name) {
        return Err(invalid(format!(
            "containerName '{name}' must contain only lowercase letters, digits and single hyphens, and start and end with a letter or digit"
        )));
    }
    Ok(())
}

/// Validate Azure storage account name
/// Format: 3-24 lowercase letters and digits
pub fn validate_storage_account(account: &str) -> Result<()> {
    let account_regex = Regex::new(r"^[a-z0-9]{3,24}$")
        .map_err(|e| invalid(format!("Failed to compile regex: {e}")))?;

    if !account_regex.is_match(account) {
        return Err(invalid(format!(
            "storageAccount '{account}' must be 3-24 lowercase letters and digits"
        )));
    }
    Ok(())
}

fn validate_secret_ref(reference: &SecretKeyRef, field_name: &str) -> Result<()> {
    validate_not_empty(&reference.name, &format!("{field_name}.name"))?;
    validate_not_empty(&reference.key, &format!("{field_name}.key"))?;
    Ok(())
}
