//! # Secret Resolution
//!
//! Resolves `(secret name, key)` references into values at attempt time.
//!
//! Values are never cached: every attempt re-reads the secret so rotated
//! credentials are picked up by the next backup.

use crate::controller::reconciler::cluster::SecretSource;
use crate::controller::reconciler::types::ReconcilerError;
use crate::crd::SecretKeyRef;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

/// Resolve one key of a namespaced secret
///
/// # Errors
/// - [`ReconcilerError::SecretNotFound`] if the secret does not exist
/// - [`ReconcilerError::SecretLookup`] if the API read fails
/// - [`ReconcilerError::KeyNotFound`] if the secret lacks the key
/// - [`ReconcilerError::InvalidSecretValue`] if the value is not UTF-8
#[instrument(skip(source, reference), fields(secret = %reference.name, key = %reference.key))]
pub async fn resolve(
    source: &dyn SecretSource,
    namespace: &str,
    reference: &SecretKeyRef,
) -> Result<Zeroizing<String>, ReconcilerError> {
    let secret = source
        .get(namespace, &reference.name)
        .await
        .map_err(|e| ReconcilerError::SecretLookup {
            namespace: namespace.to_string(),
            name: reference.name.clone(),
            source: e,
        })?
        .ok_or_else(|| ReconcilerError::SecretNotFound {
            namespace: namespace.to_string(),
            name: reference.name.clone(),
        })?;

    let key_not_found = || ReconcilerError::KeyNotFound {
        namespace: namespace.to_string(),
        name: reference.name.clone(),
        key: reference.key.clone(),
    };

    let value = if let Some(bytes) = secret.data.as_ref().and_then(|d| d.get(&reference.key)) {
        std::str::from_utf8(&bytes.0)
            .map(str::to_string)
            .map_err(|_| ReconcilerError::InvalidSecretValue {
                namespace: namespace.to_string(),
                name: reference.name.clone(),
                key: reference.key.clone(),
            })?
    } else if let Some(text) = secret
        .string_data
        .as_ref()
        .and_then(|d| d.get(&reference.key))
    {
        text.clone()
    } else {
        return Err(key_not_found());
    };

    debug!("Resolved secret key");
    Ok(Zeroizing::new(value))
}
