//! HMAC secret resolution.
//!
//! # Responsibilities
//! - Read the signing key from the environment
//! - Fail startup when production runs without a configured key
//! - Substitute a per-process ephemeral key outside production
//!
//! # Design Decisions
//! - The secret never appears in the file config or in logs
//! - Ephemeral keys invalidate all outstanding tokens on restart, which
//!   is acceptable everywhere except production

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// Environment variable supplying the HMAC signing key.
pub const SECRET_ENV: &str = "LENDGATE_CSRF_SECRET";

/// Environment variable naming the deployment environment.
pub const ENVIRONMENT_ENV: &str = "LENDGATE_ENV";

const EPHEMERAL_KEY_LEN: usize = 32;

/// Errors raised while resolving the signing key.
#[derive(Debug, Error)]
pub enum SecretError {
    /// Production deployments must supply the key explicitly.
    #[error("{SECRET_ENV} must be set when {ENVIRONMENT_ENV}=production")]
    MissingInProduction,
}

/// Process-wide symmetric key used for all HMAC operations.
///
/// Constructed once at startup and shared read-only; token issuance and
/// verification need no further coordination.
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    /// Wrap an externally supplied key.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Generate a random per-process key.
    pub fn ephemeral() -> Self {
        let mut bytes = vec![0u8; EPHEMERAL_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Raw key material for the HMAC.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Resolve the signing key from the process environment.
pub fn resolve_secret() -> Result<SecretKey, SecretError> {
    resolve(
        std::env::var(SECRET_ENV).ok(),
        std::env::var(ENVIRONMENT_ENV).ok(),
    )
}

/// Pure resolution logic, separated so tests need not touch the process
/// environment.
fn resolve(secret: Option<String>, environment: Option<String>) -> Result<SecretKey, SecretError> {
    match secret {
        Some(value) if !value.is_empty() => Ok(SecretKey::from_bytes(value.into_bytes())),
        _ => {
            if environment.as_deref() == Some("production") {
                return Err(SecretError::MissingInProduction);
            }
            tracing::warn!(
                env = SECRET_ENV,
                "CSRF secret not configured; using an ephemeral per-process key"
            );
            Ok(SecretKey::ephemeral())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_secret_is_used_verbatim() {
        let key = resolve(Some("hunter2".into()), Some("production".into())).unwrap();
        assert_eq!(key.as_bytes(), b"hunter2");
    }

    #[test]
    fn missing_secret_in_production_is_fatal() {
        assert!(matches!(
            resolve(None, Some("production".into())),
            Err(SecretError::MissingInProduction)
        ));
        assert!(matches!(
            resolve(Some(String::new()), Some("production".into())),
            Err(SecretError::MissingInProduction)
        ));
    }

    #[test]
    fn missing_secret_outside_production_gets_ephemeral_key() {
        let key = resolve(None, None).unwrap();
        assert_eq!(key.as_bytes().len(), 32);

        let other = resolve(None, Some("staging".into())).unwrap();
        assert_ne!(key.as_bytes(), other.as_bytes());
    }

    #[test]
    fn debug_never_prints_key_material() {
        let key = SecretKey::from_bytes(b"super-secret".to_vec());
        assert_eq!(format!("{key:?}"), "SecretKey(..)");
    }
}
