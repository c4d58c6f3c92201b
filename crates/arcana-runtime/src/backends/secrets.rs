//! API-key wrapping for the hosted backends.
//!
//! A key enters the [`ApiKey`] wrapper the moment it is read and leaves it
//! only inside [`ApiKey::reveal`] at the request-header call site. `Debug`
//! output never contains the value, and the backing `secrecy` storage zeroes
//! it on drop.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use super::BackendError;

/// An API key for a hosted narrative backend.
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// Read a key from an environment variable.
    pub fn from_env(env_var: &str) -> Result<Self, BackendError> {
        match std::env::var(env_var) {
            Ok(value) => Ok(Self::new(value)),
            Err(_) => Err(BackendError::NotConfigured(format!(
                "missing API key: set the {env_var} environment variable"
            ))),
        }
    }

    /// The raw key, for building a request header. Never store the result.
    pub fn reveal(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_the_value() {
        let key = ApiKey::new("sk-very-secret-value");
        let debug = format!("{key:?}");
        assert!(!debug.contains("sk-very-secret-value"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn reveal_returns_the_value() {
        let key = ApiKey::new("sk-abc");
        assert_eq!(key.reveal(), "sk-abc");
        assert!(!key.is_empty());
    }

    #[test]
    fn empty_key_is_detected() {
        assert!(ApiKey::new("").is_empty());
    }

    #[test]
    fn missing_env_var_is_not_configured() {
        let result = ApiKey::from_env("ARCANA_DEFINITELY_UNSET");
        assert!(matches!(result, Err(BackendError::NotConfigured(_))));
    }
}
