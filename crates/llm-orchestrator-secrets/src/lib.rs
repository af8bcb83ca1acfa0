// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant-scoped secret access for the step execution context.
//!
//! The engine never reads an API key, connector credential, or provider
//! token directly; every step handler that needs one goes through a
//! `SecretAccessor` resolved for the execution's tenant.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub mod aws;
pub mod vault;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret '{0}' not found")]
    NotFound(String),

    #[error("secret backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("access denied for tenant '{tenant_id}' to secret '{key}'")]
    AccessDenied { tenant_id: String, key: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves a named secret for a tenant. Implementations: environment
/// variables (dev/test), HashiCorp Vault, AWS Secrets Manager.
#[async_trait]
pub trait SecretAccessor: Send + Sync {
    async fn get_secret(&self, tenant_id: &str, key: &str) -> Result<String>;
}

pub type SecretAccessorRef = Arc<dyn SecretAccessor>;

/// Reads `{TENANT_ID}__{KEY}` (uppercased, non-alphanumeric replaced with
/// `_`) from the process environment, falling back to a bare `{KEY}` lookup
/// for tenant-agnostic secrets (e.g. a platform-wide provider key). Intended
/// for local development and tests, mirroring the providers crate's
/// `from_env()` convention.
pub struct EnvSecretAccessor;

impl EnvSecretAccessor {
    pub fn new() -> Self {
        Self
    }

    fn env_key(tenant_id: &str, key: &str) -> String {
        let sanitize = |s: &str| {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
                .collect::<String>()
        };
        format!("{}__{}", sanitize(tenant_id), sanitize(key))
    }
}

impl Default for EnvSecretAccessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretAccessor for EnvSecretAccessor {
    async fn get_secret(&self, tenant_id: &str, key: &str) -> Result<String> {
        let scoped = Self::env_key(tenant_id, key);
        if let Ok(value) = std::env::var(&scoped) {
            return Ok(value);
        }
        std::env::var(key).map_err(|_| SecretError::NotFound(key.to_string()))
    }
}

/// A fixed in-memory map, for unit tests that need deterministic secrets
/// without touching the process environment.
pub struct StaticSecretAccessor {
    secrets: HashMap<(String, String), String>,
}

impl StaticSecretAccessor {
    pub fn new() -> Self {
        Self {
            secrets: HashMap::new(),
        }
    }

    pub fn with_secret(mut self, tenant_id: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert((tenant_id.into(), key.into()), value.into());
        self
    }
}

impl Default for StaticSecretAccessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretAccessor for StaticSecretAccessor {
    async fn get_secret(&self, tenant_id: &str, key: &str) -> Result<String> {
        self.secrets
            .get(&(tenant_id.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| SecretError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn env_accessor_prefers_tenant_scoped_key() {
        std::env::set_var("ACME__API_KEY", "tenant-scoped");
        std::env::set_var("API_KEY", "fallback");

        let accessor = EnvSecretAccessor::new();
        let value = accessor.get_secret("acme", "api_key").await.unwrap();

        assert_eq!(value, "tenant-scoped");

        std::env::remove_var("ACME__API_KEY");
        std::env::remove_var("API_KEY");
    }

    #[tokio::test]
    async fn static_accessor_returns_not_found_for_missing_key() {
        let accessor = StaticSecretAccessor::new().with_secret("acme", "api_key", "sk-test");

        assert!(accessor.get_secret("acme", "api_key").await.is_ok());
        assert!(matches!(
            accessor.get_secret("acme", "missing").await,
            Err(SecretError::NotFound(_))
        ));
    }
}
