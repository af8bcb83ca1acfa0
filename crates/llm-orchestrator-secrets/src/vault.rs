// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HashiCorp Vault-backed secret accessor. Secrets are read from the KV v2
//! mount at `secret/data/{tenantId}/{key}`.

use crate::{Result, SecretAccessor, SecretError};
use async_trait::async_trait;
use std::collections::HashMap;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::kv2;

pub struct VaultSecretAccessor {
    client: VaultClient,
    mount: String,
}

impl VaultSecretAccessor {
    pub fn new(address: String, token: String, mount: impl Into<String>) -> Result<Self> {
        let settings = VaultClientSettingsBuilder::default()
            .address(address)
            .token(token)
            .build()
            .map_err(|e| SecretError::BackendUnavailable(e.to_string()))?;

        let client = VaultClient::new(settings)
            .map_err(|e| SecretError::BackendUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            mount: mount.into(),
        })
    }

    /// Builds from `VAULT_ADDR` / `VAULT_TOKEN`, matching the providers
    /// crate's `from_env()` convention.
    pub fn from_env() -> Result<Self> {
        let address = std::env::var("VAULT_ADDR")
            .map_err(|_| SecretError::BackendUnavailable("VAULT_ADDR not set".to_string()))?;
        let token = std::env::var("VAULT_TOKEN")
            .map_err(|_| SecretError::BackendUnavailable("VAULT_TOKEN not set".to_string()))?;
        Self::new(address, token, "secret")
    }
}

#[async_trait]
impl SecretAccessor for VaultSecretAccessor {
    async fn get_secret(&self, tenant_id: &str, key: &str) -> Result<String> {
        let path = format!("{tenant_id}/{key}");
        let data: HashMap<String, String> = kv2::read(&self.client, &self.mount, &path)
            .await
            .map_err(|e| SecretError::BackendUnavailable(e.to_string()))?;

        data.get("value")
            .cloned()
            .ok_or_else(|| SecretError::NotFound(key.to_string()))
    }
}
