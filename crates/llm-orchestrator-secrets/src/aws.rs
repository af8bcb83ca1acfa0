// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AWS Secrets Manager-backed secret accessor. Secrets are named
//! `{tenantId}/{key}`.

use crate::{Result, SecretAccessor, SecretError};
use async_trait::async_trait;
use aws_sdk_secretsmanager::Client;

pub struct AwsSecretsManagerAccessor {
    client: Client,
}

impl AwsSecretsManagerAccessor {
    /// Builds from the standard AWS SDK credential chain (env vars, profile,
    /// instance role).
    pub async fn from_env() -> Self {
        let config = aws_config::load_from_env().await;
        Self {
            client: Client::new(&config),
        }
    }
}

#[async_trait]
impl SecretAccessor for AwsSecretsManagerAccessor {
    async fn get_secret(&self, tenant_id: &str, key: &str) -> Result<String> {
        let secret_id = format!("{tenant_id}/{key}");
        let output = self
            .client
            .get_secret_value()
            .secret_id(&secret_id)
            .send()
            .await
            .map_err(|e| SecretError::BackendUnavailable(e.to_string()))?;

        output
            .secret_string()
            .map(|s| s.to_string())
            .ok_or_else(|| SecretError::NotFound(key.to_string()))
    }
}
