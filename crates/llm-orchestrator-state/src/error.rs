// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

use uuid::Uuid;

/// Error type for execution store operations, mirroring the audit crate's
/// `StorageError` shape.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("execution '{0}' not found")]
    ExecutionNotFound(Uuid),

    #[error("step '{step_id}' not found on execution '{execution_id}'")]
    StepNotFound { execution_id: Uuid, step_id: String },

    #[error("transition conflict: execution '{0}' is not in the expected status")]
    TransitionConflict(Uuid),

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;
