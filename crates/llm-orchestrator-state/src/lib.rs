// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! State persistence for the workflow execution engine (§4.4).

pub mod error;
pub mod memory;
pub mod models;
pub mod sqlx_store;
pub mod store;

pub use error::{Result, StorageError};
pub use memory::InMemoryExecutionStore;
pub use models::*;
pub use sqlx_store::SqlxExecutionStore;
pub use store::{ExecutionFields, ExecutionStore, ExecutionStoreRef};
