// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use loom_acl_core::{ConfigurationError, RuleId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AclError {
	#[error("Configuration error: {0}")]
	Configuration(#[from] ConfigurationError),

	#[error("Resolution error: {0}")]
	Resolution(String),

	#[error("Database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("Rule not found: {0}")]
	RuleNotFound(RuleId),
}

pub type Result<T> = std::result::Result<T, AclError>;
