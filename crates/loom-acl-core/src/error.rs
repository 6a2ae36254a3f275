// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Raised while loading rules or conditions, never while evaluating them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
	#[error("unknown condition operator '{0}'")]
	UnknownOperator(String),

	#[error("condition leaf needs exactly 3 elements (field, operator, value), got {0}")]
	InvalidArity(usize),

	#[error("invalid condition field '{0}'")]
	InvalidField(String),

	#[error("condition value for field '{field}' must be a string, number, boolean or null")]
	InvalidValue { field: String },

	#[error("unknown conjunction '{0}', expected AND or OR")]
	UnknownConjunction(String),

	#[error("condition is empty")]
	EmptyCondition,

	#[error("malformed condition: {0}")]
	MalformedCondition(String),

	#[error("unknown target type code {0}")]
	UnknownTargetType(i64),

	#[error("unknown mode '{0}'")]
	UnknownMode(String),

	#[error("unknown constraint type code {0}")]
	UnknownConstraintType(i64),

	#[error("{0} constraint requires a constraint code")]
	MissingConstraintCode(&'static str),

	#[error("invalid rule id '{0}'")]
	InvalidRuleId(String),

	#[error("invalid JSON in {context}: {message}")]
	InvalidJson {
		context: &'static str,
		message: String,
	},
}

pub type Result<T> = std::result::Result<T, ConfigurationError>;
