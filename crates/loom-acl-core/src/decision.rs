// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::types::{ObjectId, RuleId};

/// Outcome of reducing the applicable rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
	Allow,
	Deny,
	/// No rule matched. Collapsed to allow or deny by the default policy.
	NoRule,
}

impl Decision {
	pub fn from_access(access: bool) -> Self {
		if access {
			Decision::Allow
		} else {
			Decision::Deny
		}
	}
}

/// What produced a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerdictSource {
	SuperAdmin,
	Rule {
		rule_id: RuleId,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		inherited_from: Option<ObjectId>,
	},
	FieldRule {
		rule_id: RuleId,
		field: String,
	},
	Default,
}

/// A decision together with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
	pub decision: Decision,
	pub source: VerdictSource,
}

impl Verdict {
	pub fn new(decision: Decision, source: VerdictSource) -> Self {
		Self { decision, source }
	}

	pub fn default_deny() -> Self {
		Self::new(Decision::Deny, VerdictSource::Default)
	}

	pub fn super_admin() -> Self {
		Self::new(Decision::Allow, VerdictSource::SuperAdmin)
	}

	pub fn is_allowed(&self) -> bool {
		self.decision == Decision::Allow
	}
}
