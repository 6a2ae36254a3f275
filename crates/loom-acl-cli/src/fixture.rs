// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! JSON fixtures describing rules, objects and group memberships.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use loom_server_acl::{
	FieldMap, GroupId, MemoryDirectory, MemoryObjectStore, MemoryRuleStore, ObjectId, Rule,
	RuleStore, UserId,
};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
	#[serde(default)]
	pub rules: Vec<Rule>,
	#[serde(default)]
	pub objects: Vec<FixtureObject>,
	#[serde(default)]
	pub hierarchical: Vec<String>,
	#[serde(default)]
	pub relations: Vec<FixtureRelation>,
	#[serde(default)]
	pub memberships: Vec<Membership>,
}

#[derive(Debug, Deserialize)]
pub struct FixtureObject {
	pub object_type: String,
	#[serde(deserialize_with = "object_id")]
	pub id: ObjectId,
	#[serde(default, deserialize_with = "optional_object_id")]
	pub parent: Option<ObjectId>,
	#[serde(default)]
	pub fields: FieldMap,
}

#[derive(Debug, Deserialize)]
pub struct FixtureRelation {
	pub object_type: String,
	pub field: String,
	pub target: String,
}

#[derive(Debug, Deserialize)]
pub struct Membership {
	pub group: GroupId,
	pub user: UserId,
}

/// Stores populated from a fixture.
pub struct Backend {
	pub rules: Arc<MemoryRuleStore>,
	pub objects: Arc<MemoryObjectStore>,
	pub directory: Arc<MemoryDirectory>,
}

fn object_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ObjectId, D::Error> {
	let value = Value::deserialize(deserializer)?;
	ObjectId::from_value(&value)
		.ok_or_else(|| serde::de::Error::custom(format!("invalid object id {value}")))
}

fn optional_object_id<'de, D: Deserializer<'de>>(
	deserializer: D,
) -> Result<Option<ObjectId>, D::Error> {
	match Option::<Value>::deserialize(deserializer)? {
		None | Some(Value::Null) => Ok(None),
		Some(value) => ObjectId::from_value(&value)
			.map(Some)
			.ok_or_else(|| serde::de::Error::custom(format!("invalid object id {value}"))),
	}
}

impl Fixture {
	pub fn load(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path)
			.with_context(|| format!("failed to read fixture {}", path.display()))?;
		serde_json::from_str(&text)
			.with_context(|| format!("failed to parse fixture {}", path.display()))
	}

	/// Loads everything into in-memory stores.
	///
	/// Rules are saved in file order, so later entries win ties on prio.
	pub async fn into_backend(self) -> Result<Backend> {
		let rules = Arc::new(MemoryRuleStore::new());
		for rule in self.rules {
			let id = rule.id;
			rules
				.save_rule(rule)
				.await
				.with_context(|| format!("failed to store fixture rule {id}"))?;
		}

		let objects = Arc::new(MemoryObjectStore::new());
		for object_type in &self.hierarchical {
			objects.mark_hierarchical(object_type);
		}
		for relation in &self.relations {
			objects.define_relation(&relation.object_type, &relation.field, &relation.target);
		}
		for object in self.objects {
			match object.parent {
				Some(parent) => {
					objects.insert_child(&object.object_type, object.id, parent, object.fields)
				}
				None => objects.insert(&object.object_type, object.id, object.fields),
			}
		}

		let directory = Arc::new(MemoryDirectory::new());
		for membership in self.memberships {
			directory.add_member(membership.group, membership.user);
		}

		tracing::debug!(rules = rules.len(), "fixture loaded");

		Ok(Backend {
			rules,
			objects,
			directory,
		})
	}
}
