// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Outbound collaborators: object field values, object trees and group membership.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use loom_acl_core::{FieldMap, GroupId, ObjectId, UserId};

use crate::error::Result;

/// Read access to the objects rules are evaluated against.
#[async_trait]
pub trait ObjectStore: Send + Sync {
	/// Field values of one instance, or `None` if it does not exist.
	async fn load_field_values(&self, object_type: &str, id: &ObjectId)
		-> Result<Option<FieldMap>>;

	/// Parent of an instance of a hierarchical type; `None` at the root.
	async fn get_parent(&self, object_type: &str, id: &ObjectId) -> Result<Option<ObjectId>>;

	async fn is_hierarchical(&self, object_type: &str) -> Result<bool>;

	/// Object type a relation field points at. Submitted values of such a
	/// field are ids of that type.
	async fn relation_target(&self, object_type: &str, field: &str) -> Result<Option<String>> {
		let _ = (object_type, field);
		Ok(None)
	}
}

/// Group membership lookup.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
	async fn groups_of(&self, user: UserId) -> Result<Vec<GroupId>>;
}

#[derive(Debug, Clone, Default)]
struct StoredObject {
	fields: FieldMap,
	parent: Option<ObjectId>,
}

#[derive(Debug, Default)]
struct ObjectState {
	objects: HashMap<(String, ObjectId), StoredObject>,
	hierarchical: HashSet<String>,
	relations: HashMap<(String, String), String>,
}

/// In-memory [`ObjectStore`].
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
	state: RwLock<ObjectState>,
}

impl MemoryObjectStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Stores an instance. Its id is exposed as the `id` field unless `fields` sets one.
	pub fn insert(&self, object_type: &str, id: impl Into<ObjectId>, fields: FieldMap) {
		self.put(object_type, id.into(), None, fields);
	}

	/// Stores an instance below `parent`.
	pub fn insert_child(
		&self,
		object_type: &str,
		id: impl Into<ObjectId>,
		parent: impl Into<ObjectId>,
		fields: FieldMap,
	) {
		self.put(object_type, id.into(), Some(parent.into()), fields);
	}

	fn put(&self, object_type: &str, id: ObjectId, parent: Option<ObjectId>, mut fields: FieldMap) {
		fields
			.entry("id".to_string())
			.or_insert_with(|| id.to_value());
		self.state.write().objects.insert(
			(object_type.to_string(), id),
			StoredObject { fields, parent },
		);
	}

	pub fn remove(&self, object_type: &str, id: &ObjectId) -> bool {
		self.state
			.write()
			.objects
			.remove(&(object_type.to_string(), id.clone()))
			.is_some()
	}

	pub fn mark_hierarchical(&self, object_type: &str) {
		self.state.write().hierarchical.insert(object_type.to_string());
	}

	pub fn define_relation(&self, object_type: &str, field: &str, target_type: &str) {
		self.state.write().relations.insert(
			(object_type.to_string(), field.to_string()),
			target_type.to_string(),
		);
	}
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
	async fn load_field_values(
		&self,
		object_type: &str,
		id: &ObjectId,
	) -> Result<Option<FieldMap>> {
		Ok(self
			.state
			.read()
			.objects
			.get(&(object_type.to_string(), id.clone()))
			.map(|o| o.fields.clone()))
	}

	async fn get_parent(&self, object_type: &str, id: &ObjectId) -> Result<Option<ObjectId>> {
		Ok(self
			.state
			.read()
			.objects
			.get(&(object_type.to_string(), id.clone()))
			.and_then(|o| o.parent.clone()))
	}

	async fn is_hierarchical(&self, object_type: &str) -> Result<bool> {
		Ok(self.state.read().hierarchical.contains(object_type))
	}

	async fn relation_target(&self, object_type: &str, field: &str) -> Result<Option<String>> {
		Ok(self
			.state
			.read()
			.relations
			.get(&(object_type.to_string(), field.to_string()))
			.cloned())
	}
}

/// In-memory [`GroupDirectory`].
#[derive(Debug, Default)]
pub struct MemoryDirectory {
	members: RwLock<HashMap<UserId, Vec<GroupId>>>,
}

impl MemoryDirectory {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_member(&self, group: GroupId, user: UserId) {
		let mut members = self.members.write();
		let groups = members.entry(user).or_default();
		if !groups.contains(&group) {
			groups.push(group);
		}
	}

	pub fn remove_member(&self, group: GroupId, user: UserId) {
		if let Some(groups) = self.members.write().get_mut(&user) {
			groups.retain(|g| *g != group);
		}
	}
}

#[async_trait]
impl GroupDirectory for MemoryDirectory {
	async fn groups_of(&self, user: UserId) -> Result<Vec<GroupId>> {
		Ok(self.members.read().get(&user).cloned().unwrap_or_default())
	}
}
