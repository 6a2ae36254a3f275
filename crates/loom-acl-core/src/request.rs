// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::FieldMap;
use crate::types::{GroupId, Mode, ObjectId, Target, UserId};

/// Describes a single access question: may `target` perform `mode` on
/// `object` (optionally a specific instance, optionally with submitted values)?
///
/// ```
/// use loom_acl_core::{AclRequest, Mode};
///
/// let request = AclRequest::for_object("content/node", 12)
///     .only_update_mode()
///     .target_user(3)
///     .with_field("title", "Draft");
/// assert_eq!(request.mode(), Mode::Update);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AclRequest {
	object: String,
	object_id: Option<ObjectId>,
	mode: Mode,
	target: Option<Target>,
	#[serde(default)]
	fields: FieldMap,
	#[serde(default)]
	listing: bool,
}

impl AclRequest {
	/// A VIEW request against the object type as a whole.
	pub fn create(object: impl Into<String>) -> Self {
		Self {
			object: object.into(),
			object_id: None,
			mode: Mode::View,
			target: None,
			fields: FieldMap::new(),
			listing: false,
		}
	}

	/// A VIEW request against one instance.
	pub fn for_object(object: impl Into<String>, id: impl Into<ObjectId>) -> Self {
		Self::create(object).with_object_id(id)
	}

	pub fn with_object_id(mut self, id: impl Into<ObjectId>) -> Self {
		self.object_id = Some(id.into());
		self
	}

	/// Switches to LIST mode and marks the request as a listing, which skips
	/// field-level checks.
	pub fn only_listing_mode(mut self) -> Self {
		self.mode = Mode::List;
		self.listing = true;
		self
	}

	pub fn only_update_mode(mut self) -> Self {
		self.mode = Mode::Update;
		self.listing = false;
		self
	}

	pub fn with_mode(mut self, mode: Mode) -> Self {
		self.mode = mode;
		self
	}

	pub fn target_user(mut self, id: impl Into<UserId>) -> Self {
		self.target = Some(Target::User(id.into()));
		self
	}

	pub fn target_group(mut self, id: impl Into<GroupId>) -> Self {
		self.target = Some(Target::Group(id.into()));
		self
	}

	/// Replaces the submitted field values.
	pub fn set_field(mut self, fields: FieldMap) -> Self {
		self.fields = fields;
		self
	}

	pub fn with_field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
		self.fields.insert(field.into(), value.into());
		self
	}

	pub fn object(&self) -> &str {
		&self.object
	}

	pub fn object_id(&self) -> Option<&ObjectId> {
		self.object_id.as_ref()
	}

	pub fn mode(&self) -> Mode {
		self.mode
	}

	pub fn target(&self) -> Option<Target> {
		self.target
	}

	pub fn fields(&self) -> &FieldMap {
		&self.fields
	}

	pub fn is_listing(&self) -> bool {
		self.listing
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn defaults_to_view_without_target() {
		let request = AclRequest::create("item");
		assert_eq!(request.mode(), Mode::View);
		assert_eq!(request.target(), None);
		assert_eq!(request.object_id(), None);
		assert!(!request.is_listing());
	}

	#[test]
	fn listing_mode_sets_flag() {
		let request = AclRequest::create("item").only_listing_mode().target_group(4);
		assert_eq!(request.mode(), Mode::List);
		assert!(request.is_listing());
		assert_eq!(request.target(), Some(Target::Group(GroupId(4))));

		let request = request.only_update_mode();
		assert!(!request.is_listing());
	}

	#[test]
	fn set_field_replaces_and_with_field_adds() {
		let mut fields = FieldMap::new();
		fields.insert("a".into(), json!(1));
		let request = AclRequest::create("item")
			.with_field("b", 2)
			.set_field(fields)
			.with_field("c", "x");
		assert_eq!(request.fields().len(), 2);
		assert_eq!(request.fields()["c"], json!("x"));
		assert!(!request.fields().contains_key("b"));
	}
}
