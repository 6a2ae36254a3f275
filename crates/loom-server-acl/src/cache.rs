// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Memoization of resolved decisions.
//!
//! Entries are grouped per object type. Every invalidation bumps a
//! generation counter; a [`CacheToken`] taken before resolution must still
//! match when the result is stored, otherwise the result is dropped. This
//! keeps a check that raced with a rule write from caching the old answer.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::debug;

use loom_acl_config::CacheConfig;
use loom_acl_core::{AclRequest, Target};

/// Cache key of a request: SHA-256 (hex) over everything that influences the verdict.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
	/// `targets` is the resolved target set (the user plus their groups).
	pub fn of(request: &AclRequest, targets: &[Target]) -> Self {
		let mut hasher = Sha256::new();
		hasher.update(request.object().as_bytes());
		hasher.update([0]);
		if let Some(id) = request.object_id() {
			hasher.update(id.as_str().as_bytes());
		}
		hasher.update([0]);
		hasher.update(request.mode().code().to_le_bytes());
		hasher.update([request.is_listing() as u8]);

		let mut targets = targets.to_vec();
		targets.sort();
		targets.dedup();
		for target in &targets {
			hasher.update(target.target_type().code().to_le_bytes());
			hasher.update(target.id().to_le_bytes());
		}
		hasher.update([0]);

		// FieldMap is ordered, so equal maps hash equally.
		for (field, value) in request.fields() {
			hasher.update(field.as_bytes());
			hasher.update([0]);
			hasher.update(value.to_string().as_bytes());
			hasher.update([0]);
		}

		Self(hex::encode(hasher.finalize()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Fingerprint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// What an invalidation drops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationScope {
	All,
	Object(String),
}

/// Snapshot of the invalidation state of one object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheToken {
	epoch: u64,
	generation: u64,
}

#[derive(Debug)]
struct Entry {
	allowed: bool,
	inserted: Instant,
	seq: u64,
}

#[derive(Debug, Default)]
struct Slot {
	generation: u64,
	entries: HashMap<Fingerprint, Entry>,
}

#[derive(Debug, Default)]
struct CacheState {
	epoch: u64,
	objects: HashMap<String, Slot>,
	order: VecDeque<(u64, String, Fingerprint)>,
	len: usize,
	seq: u64,
}

impl CacheState {
	fn clear(&mut self) {
		self.epoch += 1;
		self.objects.clear();
		self.order.clear();
		self.len = 0;
	}

	fn is_live(&self, seq: u64, object: &str, fingerprint: &Fingerprint) -> bool {
		self.objects
			.get(object)
			.and_then(|slot| slot.entries.get(fingerprint))
			.is_some_and(|e| e.seq == seq)
	}

	/// Removes the oldest live entry. Returns false if there was none.
	fn evict_oldest(&mut self) -> bool {
		while let Some((seq, object, fingerprint)) = self.order.pop_front() {
			// Order records of replaced or invalidated entries are skipped.
			if self.is_live(seq, &object, &fingerprint) {
				if let Some(slot) = self.objects.get_mut(&object) {
					slot.entries.remove(&fingerprint);
				}
				self.len -= 1;
				return true;
			}
		}
		false
	}

	fn compact_order(&mut self) {
		let order = std::mem::take(&mut self.order);
		self.order = order
			.into_iter()
			.filter(|(seq, object, fingerprint)| self.is_live(*seq, object, fingerprint))
			.collect();
	}
}

/// Decision cache keyed by object type and [`Fingerprint`].
#[derive(Debug)]
pub struct DecisionCache {
	enabled: AtomicBool,
	ttl: Option<Duration>,
	max_entries: usize,
	state: RwLock<CacheState>,
}

impl DecisionCache {
	pub fn new(config: &CacheConfig) -> Self {
		Self {
			enabled: AtomicBool::new(config.enabled),
			ttl: config.ttl,
			max_entries: config.max_entries.max(1),
			state: RwLock::new(CacheState::default()),
		}
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled.load(Ordering::Acquire)
	}

	/// Disabling also drops every entry, so re-enabling starts cold.
	pub fn set_enabled(&self, enabled: bool) {
		let was = self.enabled.swap(enabled, Ordering::AcqRel);
		if was && !enabled {
			self.state.write().clear();
		}
		debug!(enabled, "decision cache toggled");
	}

	/// Take before resolving; pass to [`DecisionCache::put`] afterwards.
	pub fn token(&self, object: &str) -> CacheToken {
		let state = self.state.read();
		CacheToken {
			epoch: state.epoch,
			generation: state.objects.get(object).map_or(0, |s| s.generation),
		}
	}

	pub fn get(&self, object: &str, fingerprint: &Fingerprint) -> Option<bool> {
		if !self.is_enabled() {
			return None;
		}

		let state = self.state.read();
		let entry = state.objects.get(object)?.entries.get(fingerprint)?;
		if let Some(ttl) = self.ttl {
			if entry.inserted.elapsed() >= ttl {
				return None;
			}
		}
		Some(entry.allowed)
	}

	/// Stores a decision unless caching is off or `object` was invalidated
	/// since `token` was taken.
	pub fn put(&self, object: &str, fingerprint: Fingerprint, allowed: bool, token: CacheToken) {
		if !self.is_enabled() {
			return;
		}

		let mut state = self.state.write();
		if state.epoch != token.epoch {
			debug!(object, "discarding decision computed before a full invalidation");
			return;
		}

		state.seq += 1;
		let seq = state.seq;
		let slot = state.objects.entry(object.to_string()).or_default();
		if slot.generation != token.generation {
			debug!(object, "discarding decision computed before an invalidation");
			return;
		}

		let entry = Entry {
			allowed,
			inserted: Instant::now(),
			seq,
		};
		let replaced = slot.entries.insert(fingerprint.clone(), entry).is_some();
		if !replaced {
			state.len += 1;
		}
		state.order.push_back((seq, object.to_string(), fingerprint));

		while state.len > self.max_entries && state.evict_oldest() {}
		if state.order.len() > self.max_entries.saturating_mul(2) {
			state.compact_order();
		}
	}

	pub fn invalidate(&self, scope: &InvalidationScope) {
		let mut state = self.state.write();
		match scope {
			InvalidationScope::All => state.clear(),
			InvalidationScope::Object(object) => {
				let slot = state.objects.entry(object.clone()).or_default();
				slot.generation += 1;
				let dropped = slot.entries.len();
				slot.entries.clear();
				state.len -= dropped;
			}
		}
		debug!(?scope, "decision cache invalidated");
	}

	pub fn len(&self) -> usize {
		self.state.read().len
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use loom_acl_core::{GroupId, UserId};

	fn cache(max_entries: usize, ttl: Option<Duration>) -> DecisionCache {
		DecisionCache::new(&CacheConfig {
			enabled: true,
			ttl,
			max_entries,
		})
	}

	fn fp(object: &str, id: i64) -> Fingerprint {
		let request = AclRequest::for_object(object, id).target_user(1);
		Fingerprint::of(&request, &[Target::User(UserId(1))])
	}

	#[test]
	fn fingerprint_ignores_target_order_and_duplicates() {
		let request = AclRequest::create("item").target_user(1);
		let a = Fingerprint::of(
			&request,
			&[Target::User(UserId(1)), Target::Group(GroupId(2))],
		);
		let b = Fingerprint::of(
			&request,
			&[
				Target::Group(GroupId(2)),
				Target::User(UserId(1)),
				Target::Group(GroupId(2)),
			],
		);
		assert_eq!(a, b);
		assert_eq!(a.as_str().len(), 64);
	}

	#[test]
	fn fingerprint_covers_fields_mode_and_listing() {
		let targets = [Target::User(UserId(1))];
		let base = AclRequest::for_object("item", 1).target_user(1);
		let with_field = base.clone().with_field("title", "x");
		let update = base.clone().only_update_mode();
		let listing = base.clone().only_listing_mode();
		let list_mode = base.clone().with_mode(loom_acl_core::Mode::List);

		let fps: Vec<Fingerprint> = [&base, &with_field, &update, &listing, &list_mode]
			.iter()
			.map(|r| Fingerprint::of(r, &targets))
			.collect();
		for i in 0..fps.len() {
			for j in (i + 1)..fps.len() {
				assert_ne!(fps[i], fps[j], "requests {i} and {j} collide");
			}
		}
	}

	#[test]
	fn put_then_get() {
		let cache = cache(10, None);
		let token = cache.token("item");
		cache.put("item", fp("item", 1), true, token);
		assert_eq!(cache.get("item", &fp("item", 1)), Some(true));
		assert_eq!(cache.get("item", &fp("item", 2)), None);
		assert_eq!(cache.len(), 1);
	}

	#[test]
	fn stale_token_is_discarded_after_object_invalidation() {
		let cache = cache(10, None);
		let token = cache.token("item");
		cache.invalidate(&InvalidationScope::Object("item".into()));
		cache.put("item", fp("item", 1), true, token);
		assert_eq!(cache.get("item", &fp("item", 1)), None);

		let fresh = cache.token("item");
		cache.put("item", fp("item", 1), false, fresh);
		assert_eq!(cache.get("item", &fp("item", 1)), Some(false));
	}

	#[test]
	fn stale_token_is_discarded_after_full_invalidation() {
		let cache = cache(10, None);
		let token = cache.token("node");
		cache.invalidate(&InvalidationScope::All);
		cache.put("node", fp("node", 1), true, token);
		assert!(cache.is_empty());
	}

	#[test]
	fn object_invalidation_leaves_other_types() {
		let cache = cache(10, None);
		cache.put("item", fp("item", 1), true, cache.token("item"));
		cache.put("node", fp("node", 1), true, cache.token("node"));
		cache.invalidate(&InvalidationScope::Object("item".into()));
		assert_eq!(cache.get("item", &fp("item", 1)), None);
		assert_eq!(cache.get("node", &fp("node", 1)), Some(true));
		assert_eq!(cache.len(), 1);
	}

	#[test]
	fn evicts_oldest_at_capacity() {
		let cache = cache(2, None);
		for id in 1..=3 {
			cache.put("item", fp("item", id), true, cache.token("item"));
		}
		assert_eq!(cache.len(), 2);
		assert_eq!(cache.get("item", &fp("item", 1)), None);
		assert_eq!(cache.get("item", &fp("item", 3)), Some(true));
	}

	#[test]
	fn expired_entries_are_misses() {
		let cache = cache(10, Some(Duration::ZERO));
		cache.put("item", fp("item", 1), true, cache.token("item"));
		assert_eq!(cache.get("item", &fp("item", 1)), None);
	}

	#[test]
	fn disabling_clears_and_bypasses() {
		let cache = cache(10, None);
		cache.put("item", fp("item", 1), true, cache.token("item"));
		cache.set_enabled(false);
		assert!(cache.is_empty());

		cache.put("item", fp("item", 1), true, cache.token("item"));
		assert_eq!(cache.get("item", &fp("item", 1)), None);

		cache.set_enabled(true);
		cache.put("item", fp("item", 1), true, cache.token("item"));
		assert_eq!(cache.get("item", &fp("item", 1)), Some(true));
	}
}
