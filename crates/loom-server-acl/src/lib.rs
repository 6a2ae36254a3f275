// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! ACL decision engine for Loom.
//!
//! This crate resolves [`AclRequest`]s against stored rules and memoizes the
//! results.
//!
//! # Architecture
//!
//! - `store` / `repository` - Rule storage (in-memory and SQLite)
//! - `provider` - Object field values, object trees and group membership
//! - `resolver` - Rule matching and ranking
//! - `hierarchy` - Inheritance of `sub` rules from ancestors
//! - `cache` - Decision cache with generation-checked writes
//! - `service` - The [`Acl`] entry point tying these together
//!
//! # Example
//!
//! ```
//! use loom_server_acl::{Acl, AclRequest, Target, UserId};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let acl = Acl::builder().build();
//! acl.set_object_list("item", Target::User(UserId(7)), true).await.unwrap();
//!
//! let request = AclRequest::create("item").target_user(7);
//! assert!(acl.check(&request).await);
//! # });
//! ```

pub mod cache;
pub mod error;
pub mod hierarchy;
pub mod provider;
pub mod repository;
pub mod resolver;
pub mod service;
pub mod store;

pub use cache::{CacheToken, DecisionCache, Fingerprint, InvalidationScope};
pub use error::{AclError, Result};
pub use hierarchy::HierarchyResolver;
pub use provider::{GroupDirectory, MemoryDirectory, MemoryObjectStore, ObjectStore};
pub use repository::{create_pool, SqliteRuleStore};
pub use resolver::{Candidate, Specificity};
pub use service::{Acl, AclBuilder};
pub use store::{MemoryRuleStore, RuleStore};

// Re-export core types for convenience
pub use loom_acl_core::*;
