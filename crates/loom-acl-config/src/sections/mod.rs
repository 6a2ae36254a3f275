// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod cache;
mod database;
mod engine;
mod logging;

pub use cache::{CacheConfig, CacheConfigLayer};
pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use engine::{EngineConfig, EngineConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
