//! Tests for the bridge module, run against a fake scheduler console.
//!
//! - `helpers` - fake console and harness
//! - `tasks` - create, read, list, delete and run
//! - `updates` - in-place edits and delete-and-recreate
//! - `dependencies` - dependency links and policy
//! - `generator` - API key and AI generation
//! - `degraded` - simulation fallback

#[allow(clippy::unwrap_used, clippy::expect_used)]
pub mod helpers;
