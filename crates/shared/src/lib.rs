#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Tipline Shared
//!
//! Types and database plumbing used by every crate in the workspace.

pub mod db;
pub mod types;

pub use db::{create_migration_pool, create_pool, run_migrations, DbError};
pub use types::{AccessTier, ParseEnumError, Role};
