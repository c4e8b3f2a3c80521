//! Storage layer for the watcher
//!
//! SQLite persistence for the image mirror, the dependency edges and the
//! owned service set.
//!
//! # Module Structure
//! - `database`: Connection pool and lifecycle management
//! - `models`: Row types
//! - `schema`: Schema initialization
//! - `operations`: Upsert, delete and listing operations
//! - `staleness`: Streaming stale-edge query

mod database;
mod models;
mod operations;
mod schema;
mod staleness;

pub use database::Database;
pub use models::{Dependency, Image, OwnedService, StaleDependency};
