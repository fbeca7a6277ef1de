//! # roomchat-store
//!
//! Local message storage for roomchat, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection`, plus the [`MessageStore`] trait the replicator
//! programs against so tests can swap in a failing store.

pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod profile;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use messages::MessageStore;
pub use models::*;
