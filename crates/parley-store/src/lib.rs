//! # parley-store
//!
//! Durable storage for the Parley relay, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection`, runs schema migrations on open, and provides typed
//! helpers for users, messages (with their delivery receipts) and the
//! persisted half of presence.

pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod presence;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
