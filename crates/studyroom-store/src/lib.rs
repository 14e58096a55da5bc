//! # studyroom-store
//!
//! Persisted layer of the author enrichment cache: a small SQLite database
//! holding author display profiles with their fetch timestamps, so a fresh
//! session can answer lookups without hitting the backend when the entry is
//! still within its TTL.
//!
//! The [`Database`] wrapper runs schema migrations on open and exposes typed
//! CRUD helpers; callers never touch SQL directly.

pub mod database;
pub mod error;
pub mod profiles;

mod migrations;

pub use database::Database;
pub use error::{Result, StoreError};
