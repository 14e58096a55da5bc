//! CRUD operations for persisted author profiles.
//!
//! The table is a write-through mirror of the in-memory enrichment cache:
//! writes are last-write-wins per author id, reads apply the same wall-clock
//! TTL as the memory layer so both agree on expiry across process restarts.

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;

use studyroom_shared::{AuthorProfile, DisplayEntry, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    // ------------------------------------------------------------------
    // Create / update
    // ------------------------------------------------------------------

    /// Insert or replace the profile row for one author.
    pub fn upsert_profile(&self, author: &UserId, entry: &DisplayEntry) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO author_profiles
                 (author_id, display_name, avatar_initial, photo_url, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                author.0,
                entry.profile.display_name,
                entry.profile.avatar_initial,
                entry.profile.photo_url,
                entry.fetched_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch the stored entry for one author, regardless of age.
    pub fn get_profile(&self, author: &UserId) -> Result<DisplayEntry> {
        self.conn()
            .query_row(
                "SELECT display_name, avatar_initial, photo_url, fetched_at
                 FROM author_profiles
                 WHERE author_id = ?1",
                params![author.0],
                row_to_entry,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Fetch the stored entry only if it is still within `ttl` as of `now`.
    ///
    /// An expired row reads as absent; it is left in place for
    /// [`Database::prune_expired`] to collect.
    pub fn get_fresh_profile(
        &self,
        author: &UserId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Option<DisplayEntry>> {
        match self.get_profile(author) {
            Ok(entry) if entry.is_expired(now, ttl) => Ok(None),
            Ok(entry) => Ok(Some(entry)),
            Err(StoreError::NotFound) => Ok(None),
            Err(other) => Err(other),
        }
    }

    /// Number of rows currently stored.
    pub fn profile_count(&self) -> Result<usize> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM author_profiles", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete every row older than `ttl` as of `now`. Returns the number of
    /// rows removed.
    pub fn prune_expired(&self, now: DateTime<Utc>, ttl: Duration) -> Result<usize> {
        let cutoff = (now - ttl).to_rfc3339();
        let affected = self.conn().execute(
            "DELETE FROM author_profiles WHERE fetched_at < ?1",
            params![cutoff],
        )?;
        Ok(affected)
    }

    /// Evict the oldest rows (by `fetched_at`) until at most `cap` remain.
    /// Returns the number of rows removed.
    pub fn enforce_profile_cap(&self, cap: usize) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM author_profiles
             WHERE author_id NOT IN (
                 SELECT author_id FROM author_profiles
                 ORDER BY fetched_at DESC
                 LIMIT ?1
             )",
            params![cap as i64],
        )?;
        Ok(affected)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`DisplayEntry`].
fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<DisplayEntry> {
    let display_name: String = row.get(0)?;
    let avatar_initial: String = row.get(1)?;
    let photo_url: Option<String> = row.get(2)?;
    let fetched_str: String = row.get(3)?;

    let fetched_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&fetched_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(DisplayEntry {
        profile: AuthorProfile {
            display_name,
            avatar_initial,
            photo_url,
        },
        fetched_at,
    })
}
