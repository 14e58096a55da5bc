//! v001 -- Initial schema creation.
//!
//! Creates the `author_profiles` table: one row per author id, last write
//! wins, pruned by TTL and an LRU-style row cap.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Author display profiles
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS author_profiles (
    author_id      TEXT PRIMARY KEY NOT NULL,  -- opaque backend principal id
    display_name   TEXT NOT NULL,
    avatar_initial TEXT NOT NULL,
    photo_url      TEXT,                       -- nullable
    fetched_at     TEXT NOT NULL               -- ISO-8601 / RFC-3339, wall clock
);

CREATE INDEX IF NOT EXISTS idx_author_profiles_fetched_at
    ON author_profiles(fetched_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
