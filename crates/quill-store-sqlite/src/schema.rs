//! SQL schema for the quill SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;

-- One row per generated post attempt. Rows are never deleted; `status` only
-- moves forward through the state machine via guarded UPDATEs.
CREATE TABLE IF NOT EXISTS candidates (
    candidate_id TEXT PRIMARY KEY,
    target_id    TEXT NOT NULL,
    post_type    TEXT NOT NULL,
    thread_json  TEXT NOT NULL,   -- {\"posts\": [...]}, position-ordered
    status       TEXT NOT NULL DEFAULT 'pending'
                 CHECK (status IN ('pending', 'selected', 'posted', 'rejected', 'error')),
    created_at   TEXT NOT NULL,   -- RFC 3339 UTC, fixed width
    selected_at  TEXT,            -- write-once
    posted_at    TEXT,            -- write-once
    claimed_at   TEXT             -- write-once; taken by the publish run that owns the row
);

CREATE INDEX IF NOT EXISTS candidates_status_idx ON candidates(status, created_at);
CREATE INDEX IF NOT EXISTS candidates_target_idx ON candidates(target_id);

-- Append-only; at most one record per target.
CREATE TABLE IF NOT EXISTS publications (
    publication_id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_id      TEXT NOT NULL UNIQUE,
    first_text     TEXT NOT NULL,
    post_type      TEXT NOT NULL,
    published_at   TEXT NOT NULL,
    candidate_id   TEXT
);

CREATE TRIGGER IF NOT EXISTS publications_no_update
BEFORE UPDATE ON publications
BEGIN
    SELECT RAISE(ABORT, 'publications are append-only');
END;

CREATE TRIGGER IF NOT EXISTS publications_no_delete
BEFORE DELETE ON publications
BEGIN
    SELECT RAISE(ABORT, 'publications are append-only');
END;

PRAGMA user_version = 2;
";

/// Steps from an older `user_version`, run before [`SCHEMA`].
pub const MIGRATIONS: &[(i64, &str)] = &[
  (1, "ALTER TABLE candidates ADD COLUMN claimed_at TEXT;"),
];
