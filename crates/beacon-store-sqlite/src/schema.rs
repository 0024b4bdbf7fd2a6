//! SQL schema for the Beacon SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS incidents (
    incident_id       TEXT PRIMARY KEY,
    subject_id        TEXT NOT NULL,
    subject_name      TEXT NOT NULL,
    subject_contact   TEXT NOT NULL,
    status            TEXT NOT NULL CHECK (status IN ('active', 'resolved')),
    started_at        TEXT NOT NULL,   -- RFC 3339 UTC; store-assigned
    ended_at          TEXT,            -- set once, on resolve
    initial_fix       TEXT NOT NULL,   -- JSON LocationFix; never updated
    last_fix          TEXT NOT NULL,   -- JSON LocationFix; frozen once resolved
    notified_contacts TEXT NOT NULL DEFAULT '[]'
);

-- At most one active incident per subject.
CREATE UNIQUE INDEX IF NOT EXISTS incidents_one_active_idx
    ON incidents(subject_id) WHERE status = 'active';

CREATE INDEX IF NOT EXISTS incidents_subject_idx ON incidents(subject_id, started_at);

PRAGMA user_version = 1;
";
