//! SQL migration definitions for the Regwatch database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: sources, snapshots, changes, findings",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Monitored documents (deactivated, never deleted)
CREATE TABLE IF NOT EXISTS sources (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    url        TEXT NOT NULL UNIQUE,
    kind       TEXT NOT NULL,
    active     INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sources_active ON sources(active);

-- Append-only fetch history
CREATE TABLE IF NOT EXISTS snapshots (
    id            TEXT PRIMARY KEY,
    source_id     TEXT NOT NULL REFERENCES sources(id),
    content       TEXT NOT NULL,
    fingerprint   TEXT NOT NULL,
    captured_at   TEXT NOT NULL,
    status        TEXT NOT NULL CHECK (status IN ('success', 'error')),
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_snapshots_latest
    ON snapshots(source_id, status, captured_at);
CREATE INDEX IF NOT EXISTS idx_snapshots_fingerprint ON snapshots(fingerprint);

-- Significant differences between successive successful snapshots
CREATE TABLE IF NOT EXISTS changes (
    id                TEXT PRIMARY KEY,
    source_id         TEXT NOT NULL REFERENCES sources(id),
    prior_snapshot_id TEXT REFERENCES snapshots(id),
    new_snapshot_id   TEXT NOT NULL REFERENCES snapshots(id),
    diff_text         TEXT NOT NULL,
    detected_at       TEXT NOT NULL,
    processed         INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_changes_source ON changes(source_id);
CREATE INDEX IF NOT EXISTS idx_changes_processed ON changes(processed, detected_at);

-- Scored findings; list columns hold JSON arrays
CREATE TABLE IF NOT EXISTS findings (
    id                     TEXT PRIMARY KEY,
    change_id              TEXT NOT NULL REFERENCES changes(id),
    source_id              TEXT NOT NULL REFERENCES sources(id),
    title                  TEXT NOT NULL,
    summary                TEXT NOT NULL,
    deadline               TEXT,
    impact                 TEXT NOT NULL CHECK (impact IN ('high', 'medium', 'low')),
    categories             TEXT NOT NULL,
    regions                TEXT NOT NULL,
    transaction_types      TEXT NOT NULL,
    technical_requirements TEXT NOT NULL,
    keywords               TEXT NOT NULL,
    relevance_score        INTEGER NOT NULL CHECK (relevance_score BETWEEN 1 AND 10),
    created_at             TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_findings_change ON findings(change_id);
CREATE INDEX IF NOT EXISTS idx_findings_relevance ON findings(relevance_score);
CREATE INDEX IF NOT EXISTS idx_findings_deadline ON findings(deadline);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
