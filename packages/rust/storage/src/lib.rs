//! Embedded libSQL content store.
//!
//! The [`Storage`] struct wraps a libSQL database holding monitored sources,
//! their append-only snapshot history, detected changes, and scored findings.
//!
//! **Write rules:**
//! - every operation is its own implicit transaction, except
//!   [`Storage::record_finding`], which inserts the finding and flips the
//!   owning change to processed in one transaction
//! - sources are upserted by locator; snapshots, changes, and findings are
//!   insert-only

mod migrations;

use std::path::Path;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use libsql::{Connection, Database, params};
use regwatch_shared::{
    Change, ExtractedFinding, Finding, FindingRecord, Impact, RegwatchError, Result, Snapshot,
    SnapshotStatus, Source,
};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Findings whose deadline is this close count as urgent.
const URGENT_WITHIN_DAYS: i64 = 30;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RegwatchError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        Self::from_database(db).await
    }

    /// Open a private in-memory database (tests and dry runs).
    pub async fn open_in_memory() -> Result<Self> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(db_err)?;
        Self::from_database(db).await
    }

    async fn from_database(db: Database) -> Result<Self> {
        let conn = db.connect().map_err(db_err)?;
        conn.execute("PRAGMA foreign_keys = ON", params![])
            .await
            .map_err(db_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    RegwatchError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Source operations
    // -----------------------------------------------------------------------

    /// Insert a source, or update the existing record with the same locator.
    ///
    /// The lookup-then-write is explicit so the upsert does not depend on
    /// engine-specific conflict clauses. `created_at` survives updates.
    #[instrument(skip(self), fields(url))]
    pub async fn upsert_source(
        &self,
        name: &str,
        url: &str,
        kind: &str,
        active: bool,
    ) -> Result<Source> {
        let now = timestamp(Utc::now());

        match self.get_source_by_url(url).await? {
            Some(existing) => {
                self.conn
                    .execute(
                        "UPDATE sources SET name = ?1, kind = ?2, active = ?3, updated_at = ?4
                         WHERE id = ?5",
                        params![name, kind, active as i64, now.as_str(), existing.id.as_str()],
                    )
                    .await
                    .map_err(db_err)?;
                debug!(source_id = %existing.id, "updated existing source");
            }
            None => {
                let id = Uuid::now_v7().to_string();
                self.conn
                    .execute(
                        "INSERT INTO sources (id, name, url, kind, active, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![
                            id.as_str(),
                            name,
                            url,
                            kind,
                            active as i64,
                            now.as_str(),
                            now.as_str()
                        ],
                    )
                    .await
                    .map_err(db_err)?;
                debug!(source_id = %id, "inserted new source");
            }
        }

        self.get_source_by_url(url)
            .await?
            .ok_or_else(|| RegwatchError::Storage(format!("source {url} vanished after upsert")))
    }

    /// Get a source by ID.
    pub async fn get_source(&self, id: &str) -> Result<Option<Source>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, url, kind, active, created_at, updated_at
                 FROM sources WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_source(&row)?)),
            None => Ok(None),
        }
    }

    /// Get a source by its unique locator.
    pub async fn get_source_by_url(&self, url: &str) -> Result<Option<Source>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, url, kind, active, created_at, updated_at
                 FROM sources WHERE url = ?1",
                params![url],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_source(&row)?)),
            None => Ok(None),
        }
    }

    /// List every source, active or not, ordered by name.
    pub async fn list_sources(&self) -> Result<Vec<Source>> {
        self.query_sources(
            "SELECT id, name, url, kind, active, created_at, updated_at
             FROM sources ORDER BY name",
        )
        .await
    }

    /// List the sources a scan should visit, in registration order.
    pub async fn list_active_sources(&self) -> Result<Vec<Source>> {
        self.query_sources(
            "SELECT id, name, url, kind, active, created_at, updated_at
             FROM sources WHERE active = 1 ORDER BY created_at, id",
        )
        .await
    }

    async fn query_sources(&self, sql: &str) -> Result<Vec<Source>> {
        let mut rows = self.conn.query(sql, params![]).await.map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_source(&row)?);
        }
        Ok(results)
    }

    /// Activate or deactivate a source. History is never deleted.
    /// Returns `false` if no source has this locator.
    pub async fn set_source_active(&self, url: &str, active: bool) -> Result<bool> {
        let now = timestamp(Utc::now());
        let affected = self
            .conn
            .execute(
                "UPDATE sources SET active = ?1, updated_at = ?2 WHERE url = ?3",
                params![active as i64, now.as_str(), url],
            )
            .await
            .map_err(db_err)?;
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // Snapshot operations
    // -----------------------------------------------------------------------

    /// Append a snapshot to a source's history.
    pub async fn insert_snapshot(&self, snapshot: &NewSnapshot) -> Result<Snapshot> {
        let id = Uuid::now_v7().to_string();
        self.conn
            .execute(
                "INSERT INTO snapshots (id, source_id, content, fingerprint, captured_at, status, error_message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.as_str(),
                    snapshot.source_id.as_str(),
                    snapshot.content.as_str(),
                    snapshot.fingerprint.as_str(),
                    timestamp(snapshot.captured_at),
                    snapshot.status.as_str(),
                    snapshot.error_message.as_deref()
                ],
            )
            .await
            .map_err(db_err)?;

        Ok(Snapshot {
            id,
            source_id: snapshot.source_id.clone(),
            content: snapshot.content.clone(),
            fingerprint: snapshot.fingerprint.clone(),
            captured_at: truncate_micros(snapshot.captured_at),
            status: snapshot.status,
            error_message: snapshot.error_message.clone(),
        })
    }

    /// The most recent successful snapshot for a source, by capture time.
    pub async fn latest_successful_snapshot(&self, source_id: &str) -> Result<Option<Snapshot>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, source_id, content, fingerprint, captured_at, status, error_message
                 FROM snapshots
                 WHERE source_id = ?1 AND status = 'success'
                 ORDER BY captured_at DESC, id DESC
                 LIMIT 1",
                params![source_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_snapshot(&row)?)),
            None => Ok(None),
        }
    }

    /// Number of snapshots (any status) recorded for a source.
    pub async fn count_snapshots(&self, source_id: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM snapshots WHERE source_id = ?1",
                params![source_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)?.max(0) as u64),
            None => Ok(0),
        }
    }

    // -----------------------------------------------------------------------
    // Change operations
    // -----------------------------------------------------------------------

    /// Record a detected change as unprocessed.
    pub async fn insert_change(&self, change: &NewChange) -> Result<Change> {
        let id = Uuid::now_v7().to_string();
        let detected_at = Utc::now();
        self.conn
            .execute(
                "INSERT INTO changes (id, source_id, prior_snapshot_id, new_snapshot_id, diff_text, detected_at, processed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
                params![
                    id.as_str(),
                    change.source_id.as_str(),
                    change.prior_snapshot_id.as_deref(),
                    change.new_snapshot_id.as_str(),
                    change.diff_text.as_str(),
                    timestamp(detected_at)
                ],
            )
            .await
            .map_err(db_err)?;

        Ok(Change {
            id,
            source_id: change.source_id.clone(),
            prior_snapshot_id: change.prior_snapshot_id.clone(),
            new_snapshot_id: change.new_snapshot_id.clone(),
            diff_text: change.diff_text.clone(),
            detected_at: truncate_micros(detected_at),
            processed: false,
        })
    }

    /// Get a change by ID.
    pub async fn get_change(&self, id: &str) -> Result<Option<Change>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, source_id, prior_snapshot_id, new_snapshot_id, diff_text, detected_at, processed
                 FROM changes WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_change(&row)?)),
            None => Ok(None),
        }
    }

    /// All changes for a source, oldest first.
    pub async fn list_changes_for_source(&self, source_id: &str) -> Result<Vec<Change>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, source_id, prior_snapshot_id, new_snapshot_id, diff_text, detected_at, processed
                 FROM changes WHERE source_id = ?1
                 ORDER BY detected_at, id",
                params![source_id],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_change(&row)?);
        }
        Ok(results)
    }

    /// Changes still awaiting extraction, oldest first, with their source identity.
    pub async fn list_unprocessed_changes(&self) -> Result<Vec<PendingChange>> {
        let mut rows = self
            .conn
            .query(
                "SELECT c.id, c.source_id, c.prior_snapshot_id, c.new_snapshot_id, c.diff_text,
                        c.detected_at, c.processed, s.name, s.url
                 FROM changes c
                 JOIN sources s ON s.id = c.source_id
                 WHERE c.processed = 0
                 ORDER BY c.detected_at, c.id",
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(PendingChange {
                change: row_to_change(&row)?,
                source_name: row.get::<String>(7).map_err(db_err)?,
                source_url: row.get::<String>(8).map_err(db_err)?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Finding operations
    // -----------------------------------------------------------------------

    /// Persist a finding and mark its change processed, atomically.
    ///
    /// Fails without writing anything if the change is unknown or was
    /// already processed.
    #[instrument(skip_all, fields(change_id = %finding.change_id))]
    pub async fn record_finding(&self, finding: &NewFinding) -> Result<Finding> {
        if !(1..=10).contains(&finding.relevance_score) {
            return Err(RegwatchError::validation(format!(
                "relevance score {} outside 1..=10",
                finding.relevance_score
            )));
        }

        let id = Uuid::now_v7().to_string();
        let created_at = Utc::now();
        let fields = &finding.fields;

        let tx = self.conn.transaction().await.map_err(db_err)?;

        let flipped = tx
            .execute(
                "UPDATE changes SET processed = 1 WHERE id = ?1 AND processed = 0",
                params![finding.change_id.as_str()],
            )
            .await
            .map_err(db_err)?;

        if flipped == 0 {
            tx.rollback().await.map_err(db_err)?;
            return Err(RegwatchError::Storage(format!(
                "change {} is missing or already processed",
                finding.change_id
            )));
        }

        tx.execute(
            "INSERT INTO findings (id, change_id, source_id, title, summary, deadline, impact,
                                   categories, regions, transaction_types, technical_requirements,
                                   keywords, relevance_score, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                id.as_str(),
                finding.change_id.as_str(),
                finding.source_id.as_str(),
                fields.title.as_str(),
                fields.summary.as_str(),
                fields.deadline.map(|d| d.to_string()),
                fields.impact.as_str(),
                encode_list(&fields.categories)?,
                encode_list(&fields.regions)?,
                encode_list(&fields.transaction_types)?,
                encode_list(&fields.technical_requirements)?,
                encode_list(&fields.keywords)?,
                i64::from(finding.relevance_score),
                timestamp(created_at)
            ],
        )
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        Ok(Finding {
            id,
            change_id: finding.change_id.clone(),
            source_id: finding.source_id.clone(),
            title: fields.title.clone(),
            summary: fields.summary.clone(),
            deadline: fields.deadline,
            impact: fields.impact,
            categories: fields.categories.clone(),
            regions: fields.regions.clone(),
            transaction_types: fields.transaction_types.clone(),
            technical_requirements: fields.technical_requirements.clone(),
            keywords: fields.keywords.clone(),
            relevance_score: finding.relevance_score,
            created_at: truncate_micros(created_at),
        })
    }

    /// Findings at or above a relevance threshold, optionally for one impact
    /// level. Ordered by deadline (soonest first, undated last), then by
    /// relevance (highest first).
    pub async fn list_findings(&self, query: &FindingQuery) -> Result<Vec<FindingRecord>> {
        let impact = query.impact.map(|i| i.as_str());
        let mut rows = self
            .conn
            .query(
                "SELECT f.id, f.change_id, f.source_id, f.title, f.summary, f.deadline, f.impact,
                        f.categories, f.regions, f.transaction_types, f.technical_requirements,
                        f.keywords, f.relevance_score, f.created_at, s.name, s.url
                 FROM findings f
                 JOIN sources s ON s.id = f.source_id
                 WHERE f.relevance_score >= ?1 AND (?2 IS NULL OR f.impact = ?2)
                 ORDER BY f.deadline IS NULL, f.deadline ASC, f.relevance_score DESC, f.created_at ASC",
                params![i64::from(query.min_relevance), impact],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(FindingRecord {
                finding: row_to_finding(&row)?,
                source_name: row.get::<String>(14).map_err(db_err)?,
                source_url: row.get::<String>(15).map_err(db_err)?,
            });
        }
        Ok(results)
    }

    /// Counts by impact and deadline urgency across all findings.
    pub async fn finding_stats(&self, today: NaiveDate) -> Result<FindingStats> {
        let all = self.list_findings(&FindingQuery::default()).await?;
        Ok(FindingStats::from_records(&all, today))
    }
}

// ---------------------------------------------------------------------------
// Write/query models
// ---------------------------------------------------------------------------

/// A snapshot about to be appended.
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub source_id: String,
    pub content: String,
    pub fingerprint: String,
    pub status: SnapshotStatus,
    pub error_message: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl NewSnapshot {
    /// A successful capture of normalized content.
    pub fn success(
        source_id: impl Into<String>,
        content: impl Into<String>,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            content: content.into(),
            fingerprint: fingerprint.into(),
            status: SnapshotStatus::Success,
            error_message: None,
            captured_at: Utc::now(),
        }
    }

    /// A failed fetch, kept for the source's audit trail.
    pub fn error(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            content: String::new(),
            fingerprint: String::new(),
            status: SnapshotStatus::Error,
            error_message: Some(message.into()),
            captured_at: Utc::now(),
        }
    }

    /// Override the capture time.
    pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = at;
        self
    }
}

/// A change about to be recorded.
#[derive(Debug, Clone)]
pub struct NewChange {
    pub source_id: String,
    pub prior_snapshot_id: Option<String>,
    pub new_snapshot_id: String,
    pub diff_text: String,
}

/// A finding about to be recorded against its change.
#[derive(Debug, Clone)]
pub struct NewFinding {
    pub change_id: String,
    pub source_id: String,
    pub fields: ExtractedFinding,
    pub relevance_score: u8,
}

/// An unprocessed change with the identity of the source it came from.
#[derive(Debug, Clone)]
pub struct PendingChange {
    pub change: Change,
    pub source_name: String,
    pub source_url: String,
}

/// Filter for [`Storage::list_findings`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FindingQuery {
    /// Minimum relevance score (inclusive).
    pub min_relevance: u8,
    /// Restrict to one impact level.
    pub impact: Option<Impact>,
}

/// Aggregate counts over a set of findings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindingStats {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub with_deadline: usize,
    /// Deadline today or within the next 30 days.
    pub urgent: usize,
}

impl FindingStats {
    /// Tally findings relative to `today`.
    pub fn from_records(records: &[FindingRecord], today: NaiveDate) -> Self {
        let mut stats = Self {
            total: records.len(),
            ..Self::default()
        };

        for record in records {
            match record.finding.impact {
                Impact::High => stats.high += 1,
                Impact::Medium => stats.medium += 1,
                Impact::Low => stats.low += 1,
            }

            if let Some(deadline) = record.finding.deadline {
                stats.with_deadline += 1;
                let days = (deadline - today).num_days();
                if (0..URGENT_WITHIN_DAYS).contains(&days) {
                    stats.urgent += 1;
                }
            }
        }
        stats
    }
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

fn db_err(e: libsql::Error) -> RegwatchError {
    RegwatchError::Storage(e.to_string())
}

/// Fixed-width RFC 3339 so that lexical order is chronological order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn truncate_micros(at: DateTime<Utc>) -> DateTime<Utc> {
    parse_timestamp(&timestamp(at)).unwrap_or(at)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RegwatchError::Storage(format!("invalid timestamp '{s}': {e}")))
}

fn encode_list(items: &[String]) -> Result<String> {
    serde_json::to_string(items)
        .map_err(|e| RegwatchError::Storage(format!("failed to encode list column: {e}")))
}

fn decode_list(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw)
        .map_err(|e| RegwatchError::Storage(format!("corrupt list column '{raw}': {e}")))
}

fn row_to_source(row: &libsql::Row) -> Result<Source> {
    Ok(Source {
        id: row.get::<String>(0).map_err(db_err)?,
        name: row.get::<String>(1).map_err(db_err)?,
        url: row.get::<String>(2).map_err(db_err)?,
        kind: row.get::<String>(3).map_err(db_err)?,
        active: row.get::<i64>(4).map_err(db_err)? != 0,
        created_at: parse_timestamp(&row.get::<String>(5).map_err(db_err)?)?,
        updated_at: parse_timestamp(&row.get::<String>(6).map_err(db_err)?)?,
    })
}

fn row_to_snapshot(row: &libsql::Row) -> Result<Snapshot> {
    Ok(Snapshot {
        id: row.get::<String>(0).map_err(db_err)?,
        source_id: row.get::<String>(1).map_err(db_err)?,
        content: row.get::<String>(2).map_err(db_err)?,
        fingerprint: row.get::<String>(3).map_err(db_err)?,
        captured_at: parse_timestamp(&row.get::<String>(4).map_err(db_err)?)?,
        status: row.get::<String>(5).map_err(db_err)?.parse()?,
        error_message: row.get::<String>(6).ok(),
    })
}

fn row_to_change(row: &libsql::Row) -> Result<Change> {
    Ok(Change {
        id: row.get::<String>(0).map_err(db_err)?,
        source_id: row.get::<String>(1).map_err(db_err)?,
        prior_snapshot_id: row.get::<String>(2).ok(),
        new_snapshot_id: row.get::<String>(3).map_err(db_err)?,
        diff_text: row.get::<String>(4).map_err(db_err)?,
        detected_at: parse_timestamp(&row.get::<String>(5).map_err(db_err)?)?,
        processed: row.get::<i64>(6).map_err(db_err)? != 0,
    })
}

fn row_to_finding(row: &libsql::Row) -> Result<Finding> {
    let deadline = match row.get::<String>(5).ok() {
        Some(raw) => Some(
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .map_err(|e| RegwatchError::Storage(format!("invalid deadline '{raw}': {e}")))?,
        ),
        None => None,
    };
    let score = row.get::<i64>(12).map_err(db_err)?;

    Ok(Finding {
        id: row.get::<String>(0).map_err(db_err)?,
        change_id: row.get::<String>(1).map_err(db_err)?,
        source_id: row.get::<String>(2).map_err(db_err)?,
        title: row.get::<String>(3).map_err(db_err)?,
        summary: row.get::<String>(4).map_err(db_err)?,
        deadline,
        impact: row.get::<String>(6).map_err(db_err)?.parse()?,
        categories: decode_list(&row.get::<String>(7).map_err(db_err)?)?,
        regions: decode_list(&row.get::<String>(8).map_err(db_err)?)?,
        transaction_types: decode_list(&row.get::<String>(9).map_err(db_err)?)?,
        technical_requirements: decode_list(&row.get::<String>(10).map_err(db_err)?)?,
        keywords: decode_list(&row.get::<String>(11).map_err(db_err)?)?,
        relevance_score: u8::try_from(score)
            .map_err(|_| RegwatchError::Storage(format!("relevance score {score} out of range")))?,
        created_at: parse_timestamp(&row.get::<String>(13).map_err(db_err)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("rw_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn extracted(title: &str, impact: Impact, deadline: Option<NaiveDate>) -> ExtractedFinding {
        ExtractedFinding {
            title: title.into(),
            summary: format!("{title} summary"),
            deadline,
            impact,
            categories: vec!["6051".into(), "6211".into()],
            regions: vec!["Global".into()],
            transaction_types: vec!["AFT".into()],
            technical_requirements: vec!["Send recipient name".into()],
            keywords: vec!["crypto".into(), "fraud".into()],
        }
    }

    /// Seed a source with two snapshots and one unprocessed change.
    async fn seed_change(storage: &Storage, url: &str) -> (Source, Change) {
        let source = storage
            .upsert_source("Scheme rules", url, "scheme_rules", true)
            .await
            .unwrap();
        let old = storage
            .insert_snapshot(&NewSnapshot::success(&source.id, "a\nb", "h1"))
            .await
            .unwrap();
        let new = storage
            .insert_snapshot(&NewSnapshot::success(&source.id, "a\nc", "h2"))
            .await
            .unwrap();
        let change = storage
            .insert_change(&NewChange {
                source_id: source.id.clone(),
                prior_snapshot_id: Some(old.id),
                new_snapshot_id: new.id,
                diff_text: "-b\n+c".into(),
            })
            .await
            .unwrap();
        (source, change)
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("rw_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn upsert_source_updates_in_place() {
        let storage = Storage::open_in_memory().await.unwrap();

        let first = storage
            .upsert_source("Visa Rules", "https://example.com/visa", "scheme_rules", true)
            .await
            .expect("insert source");
        let second = storage
            .upsert_source("Visa Core Rules", "https://example.com/visa", "rules", false)
            .await
            .expect("update source");

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Visa Core Rules");
        assert_eq!(second.kind, "rules");
        assert!(!second.active);
        assert_eq!(first.created_at, second.created_at);

        let all = storage.list_sources().await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn deactivated_sources_are_not_listed_as_active() {
        let storage = Storage::open_in_memory().await.unwrap();
        storage
            .upsert_source("A", "https://example.com/a", "web", true)
            .await
            .unwrap();
        storage
            .upsert_source("B", "https://example.com/b", "web", true)
            .await
            .unwrap();

        assert!(
            storage
                .set_source_active("https://example.com/a", false)
                .await
                .unwrap()
        );
        assert!(
            !storage
                .set_source_active("https://example.com/missing", false)
                .await
                .unwrap()
        );

        let active = storage.list_active_sources().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "B");
        assert_eq!(storage.list_sources().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn latest_successful_snapshot_skips_errors_and_orders_by_time() {
        let storage = Storage::open_in_memory().await.unwrap();
        let source = storage
            .upsert_source("A", "https://example.com/a", "web", true)
            .await
            .unwrap();

        assert!(
            storage
                .latest_successful_snapshot(&source.id)
                .await
                .unwrap()
                .is_none()
        );

        let base = Utc::now();
        storage
            .insert_snapshot(
                &NewSnapshot::success(&source.id, "old", "h-old")
                    .captured_at(base - Duration::minutes(10)),
            )
            .await
            .unwrap();
        let newest_ok = storage
            .insert_snapshot(
                &NewSnapshot::success(&source.id, "new", "h-new")
                    .captured_at(base - Duration::minutes(5)),
            )
            .await
            .unwrap();
        storage
            .insert_snapshot(&NewSnapshot::error(&source.id, "HTTP 503").captured_at(base))
            .await
            .unwrap();

        let latest = storage
            .latest_successful_snapshot(&source.id)
            .await
            .unwrap()
            .expect("latest snapshot");
        assert_eq!(latest.id, newest_ok.id);
        assert_eq!(latest.fingerprint, "h-new");
        assert_eq!(storage.count_snapshots(&source.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn change_requires_existing_snapshot() {
        let storage = Storage::open_in_memory().await.unwrap();
        let source = storage
            .upsert_source("A", "https://example.com/a", "web", true)
            .await
            .unwrap();

        let result = storage
            .insert_change(&NewChange {
                source_id: source.id.clone(),
                prior_snapshot_id: None,
                new_snapshot_id: "no-such-snapshot".into(),
                diff_text: "+x".into(),
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn record_finding_marks_change_processed_once() {
        let storage = Storage::open_in_memory().await.unwrap();
        let (source, change) = seed_change(&storage, "https://example.com/visa").await;

        let pending = storage.list_unprocessed_changes().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].source_name, "Scheme rules");
        assert_eq!(pending[0].source_url, "https://example.com/visa");

        let new_finding = NewFinding {
            change_id: change.id.clone(),
            source_id: source.id.clone(),
            fields: extracted("AFT recipient data", Impact::High, None),
            relevance_score: 9,
        };
        let finding = storage
            .record_finding(&new_finding)
            .await
            .expect("record finding");
        assert_eq!(finding.categories, vec!["6051", "6211"]);

        let stored = storage.get_change(&change.id).await.unwrap().unwrap();
        assert!(stored.processed);
        assert!(storage.list_unprocessed_changes().await.unwrap().is_empty());

        // Second attempt must not create a duplicate finding.
        let again = storage.record_finding(&new_finding).await;
        assert!(again.is_err());
        let all = storage.list_findings(&FindingQuery::default()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn record_finding_rejects_out_of_range_score() {
        let storage = Storage::open_in_memory().await.unwrap();
        let (source, change) = seed_change(&storage, "https://example.com/a").await;

        let result = storage
            .record_finding(&NewFinding {
                change_id: change.id.clone(),
                source_id: source.id,
                fields: extracted("x", Impact::Low, None),
                relevance_score: 11,
            })
            .await;
        assert!(result.is_err());

        let stored = storage.get_change(&change.id).await.unwrap().unwrap();
        assert!(!stored.processed);
    }

    #[tokio::test]
    async fn list_findings_filters_and_orders() {
        let storage = Storage::open_in_memory().await.unwrap();
        let d = |m, day| NaiveDate::from_ymd_opt(2026, m, day);

        let cases = [
            ("undated", Impact::High, None, 9u8),
            ("later", Impact::Medium, d(6, 1), 8),
            ("sooner-low-score", Impact::High, d(3, 1), 6),
            ("sooner-high-score", Impact::High, d(3, 1), 10),
            ("irrelevant", Impact::Low, d(1, 1), 2),
        ];
        for (i, (title, impact, deadline, score)) in cases.into_iter().enumerate() {
            let (source, change) =
                seed_change(&storage, &format!("https://example.com/{i}")).await;
            storage
                .record_finding(&NewFinding {
                    change_id: change.id,
                    source_id: source.id,
                    fields: extracted(title, impact, deadline),
                    relevance_score: score,
                })
                .await
                .unwrap();
        }

        let titles = |records: &[FindingRecord]| {
            records
                .iter()
                .map(|r| r.finding.title.clone())
                .collect::<Vec<_>>()
        };

        let relevant = storage
            .list_findings(&FindingQuery {
                min_relevance: 5,
                impact: None,
            })
            .await
            .unwrap();
        assert_eq!(
            titles(&relevant),
            vec!["sooner-high-score", "sooner-low-score", "later", "undated"]
        );

        let high_only = storage
            .list_findings(&FindingQuery {
                min_relevance: 0,
                impact: Some(Impact::High),
            })
            .await
            .unwrap();
        assert_eq!(high_only.len(), 3);
        assert!(high_only.iter().all(|r| r.finding.impact == Impact::High));
    }

    #[tokio::test]
    async fn finding_stats_counts_urgency() {
        let storage = Storage::open_in_memory().await.unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();

        let cases = [
            (Impact::High, Some(today + Duration::days(5))),
            (Impact::Medium, Some(today + Duration::days(45))),
            (Impact::Low, Some(today - Duration::days(2))),
            (Impact::High, None),
        ];
        for (i, (impact, deadline)) in cases.into_iter().enumerate() {
            let (source, change) =
                seed_change(&storage, &format!("https://example.com/s{i}")).await;
            storage
                .record_finding(&NewFinding {
                    change_id: change.id,
                    source_id: source.id,
                    fields: extracted("item", impact, deadline),
                    relevance_score: 5,
                })
                .await
                .unwrap();
        }

        let stats = storage.finding_stats(today).await.unwrap();
        assert_eq!(
            stats,
            FindingStats {
                total: 4,
                high: 2,
                medium: 1,
                low: 1,
                with_deadline: 3,
                urgent: 1,
            }
        );
    }
}
