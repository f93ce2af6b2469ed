//! One scan cycle: sources → fetch → snapshot → detect → extract → score → persist.
//!
//! Per-source fetch errors and per-change extraction errors are tallied
//! and the cycle carries on. Only store and configuration errors abort it;
//! even then the partial statistics are logged and reported before the error
//! is returned.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{Level, debug, error, info, instrument, warn};

use regwatch_detector::{ChangeDetector, summarize_diff};
use regwatch_fetcher::{FetchOutcome, Fetcher};
use regwatch_shared::{ConsumerProfile, Result, ScanStats, Snapshot, Source};
use regwatch_storage::{NewChange, NewFinding, NewSnapshot, Storage};

use crate::extraction::{ExtractionRequest, Extractor, extract_with_timeout};
use crate::scorer;

/// Diff lines shown in the debug preview of a detected change.
const DIFF_PREVIEW_LINES: usize = 20;

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Phases of a scan cycle. `Done` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanPhase {
    LoadingSources,
    Fetching,
    PersistingSnapshots,
    DetectingChanges,
    Extracting,
    ScoringAndPersisting,
    Reporting,
    Done,
    Aborted,
}

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoadingSources => "loading_sources",
            Self::Fetching => "fetching",
            Self::PersistingSnapshots => "persisting_snapshots",
            Self::DetectingChanges => "detecting_changes",
            Self::Extracting => "extracting",
            Self::ScoringAndPersisting => "scoring_and_persisting",
            Self::Reporting => "reporting",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }

    /// Human-readable label for progress output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::LoadingSources => "Loading sources",
            Self::Fetching => "Fetching sources",
            Self::PersistingSnapshots => "Saving snapshots",
            Self::DetectingChanges => "Detecting changes",
            Self::Extracting => "Extracting findings",
            Self::ScoringAndPersisting => "Scoring findings",
            Self::Reporting => "Reporting",
            Self::Done => "Done",
            Self::Aborted => "Aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Options / report
// ---------------------------------------------------------------------------

/// Knobs for one scan cycle.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Upper bound on each extraction call.
    pub extraction_timeout: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            extraction_timeout: Duration::from_secs(120),
        }
    }
}

/// Where a per-item failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Fetch,
    Extraction,
}

/// A non-fatal failure tallied in [`ScanStats::errors`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    pub stage: FailureStage,
    pub source_name: String,
    /// Set for extraction errors.
    pub change_id: Option<String>,
    pub message: String,
}

/// Outcome of a scan cycle.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub stats: ScanStats,
    /// Terminal phase reached.
    pub phase: ScanPhase,
    pub errors: Vec<SourceError>,
}

/// Progress callback for reporting scan status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, phase: ScanPhase);
    /// Called after each source fetch.
    fn source_fetched(&self, source: &Source, ok: bool, current: usize, total: usize);
    /// Called after each change is extracted and scored (or fails).
    fn change_extracted(&self, source_name: &str, ok: bool, current: usize, total: usize);
    /// Called once when the cycle ends, including aborted cycles.
    fn done(&self, report: &ScanReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _phase: ScanPhase) {}
    fn source_fetched(&self, _source: &Source, _ok: bool, _current: usize, _total: usize) {}
    fn change_extracted(&self, _source_name: &str, _ok: bool, _current: usize, _total: usize) {}
    fn done(&self, _report: &ScanReport) {}
}

// ---------------------------------------------------------------------------
// Cycle
// ---------------------------------------------------------------------------

/// Collaborators for a scan cycle.
pub struct Scanner<'a, E: Extractor> {
    pub storage: &'a Storage,
    pub fetcher: &'a Fetcher,
    pub detector: &'a ChangeDetector,
    pub extractor: &'a E,
    pub profile: &'a ConsumerProfile,
    pub options: &'a ScanOptions,
}

/// Mutable bookkeeping threaded through the phases.
struct CycleState<'p> {
    phase: ScanPhase,
    stats: ScanStats,
    errors: Vec<SourceError>,
    progress: &'p dyn ProgressReporter,
}

impl CycleState<'_> {
    fn enter(&mut self, phase: ScanPhase) {
        debug!(from = %self.phase, to = %phase, "scan phase");
        self.phase = phase;
        self.progress.phase(phase);
    }

    fn fail(&mut self, failure: SourceError) {
        self.stats.errors += 1;
        self.errors.push(failure);
    }
}

/// A successful fetch paired with the snapshot it is compared against.
struct Captured {
    source: Source,
    prior: Option<Snapshot>,
    current: Snapshot,
}

/// Run one full scan cycle.
///
/// 1. Load active sources (none → zero statistics)
/// 2. Fetch each source in turn through the rate-limited fetcher
/// 3. Persist a snapshot per fetch, capturing the prior successful snapshot first
/// 4. Detect and persist significant changes
/// 5. Extract each unprocessed change, including leftovers from earlier cycles
/// 6. Score and persist its finding, marking the change processed, before
///    moving on to the next one
#[instrument(skip_all, fields(profile = %profile.name))]
pub async fn run_scan<E: Extractor>(
    storage: &Storage,
    fetcher: &Fetcher,
    detector: &ChangeDetector,
    extractor: &E,
    profile: &ConsumerProfile,
    options: &ScanOptions,
    progress: &dyn ProgressReporter,
) -> Result<ScanReport> {
    let scanner = Scanner {
        storage,
        fetcher,
        detector,
        extractor,
        profile,
        options,
    };
    scanner.run(progress).await
}

impl<E: Extractor> Scanner<'_, E> {
    /// Run one full scan cycle. See [`run_scan`].
    pub async fn run(&self, progress: &dyn ProgressReporter) -> Result<ScanReport> {
        let start = Instant::now();
        let mut state = CycleState {
            phase: ScanPhase::LoadingSources,
            stats: ScanStats::default(),
            errors: Vec::new(),
            progress,
        };

        info!("starting scan cycle");
        progress.phase(ScanPhase::LoadingSources);

        let outcome = self.cycle(&mut state).await;
        state.stats.duration = start.elapsed();

        match outcome {
            Ok(()) => {
                state.enter(ScanPhase::Reporting);
                log_summary(&state.stats, ScanPhase::Done);
                state.enter(ScanPhase::Done);
                let report = ScanReport {
                    stats: state.stats,
                    phase: ScanPhase::Done,
                    errors: state.errors,
                };
                progress.done(&report);
                Ok(report)
            }
            Err(e) => {
                error!(phase = %state.phase, error = %e, "scan cycle aborted");
                log_summary(&state.stats, ScanPhase::Aborted);
                state.enter(ScanPhase::Aborted);
                let report = ScanReport {
                    stats: state.stats,
                    phase: ScanPhase::Aborted,
                    errors: state.errors,
                };
                progress.done(&report);
                Err(e)
            }
        }
    }

    async fn cycle(&self, state: &mut CycleState<'_>) -> Result<()> {
        // --- Phase 1: Sources ---
        let sources = self.storage.list_active_sources().await?;
        if sources.is_empty() {
            info!("no active sources");
            return Ok(());
        }

        // --- Phase 2: Fetch ---
        state.enter(ScanPhase::Fetching);
        let total = sources.len();
        let mut fetched = Vec::with_capacity(total);
        for (i, source) in sources.into_iter().enumerate() {
            let outcome = self.fetcher.fetch(&source).await;
            state.stats.sources_scanned += 1;
            state
                .progress
                .source_fetched(&source, outcome.is_success(), i + 1, total);
            fetched.push((source, outcome));
        }

        // --- Phase 3: Snapshots ---
        state.enter(ScanPhase::PersistingSnapshots);
        let mut captured = Vec::new();
        for (source, outcome) in fetched {
            match outcome {
                FetchOutcome::Success {
                    content,
                    fingerprint,
                } => {
                    // Must be read before the new snapshot exists.
                    let prior = self.storage.latest_successful_snapshot(&source.id).await?;
                    let current = self
                        .storage
                        .insert_snapshot(&NewSnapshot::success(&source.id, content, fingerprint))
                        .await?;
                    state.stats.snapshots_saved += 1;
                    captured.push(Captured {
                        source,
                        prior,
                        current,
                    });
                }
                FetchOutcome::Error { message } => {
                    self.storage
                        .insert_snapshot(&NewSnapshot::error(&source.id, message.as_str()))
                        .await?;
                    state.fail(SourceError {
                        stage: FailureStage::Fetch,
                        source_name: source.name.clone(),
                        change_id: None,
                        message,
                    });
                }
            }
        }

        // --- Phase 4: Detect ---
        state.enter(ScanPhase::DetectingChanges);
        for item in &captured {
            let Some(candidate) =
                self.detector
                    .detect(&item.source.id, item.prior.as_ref(), &item.current)
            else {
                continue;
            };

            if tracing::enabled!(Level::DEBUG) {
                debug!(
                    source = %item.source.name,
                    diff = %summarize_diff(&candidate.diff_text, DIFF_PREVIEW_LINES),
                    "change preview"
                );
            }

            self.storage
                .insert_change(&NewChange {
                    source_id: candidate.source_id,
                    prior_snapshot_id: Some(candidate.prior_snapshot_id),
                    new_snapshot_id: candidate.new_snapshot_id,
                    diff_text: candidate.diff_text,
                })
                .await?;
            state.stats.changes_detected += 1;
        }

        // --- Phases 5-6: Extract, then score and persist, one change at a time ---
        let pending = self.storage.list_unprocessed_changes().await?;
        if pending.is_empty() {
            debug!("no unprocessed changes");
            return Ok(());
        }
        if pending.len() > state.stats.changes_detected {
            info!(
                carried_over = pending.len() - state.stats.changes_detected,
                "retrying changes left unprocessed by earlier cycles"
            );
        }

        let total = pending.len();
        for (i, item) in pending.iter().enumerate() {
            state.enter(ScanPhase::Extracting);
            let request = ExtractionRequest::from(item);
            let fields = match extract_with_timeout(
                self.extractor,
                &request,
                self.options.extraction_timeout,
            )
            .await
            {
                Ok(fields) => fields,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(change_id = %item.change.id, error = %e, "change left unprocessed");
                    state.fail(SourceError {
                        stage: FailureStage::Extraction,
                        source_name: item.source_name.clone(),
                        change_id: Some(item.change.id.clone()),
                        message: e.to_string(),
                    });
                    state
                        .progress
                        .change_extracted(&item.source_name, false, i + 1, total);
                    continue;
                }
            };

            state.enter(ScanPhase::ScoringAndPersisting);
            let breakdown = scorer::breakdown(&fields, self.profile);
            let score = breakdown.score();
            debug!(
                change_id = %item.change.id,
                score,
                category_match = breakdown.category_match,
                region_match = breakdown.region_match,
                shared_keywords = breakdown.shared_keywords,
                high_impact = breakdown.high_impact,
                "scored finding"
            );

            self.storage
                .record_finding(&NewFinding {
                    change_id: item.change.id.clone(),
                    source_id: item.change.source_id.clone(),
                    fields,
                    relevance_score: score,
                })
                .await?;
            state.stats.findings_created += 1;
            state
                .progress
                .change_extracted(&item.source_name, true, i + 1, total);
        }

        Ok(())
    }
}

fn log_summary(stats: &ScanStats, phase: ScanPhase) {
    info!(
        %phase,
        sources_scanned = stats.sources_scanned,
        snapshots_saved = stats.snapshots_saved,
        changes_detected = stats.changes_detected,
        findings_created = stats.findings_created,
        errors = stats.errors,
        duration_ms = stats.duration.as_millis() as u64,
        "scan cycle finished"
    );
}
