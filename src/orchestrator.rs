//! One update run, end to end.
//!
//! ```text
//! Idle -> ResolvingManifest -> Diffing -> Transferring -> Committing -> Complete
//!                                  \______________________________/
//!                                       (empty diff: commit directly)
//! any non-terminal state -> Failed
//! ```
//!
//! The version marker is written exactly once, as the last step of a successful
//! run. A failed run leaves the tree safe to re-diff, so recovery is always
//! "run again": a fresh run re-resolves the manifest and trusts nothing from the
//! previous attempt.

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::diff::{DiffEngine, DiffResult};
use crate::error::SyncError;
use crate::fetch::RemoteFetcher;
use crate::hash::HashProvider;
use crate::ledger::{needs_update, VersionLedger, VersionMarker};
use crate::lock::RootLock;
use crate::manifest::{ManifestEntry, ManifestResolver};
use crate::store::FileStore;
use crate::transfer::{CancelToken, Phase, ProgressEvent, TransferPlanner};

/// What the caller wants an installed root to become.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub root: PathBuf,
    pub target_version: String,
    pub manifest_url: String,
    pub download_base_url: String,
}

/// The files one run will fetch, plus where they come from.
///
/// Built once per run from a freshly resolved manifest and consumed by that run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    pub entries: DiffResult,
    pub target_version: String,
    pub source_manifest_url: String,
    pub download_base_url: String,
}

impl UpdatePlan {
    fn new(entries: DiffResult, request: &UpdateRequest) -> Self {
        Self {
            entries,
            target_version: request.target_version.clone(),
            source_manifest_url: request.manifest_url.clone(),
            download_base_url: request.download_base_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    ResolvingManifest,
    Diffing,
    Transferring,
    Committing,
    Complete,
    Failed { reason: String },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Complete | RunState::Failed { .. })
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: &RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (from, Failed { .. }) => !from.is_terminal(),
            (Idle, ResolvingManifest)
            | (ResolvingManifest, Diffing)
            | (Diffing, Complete)
            | (Diffing, Transferring)
            | (Transferring, Committing)
            | (Committing, Complete) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => f.write_str("idle"),
            RunState::ResolvingManifest => f.write_str("resolving manifest"),
            RunState::Diffing => f.write_str("diffing"),
            RunState::Transferring => f.write_str("transferring"),
            RunState::Committing => f.write_str("committing"),
            RunState::Complete => f.write_str("complete"),
            RunState::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Per-run context: the current state and every state visited.
#[derive(Debug)]
struct Run {
    state: RunState,
    history: Vec<RunState>,
}

impl Run {
    fn new() -> Self {
        Self {
            state: RunState::Idle,
            history: vec![RunState::Idle],
        }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "run state");
        self.history.push(next.clone());
        self.state = next;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing differed; only the marker was (re)written.
    UpToDate,
    Updated { files: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub version: String,
    pub fetched: Vec<String>,
    /// States visited, from `Idle` to `Complete`.
    pub states: Vec<RunState>,
}

/// Result of a read-only check: what an update would do right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub installed: VersionMarker,
    pub target_version: String,
    pub entries: Vec<ManifestEntry>,
    pub diff: DiffResult,
}

impl CheckReport {
    pub fn needs_update(&self) -> bool {
        !self.diff.is_empty() || needs_update(&self.installed, &self.target_version)
    }
}

/// Drives manifest resolution, diffing, transfer and commit for one root at a time.
pub struct UpdateOrchestrator<'a> {
    fetcher: &'a dyn RemoteFetcher,
    store: &'a dyn FileStore,
    hasher: &'a dyn HashProvider,
}

impl<'a> UpdateOrchestrator<'a> {
    pub fn new(fetcher: &'a dyn RemoteFetcher, store: &'a dyn FileStore, hasher: &'a dyn HashProvider) -> Self {
        Self { fetcher, store, hasher }
    }

    /// Brings `request.root` to `request.target_version`.
    ///
    /// Fails immediately with [`SyncError::RootBusy`] if another run holds the root.
    /// `on_progress` runs inline between steps and must return promptly.
    pub fn run(
        &self,
        request: &UpdateRequest,
        on_progress: &mut dyn FnMut(&ProgressEvent),
        cancel: &CancelToken,
    ) -> Result<RunReport, SyncError> {
        let _lock = RootLock::acquire(&request.root, &request.target_version)?;
        let mut run = Run::new();
        info!(
            root = %request.root.display(),
            version = %request.target_version,
            manifest = %request.manifest_url,
            "update started"
        );

        match self.drive(&mut run, request, on_progress, cancel) {
            Ok((outcome, fetched)) => {
                info!(root = %request.root.display(), version = %request.target_version, ?outcome, "update complete");
                Ok(RunReport {
                    outcome,
                    version: request.target_version.trim().to_string(),
                    fetched,
                    states: run.history,
                })
            }
            Err(e) => {
                run.advance(RunState::Failed { reason: e.to_string() });
                warn!(root = %request.root.display(), error = %e, "update failed");
                Err(e)
            }
        }
    }

    fn drive(
        &self,
        run: &mut Run,
        request: &UpdateRequest,
        on_progress: &mut dyn FnMut(&ProgressEvent),
        cancel: &CancelToken,
    ) -> Result<(RunOutcome, Vec<String>), SyncError> {
        checkpoint(cancel, Phase::FetchManifest)?;
        run.advance(RunState::ResolvingManifest);
        on_progress(&ProgressEvent::new(Phase::FetchManifest, 0, 1));
        let entries = ManifestResolver::new(self.fetcher).resolve(&request.manifest_url)?;
        on_progress(&ProgressEvent::new(Phase::FetchManifest, 1, 1));

        checkpoint(cancel, Phase::Diff)?;
        run.advance(RunState::Diffing);
        on_progress(&ProgressEvent::new(Phase::Diff, 0, entries.len()));
        let diff = DiffEngine::new(self.store, self.hasher).compute_diff(&entries, &request.root);
        on_progress(&ProgressEvent::new(Phase::Diff, entries.len(), entries.len()));
        let plan = UpdatePlan::new(diff, request);
        info!(manifest_entries = entries.len(), to_fetch = plan.entries.len(), "diff computed");

        if plan.entries.is_empty() {
            checkpoint(cancel, Phase::Commit)?;
            self.commit(request, on_progress)?;
            run.advance(RunState::Complete);
            return Ok((RunOutcome::UpToDate, Vec::new()));
        }

        checkpoint(cancel, Phase::Download)?;
        run.advance(RunState::Transferring);
        TransferPlanner::new(self.fetcher, self.store)
            .with_verification(self.hasher)
            .execute(&plan.entries, &plan.download_base_url, &request.root, on_progress, cancel)?;

        checkpoint(cancel, Phase::Commit)?;
        run.advance(RunState::Committing);
        self.commit(request, on_progress)?;
        run.advance(RunState::Complete);

        let fetched: Vec<String> = plan.entries.into_iter().map(|e| e.relative_path).collect();
        Ok((RunOutcome::Updated { files: fetched.len() }, fetched))
    }

    fn commit(&self, request: &UpdateRequest, on_progress: &mut dyn FnMut(&ProgressEvent)) -> Result<(), SyncError> {
        on_progress(&ProgressEvent::new(Phase::Commit, 0, 1));
        VersionLedger::new(self.store).write(&request.root, &request.target_version)?;
        on_progress(&ProgressEvent::new(Phase::Commit, 1, 1));
        Ok(())
    }

    /// Resolves the manifest and computes the diff without writing anything.
    ///
    /// Does not take the root lock; a check racing an update may see the tree
    /// halfway through the transfer.
    pub fn check(&self, request: &UpdateRequest) -> Result<CheckReport, SyncError> {
        let entries = ManifestResolver::new(self.fetcher).resolve(&request.manifest_url)?;
        let diff = DiffEngine::new(self.store, self.hasher).compute_diff(&entries, &request.root);
        let installed = VersionLedger::new(self.store).read(&request.root);
        Ok(CheckReport {
            installed,
            target_version: request.target_version.clone(),
            entries,
            diff,
        })
    }
}

fn checkpoint(cancel: &CancelToken, next: Phase) -> Result<(), SyncError> {
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled { phase: next });
    }
    Ok(())
}
