//! In-memory view maintained by the sync engine.
//!
//! Each concern carries its own [`SyncStatus`] so that one failing concern
//! never blocks another.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::application::{ApplicationStage, RoundApplicationMetadata};
use crate::events::{AppStatus, MetaPtr, ProjectEvent, ProjectId, ProjectMetadata};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Undefined,
    Loading,
    Loaded,
    Error,
}

/// Registry projects owned by the connected account.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectsState {
    pub status: SyncStatus,
    pub error: Option<String>,
    pub ids: Vec<ProjectId>,
    pub events: BTreeMap<ProjectId, ProjectEvent>,
    /// Latest metadata pointer per project, from its newest update log.
    pub meta_ptrs: BTreeMap<ProjectId, MetaPtr>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetadataEntry {
    pub status: SyncStatus,
    pub error: Option<String>,
    pub metadata: Option<ProjectMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Application {
    pub round_id: String,
    pub status: AppStatus,
}

/// Rounds a single project applied to.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectApplicationsState {
    pub status: SyncStatus,
    pub error: Option<String>,
    pub applications: Vec<Application>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundApplication {
    /// Applying project as indexed by the subgraph; also the key in the
    /// round's reviewed-applications document.
    pub id: String,
    pub round_id: String,
    pub status: AppStatus,
    pub meta_ptr: Option<MetaPtr>,
    /// Lifecycle of this application's status reconciliation.
    pub status_sync: SyncStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RoundApplicationsState {
    pub status: SyncStatus,
    pub error: Option<String>,
    pub applications: BTreeMap<String, RoundApplication>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RoundState {
    pub status: SyncStatus,
    pub error: Option<String>,
    pub application_metadata: Option<RoundApplicationMetadata>,
    pub projects_meta_ptr: Option<MetaPtr>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionState {
    pub stage: ApplicationStage,
    pub error: Option<String>,
    pub tx_hash: Option<String>,
}

/// Everything the presentation layer reads.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSnapshot {
    /// `chain:account` everything below belongs to.
    pub scope: Option<String>,
    pub projects: ProjectsState,
    /// Keyed by composite project id.
    pub metadata: BTreeMap<String, MetadataEntry>,
    /// Keyed by composite project id.
    pub project_applications: BTreeMap<String, ProjectApplicationsState>,
    /// Keyed by `chain:round`.
    pub rounds: BTreeMap<String, RoundState>,
    /// Keyed by `chain:round`.
    pub round_applications: BTreeMap<String, RoundApplicationsState>,
    /// Keyed by `chain:round`.
    pub submissions: BTreeMap<String, SubmissionState>,
}

/// Generation counters. Bumping one marks every task started under the old
/// value as stale.
#[derive(Debug, Default)]
pub struct Generations {
    /// Bumped when the account or chain changes.
    pub scope: u64,
    /// Bumped on every project unload, including scope changes.
    pub account: u64,
    /// Bumped per `chain:round` key on round unload.
    pub rounds: HashMap<String, u64>,
}

/// Where round work stands: the scope it started in and the round's own
/// unload count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RoundGeneration {
    pub scope: u64,
    pub round: u64,
}

impl Generations {
    pub fn round(&self, key: &str) -> RoundGeneration {
        RoundGeneration {
            scope: self.scope,
            round: self.rounds.get(key).copied().unwrap_or(0),
        }
    }

    pub fn bump_round(&mut self, key: &str) {
        *self.rounds.entry(key.to_string()).or_default() += 1;
    }
}

#[derive(Debug, Default)]
pub struct EngineState {
    pub snapshot: SyncSnapshot,
    pub generations: Generations,
}
