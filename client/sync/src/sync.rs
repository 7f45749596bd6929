//! The sync engine: merges registry logs, pinned metadata and subgraph rows
//! into one [`SyncSnapshot`].
//!
//! Every public entry point converts failures into a concern-scoped `Error`
//! state and reports them to the [`ErrorMonitor`]; none of them return an
//! error to the caller.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::abi;
use crate::application::RoundApplicationMetadata;
use crate::context::ConnectionContext;
use crate::errors::{ClientError, Result};
use crate::events::{AppStatus, MetaPtr, ProjectEvent, ProjectId, ProjectMetadata};
use crate::inflight::{follow, Claim, ConcernKey, InFlight, Lease};
use crate::logs::{self, ProjectLogs};
use crate::metadata::MetadataStore;
use crate::monitor::ErrorMonitor;
use crate::state::{
    Application, EngineState, ProjectApplicationsState, RoundApplication, RoundApplicationsState,
    RoundGeneration, SyncSnapshot, SyncStatus,
};
use crate::subgraph::{IndexQuery, RoundProjectRow};

pub const PROJECTS_ERROR: &str = "Cannot load projects";
pub const METADATA_ERROR: &str = "Cannot load project metadata";
pub const STATUS_ERROR: &str = "Cannot load application status";
pub const ROUND_APPLICATIONS_ERROR: &str = "Cannot load round applications";
pub const ROUND_ERROR: &str = "Cannot load round";

#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions {
    /// Send a real `bytes32` project id to `applyToRound` instead of the
    /// legacy sentinel address.
    pub apply_with_project_id: bool,
}

/// One record of a round's reviewed-applications document.
#[derive(Debug, Clone, Deserialize)]
struct ReviewRecord {
    id: String,
    status: AppStatus,
}

/// A round on one chain, and the generation work on it was started under.
#[derive(Debug, Clone)]
struct RoundScope {
    key: String,
    round_id: String,
    generation: RoundGeneration,
}

#[derive(Clone)]
pub struct ProjectSyncEngine {
    state: Arc<RwLock<EngineState>>,
    store: Arc<MetadataStore>,
    index: Arc<dyn IndexQuery>,
    monitor: Arc<dyn ErrorMonitor>,
    inflight: Arc<InFlight<ConcernKey>>,
    tasks: Arc<Mutex<JoinSet<()>>>,
    options: EngineOptions,
}

impl ProjectSyncEngine {
    pub fn new(
        store: Arc<MetadataStore>,
        index: Arc<dyn IndexQuery>,
        monitor: Arc<dyn ErrorMonitor>,
        options: EngineOptions,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(EngineState::default())),
            store,
            index,
            monitor,
            inflight: InFlight::new(),
            tasks: Arc::new(Mutex::new(JoinSet::new())),
            options,
        }
    }

    pub async fn snapshot(&self) -> SyncSnapshot {
        self.state.read().await.snapshot.clone()
    }

    /// Wait for every background fetch started so far.
    pub async fn settle(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
            if tasks.is_empty() {
                return;
            }
            while tasks.join_next().await.is_some() {}
        }
    }

    // ─────────────────────────────────────────────────────
    // Projects
    // ─────────────────────────────────────────────────────

    /// Load the connected account's projects from registry logs.
    ///
    /// With `with_metadata`, one metadata fetch per project is started in the
    /// background; the returned status does not wait for them.
    pub async fn load_projects(&self, ctx: &ConnectionContext, with_metadata: bool) -> SyncStatus {
        let scope = ctx.scope();
        let generation = self.in_scope(ctx, |state| state.generations.account).await;
        let lease = match self.claim(ConcernKey::Projects {
            scope: scope.clone(),
            generation,
        }) {
            Ok(lease) => lease,
            Err(rx) => {
                let status = self.follow_or(rx, |s| s.projects.status).await;
                // The leader may have been started without metadata.
                if with_metadata && status == SyncStatus::Loaded {
                    self.fetch_all_metadata(generation).await;
                }
                return status;
            }
        };

        let started = self
            .apply_account(generation, |state| {
                let projects = &mut state.snapshot.projects;
                projects.status = SyncStatus::Loading;
                projects.error = None;
                projects.ids.clear();
            })
            .await;
        if started.is_none() {
            return lease.complete(SyncStatus::Undefined);
        }

        let logs = match logs::fetch_project_events(ctx, ctx.account).await {
            Ok(logs) => logs,
            Err(err) => {
                self.report(&err, &[("account", ctx.account.to_string()), ("chainId", ctx.chain_id.to_string())]);
                let status = self
                    .apply_account(generation, |state| {
                        state.snapshot.projects.status = SyncStatus::Error;
                        state.snapshot.projects.error = Some(PROJECTS_ERROR.to_string());
                        SyncStatus::Error
                    })
                    .await;
                return lease.complete(status.unwrap_or(SyncStatus::Undefined));
            }
        };

        if logs.created.is_empty() {
            let status = self
                .apply_account(generation, |state| {
                    let projects = &mut state.snapshot.projects;
                    projects.events.clear();
                    projects.meta_ptrs.clear();
                    projects.status = SyncStatus::Loaded;
                    SyncStatus::Loaded
                })
                .await;
            return lease.complete(status.unwrap_or(SyncStatus::Undefined));
        }

        let applied = self
            .apply_account(generation, |state| {
                let projects = &mut state.snapshot.projects;
                let merged = build_event_map(ctx, &logs, &projects.events);
                projects.ids = logs.ids.iter().map(|n| ctx.project_id(*n)).collect();
                projects.events = merged.events;
                projects.meta_ptrs = merged.meta_ptrs;
                projects.status = SyncStatus::Loaded;
            })
            .await;
        if applied.is_none() {
            debug!("Discarding stale project load for {scope}");
            return lease.complete(SyncStatus::Undefined);
        }
        info!("Loaded {} projects for {scope}", logs.ids.len());

        if with_metadata {
            self.fetch_all_metadata(generation).await;
        }

        lease.complete(SyncStatus::Loaded)
    }

    /// Forget everything loaded for the current account and chain. Fetches
    /// still in flight complete into the void.
    pub async fn unload_projects(&self) {
        self.with_state(clear_account_state).await;
    }

    /// Start one background metadata fetch per loaded project.
    async fn fetch_all_metadata(&self, generation: u64) {
        let targets: Vec<(ProjectId, Option<MetaPtr>)> = {
            let state = self.state.read().await;
            if state.generations.account != generation {
                return;
            }
            let projects = &state.snapshot.projects;
            projects
                .ids
                .iter()
                .map(|id| (id.clone(), projects.meta_ptrs.get(id).cloned()))
                .collect()
        };

        for (project_id, meta_ptr) in targets {
            let engine = self.clone();
            self.spawn(async move {
                engine.fetch_project_metadata(project_id, meta_ptr, generation).await;
            })
            .await;
        }
    }

    async fn fetch_project_metadata(&self, project_id: ProjectId, meta_ptr: Option<MetaPtr>, generation: u64) {
        let key = project_id.to_string();
        // Another fetch for this project under the same generation is running.
        let Ok(lease) = self.claim(ConcernKey::ProjectMetadata {
            project: key.clone(),
            generation,
        }) else {
            return;
        };

        let already_loaded = self
            .apply_account(generation, |state| {
                let entry = state.snapshot.metadata.entry(key.clone()).or_default();
                let current = entry.metadata.as_ref().and_then(|m| m.meta_ptr.as_ref());
                if entry.status == SyncStatus::Loaded && current.is_some() && current == meta_ptr.as_ref() {
                    return true;
                }
                entry.status = SyncStatus::Loading;
                entry.error = None;
                false
            })
            .await;
        match already_loaded {
            Some(false) => {}
            Some(true) => {
                lease.complete(SyncStatus::Loaded);
                return;
            }
            None => return,
        }

        let result = match &meta_ptr {
            Some(ptr) => self.store.fetch_document::<ProjectMetadata>(ptr).await,
            None => Err(ClientError::DataIntegrity(format!("project {key} has no metadata pointer"))),
        };

        let status = match result {
            Ok(mut metadata) => {
                metadata.meta_ptr = meta_ptr;
                self.apply_account(generation, |state| {
                    let entry = state.snapshot.metadata.entry(key.clone()).or_default();
                    entry.metadata = Some(metadata);
                    entry.status = SyncStatus::Loaded;
                    SyncStatus::Loaded
                })
                .await
            }
            Err(err) => {
                self.report(&err, &[("projectID", key.clone())]);
                self.apply_account(generation, |state| {
                    let entry = state.snapshot.metadata.entry(key.clone()).or_default();
                    entry.status = SyncStatus::Error;
                    entry.error = Some(METADATA_ERROR.to_string());
                    SyncStatus::Error
                })
                .await
            }
        };
        lease.complete(status.unwrap_or(SyncStatus::Undefined));
    }

    // ─────────────────────────────────────────────────────
    // Applications
    // ─────────────────────────────────────────────────────

    /// Rounds `project_id` has applied to, per the subgraph.
    pub async fn load_project_applications(&self, ctx: &ConnectionContext, project_id: &ProjectId) -> SyncStatus {
        let key = project_id.to_string();
        let generation = self.in_scope(ctx, |state| state.generations.account).await;
        let lease = match self.claim(ConcernKey::ProjectApplications {
            project: key.clone(),
            generation,
        }) {
            Ok(lease) => lease,
            Err(rx) => {
                return self
                    .follow_or(rx, |s| {
                        s.project_applications
                            .get(&key)
                            .map(|a| a.status)
                            .unwrap_or_default()
                    })
                    .await
            }
        };

        let started = self
            .apply_account(generation, |state| {
                state.snapshot.project_applications.insert(
                    key.clone(),
                    ProjectApplicationsState {
                        status: SyncStatus::Loading,
                        error: None,
                        applications: Vec::new(),
                    },
                );
            })
            .await;
        if started.is_none() {
            return lease.complete(SyncStatus::Undefined);
        }

        let project_ref = subgraph_project_ref(project_id);
        let result = self
            .index
            .query_applications_for_project(&project_ref, ctx.chain_id)
            .await;

        let status = match result {
            Ok(rows) => {
                let applications: Vec<Application> = rows
                    .into_iter()
                    .map(|row| Application {
                        round_id: row.round.id.unwrap_or_default(),
                        status: AppStatus::from_wire(row.status.as_deref()),
                    })
                    .collect();
                self.apply_account(generation, |state| {
                    let entry = state.snapshot.project_applications.entry(key.clone()).or_default();
                    entry.applications = applications;
                    entry.status = SyncStatus::Loaded;
                    SyncStatus::Loaded
                })
                .await
            }
            Err(err) => {
                self.report(&err, &[("projectID", key.clone())]);
                self.apply_account(generation, |state| {
                    let entry = state.snapshot.project_applications.entry(key.clone()).or_default();
                    entry.error = Some(err.to_string());
                    entry.status = SyncStatus::Error;
                    SyncStatus::Error
                })
                .await
            }
        };
        lease.complete(status.unwrap_or(SyncStatus::Undefined))
    }

    /// Applications to `round_id`, each followed by an independent status
    /// reconciliation against the round's reviewed-applications document.
    pub async fn load_round_applications(&self, ctx: &ConnectionContext, round_id: &str) -> SyncStatus {
        let round = self.round_scope(ctx, round_id).await;
        let lease = match self.claim(ConcernKey::RoundApplications {
            round: round.key.clone(),
            generation: round.generation,
        }) {
            Ok(lease) => lease,
            Err(rx) => {
                return self
                    .follow_or(rx, |s| {
                        s.round_applications
                            .get(&round.key)
                            .map(|a| a.status)
                            .unwrap_or_default()
                    })
                    .await
            }
        };

        let started = self
            .apply_round(&round, |state| {
                state.snapshot.round_applications.insert(
                    round.key.clone(),
                    RoundApplicationsState {
                        status: SyncStatus::Loading,
                        error: None,
                        applications: BTreeMap::new(),
                    },
                );
            })
            .await;
        if started.is_none() {
            return lease.complete(SyncStatus::Undefined);
        }

        let rows = match self.index.query_applications_for_round(&round.round_id, ctx.chain_id).await {
            Ok(rows) => rows,
            Err(err) => {
                self.report(&err, &[("roundId", round.round_id.clone())]);
                let status = self
                    .apply_round(&round, |state| {
                        let entry = state.snapshot.round_applications.entry(round.key.clone()).or_default();
                        entry.error = Some(ROUND_APPLICATIONS_ERROR.to_string());
                        entry.status = SyncStatus::Error;
                        SyncStatus::Error
                    })
                    .await;
                return lease.complete(status.unwrap_or(SyncStatus::Undefined));
            }
        };

        let applied = self
            .apply_round(&round, |state| {
                let entry = state.snapshot.round_applications.entry(round.key.clone()).or_default();
                entry.applications = rows
                    .iter()
                    .map(|row| (row.id.clone(), new_round_application(row, &round.round_id)))
                    .collect();
                entry.status = SyncStatus::Loaded;
            })
            .await;
        if applied.is_none() {
            return lease.complete(SyncStatus::Undefined);
        }

        for row in rows {
            let engine = self.clone();
            let round = round.clone();
            self.spawn(async move {
                engine.reconcile_status(&row, &round).await;
            })
            .await;
        }

        lease.complete(SyncStatus::Loaded)
    }

    /// Resolve one application's review status from its round's
    /// reviewed-applications document.
    pub async fn update_application_status(
        &self,
        ctx: &ConnectionContext,
        row: &RoundProjectRow,
        round_id: &str,
    ) -> SyncStatus {
        let round = self.round_scope(ctx, round_id).await;
        self.reconcile_status(row, &round).await
    }

    async fn reconcile_status(&self, row: &RoundProjectRow, round: &RoundScope) -> SyncStatus {
        self.set_application(round, row, |app| {
            app.status_sync = SyncStatus::Loading;
            app.error = None;
        })
        .await;

        // Not reviewed yet.
        let Some(projects_meta_ptr) = row.projects_meta_ptr() else {
            return self
                .set_application(round, row, |app| {
                    app.status = AppStatus::Pending;
                    app.status_sync = SyncStatus::Loaded;
                })
                .await;
        };

        match self.store.fetch_document::<Vec<ReviewRecord>>(&projects_meta_ptr).await {
            Ok(records) => {
                let status = first_matching_status(&records, &row.id);
                self.set_application(round, row, |app| {
                    app.status = status;
                    app.status_sync = SyncStatus::Loaded;
                })
                .await
            }
            Err(err) => {
                self.report(&err, &[("projectID", row.id.clone()), ("roundId", round.round_id.clone())]);
                self.set_application(round, row, |app| {
                    app.status_sync = SyncStatus::Error;
                    app.error = Some(STATUS_ERROR.to_string());
                })
                .await
            }
        }
    }

    async fn set_application(
        &self,
        round: &RoundScope,
        row: &RoundProjectRow,
        update: impl FnOnce(&mut RoundApplication),
    ) -> SyncStatus {
        self.apply_round(round, |state| {
            let entry = state
                .snapshot
                .round_applications
                .entry(round.key.clone())
                .or_default();
            let app = entry
                .applications
                .entry(row.id.clone())
                .or_insert_with(|| new_round_application(row, &round.round_id));
            update(app);
            app.status_sync
        })
        .await
        .unwrap_or(SyncStatus::Undefined)
    }

    // ─────────────────────────────────────────────────────
    // Rounds
    // ─────────────────────────────────────────────────────

    /// Load a round's application form for the application flow.
    pub async fn load_round(&self, ctx: &ConnectionContext, round_id: &str) -> SyncStatus {
        let round = self.round_scope(ctx, round_id).await;
        let lease = match self.claim(ConcernKey::Round {
            round: round.key.clone(),
            generation: round.generation,
        }) {
            Ok(lease) => lease,
            Err(rx) => {
                return self
                    .follow_or(rx, |s| s.rounds.get(&round.key).map(|r| r.status).unwrap_or_default())
                    .await
            }
        };

        let started = self
            .apply_round(&round, |state| {
                let entry = state.snapshot.rounds.entry(round.key.clone()).or_default();
                entry.status = SyncStatus::Loading;
                entry.error = None;
            })
            .await;
        if started.is_none() {
            return lease.complete(SyncStatus::Undefined);
        }

        let status = match self.fetch_round(ctx, &round.round_id).await {
            Ok((application_metadata, projects_meta_ptr)) => {
                self.apply_round(&round, |state| {
                    let entry = state.snapshot.rounds.entry(round.key.clone()).or_default();
                    entry.application_metadata = application_metadata;
                    entry.projects_meta_ptr = projects_meta_ptr;
                    entry.status = SyncStatus::Loaded;
                    SyncStatus::Loaded
                })
                .await
            }
            Err(err) => {
                self.report(&err, &[("roundId", round.round_id.clone())]);
                self.apply_round(&round, |state| {
                    let entry = state.snapshot.rounds.entry(round.key.clone()).or_default();
                    entry.error = Some(ROUND_ERROR.to_string());
                    entry.status = SyncStatus::Error;
                    SyncStatus::Error
                })
                .await
            }
        };
        lease.complete(status.unwrap_or(SyncStatus::Undefined))
    }

    async fn fetch_round(
        &self,
        ctx: &ConnectionContext,
        round_id: &str,
    ) -> Result<(Option<RoundApplicationMetadata>, Option<MetaPtr>)> {
        let row = self
            .index
            .query_round(round_id, ctx.chain_id)
            .await?
            .ok_or_else(|| ClientError::DataIntegrity(format!("round {round_id} is not indexed")))?;

        let application_metadata = match row.application_meta_ptr.as_ref().and_then(|p| p.to_meta_ptr()) {
            Some(ptr) => Some(self.store.fetch_document(&ptr).await?),
            None => None,
        };
        let projects_meta_ptr = row.projects_meta_ptr.as_ref().and_then(|p| p.to_meta_ptr());
        Ok((application_metadata, projects_meta_ptr))
    }

    /// Drop a round's state; late results for it are discarded.
    pub async fn unload_round(&self, ctx: &ConnectionContext, round_id: &str) {
        let key = round_key(ctx.chain_id, round_id);
        self.in_scope(ctx, |state| {
            state.generations.bump_round(&key);
            state.snapshot.rounds.remove(&key);
            state.snapshot.round_applications.remove(&key);
        })
        .await;
    }

    // ─────────────────────────────────────────────────────
    // Plumbing
    // ─────────────────────────────────────────────────────

    pub(crate) async fn with_state<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        let mut state = self.state.write().await;
        f(&mut state)
    }

    /// Run `f` with the engine pointed at `ctx`'s account and chain.
    /// Everything loaded for another account or chain is dropped first.
    pub(crate) async fn in_scope<R>(&self, ctx: &ConnectionContext, f: impl FnOnce(&mut EngineState) -> R) -> R {
        let scope = ctx.scope();
        self.with_state(|state| {
            if state.snapshot.scope.as_deref() != Some(scope.as_str()) {
                if let Some(previous) = state.snapshot.scope.replace(scope.clone()) {
                    info!("Switched from {previous} to {scope}");
                    clear_account_state(state);
                    clear_round_state(state);
                }
            }
            f(state)
        })
        .await
    }

    async fn round_scope(&self, ctx: &ConnectionContext, round_id: &str) -> RoundScope {
        let key = round_key(ctx.chain_id, round_id);
        let generation = self.in_scope(ctx, |state| state.generations.round(&key)).await;
        RoundScope {
            key,
            round_id: round_id.to_ascii_lowercase(),
            generation,
        }
    }

    /// Apply `f` only if no account unload happened since `generation`.
    async fn apply_account<R>(&self, generation: u64, f: impl FnOnce(&mut EngineState) -> R) -> Option<R> {
        let mut state = self.state.write().await;
        (state.generations.account == generation).then(|| f(&mut state))
    }

    /// Apply `f` only if `round` was not unloaded since its work started.
    async fn apply_round<R>(&self, round: &RoundScope, f: impl FnOnce(&mut EngineState) -> R) -> Option<R> {
        let mut state = self.state.write().await;
        (state.generations.round(&round.key) == round.generation).then(|| f(&mut state))
    }

    fn claim(&self, key: ConcernKey) -> std::result::Result<Lease<ConcernKey>, tokio::sync::watch::Receiver<Option<SyncStatus>>> {
        match self.inflight.claim(key) {
            Claim::Leader(lease) => Ok(lease),
            Claim::Follower(rx) => Err(rx),
        }
    }

    async fn follow_or(
        &self,
        rx: tokio::sync::watch::Receiver<Option<SyncStatus>>,
        current: impl FnOnce(&SyncSnapshot) -> SyncStatus,
    ) -> SyncStatus {
        match follow(rx).await {
            Some(status) => status,
            None => current(&self.state.read().await.snapshot),
        }
    }

    async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    pub(crate) fn report(&self, err: &ClientError, context: &[(&str, String)]) {
        if err.is_network() {
            warn!("Upstream failure: {err}");
        }
        self.monitor.add_error(err, context);
    }

    pub(crate) fn inflight(&self) -> &Arc<InFlight<ConcernKey>> {
        &self.inflight
    }

    pub(crate) fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub(crate) fn options(&self) -> EngineOptions {
        self.options
    }
}

fn clear_account_state(state: &mut EngineState) {
    state.generations.account += 1;
    state.snapshot.projects = Default::default();
    state.snapshot.metadata.clear();
    state.snapshot.project_applications.clear();
}

fn clear_round_state(state: &mut EngineState) {
    state.generations.scope += 1;
    state.snapshot.rounds.clear();
    state.snapshot.round_applications.clear();
    state.snapshot.submissions.clear();
}

/// Round ids are only unique per chain.
pub fn round_key(chain_id: u64, round_id: &str) -> String {
    format!("{chain_id}:{}", round_id.to_ascii_lowercase())
}

fn new_round_application(row: &RoundProjectRow, round_id: &str) -> RoundApplication {
    RoundApplication {
        id: row.id.clone(),
        round_id: round_id.to_string(),
        status: AppStatus::from_wire(row.status.as_deref()),
        meta_ptr: row.meta_ptr.as_ref().and_then(|p| p.to_meta_ptr()),
        status_sync: SyncStatus::Undefined,
        error: None,
    }
}

/// The subgraph indexes applications by the `bytes32` project id.
pub fn subgraph_project_ref(project_id: &ProjectId) -> String {
    alloy_primitives::hex::encode_prefixed(project_id.to_bytes32())
}

/// The first record for `application_id` decides; later duplicates are
/// ignored. No record means the round never saw the application.
fn first_matching_status(records: &[ReviewRecord], application_id: &str) -> AppStatus {
    records
        .iter()
        .find(|r| r.id.eq_ignore_ascii_case(application_id))
        .map(|r| r.status)
        .unwrap_or(AppStatus::NotFound)
}

pub struct EventMap {
    pub events: BTreeMap<ProjectId, ProjectEvent>,
    pub meta_ptrs: BTreeMap<ProjectId, MetaPtr>,
}

/// Fold created and updated logs into per-project block bookkeeping.
///
/// `updated_at_block` is the highest update block seen for an id, including
/// what `previous` already recorded. Updates for ids outside the created set
/// are dropped.
pub fn build_event_map(
    ctx: &ConnectionContext,
    logs: &ProjectLogs,
    previous: &BTreeMap<ProjectId, ProjectEvent>,
) -> EventMap {
    let mut events = BTreeMap::new();
    for (log, number) in logs.created.iter().zip(&logs.ids) {
        let id = ctx.project_id(*number);
        let mut event = ProjectEvent::created(log.block_number);
        if let Some(block) = previous.get(&id).and_then(|p| p.updated_at_block) {
            event.observe_update(block);
        }
        events.insert(id, event);
    }

    let mut meta_ptrs = BTreeMap::new();
    let mut pointer_blocks: BTreeMap<ProjectId, u64> = BTreeMap::new();
    for log in &logs.updated {
        let number = match log.project_number() {
            Ok(number) => number,
            Err(err) => {
                warn!("Skipping malformed update log: {err}");
                continue;
            }
        };
        let id = ctx.project_id(number);
        let Some(event) = events.get_mut(&id) else {
            continue;
        };
        event.observe_update(log.block_number);

        if pointer_blocks.get(&id).is_some_and(|b| *b > log.block_number) {
            continue;
        }
        match abi::decode_meta_ptr(log) {
            Ok(ptr) => {
                pointer_blocks.insert(id.clone(), log.block_number);
                meta_ptrs.insert(id, ptr);
            }
            Err(err) => warn!("Undecodable metadata pointer for {id}: {err}"),
        }
    }

    EventMap { events, meta_ptrs }
}
