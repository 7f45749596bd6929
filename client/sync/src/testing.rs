//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::abi::{self, MetadataUpdated, ProjectCreated};
use crate::context::ConnectionContext;
use crate::errors::{ClientError, Result};
use crate::events::{Log, MetaPtr, IPFS_PROTOCOL};
use crate::metadata::{MetadataStore, PinningService};
use crate::monitor::ErrorMonitor;
use crate::rpc::{ChainRpc, LogFilter, Topic};
use crate::signer::{ContractCall, Signer};
use crate::subgraph::{IndexQuery, ProjectApplicationRow, RoundProjectRow, RoundRef, RoundRow, SubgraphMetaPtr};
use crate::sync::{EngineOptions, ProjectSyncEngine};

pub fn registry() -> Address {
    "0x8e5da2b8e9f7d4c5a6b3c2d1e0f9a8b7c6d5e4f3".parse().unwrap()
}

pub fn account() -> Address {
    "0x00000000000000000000000000000000000a11ce".parse().unwrap()
}

pub fn foreign_address() -> Address {
    "0x9999999999999999999999999999999999999999".parse().unwrap()
}

pub fn context(chain_id: u64, rpc: Arc<FakeRpc>) -> ConnectionContext {
    ConnectionContext {
        chain_id,
        account: account(),
        registry: registry(),
        rpc,
        signer: None,
    }
}

pub fn created_log(block: u64, id: u64) -> Log {
    created_log_for(block, U256::from(id))
}

pub fn created_log_for(block: u64, id: U256) -> Log {
    Log {
        address: registry(),
        topics: vec![
            ProjectCreated::SIGNATURE_HASH,
            abi::id_topic(id),
            abi::address_topic(account()),
        ],
        data: Bytes::new(),
        block_number: block,
    }
}

/// Update log whose pointer is `QmProject{id}Block{block}`.
pub fn updated_log(block: u64, id: u64) -> Log {
    updated_log_for(block, U256::from(id))
}

pub fn updated_log_for(block: u64, id: U256) -> Log {
    let meta_ptr = MetaPtr {
        protocol: IPFS_PROTOCOL,
        pointer: format!("QmProject{id}Block{block}"),
    };
    let event = MetadataUpdated {
        project_id: id,
        meta_ptr: (&meta_ptr).into(),
    };
    Log {
        address: registry(),
        topics: vec![MetadataUpdated::SIGNATURE_HASH, abi::id_topic(id)],
        data: Bytes::from(event.encode_data()),
        block_number: block,
    }
}

pub fn round_row(id: &str, round: &str, projects_pointer: Option<&str>) -> RoundProjectRow {
    RoundProjectRow {
        id: id.to_string(),
        meta_ptr: None,
        status: Some("PENDING".into()),
        round: RoundRef {
            id: Some(round.to_string()),
            projects_meta_ptr: projects_pointer.map(|p| SubgraphMetaPtr {
                protocol: Some(IPFS_PROTOCOL),
                pointer: Some(p.to_string()),
            }),
        },
    }
}

pub fn review_document(records: &[(&str, &str)]) -> Vec<u8> {
    let records: Vec<_> = records
        .iter()
        .map(|(id, status)| json!({ "id": id, "status": status }))
        .collect();
    serde_json::to_vec(&records).unwrap()
}

/// Blocks calls while the returned guard is held.
#[derive(Default)]
struct Gate(Arc<RwLock<()>>);

impl Gate {
    fn hold(&self) -> OwnedRwLockWriteGuard<()> {
        self.0.clone().try_write_owned().expect("gate already held")
    }

    async fn pass(&self) {
        let _open = self.0.read().await;
    }
}

// ─────────────────────────────────────────────────────────
// Chain
// ─────────────────────────────────────────────────────────

/// Serves a fixed log set, honouring address and topic filters like a node.
#[derive(Default)]
pub struct FakeRpc {
    logs: Vec<Log>,
    fail: bool,
    filters: Mutex<Vec<LogFilter>>,
    gate: Gate,
}

impl FakeRpc {
    pub fn new(logs: Vec<Log>) -> Arc<Self> {
        Arc::new(Self {
            logs,
            ..Default::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }

    pub fn filters(&self) -> Vec<LogFilter> {
        self.filters.lock().unwrap().clone()
    }

    pub fn hold(&self) -> OwnedRwLockWriteGuard<()> {
        self.gate.hold()
    }
}

fn topic_matches(filter: &Topic, value: Option<&B256>) -> bool {
    match filter {
        Topic::Any => true,
        Topic::One(t) => value == Some(t),
        Topic::OneOf(ts) => value.is_some_and(|v| ts.contains(v)),
    }
}

#[async_trait]
impl ChainRpc for FakeRpc {
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>> {
        self.filters.lock().unwrap().push(filter.clone());
        self.gate.pass().await;
        if self.fail {
            return Err(ClientError::Rpc {
                code: -32000,
                message: "header not found".into(),
            });
        }
        Ok(self
            .logs
            .iter()
            .filter(|log| filter.address.map_or(true, |a| a == log.address))
            .filter(|log| {
                filter
                    .topics
                    .iter()
                    .enumerate()
                    .all(|(i, t)| topic_matches(t, log.topics.get(i)))
            })
            .cloned()
            .collect())
    }
}

// ─────────────────────────────────────────────────────────
// Pinning
// ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryPinning {
    documents: Mutex<HashMap<String, Vec<u8>>>,
    pinned: Mutex<Vec<Vec<u8>>>,
    fetches: AtomicUsize,
    next: AtomicUsize,
    gate: Gate,
}

impl MemoryPinning {
    /// Store `body` under a fresh pointer.
    pub fn insert(&self, body: &[u8]) -> String {
        let pointer = format!("QmMemory{}", self.next.fetch_add(1, Ordering::SeqCst));
        self.insert_at(&pointer, body);
        pointer
    }

    pub fn insert_at(&self, pointer: &str, body: &[u8]) {
        self.documents
            .lock()
            .unwrap()
            .insert(pointer.to_string(), body.to_vec());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Bodies received through `pin_json`, in order.
    pub fn documents(&self) -> Vec<Vec<u8>> {
        self.pinned.lock().unwrap().clone()
    }

    pub fn hold(&self) -> OwnedRwLockWriteGuard<()> {
        self.gate.hold()
    }
}

#[async_trait]
impl PinningService for MemoryPinning {
    async fn pin_json(&self, body: &[u8]) -> Result<String> {
        self.pinned.lock().unwrap().push(body.to_vec());
        Ok(self.insert(body))
    }

    async fn fetch_json(&self, pointer: &str) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        self.documents
            .lock()
            .unwrap()
            .get(pointer)
            .cloned()
            .ok_or_else(|| ClientError::Pinning(format!("gateway returned 404 Not Found for {pointer}")))
    }
}

// ─────────────────────────────────────────────────────────
// Subgraph
// ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeIndex {
    round_rows: Mutex<Vec<RoundProjectRow>>,
    project_rows: Mutex<Vec<ProjectApplicationRow>>,
    round: Mutex<Option<RoundRow>>,
    fail: AtomicBool,
    round_queries: AtomicUsize,
    last_project_ref: Mutex<Option<String>>,
}

fn subgraph_ptr(pointer: Option<&str>) -> Option<SubgraphMetaPtr> {
    pointer.map(|p| SubgraphMetaPtr {
        protocol: Some(IPFS_PROTOCOL),
        pointer: Some(p.to_string()),
    })
}

impl FakeIndex {
    pub fn set_round_rows(&self, rows: Vec<RoundProjectRow>) {
        *self.round_rows.lock().unwrap() = rows;
    }

    pub fn set_project_rows(&self, rows: Vec<(&str, &str)>) {
        *self.project_rows.lock().unwrap() = rows
            .into_iter()
            .map(|(round, status)| ProjectApplicationRow {
                status: Some(status.to_string()),
                round: RoundRef {
                    id: Some(round.to_string()),
                    projects_meta_ptr: None,
                },
            })
            .collect();
    }

    pub fn set_round(&self, application_pointer: Option<&str>, projects_pointer: Option<&str>) {
        *self.round.lock().unwrap() = Some(RoundRow {
            id: "0xabc".into(),
            application_meta_ptr: subgraph_ptr(application_pointer),
            projects_meta_ptr: subgraph_ptr(projects_pointer),
        });
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn round_queries(&self) -> usize {
        self.round_queries.load(Ordering::SeqCst)
    }

    pub fn last_project_ref(&self) -> Option<String> {
        self.last_project_ref.lock().unwrap().clone()
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::Subgraph("indexer unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl IndexQuery for FakeIndex {
    async fn query_applications_for_round(&self, _round_id: &str, _chain_id: u64) -> Result<Vec<RoundProjectRow>> {
        self.round_queries.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.round_rows.lock().unwrap().clone())
    }

    async fn query_applications_for_project(
        &self,
        project_ref: &str,
        _chain_id: u64,
    ) -> Result<Vec<ProjectApplicationRow>> {
        *self.last_project_ref.lock().unwrap() = Some(project_ref.to_string());
        self.check()?;
        Ok(self.project_rows.lock().unwrap().clone())
    }

    async fn query_round(&self, _round_id: &str, _chain_id: u64) -> Result<Option<RoundRow>> {
        self.check()?;
        Ok(self.round.lock().unwrap().clone())
    }
}

// ─────────────────────────────────────────────────────────
// Wallet and monitor
// ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeSigner {
    reject_transactions: bool,
    calls: Mutex<Vec<ContractCall>>,
}

impl FakeSigner {
    pub fn rejecting() -> Self {
        Self {
            reject_transactions: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<ContractCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Signer for FakeSigner {
    async fn get_address(&self) -> Result<Address> {
        Ok(account())
    }

    async fn sign_message(&self, _message: &str) -> Result<String> {
        Ok("0xsigned".into())
    }

    async fn send_transaction(&self, call: &ContractCall) -> Result<String> {
        if self.reject_transactions {
            return Err(ClientError::Signer("user rejected transaction".into()));
        }
        self.calls.lock().unwrap().push(call.clone());
        Ok(format!("0x{}", "ab".repeat(32)))
    }
}

#[derive(Default)]
pub struct RecordingMonitor {
    reports: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl RecordingMonitor {
    pub fn count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }

    pub fn contexts(&self) -> Vec<Vec<(String, String)>> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .map(|(_, context)| context.clone())
            .collect()
    }
}

impl ErrorMonitor for RecordingMonitor {
    fn add_error(&self, error: &dyn std::error::Error, context: &[(&str, String)]) {
        let context = context.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        self.reports.lock().unwrap().push((error.to_string(), context));
    }
}

// ─────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────

pub struct Fixture {
    pub engine: ProjectSyncEngine,
    pub pinning: Arc<MemoryPinning>,
    pub index: Arc<FakeIndex>,
    pub monitor: Arc<RecordingMonitor>,
}

/// Engine over in-memory collaborators; `round_rows` seeds the subgraph.
pub fn engine_with(round_rows: Vec<RoundProjectRow>) -> Fixture {
    engine_with_options(round_rows, EngineOptions::default())
}

pub fn engine_with_options(round_rows: Vec<RoundProjectRow>, options: EngineOptions) -> Fixture {
    let pinning = Arc::new(MemoryPinning::default());
    let index = Arc::new(FakeIndex::default());
    index.set_round_rows(round_rows);
    let monitor = Arc::new(RecordingMonitor::default());
    let engine = ProjectSyncEngine::new(
        Arc::new(MetadataStore::new(pinning.clone())),
        index.clone(),
        monitor.clone(),
        options,
    );
    Fixture {
        engine,
        pinning,
        index,
        monitor,
    }
}
