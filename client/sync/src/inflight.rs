//! Per-key in-flight guard.
//!
//! The first caller for a key becomes the leader and runs the work; callers
//! arriving while it runs attach to the leader's outcome instead of starting a
//! second, racing request.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::state::{RoundGeneration, SyncStatus};

/// What a sync concern is loading, and under which generation. Work started
/// before an unload never shares a key with work started after it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConcernKey {
    Projects { scope: String, generation: u64 },
    ProjectMetadata { project: String, generation: u64 },
    ProjectApplications { project: String, generation: u64 },
    Round { round: String, generation: RoundGeneration },
    RoundApplications { round: String, generation: RoundGeneration },
    Submission { round: String },
}

pub struct InFlight<K> {
    pending: Mutex<HashMap<K, watch::Receiver<Option<SyncStatus>>>>,
}

pub enum Claim<K: Eq + Hash + Clone> {
    Leader(Lease<K>),
    Follower(watch::Receiver<Option<SyncStatus>>),
}

impl<K: Eq + Hash + Clone> InFlight<K> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub fn claim(self: &Arc<Self>, key: K) -> Claim<K> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(rx) = pending.get(&key) {
            return Claim::Follower(rx.clone());
        }
        let (tx, rx) = watch::channel(None);
        pending.insert(key.clone(), rx);
        Claim::Leader(Lease {
            owner: Arc::clone(self),
            key,
            tx,
        })
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

/// Held by the leader; releases the key when dropped.
pub struct Lease<K: Eq + Hash + Clone> {
    owner: Arc<InFlight<K>>,
    key: K,
    tx: watch::Sender<Option<SyncStatus>>,
}

impl<K: Eq + Hash + Clone> Lease<K> {
    pub fn complete(self, status: SyncStatus) -> SyncStatus {
        self.tx.send_replace(Some(status));
        status
    }
}

impl<K: Eq + Hash + Clone> Drop for Lease<K> {
    fn drop(&mut self) {
        self.owner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Wait for the leader's outcome. `None` if the leader went away without
/// completing.
pub async fn follow(mut rx: watch::Receiver<Option<SyncStatus>>) -> Option<SyncStatus> {
    rx.wait_for(Option::is_some).await.ok().and_then(|status| *status)
}
