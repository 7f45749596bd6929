//! Canonical types for the project registry events and the entities derived
//! from them.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolEvent;
use serde::{Deserialize, Serialize};

use crate::abi::{self, MetadataUpdated, ProjectCreated};
use crate::errors::{ClientError, Result};

/// Meta pointer protocol id for IPFS.
pub const IPFS_PROTOCOL: u64 = 1;

/// Recognised registry event kinds, keyed by their first topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// `ProjectCreated(uint256 indexed projectID, address indexed owner)`
    ProjectCreated,
    /// `MetadataUpdated(uint256 indexed projectID, MetaPtr metaPtr)`
    MetadataUpdated,
    Unknown,
}

impl EventKind {
    pub fn topic(&self) -> Option<B256> {
        match self {
            Self::ProjectCreated => Some(ProjectCreated::SIGNATURE_HASH),
            Self::MetadataUpdated => Some(MetadataUpdated::SIGNATURE_HASH),
            Self::Unknown => None,
        }
    }

    pub fn from_topic(topic: &B256) -> Self {
        [Self::ProjectCreated, Self::MetadataUpdated]
            .into_iter()
            .find(|kind| kind.topic().as_ref() == Some(topic))
            .unwrap_or(Self::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectCreated => "project_created",
            Self::MetadataUpdated => "metadata_updated",
            Self::Unknown => "unknown",
        }
    }
}

/// Where a piece of metadata is stored and how to interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetaPtr {
    pub protocol: u64,
    pub pointer: String,
}

/// A project is only globally unique as (chain, registry, numeric id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProjectId {
    pub chain_id: u64,
    pub registry: Address,
    pub number: U256,
}

impl ProjectId {
    pub fn new(chain_id: u64, registry: Address, number: U256) -> Self {
        Self {
            chain_id,
            registry,
            number,
        }
    }

    /// `bytes32` identifier used by rounds that accept a real project id.
    pub fn to_bytes32(&self) -> B256 {
        keccak256(self.to_string())
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:#x}:{}", self.chain_id, self.registry, self.number)
    }
}

impl FromStr for ProjectId {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, ':');
        let (Some(chain), Some(registry), Some(number)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ClientError::EventParse(format!("invalid project id: {s}")));
        };
        let chain_id = chain
            .parse()
            .map_err(|_| ClientError::EventParse(format!("invalid chain id in {s}")))?;
        let registry = registry
            .parse()
            .map_err(|_| ClientError::EventParse(format!("invalid registry in {s}")))?;
        let number = number
            .parse()
            .map_err(|_| ClientError::EventParse(format!("invalid project number in {s}")))?;
        Ok(Self::new(chain_id, registry, number))
    }
}

impl Serialize for ProjectId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProjectId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A decoded `eth_getLogs` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
}

impl Log {
    pub fn kind(&self) -> EventKind {
        self.topics
            .first()
            .map(EventKind::from_topic)
            .unwrap_or(EventKind::Unknown)
    }

    /// The registry-local project number carried in the first indexed topic.
    pub fn project_number(&self) -> Result<U256> {
        self.topics
            .get(1)
            .map(abi::topic_id)
            .ok_or_else(|| ClientError::EventParse("log has no project id topic".into()))
    }
}

/// Block bookkeeping for one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectEvent {
    pub created_at_block: u64,
    pub updated_at_block: Option<u64>,
}

impl ProjectEvent {
    pub fn created(block: u64) -> Self {
        Self {
            created_at_block: block,
            updated_at_block: None,
        }
    }

    /// Record an update; the stored block only ever moves forward.
    pub fn observe_update(&mut self, block: u64) {
        self.updated_at_block = Some(self.updated_at_block.map_or(block, |b| b.max(block)));
    }
}

/// Review outcome of a round application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppStatus {
    Approved,
    Rejected,
    Pending,
    NotFound,
    #[serde(other)]
    Unknown,
}

impl AppStatus {
    /// Parse an indexed status string; anything unrecognised is `Unknown`.
    pub fn from_wire(raw: Option<&str>) -> Self {
        match raw.map(str::to_ascii_uppercase).as_deref() {
            Some("APPROVED") => Self::Approved,
            Some("REJECTED") => Self::Rejected,
            Some("PENDING") => Self::Pending,
            Some("NOT_FOUND") => Self::NotFound,
            _ => Self::Unknown,
        }
    }
}

/// Project metadata as pinned by the project owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetadata {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub banner_img: Option<String>,
    #[serde(default)]
    pub logo_img: Option<String>,
    /// Pointer this document was fetched from.
    #[serde(skip_deserializing)]
    pub meta_ptr: Option<MetaPtr>,
}
