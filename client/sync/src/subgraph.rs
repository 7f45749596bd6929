//! Per-chain subgraph queries for rounds and round applications.
//!
//! Pure request/response: a failed query is returned to the caller and never
//! re-issued here.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::{ClientError, Result};
use crate::events::MetaPtr;

const APPLICATIONS_BY_ROUND: &str = r#"
query GetApplicationsByRoundId($roundId: String!) {
  roundProjects(where: { round: $roundId }) {
    id
    metaPtr { protocol pointer }
    status
    round {
      id
      projectsMetaPtr { protocol pointer }
    }
  }
}
"#;

const APPLICATIONS_BY_PROJECT: &str = r#"
query GetApplicationsByProject($projectID: String) {
  roundProjects(where: { project: $projectID }) {
    status
    round { id }
  }
}
"#;

const ROUND_BY_ID: &str = r#"
query GetRound($roundId: String!) {
  rounds(where: { id: $roundId }) {
    id
    applicationMetaPtr { protocol pointer }
    projectsMetaPtr { protocol pointer }
  }
}
"#;

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

/// A meta pointer as indexed; fields stay optional until the round
/// operator publishes them.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SubgraphMetaPtr {
    #[serde(default, deserialize_with = "protocol_number")]
    pub protocol: Option<u64>,
    #[serde(default)]
    pub pointer: Option<String>,
}

impl SubgraphMetaPtr {
    /// `None` unless a non-empty pointer has been published.
    pub fn to_meta_ptr(&self) -> Option<MetaPtr> {
        let pointer = self.pointer.as_deref().filter(|p| !p.is_empty())?;
        Some(MetaPtr {
            protocol: self.protocol.unwrap_or(crate::events::IPFS_PROTOCOL),
            pointer: pointer.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoundRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub projects_meta_ptr: Option<SubgraphMetaPtr>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoundProjectRow {
    pub id: String,
    #[serde(default)]
    pub meta_ptr: Option<SubgraphMetaPtr>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub round: RoundRef,
}

impl RoundProjectRow {
    /// The round's reviewed-applications document, once published.
    pub fn projects_meta_ptr(&self) -> Option<MetaPtr> {
        self.round.projects_meta_ptr.as_ref()?.to_meta_ptr()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProjectApplicationRow {
    #[serde(default)]
    pub status: Option<String>,
    pub round: RoundRef,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoundRow {
    pub id: String,
    #[serde(default)]
    pub application_meta_ptr: Option<SubgraphMetaPtr>,
    #[serde(default)]
    pub projects_meta_ptr: Option<SubgraphMetaPtr>,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoundProjectsData<T> {
    round_projects: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct RoundsData {
    rounds: Vec<RoundRow>,
}

/// The subgraph indexes `uint256` fields as decimal strings.
fn protocol_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<u64>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid protocol {n}"))),
        Some(Value::String(s)) => s
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid protocol {s}"))),
        Some(other) => Err(serde::de::Error::custom(format!("invalid protocol {other}"))),
    }
}

// ─────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────

#[async_trait]
pub trait IndexQuery: Send + Sync {
    async fn query_applications_for_round(&self, round_id: &str, chain_id: u64) -> Result<Vec<RoundProjectRow>>;

    async fn query_applications_for_project(
        &self,
        project_ref: &str,
        chain_id: u64,
    ) -> Result<Vec<ProjectApplicationRow>>;

    async fn query_round(&self, round_id: &str, chain_id: u64) -> Result<Option<RoundRow>>;
}

pub struct SubgraphClient {
    client: Client,
    endpoints: HashMap<u64, String>,
}

impl SubgraphClient {
    pub fn new(client: Client, endpoints: HashMap<u64, String>) -> Self {
        Self { client, endpoints }
    }

    async fn graphql_fetch<T: DeserializeOwned>(&self, chain_id: u64, query: &str, variables: Value) -> Result<T> {
        let url = self
            .endpoints
            .get(&chain_id)
            .ok_or_else(|| ClientError::Config(format!("no subgraph endpoint for chain {chain_id}")))?;

        let response = self
            .client
            .post(url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Subgraph(format!("chain {chain_id} returned {status}")));
        }

        let body: GraphqlResponse<T> = response.json().await?;
        if let Some(first) = body.errors.first() {
            return Err(ClientError::Subgraph(first.message.clone()));
        }
        body.data
            .ok_or_else(|| ClientError::Subgraph("response has no data".to_string()))
    }
}

#[async_trait]
impl IndexQuery for SubgraphClient {
    async fn query_applications_for_round(&self, round_id: &str, chain_id: u64) -> Result<Vec<RoundProjectRow>> {
        let data: RoundProjectsData<RoundProjectRow> = self
            .graphql_fetch(
                chain_id,
                APPLICATIONS_BY_ROUND,
                json!({ "roundId": round_id.to_ascii_lowercase() }),
            )
            .await?;
        debug!("Round {round_id} has {} applications", data.round_projects.len());
        Ok(data.round_projects)
    }

    async fn query_applications_for_project(
        &self,
        project_ref: &str,
        chain_id: u64,
    ) -> Result<Vec<ProjectApplicationRow>> {
        let data: RoundProjectsData<ProjectApplicationRow> = self
            .graphql_fetch(chain_id, APPLICATIONS_BY_PROJECT, json!({ "projectID": project_ref }))
            .await?;
        Ok(data.round_projects)
    }

    async fn query_round(&self, round_id: &str, chain_id: u64) -> Result<Option<RoundRow>> {
        let data: RoundsData = self
            .graphql_fetch(
                chain_id,
                ROUND_BY_ID,
                json!({ "roundId": round_id.to_ascii_lowercase() }),
            )
            .await?;
        Ok(data.rounds.into_iter().next())
    }
}
