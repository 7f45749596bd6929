//! Round application assembly and submission.
//!
//! Stages run `BuildingApplication → UploadingMetadata → SendingTx → Loaded`,
//! or stop at `Error` with a stage-scoped message. Nothing is retried.

use std::collections::BTreeMap;

use alloy_primitives::{address, Address, U256};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::abi::{self, ProjectArg};
use crate::context::ConnectionContext;
use crate::events::{MetaPtr, ProjectId, ProjectMetadata};
use crate::inflight::{Claim, ConcernKey};
use crate::signer::ContractCall;
use crate::state::SubmissionState;
use crate::sync::{round_key, ProjectSyncEngine};

/// Legacy rounds take an `address` where a project id belongs.
pub const SENTINEL_PROJECT_ADDRESS: Address = address!("000000000000000000000000000000000000beaf");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStage {
    BuildingApplication,
    UploadingMetadata,
    SendingTx,
    Loaded,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplicationError {
    #[error("cannot load round data")]
    RoundNotLoaded,
    #[error("cannot load round application metadata")]
    RoundMetadataMissing,
    #[error("cannot find project question id")]
    ProjectQuestionMissing,
    #[error("cannot find selected project metadata")]
    ProjectMetadataMissing,
    #[error("no signer available")]
    NoSigner,
    #[error("error signing application")]
    Signing,
    #[error("error uploading application metadata")]
    Upload,
    #[error("error calling applyToRound")]
    Transaction,
    #[error("an application to this round is already being submitted")]
    InProgress,
}

// ─────────────────────────────────────────────────────────
// Round schema
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: u64,
    pub question: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub info: String,
}

/// The round's application form, pinned by the round operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundApplicationMetadata {
    #[serde(default)]
    pub application_schema: Vec<Question>,
    /// Question whose answer names the applying project.
    #[serde(default)]
    pub project_question_id: Option<u64>,
}

// ─────────────────────────────────────────────────────────
// Application document
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub website: String,
    pub banner_img: Option<String>,
    pub logo_img: Option<String>,
    pub meta_ptr: MetaPtr,
    pub last_updated: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: u64,
    pub question: String,
    pub answer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationDocument {
    pub round: String,
    pub recipient: Address,
    pub project: ProjectSummary,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignedApplication {
    pub signature: String,
    pub application: ApplicationDocument,
}

/// Combines a project's cached metadata with a round's schema.
pub struct ApplicationBuilder<'a> {
    project_id: &'a ProjectId,
    project: &'a ProjectMetadata,
    meta_ptr: &'a MetaPtr,
    round: &'a RoundApplicationMetadata,
}

impl<'a> ApplicationBuilder<'a> {
    pub fn new(
        project_id: &'a ProjectId,
        project: &'a ProjectMetadata,
        meta_ptr: &'a MetaPtr,
        round: &'a RoundApplicationMetadata,
    ) -> Self {
        Self {
            project_id,
            project,
            meta_ptr,
            round,
        }
    }

    pub fn build(&self, round_address: &str, recipient: Address, answers: &BTreeMap<u64, String>) -> ApplicationDocument {
        let answers = self
            .round
            .application_schema
            .iter()
            .map(|q| Answer {
                question_id: q.id,
                question: q.question.clone(),
                answer: answers.get(&q.id).cloned(),
            })
            .collect();

        ApplicationDocument {
            round: round_address.to_string(),
            recipient,
            project: ProjectSummary {
                id: self.project_id.to_string(),
                title: self.project.title.clone(),
                description: self.project.description.clone(),
                website: self.project.website.clone(),
                banner_img: self.project.banner_img.clone(),
                logo_img: self.project.logo_img.clone(),
                meta_ptr: self.meta_ptr.clone(),
                last_updated: Utc::now().timestamp_millis(),
            },
            answers,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Submission
// ─────────────────────────────────────────────────────────

impl ProjectSyncEngine {
    /// Build, sign, pin and submit an application to `round_address`.
    ///
    /// Each failure is recorded on the round's submission state at the point
    /// it is detected.
    pub async fn submit_application(
        &self,
        ctx: &ConnectionContext,
        round_address: &str,
        answers: &BTreeMap<u64, String>,
    ) -> Result<String, ApplicationError> {
        let key = round_key(ctx.chain_id, round_address);
        let round_address = round_address.to_ascii_lowercase();
        let lease = match self.inflight().claim(ConcernKey::Submission { round: key.clone() }) {
            Claim::Leader(lease) => lease,
            Claim::Follower(_) => return Err(ApplicationError::InProgress),
        };
        self.in_scope(ctx, |_| ()).await;

        let result = self.run_submission(ctx, &key, &round_address, answers).await;
        match &result {
            Ok(tx_hash) => {
                info!("Applied to round {key} in tx {tx_hash}");
                self.set_submission(&key, ApplicationStage::Loaded, None, Some(tx_hash.clone()))
                    .await;
                lease.complete(crate::state::SyncStatus::Loaded);
            }
            Err(err) => {
                warn!("Application to round {key} failed: {err}");
                self.set_submission(&key, ApplicationStage::Error, Some(err.to_string()), None)
                    .await;
                lease.complete(crate::state::SyncStatus::Error);
            }
        }
        result
    }

    async fn run_submission(
        &self,
        ctx: &ConnectionContext,
        key: &str,
        round_address: &str,
        answers: &BTreeMap<u64, String>,
    ) -> Result<String, ApplicationError> {
        self.set_submission(key, ApplicationStage::BuildingApplication, None, None)
            .await;

        let (project_id, project, meta_ptr, round) = self.resolve_inputs(ctx, key, answers).await?;
        let to: Address = round_address.parse().map_err(|_| ApplicationError::RoundNotLoaded)?;
        let report_context = [("roundAddress", round_address.to_string())];

        let signer = ctx.signer.clone().ok_or(ApplicationError::NoSigner)?;
        let recipient = signer.get_address().await.map_err(|e| {
            self.report(&e, &report_context);
            ApplicationError::Signing
        })?;

        let application = ApplicationBuilder::new(&project_id, &project, &meta_ptr, &round).build(
            round_address,
            recipient,
            answers,
        );
        let canonical = serde_json::to_string(&application).map_err(|_| ApplicationError::Signing)?;
        let signature = signer.sign_message(&canonical).await.map_err(|e| {
            self.report(&e, &report_context);
            ApplicationError::Signing
        })?;

        self.set_submission(key, ApplicationStage::UploadingMetadata, None, None)
            .await;
        let pinned = self
            .store()
            .pin(&SignedApplication {
                signature,
                application,
            })
            .await
            .map_err(|e| {
                self.report(&e, &report_context);
                ApplicationError::Upload
            })?;

        self.set_submission(key, ApplicationStage::SendingTx, None, None)
            .await;
        let project_arg = if self.options().apply_with_project_id {
            ProjectArg::Id(project_id.to_bytes32())
        } else {
            ProjectArg::Address(SENTINEL_PROJECT_ADDRESS)
        };
        let call = ContractCall {
            to,
            data: abi::encode_apply_to_round(&project_arg, &pinned),
        };
        signer.send_transaction(&call).await.map_err(|e| {
            self.report(&e, &report_context);
            ApplicationError::Transaction
        })
    }

    /// Gather round schema and project metadata from synced state, failing on
    /// the first missing piece.
    async fn resolve_inputs(
        &self,
        ctx: &ConnectionContext,
        key: &str,
        answers: &BTreeMap<u64, String>,
    ) -> Result<(ProjectId, ProjectMetadata, MetaPtr, RoundApplicationMetadata), ApplicationError> {
        let snapshot = self.snapshot().await;

        let round = snapshot
            .rounds
            .get(key)
            .ok_or(ApplicationError::RoundNotLoaded)?;
        let round_metadata = round
            .application_metadata
            .clone()
            .ok_or(ApplicationError::RoundMetadataMissing)?;
        let question_id = round_metadata
            .project_question_id
            .ok_or(ApplicationError::ProjectQuestionMissing)?;

        let project_id = answers
            .get(&question_id)
            .and_then(|answer| resolve_project(ctx, answer))
            .ok_or(ApplicationError::ProjectMetadataMissing)?;
        let project = snapshot
            .metadata
            .get(&project_id.to_string())
            .and_then(|entry| entry.metadata.clone())
            .ok_or(ApplicationError::ProjectMetadataMissing)?;
        let meta_ptr = project
            .meta_ptr
            .clone()
            .ok_or(ApplicationError::ProjectMetadataMissing)?;

        Ok((project_id, project, meta_ptr, round_metadata))
    }

    async fn set_submission(
        &self,
        key: &str,
        stage: ApplicationStage,
        error: Option<String>,
        tx_hash: Option<String>,
    ) {
        self.with_state(|state| {
            state.snapshot.submissions.insert(
                key.to_string(),
                SubmissionState {
                    stage,
                    error,
                    tx_hash,
                },
            );
        })
        .await;
    }
}

/// The project answer holds either a composite id or a bare registry number
/// on the connected chain.
fn resolve_project(ctx: &ConnectionContext, answer: &str) -> Option<ProjectId> {
    let answer = answer.trim();
    answer
        .parse::<ProjectId>()
        .ok()
        .or_else(|| answer.parse::<U256>().ok().map(|n| ctx.project_id(n)))
}
