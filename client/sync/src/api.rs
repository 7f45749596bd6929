//! Axum REST API handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_primitives::U256;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::application::ApplicationError;
use crate::context::ConnectionContext;
use crate::db::{self, ApplicationModalStatus, RoundToApply};
use crate::events::ProjectId;
use crate::state::SyncStatus;
use crate::sync::ProjectSyncEngine;

#[derive(Clone)]
pub struct ApiState {
    pub pool: SqlitePool,
    pub engine: ProjectSyncEngine,
    pub ctx: ConnectionContext,
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoadParams {
    /// Also fetch per-project metadata.
    #[serde(default = "default_true")]
    pub metadata: bool,
    /// Wait for background fetches before responding.
    #[serde(default)]
    pub wait: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct WaitParams {
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    /// Answers keyed by question id.
    pub answers: BTreeMap<u64, String>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: SyncStatus,
}

#[derive(Serialize)]
pub struct ApplyResponse {
    pub tx_hash: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub chain_id: u64,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn status_response(status: SyncStatus) -> Response {
    Json(StatusResponse { status }).into_response()
}

// ─────────────────────────────────────────────────────────
// Sync handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        chain_id: state.ctx.chain_id,
    })
}

/// `GET /state`
///
/// Full snapshot of everything synced so far.
pub async fn get_state(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.engine.snapshot().await)
}

/// `POST /projects/load`
pub async fn load_projects(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<LoadParams>,
) -> impl IntoResponse {
    let status = state.engine.load_projects(&state.ctx, params.metadata).await;
    if params.wait {
        state.engine.settle().await;
    }
    status_response(status)
}

/// `POST /projects/unload`
pub async fn unload_projects(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    state.engine.unload_projects().await;
    StatusCode::NO_CONTENT
}

/// `POST /projects/:id/applications`
///
/// `id` is either a composite `chain:registry:number` id or a bare registry
/// number on the connected chain.
pub async fn load_project_applications(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let project_id = match id.parse::<ProjectId>() {
        Ok(project_id) => project_id,
        Err(_) => match id.parse::<U256>() {
            Ok(number) => state.ctx.project_id(number),
            Err(_) => return error_response(StatusCode::BAD_REQUEST, format!("invalid project id: {id}")),
        },
    };
    status_response(state.engine.load_project_applications(&state.ctx, &project_id).await)
}

/// `POST /rounds/:id/load`
pub async fn load_round(State(state): State<Arc<ApiState>>, Path(round_id): Path<String>) -> impl IntoResponse {
    status_response(state.engine.load_round(&state.ctx, &round_id).await)
}

/// `POST /rounds/:id/applications`
pub async fn load_round_applications(
    State(state): State<Arc<ApiState>>,
    Path(round_id): Path<String>,
    Query(params): Query<WaitParams>,
) -> impl IntoResponse {
    let status = state.engine.load_round_applications(&state.ctx, &round_id).await;
    if params.wait {
        state.engine.settle().await;
    }
    status_response(status)
}

/// `POST /rounds/:id/apply`
pub async fn apply_to_round(
    State(state): State<Arc<ApiState>>,
    Path(round_id): Path<String>,
    Json(request): Json<ApplyRequest>,
) -> impl IntoResponse {
    match state
        .engine
        .submit_application(&state.ctx, &round_id, &request.answers)
        .await
    {
        Ok(tx_hash) => Json(ApplyResponse { tx_hash }).into_response(),
        Err(err @ ApplicationError::InProgress) => error_response(StatusCode::CONFLICT, err),
        Err(err @ (ApplicationError::Upload | ApplicationError::Transaction)) => {
            error_response(StatusCode::BAD_GATEWAY, err)
        }
        Err(err) => error_response(StatusCode::UNPROCESSABLE_ENTITY, err),
    }
}

// ─────────────────────────────────────────────────────────
// Persisted client state
// ─────────────────────────────────────────────────────────

/// `GET /client-state/round-to-apply`
pub async fn get_round_to_apply(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match db::get_round_to_apply(&state.pool).await {
        Ok(round) => Json(round).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// `PUT /client-state/round-to-apply`
pub async fn put_round_to_apply(
    State(state): State<Arc<ApiState>>,
    Json(round): Json<RoundToApply>,
) -> impl IntoResponse {
    match db::set_round_to_apply(&state.pool, &round).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// `DELETE /client-state/round-to-apply`
pub async fn delete_round_to_apply(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match db::clear_round_to_apply(&state.pool).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// `GET /client-state/application-modal-status`
pub async fn get_application_modal_status(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match db::get_application_modal_status(&state.pool).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// `PUT /client-state/application-modal-status`
pub async fn put_application_modal_status(
    State(state): State<Arc<ApiState>>,
    Json(status): Json<ApplicationModalStatus>,
) -> impl IntoResponse {
    match db::set_application_modal_status(&state.pool, status).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, created_log, engine_with, FakeRpc, Fixture};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn api(rpc: Arc<FakeRpc>) -> (Arc<ApiState>, Fixture) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        let fixture = engine_with(vec![]);
        let state = Arc::new(ApiState {
            pool,
            engine: fixture.engine.clone(),
            ctx: context(1, rpc),
        });
        (state, fixture)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn load_then_read_state() {
        let (state, _fixture) = api(FakeRpc::new(vec![created_log(100, 5)])).await;

        let response = load_projects(
            State(state.clone()),
            Query(LoadParams {
                metadata: false,
                wait: true,
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "loaded");

        let snapshot = body_json(get_state(State(state.clone())).await.into_response()).await;
        let key = state.ctx.project_id(U256::from(5)).to_string();
        assert_eq!(snapshot["projects"]["events"][&key]["createdAtBlock"], 100);
    }

    #[tokio::test]
    async fn bad_project_id_is_a_client_error() {
        let (state, _fixture) = api(FakeRpc::new(vec![])).await;

        let response = load_project_applications(State(state), Path("not-an-id".to_string()))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn apply_without_round_is_unprocessable() {
        let (state, _fixture) = api(FakeRpc::new(vec![])).await;

        let response = apply_to_round(
            State(state),
            Path("0x1111111111111111111111111111111111111111".to_string()),
            Json(ApplyRequest {
                answers: BTreeMap::new(),
            }),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["error"], "cannot load round data");
    }

    #[tokio::test]
    async fn client_state_round_trip() {
        let (state, _fixture) = api(FakeRpc::new(vec![])).await;

        let response = put_round_to_apply(
            State(state.clone()),
            Json(RoundToApply {
                chain_id: 10,
                round_id: "0xabc".into(),
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let round = body_json(get_round_to_apply(State(state.clone())).await.into_response()).await;
        assert_eq!(round["chainId"], 10);
        let modal = body_json(get_application_modal_status(State(state.clone())).await.into_response()).await;
        assert_eq!(modal, "notApplied");

        let response = delete_round_to_apply(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let round = body_json(get_round_to_apply(State(state.clone())).await.into_response()).await;
        assert!(round.is_null());
        let response = delete_round_to_apply(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bare_project_number_may_exceed_u128() {
        let (state, _fixture) = api(FakeRpc::new(vec![])).await;
        let wide = format!("{}", U256::from(u128::MAX) + U256::from(1));

        let response = load_project_applications(State(state.clone()), Path(wide))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "loaded");
    }
}
