//! Grants client sync core: entry point.
//!
//! Syncs one account's registry projects, their pinned metadata and their
//! round applications into an in-memory snapshot, optionally refreshing it in
//! the background, and exposes it through a small Axum REST API alongside the
//! persisted client state.

mod abi;
mod api;
mod application;
mod config;
mod context;
mod db;
mod errors;
mod events;
mod inflight;
mod logs;
mod metadata;
mod monitor;
mod refresh;
mod rpc;
mod signer;
mod state;
mod subgraph;
mod sync;
#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use context::ConnectionContext;
use metadata::{MetadataStore, PinataClient, PinataConfig};
use monitor::TracingMonitor;
use refresh::RefreshState;
use rpc::HttpRpc;
use signer::{RpcSigner, Signer};
use subgraph::SubgraphClient;
use sync::{EngineOptions, ProjectSyncEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    let pool = db::init_pool(&config.database_url).await?;

    // HTTP client shared by the RPC, subgraph and pinning clients.
    let client = Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()?;

    // ─── Chain connection ─────────────────────────────────
    let rpc = Arc::new(HttpRpc::new(client.clone(), config.rpc_url.clone()));
    let signer = match &config.account {
        Some(account) => RpcSigner::new(rpc.clone(), *account),
        None => RpcSigner::connect(rpc.clone()).await?,
    };
    let account = signer.get_address().await?;
    let ctx = ConnectionContext {
        chain_id: config.chain_id,
        account,
        registry: config.registry,
        rpc,
        signer: Some(Arc::new(signer)),
    };
    info!("Connected {} on chain {}", ctx.account, ctx.chain_id);

    // ─── Sync engine ──────────────────────────────────────
    let pinning = PinataClient::new(
        client.clone(),
        PinataConfig {
            api_url: config.pinata_api_url.clone(),
            gateway_url: config.ipfs_gateway_url.clone(),
            jwt: config.pinata_jwt.clone(),
        },
    );
    if config.pinata_jwt.is_none() {
        warn!("PINATA_JWT is not set; application submission will fail at upload");
    }
    let engine = ProjectSyncEngine::new(
        Arc::new(MetadataStore::new(Arc::new(pinning))),
        Arc::new(SubgraphClient::new(client, config.subgraph_urls.clone())),
        Arc::new(TracingMonitor),
        EngineOptions {
            apply_with_project_id: config.apply_with_project_id,
        },
    );

    // ─── Background refresh ───────────────────────────────
    if config.refresh_interval_secs > 0 {
        tokio::spawn(refresh::run(Arc::new(RefreshState {
            engine: engine.clone(),
            ctx: ctx.clone(),
            interval: Duration::from_secs(config.refresh_interval_secs),
        })));
    }

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState { pool, engine, ctx });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/state", get(api::get_state))
        .route("/projects/load", post(api::load_projects))
        .route("/projects/unload", post(api::unload_projects))
        .route("/projects/:id/applications", post(api::load_project_applications))
        .route("/rounds/:id/load", post(api::load_round))
        .route("/rounds/:id/applications", post(api::load_round_applications))
        .route("/rounds/:id/apply", post(api::apply_to_round))
        .route(
            "/client-state/round-to-apply",
            get(api::get_round_to_apply)
                .put(api::put_round_to_apply)
                .delete(api::delete_round_to_apply),
        )
        .route(
            "/client-state/application-modal-status",
            get(api::get_application_modal_status).put(api::put_application_modal_status),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
