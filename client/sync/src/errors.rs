//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Subgraph error: {0}")]
    Subgraph(String),

    #[error("Pinning service error: {0}")]
    Pinning(String),

    #[error("Event parse error: {0}")]
    EventParse(String),

    #[error("ABI error: {0}")]
    Abi(#[from] alloy_sol_types::Error),

    /// An expected field is absent from otherwise well-formed data.
    #[error("Missing data: {0}")]
    DataIntegrity(String),

    #[error("Signer error: {0}")]
    Signer(String),
}

impl ClientError {
    /// `true` for failures of an upstream service (RPC, subgraph, pinning)
    /// as opposed to missing or malformed data.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Rpc { .. } | Self::Subgraph(_) | Self::Pinning(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
