//! Database layer: migrations and the persisted client-state store.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::errors::{ClientError, Result};

pub const ROUND_TO_APPLY_KEY: &str = "roundToApply";
pub const APPLICATION_MODAL_STATUS_KEY: &str = "applicationModalStatus";

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Raw key-value access
// ─────────────────────────────────────────────────────────

pub async fn get_value(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM client_state WHERE key = ?1")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(v,)| v))
}

pub async fn set_value(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO client_state (key, value, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    debug!("Stored client state {key}");
    Ok(())
}

pub async fn remove_value(pool: &SqlitePool, key: &str) -> Result<bool> {
    let affected = sqlx::query("DELETE FROM client_state WHERE key = ?1")
        .bind(key)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(affected > 0)
}

// ─────────────────────────────────────────────────────────
// Typed keys
// ─────────────────────────────────────────────────────────

/// The round a user chose to apply to, stored as `{chain_id}:{round_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundToApply {
    pub chain_id: u64,
    pub round_id: String,
}

impl fmt::Display for RoundToApply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain_id, self.round_id)
    }
}

impl FromStr for RoundToApply {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        let (chain, round) = s
            .split_once(':')
            .filter(|(_, round)| !round.is_empty())
            .ok_or_else(|| ClientError::DataIntegrity(format!("malformed round to apply: {s}")))?;
        let chain_id = chain
            .parse()
            .map_err(|_| ClientError::DataIntegrity(format!("malformed chain id in {s}")))?;
        Ok(Self {
            chain_id,
            round_id: round.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApplicationModalStatus {
    #[default]
    Undefined,
    NotApplied,
    Closed,
}

impl ApplicationModalStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::NotApplied => "notApplied",
            Self::Closed => "closed",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "notApplied" => Self::NotApplied,
            "closed" => Self::Closed,
            _ => Self::Undefined,
        }
    }
}

pub async fn get_round_to_apply(pool: &SqlitePool) -> Result<Option<RoundToApply>> {
    get_value(pool, ROUND_TO_APPLY_KEY)
        .await?
        .map(|raw| raw.parse())
        .transpose()
}

/// Remember `round`, and open the application prompt the first time a round
/// is chosen.
pub async fn set_round_to_apply(pool: &SqlitePool, round: &RoundToApply) -> Result<()> {
    set_value(pool, ROUND_TO_APPLY_KEY, &round.to_string()).await?;
    if get_application_modal_status(pool).await? == ApplicationModalStatus::Undefined {
        set_application_modal_status(pool, ApplicationModalStatus::NotApplied).await?;
    }
    Ok(())
}

/// Forget the chosen round. Returns whether one was stored.
pub async fn clear_round_to_apply(pool: &SqlitePool) -> Result<bool> {
    remove_value(pool, ROUND_TO_APPLY_KEY).await
}

pub async fn get_application_modal_status(pool: &SqlitePool) -> Result<ApplicationModalStatus> {
    Ok(get_value(pool, APPLICATION_MODAL_STATUS_KEY)
        .await?
        .map(|raw| ApplicationModalStatus::parse(&raw))
        .unwrap_or_default())
}

pub async fn set_application_modal_status(pool: &SqlitePool, status: ApplicationModalStatus) -> Result<()> {
    set_value(pool, APPLICATION_MODAL_STATUS_KEY, status.as_str()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn values_overwrite_and_remove() {
        let pool = pool().await;

        assert_eq!(get_value(&pool, "k").await.unwrap(), None);
        set_value(&pool, "k", "one").await.unwrap();
        set_value(&pool, "k", "two").await.unwrap();
        assert_eq!(get_value(&pool, "k").await.unwrap().as_deref(), Some("two"));

        assert!(remove_value(&pool, "k").await.unwrap());
        assert!(!remove_value(&pool, "k").await.unwrap());
    }

    #[tokio::test]
    async fn round_to_apply_uses_chain_prefixed_form() {
        let pool = pool().await;
        let round = RoundToApply {
            chain_id: 10,
            round_id: "0xabc".into(),
        };

        set_round_to_apply(&pool, &round).await.unwrap();

        assert_eq!(
            get_value(&pool, ROUND_TO_APPLY_KEY).await.unwrap().as_deref(),
            Some("10:0xabc")
        );
        assert_eq!(get_round_to_apply(&pool).await.unwrap(), Some(round));
        assert_eq!(
            get_application_modal_status(&pool).await.unwrap(),
            ApplicationModalStatus::NotApplied
        );
    }

    #[tokio::test]
    async fn closed_modal_stays_closed() {
        let pool = pool().await;
        set_application_modal_status(&pool, ApplicationModalStatus::Closed)
            .await
            .unwrap();

        set_round_to_apply(
            &pool,
            &RoundToApply {
                chain_id: 1,
                round_id: "0xdef".into(),
            },
        )
        .await
        .unwrap();

        assert_eq!(
            get_application_modal_status(&pool).await.unwrap(),
            ApplicationModalStatus::Closed
        );
    }

    #[test]
    fn malformed_round_to_apply_is_rejected() {
        assert!("0xabc".parse::<RoundToApply>().is_err());
        assert!("ten:0xabc".parse::<RoundToApply>().is_err());
        assert!("10:".parse::<RoundToApply>().is_err());
    }

    #[tokio::test]
    async fn cleared_round_to_apply_reads_back_empty() {
        let pool = pool().await;
        let round = RoundToApply {
            chain_id: 1,
            round_id: "0xabc".into(),
        };

        set_round_to_apply(&pool, &round).await.unwrap();
        assert!(clear_round_to_apply(&pool).await.unwrap());
        assert!(!clear_round_to_apply(&pool).await.unwrap());

        assert_eq!(get_round_to_apply(&pool).await.unwrap(), None);
        assert_eq!(
            get_application_modal_status(&pool).await.unwrap(),
            ApplicationModalStatus::NotApplied
        );
    }
}
