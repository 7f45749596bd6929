//! Registry log fetching for the connected account.
//!
//! Some chains silently drop results when `eth_getLogs` combines an address
//! with topic filters. On those chains the address is left out of the filter,
//! and every result set is narrowed back to the registry client-side.

use alloy_primitives::{Address, U256};
use tracing::debug;

use crate::abi;
use crate::context::{has_log_filter_defect, ConnectionContext};
use crate::errors::Result;
use crate::events::{EventKind, Log};
use crate::rpc::{LogFilter, Topic};

/// Raw registry logs for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectLogs {
    pub created: Vec<Log>,
    pub updated: Vec<Log>,
    /// Registry-local ids, in creation-log order.
    pub ids: Vec<U256>,
}

/// Fetch `ProjectCreated` logs owned by `account`, then the
/// `MetadataUpdated` logs for the ids found.
///
/// Provider errors propagate to the caller.
pub async fn fetch_project_events(ctx: &ConnectionContext, account: Address) -> Result<ProjectLogs> {
    let created_filter = registry_filter(
        ctx,
        vec![
            kind_topic(EventKind::ProjectCreated),
            Topic::Any,
            Topic::One(abi::address_topic(account)),
        ],
    );
    let created = keep_registry_logs(
        ctx,
        EventKind::ProjectCreated,
        ctx.rpc.get_logs(&created_filter).await?,
    );

    if created.is_empty() {
        debug!("No projects created by {account} on chain {}", ctx.chain_id);
        return Ok(ProjectLogs::default());
    }

    let ids = created
        .iter()
        .map(Log::project_number)
        .collect::<Result<Vec<_>>>()?;

    let updated_filter = registry_filter(
        ctx,
        vec![
            kind_topic(EventKind::MetadataUpdated),
            Topic::OneOf(ids.iter().map(|id| abi::id_topic(*id)).collect()),
        ],
    );
    let updated = keep_registry_logs(
        ctx,
        EventKind::MetadataUpdated,
        ctx.rpc.get_logs(&updated_filter).await?,
    );

    debug!(
        "Fetched {} created / {} updated registry logs on chain {}",
        created.len(),
        updated.len(),
        ctx.chain_id
    );

    Ok(ProjectLogs {
        created,
        updated,
        ids,
    })
}

fn kind_topic(kind: EventKind) -> Topic {
    kind.topic().map_or(Topic::Any, Topic::One)
}

fn registry_filter(ctx: &ConnectionContext, topics: Vec<Topic>) -> LogFilter {
    let mut filter = LogFilter::full_range(ctx.registry, topics);
    if has_log_filter_defect(ctx.chain_id) {
        filter.address = None;
    }
    filter
}

/// Drop logs from other contracts, or of another kind, that an unscoped
/// filter lets through.
fn keep_registry_logs(ctx: &ConnectionContext, kind: EventKind, logs: Vec<Log>) -> Vec<Log> {
    let total = logs.len();
    let kept: Vec<Log> = logs
        .into_iter()
        .filter(|log| log.address == ctx.registry && log.kind() == kind)
        .collect();
    if kept.len() != total {
        debug!(
            "Discarded {} foreign {} logs on chain {}",
            total - kept.len(),
            kind.as_str(),
            ctx.chain_id
        );
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        account, context, created_log, created_log_for, foreign_address, updated_log, updated_log_for, FakeRpc,
    };

    #[tokio::test]
    async fn zero_created_logs_skips_update_query() {
        let rpc = FakeRpc::new(vec![]);
        let ctx = context(1, rpc.clone());

        let logs = fetch_project_events(&ctx, account()).await.unwrap();

        assert_eq!(logs, ProjectLogs::default());
        assert_eq!(rpc.filters().len(), 1);
    }

    #[tokio::test]
    async fn created_filter_targets_account_topic() {
        let rpc = FakeRpc::new(vec![]);
        let ctx = context(1, rpc.clone());

        fetch_project_events(&ctx, account()).await.unwrap();

        let filter = &rpc.filters()[0];
        assert_eq!(filter.address.as_ref(), Some(&ctx.registry));
        assert_eq!(filter.from_block, "0x0");
        assert_eq!(filter.to_block, "latest");
        assert_eq!(filter.topics[1], Topic::Any);
        assert_eq!(filter.topics[2], Topic::One(abi::address_topic(account())));
    }

    #[tokio::test]
    async fn update_query_is_an_or_filter_over_created_ids() {
        let rpc = FakeRpc::new(vec![created_log(100, 5), created_log(101, 9), updated_log(120, 5)]);
        let ctx = context(1, rpc.clone());

        let logs = fetch_project_events(&ctx, account()).await.unwrap();

        assert_eq!(logs.ids, vec![U256::from(5), U256::from(9)]);
        assert_eq!(logs.updated.len(), 1);
        let filters = rpc.filters();
        assert_eq!(filters.len(), 2);
        assert_eq!(
            filters[1].topics[1],
            Topic::OneOf(vec![abi::id_topic(U256::from(5)), abi::id_topic(U256::from(9))])
        );
    }

    #[tokio::test]
    async fn defect_chain_drops_address_and_post_filters() {
        let mut stray = created_log(90, 3);
        stray.address = foreign_address();
        let mut stray_update = updated_log(95, 5);
        stray_update.address = foreign_address();
        let rpc = FakeRpc::new(vec![stray, created_log(100, 5), stray_update, updated_log(150, 5)]);
        let ctx = context(250, rpc.clone());

        let logs = fetch_project_events(&ctx, account()).await.unwrap();

        assert!(rpc.filters().iter().all(|f| f.address.is_none()));
        assert_eq!(logs.ids, vec![U256::from(5)]);
        assert!(logs.created.iter().all(|l| l.address == ctx.registry));
        assert_eq!(logs.updated.len(), 1);
        assert_eq!(logs.updated[0].block_number, 150);
    }

    #[tokio::test]
    async fn wide_project_ids_are_kept() {
        let wide = U256::MAX - U256::from(1);
        let rpc = FakeRpc::new(vec![created_log_for(100, wide), updated_log_for(120, wide)]);
        let ctx = context(1, rpc);

        let logs = fetch_project_events(&ctx, account()).await.unwrap();

        assert_eq!(logs.ids, vec![wide]);
        assert_eq!(logs.updated.len(), 1);
    }

    #[tokio::test]
    async fn provider_errors_propagate() {
        let rpc = FakeRpc::failing();
        let ctx = context(1, rpc);

        assert!(fetch_project_events(&ctx, account()).await.is_err());
    }
}
