use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use domain::{BalanceSample, HistoryEntry, WalletConfig};
use ethers::providers::{Http, Provider};
use ethers::types::Address;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    registry::WalletRegistry,
    repositories::{PostgresSnapshotRepository, SnapshotRepository},
    services::{
        DataApiPositionsOracle, Erc20BalanceOracle, HistoryBuffer, PortfolioCache,
        RefreshCoordinator,
    },
    state::AppState,
};

// Only rows this recent are replayed into the history buffer on boot.
const WARM_HISTORY_WINDOW_DAYS: i64 = 7;

pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    let pool = PgPool::connect(&config.database_url).await?;
    sqlx::migrate!("../migrations").run(&pool).await?;

    let registry = Arc::new(WalletRegistry::load(&config.wallets_file)?);
    info!(
        wallet_count = registry.all().len(),
        enabled = registry.enabled().count(),
        "wallet registry loaded"
    );

    let provider = Provider::<Http>::try_from(config.rpc_url.as_str())?
        .interval(Duration::from_millis(500));
    let usdc: Address = config
        .usdc_address
        .parse()
        .context("USDC_ADDRESS is not a valid address")?;

    let balance_oracle = Arc::new(Erc20BalanceOracle::new(Arc::new(provider), usdc));
    let positions_oracle = Arc::new(DataApiPositionsOracle::new(
        config.data_api_base.clone(),
        config.fetch_timeout,
    )?);

    let cache = Arc::new(PortfolioCache::new());
    let history = Arc::new(HistoryBuffer::new(config.history_capacity));
    let snapshot_repo: Arc<dyn SnapshotRepository> =
        Arc::new(PostgresSnapshotRepository::new(pool.clone()));

    // 記憶體快取掉了就從最新快照補回來；失敗不致命，冷啟動即可。
    if let Err(err) = warm_from_snapshots(&registry, &cache, &history, snapshot_repo.as_ref()).await
    {
        warn!(error = %err, "cache warm-up from snapshots failed, starting cold");
    }

    let coordinator = Arc::new(RefreshCoordinator::new(
        registry.clone(),
        balance_oracle,
        positions_oracle,
        cache.clone(),
        history.clone(),
        snapshot_repo.clone(),
        config.fetch_timeout,
    ));
    coordinator.clone().spawn_scheduler(config.refresh_interval);

    Ok(AppState {
        config: config.clone(),
        registry,
        cache,
        history,
        snapshot_repo,
        coordinator,
    })
}

/// Rebuilds the in-memory views from the durable log: the newest row per
/// address seeds the cache (flagged stale, nothing was fetched by this
/// process yet) and recent rows grouped by cycle timestamp seed the history
/// buffer.
async fn warm_from_snapshots(
    registry: &WalletRegistry,
    cache: &PortfolioCache,
    history: &HistoryBuffer,
    snapshots: &dyn SnapshotRepository,
) -> Result<()> {
    let by_address: HashMap<&str, &WalletConfig> = registry
        .all()
        .iter()
        .map(|wallet| (wallet.proxy_address.as_str(), wallet))
        .collect();

    let latest = snapshots.latest_per_address().await?;
    let mut samples = Vec::with_capacity(latest.len());
    let mut refreshed_at: Option<DateTime<Utc>> = None;
    for row in &latest {
        let Some(wallet) = by_address.get(row.proxy_address.as_str()) else {
            continue;
        };
        samples.push(BalanceSample::new(
            wallet.id.clone(),
            row.proxy_address.clone(),
            row.usdc_balance,
            row.positions_value,
            true,
            row.timestamp,
        ));
        refreshed_at = refreshed_at.max(Some(row.timestamp));
    }

    let warmed = samples.len();
    if let Some(refreshed_at) = refreshed_at {
        cache.commit(refreshed_at, samples).await;
    }

    let since = Utc::now() - chrono::Duration::days(WARM_HISTORY_WINDOW_DAYS);
    let rows = snapshots.query_range(None, since, Utc::now()).await?;
    let mut grouped: BTreeMap<DateTime<Utc>, HashMap<String, f64>> = BTreeMap::new();
    for row in rows {
        let Some(wallet) = by_address.get(row.proxy_address.as_str()) else {
            continue;
        };
        grouped
            .entry(row.timestamp)
            .or_default()
            .insert(wallet.id.clone(), row.portfolio_total);
    }
    let cycles = grouped.len();
    for (timestamp, per_wallet) in grouped {
        let total = per_wallet.values().sum();
        history
            .append(HistoryEntry {
                timestamp,
                total,
                per_wallet,
            })
            .await;
    }

    if warmed > 0 || cycles > 0 {
        info!(warmed, cycles, "warmed in-memory views from snapshot log");
    }
    Ok(())
}
