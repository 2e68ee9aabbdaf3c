use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use domain::{BalanceSample, HistoryEntry, RefreshOutcome, SnapshotRow, WalletConfig};
use metrics::counter;
use oracles::{BalanceOracle, FetchError, PositionsOracle};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::registry::WalletRegistry;
use crate::repositories::SnapshotRepository;
use crate::services::{cache::PortfolioCache, history::HistoryBuffer};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("a refresh cycle is already in flight")]
    AlreadyRefreshing,
}

/// Runs one fan-out/merge/commit cycle across every enabled wallet. The
/// scheduler and the refresh endpoint share this single entry point;
/// `in_flight` keeps cycles serialized, and a caller that collides with a
/// running cycle is rejected, never queued.
pub struct RefreshCoordinator {
    registry: Arc<WalletRegistry>,
    balances: Arc<dyn BalanceOracle>,
    positions: Arc<dyn PositionsOracle>,
    cache: Arc<PortfolioCache>,
    history: Arc<HistoryBuffer>,
    snapshots: Arc<dyn SnapshotRepository>,
    fetch_timeout: Duration,
    in_flight: Mutex<()>,
}

struct WalletFetch {
    wallet: WalletConfig,
    balance: Result<f64, FetchError>,
    positions: Result<f64, FetchError>,
}

impl RefreshCoordinator {
    pub fn new(
        registry: Arc<WalletRegistry>,
        balances: Arc<dyn BalanceOracle>,
        positions: Arc<dyn PositionsOracle>,
        cache: Arc<PortfolioCache>,
        history: Arc<HistoryBuffer>,
        snapshots: Arc<dyn SnapshotRepository>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            balances,
            positions,
            cache,
            history,
            snapshots,
            fetch_timeout,
            in_flight: Mutex::new(()),
        }
    }

    pub fn spawn_scheduler(self: Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            loop {
                match self.refresh().await {
                    Ok(outcome) => info!(
                        succeeded = outcome.succeeded,
                        failed = outcome.failed,
                        persistence_failures = outcome.persistence_failures,
                        "scheduled refresh finished"
                    ),
                    Err(RefreshError::AlreadyRefreshing) => {
                        debug!("scheduled refresh skipped, cycle already in flight")
                    }
                }
                sleep(interval).await;
            }
        });
    }

    pub async fn refresh(&self) -> Result<RefreshOutcome, RefreshError> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| RefreshError::AlreadyRefreshing)?;
        counter!("portfolio_refresh_cycles_total").increment(1);

        let fetches = self.fan_out().await;
        let observed_at = Utc::now();

        let mut samples = Vec::with_capacity(fetches.len());
        let mut failed = 0usize;
        for fetch in fetches {
            if let Err(err) = &fetch.balance {
                counter!("portfolio_fetch_failures_total", "leg" => "balance").increment(1);
                warn!(wallet_id = %fetch.wallet.id, error = %err, "usdc balance fetch failed");
            }
            if let Err(err) = &fetch.positions {
                counter!("portfolio_fetch_failures_total", "leg" => "positions").increment(1);
                warn!(wallet_id = %fetch.wallet.id, error = %err, "positions value fetch failed");
            }

            let previous = self.cache.get(&fetch.wallet.id).await;
            match merge_sample(&fetch, previous.as_ref(), observed_at) {
                Some(sample) => samples.push(sample),
                None => {
                    warn!(
                        wallet_id = %fetch.wallet.id,
                        "wallet excluded from cycle, no fresh leg and no cached fallback"
                    );
                    failed += 1;
                }
            }
        }

        let succeeded = samples.len();
        let persistence_failures = self.commit(observed_at, samples).await;

        Ok(RefreshOutcome {
            succeeded,
            failed,
            persistence_failures,
            timestamp: observed_at,
        })
    }

    /// Two oracle calls per wallet, all wallets in parallel. Each call
    /// carries its own timeout, so one stuck upstream delays nothing else.
    async fn fan_out(&self) -> Vec<WalletFetch> {
        let wallets: Vec<WalletConfig> = self.registry.enabled().cloned().collect();
        let mut handles = Vec::with_capacity(wallets.len());

        for wallet in wallets {
            let balances = self.balances.clone();
            let positions = self.positions.clone();
            let fetch_timeout = self.fetch_timeout;
            handles.push(tokio::spawn(async move {
                let (balance, positions_value) = tokio::join!(
                    bounded(fetch_timeout, balances.usdc_balance(&wallet.proxy_address)),
                    bounded(fetch_timeout, positions.positions_value(&wallet.proxy_address)),
                );
                WalletFetch {
                    wallet,
                    balance,
                    positions: positions_value,
                }
            }));
        }

        let mut fetches = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(fetch) => fetches.push(fetch),
                Err(join_err) => warn!(error = %join_err, "wallet fetch task failed to join"),
            }
        }
        fetches
    }

    /// Cache and history first, snapshot rows after; a persistence problem
    /// degrades durability, never freshness. Returns the failed row count.
    async fn commit(&self, observed_at: DateTime<Utc>, samples: Vec<BalanceSample>) -> usize {
        if samples.is_empty() {
            return 0;
        }

        let per_wallet: HashMap<String, f64> = samples
            .iter()
            .map(|sample| (sample.wallet_id.clone(), sample.portfolio_total))
            .collect();
        let total = samples.iter().map(|sample| sample.portfolio_total).sum();
        let rows: Vec<SnapshotRow> = samples
            .iter()
            .map(|sample| SnapshotRow {
                id: Uuid::new_v4(),
                timestamp: observed_at,
                proxy_address: sample.proxy_address.clone(),
                usdc_balance: sample.usdc_balance,
                positions_value: sample.positions_value,
                portfolio_total: sample.portfolio_total,
            })
            .collect();

        self.cache.commit(observed_at, samples).await;
        self.history
            .append(HistoryEntry {
                timestamp: observed_at,
                total,
                per_wallet,
            })
            .await;

        let failed_rows = match self.snapshots.insert_rows(&rows).await {
            Ok(failed_rows) => failed_rows,
            Err(err) => {
                warn!(error = %err, "snapshot store unavailable for this cycle");
                rows.len()
            }
        };
        if failed_rows > 0 {
            counter!("portfolio_snapshot_write_failures_total").increment(failed_rows as u64);
            warn!(failed_rows, "some snapshot rows were not persisted");
        }
        failed_rows
    }
}

async fn bounded<F>(limit: Duration, fut: F) -> Result<f64, FetchError>
where
    F: Future<Output = Result<f64, FetchError>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout),
    }
}

/// Per-wallet merge: a failed leg borrows the previous cached value and
/// flags the sample stale; a wallet with nothing to borrow from produces no
/// sample at all (absent, not zero).
fn merge_sample(
    fetch: &WalletFetch,
    previous: Option<&BalanceSample>,
    observed_at: DateTime<Utc>,
) -> Option<BalanceSample> {
    let usdc_balance = match &fetch.balance {
        Ok(value) => Some(*value),
        Err(_) => previous.map(|sample| sample.usdc_balance),
    };
    let positions_value = match &fetch.positions {
        Ok(value) => Some(*value),
        Err(_) => previous.map(|sample| sample.positions_value),
    };
    let stale = fetch.balance.is_err() || fetch.positions.is_err();

    match (usdc_balance, positions_value) {
        (Some(usdc_balance), Some(positions_value)) => Some(BalanceSample::new(
            fetch.wallet.id.clone(),
            fetch.wallet.proxy_address.clone(),
            usdc_balance,
            positions_value,
            stale,
            observed_at,
        )),
        _ => None,
    }
}
