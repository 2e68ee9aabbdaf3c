use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One entry of the wallet registry file. Loaded once at startup, never
/// mutated afterwards; `id` is the identity key.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WalletConfig {
    pub id: String,
    pub name: String,
    pub proxy_address: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

/// Latest combined value of one wallet: the on-chain USDC balance plus the
/// value of open positions. `stale` marks samples where one leg could not be
/// fetched this cycle and was carried over from the previous entry.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BalanceSample {
    pub wallet_id: String,
    pub proxy_address: String,
    pub usdc_balance: f64,
    pub positions_value: f64,
    pub portfolio_total: f64,
    pub stale: bool,
    pub observed_at: DateTime<Utc>,
}

impl BalanceSample {
    /// `portfolio_total` is always derived from the two legs, never stored
    /// independently.
    pub fn new(
        wallet_id: String,
        proxy_address: String,
        usdc_balance: f64,
        positions_value: f64,
        stale: bool,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            wallet_id,
            proxy_address,
            usdc_balance,
            positions_value,
            portfolio_total: usdc_balance + positions_value,
            stale,
            observed_at,
        }
    }
}

/// One charting point: the aggregate total of a refresh cycle plus the
/// per-wallet totals that produced it. Held in a bounded in-memory buffer;
/// the snapshot table is the durable record.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub total: f64,
    pub per_wallet: HashMap<String, f64>,
}

/// Persisted row of the append-only snapshot log, one per wallet per
/// committed refresh cycle.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SnapshotRow {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub proxy_address: String,
    pub usdc_balance: f64,
    pub positions_value: f64,
    pub portfolio_total: f64,
}

/// Result of one refresh cycle. `failed` counts wallets that produced no
/// sample at all; stale samples count as succeeded. `persistence_failures`
/// counts snapshot rows that could not be written (non-fatal).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RefreshOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub persistence_failures: usize,
    pub timestamp: DateTime<Utc>,
}

/// Response body of the cached-portfolio endpoint. Built from the in-memory
/// cache only; serving it never triggers network calls.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CachedPortfolio {
    pub wallets: Vec<BalanceSample>,
    pub total_portfolio: f64,
    pub total_usdc: f64,
    pub total_positions: f64,
    pub last_refresh_time: Option<DateTime<Utc>>,
}
