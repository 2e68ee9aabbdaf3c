use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// Failure modes of a single oracle call. Every transport problem is mapped
/// into one of these; oracles never panic and never surface raw client
/// errors to the caller.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch timed out")]
    Timeout,
    #[error("upstream unreachable: {0}")]
    Unreachable(String),
    #[error("malformed upstream response: {0}")]
    BadResponse(String),
}

/// Source of a wallet's on-chain USDC balance, keyed by proxy address.
#[async_trait]
pub trait BalanceOracle: Send + Sync {
    async fn usdc_balance(&self, proxy_address: &str) -> Result<f64, FetchError>;
}

/// Source of the combined USD value of a wallet's open positions.
#[async_trait]
pub trait PositionsOracle: Send + Sync {
    async fn positions_value(&self, proxy_address: &str) -> Result<f64, FetchError>;
}

/// Fixed-value balance source for tests and offline wiring.
#[derive(Clone, Default)]
pub struct StaticBalanceOracle {
    balances: HashMap<String, f64>,
}

impl StaticBalanceOracle {
    pub fn new(balances: HashMap<String, f64>) -> Self {
        Self { balances }
    }
}

#[async_trait]
impl BalanceOracle for StaticBalanceOracle {
    async fn usdc_balance(&self, proxy_address: &str) -> Result<f64, FetchError> {
        Ok(self.balances.get(proxy_address).copied().unwrap_or(0.0))
    }
}

/// Fixed-value positions source for tests and offline wiring.
#[derive(Clone, Default)]
pub struct StaticPositionsOracle {
    values: HashMap<String, f64>,
}

impl StaticPositionsOracle {
    pub fn new(values: HashMap<String, f64>) -> Self {
        Self { values }
    }
}

#[async_trait]
impl PositionsOracle for StaticPositionsOracle {
    async fn positions_value(&self, proxy_address: &str) -> Result<f64, FetchError> {
        Ok(self.values.get(proxy_address).copied().unwrap_or(0.0))
    }
}
