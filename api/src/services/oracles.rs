use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use ethers::utils::format_units;
use oracles::{BalanceOracle, FetchError, PositionsOracle};
use reqwest::Client;

// USDC 有 6 位小數
const USDC_DECIMALS: i32 = 6;

/// USDC balance read straight from the token contract on Polygon.
pub struct Erc20BalanceOracle {
    provider: Arc<Provider<Http>>,
    token: Address,
}

impl Erc20BalanceOracle {
    pub fn new(provider: Arc<Provider<Http>>, token: Address) -> Self {
        Self { provider, token }
    }
}

#[async_trait]
impl BalanceOracle for Erc20BalanceOracle {
    async fn usdc_balance(&self, proxy_address: &str) -> Result<f64, FetchError> {
        let owner: Address = proxy_address.parse().map_err(|_| {
            FetchError::BadResponse(format!("invalid proxy address {proxy_address}"))
        })?;

        // balanceOf(address) via raw eth_call: 4-byte selector plus the
        // owner left-padded to 32 bytes.
        let selector = &ethers::utils::keccak256("balanceOf(address)")[..4];
        let mut data = Vec::from(selector);
        data.extend_from_slice(&[0u8; 12]);
        data.extend_from_slice(owner.as_bytes());

        let tx = ethers::types::transaction::eip2718::TypedTransaction::Legacy(
            TransactionRequest {
                to: Some(self.token.into()),
                data: Some(Bytes::from(data)),
                ..Default::default()
            },
        );

        let raw = self
            .provider
            .call(&tx, None)
            .await
            .map_err(|err| FetchError::Unreachable(err.to_string()))?;

        let balance = U256::from_big_endian(&raw);
        format_units(balance, USDC_DECIMALS)
            .map_err(|err| FetchError::BadResponse(err.to_string()))?
            .parse::<f64>()
            .map_err(|err| FetchError::BadResponse(err.to_string()))
    }
}

/// Open-positions value from the Polymarket data API.
pub struct DataApiPositionsOracle {
    client: Client,
    api_base: String,
}

impl DataApiPositionsOracle {
    pub fn new(api_base: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build data api client")?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PositionsOracle for DataApiPositionsOracle {
    async fn positions_value(&self, proxy_address: &str) -> Result<f64, FetchError> {
        let url = format!("{}/value", self.api_base);
        let resp = self
            .client
            .get(&url)
            .query(&[("user", proxy_address)])
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Unreachable(err.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::BadResponse(format!(
                "data api returned status {status}"
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|err| FetchError::BadResponse(err.to_string()))?;

        parse_value_payload(&body).ok_or_else(|| {
            FetchError::BadResponse("payload carries no numeric value field".to_string())
        })
    }
}

/// The data API answers with either a list of objects or a single object;
/// both shapes are collapsed here so callers only ever see one number.
fn parse_value_payload(body: &serde_json::Value) -> Option<f64> {
    match body {
        serde_json::Value::Array(items) => items
            .iter()
            .find_map(|item| item.get("value").and_then(|v| v.as_f64())),
        _ => body.get("value").and_then(|v| v.as_f64()),
    }
}
