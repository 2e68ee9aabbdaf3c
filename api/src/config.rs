use std::{env, time::Duration};

use anyhow::{Context, Result};

// Polymarket proxy wallets hold USDC on Polygon; these are the production
// defaults and can be overridden per environment.
const DEFAULT_RPC_URL: &str = "https://polygon-rpc.com";
const DEFAULT_USDC_ADDRESS: &str = "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174";
const DEFAULT_DATA_API_BASE: &str = "https://data-api.polymarket.com";

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub rpc_url: String,
    pub usdc_address: String,
    pub data_api_base: String,
    pub wallets_file: String,
    pub frontend_origins: Vec<String>,
    pub refresh_interval: Duration,
    pub fetch_timeout: Duration,
    pub history_capacity: usize,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let refresh_interval = parse_duration_seconds("REFRESH_INTERVAL_SECS", 600);
        let fetch_timeout = parse_duration_seconds("FETCH_TIMEOUT_SECS", 10);
        let history_capacity = parse_usize("HISTORY_CAPACITY", 500);
        let frontend_origins = parse_origins();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set for API server")?,
            rpc_url: env::var("RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.to_string()),
            usdc_address: env::var("USDC_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_USDC_ADDRESS.to_string()),
            data_api_base: env::var("DATA_API_BASE")
                .unwrap_or_else(|_| DEFAULT_DATA_API_BASE.to_string()),
            wallets_file: env::var("WALLETS_FILE").unwrap_or_else(|_| "wallets.json".to_string()),
            frontend_origins,
            refresh_interval,
            fetch_timeout,
            history_capacity,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8405".to_string())
                .parse()
                .context("PORT must be a valid u16")?,
        })
    }
}

fn parse_origins() -> Vec<String> {
    if let Ok(list) = env::var("FRONTEND_ORIGINS") {
        split_origins(&list)
    } else if let Ok(origin) = env::var("FRONTEND_ORIGIN") {
        split_origins(&origin)
    } else {
        vec!["http://localhost:3000".to_string()]
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|item| {
            let trimmed = item.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

fn parse_duration_seconds(key: &str, default: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default))
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
