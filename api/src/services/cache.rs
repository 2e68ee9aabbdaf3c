use std::collections::HashMap;

use chrono::{DateTime, Utc};
use domain::{BalanceSample, CachedPortfolio};
use tokio::sync::RwLock;

#[derive(Default)]
struct CacheInner {
    samples: HashMap<String, BalanceSample>,
    last_refresh: Option<DateTime<Utc>>,
}

/// Most recently committed sample per wallet. Single writer (the refresh
/// coordinator), many readers; a commit replaces its entries under one write
/// guard so readers never observe a half-applied cycle.
#[derive(Default)]
pub struct PortfolioCache {
    inner: RwLock<CacheInner>,
}

impl PortfolioCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, wallet_id: &str) -> Option<BalanceSample> {
        self.inner.read().await.samples.get(wallet_id).cloned()
    }

    pub async fn get_all(&self) -> Vec<BalanceSample> {
        let inner = self.inner.read().await;
        sorted_samples(&inner.samples)
    }

    pub async fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.last_refresh
    }

    /// Publish one cycle's samples and its timestamp atomically.
    pub async fn commit(&self, refreshed_at: DateTime<Utc>, samples: Vec<BalanceSample>) {
        let mut inner = self.inner.write().await;
        for sample in samples {
            inner.samples.insert(sample.wallet_id.clone(), sample);
        }
        inner.last_refresh = Some(refreshed_at);
    }

    /// Aggregate view for the cached endpoint, read under a single guard so
    /// the totals always match the listed wallets.
    pub async fn snapshot(&self) -> CachedPortfolio {
        let inner = self.inner.read().await;
        let wallets = sorted_samples(&inner.samples);
        CachedPortfolio {
            total_portfolio: wallets.iter().map(|s| s.portfolio_total).sum(),
            total_usdc: wallets.iter().map(|s| s.usdc_balance).sum(),
            total_positions: wallets.iter().map(|s| s.positions_value).sum(),
            last_refresh_time: inner.last_refresh,
            wallets,
        }
    }
}

fn sorted_samples(samples: &HashMap<String, BalanceSample>) -> Vec<BalanceSample> {
    let mut samples: Vec<_> = samples.values().cloned().collect();
    samples.sort_by(|a, b| a.wallet_id.cmp(&b.wallet_id));
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(wallet_id: &str, usdc: f64, positions: f64) -> BalanceSample {
        BalanceSample::new(
            wallet_id.to_string(),
            format!("0x{wallet_id}"),
            usdc,
            positions,
            false,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn starts_empty() {
        let cache = PortfolioCache::new();
        let view = cache.snapshot().await;
        assert!(view.wallets.is_empty());
        assert_eq!(view.total_portfolio, 0.0);
        assert!(view.last_refresh_time.is_none());
    }

    #[tokio::test]
    async fn commit_overwrites_in_place_and_keeps_totals_consistent() {
        let cache = PortfolioCache::new();
        let first = Utc::now();
        cache
            .commit(first, vec![sample("w1", 100.0, 50.0), sample("w2", 10.0, 20.0)])
            .await;

        let later = Utc::now();
        cache.commit(later, vec![sample("w1", 80.0, 60.0)]).await;

        let view = cache.snapshot().await;
        assert_eq!(view.wallets.len(), 2);
        assert_eq!(view.last_refresh_time, Some(later));
        assert_eq!(view.total_usdc, 90.0);
        assert_eq!(view.total_positions, 80.0);
        assert_eq!(view.total_portfolio, 170.0);
        for wallet in &view.wallets {
            assert!(
                (wallet.portfolio_total - (wallet.usdc_balance + wallet.positions_value)).abs()
                    < 1e-9
            );
        }
    }

    #[tokio::test]
    async fn get_all_is_sorted_by_wallet_id() {
        let cache = PortfolioCache::new();
        cache
            .commit(Utc::now(), vec![sample("w2", 1.0, 0.0), sample("w1", 2.0, 0.0)])
            .await;

        let ids: Vec<_> = cache
            .get_all()
            .await
            .into_iter()
            .map(|s| s.wallet_id)
            .collect();
        assert_eq!(ids, vec!["w1", "w2"]);
    }
}
