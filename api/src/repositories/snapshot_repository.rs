use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::SnapshotRow;
use sqlx::{PgPool, Row};
use tracing::warn;

/// Append-only log of committed per-wallet samples. Rows are never updated
/// or deleted here; retention is an external concern.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Inserts each row independently so one bad row never blocks the rest.
    /// Returns the number of rows that could not be written.
    async fn insert_rows(&self, rows: &[SnapshotRow]) -> Result<usize>;

    /// Rows in `[from, to]`, ascending by timestamp, optionally narrowed to
    /// one proxy address.
    async fn query_range(
        &self,
        proxy_address: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SnapshotRow>>;

    /// Newest row per proxy address, used to warm the cache at startup.
    async fn latest_per_address(&self) -> Result<Vec<SnapshotRow>>;
}

#[derive(Clone)]
pub struct PostgresSnapshotRepository {
    pool: PgPool,
}

impl PostgresSnapshotRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotRepository for PostgresSnapshotRepository {
    async fn insert_rows(&self, rows: &[SnapshotRow]) -> Result<usize> {
        let mut failed = 0usize;
        for row in rows {
            let result = sqlx::query(
                "INSERT INTO portfolio_snapshots
                     (id, snapshot_time, proxy_address, usdc_balance, positions_value, portfolio_total)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(row.id)
            .bind(row.timestamp)
            .bind(&row.proxy_address)
            .bind(row.usdc_balance)
            .bind(row.positions_value)
            .bind(row.portfolio_total)
            .execute(&self.pool)
            .await;

            if let Err(err) = result {
                warn!(error = %err, proxy_address = %row.proxy_address, "snapshot row insert failed");
                failed += 1;
            }
        }
        Ok(failed)
    }

    async fn query_range(
        &self,
        proxy_address: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SnapshotRow>> {
        let rows = if let Some(address) = proxy_address {
            sqlx::query(
                "SELECT id, snapshot_time, proxy_address, usdc_balance, positions_value, portfolio_total
                 FROM portfolio_snapshots
                 WHERE proxy_address = $1 AND snapshot_time >= $2 AND snapshot_time <= $3
                 ORDER BY snapshot_time ASC",
            )
            .bind(address)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT id, snapshot_time, proxy_address, usdc_balance, positions_value, portfolio_total
                 FROM portfolio_snapshots
                 WHERE snapshot_time >= $1 AND snapshot_time <= $2
                 ORDER BY snapshot_time ASC",
            )
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?
        };

        rows.into_iter().map(row_to_snapshot).collect()
    }

    async fn latest_per_address(&self) -> Result<Vec<SnapshotRow>> {
        let rows = sqlx::query(
            "SELECT DISTINCT ON (proxy_address)
                    id, snapshot_time, proxy_address, usdc_balance, positions_value, portfolio_total
             FROM portfolio_snapshots
             ORDER BY proxy_address, snapshot_time DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_snapshot).collect()
    }
}

fn row_to_snapshot(row: sqlx::postgres::PgRow) -> Result<SnapshotRow> {
    Ok(SnapshotRow {
        id: row.try_get("id")?,
        timestamp: row.try_get("snapshot_time")?,
        proxy_address: row.try_get("proxy_address")?,
        usdc_balance: row.try_get("usdc_balance")?,
        positions_value: row.try_get("positions_value")?,
        portfolio_total: row.try_get("portfolio_total")?,
    })
}

/// Vec-backed store with the same contract, for tests and offline wiring.
#[derive(Default)]
pub struct InMemorySnapshotRepository {
    rows: tokio::sync::RwLock<Vec<SnapshotRow>>,
}

#[async_trait]
impl SnapshotRepository for InMemorySnapshotRepository {
    async fn insert_rows(&self, rows: &[SnapshotRow]) -> Result<usize> {
        self.rows.write().await.extend_from_slice(rows);
        Ok(0)
    }

    async fn query_range(
        &self,
        proxy_address: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SnapshotRow>> {
        let rows = self.rows.read().await;
        let mut matched: Vec<SnapshotRow> = rows
            .iter()
            .filter(|row| row.timestamp >= from && row.timestamp <= to)
            .filter(|row| proxy_address.map_or(true, |address| row.proxy_address == address))
            .cloned()
            .collect();
        matched.sort_by_key(|row| row.timestamp);
        Ok(matched)
    }

    async fn latest_per_address(&self) -> Result<Vec<SnapshotRow>> {
        let rows = self.rows.read().await;
        let mut latest: std::collections::HashMap<String, SnapshotRow> =
            std::collections::HashMap::new();
        for row in rows.iter() {
            match latest.get(&row.proxy_address) {
                Some(existing) if existing.timestamp >= row.timestamp => {}
                _ => {
                    latest.insert(row.proxy_address.clone(), row.clone());
                }
            }
        }
        Ok(latest.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use uuid::Uuid;

    use super::*;

    fn row(proxy_address: &str, offset_secs: i64, total: f64) -> SnapshotRow {
        SnapshotRow {
            id: Uuid::new_v4(),
            timestamp: Utc::now() + Duration::seconds(offset_secs),
            proxy_address: proxy_address.to_string(),
            usdc_balance: total / 2.0,
            positions_value: total / 2.0,
            portfolio_total: total,
        }
    }

    #[tokio::test]
    async fn full_range_query_returns_every_row_in_timestamp_order() {
        let repo = InMemorySnapshotRepository::default();
        let rows = vec![row("0xaaa", 2, 10.0), row("0xbbb", 0, 20.0), row("0xaaa", 1, 30.0)];
        assert_eq!(repo.insert_rows(&rows).await.unwrap(), 0);

        let fetched = repo
            .query_range(None, DateTime::<Utc>::UNIX_EPOCH, Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(fetched.len(), 3);
        assert!(fetched.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn range_query_narrows_by_address_and_window() {
        let repo = InMemorySnapshotRepository::default();
        repo.insert_rows(&[row("0xaaa", 0, 10.0), row("0xaaa", 60, 20.0), row("0xbbb", 60, 5.0)])
            .await
            .unwrap();

        let from = Utc::now() + Duration::seconds(30);
        let fetched = repo
            .query_range(Some("0xaaa"), from, Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].portfolio_total, 20.0);
    }

    #[tokio::test]
    async fn latest_per_address_keeps_newest_row_only() {
        let repo = InMemorySnapshotRepository::default();
        repo.insert_rows(&[row("0xaaa", 0, 10.0), row("0xaaa", 60, 20.0), row("0xbbb", 0, 5.0)])
            .await
            .unwrap();

        let mut latest = repo.latest_per_address().await.unwrap();
        latest.sort_by(|a, b| a.proxy_address.cmp(&b.proxy_address));
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].portfolio_total, 20.0);
        assert_eq!(latest[1].portfolio_total, 5.0);
    }
}
