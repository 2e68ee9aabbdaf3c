use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use domain::HistoryEntry;
use tokio::sync::RwLock;

/// Capacity-bounded FIFO of aggregate cycle samples used for charting.
/// Lossy by design; the snapshot table is the durable record.
pub struct HistoryBuffer {
    capacity: usize,
    entries: RwLock<VecDeque<HistoryEntry>>,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// O(1) amortized; evicts the oldest entry once full.
    pub async fn append(&self, entry: HistoryEntry) {
        let mut entries = self.entries.write().await;
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Entries with `timestamp >= since`, ascending. Entries are appended in
    /// commit order, so the buffer is already timestamp-sorted.
    pub async fn query(&self, since: DateTime<Utc>) -> Vec<HistoryEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|entry| entry.timestamp >= since)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{Duration, Utc};

    use super::*;

    fn entry(offset_secs: i64, total: f64) -> HistoryEntry {
        HistoryEntry {
            timestamp: Utc::now() + Duration::seconds(offset_secs),
            total,
            per_wallet: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn evicts_oldest_once_full() {
        let buffer = HistoryBuffer::new(3);
        for i in 0..4 {
            buffer.append(entry(i, i as f64)).await;
        }

        assert_eq!(buffer.len().await, 3);
        let entries = buffer.query(DateTime::<Utc>::UNIX_EPOCH).await;
        let totals: Vec<_> = entries.iter().map(|e| e.total).collect();
        // 0.0 was the earliest append and must be gone.
        assert_eq!(totals, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn query_filters_by_timestamp_ascending() {
        let buffer = HistoryBuffer::new(10);
        let cutoff = Utc::now() + Duration::seconds(2);
        for i in 0..5 {
            buffer.append(entry(i, i as f64)).await;
        }

        let recent = buffer.query(cutoff).await;
        assert_eq!(recent.len(), 3);
        assert!(recent.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(recent.iter().all(|e| e.timestamp >= cutoff));
    }

    #[tokio::test]
    async fn zero_capacity_is_clamped_to_one() {
        let buffer = HistoryBuffer::new(0);
        buffer.append(entry(0, 1.0)).await;
        buffer.append(entry(1, 2.0)).await;
        assert_eq!(buffer.len().await, 1);
    }
}
