use std::sync::Arc;

use crate::{
    config::AppConfig,
    registry::WalletRegistry,
    repositories::SnapshotRepository,
    services::{HistoryBuffer, PortfolioCache, RefreshCoordinator},
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub registry: Arc<WalletRegistry>,
    pub cache: Arc<PortfolioCache>,
    pub history: Arc<HistoryBuffer>,
    pub snapshot_repo: Arc<dyn SnapshotRepository>,
    pub coordinator: Arc<RefreshCoordinator>,
}

// Ensure critical dependencies uphold Send/Sync for Axum state usage.
#[allow(dead_code)]
fn _assert_state_types_are_send_sync()
where
    AppConfig: Send + Sync + 'static,
    WalletRegistry: Send + Sync + 'static,
    PortfolioCache: Send + Sync + 'static,
    HistoryBuffer: Send + Sync + 'static,
    dyn SnapshotRepository: Send + Sync,
    RefreshCoordinator: Send + Sync + 'static,
{
}

#[allow(dead_code)]
fn _assert_state_bounds() {
    fn assert_bounds<T: Clone + Send + Sync + 'static>() {}
    assert_bounds::<AppState>();
}
