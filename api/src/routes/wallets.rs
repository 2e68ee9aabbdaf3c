use axum::{Json, Router, extract::State, routing::get};
use domain::WalletConfig;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/wallets", get(list_wallets))
}

async fn list_wallets(State(state): State<AppState>) -> Json<Vec<WalletConfig>> {
    Json(state.registry.all().to_vec())
}
