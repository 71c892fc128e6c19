use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::contract::ContractGateway;
use crate::models::view::WalletView;
use crate::state::AppState;
use crate::wallet::WalletProvider;

use super::HttpError;

pub fn router<P: WalletProvider, G: ContractGateway>() -> Router<AppState<P, G>> {
    Router::new()
        .route("/wallet", get(get_wallet::<P, G>))
        .route("/wallet/connect", post(connect_wallet::<P, G>))
}

async fn get_wallet<P: WalletProvider, G: ContractGateway>(
    State(state): State<AppState<P, G>>,
) -> Json<WalletView> {
    Json(WalletView::new(state.wallet.account(), state.wallet.network()))
}

async fn connect_wallet<P: WalletProvider, G: ContractGateway>(
    State(state): State<AppState<P, G>>,
) -> Result<Json<WalletView>, HttpError> {
    let account = state.wallet.connect().await?;
    Ok(Json(WalletView::new(Some(account), state.wallet.network())))
}
