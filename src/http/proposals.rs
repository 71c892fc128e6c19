use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::composer::ProposalDraft;
use crate::contract::{ContractGateway, TxReceipt};
use crate::models::proposal::ProposalId;
use crate::models::view::ProposalListView;
use crate::state::AppState;
use crate::wallet::WalletProvider;

use super::HttpError;

pub fn router<P: WalletProvider, G: ContractGateway>() -> Router<AppState<P, G>> {
    Router::new()
        .route(
            "/proposals",
            get(list_proposals::<P, G>).post(create_proposal::<P, G>),
        )
        .route("/proposals/refresh", post(refresh_proposals::<P, G>))
        .route("/proposals/{id}/vote", post(vote::<P, G>))
        .route("/proposals/{id}/close", post(close_proposal::<P, G>))
}

#[derive(Debug, Deserialize)]
struct VoteRequest {
    support: bool,
}

fn render<P: WalletProvider, G: ContractGateway>(state: &AppState<P, G>) -> ProposalListView {
    let snapshot = state.reconciler.snapshot();
    ProposalListView::render(
        snapshot.as_deref(),
        state.reconciler.last_error().map(|err| err.to_string()),
        state.wallet.account().is_some(),
        &state.actions.states(),
        Utc::now(),
    )
}

async fn list_proposals<P: WalletProvider, G: ContractGateway>(
    State(state): State<AppState<P, G>>,
) -> Json<ProposalListView> {
    Json(render(&state))
}

async fn refresh_proposals<P: WalletProvider, G: ContractGateway>(
    State(state): State<AppState<P, G>>,
) -> Result<Json<ProposalListView>, HttpError> {
    state.reconciler.refresh(state.wallet.account()).await?;
    Ok(Json(render(&state)))
}

async fn create_proposal<P: WalletProvider, G: ContractGateway>(
    State(state): State<AppState<P, G>>,
    Json(mut draft): Json<ProposalDraft>,
) -> Result<(StatusCode, Json<TxReceipt>), HttpError> {
    let receipt = state
        .composer
        .submit(&mut draft, state.wallet.account())
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn vote<P: WalletProvider, G: ContractGateway>(
    State(state): State<AppState<P, G>>,
    Path(id): Path<ProposalId>,
    Json(request): Json<VoteRequest>,
) -> Result<Json<TxReceipt>, HttpError> {
    let receipt = state
        .actions
        .vote(id, request.support, state.wallet.account())
        .await?;
    Ok(Json(receipt))
}

async fn close_proposal<P: WalletProvider, G: ContractGateway>(
    State(state): State<AppState<P, G>>,
    Path(id): Path<ProposalId>,
) -> Result<Json<TxReceipt>, HttpError> {
    let receipt = state
        .actions
        .close_proposal(id, state.wallet.account())
        .await?;
    Ok(Json(receipt))
}
