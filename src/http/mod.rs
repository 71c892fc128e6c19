use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::actions::ActionError;
use crate::composer::ComposeError;
use crate::contract::ContractGateway;
use crate::error::{ChainError, ConnectionError, FetchError};
use crate::state::AppState;
use crate::wallet::WalletProvider;

mod proposals;
mod wallet;

pub fn router<P: WalletProvider, G: ContractGateway>(state: AppState<P, G>) -> Router {
    // The page is served from elsewhere and calls in with fetch().
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_live::<P, G>))
        .merge(wallet::router::<P, G>())
        .merge(proposals::router::<P, G>())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_live<P: WalletProvider, G: ContractGateway>(
    State(state): State<AppState<P, G>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "live",
        uptime_seconds: state.start_time.elapsed().as_secs(),
        wallet_connected: state.wallet.account().is_some(),
        proposals_loaded: state.reconciler.snapshot().is_some(),
    })
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
    wallet_connected: bool,
    proposals_loaded: bool,
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: String) -> Self {
        assert!(status != StatusCode::OK, "Error status cannot be 200");
        assert!(!message.is_empty(), "Error message cannot be empty");
        Self { status, message }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        info!(status = %self.status, "HTTP error: {}", self.message);
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn chain_status(err: &ChainError) -> StatusCode {
    match err {
        ChainError::WrongNetwork { .. } => StatusCode::CONFLICT,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl From<ConnectionError> for HttpError {
    fn from(err: ConnectionError) -> Self {
        let status = match err {
            ConnectionError::Rejected | ConnectionError::NoAccounts => StatusCode::UNAUTHORIZED,
            ConnectionError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ConnectionError::MalformedAccount(_) => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err.to_string())
    }
}

impl From<FetchError> for HttpError {
    fn from(err: FetchError) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, err.to_string())
    }
}

impl From<ComposeError> for HttpError {
    fn from(err: ComposeError) -> Self {
        let status = match &err {
            ComposeError::NotConnected => StatusCode::UNAUTHORIZED,
            ComposeError::Chain(chain) => chain_status(chain),
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, err.to_string())
    }
}

impl From<ActionError> for HttpError {
    fn from(err: ActionError) -> Self {
        let status = match &err {
            ActionError::NotConnected => StatusCode::UNAUTHORIZED,
            ActionError::InFlight(_)
            | ActionError::VotingUnavailable { .. }
            | ActionError::AlreadyVoted(_)
            | ActionError::NotExpired { .. } => StatusCode::CONFLICT,
            ActionError::Precheck { source, .. } => chain_status(source),
            ActionError::Chain(chain) => chain_status(chain),
        };
        Self::new(status, err.to_string())
    }
}
