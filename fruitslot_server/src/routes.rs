use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use fruitslot_core::{
    BalanceStore, GameError, ProvablyFairRng, SessionState, StoreError, DEFAULT_BALANCE,
};
use fruitslot_shared::{
    AdminSetParamsRequest, ApiError, ErrorBody, PlayerView, ResetRequest, SpinRequest,
    SpinResponse, VerifyResponse,
};

use crate::db::{self, GameParams};

/// Players with a spin currently between draw and commit.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<Mutex<HashSet<String>>>);

impl InFlight {
    /// `None` when the player already has a spin in flight.
    pub fn try_acquire(&self, player: &str) -> Option<SpinGuard> {
        let mut set = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(player.to_string()) {
            return None;
        }
        Some(SpinGuard {
            set: self.0.clone(),
            player: player.to_string(),
        })
    }

    pub fn contains(&self, player: &str) -> bool {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(player)
    }
}

pub struct SpinGuard {
    set: Arc<Mutex<HashSet<String>>>,
    player: String,
}

impl Drop for SpinGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.player);
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BalanceStore>,
    pub params: Arc<RwLock<GameParams>>,
    /// Where admin parameter changes are persisted, if anywhere.
    pub params_db: Option<SqlitePool>,
    pub api_key: String,
    pub in_flight: InFlight,
}

impl AppState {
    pub fn new(store: Arc<dyn BalanceStore>, params: GameParams, api_key: impl Into<String>) -> Self {
        Self {
            store,
            params: Arc::new(RwLock::new(params)),
            params_db: None,
            api_key: api_key.into(),
            in_flight: InFlight::default(),
        }
    }

    pub fn with_params_db(mut self, pool: SqlitePool) -> Self {
        self.params_db = Some(pool);
        self
    }
}

/// HTTP face of [`ApiError`].
#[derive(Debug)]
pub struct HttpError(pub ApiError);

impl From<ApiError> for HttpError {
    fn from(e: ApiError) -> Self {
        Self(e)
    }
}

impl From<GameError> for HttpError {
    fn from(e: GameError) -> Self {
        Self(match e {
            GameError::InvalidWager => ApiError::Invalid(e.to_string()),
            GameError::InsufficientFunds { .. } => ApiError::InsufficientFunds,
            GameError::SpinInFlight => ApiError::SpinInProgress,
            GameError::Randomness(_) | GameError::BalanceOverflow => {
                error!(error = %e, "spin failed");
                ApiError::Internal
            }
        })
    }
}

impl From<StoreError> for HttpError {
    fn from(e: StoreError) -> Self {
        Self(match e {
            StoreError::NotFound(player) => ApiError::NotFound(player),
            StoreError::Conflict { .. } => ApiError::Conflict(e.to_string()),
            StoreError::Backend(msg) => {
                error!(error = %msg, "store failure");
                ApiError::Internal
            }
        })
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ApiError::Invalid(_) => StatusCode::BAD_REQUEST,
            ApiError::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
            ApiError::SpinInProgress | ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type HttpResult<T> = Result<T, HttpError>;

fn check_api_key(
    state: &AppState,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
) -> HttpResult<()> {
    match auth {
        Some(TypedHeader(Authorization(bearer))) if bearer.token() == state.api_key => Ok(()),
        _ => Err(ApiError::Unauthorized.into()),
    }
}

async fn route_verify(State(state): State<AppState>) -> Json<VerifyResponse> {
    let p = state.params.read().await;
    Json(VerifyResponse {
        server_seed_hash: p.server_seed_hash.clone(),
        wager_cost: p.engine.wager_cost,
        payouts: p.engine.payouts,
    })
}

async fn route_register(
    State(state): State<AppState>,
    Path(player): Path<String>,
) -> HttpResult<(StatusCode, Json<PlayerView>)> {
    let record = state.store.register(&player, DEFAULT_BALANCE).await?;
    Ok((StatusCode::CREATED, Json(PlayerView::new(player, &record))))
}

async fn route_load(
    State(state): State<AppState>,
    Path(player): Path<String>,
) -> HttpResult<Json<PlayerView>> {
    let record = state.store.load_or_init(&player).await?;
    Ok(Json(PlayerView::new(player, &record)))
}

async fn route_spin(
    State(state): State<AppState>,
    Path(player): Path<String>,
    req: Option<Json<SpinRequest>>,
) -> HttpResult<Json<SpinResponse>> {
    let Some(_guard) = state.in_flight.try_acquire(&player) else {
        warn!(player = %player, "concurrent spin rejected");
        return Err(ApiError::SpinInProgress.into());
    };

    let params = state.params.read().await.clone();
    let record = state.store.load_or_init(&player).await?;
    let client_seed = req
        .and_then(|Json(r)| r.client_seed)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| player.clone());

    let mut session = SessionState::from_record(&record);
    let nonce = record.next_nonce();
    let mut rng = ProvablyFairRng::new(&params.server_seed, &client_seed, nonce);
    let pending = session.begin_spin(&params.engine, &mut rng)?;

    // the same commit is re-sent on retry; the draw is never repeated
    let commit = pending.commit().with_client_seed(client_seed.clone());
    let stored = match state.store.commit(&player, &commit).await {
        Ok(stored) => stored,
        Err(StoreError::Backend(msg)) => {
            warn!(player = %player, nonce, error = %msg, "commit failed, retrying");
            match state.store.commit(&player, &commit).await {
                Ok(stored) => stored,
                Err(e) => {
                    session.rollback(pending);
                    return Err(e.into());
                }
            }
        }
        Err(e) => {
            session.rollback(pending);
            return Err(e.into());
        }
    };
    let result = session.settle(pending, &stored);

    info!(
        player = %player,
        nonce,
        tier = %result.win_tier,
        payout = result.payout,
        balance = stored.balance,
        "spin committed"
    );
    Ok(Json(SpinResponse::new(
        params.server_seed_hash,
        client_seed,
        nonce,
        &result,
        PlayerView::new(player, &stored),
    )))
}

async fn route_reset(
    State(state): State<AppState>,
    Path(player): Path<String>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    req: Option<Json<ResetRequest>>,
) -> HttpResult<Json<PlayerView>> {
    check_api_key(&state, auth)?;
    let amount = req
        .and_then(|Json(r)| r.amount)
        .unwrap_or(DEFAULT_BALANCE);
    let record = state.store.reset_balance(&player, amount).await?;
    Ok(Json(PlayerView::new(player, &record)))
}

async fn route_admin_set_params(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Json(req): Json<AdminSetParamsRequest>,
) -> HttpResult<StatusCode> {
    check_api_key(&state, auth)?;
    if req.wager_cost == 0 {
        return Err(ApiError::Invalid("wager_cost must be greater than zero".into()).into());
    }
    let mut p = state.params.write().await;
    let mut next = p.clone();
    next.engine.wager_cost = req.wager_cost;
    next.engine.payouts = req.payouts;
    if let Some(pool) = &state.params_db {
        db::set_params(pool, &next).await.map_err(|e| {
            error!(error = %e, "persisting params failed");
            HttpError(ApiError::Internal)
        })?;
    }
    info!(wager = next.engine.wager_cost, payouts = ?next.engine.payouts, "game params updated");
    *p = next;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/verify", get(route_verify))
        .route("/players/:id", get(route_load).post(route_register))
        .route("/players/:id/spin", post(route_spin))
        .route("/players/:id/reset", post(route_reset))
        .route("/admin/set-params", post(route_admin_set_params))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_releases_on_drop() {
        let in_flight = InFlight::default();
        let guard = in_flight.try_acquire("p").unwrap();
        assert!(in_flight.contains("p"));
        assert!(in_flight.try_acquire("p").is_none());
        assert!(in_flight.try_acquire("q").is_some());
        drop(guard);
        assert!(!in_flight.contains("p"));
        assert!(in_flight.try_acquire("p").is_some());
    }

    #[test]
    fn errors_map_to_status() {
        let status = |e: HttpError| e.into_response().status();
        assert_eq!(
            status(GameError::InsufficientFunds { balance: 30, wager: 50 }.into()),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(status(GameError::SpinInFlight.into()), StatusCode::CONFLICT);
        assert_eq!(
            status(StoreError::NotFound("p".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(StoreError::Backend("down".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
