use chrono::{DateTime, Utc};
use fruitslot_core::{
    PayoutTable, PlayerRecord, ReelState, SessionStats, SpinResult, Symbol, WinTier,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SpinRequest {
    /// Defaults to the player id when absent.
    #[serde(default)]
    pub client_seed: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SpinResponse {
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    pub reels: Vec<u8>, // indices of symbols
    pub symbols: Vec<Symbol>,
    pub win_tier: WinTier,
    pub wager_cost: u64,
    pub payout: u64,
    pub player: PlayerView,
}

impl SpinResponse {
    pub fn new(
        server_seed_hash: String,
        client_seed: String,
        nonce: u64,
        result: &SpinResult,
        player: PlayerView,
    ) -> Self {
        Self {
            server_seed_hash,
            client_seed,
            nonce,
            reels: result.reels.indices().to_vec(),
            symbols: result.reels.symbols().to_vec(),
            win_tier: result.win_tier,
            wager_cost: result.wager_cost,
            payout: result.payout,
            player,
        }
    }

    pub fn reel_state(&self) -> Option<ReelState> {
        ReelState::from_indices(&self.reels)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerView {
    pub player_id: String,
    pub money: u64,
    pub money_lost: u64,
    pub money_gained: u64,
    pub games_played: u64,
}

impl PlayerView {
    pub fn new(player_id: impl Into<String>, record: &PlayerRecord) -> Self {
        Self {
            player_id: player_id.into(),
            money: record.balance,
            money_lost: record.stats.money_lost,
            money_gained: record.stats.money_gained,
            games_played: record.stats.games_played,
        }
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            money_lost: self.money_lost,
            money_gained: self.money_gained,
            games_played: self.games_played,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VerifyResponse {
    pub server_seed_hash: String,
    pub wager_cost: u64,
    pub payouts: PayoutTable,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ResetRequest {
    #[serde(default)]
    pub amount: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminSetParamsRequest {
    pub wager_cost: u64,
    pub payouts: PayoutTable,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpinLogEntry {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub player_id: String,
    pub client_seed: String,
    pub nonce: i64,
    pub server_seed_hash: String,
    pub result_reels: Vec<u8>,
    pub win_tier: WinTier,
    pub wager: u64,
    pub payout: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("not enough money to spin")]
    InsufficientFunds,
    #[error("a spin is already in progress")]
    SpinInProgress,
    #[error("player not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("internal server error")]
    Internal,
}

pub type ApiResult<T> = Result<T, ApiError>;
