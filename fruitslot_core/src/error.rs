use crate::rng::RandomnessError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("wager must be greater than zero")]
    InvalidWager,
    #[error("not enough money to spin: balance {balance}, wager {wager}")]
    InsufficientFunds { balance: u64, wager: u64 },
    #[error("a spin is already in progress")]
    SpinInFlight,
    #[error(transparent)]
    Randomness(#[from] RandomnessError),
    #[error("balance overflow")]
    BalanceOverflow,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("player not found: {0}")]
    NotFound(String),
    #[error("commit conflict for {player}: expected nonce {expected}, got {got}")]
    Conflict {
        player: String,
        expected: u64,
        got: u64,
    },
    #[error("store backend: {0}")]
    Backend(String),
}

pub type GameResult<T> = Result<T, GameError>;
