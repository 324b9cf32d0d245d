pub mod engine;
pub mod error;
pub mod paytable;
pub mod rng;
pub mod session;
pub mod store;
pub mod symbols;

pub use crate::engine::{evaluate_spin, resolve_spin, spin_once, EngineParams, SpinResult, DEFAULT_BALANCE, DEFAULT_WAGER};
pub use crate::error::{GameError, GameResult, StoreError};
pub use crate::paytable::{classify, evaluate, PayoutTable, WinTier};
pub use crate::rng::{derive_floats, derive_hash_hex, generate_server_seed, verify_reels, EntropySource, ProvablyFairRng, RandomnessError, ReelSource};
pub use crate::session::{PendingSpin, SessionState, SessionStats};
pub use crate::store::{check_commit, BalanceStore, CommitCheck, MemoryStore, PlayerRecord, SpinCommit};
pub use crate::symbols::{ReelState, Symbol, REEL_COUNT};
