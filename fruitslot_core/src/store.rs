use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

use crate::{
    engine::{SpinResult, DEFAULT_BALANCE},
    error::StoreError,
    session::SessionStats,
};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerRecord {
    pub balance: u64,
    #[serde(flatten)]
    pub stats: SessionStats,
}

impl PlayerRecord {
    pub fn new(balance: u64) -> Self {
        Self {
            balance,
            stats: SessionStats::default(),
        }
    }

    /// Nonce the next spin of this player will carry.
    pub fn next_nonce(&self) -> u64 {
        self.stats.games_played.saturating_add(1)
    }

    /// Apply a commit that has already been checked against the nonce.
    pub fn apply(&mut self, commit: &SpinCommit) {
        self.balance = commit.result.new_balance;
        self.stats.record(&commit.result);
    }
}

/// One completed spin on its way to the store.
///
/// `nonce` is the player's 1-based spin count; it makes the write idempotent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpinCommit {
    pub nonce: u64,
    pub result: SpinResult,
    /// Client half of the provably-fair seed pair, kept for the audit log.
    #[serde(default)]
    pub client_seed: Option<String>,
}

impl SpinCommit {
    pub fn with_client_seed(mut self, seed: impl Into<String>) -> Self {
        self.client_seed = Some(seed.into());
        self
    }
}

/// What the nonce of an incoming commit means for a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitCheck {
    Apply,
    AlreadyApplied,
    Conflict { expected: u64 },
}

pub fn check_commit(record: &PlayerRecord, nonce: u64) -> CommitCheck {
    let played = record.stats.games_played;
    let expected = played.saturating_add(1);
    if nonce == expected {
        CommitCheck::Apply
    } else if nonce != 0 && nonce == played {
        CommitCheck::AlreadyApplied
    } else {
        CommitCheck::Conflict { expected }
    }
}

/// Persistence for balances and stats, keyed by the identity provider's player id.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn load(&self, player: &str) -> Result<Option<PlayerRecord>, StoreError>;

    /// Create the player with `balance` unless it already exists.
    async fn register(&self, player: &str, balance: u64) -> Result<PlayerRecord, StoreError>;

    /// Atomically apply a spin: balance, `money_lost`, `money_gained`, `games_played`.
    async fn commit(&self, player: &str, commit: &SpinCommit) -> Result<PlayerRecord, StoreError>;

    /// Overwrite the balance only.
    async fn reset_balance(&self, player: &str, amount: u64) -> Result<PlayerRecord, StoreError>;

    async fn load_or_init(&self, player: &str) -> Result<PlayerRecord, StoreError> {
        match self.load(player).await? {
            Some(record) => Ok(record),
            None => self.register(player, DEFAULT_BALANCE).await,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    players: HashMap<String, (PlayerRecord, Option<SpinCommit>)>,
    fail_commits: usize,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail with a backend error.
    pub fn fail_next_commits(&self, n: usize) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_commits = n;
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store poisoned".into()))
    }
}

#[async_trait]
impl BalanceStore for MemoryStore {
    async fn load(&self, player: &str) -> Result<Option<PlayerRecord>, StoreError> {
        Ok(self.lock()?.players.get(player).map(|(r, _)| *r))
    }

    async fn register(&self, player: &str, balance: u64) -> Result<PlayerRecord, StoreError> {
        let mut inner = self.lock()?;
        let (record, _) = inner.players.entry(player.to_string()).or_insert_with(|| {
            info!(player, balance, "player registered");
            (PlayerRecord::new(balance), None)
        });
        Ok(*record)
    }

    async fn commit(&self, player: &str, commit: &SpinCommit) -> Result<PlayerRecord, StoreError> {
        let mut inner = self.lock()?;
        if inner.fail_commits > 0 {
            inner.fail_commits -= 1;
            return Err(StoreError::Backend("injected commit failure".into()));
        }
        let (record, last) = inner
            .players
            .get_mut(player)
            .ok_or_else(|| StoreError::NotFound(player.to_string()))?;
        match check_commit(record, commit.nonce) {
            CommitCheck::Apply => {
                record.apply(commit);
                *last = Some(commit.clone());
                Ok(*record)
            }
            CommitCheck::AlreadyApplied if last.as_ref() == Some(commit) => Ok(*record),
            CommitCheck::AlreadyApplied => Err(StoreError::Conflict {
                player: player.to_string(),
                expected: record.next_nonce(),
                got: commit.nonce,
            }),
            CommitCheck::Conflict { expected } => Err(StoreError::Conflict {
                player: player.to_string(),
                expected,
                got: commit.nonce,
            }),
        }
    }

    async fn reset_balance(&self, player: &str, amount: u64) -> Result<PlayerRecord, StoreError> {
        let mut inner = self.lock()?;
        let (record, _) = inner
            .players
            .get_mut(player)
            .ok_or_else(|| StoreError::NotFound(player.to_string()))?;
        record.balance = amount;
        Ok(*record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::resolve_spin;
    use crate::paytable::PayoutTable;
    use crate::symbols::{ReelState, Symbol::*};

    fn commit_for(record: &PlayerRecord, reels: ReelState) -> SpinCommit {
        let result = resolve_spin(record.balance, 50, &PayoutTable::default(), reels).unwrap();
        SpinCommit {
            nonce: record.next_nonce(),
            result,
            client_seed: None,
        }
    }

    #[test]
    fn test_check_commit() {
        let mut record = PlayerRecord::new(1000);
        assert_eq!(check_commit(&record, 1), CommitCheck::Apply);
        assert_eq!(check_commit(&record, 0), CommitCheck::Conflict { expected: 1 });
        record.stats.games_played = 4;
        assert_eq!(check_commit(&record, 4), CommitCheck::AlreadyApplied);
        assert_eq!(check_commit(&record, 7), CommitCheck::Conflict { expected: 5 });
    }

    #[tokio::test]
    async fn test_load_or_init_defaults() {
        let store = MemoryStore::new();
        assert_eq!(store.load("p").await.unwrap(), None);
        let record = store.load_or_init("p").await.unwrap();
        assert_eq!(record, PlayerRecord::new(1000));
    }

    #[tokio::test]
    async fn test_register_keeps_existing() {
        let store = MemoryStore::new();
        store.register("p", 1000).await.unwrap();
        store.reset_balance("p", 10).await.unwrap();
        assert_eq!(store.register("p", 1000).await.unwrap().balance, 10);
    }

    #[tokio::test]
    async fn test_commit_is_idempotent() {
        let store = MemoryStore::new();
        let record = store.register("p", 1000).await.unwrap();
        let commit = commit_for(&record, ReelState::new(Seven, Seven, Seven));
        let first = store.commit("p", &commit).await.unwrap();
        let again = store.commit("p", &commit).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(first.balance, 1450);
        assert_eq!(first.stats.games_played, 1);
        assert_eq!(first.stats.money_gained, 500);
    }

    #[tokio::test]
    async fn test_stale_commit_conflicts() {
        let store = MemoryStore::new();
        let record = store.register("p", 1000).await.unwrap();
        let first = commit_for(&record, ReelState::new(Banana, Seven, Plum));
        store.commit("p", &first).await.unwrap();
        let mut forged = first.clone();
        forged.result.payout = 500;
        assert!(matches!(
            store.commit("p", &forged).await,
            Err(StoreError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_injected_failure_then_retry() {
        let store = MemoryStore::new();
        let record = store.register("p", 1000).await.unwrap();
        let commit = commit_for(&record, ReelState::new(Banana, Seven, Plum));
        store.fail_next_commits(1);
        assert!(matches!(
            store.commit("p", &commit).await,
            Err(StoreError::Backend(_))
        ));
        assert_eq!(store.load("p").await.unwrap(), Some(record));
        assert_eq!(store.commit("p", &commit).await.unwrap().balance, 950);
    }

    #[tokio::test]
    async fn test_unknown_player() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.reset_balance("ghost", 1000).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
