//! In-memory state of one player's session.
//!
//! The balance, lifetime stats and the spin-in-progress flag live here
//! instead of in the presentation layer, so a whole session can be driven
//! and inspected from tests.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    engine::{evaluate_spin, EngineParams, SpinResult},
    error::{GameError, GameResult},
    rng::ReelSource,
    store::{PlayerRecord, SpinCommit},
    symbols::ReelState,
};

/// Lifetime counters. They only ever grow, once per completed spin.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionStats {
    pub money_lost: u64,
    pub money_gained: u64,
    pub games_played: u64,
}

impl SessionStats {
    pub fn record(&mut self, result: &SpinResult) {
        self.money_lost = self.money_lost.saturating_add(result.wager_cost);
        self.money_gained = self.money_gained.saturating_add(result.payout);
        self.games_played = self.games_played.saturating_add(1);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub balance: u64,
    pub stats: SessionStats,
    pub reels: ReelState,
    pub spin_in_flight: bool,
    /// Wager of the latest spin.
    pub last_spent: u64,
    /// Payout of the latest spin.
    pub last_won: u64,
}

/// A spin applied in memory but not yet acknowledged by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a pending spin must be settled or rolled back"]
pub struct PendingSpin {
    pub result: SpinResult,
    nonce: u64,
    snapshot: SessionState,
}

impl PendingSpin {
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Payload for the store. Safe to send again after a failed attempt.
    pub fn commit(&self) -> SpinCommit {
        SpinCommit {
            nonce: self.nonce,
            result: self.result,
            client_seed: None,
        }
    }
}

impl SessionState {
    pub fn from_record(record: &PlayerRecord) -> Self {
        Self {
            balance: record.balance,
            stats: record.stats,
            ..Self::default()
        }
    }

    pub fn to_record(&self) -> PlayerRecord {
        PlayerRecord {
            balance: self.balance,
            stats: self.stats,
        }
    }

    pub fn can_spin(&self, wager_cost: u64) -> bool {
        !self.spin_in_flight && wager_cost > 0 && self.balance >= wager_cost
    }

    pub fn begin_spin<S: ReelSource + ?Sized>(
        &mut self,
        params: &EngineParams,
        source: &mut S,
    ) -> GameResult<PendingSpin> {
        if self.spin_in_flight {
            warn!("spin rejected, previous spin still committing");
            return Err(GameError::SpinInFlight);
        }
        let result = evaluate_spin(self.balance, params.wager_cost, &params.payouts, source)?;
        let snapshot = self.clone();
        let nonce = self.stats.games_played + 1;

        self.balance = result.new_balance;
        self.stats.record(&result);
        self.reels = result.reels;
        self.last_spent = result.wager_cost;
        self.last_won = result.payout;
        self.spin_in_flight = true;

        debug!(nonce, balance = self.balance, "spin pending");
        Ok(PendingSpin {
            result,
            nonce,
            snapshot,
        })
    }

    /// The store accepted the spin. Adopts the store's view of the record.
    pub fn settle(&mut self, pending: PendingSpin, stored: &PlayerRecord) -> SpinResult {
        self.balance = stored.balance;
        self.stats = stored.stats;
        self.spin_in_flight = false;
        pending.result
    }

    /// The store never accepted the spin; undo it.
    pub fn rollback(&mut self, pending: PendingSpin) {
        debug!(nonce = pending.nonce, "rolling back spin");
        *self = pending.snapshot;
    }

    pub fn reset_balance(&mut self, amount: u64) {
        self.balance = amount;
    }
}
