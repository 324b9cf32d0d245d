use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{GameError, GameResult},
    paytable::{evaluate, PayoutTable, WinTier},
    rng::ReelSource,
    symbols::ReelState,
};

pub const DEFAULT_WAGER: u64 = 50;
pub const DEFAULT_BALANCE: u64 = 1000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineParams {
    pub wager_cost: u64,
    pub payouts: PayoutTable,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            wager_cost: DEFAULT_WAGER,
            payouts: PayoutTable::default(),
        }
    }
}

/// Final outcome of one spin. Re-submitting it never changes the draw.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpinResult {
    pub reels: ReelState,
    pub wager_cost: u64,
    pub payout: u64,
    pub win_tier: WinTier,
    pub new_balance: u64,
}

fn check_funds(current_balance: u64, wager_cost: u64) -> GameResult<()> {
    if wager_cost == 0 {
        return Err(GameError::InvalidWager);
    }
    if current_balance < wager_cost {
        return Err(GameError::InsufficientFunds {
            balance: current_balance,
            wager: wager_cost,
        });
    }
    Ok(())
}

/// Settle an already-drawn outcome.
pub fn resolve_spin(
    current_balance: u64,
    wager_cost: u64,
    payouts: &PayoutTable,
    reels: ReelState,
) -> GameResult<SpinResult> {
    check_funds(current_balance, wager_cost)?;
    let (win_tier, payout) = evaluate(&reels, payouts);
    let new_balance = (current_balance - wager_cost)
        .checked_add(payout)
        .ok_or(GameError::BalanceOverflow)?;
    Ok(SpinResult {
        reels,
        wager_cost,
        payout,
        win_tier,
        new_balance,
    })
}

/// Draw and settle a spin. Funds are checked before the source is touched.
pub fn evaluate_spin<S: ReelSource + ?Sized>(
    current_balance: u64,
    wager_cost: u64,
    payouts: &PayoutTable,
    source: &mut S,
) -> GameResult<SpinResult> {
    check_funds(current_balance, wager_cost)?;
    let reels = source.draw()?;
    let result = resolve_spin(current_balance, wager_cost, payouts, reels)?;
    debug!(
        reels = %result.reels,
        tier = %result.win_tier,
        payout = result.payout,
        balance = result.new_balance,
        "spin resolved"
    );
    Ok(result)
}

pub fn spin_once<S: ReelSource + ?Sized>(
    current_balance: u64,
    params: &EngineParams,
    source: &mut S,
) -> GameResult<SpinResult> {
    evaluate_spin(current_balance, params.wager_cost, &params.payouts, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{ProvablyFairRng, RandomnessError};
    use crate::symbols::Symbol::*;

    struct Fixed(ReelState, usize);

    impl ReelSource for Fixed {
        fn draw(&mut self) -> Result<ReelState, RandomnessError> {
            self.1 += 1;
            Ok(self.0)
        }
    }

    struct Broken;

    impl ReelSource for Broken {
        fn draw(&mut self) -> Result<ReelState, RandomnessError> {
            Err(RandomnessError("entropy pool closed".into()))
        }
    }

    #[test]
    fn test_spin_deterministic() {
        let params = EngineParams::default();
        let mut rng = ProvablyFairRng::new("server", "client", 1);
        let out1 = spin_once(1000, &params, &mut rng).unwrap();
        let out2 = spin_once(1000, &params, &mut rng).unwrap();
        assert_eq!(out1, out2);
    }

    #[test]
    fn test_insufficient_funds_draws_nothing() {
        let mut src = Fixed(ReelState::new(Seven, Seven, Seven), 0);
        let err = evaluate_spin(30, 50, &PayoutTable::default(), &mut src).unwrap_err();
        assert_eq!(err, GameError::InsufficientFunds { balance: 30, wager: 50 });
        assert_eq!(src.1, 0);
    }

    #[test]
    fn test_zero_wager_rejected() {
        let mut src = Fixed(ReelState::default(), 0);
        assert_eq!(
            evaluate_spin(100, 0, &PayoutTable::default(), &mut src),
            Err(GameError::InvalidWager)
        );
    }

    #[test]
    fn test_randomness_failure_is_atomic() {
        let err = evaluate_spin(1000, 50, &PayoutTable::default(), &mut Broken).unwrap_err();
        assert!(matches!(err, GameError::Randomness(_)));
    }

    #[test]
    fn test_exact_balance_can_spin() {
        let mut src = Fixed(ReelState::new(Banana, Seven, Plum), 0);
        let out = evaluate_spin(50, 50, &PayoutTable::default(), &mut src).unwrap();
        assert_eq!(out.new_balance, 0);
    }

    #[test]
    fn test_overflow_reported() {
        let table = PayoutTable { pair: 1, triple: u64::MAX };
        let err = resolve_spin(u64::MAX, 1, &table, ReelState::new(Bar, Bar, Bar)).unwrap_err();
        assert_eq!(err, GameError::BalanceOverflow);
    }
}
