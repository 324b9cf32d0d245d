use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::symbols::ReelState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WinTier {
    None,
    Pair,
    Triple,
}

impl WinTier {
    pub fn as_str(self) -> &'static str {
        match self {
            WinTier::None => "none",
            WinTier::Pair => "pair",
            WinTier::Triple => "triple",
        }
    }
}

impl fmt::Display for WinTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WinTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(WinTier::None),
            "pair" => Ok(WinTier::Pair),
            "triple" => Ok(WinTier::Triple),
            other => Err(format!("unknown win tier: {other}")),
        }
    }
}

/// Amount paid per win tier, independent of the wager.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayoutTable {
    pub pair: u64,
    pub triple: u64,
}

impl PayoutTable {
    pub fn payout_for(&self, tier: WinTier) -> u64 {
        match tier {
            WinTier::None => 0,
            WinTier::Pair => self.pair,
            WinTier::Triple => self.triple,
        }
    }
}

impl Default for PayoutTable {
    fn default() -> Self {
        Self {
            pair: 100,
            triple: 500,
        }
    }
}

/// Classify a stopped machine.
///
/// Only adjacent reels form a pair: `[a, b, a]` pays nothing. A triple also
/// satisfies the pair test, so it has to be recognised first.
pub fn classify(reels: &ReelState) -> WinTier {
    let [a, b, c] = reels.0;
    if a == b && b == c {
        WinTier::Triple
    } else if a == b || b == c {
        WinTier::Pair
    } else {
        WinTier::None
    }
}

pub fn evaluate(reels: &ReelState, table: &PayoutTable) -> (WinTier, u64) {
    let tier = classify(reels);
    (tier, table.payout_for(tier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::Symbol::*;

    #[test]
    fn test_triple_wins_over_pair() {
        for sym in crate::symbols::Symbol::ALL {
            let reels = ReelState::new(sym, sym, sym);
            assert_eq!(classify(&reels), WinTier::Triple);
        }
    }

    #[test]
    fn test_adjacent_pairs() {
        assert_eq!(classify(&ReelState::new(Seven, Seven, Plum)), WinTier::Pair);
        assert_eq!(classify(&ReelState::new(Plum, Seven, Seven)), WinTier::Pair);
    }

    #[test]
    fn test_outer_reels_do_not_pair() {
        assert_eq!(classify(&ReelState::new(Bell, Lemon, Bell)), WinTier::None);
    }

    #[test]
    fn test_tier_names_parse_back() {
        for tier in [WinTier::None, WinTier::Pair, WinTier::Triple] {
            assert_eq!(tier.as_str().parse::<WinTier>(), Ok(tier));
        }
        assert!("jackpot".parse::<WinTier>().is_err());
    }

    #[test]
    fn test_evaluate_uses_table() {
        let table = PayoutTable { pair: 7, triple: 70 };
        assert_eq!(evaluate(&ReelState::new(Bar, Bar, Bar), &table), (WinTier::Triple, 70));
        assert_eq!(evaluate(&ReelState::new(Bar, Bar, Melon), &table), (WinTier::Pair, 7));
        assert_eq!(evaluate(&ReelState::new(Banana, Bar, Melon), &table), (WinTier::None, 0));
    }
}
