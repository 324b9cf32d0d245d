use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of reels on the machine.
pub const REEL_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Symbol {
    Banana,
    Seven,
    Cherry,
    Plum,
    Orange,
    Bell,
    Bar,
    Lemon,
    Melon,
}

impl Symbol {
    pub const COUNT: usize = 9;

    /// Every symbol in strip order. The position is the symbol's index.
    pub const ALL: [Symbol; Symbol::COUNT] = [
        Symbol::Banana,
        Symbol::Seven,
        Symbol::Cherry,
        Symbol::Plum,
        Symbol::Orange,
        Symbol::Bell,
        Symbol::Bar,
        Symbol::Lemon,
        Symbol::Melon,
    ];

    pub fn from_index(i: u8) -> Option<Self> {
        Self::ALL.get(i as usize).copied()
    }

    pub fn to_index(self) -> u8 {
        match self {
            Symbol::Banana => 0,
            Symbol::Seven => 1,
            Symbol::Cherry => 2,
            Symbol::Plum => 3,
            Symbol::Orange => 4,
            Symbol::Bell => 5,
            Symbol::Bar => 6,
            Symbol::Lemon => 7,
            Symbol::Melon => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Symbol::Banana => "banana",
            Symbol::Seven => "seven",
            Symbol::Cherry => "cherry",
            Symbol::Plum => "plum",
            Symbol::Orange => "orange",
            Symbol::Bell => "bell",
            Symbol::Bar => "bar",
            Symbol::Lemon => "lemon",
            Symbol::Melon => "melon",
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown symbol: {0}")]
pub struct UnknownSymbol(pub String);

impl FromStr for Symbol {
    type Err = UnknownSymbol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|sym| sym.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownSymbol(s.to_string()))
    }
}

/// The three symbols currently shown, left to right.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ReelState(pub [Symbol; REEL_COUNT]);

impl ReelState {
    pub fn new(a: Symbol, b: Symbol, c: Symbol) -> Self {
        Self([a, b, c])
    }

    pub fn symbols(&self) -> &[Symbol; REEL_COUNT] {
        &self.0
    }

    pub fn indices(&self) -> [u8; REEL_COUNT] {
        self.0.map(Symbol::to_index)
    }

    /// Returns `None` if any index is outside the symbol set.
    pub fn from_indices(indices: &[u8]) -> Option<Self> {
        if indices.len() != REEL_COUNT {
            return None;
        }
        Some(Self([
            Symbol::from_index(indices[0])?,
            Symbol::from_index(indices[1])?,
            Symbol::from_index(indices[2])?,
        ]))
    }
}

impl Default for ReelState {
    fn default() -> Self {
        Self([Symbol::Banana; REEL_COUNT])
    }
}

impl fmt::Display for ReelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "[{a} | {b} | {c}]")
    }
}
