use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::symbols::{ReelState, Symbol, REEL_COUNT};

// Provably-fair draw:
// server_seed (secret) + client_seed + nonce -> HMAC-SHA256 -> bytes -> floats in [0,1) -> symbols

pub type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("randomness source unavailable: {0}")]
pub struct RandomnessError(pub String);

/// Anything that can stop the three reels.
///
/// Each reel must be an independent, uniform pick from [`Symbol::ALL`].
pub trait ReelSource {
    fn draw(&mut self) -> Result<ReelState, RandomnessError>;
}

pub fn derive_hash_hex(input: &[u8]) -> String {
    hex::encode(Sha256::digest(input))
}

pub fn derive_floats(hmac_bytes: &[u8], count: usize) -> Vec<f64> {
    // Successive 4-byte chunks become u32 and then [0,1)
    let mut out = Vec::with_capacity(count);
    let mut buffer = hmac_bytes.to_vec();
    let mut i = 0usize;
    while out.len() < count {
        if i + 4 > buffer.len() {
            // extend deterministically by hashing the previous buffer
            buffer = Sha256::digest(&buffer).to_vec();
            i = 0;
            continue;
        }
        let chunk = &buffer[i..i + 4];
        let v = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        out.push(unit_float(v));
        i += 4;
    }
    out
}

fn unit_float(v: u32) -> f64 {
    (v as f64) / (u32::MAX as f64 + 1.0)
}

fn symbol_at(f: f64) -> Symbol {
    let idx = ((f * Symbol::COUNT as f64).floor() as usize).min(Symbol::COUNT - 1);
    Symbol::ALL[idx]
}

fn reels_from_floats(floats: &[f64]) -> ReelState {
    ReelState([symbol_at(floats[0]), symbol_at(floats[1]), symbol_at(floats[2])])
}

#[derive(Debug, Clone)]
pub struct ProvablyFairRng {
    pub server_seed: String, // secret
    pub client_seed: String,
    pub nonce: u64,
}

impl ProvablyFairRng {
    pub fn new(server_seed: impl Into<String>, client_seed: impl Into<String>, nonce: u64) -> Self {
        Self {
            server_seed: server_seed.into(),
            client_seed: client_seed.into(),
            nonce,
        }
    }

    pub fn server_seed_hash_hex(&self) -> String {
        derive_hash_hex(self.server_seed.as_bytes())
    }

    pub fn hmac_bytes(&self) -> Result<[u8; 32], RandomnessError> {
        let mut mac = HmacSha256::new_from_slice(self.server_seed.as_bytes())
            .map_err(|e| RandomnessError(e.to_string()))?;
        let msg = format!("{}:{}", self.client_seed, self.nonce);
        mac.update(msg.as_bytes());
        let res = mac.finalize().into_bytes();
        let mut out = [0u8; 32];
        out.copy_from_slice(&res);
        Ok(out)
    }

    pub fn next_floats(&self, count: usize) -> Result<Vec<f64>, RandomnessError> {
        let bytes = self.hmac_bytes()?;
        Ok(derive_floats(&bytes, count))
    }

    /// The outcome is fixed by (seeds, nonce); drawing twice yields the same reels.
    pub fn reels(&self) -> Result<ReelState, RandomnessError> {
        Ok(reels_from_floats(&self.next_floats(REEL_COUNT)?))
    }
}

impl ReelSource for ProvablyFairRng {
    fn draw(&mut self) -> Result<ReelState, RandomnessError> {
        self.reels()
    }
}

/// Reel source over any `rand` generator.
pub struct EntropySource<R> {
    rng: R,
}

impl<R: RngCore> EntropySource<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: RngCore> ReelSource for EntropySource<R> {
    fn draw(&mut self) -> Result<ReelState, RandomnessError> {
        let mut bytes = [0u8; 4 * REEL_COUNT];
        self.rng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| RandomnessError(e.to_string()))?;
        Ok(reels_from_floats(&derive_floats(&bytes, REEL_COUNT)))
    }
}

/// Fresh hex server seed from the operating system RNG.
pub fn generate_server_seed() -> Result<String, RandomnessError> {
    let mut seed = [0u8; 32];
    rand::rngs::OsRng
        .try_fill_bytes(&mut seed)
        .map_err(|e| RandomnessError(e.to_string()))?;
    Ok(hex::encode(seed))
}

/// Check a logged outcome against what the seeds would produce.
pub fn verify_reels(server_seed: &str, client_seed: &str, nonce: u64, expected: &ReelState) -> bool {
    ProvablyFairRng::new(server_seed, client_seed, nonce)
        .reels()
        .map(|actual| actual == *expected)
        .unwrap_or(false)
}
