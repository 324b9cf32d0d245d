use fruitslot_core::{EngineParams, ProvablyFairRng, SessionState, PlayerRecord, DEFAULT_BALANCE};

fn main() {
    // A short session against a fixed server seed
    let server_seed = "example-server-seed";
    let client_seed = "example-client-seed";
    let params = EngineParams::default();
    let mut session = SessionState::from_record(&PlayerRecord::new(DEFAULT_BALANCE));

    for _ in 0..5 {
        let nonce = session.stats.games_played + 1;
        let mut rng = ProvablyFairRng::new(server_seed, client_seed, nonce);
        let pending = match session.begin_spin(&params, &mut rng) {
            Ok(p) => p,
            Err(e) => {
                println!("stopped: {e}");
                break;
            }
        };
        let stored = session.to_record();
        let result = session.settle(pending, &stored);
        println!(
            "nonce={} reels={} tier={} payout={} balance={}",
            nonce, result.reels, result.win_tier, result.payout, result.new_balance
        );
    }
    println!(
        "server_seed_hash={} stats={:?}",
        ProvablyFairRng::new(server_seed, client_seed, 0).server_seed_hash_hex(),
        session.stats
    );
}
