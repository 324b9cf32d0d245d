use clap::{Parser, Subcommand};
use rand::{rngs::StdRng, SeedableRng};

use fruitslot_core::{
    generate_server_seed, BalanceStore, EngineParams, EntropySource, SessionState, WinTier,
    DEFAULT_BALANCE,
};
use fruitslot_server::{config::DEFAULT_DATABASE_URL, db, init_tracing, SqliteStore};

#[derive(Parser)]
#[command(name = "fruitslot-cli", about = "Admin CLI for the fruitslot server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Database URL, default sqlite://fruitslot.db
    #[arg(long, value_parser, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Set a player's balance without touching their stats
    ResetBalance {
        player: String,
        #[arg(long, default_value_t = DEFAULT_BALANCE)]
        amount: u64,
    },
    /// Show a player's balance and lifetime stats
    Stats { player: String },
    /// View last N spins
    ViewLogs {
        #[arg(default_value_t = 20)]
        n: i64,
    },
    /// Export spins to CSV path
    ExportCsv { path: String },
    /// Rotate server seed; a random one is generated when omitted
    RotateSeed { new_seed: Option<String> },
    /// Play offline with the current rules and report the return to player
    Simulate {
        #[arg(long, default_value_t = 100_000)]
        spins: u64,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Debug, Default, PartialEq)]
struct SimulationReport {
    spins: u64,
    wagered: u64,
    paid: u64,
    pairs: u64,
    triples: u64,
}

impl SimulationReport {
    fn rtp(&self) -> f64 {
        if self.wagered == 0 {
            return 0.0;
        }
        self.paid as f64 / self.wagered as f64
    }
}

/// Spin `spins` times against an effectively bottomless balance.
fn simulate(params: &EngineParams, spins: u64, seed: u64) -> anyhow::Result<SimulationReport> {
    let mut source = EntropySource::new(StdRng::seed_from_u64(seed));
    let mut report = SimulationReport::default();
    let mut session = SessionState::default();
    for _ in 0..spins {
        session.reset_balance(u64::MAX / 2);
        let pending = session.begin_spin(params, &mut source)?;
        let record = session.to_record();
        let result = session.settle(pending, &record);
        report.spins += 1;
        report.wagered += result.wager_cost;
        report.paid += result.payout;
        match result.win_tier {
            WinTier::Pair => report.pairs += 1,
            WinTier::Triple => report.triples += 1,
            WinTier::None => {}
        }
    }
    Ok(report)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("warn");
    let cli = Cli::parse();
    let url = cli
        .database_url
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.into());
    let pool = db::connect(&url).await?;
    let params = db::init_db(&pool).await?;
    let store = SqliteStore::new(pool.clone());

    match cli.command {
        Commands::ResetBalance { player, amount } => {
            let record = store.reset_balance(&player, amount).await?;
            println!("{player}: balance reset to {}", record.balance);
        }
        Commands::Stats { player } => match store.load(&player).await? {
            Some(r) => println!(
                "{player}: money={} lost={} gained={} games={}",
                r.balance, r.stats.money_lost, r.stats.money_gained, r.stats.games_played
            ),
            None => println!("{player}: no record"),
        },
        Commands::ViewLogs { n } => {
            for e in db::recent_spins(&pool, n).await? {
                println!(
                    "#{:>6} {} player={} seed={} nonce={} hash={} reels={:?} tier={} wager={} payout={}",
                    e.id,
                    e.ts.to_rfc3339(),
                    e.player_id,
                    e.client_seed,
                    e.nonce,
                    e.server_seed_hash,
                    e.result_reels,
                    e.win_tier,
                    e.wager,
                    e.payout
                );
            }
        }
        Commands::ExportCsv { path } => {
            let mut wtr = csv::Writer::from_path(&path)?;
            wtr.write_record([
                "id",
                "ts",
                "player_id",
                "client_seed",
                "nonce",
                "server_seed_hash",
                "result_reels",
                "win_tier",
                "wager",
                "payout",
            ])?;
            let rows = db::all_spins(&pool).await?;
            for e in &rows {
                wtr.write_record(&[
                    e.id.to_string(),
                    e.ts.to_rfc3339(),
                    e.player_id.clone(),
                    e.client_seed.clone(),
                    e.nonce.to_string(),
                    e.server_seed_hash.clone(),
                    format!("{:?}", e.result_reels),
                    e.win_tier.to_string(),
                    e.wager.to_string(),
                    e.payout.to_string(),
                ])?;
            }
            wtr.flush()?;
            println!("Exported {} rows to {}", rows.len(), path);
        }
        Commands::RotateSeed { new_seed } => {
            let seed = match new_seed {
                Some(s) => s,
                None => generate_server_seed()?,
            };
            let hash = db::rotate_seed(&pool, seed).await?;
            println!("Rotated server seed. New hash: {}", hash);
        }
        Commands::Simulate { spins, seed } => {
            let seed = seed.unwrap_or_else(rand::random);
            let report = simulate(&params.engine, spins, seed)?;
            println!(
                "spins={} wagered={} paid={} rtp={:.4} pair={:.4} triple={:.4} (seed {})",
                report.spins,
                report.wagered,
                report.paid,
                report.rtp(),
                report.pairs as f64 / report.spins.max(1) as f64,
                report.triples as f64 / report.spins.max(1) as f64,
                seed
            );
        }
    }

    Ok(())
}
