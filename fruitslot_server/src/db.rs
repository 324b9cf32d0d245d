use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use tracing::{info, warn};

use fruitslot_core::{
    check_commit, derive_hash_hex, generate_server_seed, BalanceStore, CommitCheck, EngineParams,
    PayoutTable, PlayerRecord, SessionStats, SpinCommit, StoreError, WinTier,
};
use fruitslot_shared::SpinLogEntry;

/// Seed pair and game rules currently in force.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameParams {
    pub server_seed: String,
    pub server_seed_hash: String,
    pub engine: EngineParams,
}

#[derive(Debug, sqlx::FromRow)]
struct ParamsRow {
    server_seed: String,
    server_seed_hash: String,
    wager_cost: i64,
    payout_pair: i64,
    payout_triple: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct PlayerRow {
    balance: i64,
    money_lost: i64,
    money_gained: i64,
    games_played: i64,
}

impl PlayerRow {
    fn record(&self) -> Result<PlayerRecord, StoreError> {
        Ok(PlayerRecord {
            balance: from_db(self.balance)?,
            stats: SessionStats {
                money_lost: from_db(self.money_lost)?,
                money_gained: from_db(self.money_gained)?,
                games_played: from_db(self.games_played)?,
            },
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LoggedSpin {
    result_reels_json: String,
    wager: i64,
    payout: i64,
    balance_after: i64,
}

impl LoggedSpin {
    fn matches(&self, commit: &SpinCommit) -> bool {
        let r = &commit.result;
        reels_json(commit).is_ok_and(|json| json == self.result_reels_json)
            && from_db(self.wager).is_ok_and(|w| w == r.wager_cost)
            && from_db(self.payout).is_ok_and(|p| p == r.payout)
            && from_db(self.balance_after).is_ok_and(|b| b == r.new_balance)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SpinRow {
    id: i64,
    ts: String,
    player_id: String,
    client_seed: String,
    nonce: i64,
    server_seed_hash: String,
    result_reels_json: String,
    win_tier: String,
    wager: i64,
    payout: i64,
}

impl SpinRow {
    fn into_entry(self) -> anyhow::Result<SpinLogEntry> {
        Ok(SpinLogEntry {
            id: self.id,
            ts: DateTime::parse_from_rfc3339(&self.ts)?.with_timezone(&Utc),
            player_id: self.player_id,
            client_seed: self.client_seed,
            nonce: self.nonce,
            server_seed_hash: self.server_seed_hash,
            result_reels: serde_json::from_str(&self.result_reels_json)?,
            win_tier: self.win_tier.parse::<WinTier>().map_err(anyhow::Error::msg)?,
            wager: u64::try_from(self.wager)?,
            payout: u64::try_from(self.payout)?,
        })
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn to_db(v: u64) -> Result<i64, StoreError> {
    i64::try_from(v).map_err(|_| StoreError::Backend(format!("value {v} exceeds sqlite range")))
}

fn from_db(v: i64) -> Result<u64, StoreError> {
    u64::try_from(v).map_err(|_| StoreError::Backend(format!("negative value {v} in store")))
}

fn reels_json(commit: &SpinCommit) -> Result<String, StoreError> {
    serde_json::to_string(&commit.result.reels.indices())
        .map_err(|e| StoreError::Backend(e.to_string()))
}

const SELECT_PLAYER: &str =
    "SELECT balance, money_lost, money_gained, games_played FROM players WHERE id = ?";

/// Writers queue on the busy timeout; WAL lets readers run beside them.
pub async fn connect(url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

pub async fn get_params(pool: &SqlitePool) -> anyhow::Result<GameParams> {
    let row = sqlx::query_as::<_, ParamsRow>(
        "SELECT server_seed, server_seed_hash, wager_cost, payout_pair, payout_triple FROM params WHERE id = 1",
    )
    .fetch_one(pool)
    .await?;
    Ok(GameParams {
        server_seed: row.server_seed,
        server_seed_hash: row.server_seed_hash,
        engine: EngineParams {
            wager_cost: u64::try_from(row.wager_cost)?,
            payouts: PayoutTable {
                pair: u64::try_from(row.payout_pair)?,
                triple: u64::try_from(row.payout_triple)?,
            },
        },
    })
}

pub async fn set_params(pool: &SqlitePool, p: &GameParams) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE params SET server_seed = ?, server_seed_hash = ?, wager_cost = ?, payout_pair = ?, payout_triple = ? WHERE id = 1",
    )
    .bind(&p.server_seed)
    .bind(&p.server_seed_hash)
    .bind(i64::try_from(p.engine.wager_cost)?)
    .bind(i64::try_from(p.engine.payouts.pair)?)
    .bind(i64::try_from(p.engine.payouts.triple)?)
    .execute(pool)
    .await?;
    Ok(())
}

/// Replace the server seed. Returns the new public hash.
pub async fn rotate_seed(pool: &SqlitePool, new_seed: String) -> anyhow::Result<String> {
    let mut p = get_params(pool).await?;
    p.server_seed_hash = derive_hash_hex(new_seed.as_bytes());
    p.server_seed = new_seed;
    set_params(pool, &p).await?;
    info!(hash = %p.server_seed_hash, "server seed rotated");
    Ok(p.server_seed_hash)
}

/// Run migrations and make sure a usable seed is in place.
pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<GameParams> {
    sqlx::migrate!("./migrations").run(pool).await?;
    let mut p = get_params(pool).await?;
    if p.server_seed.is_empty() {
        rotate_seed(pool, generate_server_seed()?).await?;
        p = get_params(pool).await?;
    }
    // ensure server_seed_hash matches server_seed
    let hash = derive_hash_hex(p.server_seed.as_bytes());
    if p.server_seed_hash != hash {
        warn!("stored server seed hash was stale, recomputing");
        p.server_seed_hash = hash;
        set_params(pool, &p).await?;
    }
    Ok(p)
}

const SELECT_SPINS: &str = "SELECT id, ts, player_id, client_seed, nonce, server_seed_hash, result_reels_json, win_tier, wager, payout FROM spins";

pub async fn recent_spins(pool: &SqlitePool, n: i64) -> anyhow::Result<Vec<SpinLogEntry>> {
    let rows = sqlx::query_as::<_, SpinRow>(&format!("{SELECT_SPINS} ORDER BY id DESC LIMIT ?"))
        .bind(n)
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(SpinRow::into_entry).collect()
}

pub async fn all_spins(pool: &SqlitePool) -> anyhow::Result<Vec<SpinLogEntry>> {
    let rows = sqlx::query_as::<_, SpinRow>(&format!("{SELECT_SPINS} ORDER BY id ASC"))
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(SpinRow::into_entry).collect()
}

/// Player balances and stats in SQLite. A commit and its spin-log row share one transaction.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Explains a commit whose guarded update matched no row: an exact
    /// replay of the latest spin, an unknown player, or a stale nonce.
    async fn settle_unapplied(
        &self,
        player: &str,
        commit: &SpinCommit,
    ) -> Result<PlayerRecord, StoreError> {
        let record = self
            .load(player)
            .await?
            .ok_or_else(|| StoreError::NotFound(player.to_string()))?;
        let conflict = |expected: u64| StoreError::Conflict {
            player: player.to_string(),
            expected,
            got: commit.nonce,
        };
        match check_commit(&record, commit.nonce) {
            CommitCheck::AlreadyApplied => {
                let logged = sqlx::query_as::<_, LoggedSpin>(
                    "SELECT result_reels_json, wager, payout, balance_after FROM spins WHERE player_id = ? AND nonce = ?",
                )
                .bind(player)
                .bind(to_db(commit.nonce)?)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
                match logged {
                    Some(l) if l.matches(commit) => Ok(record),
                    _ => Err(conflict(record.next_nonce())),
                }
            }
            CommitCheck::Conflict { expected } => Err(conflict(expected)),
            // another writer moved the row between our update and this read
            CommitCheck::Apply => Err(conflict(record.next_nonce())),
        }
    }
}

#[async_trait]
impl BalanceStore for SqliteStore {
    async fn load(&self, player: &str) -> Result<Option<PlayerRecord>, StoreError> {
        let row = sqlx::query_as::<_, PlayerRow>(SELECT_PLAYER)
            .bind(player)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(|r| r.record()).transpose()
    }

    async fn register(&self, player: &str, balance: u64) -> Result<PlayerRecord, StoreError> {
        let inserted = sqlx::query(
            "INSERT INTO players (id, balance, money_lost, money_gained, games_played, created_at) VALUES (?, ?, 0, 0, 0, ?) ON CONFLICT (id) DO NOTHING",
        )
        .bind(player)
        .bind(to_db(balance)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if inserted.rows_affected() == 1 {
            info!(player, balance, "player registered");
        }
        self.load(player)
            .await?
            .ok_or_else(|| StoreError::NotFound(player.to_string()))
    }

    async fn commit(&self, player: &str, commit: &SpinCommit) -> Result<PlayerRecord, StoreError> {
        let r = &commit.result;
        let mut tx = self.pool.begin().await.map_err(backend)?;
        // The guarded update goes first so the write lock is held before any read.
        let applied = match commit.nonce.checked_sub(1) {
            Some(played_before) => {
                sqlx::query(
                    "UPDATE players SET balance = ?, money_lost = money_lost + ?, money_gained = money_gained + ?, games_played = games_played + 1 WHERE id = ? AND games_played = ?",
                )
                .bind(to_db(r.new_balance)?)
                .bind(to_db(r.wager_cost)?)
                .bind(to_db(r.payout)?)
                .bind(player)
                .bind(to_db(played_before)?)
                .execute(&mut *tx)
                .await
                .map_err(backend)?
                .rows_affected()
                    == 1
            }
            None => false,
        };
        if !applied {
            tx.rollback().await.map_err(backend)?;
            return self.settle_unapplied(player, commit).await;
        }

        let seed_hash =
            sqlx::query_scalar::<_, String>("SELECT server_seed_hash FROM params WHERE id = 1")
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?;
        sqlx::query(
            "INSERT INTO spins (ts, player_id, client_seed, nonce, server_seed_hash, result_reels_json, win_tier, wager, payout, balance_after) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(player)
        .bind(commit.client_seed.as_deref().unwrap_or(player))
        .bind(to_db(commit.nonce)?)
        .bind(seed_hash.unwrap_or_default())
        .bind(reels_json(commit)?)
        .bind(r.win_tier.as_str())
        .bind(to_db(r.wager_cost)?)
        .bind(to_db(r.payout)?)
        .bind(to_db(r.new_balance)?)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        let record = sqlx::query_as::<_, PlayerRow>(SELECT_PLAYER)
            .bind(player)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?
            .record()?;
        tx.commit().await.map_err(backend)?;
        Ok(record)
    }

    async fn reset_balance(&self, player: &str, amount: u64) -> Result<PlayerRecord, StoreError> {
        let updated = sqlx::query("UPDATE players SET balance = ? WHERE id = ?")
            .bind(to_db(amount)?)
            .bind(player)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(player.to_string()));
        }
        info!(player, amount, "balance reset");
        self.load(player)
            .await?
            .ok_or_else(|| StoreError::NotFound(player.to_string()))
    }
}
