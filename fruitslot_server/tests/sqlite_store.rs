mod common;

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tokio::task::JoinSet;

use fruitslot_core::{
    derive_hash_hex, resolve_spin, BalanceStore, PayoutTable, PlayerRecord, ReelState, SpinCommit,
    StoreError, Symbol, WinTier,
};
use fruitslot_server::{db, SqliteStore};

async fn memory_pool() -> SqlitePool {
    // one connection, otherwise every connection sees its own empty database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::init_db(&pool).await.unwrap();
    pool
}

fn commit_for(record: &PlayerRecord, reels: ReelState) -> SpinCommit {
    let result = resolve_spin(record.balance, 50, &PayoutTable::default(), reels).unwrap();
    SpinCommit {
        nonce: record.next_nonce(),
        result,
        client_seed: Some("client".into()),
    }
}

#[tokio::test]
async fn init_generates_seed() {
    let pool = memory_pool().await;
    let params = db::get_params(&pool).await.unwrap();
    assert_eq!(params.server_seed.len(), 64);
    assert_eq!(params.server_seed_hash, derive_hash_hex(params.server_seed.as_bytes()));
    assert_eq!(params.engine.wager_cost, 50);
    assert_eq!(params.engine.payouts, PayoutTable::default());

    // a second start keeps the seed
    let again = db::init_db(&pool).await.unwrap();
    assert_eq!(again, params);
}

#[tokio::test]
async fn rotate_seed_updates_hash() {
    let pool = memory_pool().await;
    let hash = db::rotate_seed(&pool, "fresh".into()).await.unwrap();
    assert_eq!(hash, derive_hash_hex(b"fresh"));
    assert_eq!(db::get_params(&pool).await.unwrap().server_seed, "fresh");
}

#[tokio::test]
async fn load_or_init_creates_default_record() {
    let store = SqliteStore::new(memory_pool().await);
    assert_eq!(store.load("p").await.unwrap(), None);
    assert_eq!(store.load_or_init("p").await.unwrap(), PlayerRecord::new(1000));
    assert!(store.load("p").await.unwrap().is_some());
}

#[tokio::test]
async fn commit_updates_record_and_logs_spin() {
    let pool = memory_pool().await;
    let store = SqliteStore::new(pool.clone());
    let record = store.register("p", 1000).await.unwrap();
    let commit = commit_for(&record, ReelState::new(Symbol::Seven, Symbol::Seven, Symbol::Seven));

    let stored = store.commit("p", &commit).await.unwrap();
    assert_eq!(stored.balance, 1450);
    assert_eq!(stored.stats.money_lost, 50);
    assert_eq!(stored.stats.money_gained, 500);
    assert_eq!(stored.stats.games_played, 1);

    let logs = db::recent_spins(&pool, 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].player_id, "p");
    assert_eq!(logs[0].client_seed, "client");
    assert_eq!(logs[0].nonce, 1);
    assert_eq!(logs[0].result_reels, vec![1, 1, 1]);
    assert_eq!(logs[0].win_tier, WinTier::Triple);
    assert_eq!(logs[0].payout, 500);
}

#[tokio::test]
async fn recommit_is_a_no_op() {
    let pool = memory_pool().await;
    let store = SqliteStore::new(pool.clone());
    let record = store.register("p", 1000).await.unwrap();
    let commit = commit_for(&record, ReelState::new(Symbol::Banana, Symbol::Seven, Symbol::Plum));

    let first = store.commit("p", &commit).await.unwrap();
    let second = store.commit("p", &commit).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(second.balance, 950);
    assert_eq!(db::all_spins(&pool).await.unwrap().len(), 1);
}

#[tokio::test]
async fn mismatched_recommit_conflicts() {
    let store = SqliteStore::new(memory_pool().await);
    let record = store.register("p", 1000).await.unwrap();
    let commit = commit_for(&record, ReelState::new(Symbol::Banana, Symbol::Seven, Symbol::Plum));
    store.commit("p", &commit).await.unwrap();

    let mut forged = commit.clone();
    forged.result.payout = 500;
    forged.result.new_balance = 1450;
    assert!(matches!(
        store.commit("p", &forged).await,
        Err(StoreError::Conflict { .. })
    ));

    let skipped = SpinCommit { nonce: 5, ..commit };
    assert!(matches!(
        store.commit("p", &skipped).await,
        Err(StoreError::Conflict { expected: 2, got: 5, .. })
    ));
}

#[tokio::test]
async fn reset_keeps_stats() {
    let store = SqliteStore::new(memory_pool().await);
    let record = store.register("p", 1000).await.unwrap();
    let commit = commit_for(&record, ReelState::new(Symbol::Bar, Symbol::Bar, Symbol::Lemon));
    let stored = store.commit("p", &commit).await.unwrap();

    let reset = store.reset_balance("p", 1000).await.unwrap();
    assert_eq!(reset.balance, 1000);
    assert_eq!(reset.stats, stored.stats);
}

#[tokio::test]
async fn unknown_player_errors() {
    let store = SqliteStore::new(memory_pool().await);
    assert!(matches!(
        store.reset_balance("ghost", 1000).await,
        Err(StoreError::NotFound(_))
    ));
    let commit = commit_for(&PlayerRecord::new(1000), ReelState::default());
    assert!(matches!(
        store.commit("ghost", &commit).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commits_for_different_players_all_land() {
    let temp = common::TempDb::new("store-commits").await;
    let store = SqliteStore::new(temp.pool.clone());
    let players: Vec<String> = (0..8).map(|i| format!("player-{i}")).collect();
    for p in &players {
        store.register(p, 1000).await.unwrap();
    }

    for _ in 0..20 {
        let mut tasks = JoinSet::new();
        for p in players.iter().cloned() {
            let store = store.clone();
            tasks.spawn(async move {
                let record = store.load(&p).await.unwrap().unwrap();
                let commit =
                    commit_for(&record, ReelState::new(Symbol::Banana, Symbol::Seven, Symbol::Plum));
                store.commit(&p, &commit).await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap().unwrap();
        }
    }

    for p in &players {
        let record = store.load(p).await.unwrap().unwrap();
        assert_eq!(record.stats.games_played, 20);
        assert_eq!(record.stats.money_lost, 1000);
        assert_eq!(record.balance, 0);
    }
    assert_eq!(db::all_spins(&temp.pool).await.unwrap().len(), 160);
}

#[tokio::test]
async fn file_backed_replay_and_stale_nonce() {
    let temp = common::TempDb::new("store-replay").await;
    let store = SqliteStore::new(temp.pool.clone());
    let record = store.register("p", 1000).await.unwrap();
    let commit = commit_for(&record, ReelState::new(Symbol::Cherry, Symbol::Cherry, Symbol::Bell));

    let first = store.commit("p", &commit).await.unwrap();
    assert_eq!(first.balance, 1050);
    assert_eq!(store.commit("p", &commit).await.unwrap(), first);

    let zero = SpinCommit { nonce: 0, ..commit };
    assert!(matches!(
        store.commit("p", &zero).await,
        Err(StoreError::Conflict { expected: 2, got: 0, .. })
    ));
    assert_eq!(db::all_spins(&temp.pool).await.unwrap().len(), 1);
}
