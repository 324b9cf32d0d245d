use std::path::{Path, PathBuf};

use sqlx::SqlitePool;

use fruitslot_server::db;

/// On-disk database in the temp dir, removed again on drop.
pub struct TempDb {
    path: PathBuf,
    pub pool: SqlitePool,
}

impl TempDb {
    pub async fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!("fruitslot-{name}-{}.db", std::process::id()));
        remove_files(&path);
        let pool = db::connect(&format!("sqlite://{}?mode=rwc", path.display()))
            .await
            .unwrap();
        db::init_db(&pool).await.unwrap();
        Self { path, pool }
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        remove_files(&self.path);
    }
}

fn remove_files(path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
}
