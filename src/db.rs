//! SQLite 接続とマイグレーション
//!
//! マイグレーション SQL はバイナリに埋め込み、`schema_migrations` に適用済みバージョンを記録する。

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

/// DB ファイル名（データディレクトリ直下）
pub const DB_FILE_NAME: &str = "drink_menu.db";

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "create_initial_tables",
    sql: include_str!("../migrations/001_init.sql"),
}];

/// DB ファイルを開き（無ければ作成）、マイグレーションを適用したプールを返す
pub async fn init_database(data_dir: &Path) -> Result<SqlitePool, String> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| format!("Failed to create data directory: {e}"))?;

    let db_path = data_dir.join(DB_FILE_NAME);
    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| format!("Failed to open database: {e}"))?;

    log::info!("Database opened: {}", db_path.display());

    run_migrations(&pool).await?;
    Ok(pool)
}

/// 未適用のマイグレーションを順に適用する
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), String> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY NOT NULL,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| format!("Failed to create schema_migrations: {e}"))?;

    let applied: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_migrations")
        .fetch_all(pool)
        .await
        .map_err(|e| format!("Failed to read schema_migrations: {e}"))?;

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| format!("Failed to start transaction: {e}"))?;

        sqlx::raw_sql(migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                format!(
                    "Failed to apply migration {} ({}): {e}",
                    migration.version, migration.description
                )
            })?;

        sqlx::query("INSERT INTO schema_migrations (version, description) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.description)
            .execute(&mut *tx)
            .await
            .map_err(|e| format!("Failed to record migration: {e}"))?;

        tx.commit()
            .await
            .map_err(|e| format!("Failed to commit migration: {e}"))?;

        log::info!(
            "Applied migration {} ({})",
            migration.version,
            migration.description
        );
    }

    Ok(())
}

/// テスト用のインメモリ DB（マイグレーション適用済み）
#[cfg(test)]
pub(crate) async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}
