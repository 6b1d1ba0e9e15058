use crate::err_from;
use crate::error::TrackerError;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

static MIGRATOR: Migrator = sqlx::migrate!();

/// `None` opens a private in-memory database, pinned to a single connection
/// so that every caller sees the same data.
pub async fn create_sqlite_connection(
    file_name: Option<&str>,
    run_migrations: bool,
) -> Result<SqlitePool, TrackerError> {
    let (url, max_connections) = if let Some(file_name) = file_name {
        (format!("sqlite://{}", file_name), 5)
    } else {
        ("sqlite::memory:".to_string(), 1)
    };

    let mut options = SqliteConnectOptions::from_str(&url)
        .map_err(err_from!())?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(10));
    if file_name.is_some() {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(err_from!())?;

    if run_migrations {
        MIGRATOR.run(&pool).await.map_err(err_from!())?;
    }

    Ok(pool)
}
