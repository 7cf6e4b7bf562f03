use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Error;

/// How long a writer waits on SQLite's write lock before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a SQLite connection pool
///
/// # Parameters
/// - `database_url`: SQLite connection string
///   Format: sqlite://PATH/TO/FILE.db
/// - `max_connections`: upper bound on pooled connections
///
/// The file is created if missing and opened in write-ahead-log mode so
/// readers never block the single writer.
pub async fn get_connection(database_url: &str, max_connections: u32) -> Result<SqlitePool, Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
}
