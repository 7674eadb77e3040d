use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{ConnectOptions, Connection};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Layer query over the seeded `places` table.
#[allow(dead_code)]
pub const PLACES_SQL: &str = "select i, n, name, score from places";

/// Create `places.db` in `dir` with a writable connection.
///
/// Ids 1 and 3 are unique; id 2 appears twice.
pub async fn seeded_database(dir: &Path) -> PathBuf {
    let path = dir.join("places.db");
    let mut conn = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
        .unwrap()
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete)
        .connect()
        .await
        .unwrap();

    sqlx::query(
        r#"
        CREATE TABLE places (i INTEGER NOT NULL, n INTEGER, name TEXT, score REAL);
        INSERT INTO places (i, n, name, score) VALUES
            (1, 6, 'one', 0.5),
            (2, 7, 'two', NULL),
            (2, 8, 'deux', 1.25),
            (3, 9, NULL, 2.0);
        "#,
    )
    .execute(&mut conn)
    .await
    .unwrap();

    conn.close().await.unwrap();
    path
}
