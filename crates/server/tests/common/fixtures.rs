//! Test fixtures: seeded layer data, configurations and templates.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{ConnectOptions, Connection};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Master key whose SHA-256 is configured by `AppConfig::for_testing()`.
#[allow(dead_code)]
pub const MASTER_KEY: &str = "test-master-key";

/// Layer query over the seeded `places` table.
#[allow(dead_code)]
pub const PLACES_SQL: &str = "select i, n, name, score from places";

/// Create `places.db` in `dir` with a writable connection.
///
/// Ids 1 and 3 are unique; id 2 appears twice.
#[allow(dead_code)]
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

/// Count rows in `places`, through a fresh writable connection.
#[allow(dead_code)]
pub async fn count_places(path: &Path) -> i64 {
    let mut conn = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
        .unwrap()
        .connect()
        .await
        .unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM places")
        .fetch_one(&mut conn)
        .await
        .unwrap();
    conn.close().await.unwrap();
    count
}

/// Two layers over `places`; layer 1 exposes `n` and `name` keyed by `i`.
#[allow(dead_code)]
pub fn places_config() -> Value {
    json!({
        "version": "1.0.0",
        "layers": [
            {
                "type": "mapnik",
                "options": { "sql": PLACES_SQL, "cartocss": "#places { marker-width: 4; }", "cartocss_version": "2.0.1" }
            },
            {
                "type": "mapnik",
                "options": {
                    "sql": PLACES_SQL,
                    "cartocss": "#places { marker-width: 8; }",
                    "cartocss_version": "2.0.1",
                    "attributes": { "id": "i", "columns": ["n", "name"] }
                }
            }
        ]
    })
}

/// A template over `places` with a `color` (css_color) and a `min_n`
/// (number, default 7) placeholder.
#[allow(dead_code)]
pub fn places_template(name: &str) -> Value {
    json!({
        "version": "0.0.1",
        "name": name,
        "auth": { "method": "open" },
        "placeholders": {
            "color": { "type": "css_color", "default": "red" },
            "min_n": { "type": "number", "default": 7 }
        },
        "layergroup": {
            "version": "1.0.0",
            "layers": [{
                "type": "mapnik",
                "options": {
                    "sql": "select i, n, name from places where n >= <%= min_n %>",
                    "cartocss": "#places { marker-fill: <%= color %>; }",
                    "cartocss_version": "2.0.1",
                    "attributes": { "id": "i", "columns": ["n"] }
                }
            }]
        }
    })
}

/// `Authorization: Basic` header value for `user:token`.
#[allow(dead_code)]
pub fn basic_auth(user: &str, token: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{token}")))
}
