//! Common test utilities for integration tests

#![allow(dead_code)]

use serde_json::json;
use statuscache::{Page, Record, StatusCache, config};
use tempfile::TempDir;

/// Test cache instance backed by a temporary database file
pub struct TestCache {
    pub cache: StatusCache,
    pub _temp_dir: TempDir,
}

impl TestCache {
    /// Create a cache with default settings
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a cache after adjusting the default configuration
    pub async fn with_config(adjust: impl FnOnce(&mut config::AppConfig)) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config::AppConfig::for_database(temp_dir.path().join("status.db"));
        adjust(&mut config);

        let cache = StatusCache::open(config).await.unwrap();
        Self {
            cache,
            _temp_dir: temp_dir,
        }
    }

    /// Create a cache whose schema refuses to store one status identifier
    pub async fn rejecting_status_id(status_id: i64) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let schema_path = temp_dir.path().join("status.sql");
        std::fs::write(
            &schema_path,
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS T_Status (
                    status_id   TEXT NOT NULL CHECK (status_id <> '{status_id}'),
                    owner_id    TEXT NOT NULL,
                    payload     BLOB NOT NULL,
                    created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (status_id, owner_id)
                );
                "#
            ),
        )
        .unwrap();

        let mut config = config::AppConfig::for_database(temp_dir.path().join("status.db"));
        config.database.schema_path = Some(schema_path);

        let cache = StatusCache::open(config).await.unwrap();
        Self {
            cache,
            _temp_dir: temp_dir,
        }
    }
}

/// A status record with identifier `id`
pub fn status(id: i64) -> Record {
    status_with_text(id, &format!("status {id}"))
}

/// A status record with identifier `id` and body `text`
pub fn status_with_text(id: i64, text: &str) -> Record {
    json!({
        "idstr": id.to_string(),
        "id": id,
        "text": text,
        "user": { "screen_name": "someone" },
    })
    .as_object()
    .cloned()
    .unwrap()
}

/// Statuses for every identifier in `ids`
pub fn statuses(ids: impl IntoIterator<Item = i64>) -> Vec<Record> {
    ids.into_iter().map(status).collect()
}

/// Identifiers of a page, in page order
pub fn ids(page: &Page) -> Vec<i64> {
    page.records
        .iter()
        .map(|record| record["idstr"].as_str().unwrap().parse().unwrap())
        .collect()
}
