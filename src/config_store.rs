use std::path::Path;

use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use diesel::sqlite::SqliteConnection;
use serde_json::Value;

use crate::config::Config;
use crate::error::{Result, TrackerError};

#[derive(QueryableByName)]
struct ConfigRow {
    #[diesel(sql_type = Text)]
    config_json: String,
}

pub fn ensure_parent_dir(path: &str) -> Result<()> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TrackerError::Runtime(e.to_string()))?;
    }
    Ok(())
}

fn open_conn(db_path: &str) -> Result<SqliteConnection> {
    SqliteConnection::establish(db_path).map_err(|e| TrackerError::Runtime(e.to_string()))
}

fn ensure_table(conn: &mut SqliteConnection) -> Result<()> {
    diesel::sql_query(
        "CREATE TABLE IF NOT EXISTS app_config (
            id INTEGER PRIMARY KEY,
            config_json TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )",
    )
    .execute(conn)
    .map_err(|e| TrackerError::Runtime(e.to_string()))?;
    Ok(())
}

pub fn load_config(db_path: &str) -> Result<Config> {
    ensure_parent_dir(db_path)?;
    let mut conn = open_conn(db_path)?;
    ensure_table(&mut conn)?;

    let row: ConfigRow = diesel::sql_query("SELECT config_json FROM app_config WHERE id = 1")
        .get_result(&mut conn)
        .map_err(|e| TrackerError::Config(e.to_string()))?;

    let value: Value =
        serde_json::from_str(&row.config_json).map_err(|e| TrackerError::Config(e.to_string()))?;
    let config: Config =
        serde_json::from_value(value).map_err(|e| TrackerError::Config(e.to_string()))?;
    Ok(config)
}

pub fn save_config(db_path: &str, config: &Config) -> Result<()> {
    ensure_parent_dir(db_path)?;
    let mut conn = open_conn(db_path)?;
    ensure_table(&mut conn)?;

    let config_json =
        serde_json::to_string(config).map_err(|e| TrackerError::Serialization(e.to_string()))?;

    diesel::sql_query(
        "INSERT INTO app_config (id, config_json, updated_at)
         VALUES (1, ?1, ?2)
         ON CONFLICT(id) DO UPDATE SET config_json = excluded.config_json,
         updated_at = excluded.updated_at",
    )
    .bind::<Text, _>(config_json)
    .bind::<BigInt, _>(crate::db::now_ts())
    .execute(&mut conn)
    .map_err(|e| TrackerError::Runtime(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, YouTubeConfig};

    #[test]
    fn save_then_load_returns_stored_config() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        assert!(load_config(path).is_err());

        let config = Config {
            youtube: Some(YouTubeConfig {
                api_key: Some("yt-key".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        save_config(path, &config).unwrap();

        let loaded = load_config(path).unwrap();
        assert_eq!(
            loaded.youtube.and_then(|y| y.api_key).as_deref(),
            Some("yt-key")
        );
    }
}
