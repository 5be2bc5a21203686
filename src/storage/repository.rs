use rusqlite::{params, Connection, OptionalExtension};

// ── Cache entries ──────────────────────────────────────────────────

pub fn get_cache_entry(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM cache_entries WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_cache_entry(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO cache_entries (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

/// Returns true if a row was removed.
pub fn delete_cache_entry(conn: &Connection, key: &str) -> Result<bool, rusqlite::Error> {
    let n = conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
    Ok(n > 0)
}

pub fn list_cache_keys(conn: &Connection) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key FROM cache_entries ORDER BY key")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect()
}

/// A cache row without its payload.
#[derive(Debug, Clone)]
pub struct CacheEntryInfo {
    pub key: String,
    pub bytes: i64,
    pub updated_at: String,
}

pub fn list_cache_entries(conn: &Connection) -> Result<Vec<CacheEntryInfo>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT key, LENGTH(value), updated_at FROM cache_entries ORDER BY key",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(CacheEntryInfo {
            key: row.get(0)?,
            bytes: row.get(1)?,
            updated_at: row.get(2)?,
        })
    })?;
    rows.collect()
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[tokio::test]
    async fn test_config_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                set_config(conn, "llm_provider", "gemini")?;
                let val = get_config(conn, "llm_provider")?;
                assert_eq!(val, Some("gemini".to_string()));

                let missing = get_config(conn, "nonexistent")?;
                assert_eq!(missing, None);

                set_config(conn, "llm_model", "gemini-2.5-pro")?;
                let all = list_config(conn)?;
                assert_eq!(all.len(), 2);
                assert_eq!(all[0].0, "llm_model");
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cache_entry_crud() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                assert_eq!(get_cache_entry(conn, "risks:weekly:2025-W10")?, None);

                set_cache_entry(conn, "risks:weekly:2025-W10", "[1]")?;
                set_cache_entry(conn, "risks:weekly:2025-W10", "[2]")?;
                assert_eq!(
                    get_cache_entry(conn, "risks:weekly:2025-W10")?,
                    Some("[2]".to_string())
                );

                set_cache_entry(conn, "risks:fraud:2025", "[]")?;
                assert_eq!(
                    list_cache_keys(conn)?,
                    vec!["risks:fraud:2025".to_string(), "risks:weekly:2025-W10".to_string()]
                );

                let info = list_cache_entries(conn)?;
                assert_eq!(info[1].bytes, 3);

                assert!(delete_cache_entry(conn, "risks:fraud:2025")?);
                assert!(!delete_cache_entry(conn, "risks:fraud:2025")?);
                assert_eq!(list_cache_keys(conn)?.len(), 1);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }
}
