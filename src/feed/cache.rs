use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::feed::period::CachePeriod;
use crate::storage::KeyValueStore;
use crate::types::ReportKind;

const KEY_ROOT: &str = "risks";

/// Every cache key for `kind` starts with this.
pub fn key_prefix(kind: ReportKind) -> String {
    format!("{KEY_ROOT}:{kind}:")
}

pub fn cache_key(kind: ReportKind, period: &CachePeriod) -> String {
    format!("{}{}", key_prefix(kind), period.to_key())
}

/// A cache key broken back into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeyInfo {
    pub key: String,
    pub kind: ReportKind,
    pub period: CachePeriod,
}

impl CacheKeyInfo {
    /// Returns true if `kind` would no longer read this entry today.
    pub fn is_stale(&self, today: NaiveDate) -> bool {
        !self.period.is_current_for(self.kind, today)
    }
}

/// Parse `risks:<kind>:<period>`. Keys of any other shape return `None`.
pub fn parse_cache_key(key: &str) -> Option<CacheKeyInfo> {
    let mut parts = key.splitn(3, ':');
    if parts.next()? != KEY_ROOT {
        return None;
    }
    let kind: ReportKind = parts.next()?.parse().ok()?;
    let period = CachePeriod::parse(parts.next()?).ok()?;
    Some(CacheKeyInfo {
        key: key.to_string(),
        kind,
        period,
    })
}

/// Read and decode one entry. Undecodable content is reported as
/// `Error::CacheCorruption` and left in place for the caller to remove.
pub async fn read_entry<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| Error::CacheCorruption {
            key: key.to_string(),
            message: e.to_string(),
        })
}

/// Write `value` under `key`, then delete every other key sharing `kind`'s
/// prefix. Returns how many stale keys were removed.
pub async fn write_entry<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    kind: ReportKind,
    key: &str,
    value: &T,
) -> Result<usize> {
    let json = serde_json::to_string(value).map_err(|e| Error::Other(e.to_string()))?;
    store.set(key, &json).await?;
    log::info!("Cached {kind} report under {key}");
    remove_others(store, kind, Some(key)).await
}

/// Remove every key of `kind` except `keep`.
pub async fn remove_others(
    store: &dyn KeyValueStore,
    kind: ReportKind,
    keep: Option<&str>,
) -> Result<usize> {
    let prefix = key_prefix(kind);
    let mut removed = 0;
    for k in store.list_keys().await? {
        if k.starts_with(&prefix) && Some(k.as_str()) != keep {
            log::debug!("Removing stale cache entry {k}");
            store.remove(&k).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Every report cache entry currently stored.
pub async fn list_entries(store: &dyn KeyValueStore) -> Result<Vec<CacheKeyInfo>> {
    Ok(store
        .list_keys()
        .await?
        .iter()
        .filter_map(|k| parse_cache_key(k))
        .collect())
}

/// Remove cached entries for one kind, or for all kinds.
pub async fn clear(store: &dyn KeyValueStore, kind: Option<ReportKind>) -> Result<usize> {
    let kinds = match kind {
        Some(k) => vec![k],
        None => ReportKind::ALL.to_vec(),
    };
    let mut removed = 0;
    for k in kinds {
        removed += remove_others(store, k, None).await?;
    }
    log::info!("Removed {removed} cache entries");
    Ok(removed)
}

/// The newest key of `kind` other than `exclude`, by period order.
pub async fn latest_key(
    store: &dyn KeyValueStore,
    kind: ReportKind,
    exclude: &str,
) -> Result<Option<String>> {
    let prefix = key_prefix(kind);
    Ok(store
        .list_keys()
        .await?
        .into_iter()
        .filter(|k| k.starts_with(&prefix) && k != exclude)
        .max())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_keys() {
        let key = cache_key(ReportKind::Weekly, &CachePeriod::Week(2025, 3));
        assert_eq!(key, "risks:weekly:2025-W03");
        let info = parse_cache_key(&key).unwrap();
        assert_eq!(info.kind, ReportKind::Weekly);
        assert_eq!(info.period, CachePeriod::Week(2025, 3));
        assert!(parse_cache_key("other:weekly:2025-W03").is_none());
        assert!(parse_cache_key("risks:hourly:2025").is_none());
        assert!(parse_cache_key("risks:weekly").is_none());
    }

    #[test]
    fn test_is_stale() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        assert!(parse_cache_key("risks:cyber:2025").unwrap().is_stale(today));
        assert!(!parse_cache_key("risks:cyber:2026").unwrap().is_stale(today));
    }

    #[tokio::test]
    async fn test_write_removes_other_periods_of_same_kind() {
        let store = MemoryStore::new();
        store.set("risks:weekly:2025-W01", "[]").await.unwrap();
        store.set("risks:weekly:2025-W02", "[]").await.unwrap();
        store.set("risks:monthly:2025-01", "[]").await.unwrap();
        store.set("unrelated", "x").await.unwrap();

        let removed = write_entry(&store, ReportKind::Weekly, "risks:weekly:2025-W03", &[1, 2])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            store.list_keys().await.unwrap(),
            vec!["risks:monthly:2025-01", "risks:weekly:2025-W03", "unrelated"]
        );
        assert_eq!(
            store.get("risks:weekly:2025-W03").await.unwrap().as_deref(),
            Some("[1,2]")
        );
    }

    #[tokio::test]
    async fn test_read_entry_corrupt() {
        let store = MemoryStore::new();
        store.set("k", "{not json").await.unwrap();
        let err = read_entry::<Vec<String>>(&store, "k").await.unwrap_err();
        assert!(matches!(err, Error::CacheCorruption { .. }));
        assert!(read_entry::<Vec<String>>(&store, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_key() {
        let store = MemoryStore::new();
        store.set("risks:daily:2025-03-01", "{}").await.unwrap();
        store.set("risks:daily:2025-03-03", "{}").await.unwrap();
        store.set("risks:daily:2025-03-04", "{}").await.unwrap();
        let latest = latest_key(&store, ReportKind::Daily, "risks:daily:2025-03-04")
            .await
            .unwrap();
        assert_eq!(latest.as_deref(), Some("risks:daily:2025-03-03"));
    }

    #[tokio::test]
    async fn test_list_and_clear() {
        let store = MemoryStore::new();
        store.set("risks:weekly:2025-W10", "[]").await.unwrap();
        store.set("risks:fraud:2025", "[]").await.unwrap();
        store.set("risks:fraud:2024", "[]").await.unwrap();
        store.set("something-else", "x").await.unwrap();

        assert_eq!(list_entries(&store).await.unwrap().len(), 3);
        assert_eq!(clear(&store, Some(ReportKind::Fraud)).await.unwrap(), 2);
        assert_eq!(list_entries(&store).await.unwrap().len(), 1);
        assert_eq!(clear(&store, None).await.unwrap(), 1);
        assert_eq!(store.list_keys().await.unwrap(), vec!["something-else"]);
    }
}
