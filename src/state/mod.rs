use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod github;
pub mod sqlite;

pub use github::GithubVariables;
pub use sqlite::SqliteStore;

use crate::models::PendingMatch;

/// Value written to mark "no pending match". The GitHub variables API does
/// not accept empty values, so an empty JSON object is used everywhere.
pub const CLEARED_VALUE: &str = "{}";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("state store returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("state store lock poisoned")]
    Poisoned,

    #[error("stored value under {key} is not a valid match record: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode match record: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Durable key/value store scoped to one deployment.
///
/// Last write wins; nothing is assumed to survive between ticks except what
/// is read back at the start of the next one.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Everything persisted under the state key: the pending match, or, once it
/// has been cleared, the ID of the last match whose final score went out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchState {
    pub pending: Option<PendingMatch>,
    pub final_score_sent_for: Option<String>,
}

/// Shape of a cleared value. `{}` is the bare form.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ClearedRecord {
    #[serde(rename = "finalScoreSentFor", default, skip_serializing_if = "Option::is_none")]
    final_score_sent_for: Option<String>,
}

/// Read the state record; absent, blank and `{}` all decode to the default.
pub async fn load_state(store: &dyn StateStore, key: &str) -> Result<MatchState, StoreError> {
    match store.read(key).await? {
        Some(raw) => decode_state(key, &raw),
        None => Ok(MatchState::default()),
    }
}

pub async fn save_pending(
    store: &dyn StateStore,
    key: &str,
    pending: &PendingMatch,
) -> Result<(), StoreError> {
    let value = serde_json::to_string(pending).map_err(StoreError::Encode)?;
    debug!("Writing {} to {}: {}", key, store.name(), value);
    store.write(key, &value).await
}

/// Drop the pending match, remembering `final_score_sent_for` if given.
pub async fn clear_pending(
    store: &dyn StateStore,
    key: &str,
    final_score_sent_for: Option<&str>,
) -> Result<(), StoreError> {
    let value = match final_score_sent_for {
        None => CLEARED_VALUE.to_string(),
        Some(id) => serde_json::to_string(&ClearedRecord {
            final_score_sent_for: Some(id.to_string()),
        })
        .map_err(StoreError::Encode)?,
    };
    debug!("Clearing {} in {}: {}", key, store.name(), value);
    store.write(key, &value).await
}

fn decode_state(key: &str, raw: &str) -> Result<MatchState, StoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == CLEARED_VALUE || trimmed == "null" {
        return Ok(MatchState::default());
    }
    let corrupt = |source: serde_json::Error| StoreError::Corrupt {
        key: key.to_string(),
        source,
    };

    let value: serde_json::Value = serde_json::from_str(trimmed).map_err(corrupt)?;
    if value.get("idEvent").is_some() {
        let pending = serde_json::from_value(value).map_err(corrupt)?;
        return Ok(MatchState {
            pending: Some(pending),
            final_score_sent_for: None,
        });
    }
    let cleared: ClearedRecord = serde_json::from_value(value).map_err(corrupt)?;
    Ok(MatchState {
        pending: None,
        final_score_sent_for: cleared.final_score_sent_for,
    })
}

#[cfg(test)]
pub mod memory {
    //! In-memory store used by the tracker tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryStore {
        values: Mutex<HashMap<String, String>>,
        fail_writes: AtomicBool,
        writes: Mutex<Vec<String>>,
    }

    impl MemoryStore {
        pub fn with(key: &str, value: &str) -> Self {
            let store = MemoryStore::default();
            store
                .values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            store
        }

        pub fn get(&self, key: &str) -> Option<String> {
            self.values.lock().unwrap().get(key).cloned()
        }

        pub fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        pub fn write_count(&self) -> usize {
            self.writes.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl StateStore for MemoryStore {
        async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
            Ok(self.get(key))
        }

        async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Status {
                    status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                    body: "store unavailable".into(),
                });
            }
            self.writes.lock().unwrap().push(value.to_string());
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn name(&self) -> &str {
            "memory"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;

    const KEY: &str = "NEXT_MATCH_INFO";

    #[tokio::test]
    async fn cleared_and_missing_values_decode_to_none() {
        for raw in ["", "  ", "{}", "null"] {
            let store = MemoryStore::with(KEY, raw);
            assert!(load_state(&store, KEY).await.unwrap().pending.is_none(), "{:?}", raw);
        }
        assert!(load_state(&MemoryStore::default(), KEY).await.unwrap().pending.is_none());
    }

    #[tokio::test]
    async fn garbage_is_reported_not_discarded() {
        let store = MemoryStore::with(KEY, "not json");
        let err = load_state(&store, KEY).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn save_then_load_keeps_schedule() {
        let store = MemoryStore::default();
        let pending: PendingMatch = serde_json::from_str(
            r#"{"idEvent":"1","dateEvent":"2024-05-01","strTime":"18:00:00","strEvent":"Juventus vs Inter"}"#,
        )
        .unwrap();

        save_pending(&store, KEY, &pending).await.unwrap();
        let loaded = load_state(&store, KEY).await.unwrap().pending.unwrap();
        assert_eq!(loaded.id, "1");
        assert_eq!(loaded.date, pending.date);
        assert_eq!(loaded.time, pending.time);

        clear_pending(&store, KEY, None).await.unwrap();
        assert_eq!(store.get(KEY).as_deref(), Some(CLEARED_VALUE));
        assert!(load_state(&store, KEY).await.unwrap().pending.is_none());
    }

    #[tokio::test]
    async fn cleared_value_remembers_reported_match() {
        let store = MemoryStore::default();
        clear_pending(&store, KEY, Some("1")).await.unwrap();
        assert_eq!(
            store.get(KEY).as_deref(),
            Some(r#"{"finalScoreSentFor":"1"}"#)
        );

        let state = load_state(&store, KEY).await.unwrap();
        assert!(state.pending.is_none());
        assert_eq!(state.final_score_sent_for.as_deref(), Some("1"));
        assert!(load_state(&store, KEY).await.unwrap().pending.is_none());
    }

    #[tokio::test]
    async fn pending_record_missing_fields_is_corrupt() {
        let store = MemoryStore::with(KEY, r#"{"idEvent":"1"}"#);
        let err = load_state(&store, KEY).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
