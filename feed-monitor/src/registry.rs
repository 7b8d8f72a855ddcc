use crate::query::build_query;
use crate::types::{SUBREDDIT_DELIMITER, THREAD_DELIMITER};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Set of monitored names and the query string derived from it.
///
/// Unmonitoring a name flips its flag to `false` instead of removing the
/// entry, so the query is always a fold over a stable key set. The cached
/// query is rebuilt under the same write lock as every mutation and is never
/// out of step with the flags.
pub struct TargetRegistry {
    label: &'static str,
    delimiter: &'static str,
    state: RwLock<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    names: HashMap<String, bool>,
    query: String,
}

impl TargetRegistry {
    pub fn new(label: &'static str, delimiter: &'static str) -> Self {
        Self {
            label,
            delimiter,
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Registry of broad sources, joined as a multireddit (`news+tech`).
    pub fn subreddits() -> Self {
        Self::new("subreddits", SUBREDDIT_DELIMITER)
    }

    /// Registry of watched threads, joined as a fullname list.
    pub fn threads() -> Self {
        Self::new("threads", THREAD_DELIMITER)
    }

    pub fn delimiter(&self) -> &'static str {
        self.delimiter
    }

    /// Start monitoring `names`.
    pub async fn add<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_keys(true, names).await;
    }

    /// Stop monitoring `names`. Names that were never added are recorded as
    /// tombstones and leave the query unchanged.
    pub async fn remove<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_keys(false, names).await;
    }

    /// Current query string; empty when nothing is monitored.
    pub async fn query(&self) -> String {
        self.state.read().await.query.clone()
    }

    pub async fn is_monitored(&self, name: &str) -> bool {
        let state = self.state.read().await;
        state.names.get(name).copied().unwrap_or(false)
    }

    /// Drop tombstoned entries. Returns how many were removed.
    pub async fn compact(&self) -> usize {
        let mut state = self.state.write().await;
        let before = state.names.len();
        state.names.retain(|_, include| *include);
        let removed = before - state.names.len();
        if removed > 0 {
            debug!("Compacted {} tombstones from {} registry", removed, self.label);
        }
        removed
    }

    async fn set_keys<I, S>(&self, val: bool, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state.write().await;
        for key in keys {
            state.names.insert(key.into(), val);
        }
        state.query = build_query(&state.names, self.delimiter);
        debug!("Rebuilt {} query: {:?}", self.label, state.query);
    }
}
