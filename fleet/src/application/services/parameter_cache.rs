//! Application service: TTL cache over the remote secret store.
//!
//! One mutex guards the whole map and is held across remote calls, so
//! concurrent lookups of the same key never fetch twice.
//!
//! Lookup rules:
//! - no entry: full fetch
//! - entry not yet expired: cached value, no remote call
//! - expired, no known modification time: full fetch
//! - expired, known modification time: metadata call first; an unchanged
//!   store only extends the TTL, a newer one triggers a full fetch

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::application::ports::SecretStore;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
    last_modified: Option<DateTime<Utc>>,
}

pub struct ParameterCache {
    store: Arc<dyn SecretStore>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ParameterCache {
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current value of `key`, decrypted when `encrypted` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if a required full fetch fails. A failed metadata
    /// call is not an error; it falls back to a full fetch.
    pub async fn get_key(&self, key: &str, encrypted: bool) -> Result<String> {
        let mut entries = self.entries.lock().await;

        let Some((value, expires_at, cached_modified)) = entries
            .get(key)
            .map(|e| (e.value.clone(), e.expires_at, e.last_modified))
        else {
            return self.refresh(&mut entries, key, encrypted).await;
        };

        if Instant::now() < expires_at {
            return Ok(value);
        }

        let Some(cached_modified) = cached_modified else {
            tracing::debug!(key, "cache entry expired without modification time");
            return self.refresh(&mut entries, key, encrypted).await;
        };

        match self.store.describe_parameter(key).await {
            Ok(Some(remote)) if remote <= cached_modified => {
                if let Some(entry) = entries.get_mut(key) {
                    entry.expires_at = Instant::now() + self.ttl;
                }
                tracing::debug!(key, "parameter unchanged, cache entry extended");
                return Ok(value);
            }
            Ok(Some(remote)) => {
                tracing::debug!(key, %remote, cached = %cached_modified, "parameter changed");
            }
            Ok(None) => {
                tracing::debug!(key, "store reported no modification time");
            }
            Err(err) => {
                tracing::warn!(key, error = %format!("{err:#}"), "metadata lookup failed, refetching");
            }
        }

        self.refresh(&mut entries, key, encrypted).await
    }

    /// Write `value` through to the store, then refresh the local entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails, leaving the cache untouched, or
    /// if the refresh after a successful write fails, evicting the entry.
    pub async fn put_key(&self, key: &str, value: &str, encrypted: bool) -> Result<()> {
        let mut entries = self.entries.lock().await;

        self.store
            .put_parameter(key, value, encrypted)
            .await
            .with_context(|| format!("failed to store parameter {key}"))?;

        if let Err(err) = self.refresh(&mut entries, key, encrypted).await {
            entries.remove(key);
            return Err(err.context(format!("stored parameter {key} but failed to reload it")));
        }
        Ok(())
    }

    async fn refresh(
        &self,
        entries: &mut HashMap<String, CacheEntry>,
        key: &str,
        encrypted: bool,
    ) -> Result<String> {
        let param = self
            .store
            .get_parameter(key, encrypted)
            .await
            .with_context(|| format!("failed to retrieve parameter {key}"))?;

        entries.insert(
            key.to_string(),
            CacheEntry {
                value: param.value.clone(),
                expires_at: Instant::now() + self.ttl,
                last_modified: param.last_modified,
            },
        );
        tracing::debug!(key, "parameter refreshed from store");
        Ok(param.value)
    }
}
