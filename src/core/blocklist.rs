//! Active IP blocks with absolute expiry.
//!
//! Entries whose expiry has passed are treated as absent on every read;
//! the housekeeper physically removes them. Automatic blocks never extend
//! an active entry, so repeat offenses inside the block window do not
//! reset the clock.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// One active (or expired-but-unswept) block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEntry {
    pub ip: String,
    /// Absolute expiry; `until <= now` means logically absent
    pub until: DateTime<Utc>,
    pub reason: String,
}

/// Block entry as reported to operators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedIpView {
    pub ip: String,
    pub until: DateTime<Utc>,
    pub reason: String,
    /// Seconds until expiry
    pub remaining_seconds: i64,
}

/// Mapping from IP address to its active block
pub struct BlockRegistry {
    entries: RwLock<HashMap<String, BlockEntry>>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Whether `ip` has an unexpired block
    pub async fn is_blocked(&self, ip: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .read()
            .await
            .get(ip)
            .is_some_and(|entry| entry.until > now)
    }

    /// Insert or replace a block (operator call)
    pub async fn block(&self, ip: &str, reason: &str, duration: Duration, now: DateTime<Utc>) {
        let entry = BlockEntry {
            ip: ip.to_string(),
            until: now + duration,
            reason: reason.to_string(),
        };
        self.entries.write().await.insert(ip.to_string(), entry);
    }

    /// Insert a block only if no active one exists.
    ///
    /// Returns true when a new entry was created.
    pub async fn auto_block(
        &self,
        ip: &str,
        reason: &str,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        let mut entries = self.entries.write().await;
        if entries.get(ip).is_some_and(|entry| entry.until > now) {
            return false;
        }
        entries.insert(
            ip.to_string(),
            BlockEntry {
                ip: ip.to_string(),
                until: now + duration,
                reason: reason.to_string(),
            },
        );
        true
    }

    /// Remove any block for `ip`. Returns true when one existed.
    pub async fn unblock(&self, ip: &str) -> bool {
        self.entries.write().await.remove(ip).is_some()
    }

    /// Active blocks, skipping logically expired entries
    pub async fn list(&self, now: DateTime<Utc>) -> Vec<BlockedIpView> {
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.until > now)
            .map(|entry| BlockedIpView {
                ip: entry.ip.clone(),
                until: entry.until,
                reason: entry.reason.clone(),
                remaining_seconds: (entry.until - now).num_seconds(),
            })
            .collect()
    }

    /// Number of active blocks
    pub async fn active_count(&self, now: DateTime<Utc>) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.until > now)
            .count()
    }

    /// Physically remove expired entries. Returns the number removed.
    pub async fn expire(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.until > now);
        before - entries.len()
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
