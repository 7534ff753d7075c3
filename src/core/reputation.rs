//! IP reputation lookup and caching.
//!
//! Records come from an external reputation source behind the
//! `ReputationProvider` trait and are memoized with a TTL. The lookup is
//! the only network I/O on the request path, so it runs under a short
//! timeout and fails open: on any error the neutral "clean" record is
//! returned uncached and the request is never blocked for it.

use crate::core::ThreatKind;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Score at and above which an IP is considered clean by default
pub const NEUTRAL_SCORE: u8 = 75;

/// Errors that can occur during reputation lookups
#[derive(Error, Debug)]
pub enum ReputationError {
    #[error("lookup request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Geographic attribution of an IP
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoInfo {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub isp: Option<String>,
    pub org: Option<String>,
}

/// Behavioral profile reported for an IP
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BehaviorProfile {
    pub request_count: u64,
    pub unique_paths: u64,
    pub error_rate: f64,
    pub avg_response_size: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Reputation record for one IP. Lower scores are worse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub ip: String,
    /// 0-100, lower = worse
    pub score: u8,
    pub category: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default = "Utc::now")]
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub threats_observed: Vec<ThreatKind>,
    #[serde(default)]
    pub geo: GeoInfo,
    #[serde(default)]
    pub behavior: BehaviorProfile,
}

impl ReputationRecord {
    /// The fail-open default: clean score, no geo attribution
    pub fn neutral(ip: &str) -> Self {
        Self {
            ip: ip.to_string(),
            score: NEUTRAL_SCORE,
            category: "clean".to_string(),
            sources: Vec::new(),
            last_seen: Utc::now(),
            threats_observed: Vec::new(),
            geo: GeoInfo::default(),
            behavior: BehaviorProfile::default(),
        }
    }
}

/// External reputation source
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReputationProvider: Send + Sync {
    async fn lookup(&self, ip: &str) -> Result<ReputationRecord, ReputationError>;
}

/// In-memory provider returning preconfigured records, falling back to the
/// neutral record for unknown IPs. This is the stand-in for a real
/// third-party source.
#[derive(Default)]
pub struct StaticReputationProvider {
    records: HashMap<String, ReputationRecord>,
}

impl StaticReputationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, record: ReputationRecord) -> Self {
        self.records.insert(record.ip.clone(), record);
        self
    }
}

#[async_trait]
impl ReputationProvider for StaticReputationProvider {
    async fn lookup(&self, ip: &str) -> Result<ReputationRecord, ReputationError> {
        Ok(self
            .records
            .get(ip)
            .cloned()
            .unwrap_or_else(|| ReputationRecord::neutral(ip)))
    }
}

/// Provider backed by an HTTP reputation API: `GET {endpoint}/{ip}`
pub struct HttpReputationProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpReputationProvider {
    pub fn new(endpoint: String, timeout: std::time::Duration) -> Result<Self, ReputationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl ReputationProvider for HttpReputationProvider {
    async fn lookup(&self, ip: &str) -> Result<ReputationRecord, ReputationError> {
        let url = format!("{}/{}", self.endpoint.trim_end_matches('/'), ip);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ReputationError::InvalidResponse(format!(
                "provider returned {}",
                response.status()
            )));
        }
        let record: ReputationRecord = response.json().await?;
        if record.score > 100 {
            return Err(ReputationError::InvalidResponse(format!(
                "score {} out of range",
                record.score
            )));
        }
        Ok(record)
    }
}

struct CachedRecord {
    record: ReputationRecord,
    fetched_at: DateTime<Utc>,
}

/// TTL-keyed cache in front of a `ReputationProvider`.
///
/// Only successful lookups are cached; failures return the neutral record
/// so the next request retries the provider.
pub struct ReputationCache {
    provider: Arc<dyn ReputationProvider>,
    ttl: Duration,
    capacity: usize,
    lookup_timeout: std::time::Duration,
    cache: RwLock<HashMap<String, CachedRecord>>,
    lookup_failures: AtomicU64,
}

impl ReputationCache {
    pub fn new(
        provider: Arc<dyn ReputationProvider>,
        ttl: Duration,
        capacity: usize,
        lookup_timeout: std::time::Duration,
    ) -> Self {
        Self {
            provider,
            ttl,
            capacity,
            lookup_timeout,
            cache: RwLock::new(HashMap::new()),
            lookup_failures: AtomicU64::new(0),
        }
    }

    /// Fetch the record for `ip`, from cache when fresh.
    pub async fn get(&self, ip: &str, now: DateTime<Utc>) -> ReputationRecord {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(ip) {
                if now - cached.fetched_at < self.ttl {
                    return cached.record.clone();
                }
            }
        }

        match tokio::time::timeout(self.lookup_timeout, self.provider.lookup(ip)).await {
            Ok(Ok(record)) => {
                self.insert(ip, record.clone(), now).await;
                record
            }
            Ok(Err(e)) => {
                self.lookup_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("reputation lookup for {} failed, failing open: {}", ip, e);
                ReputationRecord::neutral(ip)
            }
            Err(_) => {
                self.lookup_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "reputation lookup for {} timed out after {:?}, failing open",
                    ip,
                    self.lookup_timeout
                );
                ReputationRecord::neutral(ip)
            }
        }
    }

    async fn insert(&self, ip: &str, record: ReputationRecord, now: DateTime<Utc>) {
        let mut cache = self.cache.write().await;
        if cache.len() >= self.capacity && !cache.contains_key(ip) {
            // Size pressure: drop the stalest entry
            if let Some(oldest) = cache
                .iter()
                .min_by_key(|(_, c)| c.fetched_at)
                .map(|(k, _)| k.clone())
            {
                cache.remove(&oldest);
            }
        }
        cache.insert(
            ip.to_string(),
            CachedRecord {
                record,
                fetched_at: now,
            },
        );
    }

    /// Remove entries past their TTL. Returns the number evicted.
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|_, c| now - c.fetched_at < self.ttl);
        before - cache.len()
    }

    /// Drop every cached record (operational reset)
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    /// Total lookups that failed or timed out since startup
    pub fn failure_count(&self) -> u64 {
        self.lookup_failures.load(Ordering::Relaxed)
    }
}
