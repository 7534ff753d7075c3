//! Bounded, append-only store of recorded findings.
//!
//! The buffer evicts its oldest entries above a configured capacity;
//! lifetime counters survive eviction so statistics stay accurate.
//! Top-offender ranking is computed over the retained buffer.

use crate::core::{ThreatFinding, ThreatKind, ThreatLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

/// Finding count for one IP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpFindingCount {
    pub ip: String,
    pub count: u64,
}

/// Derived statistics over recorded findings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStatistics {
    /// Lifetime number of recorded findings, including evicted ones
    pub total_findings: u64,
    pub findings_by_kind: HashMap<String, u64>,
    pub findings_by_level: HashMap<String, u64>,
    /// Top 10 IPs by finding count over the retained buffer
    pub top_offending_ips: Vec<IpFindingCount>,
}

#[derive(Default)]
struct EventStoreInner {
    findings: VecDeque<ThreatFinding>,
    total: u64,
    by_kind: HashMap<ThreatKind, u64>,
    by_level: HashMap<ThreatLevel, u64>,
}

/// Append-only buffer of findings plus derived statistics
pub struct EventStore {
    capacity: usize,
    inner: RwLock<EventStoreInner>,
}

impl EventStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(EventStoreInner::default()),
        }
    }

    /// Record one finding, evicting the oldest above capacity
    pub async fn record(&self, finding: ThreatFinding) {
        let mut inner = self.inner.write().await;
        inner.total += 1;
        *inner.by_kind.entry(finding.kind).or_insert(0) += 1;
        *inner.by_level.entry(finding.level).or_insert(0) += 1;
        inner.findings.push_back(finding);
        while inner.findings.len() > self.capacity {
            inner.findings.pop_front();
        }
    }

    /// Number of findings currently retained
    pub async fn retained(&self) -> usize {
        self.inner.read().await.findings.len()
    }

    /// Whether `ip` has a retained finding at or after `since`.
    ///
    /// Scans the whole buffer; retained findings are not guaranteed to be
    /// timestamp-ordered when callers evaluate with explicit instants.
    pub async fn has_finding_since(&self, ip: &str, since: DateTime<Utc>) -> bool {
        self.inner
            .read()
            .await
            .findings
            .iter()
            .any(|f| f.source_ip == ip && f.timestamp >= since)
    }

    /// Copy of the retained findings, oldest first
    pub async fn snapshot(&self) -> Vec<ThreatFinding> {
        self.inner.read().await.findings.iter().cloned().collect()
    }

    /// Statistics over lifetime counters and the retained buffer
    pub async fn statistics(&self) -> EventStatistics {
        let inner = self.inner.read().await;

        let mut per_ip: HashMap<&str, u64> = HashMap::new();
        for finding in &inner.findings {
            *per_ip.entry(finding.source_ip.as_str()).or_insert(0) += 1;
        }
        let mut top: Vec<IpFindingCount> = per_ip
            .into_iter()
            .map(|(ip, count)| IpFindingCount {
                ip: ip.to_string(),
                count,
            })
            .collect();
        top.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.ip.cmp(&b.ip)));
        top.truncate(10);

        EventStatistics {
            total_findings: inner.total,
            findings_by_kind: inner
                .by_kind
                .iter()
                .map(|(kind, count)| (kind.as_str().to_string(), *count))
                .collect(),
            findings_by_level: inner
                .by_level
                .iter()
                .map(|(level, count)| (level.as_str().to_string(), *count))
                .collect(),
            top_offending_ips: top,
        }
    }

    /// Drop all findings and counters (operational reset)
    pub async fn clear(&self) {
        *self.inner.write().await = EventStoreInner::default();
    }
}
