//! The threat detection engine.
//!
//! One `Engine` value owns every shared structure: the pattern catalog,
//! sliding-window tracker, reputation cache, block registry, and event
//! store. Callers construct an instance at process start and share it via
//! `Arc`; there is no ambient global state, so tests run isolated engines.

use crate::core::blocklist::{BlockRegistry, BlockedIpView};
use crate::core::detectors;
use crate::core::events::{EventStatistics, EventStore};
use crate::core::patterns::PatternCatalog;
use crate::core::reputation::{ReputationCache, ReputationProvider};
use crate::core::sink::{EventSink, SecurityLogRecord};
use crate::core::tracker::RequestTracker;
use crate::core::{Detection, RequestInfo, ThreatFinding, ThreatKind, ThreatLevel};
use crate::models::{Config, ConfigValidationError, EngineConfig, EngineConfigPatch};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Outcome of evaluating one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub is_threat: bool,
    pub threat_level: ThreatLevel,
    pub findings: Vec<ThreatFinding>,
    pub should_block: bool,
    pub actions: Vec<String>,
}

/// Engine-wide statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatistics {
    #[serde(flatten)]
    pub events: EventStatistics,
    pub blocked_count: usize,
    pub active_tracked_ips: usize,
}

/// Snapshot of engine state for offline analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedState {
    pub findings: Vec<ThreatFinding>,
    pub statistics: EngineStatistics,
    pub blocked_ips: Vec<BlockedIpView>,
}

/// Derived per-IP lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpLifecycle {
    Clean,
    Monitored,
    RateLimited,
    Blocked,
}

/// What one housekeeping sweep reclaimed
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepSummary {
    pub expired_blocks: usize,
    pub pruned_ips: usize,
    pub evicted_reputation_records: usize,
}

/// Real-time request threat-detection engine
pub struct Engine {
    config: RwLock<EngineConfig>,
    catalog: &'static PatternCatalog,
    tracker: RequestTracker,
    blocks: BlockRegistry,
    reputation: ReputationCache,
    events: EventStore,
    sink: Arc<dyn EventSink>,
}

impl Engine {
    pub fn new(
        config: &Config,
        provider: Arc<dyn ReputationProvider>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config: RwLock::new(config.engine.clone()),
            catalog: PatternCatalog::shared(),
            tracker: RequestTracker::new(),
            blocks: BlockRegistry::new(),
            reputation: ReputationCache::new(
                provider,
                Duration::minutes(config.reputation.cache_ttl_minutes),
                config.reputation.cache_capacity,
                std::time::Duration::from_millis(config.reputation.timeout_ms),
            ),
            events: EventStore::new(config.events.capacity),
            sink,
        }
    }

    /// Evaluate one inbound request
    pub async fn detect(&self, req: &RequestInfo) -> DetectionResult {
        self.detect_at(req, Utc::now()).await
    }

    /// Evaluate one inbound request at an explicit instant.
    ///
    /// Time is a parameter so tests can replay traffic deterministically.
    pub async fn detect_at(&self, req: &RequestInfo, now: DateTime<Utc>) -> DetectionResult {
        // Fast path: an actively blocked IP short-circuits the detectors
        if self.blocks.is_blocked(&req.source_ip, now).await {
            let finding = self.finding_from(
                Detection {
                    kind: ThreatKind::MaliciousIp,
                    level: ThreatLevel::Critical,
                    description: format!("request from actively blocked IP {}", req.source_ip),
                    confidence: 1.0,
                    indicators: vec!["active_block".to_string()],
                },
                req,
                now,
                true,
                "block_request",
            );
            self.record_and_forward(finding.clone()).await;
            metrics::counter!("requests_blocked_total", 1);
            return DetectionResult {
                is_threat: true,
                threat_level: ThreatLevel::Critical,
                findings: vec![finding],
                should_block: true,
                actions: vec!["block_request".to_string()],
            };
        }

        let config = self.config.read().await.clone();

        // The reputation lookup is the only I/O on this path; the geo check
        // reads the same record
        let sample = self.tracker.record(&req.source_ip, now).await;
        let record = self.reputation.get(&req.source_ip, now).await;

        let mut detections: Vec<Detection> = Vec::new();
        detections.extend(detectors::evaluate_reputation(&record, &config));
        detections.extend(detectors::evaluate_rate(&sample, &config));
        detections.extend(detectors::check_user_agent(&req.user_agent));
        detections.extend(detectors::check_payload_patterns(self.catalog, req));
        detections.extend(detectors::check_request_shape(req));
        detections.extend(detectors::check_geo(&record, &config));

        let threat_level = detections
            .iter()
            .map(|d| d.level)
            .max()
            .unwrap_or(ThreatLevel::Low);

        let should_block = config.real_time_blocking
            && detections.iter().any(|d| {
                d.level == ThreatLevel::Critical
                    || (d.level >= ThreatLevel::High && hard_block_kind(d.kind, &config))
            });

        let mut actions: BTreeSet<String> = BTreeSet::new();
        for detection in &detections {
            for action in actions_for(detection, &config) {
                actions.insert(action.to_string());
            }
        }
        if should_block {
            actions.insert("block_request".to_string());
        }

        // Apply actions: auto-block, alerts, then record everything
        for detection in &detections {
            if detection.kind == ThreatKind::MaliciousIp && detection.level >= ThreatLevel::High {
                let created = self
                    .blocks
                    .auto_block(
                        &req.source_ip,
                        &format!("auto: {}", detection.description),
                        Duration::minutes(config.auto_block_minutes),
                        now,
                    )
                    .await;
                if created {
                    log::warn!(
                        "auto-blocked {} for {} minutes: {}",
                        req.source_ip,
                        config.auto_block_minutes,
                        detection.description
                    );
                }
            }
            if detection.level >= ThreatLevel::High && pattern_kind(detection.kind) {
                log::error!(
                    "security alert for {}: {}",
                    req.source_ip,
                    detection.description
                );
            }
        }

        let mut findings = Vec::with_capacity(detections.len());
        for detection in detections {
            let action = primary_action(&detection, &config);
            let finding = self.finding_from(detection, req, now, should_block, action);
            self.record_and_forward(finding.clone()).await;
            findings.push(finding);
        }

        if should_block {
            metrics::counter!("requests_blocked_total", 1);
        }

        DetectionResult {
            is_threat: !findings.is_empty(),
            threat_level,
            findings,
            should_block,
            actions: actions.into_iter().collect(),
        }
    }

    fn finding_from(
        &self,
        detection: Detection,
        req: &RequestInfo,
        now: DateTime<Utc>,
        blocked: bool,
        action: &str,
    ) -> ThreatFinding {
        ThreatFinding {
            id: Uuid::new_v4(),
            timestamp: now,
            source_ip: req.source_ip.clone(),
            user_agent: req.user_agent.clone(),
            kind: detection.kind,
            level: detection.level,
            description: detection.description,
            confidence: detection.confidence,
            indicators: detection.indicators,
            request: req.into(),
            blocked,
            action: action.to_string(),
            metadata: HashMap::new(),
        }
    }

    async fn record_and_forward(&self, finding: ThreatFinding) {
        metrics::counter!("threat_findings_total", 1);

        // Best-effort forwarding; a sink failure never blocks the request
        let record = SecurityLogRecord::from_finding(&finding);
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            if let Err(e) = sink.publish(record).await {
                metrics::counter!("event_sink_failures_total", 1);
                log::debug!("event sink publish failed: {}", e);
            }
        });

        self.events.record(finding).await;
    }

    /// Manually block an IP for `duration_minutes`
    pub async fn block_ip(&self, ip: &str, reason: &str, duration_minutes: i64) {
        log::warn!("operator block for {} ({} min): {}", ip, duration_minutes, reason);
        self.blocks
            .block(ip, reason, Duration::minutes(duration_minutes), Utc::now())
            .await;
    }

    /// Remove any block for an IP. Returns true when one existed.
    pub async fn unblock_ip(&self, ip: &str) -> bool {
        let removed = self.blocks.unblock(ip).await;
        if removed {
            log::info!("operator unblocked {}", ip);
        }
        removed
    }

    /// Active blocks with remaining time
    pub async fn list_blocked_ips(&self) -> Vec<BlockedIpView> {
        self.blocks.list(Utc::now()).await
    }

    /// Engine-wide statistics
    pub async fn statistics(&self) -> EngineStatistics {
        let now = Utc::now();
        EngineStatistics {
            events: self.events.statistics().await,
            blocked_count: self.blocks.active_count(now).await,
            active_tracked_ips: self.tracker.active_ips().await,
        }
    }

    /// Atomically merge a partial config; an invalid patch leaves the
    /// current config untouched
    pub async fn update_config(
        &self,
        patch: &EngineConfigPatch,
    ) -> Result<EngineConfig, ConfigValidationError> {
        let mut config = self.config.write().await;
        let merged = config.merged(patch)?;
        *config = merged.clone();
        log::info!("engine configuration updated");
        Ok(merged)
    }

    /// Copy of the active configuration
    pub async fn current_config(&self) -> EngineConfig {
        self.config.read().await.clone()
    }

    /// Derived lifecycle state for one IP
    pub async fn ip_state(&self, ip: &str) -> IpLifecycle {
        let now = Utc::now();
        if self.blocks.is_blocked(ip, now).await {
            return IpLifecycle::Blocked;
        }

        let config = self.config.read().await.clone();
        let sample = self.tracker.peek(ip, now).await;
        if sample.per_minute > config.max_requests_per_minute
            || sample.per_hour > config.max_requests_per_hour
        {
            return IpLifecycle::RateLimited;
        }

        if self
            .events
            .has_finding_since(ip, now - Duration::hours(1))
            .await
        {
            return IpLifecycle::Monitored;
        }
        IpLifecycle::Clean
    }

    /// Snapshot findings, statistics, and blocks for offline analysis
    pub async fn export_state(&self) -> ExportedState {
        ExportedState {
            findings: self.events.snapshot().await,
            statistics: self.statistics().await,
            blocked_ips: self.list_blocked_ips().await,
        }
    }

    /// Operational reset: wipe findings and the reputation cache
    pub async fn clear_state(&self) {
        self.events.clear().await;
        self.reputation.clear().await;
        log::warn!("engine state cleared");
    }

    /// Expire stale blocks and prune idle windows and cache entries.
    ///
    /// Takes one short-lived lock per structure, never a lock spanning all
    /// of them.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepSummary {
        let summary = SweepSummary {
            expired_blocks: self.blocks.expire(now).await,
            pruned_ips: self.tracker.prune_idle(now).await,
            evicted_reputation_records: self.reputation.evict_expired(now).await,
        };

        metrics::gauge!("tracked_ips", self.tracker.active_ips().await as f64);
        metrics::gauge!(
            "active_blocks",
            self.blocks.active_count(now).await as f64
        );
        log::debug!(
            "housekeeping sweep: {} blocks expired, {} idle IPs pruned, {} reputation records evicted",
            summary.expired_blocks,
            summary.pruned_ips,
            summary.evicted_reputation_records
        );
        summary
    }
}

fn pattern_kind(kind: ThreatKind) -> bool {
    matches!(
        kind,
        ThreatKind::SqlInjection
            | ThreatKind::Xss
            | ThreatKind::PathTraversal
            | ThreatKind::CommandInjection
    )
}

/// Kinds whose High findings hard-block the request. Rate abuse at High
/// maps to rate limiting instead; only a Critical rate finding blocks.
fn hard_block_kind(kind: ThreatKind, config: &EngineConfig) -> bool {
    match kind {
        ThreatKind::MaliciousIp => true,
        ThreatKind::GeoRestricted => config.enforce_geo_blocking,
        kind => pattern_kind(kind),
    }
}

fn actions_for(detection: &Detection, config: &EngineConfig) -> Vec<&'static str> {
    match (detection.kind, detection.level) {
        (ThreatKind::MaliciousIp, ThreatLevel::High | ThreatLevel::Critical) => {
            vec!["block_ip"]
        }
        (ThreatKind::MaliciousIp, _) => vec!["enhanced_monitoring"],
        (ThreatKind::RateAbuse, ThreatLevel::High | ThreatLevel::Critical) => {
            vec!["rate_limit", "enhanced_monitoring"]
        }
        (ThreatKind::RateAbuse, _) => vec!["enhanced_monitoring"],
        (kind, ThreatLevel::High | ThreatLevel::Critical) if pattern_kind(kind) => {
            vec!["block_request", "alert"]
        }
        (ThreatKind::GeoRestricted, _) => {
            if config.enforce_geo_blocking {
                vec!["geo_block", "block_request"]
            } else {
                vec!["geo_block"]
            }
        }
        (ThreatKind::AnomalousShape, _) => vec!["enhanced_monitoring"],
        _ => vec!["log_only"],
    }
}

fn primary_action(detection: &Detection, config: &EngineConfig) -> &'static str {
    actions_for(detection, config)
        .first()
        .copied()
        .unwrap_or("log_only")
}
