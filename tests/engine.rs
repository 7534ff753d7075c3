//! End-to-end tests of the detection engine against isolated instances.

use chrono::{Duration, Utc};
use std::sync::Arc;

use async_trait::async_trait;
use threat_detection_service::core::reputation::{ReputationRecord, StaticReputationProvider};
use threat_detection_service::core::sink::{
    EventSink, NoopEventSink, SecurityLogRecord, SinkError,
};
use threat_detection_service::core::{Engine, RequestInfo, ThreatKind, ThreatLevel};
use threat_detection_service::models::{Config, EngineConfigPatch};

fn engine_with(config: Config) -> Engine {
    Engine::new(
        &config,
        Arc::new(StaticReputationProvider::new()),
        Arc::new(NoopEventSink),
    )
}

fn engine() -> Engine {
    engine_with(Config::default())
}

fn request(ip: &str, url: &str) -> RequestInfo {
    RequestInfo {
        source_ip: ip.to_string(),
        method: "GET".to_string(),
        url: url.to_string(),
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) Firefox/121.0".to_string(),
        body: None,
        content_length: None,
    }
}

#[tokio::test]
async fn burst_over_the_minute_limit_is_rate_abuse_high() {
    let engine = engine();
    let start = Utc::now();
    let req = request("203.0.113.5", "/api/x");

    // 150 requests within 10 seconds against a limit of 100/minute
    let mut last = None;
    for i in 0..150 {
        let at = start + Duration::milliseconds(i * 66);
        last = Some(engine.detect_at(&req, at).await);
    }
    let result = last.unwrap();

    let rate: Vec<_> = result
        .findings
        .iter()
        .filter(|f| f.kind == ThreatKind::RateAbuse)
        .collect();
    assert_eq!(rate.len(), 1);
    assert_eq!(rate[0].level, ThreatLevel::High);
    // Rate abuse below 2x the limit rate-limits, it does not hard-block
    assert!(!result.should_block);
    assert!(result.actions.contains(&"rate_limit".to_string()));
}

#[tokio::test]
async fn burst_over_twice_the_limit_is_critical_and_blocks() {
    let engine = engine();
    let start = Utc::now();
    let req = request("203.0.113.6", "/api/x");

    let mut last = None;
    for i in 0..250 {
        let at = start + Duration::milliseconds(i * 40);
        last = Some(engine.detect_at(&req, at).await);
    }
    let result = last.unwrap();

    assert_eq!(result.threat_level, ThreatLevel::Critical);
    assert!(result.should_block);
}

#[tokio::test]
async fn requests_at_the_limit_report_nothing() {
    let engine = engine();
    let start = Utc::now();
    let req = request("203.0.113.7", "/api/x");

    for i in 0..100 {
        let at = start + Duration::milliseconds(i * 100);
        let result = engine.detect_at(&req, at).await;
        assert!(
            result.findings.iter().all(|f| f.kind != ThreatKind::RateAbuse),
            "request {} flagged below the limit",
            i + 1
        );
    }
}

#[tokio::test]
async fn sql_injection_url_blocks_when_blocking_enabled() {
    let engine = engine();
    let result = engine
        .detect(&request(
            "203.0.113.8",
            "/search?q=' UNION SELECT * FROM users--",
        ))
        .await;

    let sql: Vec<_> = result
        .findings
        .iter()
        .filter(|f| f.kind == ThreatKind::SqlInjection)
        .collect();
    assert!(!sql.is_empty());
    assert!(sql.iter().all(|f| f.level == ThreatLevel::High));
    assert!(sql.iter().all(|f| f.confidence >= 0.85));
    assert!(result.should_block);
    assert!(result.actions.contains(&"block_request".to_string()));
}

#[tokio::test]
async fn sql_injection_does_not_block_when_blocking_disabled() {
    let engine = engine();
    engine
        .update_config(&EngineConfigPatch {
            real_time_blocking: Some(false),
            ..Default::default()
        })
        .await
        .unwrap();

    let result = engine
        .detect(&request(
            "203.0.113.9",
            "/search?q=' UNION SELECT * FROM users--",
        ))
        .await;

    assert!(result.is_threat);
    assert!(!result.should_block);
}

#[tokio::test]
async fn actively_blocked_ip_short_circuits() {
    let engine = engine();
    engine.block_ip("203.0.113.10", "operator block", 30).await;

    let result = engine.detect(&request("203.0.113.10", "/")).await;
    assert!(result.should_block);
    assert_eq!(result.threat_level, ThreatLevel::Critical);
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].kind, ThreatKind::MaliciousIp);
}

#[tokio::test]
async fn tracker_counts_each_evaluation_exactly_once() {
    let mut config = Config::default();
    config.engine.max_requests_per_minute = 2;
    config.engine.max_requests_per_hour = 1000;
    let engine = engine_with(config);
    let now = Utc::now();
    let req = request("203.0.113.11", "/");

    // Two evaluations stay at the limit, the third crosses it; anything
    // double-counted would fire earlier
    assert!(!engine.detect_at(&req, now).await.is_threat);
    assert!(!engine.detect_at(&req, now).await.is_threat);
    let third = engine.detect_at(&req, now).await;
    assert!(third
        .findings
        .iter()
        .any(|f| f.kind == ThreatKind::RateAbuse));
}

#[tokio::test]
async fn repeat_offense_does_not_duplicate_block_entries() {
    let mut bad = ReputationRecord::neutral("203.0.113.12");
    bad.score = 5;
    let engine = Engine::new(
        &Config::default(),
        Arc::new(StaticReputationProvider::new().with_record(bad)),
        Arc::new(NoopEventSink),
    );

    let req = request("203.0.113.12", "/");
    let first = engine.detect(&req).await;
    assert!(first.should_block);
    let until_first = engine.list_blocked_ips().await[0].until;

    // The IP is now blocked; further requests take the fast path and must
    // not touch the existing entry
    engine.detect(&req).await;
    let blocked = engine.list_blocked_ips().await;
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].until, until_first);
}

#[tokio::test]
async fn zero_duration_block_expires_on_the_next_sweep() {
    let engine = engine();
    engine.block_ip("203.0.113.13", "expired at birth", 0).await;

    // Logically absent immediately
    assert!(engine.list_blocked_ips().await.is_empty());

    // Physically removed by the sweep
    let summary = engine.sweep(Utc::now()).await;
    assert_eq!(summary.expired_blocks, 1);
    assert_eq!(engine.sweep(Utc::now()).await.expired_blocks, 0);
}

#[tokio::test]
async fn benign_traffic_produces_no_findings() {
    let engine = engine();
    let urls = [
        "/",
        "/index.html",
        "/search?q=how to cook pasta",
        "/api/users?id=42&page=2",
    ];
    for url in urls {
        let result = engine.detect(&request("203.0.113.14", url)).await;
        assert!(!result.is_threat, "false positive on {}", url);
        assert_eq!(result.actions, Vec::<String>::new());
    }

    let stats = engine.statistics().await;
    assert_eq!(stats.events.total_findings, 0);
    assert_eq!(stats.active_tracked_ips, 1);
}

#[tokio::test]
async fn geo_restriction_is_logged_and_optionally_enforced() {
    let mut record = ReputationRecord::neutral("203.0.113.15");
    record.geo.country = Some("KP".to_string());
    let provider = StaticReputationProvider::new().with_record(record);

    let mut config = Config::default();
    config.engine.blocked_countries = vec!["KP".to_string()];
    let engine = Engine::new(&config, Arc::new(provider), Arc::new(NoopEventSink));

    let result = engine.detect(&request("203.0.113.15", "/")).await;
    let geo: Vec<_> = result
        .findings
        .iter()
        .filter(|f| f.kind == ThreatKind::GeoRestricted)
        .collect();
    assert_eq!(geo.len(), 1);
    assert_eq!(geo[0].level, ThreatLevel::High);
    // Logged, not enforced, until enforcement is switched on
    assert!(!result.should_block);
    assert!(result.actions.contains(&"geo_block".to_string()));

    engine
        .update_config(&EngineConfigPatch {
            enforce_geo_blocking: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();
    let result = engine.detect(&request("203.0.113.15", "/")).await;
    assert!(result.should_block);
}

#[tokio::test]
async fn export_and_clear_state() {
    let engine = engine();
    engine
        .detect(&request("203.0.113.16", "/x?p=<script>alert(1)</script>"))
        .await;
    engine.block_ip("203.0.113.17", "manual", 60).await;

    let exported = engine.export_state().await;
    assert!(!exported.findings.is_empty());
    assert_eq!(exported.blocked_ips.len(), 1);
    assert!(exported.statistics.events.total_findings > 0);

    engine.clear_state().await;
    let exported = engine.export_state().await;
    assert!(exported.findings.is_empty());
    assert_eq!(exported.statistics.events.total_findings, 0);
    // Clearing findings does not lift blocks
    assert_eq!(exported.blocked_ips.len(), 1);
}

struct FailingSink;

#[async_trait]
impl EventSink for FailingSink {
    async fn publish(&self, _record: SecurityLogRecord) -> Result<(), SinkError> {
        Err(SinkError::Rejected("downstream unavailable".to_string()))
    }
}

#[tokio::test]
async fn sink_failures_never_lose_findings() {
    let engine = Engine::new(
        &Config::default(),
        Arc::new(StaticReputationProvider::new()),
        Arc::new(FailingSink),
    );

    let result = engine
        .detect(&request("203.0.113.20", "/x?p=<script>alert(1)</script>"))
        .await;
    assert!(result.is_threat);
    assert!(result.should_block);

    // Let the forwarding task run and fail
    tokio::task::yield_now().await;

    // The finding is retained locally regardless of the sink outcome
    let stats = engine.statistics().await;
    assert!(stats.events.total_findings > 0);
    assert!(!engine.export_state().await.findings.is_empty());
}

#[tokio::test]
async fn statistics_track_kinds_and_offenders() {
    let engine = engine();
    engine
        .detect(&request("203.0.113.18", "/x?p=../../etc/passwd"))
        .await;
    engine
        .detect(&request("203.0.113.18", "/x?p=<script>alert(1)</script>"))
        .await;
    engine
        .detect(&request("203.0.113.19", "/x?p=javascript:alert(1)"))
        .await;

    let stats = engine.statistics().await;
    assert!(stats.events.total_findings >= 3);
    assert!(stats.events.findings_by_kind.contains_key("path_traversal"));
    assert!(stats.events.findings_by_kind.contains_key("xss"));
    assert_eq!(stats.events.top_offending_ips[0].ip, "203.0.113.18");
    assert_eq!(stats.active_tracked_ips, 2);
}
