//! Stateless detector checks.
//!
//! Each check consumes the raw request plus shared state handed to it and
//! produces zero or more `Detection`s. None of them performs I/O; the
//! reputation record is fetched once per request by the engine and passed
//! in, so the geo check piggybacks on that same-request result.

use crate::core::patterns::PatternCatalog;
use crate::core::reputation::ReputationRecord;
use crate::core::tracker::RateSample;
use crate::core::{Detection, RequestInfo, ThreatKind, ThreatLevel};
use crate::models::EngineConfig;
use crate::utils::parse_query_params;

/// Largest request body the payload-pattern check will scan
pub const MAX_INSPECTED_BODY_BYTES: usize = 1024 * 1024;

const URL_LENGTH_CAP: usize = 2048;
const PARAM_COUNT_CAP: usize = 50;
const PARAM_VALUE_CAP: usize = 1000;
const DECLARED_BODY_CAP: u64 = 10 * 1024 * 1024;

/// Known automation / attack-tool user-agent signatures
const AGENT_SIGNATURES: &[&str] = &[
    "sqlmap",
    "nikto",
    "nmap",
    "masscan",
    "hydra",
    "gobuster",
    "dirbuster",
    "wfuzz",
    "burpsuite",
    "acunetix",
    "netsparker",
    "havij",
    "metasploit",
    "python-requests",
    "curl",
    "wget",
];

/// Tokens that mark a mainstream browser user agent
const BROWSER_TOKENS: &[&str] = &["mozilla", "chrome", "safari", "firefox", "edge", "opera"];

/// Rate-abuse check over this request's sliding-window counts
pub fn evaluate_rate(sample: &RateSample, config: &EngineConfig) -> Option<Detection> {
    if sample.per_minute > config.max_requests_per_minute {
        let level = if sample.per_minute > config.max_requests_per_minute.saturating_mul(2) {
            ThreatLevel::Critical
        } else {
            ThreatLevel::High
        };
        return Some(Detection {
            kind: ThreatKind::RateAbuse,
            level,
            description: format!(
                "{} requests in the last minute (limit {})",
                sample.per_minute, config.max_requests_per_minute
            ),
            confidence: 0.95,
            indicators: vec![format!("per_minute:{}", sample.per_minute)],
        });
    }
    if sample.per_hour > config.max_requests_per_hour {
        return Some(Detection {
            kind: ThreatKind::RateAbuse,
            level: ThreatLevel::Medium,
            description: format!(
                "{} requests in the last hour (limit {})",
                sample.per_hour, config.max_requests_per_hour
            ),
            confidence: 0.8,
            indicators: vec![format!("per_hour:{}", sample.per_hour)],
        });
    }
    None
}

/// Reputation-score check against the configured threshold
pub fn evaluate_reputation(record: &ReputationRecord, config: &EngineConfig) -> Option<Detection> {
    if record.score >= config.reputation_threshold {
        return None;
    }
    let level = if record.score < 10 {
        ThreatLevel::Critical
    } else if record.score < 20 {
        ThreatLevel::High
    } else {
        ThreatLevel::Medium
    };
    let mut indicators = vec![format!("score:{}", record.score)];
    indicators.extend(
        record
            .threats_observed
            .iter()
            .map(|kind| format!("observed:{}", kind.as_str())),
    );
    Some(Detection {
        kind: ThreatKind::MaliciousIp,
        level,
        description: format!(
            "IP reputation score {} below threshold {} ({})",
            record.score, config.reputation_threshold, record.category
        ),
        confidence: 0.9,
        indicators,
    })
}

/// Known-malicious user-agent check.
///
/// A tool signature only fires when no mainstream-browser token is present,
/// so browser requests that happen to embed a tool name are not flagged.
pub fn check_user_agent(user_agent: &str) -> Option<Detection> {
    let ua = user_agent.to_ascii_lowercase();
    let signature = AGENT_SIGNATURES.iter().find(|sig| ua.contains(*sig))?;
    if BROWSER_TOKENS.iter().any(|token| ua.contains(token)) {
        return None;
    }
    Some(Detection {
        kind: ThreatKind::SuspiciousAgent,
        level: ThreatLevel::Medium,
        description: format!("user agent matches known tool signature `{}`", signature),
        confidence: 0.7,
        indicators: vec![format!("signature:{}", signature)],
    })
}

/// Request-shape anomaly heuristics; one finding listing every triggered
/// indicator
pub fn check_request_shape(req: &RequestInfo) -> Option<Detection> {
    let mut indicators = Vec::new();

    if req.url.len() > URL_LENGTH_CAP {
        indicators.push("url_length".to_string());
    }

    let params = parse_query_params(&req.url);
    if params.len() > PARAM_COUNT_CAP {
        indicators.push("parameter_count".to_string());
    }
    if params.iter().any(|(_, value)| value.len() > PARAM_VALUE_CAP) {
        indicators.push("parameter_length".to_string());
    }
    if params
        .iter()
        .any(|(_, value)| value.contains("{{") || value.contains("${") || value.contains("<%"))
    {
        indicators.push("template_markers".to_string());
    }

    if req.content_length.is_some_and(|len| len > DECLARED_BODY_CAP) {
        indicators.push("declared_body_size".to_string());
    }

    if indicators.is_empty() {
        return None;
    }

    let confidence = (0.5 + 0.1 * (indicators.len() as f64 - 1.0)).min(0.9);
    Some(Detection {
        kind: ThreatKind::AnomalousShape,
        level: ThreatLevel::Medium,
        description: format!("request shape anomalies: {}", indicators.join(", ")),
        confidence,
        indicators,
    })
}

/// Geo restriction check against the same-request reputation record
pub fn check_geo(record: &ReputationRecord, config: &EngineConfig) -> Option<Detection> {
    let country = record.geo.country.as_deref()?;
    let restricted = config
        .blocked_countries
        .iter()
        .any(|blocked| blocked.eq_ignore_ascii_case(country));
    if !restricted {
        return None;
    }
    Some(Detection {
        kind: ThreatKind::GeoRestricted,
        level: ThreatLevel::High,
        description: format!("request from geo-restricted country {}", country),
        confidence: 0.8,
        indicators: vec![format!("country:{}", country)],
    })
}

/// Payload-pattern check over the URL and, for non-idempotent methods, the
/// request body.
///
/// Each distinct rule hit becomes its own detection to preserve forensic
/// detail. Bodies above `MAX_INSPECTED_BODY_BYTES` are skipped to protect
/// the request path.
pub fn check_payload_patterns(catalog: &PatternCatalog, req: &RequestInfo) -> Vec<Detection> {
    let mut detections = Vec::new();

    for rule in catalog.match_text(&req.url) {
        detections.push(Detection {
            kind: rule.kind,
            level: ThreatLevel::High,
            description: format!("pattern `{}` matched in request URL", rule.name),
            confidence: 0.85,
            indicators: vec![format!("rule:{}", rule.name), "location:url".to_string()],
        });
    }

    if req.is_non_idempotent() {
        if let Some(body) = &req.body {
            if body.len() <= MAX_INSPECTED_BODY_BYTES {
                for rule in catalog.match_text(body) {
                    detections.push(Detection {
                        kind: rule.kind,
                        level: ThreatLevel::High,
                        description: format!("pattern `{}` matched in request body", rule.name),
                        confidence: 0.9,
                        indicators: vec![
                            format!("rule:{}", rule.name),
                            "location:body".to_string(),
                        ],
                    });
                }
            } else {
                log::debug!(
                    "skipping payload check for {}: body of {} bytes exceeds inspection cap",
                    req.source_ip,
                    body.len()
                );
            }
        }
    }

    detections
}
