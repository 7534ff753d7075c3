//! Core functionality for the threat detection service.
//!
//! This module contains the detection engine and its parts: the pattern
//! catalog, per-IP request tracking, reputation cache, block registry,
//! detectors, event store, housekeeper, and the outbound event sink.

pub mod blocklist;
pub mod detectors;
pub mod engine;
pub mod events;
pub mod housekeeper;
pub mod patterns;
pub mod reputation;
pub mod sink;
pub mod tracker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub use blocklist::{BlockEntry, BlockRegistry, BlockedIpView};
pub use engine::{DetectionResult, Engine, EngineStatistics, ExportedState, IpLifecycle};
pub use events::{EventStatistics, EventStore};
pub use housekeeper::Housekeeper;
pub use patterns::PatternCatalog;
pub use reputation::{
    ReputationCache, ReputationProvider, ReputationRecord, StaticReputationProvider,
};
pub use sink::{EventSink, HttpEventSink, NoopEventSink};
pub use tracker::RequestTracker;

/// Classification of a detected threat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatKind {
    SqlInjection,
    Xss,
    PathTraversal,
    CommandInjection,
    RateAbuse,
    SuspiciousAgent,
    MaliciousIp,
    AnomalousShape,
    GeoRestricted,
}

impl ThreatKind {
    /// Stable string form, matching the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatKind::SqlInjection => "sql_injection",
            ThreatKind::Xss => "xss",
            ThreatKind::PathTraversal => "path_traversal",
            ThreatKind::CommandInjection => "command_injection",
            ThreatKind::RateAbuse => "rate_abuse",
            ThreatKind::SuspiciousAgent => "suspicious_agent",
            ThreatKind::MaliciousIp => "malicious_ip",
            ThreatKind::AnomalousShape => "anomalous_shape",
            ThreatKind::GeoRestricted => "geo_restricted",
        }
    }
}

/// Ordinal threat severity; `Ord` follows low < medium < high < critical
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        }
    }
}

/// Inbound request as seen by the engine.
///
/// The surrounding HTTP middleware supplies this; the engine never touches
/// the transport itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestInfo {
    /// Client IP address
    pub source_ip: String,
    /// HTTP method
    pub method: String,
    /// Request URL including the query string
    pub url: String,
    /// User-Agent header value
    #[serde(default)]
    pub user_agent: String,
    /// Request body, when the caller chose to supply it
    #[serde(default)]
    pub body: Option<String>,
    /// Declared Content-Length, when present
    #[serde(default)]
    pub content_length: Option<u64>,
}

impl RequestInfo {
    /// Whether the method may carry a request body worth inspecting
    pub fn is_non_idempotent(&self) -> bool {
        matches!(
            self.method.to_ascii_uppercase().as_str(),
            "POST" | "PUT" | "PATCH" | "DELETE"
        )
    }
}

/// Compact copy of the request retained inside a finding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub method: String,
    pub url: String,
    pub content_length: Option<u64>,
}

impl From<&RequestInfo> for RequestSnapshot {
    fn from(req: &RequestInfo) -> Self {
        Self {
            method: req.method.clone(),
            url: req.url.clone(),
            content_length: req.content_length,
        }
    }
}

/// One suspicious signal produced by a detector, before the engine attaches
/// request context to it
#[derive(Debug, Clone)]
pub struct Detection {
    pub kind: ThreatKind,
    pub level: ThreatLevel,
    pub description: String,
    pub confidence: f64,
    pub indicators: Vec<String>,
}

/// One recorded threat finding. Immutable once created; owned by the
/// event store after recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatFinding {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub source_ip: String,
    pub user_agent: String,
    pub kind: ThreatKind,
    pub level: ThreatLevel,
    pub description: String,
    pub confidence: f64,
    pub indicators: Vec<String>,
    pub request: RequestSnapshot,
    /// Whether the request carrying this finding was blocked
    pub blocked: bool,
    /// Action applied for this finding
    pub action: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}
