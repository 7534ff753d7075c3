//! Real-time request threat-detection engine.
//!
//! Inspects every inbound HTTP request, scores it for malicious intent,
//! and decides whether to allow, rate-limit, or block it. The engine is a
//! plain value owning all shared state; `main` exposes it over an
//! actix-web API and runs the housekeeper.

pub mod api;
pub mod config;
pub mod core;
pub mod models;
pub mod utils;

pub use crate::core::{
    DetectionResult, Engine, Housekeeper, IpLifecycle, RequestInfo, ThreatFinding, ThreatKind,
    ThreatLevel,
};
pub use crate::models::{Config, EngineConfig, EngineConfigPatch};
