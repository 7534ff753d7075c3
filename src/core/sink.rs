//! Outbound forwarding of recorded findings.
//!
//! The engine depends only on the `EventSink` trait; forwarding is
//! fire-and-forget and a failure never blocks request handling. The
//! in-memory no-op sink keeps tests and local runs free of network I/O.

use crate::core::ThreatFinding;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when publishing to a sink
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("publish request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("sink rejected record: {0}")]
    Rejected(String),
}

/// Metadata attached to a forwarded security record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkMetadata {
    pub finding_id: String,
    pub ip: String,
    pub kind: String,
    pub level: String,
    pub confidence: f64,
    pub url: String,
    pub user_agent: String,
}

/// Structured record forwarded to the external logging endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityLogRecord {
    pub level: String,
    pub message: String,
    pub category: String,
    pub metadata: SinkMetadata,
}

impl SecurityLogRecord {
    pub fn from_finding(finding: &ThreatFinding) -> Self {
        Self {
            level: finding.level.as_str().to_string(),
            message: finding.description.clone(),
            category: "security_threat".to_string(),
            metadata: SinkMetadata {
                finding_id: finding.id.to_string(),
                ip: finding.source_ip.clone(),
                kind: finding.kind.as_str().to_string(),
                level: finding.level.as_str().to_string(),
                confidence: finding.confidence,
                url: finding.request.url.clone(),
                user_agent: finding.user_agent.clone(),
            },
        }
    }
}

/// Destination for recorded findings
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, record: SecurityLogRecord) -> Result<(), SinkError>;
}

/// Sink that discards every record
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn publish(&self, _record: SecurityLogRecord) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Sink posting records as JSON to a logging endpoint
pub struct HttpEventSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEventSink {
    pub fn new(endpoint: String, timeout: std::time::Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn publish(&self, record: SecurityLogRecord) -> Result<(), SinkError> {
        let response = self.client.post(&self.endpoint).json(&record).send().await?;
        if !response.status().is_success() {
            return Err(SinkError::Rejected(format!(
                "endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
