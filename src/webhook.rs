//! Webhook fan-out: CloudEvents 1.0 envelopes for state transitions the
//! outside world cares about (validation lifecycle, approval requests).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

const SPEC_VERSION: &str = "1.0";
const SOURCE: &str = "/rosterguard";
const PRODUCT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "com.rosterguard.validation.started")]
    ValidationStarted,
    #[serde(rename = "com.rosterguard.validation.completed")]
    ValidationCompleted,
    #[serde(rename = "com.rosterguard.validation.failed")]
    ValidationFailed,
    #[serde(rename = "com.rosterguard.approval.requested")]
    ApprovalRequested,
    #[serde(rename = "com.rosterguard.approval.resolved")]
    ApprovalResolved,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ValidationStarted => "com.rosterguard.validation.started",
            EventType::ValidationCompleted => "com.rosterguard.validation.completed",
            EventType::ValidationFailed => "com.rosterguard.validation.failed",
            EventType::ApprovalRequested => "com.rosterguard.approval.requested",
            EventType::ApprovalResolved => "com.rosterguard.approval.resolved",
        }
    }
}

/// CloudEvents 1.0 envelope, with the product's own extension attributes
/// (`wikisoft_*`-style fields renamed to this product, per the CloudEvents
/// convention of namespacing extensions to the producing system).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudEvent {
    pub specversion: String,
    pub id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub time: DateTime<Utc>,
    pub datacontenttype: String,
    pub subject: Option<String>,
    pub data: Value,
    pub rosterguard_version: String,
    pub rosterguard_environment: String,
    pub rosterguard_correlation_id: String,
}

pub fn create_event(event_type: EventType, subject: Option<String>, data: Value, environment: &str, correlation_id: &str) -> CloudEvent {
    CloudEvent {
        specversion: SPEC_VERSION.to_string(),
        id: Uuid::new_v4().to_string(),
        source: SOURCE.to_string(),
        event_type: event_type.as_str().to_string(),
        time: Utc::now(),
        datacontenttype: "application/json".to_string(),
        subject,
        data,
        rosterguard_version: PRODUCT_VERSION.to_string(),
        rosterguard_environment: environment.to_string(),
        rosterguard_correlation_id: correlation_id.to_string(),
    }
}

pub fn validation_started_event(case_id: &str, environment: &str, correlation_id: &str) -> CloudEvent {
    create_event(
        EventType::ValidationStarted,
        Some(case_id.to_string()),
        serde_json::json!({"case_id": case_id}),
        environment,
        correlation_id,
    )
}

pub fn validation_completed_event(
    case_id: &str,
    confidence: f64,
    error_count: usize,
    environment: &str,
    correlation_id: &str,
) -> CloudEvent {
    create_event(
        EventType::ValidationCompleted,
        Some(case_id.to_string()),
        serde_json::json!({"case_id": case_id, "confidence": confidence, "error_count": error_count}),
        environment,
        correlation_id,
    )
}

pub fn approval_required_event(case_id: &str, reason: &str, environment: &str, correlation_id: &str) -> CloudEvent {
    create_event(
        EventType::ApprovalRequested,
        Some(case_id.to_string()),
        serde_json::json!({"case_id": case_id, "reason": reason}),
        environment,
        correlation_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_serializes_to_namespaced_string() {
        assert_eq!(EventType::ValidationCompleted.as_str(), "com.rosterguard.validation.completed");
    }

    #[test]
    fn created_event_carries_extension_attributes() {
        let event = validation_started_event("case-1", "production", "corr-1");
        assert_eq!(event.specversion, "1.0");
        assert_eq!(event.rosterguard_environment, "production");
        assert_eq!(event.rosterguard_correlation_id, "corr-1");
        assert_eq!(event.subject.as_deref(), Some("case-1"));
    }

    #[test]
    fn each_event_gets_a_distinct_id() {
        let a = validation_started_event("c1", "production", "x");
        let b = validation_started_event("c1", "production", "x");
        assert_ne!(a.id, b.id);
    }
}
