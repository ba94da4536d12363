//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.

use chrono::{DateTime, Utc};
use paceline_core::{
    InstanceId, InstanceReport, PacelineError, PolicyField, SlaPolicy, StageName,
    primitives::MAX_STAGE_NAME_LENGTH,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Engine metrics overview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub policies: usize,
    pub instances: usize,
    pub open: usize,
    pub on_time: usize,
    pub overdue: usize,
    pub expired: usize,
    pub closed: usize,
}

// =============================================================================
// POLICY TYPES
// =============================================================================

/// One policy as exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyJson {
    pub stage: String,
    pub duration_days: u32,
    pub grace_days: u32,
    pub allow_extensions: bool,
    pub max_extensions: u32,
    pub extension_days: u32,
    pub is_active: bool,
}

impl From<&SlaPolicy> for PolicyJson {
    fn from(policy: &SlaPolicy) -> Self {
        Self {
            stage: policy.stage.as_str().to_string(),
            duration_days: policy.duration_days,
            grace_days: policy.grace_days,
            allow_extensions: policy.allow_extensions,
            max_extensions: policy.max_extensions,
            extension_days: policy.extension_days,
            is_active: policy.is_active,
        }
    }
}

/// Policy create/replace request (PUT /policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRequest {
    pub stage: String,
    pub duration_days: u32,
    #[serde(default)]
    pub grace_days: u32,
    #[serde(default)]
    pub allow_extensions: bool,
    #[serde(default)]
    pub max_extensions: u32,
    #[serde(default)]
    pub extension_days: u32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl PolicyRequest {
    /// Convert to a core policy, checking the stage name length at the
    /// API boundary before the engine runs full validation.
    pub fn into_policy(self) -> Result<SlaPolicy, PacelineError> {
        if self.stage.len() > MAX_STAGE_NAME_LENGTH {
            return Err(PacelineError::InvalidPolicy {
                field: PolicyField::Stage,
                reason: format!(
                    "stage name length {} exceeds maximum {} bytes",
                    self.stage.len(),
                    MAX_STAGE_NAME_LENGTH
                ),
            });
        }

        Ok(SlaPolicy {
            stage: StageName::new(&self.stage),
            duration_days: self.duration_days,
            grace_days: self.grace_days,
            allow_extensions: self.allow_extensions,
            max_extensions: self.max_extensions,
            extension_days: self.extension_days,
            is_active: self.is_active,
        })
    }
}

/// Policy store response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyResponse {
    pub success: bool,
    pub policy: Option<PolicyJson>,
    pub error: Option<String>,
}

impl PolicyResponse {
    pub fn success(policy: &SlaPolicy) -> Self {
        Self {
            success: true,
            policy: Some(PolicyJson::from(policy)),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            policy: None,
            error: Some(msg.into()),
        }
    }
}

/// Policy list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoliciesResponse {
    pub policies: Vec<PolicyJson>,
}

// =============================================================================
// OPEN REQUEST/RESPONSE
// =============================================================================

/// Stage instance open request (POST /instance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRequest {
    pub stage: String,
    pub owner: String,
    /// Start instant; the server clock is used when absent.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

/// Stage instance open response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenResponse {
    pub success: bool,
    pub id: Option<u64>,
    pub error: Option<String>,
}

impl OpenResponse {
    pub fn success(id: InstanceId) -> Self {
        Self {
            success: true,
            id: Some(id.0),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            id: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// INSTANCE RESPONSE
// =============================================================================

/// Fully evaluated instance view (GET /instance/{id}).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceResponse {
    pub id: u64,
    pub version: u64,
    pub stage: String,
    pub owner: String,
    pub started_at: DateTime<Utc>,
    pub extensions_granted: u32,
    pub due_at: DateTime<Utc>,
    pub expiry_at: DateTime<Utc>,
    pub status: String,
    pub escalation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub close_status: Option<String>,
}

impl From<&InstanceReport> for InstanceResponse {
    fn from(report: &InstanceReport) -> Self {
        Self {
            id: report.id.0,
            version: report.version.value(),
            stage: report.instance.stage.as_str().to_string(),
            owner: report.instance.owner.as_str().to_string(),
            started_at: report.instance.started_at,
            extensions_granted: report.instance.extensions_granted,
            due_at: report.due_at,
            expiry_at: report.expiry_at,
            status: report.status.as_str().to_string(),
            escalation: report.escalation.as_str().to_string(),
            closed_at: report.instance.closed.map(|c| c.at),
            close_status: report.instance.closed.map(|c| c.status.as_str().to_string()),
        }
    }
}

// =============================================================================
// EXTEND RESPONSE
// =============================================================================

/// Extension grant response (POST /instance/{id}/extend).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendResponse {
    pub success: bool,
    pub extensions_granted: Option<u32>,
    pub version: Option<u64>,
    pub error: Option<String>,
}

impl ExtendResponse {
    pub fn success(extensions_granted: u32, version: u64) -> Self {
        Self {
            success: true,
            extensions_granted: Some(extensions_granted),
            version: Some(version),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            extensions_granted: None,
            version: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// CLOSE REQUEST/RESPONSE
// =============================================================================

/// Close request (POST /instance/{id}/close).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseRequest {
    /// Terminal status: "completed" or "cancelled".
    pub status: String,
    /// Close instant; the server clock is used when absent.
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

/// Close response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseResponse {
    pub success: bool,
    pub status: Option<String>,
    pub version: Option<u64>,
    pub error: Option<String>,
}

impl CloseResponse {
    pub fn success(status: &str, version: u64) -> Self {
        Self {
            success: true,
            status: Some(status.to_string()),
            version: Some(version),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            status: None,
            version: None,
            error: Some(msg.into()),
        }
    }
}
