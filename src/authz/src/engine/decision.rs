//! Authorization decision types

use crate::types::ApiId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Boolean outcome exposed to the routing layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => f.write_str("allow"),
            Decision::Deny => f.write_str("deny"),
        }
    }
}

/// Why a decision came out the way it did
///
/// For logs and metrics only; callers see nothing but allow/deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Endpoint is public; no bundle consulted
    PublicEndpoint,
    /// Permission code present in the principal's bundle
    Granted,
    /// Permission code absent from the principal's bundle
    NotGranted,
    /// Principal is deactivated
    InactivePrincipal,
    /// No endpoint template matches the request
    UnknownEndpoint,
    /// Matched endpoint carries no permission code and is not public
    MissingPermissionCode,
    /// Permission graph store failed; fail closed
    StoreUnavailable,
}

impl DecisionReason {
    /// Every reason, in export order
    pub const ALL: [DecisionReason; 7] = [
        DecisionReason::PublicEndpoint,
        DecisionReason::Granted,
        DecisionReason::NotGranted,
        DecisionReason::InactivePrincipal,
        DecisionReason::UnknownEndpoint,
        DecisionReason::MissingPermissionCode,
        DecisionReason::StoreUnavailable,
    ];

    /// Stable snake_case label
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::PublicEndpoint => "public_endpoint",
            DecisionReason::Granted => "granted",
            DecisionReason::NotGranted => "not_granted",
            DecisionReason::InactivePrincipal => "inactive_principal",
            DecisionReason::UnknownEndpoint => "unknown_endpoint",
            DecisionReason::MissingPermissionCode => "missing_permission_code",
            DecisionReason::StoreUnavailable => "store_unavailable",
        }
    }

    /// Outcome implied by this reason
    pub fn decision(&self) -> Decision {
        match self {
            DecisionReason::PublicEndpoint | DecisionReason::Granted => Decision::Allow,
            _ => Decision::Deny,
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization decision with diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessDecision {
    /// Unique decision ID
    pub id: String,

    pub allowed: bool,

    pub reason: DecisionReason,

    /// Matched endpoint, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<ApiId>,

    /// Permission code that was checked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_code: Option<String>,

    /// Decision timestamp (milliseconds since epoch)
    pub timestamp: u64,
}

impl AccessDecision {
    /// Build a decision; `allowed` follows from the reason
    pub fn new(reason: DecisionReason) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            allowed: reason.decision().is_allowed(),
            reason,
            endpoint_id: None,
            permission_code: None,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint_id: ApiId) -> Self {
        self.endpoint_id = Some(endpoint_id);
        self
    }

    pub fn with_permission_code(mut self, code: impl Into<String>) -> Self {
        self.permission_code = Some(code.into());
        self
    }

    pub fn decision(&self) -> Decision {
        Decision::from(self.allowed)
    }
}
