//! Resource status reported back to the source of truth

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a resource whose status is written back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new<N: Into<String>, M: Into<String>>(kind: ResourceKind, namespace: N, name: M) -> Self {
        Self { kind, namespace: namespace.into(), name: name.into() }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Gateway,
    HttpRoute,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Gateway => write!(f, "Gateway"),
            ResourceKind::HttpRoute => write!(f, "HTTPRoute"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: bool,
    pub reason: String,
    pub message: String,
}

/// Latest status computed for a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    pub conditions: Vec<Condition>,
    pub observed_at: DateTime<Utc>,
}

impl ResourceStatus {
    pub fn accepted() -> Self {
        Self::single("Accepted", true, "Accepted", "Resource accepted")
    }

    pub fn rejected<S: Into<String>>(reason: &str, message: S) -> Self {
        Self::single("Accepted", false, reason, message)
    }

    pub fn single<S: Into<String>>(condition_type: &str, status: bool, reason: &str, message: S) -> Self {
        Self {
            conditions: vec![Condition {
                condition_type: condition_type.to_string(),
                status,
                reason: reason.to_string(),
                message: message.into(),
            }],
            observed_at: Utc::now(),
        }
    }

    /// True when every condition holds.
    pub fn is_ready(&self) -> bool {
        self.conditions.iter().all(|c| c.status)
    }
}
