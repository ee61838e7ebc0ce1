//! Event types delivered to device handles.

use serde::{Deserialize, Serialize};

use crate::ApplianceId;

/// One state-change item routed to a device handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplianceEvent {
    /// The appliance this event belongs to.
    pub appliance_id: ApplianceId,

    /// Event key (e.g. an operation-state or setting key).
    pub key: String,

    /// Event value.
    pub value: serde_json::Value,

    /// Optional unit for numeric values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Provider timestamp (seconds since epoch) when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ApplianceEvent {
    /// Create an event with just a key and value.
    pub fn new(appliance_id: ApplianceId, key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            appliance_id,
            key: key.into(),
            value,
            unit: None,
            timestamp: None,
        }
    }
}

/// Per-appliance connectivity as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceConnectivity {
    /// Appliance reachable from the platform.
    Connected,
    /// Appliance offline.
    Disconnected,
}

impl std::fmt::Display for DeviceConnectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}
