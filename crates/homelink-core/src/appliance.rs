//! Appliance identifiers and descriptors.

use serde::{Deserialize, Serialize};

/// Prefix for locally derived device uids.
pub const DEVICE_UID_PREFIX: &str = "homelink-";

/// Reserved uid for the hub's own stream-connection handle.
///
/// Reconciliation must never create or delete this device.
pub const STREAM_DEVICE_UID: &str = "homelink-hub-stream";

/// The platform's stable external identifier for one physical appliance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplianceId(String);

impl ApplianceId {
    /// Create an appliance id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ApplianceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ApplianceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Local device identifier, derived injectively from an appliance id.
///
/// Stripping [`DEVICE_UID_PREFIX`] recovers the appliance id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceUid(String);

impl DeviceUid {
    /// Derive the uid for an appliance.
    #[must_use]
    pub fn for_appliance(id: &ApplianceId) -> Self {
        Self(format!("{DEVICE_UID_PREFIX}{id}"))
    }

    /// The reserved uid of the stream-connection handle.
    #[must_use]
    pub fn stream_singleton() -> Self {
        Self(STREAM_DEVICE_UID.to_string())
    }

    /// Whether this is the reserved stream-connection uid.
    #[must_use]
    pub fn is_stream_singleton(&self) -> bool {
        self.0 == STREAM_DEVICE_UID
    }

    /// Recover the appliance id, if this uid was derived from one.
    #[must_use]
    pub fn appliance_id(&self) -> Option<ApplianceId> {
        if self.is_stream_singleton() {
            return None;
        }
        self.0.strip_prefix(DEVICE_UID_PREFIX).map(ApplianceId::from)
    }

    /// The raw uid string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One appliance as listed by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplianceDescriptor {
    /// Stable external identifier.
    #[serde(rename = "applianceId", alias = "haId")]
    pub appliance_id: ApplianceId,

    /// Human-readable name.
    #[serde(rename = "name")]
    pub display_name: String,

    /// Platform type tag (e.g. "Washer", "Oven").
    #[serde(rename = "type")]
    pub appliance_type: String,
}

/// A control command addressed to one appliance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCommand {
    /// Command key.
    pub key: String,

    /// Command value.
    pub value: serde_json::Value,
}

impl DeviceCommand {
    /// Create a command.
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}
