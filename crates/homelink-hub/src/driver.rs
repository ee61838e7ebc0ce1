//! Device driver capability interface and the type-to-driver registry.

use std::collections::HashMap;
use std::sync::Arc;

use homelink_core::{ApplianceDescriptor, ApplianceEvent, DeviceConnectivity};

use crate::DriverError;

/// Capability interface implemented by each appliance driver.
///
/// `parse_event` and `initialize` are mandatory. The remaining methods are
/// optional capabilities with no-op defaults: a driver that does not track
/// a concern simply leaves the default in place, and callers never need to
/// probe for the method's existence.
pub trait DeviceDriver: Send + Sync {
    /// Consume one routed stream event.
    ///
    /// # Errors
    /// Driver-specific; the router isolates and logs failures.
    fn parse_event(&self, event: &ApplianceEvent) -> Result<(), DriverError>;

    /// Prepare internal state after the handle is created.
    ///
    /// # Errors
    /// Driver-specific; the reconciler isolates and logs failures.
    fn initialize(&self) -> Result<(), DriverError>;

    /// Track per-appliance connectivity. Optional.
    fn update_connection_status(&self, _connectivity: DeviceConnectivity) {}

    /// Consume a status snapshot. Optional.
    ///
    /// # Errors
    /// Driver-specific; callers isolate and log failures.
    fn parse_status(&self, _json: &serde_json::Value) -> Result<(), DriverError> {
        Ok(())
    }

    /// Consume a settings snapshot. Optional.
    ///
    /// # Errors
    /// Driver-specific; callers isolate and log failures.
    fn parse_settings(&self, _json: &serde_json::Value) -> Result<(), DriverError> {
        Ok(())
    }

    /// Consume the active program, if the appliance runs one. Optional.
    ///
    /// # Errors
    /// Driver-specific; callers isolate and log failures.
    fn parse_active_program(&self, _json: &serde_json::Value) -> Result<(), DriverError> {
        Ok(())
    }

    /// Consume the available program list. Optional.
    ///
    /// # Errors
    /// Driver-specific; callers isolate and log failures.
    fn parse_available_programs(&self, _json: &serde_json::Value) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Constructor for one appliance type's driver.
pub type DriverFactory = Box<dyn Fn(&ApplianceDescriptor) -> Arc<dyn DeviceDriver> + Send + Sync>;

/// Static table mapping the platform's appliance-type tag to a driver
/// factory.
///
/// Populated once at startup; an unregistered type means the appliance is
/// skipped as unsupported, never a failure.
#[derive(Default)]
pub struct DriverRegistry {
    table: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for an appliance type tag.
    pub fn register(&mut self, appliance_type: impl Into<String>, factory: DriverFactory) {
        self.table.insert(appliance_type.into(), factory);
    }

    /// Whether a type tag has a registered driver.
    #[must_use]
    pub fn supports(&self, appliance_type: &str) -> bool {
        self.table.contains_key(appliance_type)
    }

    /// The registered type tags.
    #[must_use]
    pub fn supported_types(&self) -> Vec<&str> {
        self.table.keys().map(String::as_str).collect()
    }

    /// Build a driver for a descriptor, if its type is supported.
    #[must_use]
    pub fn create(&self, descriptor: &ApplianceDescriptor) -> Option<Arc<dyn DeviceDriver>> {
        self.table
            .get(&descriptor.appliance_type)
            .map(|factory| factory(descriptor))
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("types", &self.table.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homelink_core::ApplianceId;

    struct NoopDriver;

    impl DeviceDriver for NoopDriver {
        fn parse_event(&self, _event: &ApplianceEvent) -> Result<(), DriverError> {
            Ok(())
        }

        fn initialize(&self) -> Result<(), DriverError> {
            Ok(())
        }
    }

    fn descriptor(appliance_type: &str) -> ApplianceDescriptor {
        ApplianceDescriptor {
            appliance_id: ApplianceId::new("ap-1"),
            display_name: "Test".into(),
            appliance_type: appliance_type.into(),
        }
    }

    #[test]
    fn registered_type_creates_driver() {
        let mut registry = DriverRegistry::new();
        registry.register("Washer", Box::new(|_| Arc::new(NoopDriver)));

        assert!(registry.supports("Washer"));
        assert!(registry.create(&descriptor("Washer")).is_some());
    }

    #[test]
    fn unregistered_type_creates_nothing() {
        let registry = DriverRegistry::new();
        assert!(!registry.supports("Toaster"));
        assert!(registry.create(&descriptor("Toaster")).is_none());
    }

    #[test]
    fn optional_capabilities_default_to_noops() {
        let driver = NoopDriver;
        driver.update_connection_status(DeviceConnectivity::Connected);
        assert!(driver.parse_status(&serde_json::json!({})).is_ok());
        assert!(driver.parse_settings(&serde_json::json!({})).is_ok());
        assert!(driver.parse_active_program(&serde_json::json!({})).is_ok());
        assert!(driver.parse_available_programs(&serde_json::json!({})).is_ok());
    }
}
