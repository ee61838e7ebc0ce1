//! Attribute-map driver usable for any appliance type.

use std::collections::HashMap;

use parking_lot::RwLock;

use homelink_core::{ApplianceEvent, ApplianceId, DeviceConnectivity};

use crate::{DeviceDriver, DriverError, DriverFactory};

/// Stores the latest value per event key, plus connectivity.
///
/// Suitable as the default driver for appliance types without a dedicated
/// implementation: everything the stream or a snapshot reports lands in one
/// inspectable attribute map.
#[derive(Debug)]
pub struct GenericDriver {
    appliance_id: ApplianceId,
    attributes: RwLock<HashMap<String, serde_json::Value>>,
    connectivity: RwLock<Option<DeviceConnectivity>>,
}

impl GenericDriver {
    /// Create a driver for one appliance.
    #[must_use]
    pub fn new(appliance_id: ApplianceId) -> Self {
        Self {
            appliance_id,
            attributes: RwLock::new(HashMap::new()),
            connectivity: RwLock::new(None),
        }
    }

    /// A factory for the driver registry.
    #[must_use]
    pub fn factory() -> DriverFactory {
        Box::new(|descriptor| std::sync::Arc::new(Self::new(descriptor.appliance_id.clone())))
    }

    /// The appliance this driver mirrors.
    #[must_use]
    pub const fn appliance_id(&self) -> &ApplianceId {
        &self.appliance_id
    }

    /// Latest value for one key.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<serde_json::Value> {
        self.attributes.read().get(key).cloned()
    }

    /// Snapshot of all attributes.
    #[must_use]
    pub fn attributes(&self) -> HashMap<String, serde_json::Value> {
        self.attributes.read().clone()
    }

    /// Last reported connectivity, if any.
    #[must_use]
    pub fn connectivity(&self) -> Option<DeviceConnectivity> {
        *self.connectivity.read()
    }

    fn absorb_items(&self, json: &serde_json::Value, section: &str) {
        // Snapshots arrive either bare or under a "data" envelope.
        let items = json
            .pointer(&format!("/data/{section}"))
            .or_else(|| json.get(section))
            .and_then(serde_json::Value::as_array);

        let Some(items) = items else {
            return;
        };

        let mut attributes = self.attributes.write();
        for item in items {
            if let Some(key) = item.get("key").and_then(serde_json::Value::as_str) {
                let value = item.get("value").cloned().unwrap_or(serde_json::Value::Null);
                attributes.insert(key.to_string(), value);
            }
        }
    }
}

impl DeviceDriver for GenericDriver {
    fn parse_event(&self, event: &ApplianceEvent) -> Result<(), DriverError> {
        self.attributes
            .write()
            .insert(event.key.clone(), event.value.clone());
        Ok(())
    }

    fn initialize(&self) -> Result<(), DriverError> {
        Ok(())
    }

    fn update_connection_status(&self, connectivity: DeviceConnectivity) {
        *self.connectivity.write() = Some(connectivity);
    }

    fn parse_status(&self, json: &serde_json::Value) -> Result<(), DriverError> {
        self.absorb_items(json, "status");
        Ok(())
    }

    fn parse_settings(&self, json: &serde_json::Value) -> Result<(), DriverError> {
        self.absorb_items(json, "settings");
        Ok(())
    }

    fn parse_active_program(&self, json: &serde_json::Value) -> Result<(), DriverError> {
        let program = json
            .pointer("/data/key")
            .or_else(|| json.get("key"))
            .and_then(serde_json::Value::as_str);
        if let Some(program) = program {
            self.attributes
                .write()
                .insert("ActiveProgram".to_string(), program.into());
        }
        Ok(())
    }

    fn parse_available_programs(&self, json: &serde_json::Value) -> Result<(), DriverError> {
        let programs = json
            .pointer("/data/programs")
            .or_else(|| json.get("programs"))
            .and_then(serde_json::Value::as_array);
        if let Some(programs) = programs {
            let keys: Vec<serde_json::Value> = programs
                .iter()
                .filter_map(|p| p.get("key").cloned())
                .collect();
            self.attributes
                .write()
                .insert("AvailablePrograms".to_string(), keys.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn driver() -> GenericDriver {
        GenericDriver::new(ApplianceId::new("ap-1"))
    }

    #[test]
    fn events_update_attributes() {
        let driver = driver();
        driver
            .parse_event(&ApplianceEvent::new(
                ApplianceId::new("ap-1"),
                "DoorState",
                json!("Open"),
            ))
            .unwrap();

        assert_eq!(driver.attribute("DoorState"), Some(json!("Open")));
    }

    #[test]
    fn status_snapshot_absorbs_items() {
        let driver = driver();
        driver
            .parse_status(&json!({
                "data": { "status": [
                    { "key": "DoorState", "value": "Closed" },
                    { "key": "PowerState", "value": "On" },
                ]}
            }))
            .unwrap();

        assert_eq!(driver.attribute("DoorState"), Some(json!("Closed")));
        assert_eq!(driver.attribute("PowerState"), Some(json!("On")));
    }

    #[test]
    fn bare_snapshot_shape_is_accepted() {
        let driver = driver();
        driver
            .parse_settings(&json!({
                "settings": [{ "key": "ChildLock", "value": false }]
            }))
            .unwrap();

        assert_eq!(driver.attribute("ChildLock"), Some(json!(false)));
    }

    #[test]
    fn snapshot_without_items_is_tolerated() {
        let driver = driver();
        driver.parse_status(&json!({})).unwrap();
        assert!(driver.attributes().is_empty());
    }

    #[test]
    fn active_program_lands_in_attributes() {
        let driver = driver();
        driver
            .parse_active_program(&json!({
                "data": { "key": "Cotton", "options": [] }
            }))
            .unwrap();

        assert_eq!(driver.attribute("ActiveProgram"), Some(json!("Cotton")));
    }

    #[test]
    fn connectivity_is_tracked() {
        let driver = driver();
        assert_eq!(driver.connectivity(), None);
        driver.update_connection_status(DeviceConnectivity::Connected);
        assert_eq!(driver.connectivity(), Some(DeviceConnectivity::Connected));
    }
}
