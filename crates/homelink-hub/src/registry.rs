//! Local device handles and their registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use homelink_core::{
    ApplianceDescriptor, ApplianceEvent, ApplianceId, DeviceCommand, DeviceConnectivity, DeviceUid,
};
use homelink_platform::{PlatformClient, PlatformResult};

use crate::{DeviceDriver, DriverError};

/// Local stateful representation of one appliance.
///
/// Receives routed events through its driver and exposes control operations
/// that flow out through the platform funnel.
pub struct DeviceHandle {
    uid: DeviceUid,
    appliance_id: ApplianceId,
    display_name: String,
    appliance_type: String,
    driver: Arc<dyn DeviceDriver>,
    platform: Arc<PlatformClient>,
}

impl DeviceHandle {
    /// Create a handle for an appliance descriptor.
    #[must_use]
    pub fn for_appliance(
        descriptor: &ApplianceDescriptor,
        driver: Arc<dyn DeviceDriver>,
        platform: Arc<PlatformClient>,
    ) -> Self {
        Self {
            uid: DeviceUid::for_appliance(&descriptor.appliance_id),
            appliance_id: descriptor.appliance_id.clone(),
            display_name: descriptor.display_name.clone(),
            appliance_type: descriptor.appliance_type.clone(),
            driver,
            platform,
        }
    }

    /// Create a handle with an explicit uid.
    #[must_use]
    pub fn with_uid(
        uid: DeviceUid,
        descriptor: &ApplianceDescriptor,
        driver: Arc<dyn DeviceDriver>,
        platform: Arc<PlatformClient>,
    ) -> Self {
        Self {
            uid,
            appliance_id: descriptor.appliance_id.clone(),
            display_name: descriptor.display_name.clone(),
            appliance_type: descriptor.appliance_type.clone(),
            driver,
            platform,
        }
    }

    /// The local uid.
    #[must_use]
    pub const fn uid(&self) -> &DeviceUid {
        &self.uid
    }

    /// The appliance this handle mirrors.
    #[must_use]
    pub const fn appliance_id(&self) -> &ApplianceId {
        &self.appliance_id
    }

    /// Display name from the platform listing.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Platform type tag.
    #[must_use]
    pub fn appliance_type(&self) -> &str {
        &self.appliance_type
    }

    /// Forward one stream event to the driver.
    ///
    /// # Errors
    /// Propagates the driver's error for the caller to isolate.
    pub fn parse_event(&self, event: &ApplianceEvent) -> Result<(), DriverError> {
        self.driver.parse_event(event)
    }

    /// Run the driver's initialization hook.
    ///
    /// # Errors
    /// Propagates the driver's error for the caller to isolate.
    pub fn initialize(&self) -> Result<(), DriverError> {
        self.driver.initialize()
    }

    /// Forward a connectivity change; drivers without the capability ignore it.
    pub fn update_connection_status(&self, connectivity: DeviceConnectivity) {
        self.driver.update_connection_status(connectivity);
    }

    /// Forward a status snapshot.
    ///
    /// # Errors
    /// Propagates the driver's error for the caller to isolate.
    pub fn parse_status(&self, json: &serde_json::Value) -> Result<(), DriverError> {
        self.driver.parse_status(json)
    }

    /// Forward a settings snapshot.
    ///
    /// # Errors
    /// Propagates the driver's error for the caller to isolate.
    pub fn parse_settings(&self, json: &serde_json::Value) -> Result<(), DriverError> {
        self.driver.parse_settings(json)
    }

    /// Forward the active program.
    ///
    /// # Errors
    /// Propagates the driver's error for the caller to isolate.
    pub fn parse_active_program(&self, json: &serde_json::Value) -> Result<(), DriverError> {
        self.driver.parse_active_program(json)
    }

    /// Forward the available program list.
    ///
    /// # Errors
    /// Propagates the driver's error for the caller to isolate.
    pub fn parse_available_programs(&self, json: &serde_json::Value) -> Result<(), DriverError> {
        self.driver.parse_available_programs(json)
    }

    /// Issue a control command to the appliance.
    ///
    /// # Errors
    /// See [`PlatformClient::put_command`].
    pub async fn send_command(&self, command: &DeviceCommand) -> PlatformResult<()> {
        self.platform.put_command(&self.appliance_id, command).await
    }

    /// Start a program on the appliance.
    ///
    /// # Errors
    /// See [`PlatformClient::start_program`].
    pub async fn start_program(&self, program: &serde_json::Value) -> PlatformResult<()> {
        self.platform.start_program(&self.appliance_id, program).await
    }

    /// Stop the active program.
    ///
    /// # Errors
    /// See [`PlatformClient::stop_program`].
    pub async fn stop_program(&self) -> PlatformResult<()> {
        self.platform.stop_program(&self.appliance_id).await
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("uid", &self.uid)
            .field("appliance_type", &self.appliance_type)
            .finish_non_exhaustive()
    }
}

/// The set of instantiated device handles, keyed by uid.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<DeviceUid, Arc<DeviceHandle>>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle, replacing any previous one with the same uid.
    pub fn insert(&self, handle: Arc<DeviceHandle>) {
        self.devices.write().insert(handle.uid().clone(), handle);
    }

    /// Remove a handle by uid.
    pub fn remove(&self, uid: &DeviceUid) -> Option<Arc<DeviceHandle>> {
        self.devices.write().remove(uid)
    }

    /// Look up a handle by uid.
    #[must_use]
    pub fn get(&self, uid: &DeviceUid) -> Option<Arc<DeviceHandle>> {
        self.devices.read().get(uid).cloned()
    }

    /// Look up the handle mirroring an appliance.
    #[must_use]
    pub fn get_by_appliance(&self, appliance_id: &ApplianceId) -> Option<Arc<DeviceHandle>> {
        self.get(&DeviceUid::for_appliance(appliance_id))
    }

    /// All current uids.
    #[must_use]
    pub fn uids(&self) -> Vec<DeviceUid> {
        self.devices.read().keys().cloned().collect()
    }

    /// All current handles.
    #[must_use]
    pub fn handles(&self) -> Vec<Arc<DeviceHandle>> {
        self.devices.read().values().cloned().collect()
    }

    /// Number of handles, the stream singleton included if present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}
