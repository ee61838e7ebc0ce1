//! Inbound event and status routing.

use std::sync::Arc;

use tracing::{debug, warn};

use homelink_core::{ApplianceEvent, ApplianceId, DeviceConnectivity};
use homelink_platform::PlatformClient;

use crate::DeviceRegistry;

/// Dispatches stream traffic to device handles.
///
/// Tolerates devices that do not exist (not selected, or not yet created)
/// and contains every per-device failure: one broken handle or malformed
/// event never disturbs the stream or the other devices.
pub struct EventRouter {
    registry: Arc<DeviceRegistry>,
    platform: Arc<PlatformClient>,
}

impl EventRouter {
    /// Create a router.
    #[must_use]
    pub fn new(registry: Arc<DeviceRegistry>, platform: Arc<PlatformClient>) -> Self {
        Self { registry, platform }
    }

    /// Route one stream event to its device handle.
    pub fn route_event(&self, event: &ApplianceEvent) {
        let Some(handle) = self.registry.get_by_appliance(&event.appliance_id) else {
            debug!(
                appliance = %event.appliance_id,
                key = %event.key,
                "Event for uninstantiated appliance, dropping"
            );
            return;
        };

        if let Err(err) = handle.parse_event(event) {
            warn!(uid = %handle.uid(), key = %event.key, error = %err, "Driver rejected event");
        }
    }

    /// Route a per-appliance connectivity change, best-effort.
    pub fn route_connection_status(
        &self,
        appliance_id: &ApplianceId,
        connectivity: DeviceConnectivity,
    ) {
        match self.registry.get_by_appliance(appliance_id) {
            Some(handle) => handle.update_connection_status(connectivity),
            None => debug!(
                appliance = %appliance_id,
                %connectivity,
                "Connectivity change for uninstantiated appliance, dropping"
            ),
        }
    }

    /// Refresh status for every device after a stream gap.
    ///
    /// The stream does not replay missed events, so each device gets a
    /// fresh snapshot. Only the status resource is fetched (the reduced-cost
    /// variant) to conserve the call budget; per-device failures are
    /// isolated so one broken handle does not block the rest.
    pub async fn route_reconnect_refresh(&self) {
        for handle in self.registry.handles() {
            if handle.uid().is_stream_singleton() {
                continue;
            }

            match self.platform.status(handle.appliance_id()).await {
                Ok(json) => {
                    if let Err(err) = handle.parse_status(&json) {
                        warn!(uid = %handle.uid(), error = %err, "Driver rejected refreshed status");
                    }
                }
                Err(err) => {
                    warn!(uid = %handle.uid(), error = %err, "Reconnect status refresh failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use url::Url;

    use homelink_core::ApplianceDescriptor;
    use homelink_oauth::{OAuthConfig, TokenClient, TokenStore};

    use crate::{DeviceDriver, DeviceHandle, DriverError};

    #[derive(Default)]
    struct RecordingDriver {
        events: Mutex<Vec<String>>,
        connectivity: Mutex<Vec<DeviceConnectivity>>,
        fail_events: bool,
    }

    impl DeviceDriver for RecordingDriver {
        fn parse_event(&self, event: &ApplianceEvent) -> Result<(), DriverError> {
            if self.fail_events {
                return Err(DriverError::new("refused"));
            }
            self.events.lock().push(event.key.clone());
            Ok(())
        }

        fn initialize(&self) -> Result<(), DriverError> {
            Ok(())
        }

        fn update_connection_status(&self, connectivity: DeviceConnectivity) {
            self.connectivity.lock().push(connectivity);
        }
    }

    fn platform() -> Arc<PlatformClient> {
        let config = OAuthConfig::new(
            "client-1",
            "secret-1",
            "https://auth.invalid/authorize",
            "https://auth.invalid/token",
            "https://hub.invalid/api",
        )
        .unwrap();
        let store = Arc::new(TokenStore::new(TokenClient::new(
            reqwest::Client::new(),
            config,
        )));
        Arc::new(PlatformClient::new(
            reqwest::Client::new(),
            Url::parse("https://api.invalid").unwrap(),
            store,
        ))
    }

    fn install(
        registry: &DeviceRegistry,
        id: &str,
        driver: Arc<RecordingDriver>,
    ) -> Arc<DeviceHandle> {
        let descriptor = ApplianceDescriptor {
            appliance_id: ApplianceId::new(id),
            display_name: id.to_string(),
            appliance_type: "Washer".into(),
        };
        let handle = Arc::new(DeviceHandle::for_appliance(&descriptor, driver, platform()));
        registry.insert(Arc::clone(&handle));
        handle
    }

    fn event(id: &str, key: &str) -> ApplianceEvent {
        ApplianceEvent::new(ApplianceId::new(id), key, serde_json::json!("On"))
    }

    #[test]
    fn routes_event_to_matching_handle() {
        let registry = Arc::new(DeviceRegistry::new());
        let driver = Arc::new(RecordingDriver::default());
        install(&registry, "ap-1", Arc::clone(&driver));

        let router = EventRouter::new(Arc::clone(&registry), platform());
        router.route_event(&event("ap-1", "PowerState"));

        assert_eq!(*driver.events.lock(), vec!["PowerState".to_string()]);
    }

    #[test]
    fn event_for_unknown_appliance_is_dropped() {
        let registry = Arc::new(DeviceRegistry::new());
        let router = EventRouter::new(registry, platform());

        // Must not panic or error.
        router.route_event(&event("ghost", "PowerState"));
    }

    #[test]
    fn driver_failure_does_not_propagate() {
        let registry = Arc::new(DeviceRegistry::new());
        let driver = Arc::new(RecordingDriver {
            fail_events: true,
            ..RecordingDriver::default()
        });
        install(&registry, "ap-1", Arc::clone(&driver));

        let router = EventRouter::new(Arc::clone(&registry), platform());
        router.route_event(&event("ap-1", "PowerState"));

        assert!(driver.events.lock().is_empty());
    }

    #[test]
    fn connectivity_is_forwarded_best_effort() {
        let registry = Arc::new(DeviceRegistry::new());
        let driver = Arc::new(RecordingDriver::default());
        install(&registry, "ap-1", Arc::clone(&driver));

        let router = EventRouter::new(Arc::clone(&registry), platform());
        router.route_connection_status(&ApplianceId::new("ap-1"), DeviceConnectivity::Disconnected);
        router.route_connection_status(&ApplianceId::new("ghost"), DeviceConnectivity::Connected);

        assert_eq!(
            *driver.connectivity.lock(),
            vec![DeviceConnectivity::Disconnected]
        );
    }
}
