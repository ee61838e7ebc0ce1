//! Selection reconciliation: diff the desired appliance set against the
//! instantiated device set and apply the difference.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use homelink_core::{ApplianceDescriptor, ApplianceId, DeviceUid};
use homelink_platform::PlatformClient;

use crate::{DeviceHandle, DeviceRegistry, DriverRegistry, HubResult};

/// What one reconciliation pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Handles created this pass.
    pub created: Vec<DeviceUid>,

    /// Handles removed this pass.
    pub removed: Vec<DeviceUid>,

    /// Handles left untouched.
    pub retained: Vec<DeviceUid>,

    /// Selected appliances skipped because no driver handles their type.
    pub unsupported: Vec<ApplianceId>,

    /// Selected appliances absent from the platform listing.
    pub unknown: Vec<ApplianceId>,
}

impl ReconcileReport {
    /// Whether the pass changed nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.removed.is_empty()
    }
}

/// Aligns the device registry with the user's appliance selection.
///
/// Idempotent and order-independent: retained devices are never recreated
/// or re-initialized, the stream singleton is never touched, and
/// per-appliance problems (unsupported type, unknown id) are skipped, not
/// fatal.
pub struct Reconciler {
    platform: Arc<PlatformClient>,
    registry: Arc<DeviceRegistry>,
    drivers: Arc<DriverRegistry>,
    descriptors: Mutex<Option<Vec<ApplianceDescriptor>>>,
    init_delay: Duration,
    init_task: Mutex<Option<JoinHandle<()>>>,
}

impl Reconciler {
    /// Create a reconciler.
    #[must_use]
    pub fn new(
        platform: Arc<PlatformClient>,
        registry: Arc<DeviceRegistry>,
        drivers: Arc<DriverRegistry>,
        init_delay: Duration,
    ) -> Self {
        Self {
            platform,
            registry,
            drivers,
            descriptors: Mutex::new(None),
            init_delay,
            init_task: Mutex::new(None),
        }
    }

    /// Seed the descriptor cache, e.g. from the selection page fetch.
    pub fn cache_descriptors(&self, descriptors: Vec<ApplianceDescriptor>) {
        *self.descriptors.lock() = Some(descriptors);
    }

    /// Drop the descriptor cache; the next pass re-fetches.
    pub fn invalidate_descriptors(&self) {
        *self.descriptors.lock() = None;
    }

    /// Reconcile the registry against `selection`.
    ///
    /// With an empty descriptor cache the listing is re-fetched first: right
    /// after install nothing has populated the cache yet, and silently
    /// creating zero devices would look like success.
    ///
    /// # Errors
    /// Only a failed descriptor fetch fails the pass; per-appliance problems
    /// are recorded in the report instead.
    pub async fn reconcile(&self, selection: &[ApplianceId]) -> HubResult<ReconcileReport> {
        let descriptors = self.descriptors_or_fetch().await?;
        let by_id: HashMap<&ApplianceId, &ApplianceDescriptor> = descriptors
            .iter()
            .map(|d| (&d.appliance_id, d))
            .collect();

        let existing: HashSet<DeviceUid> = self.registry.uids().into_iter().collect();
        let mut kept: HashSet<DeviceUid> = HashSet::new();
        let mut report = ReconcileReport::default();
        let mut created_handles: Vec<Arc<DeviceHandle>> = Vec::new();

        for appliance_id in selection {
            let uid = DeviceUid::for_appliance(appliance_id);
            if kept.contains(&uid) {
                continue; // duplicate selection entry
            }

            if existing.contains(&uid) {
                kept.insert(uid.clone());
                report.retained.push(uid);
                continue;
            }

            let Some(descriptor) = by_id.get(appliance_id) else {
                warn!(appliance = %appliance_id, "Selected appliance not in platform listing, skipping");
                report.unknown.push(appliance_id.clone());
                continue;
            };

            let Some(driver) = self.drivers.create(descriptor) else {
                info!(
                    appliance = %appliance_id,
                    appliance_type = %descriptor.appliance_type,
                    "No driver for appliance type, skipping as unsupported"
                );
                report.unsupported.push(appliance_id.clone());
                continue;
            };

            let handle = Arc::new(DeviceHandle::for_appliance(
                descriptor,
                driver,
                Arc::clone(&self.platform),
            ));
            info!(uid = %handle.uid(), appliance_type = %descriptor.appliance_type, "Creating device");
            self.registry.insert(Arc::clone(&handle));
            kept.insert(uid.clone());
            report.created.push(uid);
            created_handles.push(handle);
        }

        for uid in existing {
            if kept.contains(&uid) || uid.is_stream_singleton() {
                continue;
            }
            info!(uid = %uid, "Removing deselected device");
            self.registry.remove(&uid);
            report.removed.push(uid);
        }

        if !created_handles.is_empty() {
            self.schedule_initialization(created_handles);
        }

        Ok(report)
    }

    /// Abort a pending deferred-initialization pass, if any.
    pub fn cancel_pending_init(&self) {
        if let Some(task) = self.init_task.lock().take() {
            task.abort();
        }
    }

    async fn descriptors_or_fetch(&self) -> HubResult<Vec<ApplianceDescriptor>> {
        if let Some(cached) = self.descriptors.lock().clone() {
            return Ok(cached);
        }
        debug!("Descriptor cache empty, fetching appliance listing");
        let fetched = self.platform.appliances().await?;
        *self.descriptors.lock() = Some(fetched.clone());
        Ok(fetched)
    }

    /// Schedule the initialization pass for newly created handles.
    ///
    /// The delay gives the event stream time to attach, so initial status
    /// parses land on devices that already receive events.
    fn schedule_initialization(&self, handles: Vec<Arc<DeviceHandle>>) {
        let platform = Arc::clone(&self.platform);
        let delay = self.init_delay;

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for handle in handles {
                initialize_device(&platform, &handle).await;
            }
        });

        // Keep only the newest handle for cancellation; an older pass that
        // is still running finishes on its own.
        *self.init_task.lock() = Some(task);
    }
}

/// Fetch and apply initial state for one new device, isolating failures.
async fn initialize_device(platform: &PlatformClient, handle: &DeviceHandle) {
    debug!(uid = %handle.uid(), "Running deferred initialization");

    if let Err(err) = handle.initialize() {
        warn!(uid = %handle.uid(), error = %err, "Driver initialization failed");
    }

    match platform.status(handle.appliance_id()).await {
        Ok(json) => {
            if let Err(err) = handle.parse_status(&json) {
                warn!(uid = %handle.uid(), error = %err, "Driver rejected status snapshot");
            }
        }
        Err(err) => warn!(uid = %handle.uid(), error = %err, "Status fetch failed"),
    }

    match platform.settings(handle.appliance_id()).await {
        Ok(json) => {
            if let Err(err) = handle.parse_settings(&json) {
                warn!(uid = %handle.uid(), error = %err, "Driver rejected settings snapshot");
            }
        }
        Err(err) => warn!(uid = %handle.uid(), error = %err, "Settings fetch failed"),
    }

    // Best-effort: many appliances simply have no active program, and the
    // platform answers that with an error.
    match platform.active_program(handle.appliance_id()).await {
        Ok(json) => {
            if let Err(err) = handle.parse_active_program(&json) {
                warn!(uid = %handle.uid(), error = %err, "Driver rejected active program");
            }
        }
        Err(err) => debug!(uid = %handle.uid(), error = %err, "No active program"),
    }

    match platform.available_programs(handle.appliance_id()).await {
        Ok(json) => {
            if let Err(err) = handle.parse_available_programs(&json) {
                warn!(uid = %handle.uid(), error = %err, "Driver rejected program list");
            }
        }
        Err(err) => debug!(uid = %handle.uid(), error = %err, "No program list"),
    }
}
