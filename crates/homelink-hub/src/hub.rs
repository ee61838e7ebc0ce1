//! Bridge wiring and runtime.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use url::Url;

use homelink_core::{ApplianceId, ConnectionState};
use homelink_oauth::{AuthFlow, AuthResult, TokenClient, TokenStore};
use homelink_platform::{
    ConnectionSupervisor, PlatformClient, PlatformError, StreamHandle, StreamMessage, StreamNotice,
};

use crate::{
    DeviceRegistry, DriverRegistry, EventRouter, HubConfig, HubResult, ReconcileReport, Reconciler,
};

/// The assembled bridge.
///
/// Owns the single credential store and the single platform client, and
/// injects them into the components that need them; nothing else touches
/// credentials or the connection directly.
pub struct Hub {
    config: HubConfig,
    store: Arc<TokenStore>,
    flow: AuthFlow,
    platform: Arc<PlatformClient>,
    registry: Arc<DeviceRegistry>,
    reconciler: Arc<Reconciler>,
    router: Arc<EventRouter>,
}

impl Hub {
    /// Assemble a hub from configuration and a driver table.
    ///
    /// # Errors
    /// Returns a configuration error if validation fails or the HTTP client
    /// cannot be built.
    pub fn new(config: HubConfig, drivers: DriverRegistry) -> HubResult<Self> {
        config.validate()?;

        // One client for everything; a client-wide timeout would sever the
        // event stream, so REST calls carry per-request timeouts instead.
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(PlatformError::from)?;

        let token_client = TokenClient::new(http.clone(), config.oauth_config()?);
        let store = Arc::new(TokenStore::new(token_client.clone()));
        let flow = AuthFlow::new(token_client, Arc::clone(&store));

        let api_base_url = Url::parse(&config.api_base_url)
            .map_err(|e| crate::HubError::Config(format!("api_base_url: {e}")))?;
        let platform = Arc::new(PlatformClient::new(http, api_base_url, Arc::clone(&store)));

        let registry = Arc::new(DeviceRegistry::new());
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&platform),
            Arc::clone(&registry),
            Arc::new(drivers),
            config.init_delay(),
        ));
        let router = Arc::new(EventRouter::new(
            Arc::clone(&registry),
            Arc::clone(&platform),
        ));

        Ok(Self {
            config,
            store,
            flow,
            platform,
            registry,
            reconciler,
            router,
        })
    }

    /// The loaded configuration.
    #[must_use]
    pub const fn config(&self) -> &HubConfig {
        &self.config
    }

    /// The authorization flow handler.
    #[must_use]
    pub const fn auth_flow(&self) -> &AuthFlow {
        &self.flow
    }

    /// The credential store.
    #[must_use]
    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// The platform REST funnel.
    #[must_use]
    pub fn platform(&self) -> &Arc<PlatformClient> {
        &self.platform
    }

    /// The device registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// The reconciler.
    #[must_use]
    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// The event router.
    #[must_use]
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Build the authorization URL for the user redirect.
    ///
    /// # Errors
    /// See [`AuthFlow::authorization_url`].
    pub fn authorization_url(&self) -> AuthResult<Url> {
        self.flow.authorization_url()
    }

    /// Handle the provider's OAuth callback.
    ///
    /// # Errors
    /// See [`AuthFlow::handle_callback`]; the host renders the outcome.
    pub async fn handle_oauth_callback(
        &self,
        params: &HashMap<String, String>,
    ) -> AuthResult<()> {
        self.flow.handle_callback(params).await
    }

    /// Reconcile the registry against the configured selection.
    ///
    /// # Errors
    /// See [`Reconciler::reconcile`].
    pub async fn apply_selection(&self) -> HubResult<ReconcileReport> {
        self.apply_selection_of(&self.config.selection()).await
    }

    /// Reconcile the registry against an explicit selection.
    ///
    /// # Errors
    /// See [`Reconciler::reconcile`].
    pub async fn apply_selection_of(
        &self,
        selection: &[ApplianceId],
    ) -> HubResult<ReconcileReport> {
        let report = self.reconciler.reconcile(selection).await?;
        info!(
            created = report.created.len(),
            removed = report.removed.len(),
            retained = report.retained.len(),
            "Selection reconciled"
        );
        Ok(report)
    }

    /// Open the event stream and start routing.
    #[must_use]
    pub fn connect(&self) -> HubRuntime {
        let supervisor = ConnectionSupervisor::new(
            self.platform.as_ref().clone(),
            self.config.stream_config(),
        );
        let stream = supervisor.spawn();
        let state_rx = stream.state_receiver();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pump = tokio::spawn(pump_notices(stream, Arc::clone(&self.router), shutdown_rx));

        HubRuntime {
            state_rx,
            shutdown_tx,
            pump,
        }
    }
}

/// A running stream-plus-router pairing.
pub struct HubRuntime {
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    pump: JoinHandle<()>,
}

impl HubRuntime {
    /// Current stream connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to connection-state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Stop the stream and the routing task.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.pump.await;
    }
}

async fn pump_notices(
    mut stream: StreamHandle,
    router: Arc<EventRouter>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            notice = stream.notices.recv() => {
                match notice {
                    None => break,
                    Some(StreamNotice::Resynced) => router.route_reconnect_refresh().await,
                    Some(StreamNotice::Message(StreamMessage::Events { events, .. })) => {
                        for event in &events {
                            router.route_event(event);
                        }
                    }
                    Some(StreamNotice::Message(StreamMessage::Connectivity {
                        appliance_id,
                        connectivity,
                    })) => {
                        router.route_connection_status(&appliance_id, connectivity);
                    }
                }
            }
        }
    }
    stream.shutdown().await;
}
