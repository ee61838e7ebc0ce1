//! End-to-end bridge behavior against a mock platform.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use homelink_core::{ApplianceEvent, ApplianceId};
use homelink_hub::{DeviceDriver, DriverError, DriverRegistry, Hub, HubConfig};
use homelink_oauth::{Credentials, TokenResponse};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
}

impl Recorder {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn push(&self, call: String) {
        self.calls.lock().push(call);
    }
}

struct RecordingDriver {
    id: ApplianceId,
    recorder: Arc<Recorder>,
}

impl DeviceDriver for RecordingDriver {
    fn parse_event(&self, event: &ApplianceEvent) -> Result<(), DriverError> {
        self.recorder.push(format!("{}:event:{}", self.id, event.key));
        Ok(())
    }

    fn initialize(&self) -> Result<(), DriverError> {
        self.recorder.push(format!("{}:init", self.id));
        Ok(())
    }

    fn parse_status(&self, _json: &serde_json::Value) -> Result<(), DriverError> {
        self.recorder.push(format!("{}:status", self.id));
        Ok(())
    }

    fn parse_settings(&self, _json: &serde_json::Value) -> Result<(), DriverError> {
        self.recorder.push(format!("{}:settings", self.id));
        Ok(())
    }
}

fn drivers(recorder: &Arc<Recorder>) -> DriverRegistry {
    let recorder = Arc::clone(recorder);
    let mut registry = DriverRegistry::new();
    registry.register(
        "Washer",
        Box::new(move |descriptor| {
            Arc::new(RecordingDriver {
                id: descriptor.appliance_id.clone(),
                recorder: Arc::clone(&recorder),
            })
        }),
    );
    registry
}

fn config(server: &MockServer, init_delay_s: u64) -> HubConfig {
    HubConfig::from_toml_str(&format!(
        r#"
        client_id = "client-1"
        client_secret = "secret-1"
        api_base_url = "{0}"
        authorize_url = "{0}/authorize"
        token_url = "{0}/token"
        callback_base_url = "https://hub.local/api"
        selected_appliances = ["ap-1"]
        backoff_initial_s = 1
        init_delay_s = {init_delay_s}
        "#,
        server.uri()
    ))
    .unwrap()
}

async fn authorize(hub: &Hub) {
    hub.token_store()
        .install(Credentials::from_response(TokenResponse {
            access_token: "access-1".into(),
            expires_in: 3600,
            refresh_token: Some("refresh-1".into()),
            token_type: None,
            scope: None,
        }))
        .await;
}

async fn wait_for(recorder: &Arc<Recorder>, needle: &str) {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if recorder.calls().iter().any(|c| c == needle) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {needle:?}; calls so far: {:?}",
            recorder.calls()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn mount_listing(server: &MockServer) -> Mock {
    Mock::given(method("GET"))
        .and(path("/appliances"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "haId": "ap-1", "name": "Washer", "type": "Washer" },
        ])))
}

#[tokio::test]
async fn first_install_fetches_listing_and_creates_devices() {
    let server = MockServer::start().await;
    let recorder = Arc::new(Recorder::default());

    // Empty descriptor cache: the reconciler itself must fetch the listing.
    mount_listing(&server).expect(1).mount(&server).await;

    let hub = Hub::new(config(&server, 300), drivers(&recorder)).unwrap();
    authorize(&hub).await;

    let report = hub.apply_selection().await.unwrap();

    assert_eq!(report.created.len(), 1);
    assert_eq!(hub.registry().len(), 1);
    hub.reconciler().cancel_pending_init();
}

#[tokio::test]
async fn deferred_init_fetches_and_parses_snapshots() {
    let server = MockServer::start().await;
    let recorder = Arc::new(Recorder::default());

    mount_listing(&server).mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/appliances/ap-1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "status": [{ "key": "DoorState", "value": "Closed" }] }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/appliances/ap-1/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "settings": [] }
        })))
        .mount(&server)
        .await;
    // No active program; the init pass must tolerate this.
    Mock::given(method("GET"))
        .and(path("/appliances/ap-1/programs/active"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "key": "SDK.Error.NoProgramActive" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/appliances/ap-1/programs/available"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "key": "SDK.Error.WrongOperationState" }
        })))
        .mount(&server)
        .await;

    let hub = Hub::new(config(&server, 0), drivers(&recorder)).unwrap();
    authorize(&hub).await;
    hub.apply_selection().await.unwrap();

    wait_for(&recorder, "ap-1:init").await;
    wait_for(&recorder, "ap-1:status").await;
    wait_for(&recorder, "ap-1:settings").await;
}

#[tokio::test]
async fn stream_events_reach_the_driver() {
    let server = MockServer::start().await;
    let recorder = Arc::new(Recorder::default());

    mount_listing(&server).mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/appliances/ap-1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "status": [] }
        })))
        .mount(&server)
        .await;

    let body = concat!(
        "id: ap-1\n",
        "event: NOTIFY\n",
        "data: {\"items\":[{\"key\":\"OperationState\",\"value\":\"Run\"}]}\n",
        "\n",
        "id: ghost\n",
        "event: NOTIFY\n",
        "data: {\"items\":[{\"key\":\"OperationState\",\"value\":\"Run\"}]}\n",
        "\n",
    );
    Mock::given(method("GET"))
        .and(path("/appliances/events"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"),
        )
        .mount(&server)
        .await;

    let hub = Hub::new(config(&server, 300), drivers(&recorder)).unwrap();
    authorize(&hub).await;
    hub.apply_selection().await.unwrap();

    let runtime = hub.connect();

    // The selected appliance's event arrives; the unselected one is dropped
    // without disturbing anything.
    wait_for(&recorder, "ap-1:event:OperationState").await;
    // The resync triggered by connecting refreshed status too.
    wait_for(&recorder, "ap-1:status").await;

    hub.reconciler().cancel_pending_init();
    runtime.shutdown().await;
}

#[tokio::test]
async fn reconnect_refresh_isolates_per_device_failures() {
    let server = MockServer::start().await;
    let recorder = Arc::new(Recorder::default());

    Mock::given(method("GET"))
        .and(path("/appliances"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "haId": "ap-1", "name": "Washer A", "type": "Washer" },
            { "haId": "ap-2", "name": "Washer B", "type": "Washer" },
        ])))
        .mount(&server)
        .await;
    // One device's refresh fails; the other must still be served.
    Mock::given(method("GET"))
        .and(path("/appliances/ap-1/status"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/appliances/ap-2/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "status": [] }
        })))
        .mount(&server)
        .await;

    let hub = Hub::new(config(&server, 300), drivers(&recorder)).unwrap();
    authorize(&hub).await;
    hub.apply_selection_of(&[ApplianceId::new("ap-1"), ApplianceId::new("ap-2")])
        .await
        .unwrap();

    hub.router().route_reconnect_refresh().await;

    let calls = recorder.calls();
    assert!(calls.contains(&"ap-2:status".to_string()));
    assert!(!calls.contains(&"ap-1:status".to_string()));
    hub.reconciler().cancel_pending_init();
}
