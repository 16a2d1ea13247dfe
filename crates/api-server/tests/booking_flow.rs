//! End-to-end flow over real HTTP and WebSocket: provision a billboard,
//! connect a device, book, pay, activate, and cancel.

use billboard_api::{server, AppState};
use billboard_booking::{BookingLifecycleManager, BookingPolicy, SandboxGateway};
use billboard_core::protocol::{DeviceMessage, DeviceStatus, ServerMessage, SystemStatus};
use billboard_core::store::{
    CampaignRepository, InMemoryBillboards, InMemoryBookings, InMemoryCampaigns,
};
use billboard_core::types::CampaignStatus;
use billboard_fleet::FleetConnectionRegistry;
use billboard_monitoring::AlertManager;
use chrono::{Duration, Utc};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;

struct Harness {
    base: String,
    campaigns: Arc<InMemoryCampaigns>,
    client: reqwest::Client,
}

async fn harness() -> Harness {
    let billboards = Arc::new(InMemoryBillboards::new());
    let bookings = Arc::new(InMemoryBookings::new());
    let campaigns = Arc::new(InMemoryCampaigns::new());
    let alerts = Arc::new(AlertManager::new());
    let fleet = Arc::new(FleetConnectionRegistry::new(
        billboards.clone(),
        campaigns.clone(),
        alerts.clone(),
        16,
    ));
    let lifecycle = Arc::new(BookingLifecycleManager::new(
        bookings,
        campaigns.clone(),
        billboards.clone(),
        Arc::new(SandboxGateway),
        fleet.clone(),
        alerts.clone(),
        BookingPolicy::default(),
    ));
    let state = AppState {
        billboards,
        lifecycle,
        fleet,
        alerts,
        node_id: "test-node".to_string(),
        start_time: Instant::now(),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, server::router(state)).await.unwrap();
    });

    Harness {
        base: format!("http://{}", addr),
        campaigns,
        client: reqwest::Client::new(),
    }
}

impl Harness {
    async fn provision(&self, id: &str) -> String {
        let response = self
            .client
            .post(format!("{}/v1/billboards", self.base))
            .json(&serde_json::json!({"id": id, "name": "Test Site", "location": "Downtown"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
        let body: serde_json::Value = response.json().await.unwrap();
        body["api_key"].as_str().unwrap().to_string()
    }

    async fn register(&self, id: &str, api_key: &str) {
        let response = self
            .client
            .post(format!("{}/billboard/register", self.base))
            .bearer_auth(api_key)
            .json(&serde_json::json!({
                "billboard_id": id,
                "agent_version": "0.1.0",
                "capabilities": {"width_px": 3840, "height_px": 2160, "supports_video": true},
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    async fn connect_ws(
        &self,
        id: &str,
        api_key: &str,
    ) -> tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    > {
        let ws_url = format!(
            "ws{}/billboard/{}/connect",
            self.base.trim_start_matches("http"),
            id
        );
        let mut request = ws_url.into_client_request().unwrap();
        request.headers_mut().insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {}", api_key)).unwrap(),
        );
        let (socket, _) = tokio_tungstenite::connect_async(request).await.unwrap();
        socket
    }

    async fn create_booking(&self, billboard_id: &str) -> (serde_json::Value, reqwest::StatusCode) {
        let now = Utc::now();
        let response = self
            .client
            .post(format!("{}/v1/bookings", self.base))
            .json(&serde_json::json!({
                "billboard_id": billboard_id,
                "advertiser_id": "adv-1",
                "start_time": now - Duration::seconds(5),
                "end_time": now + Duration::hours(6),
                "amount": 450.0,
                "assets": [{
                    "url": "http://assets.local/spot.mp4",
                    "filename": "spot.mp4",
                    "checksum": "ab".repeat(32),
                    "duration_secs": 30,
                }],
            }))
            .send()
            .await
            .unwrap();
        let status = response.status();
        (response.json().await.unwrap(), status)
    }
}

async fn next_server_message(
    socket: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> ServerMessage {
    let frame = tokio::time::timeout(std::time::Duration::from_secs(5), socket.next())
        .await
        .expect("timed out waiting for server message")
        .expect("socket closed")
        .expect("socket error");
    match frame {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("unexpected frame {:?}", other),
    }
}

async fn wait_for_status(
    campaigns: &Arc<InMemoryCampaigns>,
    campaign_id: uuid::Uuid,
    expected: CampaignStatus,
) {
    for _ in 0..200 {
        if campaigns.get(campaign_id).map(|c| c.status) == Some(expected) {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("campaign never reached {:?}", expected);
}

#[tokio::test]
async fn booking_flow_end_to_end() {
    let h = harness().await;
    let api_key = h.provision("bb-1").await;
    h.register("bb-1", &api_key).await;
    let mut socket = h.connect_ws("bb-1", &api_key).await;

    // Book and pay.
    let (body, status) = h.create_booking("bb-1").await;
    assert_eq!(status, 201);
    let booking_id = body["booking"]["id"].as_str().unwrap().to_string();
    let payment_ref = body["payment_reference"].as_str().unwrap().to_string();

    let confirmed: serde_json::Value = h
        .client
        .post(format!("{}/v1/bookings/{}/confirm", h.base, booking_id))
        .json(&serde_json::json!({"payment_ref": payment_ref}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(confirmed["status"], "confirmed");
    assert_eq!(confirmed["payment_status"], "paid");

    // Activate: the connected device receives the campaign.
    let response = h
        .client
        .post(format!("{}/v1/bookings/{}/activate", h.base, booking_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let campaign_id = match next_server_message(&mut socket).await {
        ServerMessage::NewCampaign { campaign_id, assets, .. } => {
            assert_eq!(assets.len(), 1);
            campaign_id
        }
        other => panic!("expected new_campaign, got {:?}", other),
    };

    // Device acks, then reports it on screen.
    socket
        .send(Message::Text(
            serde_json::to_string(&DeviceMessage::CampaignDeployed { campaign_id }).unwrap(),
        ))
        .await
        .unwrap();
    wait_for_status(&h.campaigns, campaign_id, CampaignStatus::Deployed).await;

    socket
        .send(Message::Text(
            serde_json::to_string(&DeviceMessage::Heartbeat {
                billboard_id: "bb-1".to_string(),
                timestamp: Utc::now(),
                status: DeviceStatus::Displaying,
                current_campaign: Some(campaign_id),
                system_status: SystemStatus::default(),
            })
            .unwrap(),
        ))
        .await
        .unwrap();
    wait_for_status(&h.campaigns, campaign_id, CampaignStatus::Active).await;

    // Cancel: device is told to stop, payment refunded.
    let cancelled: serde_json::Value = h
        .client
        .post(format!("{}/v1/bookings/{}/cancel", h.base, booking_id))
        .json(&serde_json::json!({"reason": "advertiser request", "refund_amount": 450.0}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(cancelled["payment_status"], "refunded");

    match next_server_message(&mut socket).await {
        ServerMessage::StopCampaign { campaign_id: stopped } => {
            assert_eq!(stopped, campaign_id)
        }
        other => panic!("expected stop_campaign, got {:?}", other),
    }
}

#[tokio::test]
async fn overlapping_booking_returns_conflict_windows() {
    let h = harness().await;
    h.provision("bb-1").await;

    let (_, first) = h.create_booking("bb-1").await;
    assert_eq!(first, 201);

    let (body, status) = h.create_booking("bb-1").await;
    assert_eq!(status, 409);
    assert_eq!(body["error"], "booking_conflict");
    assert_eq!(body["conflicts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn websocket_requires_a_valid_key() {
    let h = harness().await;
    h.provision("bb-1").await;

    let ws_url = format!(
        "ws{}/billboard/bb-1/connect",
        h.base.trim_start_matches("http")
    );
    let mut request = ws_url.into_client_request().unwrap();
    request.headers_mut().insert(
        "authorization",
        HeaderValue::from_static("Bearer wrong-key"),
    );
    let err = tokio_tungstenite::connect_async(request).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 401)
        }
        other => panic!("expected http rejection, got {}", other),
    }
}

#[tokio::test]
async fn unknown_billboard_booking_is_404() {
    let h = harness().await;
    let (body, status) = h.create_booking("bb-404").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "not_found");
}
