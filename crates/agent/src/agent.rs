//! The agent main loop: register, connect, serve the socket, reconnect.
//!
//! The loop never gives up. Registration or connection failures are logged
//! and retried after the configured backoff, so a device that boots before
//! its control plane (or loses the network for an hour) converges on its
//! own.

use crate::content::ContentManager;
use crate::error::{AgentError, AgentResult};
use crate::telemetry::TelemetrySampler;
use billboard_core::config::AgentConfig;
use billboard_core::protocol::{DeviceMessage, DeviceStatus, RegisterRequest, ServerMessage};
use billboard_core::types::DisplayCapabilities;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct Playback {
    status: DeviceStatus,
    current_campaign: Option<Uuid>,
}

pub struct EdgeAgent {
    config: AgentConfig,
    http: reqwest::Client,
    content: Arc<ContentManager>,
    telemetry: Arc<TelemetrySampler>,
    playback: Arc<Mutex<Playback>>,
}

impl EdgeAgent {
    pub fn new(config: AgentConfig) -> Self {
        let http = reqwest::Client::new();
        let content = Arc::new(ContentManager::new(http.clone(), &config.content_dir));
        let telemetry = Arc::new(TelemetrySampler::new(
            content.clone(),
            config.content_quota_bytes,
        ));

        // Resume display from the persisted schedule after a restart.
        let playback = match content.store().load() {
            Ok(Some(schedule)) => {
                info!(campaign_id = %schedule.campaign_id, "Resuming persisted schedule");
                Playback {
                    status: DeviceStatus::Displaying,
                    current_campaign: Some(schedule.campaign_id),
                }
            }
            Ok(None) => Playback {
                status: DeviceStatus::Idle,
                current_campaign: None,
            },
            Err(e) => {
                warn!(error = %e, "Schedule file unreadable, starting idle");
                Playback {
                    status: DeviceStatus::Degraded,
                    current_campaign: None,
                }
            }
        };

        Self {
            config,
            http,
            content,
            telemetry,
            playback: Arc::new(Mutex::new(playback)),
        }
    }

    /// Announce this device to the control plane. Repeated on every
    /// reconnect cycle; the server treats it as an upsert of agent version
    /// and capabilities.
    pub async fn register(&self) -> AgentResult<()> {
        let url = format!(
            "{}/billboard/register",
            self.config.server_url.trim_end_matches('/')
        );
        let request = RegisterRequest {
            billboard_id: self.config.billboard_id.clone(),
            agent_version: self.config.agent_version.clone(),
            system_info: serde_json::json!({
                "os": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
            }),
            capabilities: DisplayCapabilities::default(),
        };
        self.http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        info!(billboard_id = %self.config.billboard_id, "Registered with control plane");
        Ok(())
    }

    /// Run forever: register, hold a WebSocket session until it drops, back
    /// off, repeat.
    pub async fn run(&self) {
        let backoff = Duration::from_secs(self.config.reconnect_secs.max(1));
        loop {
            if let Err(e) = self.register().await {
                warn!(error = %e, "Registration failed");
            } else {
                match self.serve_connection().await {
                    Ok(()) => info!("Connection closed by server"),
                    Err(e) => warn!(error = %e, "Connection lost"),
                }
            }
            tokio::time::sleep(backoff).await;
        }
    }

    fn ws_url(&self) -> AgentResult<Url> {
        let mut url = Url::parse(&self.config.server_url)?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| AgentError::Rejected(format!("unusable server url {}", url)))?;
        url.set_path(&format!("/billboard/{}/connect", self.config.billboard_id));
        Ok(url)
    }

    /// One full session: connect, pump heartbeats out and commands in,
    /// return when the socket dies.
    async fn serve_connection(&self) -> AgentResult<()> {
        let mut request = self.ws_url()?.into_client_request()?;
        request.headers_mut().insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))?,
        );
        request.headers_mut().insert(
            "billboard-id",
            HeaderValue::from_str(&self.config.billboard_id)?,
        );

        let (socket, _) = tokio_tungstenite::connect_async(request).await?;
        info!(billboard_id = %self.config.billboard_id, "Connected to control plane");
        let (mut sink, mut stream) = socket.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<DeviceMessage>();
        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        error!(error = %e, "Unserializable outbound message dropped");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        let heartbeat = {
            let tx = tx.clone();
            let telemetry = self.telemetry.clone();
            let playback = self.playback.clone();
            let billboard_id = self.config.billboard_id.clone();
            let period = Duration::from_secs(self.config.heartbeat_secs.max(1));
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    interval.tick().await;
                    let current = *playback.lock();
                    let message = DeviceMessage::Heartbeat {
                        billboard_id: billboard_id.clone(),
                        timestamp: Utc::now(),
                        status: current.status,
                        current_campaign: current.current_campaign,
                        system_status: telemetry.sample(),
                    };
                    if tx.send(message).is_err() {
                        break;
                    }
                }
            })
        };

        let result = loop {
            match stream.next().await {
                None => break Ok(()),
                Some(Err(e)) => break Err(AgentError::Socket(e)),
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMessage>(&text)
                {
                    Ok(message) => self.handle_server_message(message, &tx).await,
                    Err(e) => warn!(error = %e, "Unparseable frame dropped"),
                },
                Some(Ok(Message::Close(_))) => break Ok(()),
                Some(Ok(_)) => {}
            }
        };

        heartbeat.abort();
        drop(tx);
        let _ = writer.await;
        result
    }

    async fn handle_server_message(
        &self,
        message: ServerMessage,
        tx: &mpsc::UnboundedSender<DeviceMessage>,
    ) {
        match message {
            ServerMessage::NewCampaign {
                campaign_id,
                assets,
                start_time,
                end_time,
            } => {
                info!(campaign_id = %campaign_id, assets = assets.len(), "Campaign received");
                match self
                    .content
                    .deploy(campaign_id, &assets, start_time, end_time)
                    .await
                {
                    Ok(_) => {
                        {
                            let mut playback = self.playback.lock();
                            playback.status = DeviceStatus::Displaying;
                            playback.current_campaign = Some(campaign_id);
                        }
                        let _ = tx.send(DeviceMessage::CampaignDeployed { campaign_id });
                    }
                    Err(e) => {
                        error!(campaign_id = %campaign_id, error = %e, "Deployment failed");
                        let _ = tx.send(DeviceMessage::CampaignDeploymentFailed {
                            campaign_id,
                            message: e.to_string(),
                        });
                    }
                }
            }
            ServerMessage::StopCampaign { campaign_id } => {
                info!(campaign_id = %campaign_id, "Stop requested");
                if let Err(e) = self.content.remove_campaign(campaign_id).await {
                    warn!(campaign_id = %campaign_id, error = %e, "Content removal failed");
                }
                let mut playback = self.playback.lock();
                if playback.current_campaign == Some(campaign_id) {
                    playback.current_campaign = None;
                    playback.status = DeviceStatus::Idle;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(server_url: &str) -> AgentConfig {
        AgentConfig {
            server_url: server_url.to_string(),
            billboard_id: "bb-7".to_string(),
            api_key: "secret".to_string(),
            content_dir: std::env::temp_dir().join("agent-test-content"),
            heartbeat_secs: 30,
            reconnect_secs: 1,
            content_quota_bytes: 1024,
            agent_version: "0.1.0".to_string(),
        }
    }

    #[test]
    fn ws_url_maps_scheme_and_path() {
        let agent = EdgeAgent::new(config("http://fleet.local:8080"));
        assert_eq!(
            agent.ws_url().unwrap().as_str(),
            "ws://fleet.local:8080/billboard/bb-7/connect"
        );

        let secure = EdgeAgent::new(config("https://fleet.example.com"));
        assert_eq!(
            secure.ws_url().unwrap().as_str(),
            "wss://fleet.example.com/billboard/bb-7/connect"
        );
    }

    #[test]
    fn bad_server_url_is_an_error() {
        let agent = EdgeAgent::new(config("not a url"));
        assert!(matches!(agent.ws_url(), Err(AgentError::Url(_))));
    }

    #[tokio::test]
    async fn stop_for_unknown_campaign_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config("http://fleet.local:8080");
        cfg.content_dir = dir.path().to_path_buf();
        let agent = EdgeAgent::new(cfg);
        let (tx, _rx) = mpsc::unbounded_channel();

        agent
            .handle_server_message(
                ServerMessage::StopCampaign {
                    campaign_id: Uuid::new_v4(),
                },
                &tx,
            )
            .await;
        assert_eq!(agent.playback.lock().status, DeviceStatus::Idle);
    }
}
