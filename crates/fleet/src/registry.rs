//! In-memory registry of live device sessions.
//!
//! One entry per open WebSocket: the registry owns the outbound half as an
//! unbounded channel sender; the socket task forwards from the paired
//! receiver. Entries are ephemeral: nothing survives a restart, reconnects
//! repopulate the map. Campaigns pushed to an offline device land in a
//! bounded per-billboard FIFO that is flushed on the next connect.
//!
//! All mutations are synchronous map operations. In particular `connect`
//! never suspends between registering the sender and flushing the pending
//! queue, so a concurrent `deploy_campaign` either lands in the queue before
//! the flush or goes straight to the new session; it cannot be stranded.

use billboard_core::error::{FleetError, FleetResult};
use billboard_core::protocol::{DeviceMessage, DeviceStatus, ServerMessage};
use billboard_core::store::{BillboardRepository, CampaignRepository};
use billboard_core::types::{AlertSeverity, AlertType, CampaignStatus};
use billboard_monitoring::{AlertDraft, AlertManager};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of a `deploy_campaign` call. Queued is not a failure: offline
/// delivery is at-least-once via the pending queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent,
    Queued,
}

struct Session {
    sender: mpsc::UnboundedSender<ServerMessage>,
    connected_at: DateTime<Utc>,
    last_heartbeat: DateTime<Utc>,
}

pub struct FleetConnectionRegistry {
    billboards: Arc<dyn BillboardRepository>,
    campaigns: Arc<dyn CampaignRepository>,
    alerts: Arc<AlertManager>,
    sessions: DashMap<String, Session>,
    pending: DashMap<String, VecDeque<ServerMessage>>,
    queue_limit: usize,
}

impl FleetConnectionRegistry {
    pub fn new(
        billboards: Arc<dyn BillboardRepository>,
        campaigns: Arc<dyn CampaignRepository>,
        alerts: Arc<AlertManager>,
        queue_limit: usize,
    ) -> Self {
        Self {
            billboards,
            campaigns,
            alerts,
            sessions: DashMap::new(),
            pending: DashMap::new(),
            queue_limit,
        }
    }

    /// Authenticate a device and register its session. Returns the receiver
    /// the socket task forwards to the wire. Any messages queued while the
    /// device was offline are flushed FIFO into the new session first.
    pub fn connect(
        &self,
        billboard_id: &str,
        api_key: &str,
    ) -> FleetResult<mpsc::UnboundedReceiver<ServerMessage>> {
        let billboard = self
            .billboards
            .get(billboard_id)
            .ok_or_else(|| FleetError::Auth(format!("unknown billboard {}", billboard_id)))?;
        if billboard.api_key != api_key {
            metrics::counter!("fleet.auth_failures").increment(1);
            return Err(FleetError::Auth(format!(
                "bad credential for billboard {}",
                billboard_id
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let now = Utc::now();
        let replaced = self
            .sessions
            .insert(
                billboard_id.to_string(),
                Session {
                    sender: tx.clone(),
                    connected_at: now,
                    last_heartbeat: now,
                },
            )
            .is_some();
        if replaced {
            debug!(billboard_id = %billboard_id, "Replaced stale session on reconnect");
        }

        // A live socket is proof of life: refresh the stored heartbeat along
        // with the online flag, or a health sweep firing before the first
        // heartbeat frame would flip a freshly reconnected device offline.
        self.billboards.record_heartbeat(billboard_id, now)?;

        let mut flushed = 0usize;
        if let Some((_, queue)) = self.pending.remove(billboard_id) {
            for msg in queue {
                if tx.send(msg).is_err() {
                    break;
                }
                flushed += 1;
            }
        }

        info!(
            billboard_id = %billboard_id,
            flushed_pending = flushed,
            "Billboard connected"
        );
        metrics::counter!("fleet.connects").increment(1);
        metrics::gauge!("fleet.connected").set(self.sessions.len() as f64);

        Ok(rx)
    }

    /// Remove a session and flip the billboard offline. Safe to call twice;
    /// the WS handler invokes it on clean close and on any socket error.
    pub fn disconnect(&self, billboard_id: &str) {
        if self.sessions.remove(billboard_id).is_some() {
            info!(billboard_id = %billboard_id, "Billboard disconnected");
            metrics::counter!("fleet.disconnects").increment(1);
            metrics::gauge!("fleet.connected").set(self.sessions.len() as f64);
            if let Err(e) = self.billboards.set_online(billboard_id, false) {
                warn!(billboard_id = %billboard_id, error = %e, "Failed to flip billboard offline");
            }
        }
    }

    pub fn is_connected(&self, billboard_id: &str) -> bool {
        self.sessions.contains_key(billboard_id)
    }

    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    /// Push a campaign payload to a device: sent immediately when a live
    /// session exists, queued otherwise. A send failure means the session
    /// died under us; it is torn down and the payload queued.
    pub fn deploy_campaign(&self, billboard_id: &str, payload: ServerMessage) -> DeliveryStatus {
        if let Some(session) = self.sessions.get(billboard_id) {
            match session.sender.send(payload) {
                Ok(()) => {
                    metrics::counter!("fleet.deploys", "path" => "live").increment(1);
                    return DeliveryStatus::Sent;
                }
                Err(mpsc::error::SendError(payload)) => {
                    drop(session);
                    warn!(billboard_id = %billboard_id, "Send to dead session, tearing down");
                    self.disconnect(billboard_id);
                    self.enqueue(billboard_id, payload);
                    return DeliveryStatus::Queued;
                }
            }
        }
        self.enqueue(billboard_id, payload);
        DeliveryStatus::Queued
    }

    fn enqueue(&self, billboard_id: &str, payload: ServerMessage) {
        let mut queue = self.pending.entry(billboard_id.to_string()).or_default();
        if queue.len() >= self.queue_limit {
            let dropped = queue.pop_front();
            warn!(
                billboard_id = %billboard_id,
                limit = self.queue_limit,
                "Pending queue full, dropping oldest payload"
            );
            metrics::counter!("fleet.queue_dropped").increment(1);
            let dropped_campaign = dropped.and_then(|m| match m {
                ServerMessage::NewCampaign { campaign_id, .. } => Some(campaign_id),
                ServerMessage::StopCampaign { .. } => None,
            });
            let mut draft = AlertDraft::new(
                AlertType::QueueOverflow,
                AlertSeverity::Warning,
                "Pending campaign queue overflow",
                format!(
                    "Dropped oldest queued payload for offline billboard {}",
                    billboard_id
                ),
            )
            .billboard(billboard_id);
            if let Some(campaign_id) = dropped_campaign {
                draft = draft.campaign(campaign_id);
            }
            self.alerts.raise(draft);
        }
        queue.push_back(payload);
        metrics::counter!("fleet.deploys", "path" => "queued").increment(1);
    }

    /// Tell a device to stop displaying a campaign. Best-effort only and
    /// never queued: an offline device is not displaying anything.
    pub fn stop_campaign(&self, billboard_id: &str, campaign_id: Uuid) {
        match self.sessions.get(billboard_id) {
            Some(session) => {
                if session
                    .sender
                    .send(ServerMessage::StopCampaign { campaign_id })
                    .is_err()
                {
                    debug!(billboard_id = %billboard_id, %campaign_id, "Stop dropped, session dead");
                }
            }
            None => {
                debug!(billboard_id = %billboard_id, %campaign_id, "Stop skipped, device offline");
            }
        }
    }

    pub fn pending_count(&self, billboard_id: &str) -> usize {
        self.pending.get(billboard_id).map_or(0, |q| q.len())
    }

    /// Dispatch a message received from a device. Each message kind is an
    /// independent idempotent update; nothing here can crash the connection.
    pub fn handle_inbound(&self, billboard_id: &str, message: DeviceMessage) {
        match message {
            DeviceMessage::Heartbeat {
                timestamp,
                status,
                current_campaign,
                system_status,
                ..
            } => {
                if let Some(mut session) = self.sessions.get_mut(billboard_id) {
                    session.last_heartbeat = timestamp;
                }
                if let Err(e) = self.billboards.record_heartbeat(billboard_id, timestamp) {
                    warn!(billboard_id = %billboard_id, error = %e, "Heartbeat for unknown billboard");
                    return;
                }
                metrics::counter!("fleet.heartbeats").increment(1);
                metrics::gauge!("fleet.device_cpu", "billboard" => billboard_id.to_string())
                    .set(system_status.cpu_usage as f64);

                // Device-confirmed display: the first heartbeat reporting
                // the campaign on screen moves Deployed -> Active.
                if status == DeviceStatus::Displaying {
                    if let Some(campaign_id) = current_campaign {
                        let _ = self.campaigns.transition(
                            campaign_id,
                            &[CampaignStatus::Deployed],
                            CampaignStatus::Active,
                            None,
                        );
                    }
                }
            }
            DeviceMessage::CampaignDeployed { campaign_id } => {
                info!(billboard_id = %billboard_id, %campaign_id, "Campaign deployment acknowledged");
                metrics::counter!("fleet.deploy_acks").increment(1);
                if let Err(e) = self.campaigns.transition(
                    campaign_id,
                    &[CampaignStatus::Pending],
                    CampaignStatus::Deployed,
                    None,
                ) {
                    debug!(%campaign_id, error = %e, "Deployment ack for campaign not pending");
                }
            }
            DeviceMessage::CampaignDeploymentFailed {
                campaign_id,
                message,
            } => {
                warn!(
                    billboard_id = %billboard_id,
                    %campaign_id,
                    reason = %message,
                    "Campaign deployment failed on device"
                );
                metrics::counter!("fleet.deploy_failures").increment(1);
                let _ = self.campaigns.transition(
                    campaign_id,
                    &[
                        CampaignStatus::Pending,
                        CampaignStatus::Deployed,
                        CampaignStatus::Active,
                    ],
                    CampaignStatus::Failed,
                    Some(message.clone()),
                );
                self.alerts.raise(
                    AlertDraft::new(
                        AlertType::DeploymentFailed,
                        AlertSeverity::High,
                        "Campaign deployment failed",
                        format!(
                            "Billboard {} rejected campaign {}: {}",
                            billboard_id, campaign_id, message
                        ),
                    )
                    .billboard(billboard_id)
                    .campaign(campaign_id),
                );
            }
        }
    }

    /// Heartbeat age of a live session, if any. Used by status surfaces.
    pub fn session_heartbeat_age(&self, billboard_id: &str, now: DateTime<Utc>) -> Option<i64> {
        self.sessions
            .get(billboard_id)
            .map(|s| (now - s.last_heartbeat).num_seconds())
    }

    /// How long the current session has been up, if any.
    pub fn session_uptime_secs(&self, billboard_id: &str, now: DateTime<Utc>) -> Option<i64> {
        self.sessions
            .get(billboard_id)
            .map(|s| (now - s.connected_at).num_seconds())
    }
}
