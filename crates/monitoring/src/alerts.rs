//! Operator alert management.
//!
//! Alerts are deduplicated per `(alert_type, billboard_id, campaign_id)`:
//! re-raising while an alert for that tuple is unresolved updates it in
//! place. Acknowledge and resolve are one-way transitions; repeating one is
//! an error rather than a silent no-op.

use billboard_core::error::{FleetError, FleetResult};
use billboard_core::types::{Alert, AlertSeverity, AlertType};
use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

type DedupKey = (AlertType, Option<String>, Option<Uuid>);

/// Everything needed to raise (or refresh) an alert.
#[derive(Debug, Clone)]
pub struct AlertDraft {
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub billboard_id: Option<String>,
    pub campaign_id: Option<Uuid>,
}

impl AlertDraft {
    pub fn new(alert_type: AlertType, severity: AlertSeverity, title: &str, message: String) -> Self {
        Self {
            alert_type,
            severity,
            title: title.to_string(),
            message,
            metadata: serde_json::Value::Null,
            billboard_id: None,
            campaign_id: None,
        }
    }

    pub fn billboard(mut self, id: &str) -> Self {
        self.billboard_id = Some(id.to_string());
        self
    }

    pub fn campaign(mut self, id: Uuid) -> Self {
        self.campaign_id = Some(id);
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

pub struct AlertManager {
    alerts: DashMap<Uuid, Alert>,
    unresolved: DashMap<DedupKey, Uuid>,
}

impl AlertManager {
    pub fn new() -> Self {
        Self {
            alerts: DashMap::new(),
            unresolved: DashMap::new(),
        }
    }

    /// Create an alert, or refresh the unresolved alert for the same
    /// `(type, billboard, campaign)` tuple.
    pub fn raise(&self, draft: AlertDraft) -> Alert {
        let key: DedupKey = (
            draft.alert_type,
            draft.billboard_id.clone(),
            draft.campaign_id,
        );

        if let Some(existing_id) = self.unresolved.get(&key).map(|r| *r) {
            if let Some(mut entry) = self.alerts.get_mut(&existing_id) {
                let alert = entry.value_mut();
                if !alert.is_resolved() {
                    alert.severity = draft.severity;
                    alert.message = draft.message;
                    alert.metadata = draft.metadata;
                    alert.updated_at = Utc::now();
                    metrics::counter!("alerts.refreshed").increment(1);
                    return alert.clone();
                }
            }
            // Stale index entry; fall through and create a fresh alert.
            self.unresolved.remove(&key);
        }

        let now = Utc::now();
        let alert = Alert {
            id: Uuid::new_v4(),
            alert_type: draft.alert_type,
            severity: draft.severity,
            title: draft.title,
            message: draft.message,
            metadata: draft.metadata,
            billboard_id: draft.billboard_id,
            campaign_id: draft.campaign_id,
            created_at: now,
            updated_at: now,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
        };

        warn!(
            alert_id = %alert.id,
            alert_type = ?alert.alert_type,
            severity = ?alert.severity,
            billboard_id = ?alert.billboard_id,
            "Alert raised"
        );
        metrics::counter!("alerts.raised").increment(1);

        self.unresolved.insert(key, alert.id);
        self.alerts.insert(alert.id, alert.clone());
        alert
    }

    pub fn acknowledge(&self, id: Uuid, by: &str) -> FleetResult<Alert> {
        let mut entry = self
            .alerts
            .get_mut(&id)
            .ok_or_else(|| FleetError::NotFound(format!("alert {}", id)))?;
        let alert = entry.value_mut();
        if alert.is_resolved() {
            return Err(FleetError::AlertState(format!("alert {} already resolved", id)));
        }
        if alert.is_acknowledged() {
            return Err(FleetError::AlertState(format!(
                "alert {} already acknowledged",
                id
            )));
        }
        alert.acknowledged_at = Some(Utc::now());
        alert.acknowledged_by = Some(by.to_string());
        alert.updated_at = Utc::now();
        info!(alert_id = %id, by = %by, "Alert acknowledged");
        Ok(alert.clone())
    }

    pub fn resolve(&self, id: Uuid, by: &str) -> FleetResult<Alert> {
        let mut entry = self
            .alerts
            .get_mut(&id)
            .ok_or_else(|| FleetError::NotFound(format!("alert {}", id)))?;
        let alert = entry.value_mut();
        if alert.is_resolved() {
            return Err(FleetError::AlertState(format!("alert {} already resolved", id)));
        }
        alert.resolved_at = Some(Utc::now());
        alert.resolved_by = Some(by.to_string());
        alert.updated_at = Utc::now();
        info!(alert_id = %id, by = %by, "Alert resolved");

        let key: DedupKey = (
            alert.alert_type,
            alert.billboard_id.clone(),
            alert.campaign_id,
        );
        let snapshot = alert.clone();
        drop(entry);
        self.unresolved.remove(&key);
        Ok(snapshot)
    }

    pub fn get(&self, id: Uuid) -> Option<Alert> {
        self.alerts.get(&id).map(|r| r.clone())
    }

    pub fn list(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self.alerts.iter().map(|r| r.clone()).collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        alerts
    }

    pub fn list_unresolved(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .iter()
            .filter(|r| !r.is_resolved())
            .map(|r| r.clone())
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        alerts
    }

    pub fn unresolved_count(&self) -> usize {
        self.unresolved.len()
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new()
    }
}
