//! Heartbeat-timeout detection.
//!
//! Each sweep flips silent billboards offline and raises alerts. A billboard
//! that is offline with an ACTIVE booking escalates to CRITICAL, since the
//! advertiser's slot is burning on a dark screen.

use crate::alerts::{AlertDraft, AlertManager};
use billboard_core::types::{AlertSeverity, AlertType};
use billboard_core::store::{BillboardRepository, BookingRepository};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, warn};

pub struct HealthMonitor {
    billboards: Arc<dyn BillboardRepository>,
    bookings: Arc<dyn BookingRepository>,
    alerts: Arc<AlertManager>,
    offline_threshold: Duration,
}

impl HealthMonitor {
    pub fn new(
        billboards: Arc<dyn BillboardRepository>,
        bookings: Arc<dyn BookingRepository>,
        alerts: Arc<AlertManager>,
        offline_threshold_secs: i64,
    ) -> Self {
        Self {
            billboards,
            bookings,
            alerts,
            offline_threshold: Duration::seconds(offline_threshold_secs),
        }
    }

    /// Flip billboards whose heartbeat age exceeds the threshold offline and
    /// raise alerts. Returns how many were flipped.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut flipped = 0;

        for billboard in self.billboards.list_online() {
            let silent = match billboard.last_heartbeat {
                Some(at) => now - at > self.offline_threshold,
                // Marked online but never heartbeated: treat its whole
                // lifetime as silence.
                None => now - billboard.registered_at > self.offline_threshold,
            };
            if !silent {
                continue;
            }

            if let Err(e) = self.billboards.set_online(&billboard.id, false) {
                error!(billboard_id = %billboard.id, error = %e, "Failed to flip billboard offline");
                continue;
            }
            flipped += 1;
            metrics::counter!("health.billboard_offline").increment(1);

            let age_secs = billboard
                .last_heartbeat
                .map(|at| (now - at).num_seconds())
                .unwrap_or(-1);
            warn!(
                billboard_id = %billboard.id,
                heartbeat_age_secs = age_secs,
                "Billboard heartbeat timed out"
            );

            self.alerts.raise(
                AlertDraft::new(
                    AlertType::BillboardOffline,
                    AlertSeverity::High,
                    "Billboard offline",
                    format!(
                        "No heartbeat from {} for over {}s",
                        billboard.id,
                        self.offline_threshold.num_seconds()
                    ),
                )
                .billboard(&billboard.id)
                .metadata(serde_json::json!({ "heartbeat_age_secs": age_secs })),
            );

            if let Some(active) = self.bookings.active_for_billboard(&billboard.id) {
                self.alerts.raise(
                    AlertDraft::new(
                        AlertType::CampaignPerformance,
                        AlertSeverity::Critical,
                        "Active campaign on offline device",
                        format!(
                            "Billboard {} is offline while booking {} is active",
                            billboard.id, active.id
                        ),
                    )
                    .billboard(&billboard.id)
                    .campaign(active.campaign_id)
                    .metadata(serde_json::json!({ "booking_id": active.id })),
                );
            }
        }

        flipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billboard_core::store::{InMemoryBillboards, InMemoryBookings};
    use billboard_core::types::{
        Billboard, Booking, BookingStatus, PaymentStatus,
    };
    use uuid::Uuid;

    fn setup() -> (
        Arc<InMemoryBillboards>,
        Arc<InMemoryBookings>,
        Arc<AlertManager>,
        HealthMonitor,
    ) {
        let billboards = Arc::new(InMemoryBillboards::new());
        let bookings = Arc::new(InMemoryBookings::new());
        let alerts = Arc::new(AlertManager::new());
        let monitor = HealthMonitor::new(
            billboards.clone(),
            bookings.clone(),
            alerts.clone(),
            300,
        );
        (billboards, bookings, alerts, monitor)
    }

    fn online_billboard(billboards: &InMemoryBillboards, id: &str, heartbeat_age_secs: i64) {
        let mut b = Billboard::new(id.to_string(), id.to_string(), None, "key".to_string());
        b.is_online = true;
        b.last_heartbeat = Some(Utc::now() - Duration::seconds(heartbeat_age_secs));
        billboards.insert(b).unwrap();
    }

    fn active_booking(bookings: &InMemoryBookings, billboard_id: &str) -> Booking {
        let now = Utc::now();
        let b = Booking {
            id: Uuid::new_v4(),
            billboard_id: billboard_id.to_string(),
            campaign_id: Uuid::new_v4(),
            advertiser_id: "adv".to_string(),
            start_time: now - Duration::hours(1),
            end_time: now + Duration::hours(1),
            amount: 100.0,
            status: BookingStatus::Active,
            payment_status: PaymentStatus::Paid,
            payment_ref: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };
        bookings
            .insert_if_free(b, &[BookingStatus::Confirmed, BookingStatus::Active])
            .unwrap()
    }

    #[test]
    fn silent_billboard_goes_offline_with_alert() {
        let (billboards, _, alerts, monitor) = setup();
        online_billboard(&billboards, "bb-1", 301);
        online_billboard(&billboards, "bb-2", 10);

        let flipped = monitor.sweep(Utc::now());

        assert_eq!(flipped, 1);
        assert!(!billboards.get("bb-1").unwrap().is_online);
        assert!(billboards.get("bb-2").unwrap().is_online);
        assert_eq!(alerts.list_unresolved().len(), 1);
    }

    #[test]
    fn active_booking_escalates_to_critical_exactly_once() {
        let (billboards, bookings, alerts, monitor) = setup();
        online_billboard(&billboards, "bb-1", 301);
        active_booking(&bookings, "bb-1");

        monitor.sweep(Utc::now());
        // Device stays silent; later sweeps see it still online=false, so
        // re-flag by marking it online again as a reconnect would.
        billboards.set_online("bb-1", true).unwrap();
        monitor.sweep(Utc::now());

        let unresolved = alerts.list_unresolved();
        let critical: Vec<_> = unresolved
            .iter()
            .filter(|a| a.severity == AlertSeverity::Critical)
            .collect();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].alert_type, AlertType::CampaignPerformance);
    }

    #[test]
    fn fresh_heartbeat_is_left_alone() {
        let (billboards, _, alerts, monitor) = setup();
        online_billboard(&billboards, "bb-1", 5);

        assert_eq!(monitor.sweep(Utc::now()), 0);
        assert!(alerts.list().is_empty());
    }
}
