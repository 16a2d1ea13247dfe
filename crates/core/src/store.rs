//! Repository traits and in-memory implementations.
//!
//! All cross-state reasoning goes through id-based lookups on these traits
//! rather than traversing live object graphs. Booking transitions are
//! conditional (compare-and-set on the current status), the in-process
//! analogue of `UPDATE .. WHERE status = expected`, so concurrent attempts
//! to drive the same booking are safe: only one sees the expected prior
//! status. Backed by in-process maps for development; a durable store slots
//! in behind the same traits.

use crate::error::{ConflictWindow, FleetError, FleetResult};
use crate::types::{
    Billboard, Booking, BookingStatus, Campaign, CampaignStatus, DisplayCapabilities,
    PaymentStatus,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

pub trait BillboardRepository: Send + Sync {
    fn insert(&self, billboard: Billboard) -> FleetResult<Billboard>;
    fn get(&self, id: &str) -> Option<Billboard>;
    fn set_online(&self, id: &str, online: bool) -> FleetResult<()>;
    fn record_heartbeat(&self, id: &str, at: DateTime<Utc>) -> FleetResult<()>;
    fn update_registration(
        &self,
        id: &str,
        agent_version: &str,
        capabilities: DisplayCapabilities,
    ) -> FleetResult<Billboard>;
    fn list_online(&self) -> Vec<Billboard>;
}

pub trait CampaignRepository: Send + Sync {
    fn insert(&self, campaign: Campaign) -> FleetResult<Campaign>;
    fn get(&self, id: Uuid) -> Option<Campaign>;
    /// Conditional transition: succeeds only if the current status is one of
    /// `expected`.
    fn transition(
        &self,
        id: Uuid,
        expected: &[CampaignStatus],
        next: CampaignStatus,
        message: Option<String>,
    ) -> FleetResult<Campaign>;
}

pub trait BookingRepository: Send + Sync {
    /// Overlap check and insert as one atomic step: the booking is stored
    /// only if no booking in `conflict_statuses` on the same billboard has
    /// an intersecting `[start, end)` window.
    fn insert_if_free(
        &self,
        booking: Booking,
        conflict_statuses: &[BookingStatus],
    ) -> FleetResult<Booking>;
    fn get(&self, id: Uuid) -> Option<Booking>;
    /// Conditional transition from exactly `expected` to `next`.
    fn transition(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
    ) -> FleetResult<Booking>;
    /// Conditional transition from any of `expected` to `next`.
    fn transition_any(
        &self,
        id: Uuid,
        expected: &[BookingStatus],
        next: BookingStatus,
    ) -> FleetResult<Booking>;
    fn set_payment(
        &self,
        id: Uuid,
        status: PaymentStatus,
        payment_ref: Option<String>,
    ) -> FleetResult<Booking>;
    fn set_cancellation_reason(&self, id: Uuid, reason: &str) -> FleetResult<()>;
    /// CONFIRMED bookings with `start_time <= latest_start`, oldest first.
    fn due_activations(&self, latest_start: DateTime<Utc>) -> Vec<Booking>;
    /// ACTIVE bookings with `end_time <= now`, oldest first.
    fn due_completions(&self, now: DateTime<Utc>) -> Vec<Booking>;
    fn active_for_billboard(&self, billboard_id: &str) -> Option<Booking>;
    fn overlapping(
        &self,
        billboard_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        statuses: &[BookingStatus],
    ) -> Vec<Booking>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryBillboards {
    billboards: DashMap<String, Billboard>,
}

impl InMemoryBillboards {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BillboardRepository for InMemoryBillboards {
    fn insert(&self, billboard: Billboard) -> FleetResult<Billboard> {
        if self.billboards.contains_key(&billboard.id) {
            return Err(FleetError::Validation(format!(
                "billboard {} already exists",
                billboard.id
            )));
        }
        self.billboards
            .insert(billboard.id.clone(), billboard.clone());
        Ok(billboard)
    }

    fn get(&self, id: &str) -> Option<Billboard> {
        self.billboards.get(id).map(|r| r.clone())
    }

    fn set_online(&self, id: &str, online: bool) -> FleetResult<()> {
        let mut entry = self
            .billboards
            .get_mut(id)
            .ok_or_else(|| FleetError::NotFound(format!("billboard {}", id)))?;
        entry.is_online = online;
        Ok(())
    }

    fn record_heartbeat(&self, id: &str, at: DateTime<Utc>) -> FleetResult<()> {
        let mut entry = self
            .billboards
            .get_mut(id)
            .ok_or_else(|| FleetError::NotFound(format!("billboard {}", id)))?;
        entry.last_heartbeat = Some(at);
        entry.is_online = true;
        Ok(())
    }

    fn update_registration(
        &self,
        id: &str,
        agent_version: &str,
        capabilities: DisplayCapabilities,
    ) -> FleetResult<Billboard> {
        let mut entry = self
            .billboards
            .get_mut(id)
            .ok_or_else(|| FleetError::NotFound(format!("billboard {}", id)))?;
        entry.agent_version = Some(agent_version.to_string());
        entry.capabilities = capabilities;
        Ok(entry.clone())
    }

    fn list_online(&self) -> Vec<Billboard> {
        self.billboards
            .iter()
            .filter(|r| r.is_online)
            .map(|r| r.clone())
            .collect()
    }
}

#[derive(Default)]
pub struct InMemoryCampaigns {
    campaigns: DashMap<Uuid, Campaign>,
}

impl InMemoryCampaigns {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CampaignRepository for InMemoryCampaigns {
    fn insert(&self, campaign: Campaign) -> FleetResult<Campaign> {
        self.campaigns.insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    fn get(&self, id: Uuid) -> Option<Campaign> {
        self.campaigns.get(&id).map(|r| r.clone())
    }

    fn transition(
        &self,
        id: Uuid,
        expected: &[CampaignStatus],
        next: CampaignStatus,
        message: Option<String>,
    ) -> FleetResult<Campaign> {
        let mut entry = self
            .campaigns
            .get_mut(&id)
            .ok_or_else(|| FleetError::NotFound(format!("campaign {}", id)))?;
        if !expected.contains(&entry.status) {
            return Err(FleetError::InvalidCampaignTransition {
                from: entry.status,
                to: next,
            });
        }
        entry.status = next;
        entry.status_message = message;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }
}

/// Bookings live behind a single RwLock rather than a sharded map: the
/// overlap invariant spans multiple keys, and `insert_if_free` must hold the
/// write lock across check and insert.
#[derive(Default)]
pub struct InMemoryBookings {
    bookings: RwLock<HashMap<Uuid, Booking>>,
}

impl InMemoryBookings {
    pub fn new() -> Self {
        Self::default()
    }
}

fn conflicts_of(
    bookings: &HashMap<Uuid, Booking>,
    billboard_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    statuses: &[BookingStatus],
) -> Vec<Booking> {
    let mut hits: Vec<Booking> = bookings
        .values()
        .filter(|b| {
            b.billboard_id == billboard_id
                && statuses.contains(&b.status)
                && b.overlaps(start, end)
        })
        .cloned()
        .collect();
    hits.sort_by_key(|b| b.start_time);
    hits
}

impl BookingRepository for InMemoryBookings {
    fn insert_if_free(
        &self,
        booking: Booking,
        conflict_statuses: &[BookingStatus],
    ) -> FleetResult<Booking> {
        let mut map = self.bookings.write();
        let conflicts = conflicts_of(
            &map,
            &booking.billboard_id,
            booking.start_time,
            booking.end_time,
            conflict_statuses,
        );
        if !conflicts.is_empty() {
            return Err(FleetError::BookingConflict {
                conflicts: conflicts
                    .into_iter()
                    .map(|b| ConflictWindow {
                        booking_id: b.id,
                        start_time: b.start_time,
                        end_time: b.end_time,
                    })
                    .collect(),
            });
        }
        map.insert(booking.id, booking.clone());
        Ok(booking)
    }

    fn get(&self, id: Uuid) -> Option<Booking> {
        self.bookings.read().get(&id).cloned()
    }

    fn transition(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
    ) -> FleetResult<Booking> {
        self.transition_any(id, &[expected], next)
    }

    fn transition_any(
        &self,
        id: Uuid,
        expected: &[BookingStatus],
        next: BookingStatus,
    ) -> FleetResult<Booking> {
        let mut map = self.bookings.write();
        let booking = map
            .get_mut(&id)
            .ok_or_else(|| FleetError::NotFound(format!("booking {}", id)))?;
        if !expected.contains(&booking.status) {
            return Err(FleetError::InvalidTransition {
                from: booking.status,
                to: next,
            });
        }
        booking.status = next;
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }

    fn set_payment(
        &self,
        id: Uuid,
        status: PaymentStatus,
        payment_ref: Option<String>,
    ) -> FleetResult<Booking> {
        let mut map = self.bookings.write();
        let booking = map
            .get_mut(&id)
            .ok_or_else(|| FleetError::NotFound(format!("booking {}", id)))?;
        booking.payment_status = status;
        if payment_ref.is_some() {
            booking.payment_ref = payment_ref;
        }
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }

    fn set_cancellation_reason(&self, id: Uuid, reason: &str) -> FleetResult<()> {
        let mut map = self.bookings.write();
        let booking = map
            .get_mut(&id)
            .ok_or_else(|| FleetError::NotFound(format!("booking {}", id)))?;
        booking.cancellation_reason = Some(reason.to_string());
        booking.updated_at = Utc::now();
        Ok(())
    }

    fn due_activations(&self, latest_start: DateTime<Utc>) -> Vec<Booking> {
        let map = self.bookings.read();
        let mut due: Vec<Booking> = map
            .values()
            .filter(|b| b.status == BookingStatus::Confirmed && b.start_time <= latest_start)
            .cloned()
            .collect();
        due.sort_by_key(|b| b.start_time);
        due
    }

    fn due_completions(&self, now: DateTime<Utc>) -> Vec<Booking> {
        let map = self.bookings.read();
        let mut due: Vec<Booking> = map
            .values()
            .filter(|b| b.status == BookingStatus::Active && b.end_time <= now)
            .cloned()
            .collect();
        due.sort_by_key(|b| b.end_time);
        due
    }

    fn active_for_billboard(&self, billboard_id: &str) -> Option<Booking> {
        self.bookings
            .read()
            .values()
            .find(|b| b.billboard_id == billboard_id && b.status == BookingStatus::Active)
            .cloned()
    }

    fn overlapping(
        &self,
        billboard_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        statuses: &[BookingStatus],
    ) -> Vec<Booking> {
        conflicts_of(&self.bookings.read(), billboard_id, start, end, statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn booking(billboard: &str, start_days: i64, end_days: i64, status: BookingStatus) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            billboard_id: billboard.to_string(),
            campaign_id: Uuid::new_v4(),
            advertiser_id: "adv-1".to_string(),
            start_time: now + Duration::days(start_days),
            end_time: now + Duration::days(end_days),
            amount: 500.0,
            status,
            payment_status: PaymentStatus::Pending,
            payment_ref: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    const BLOCKING: &[BookingStatus] = &[
        BookingStatus::PendingPayment,
        BookingStatus::Confirmed,
        BookingStatus::Active,
    ];

    #[test]
    fn overlapping_insert_is_rejected_with_windows() {
        let repo = InMemoryBookings::new();
        let first = booking("bb-1", 0, 7, BookingStatus::Confirmed);
        let first_id = first.id;
        repo.insert_if_free(first, BLOCKING).unwrap();

        // [day3, day10) against [day0, day7) overlaps on day3..day7.
        let second = booking("bb-1", 3, 10, BookingStatus::PendingPayment);
        match repo.insert_if_free(second, BLOCKING) {
            Err(FleetError::BookingConflict { conflicts }) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].booking_id, first_id);
            }
            other => panic!("expected conflict, got {:?}", other.map(|b| b.id)),
        }
    }

    #[test]
    fn adjacent_and_other_billboard_are_free() {
        let repo = InMemoryBookings::new();
        repo.insert_if_free(booking("bb-1", 0, 7, BookingStatus::Active), BLOCKING)
            .unwrap();

        // Same billboard, back to back: [7, 10) after [0, 7).
        repo.insert_if_free(booking("bb-1", 7, 10, BookingStatus::Confirmed), BLOCKING)
            .unwrap();
        // Different billboard, overlapping window.
        repo.insert_if_free(booking("bb-2", 0, 7, BookingStatus::Confirmed), BLOCKING)
            .unwrap();
    }

    #[test]
    fn cancelled_bookings_release_the_slot() {
        let repo = InMemoryBookings::new();
        let held = repo
            .insert_if_free(booking("bb-1", 0, 7, BookingStatus::PendingPayment), BLOCKING)
            .unwrap();
        repo.transition_any(
            held.id,
            &[
                BookingStatus::PendingPayment,
                BookingStatus::Confirmed,
                BookingStatus::Active,
            ],
            BookingStatus::Cancelled,
        )
        .unwrap();

        repo.insert_if_free(booking("bb-1", 0, 7, BookingStatus::PendingPayment), BLOCKING)
            .unwrap();
    }

    #[test]
    fn conditional_transition_fires_once() {
        let repo = InMemoryBookings::new();
        let b = repo
            .insert_if_free(booking("bb-1", -1, 7, BookingStatus::Confirmed), BLOCKING)
            .unwrap();

        repo.transition(b.id, BookingStatus::Confirmed, BookingStatus::Active)
            .unwrap();
        let second = repo.transition(b.id, BookingStatus::Confirmed, BookingStatus::Active);
        assert!(matches!(
            second,
            Err(FleetError::InvalidTransition {
                from: BookingStatus::Active,
                ..
            })
        ));
    }

    #[test]
    fn due_selection_filters_by_status_and_time() {
        let repo = InMemoryBookings::new();
        let now = Utc::now();
        let due = repo
            .insert_if_free(booking("bb-1", -1, 7, BookingStatus::Confirmed), BLOCKING)
            .unwrap();
        repo.insert_if_free(booking("bb-2", 2, 9, BookingStatus::Confirmed), BLOCKING)
            .unwrap();
        repo.insert_if_free(booking("bb-3", -3, -1, BookingStatus::Active), BLOCKING)
            .unwrap();

        let activations = repo.due_activations(now + Duration::minutes(1));
        assert_eq!(activations.len(), 1);
        assert_eq!(activations[0].id, due.id);

        let completions = repo.due_completions(now);
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].billboard_id, "bb-3");
    }

    #[test]
    fn campaign_transition_guard() {
        let repo = InMemoryCampaigns::new();
        let c = repo
            .insert(Campaign::new(
                "bb-1".to_string(),
                vec![],
                Utc::now(),
                Utc::now() + Duration::days(1),
            ))
            .unwrap();

        let deployed = repo
            .transition(c.id, &[CampaignStatus::Pending], CampaignStatus::Deployed, None)
            .unwrap();
        assert_eq!(deployed.status, CampaignStatus::Deployed);

        let again = repo.transition(c.id, &[CampaignStatus::Pending], CampaignStatus::Deployed, None);
        assert!(matches!(
            again,
            Err(FleetError::InvalidCampaignTransition { .. })
        ));
    }
}
