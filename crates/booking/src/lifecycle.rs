//! The booking state machine.
//!
//! `PENDING_PAYMENT -> CONFIRMED -> ACTIVE -> COMPLETED`, with `CANCELLED`
//! reachable from any non-terminal state. Every transition is a conditional
//! update against the repository, so a racing scheduler sweep and an admin
//! force-activate cannot both succeed.
//!
//! Slot occupancy is time-based, not deployment-success-based: a deployment
//! failure after activation surfaces as a failed campaign plus an alert and
//! never rolls the booking back out of ACTIVE.

use crate::payment::{PaymentGateway, PaymentSession};
use billboard_core::error::{FleetError, FleetResult};
use billboard_core::protocol::ServerMessage;
use billboard_core::store::{BillboardRepository, BookingRepository, CampaignRepository};
use billboard_core::types::{
    AlertSeverity, AlertType, Booking, BookingStatus, Campaign, CampaignStatus, CreativeAsset,
    PaymentStatus,
};
use billboard_core::config::BookingConfig;
use billboard_fleet::{DeliveryStatus, FleetConnectionRegistry};
use billboard_monitoring::{AlertDraft, AlertManager};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Validation policy applied at booking creation.
#[derive(Debug, Clone)]
pub struct BookingPolicy {
    pub min_duration: Duration,
    pub blackout_dates: Vec<NaiveDate>,
    pub include_pending_in_conflicts: bool,
}

impl BookingPolicy {
    pub fn from_config(config: &BookingConfig) -> Self {
        Self {
            min_duration: Duration::minutes(config.min_duration_mins),
            blackout_dates: config.blackout_dates.clone(),
            include_pending_in_conflicts: config.include_pending_in_conflicts,
        }
    }

    fn conflict_statuses(&self) -> Vec<BookingStatus> {
        if self.include_pending_in_conflicts {
            vec![
                BookingStatus::PendingPayment,
                BookingStatus::Confirmed,
                BookingStatus::Active,
            ]
        } else {
            vec![BookingStatus::Confirmed, BookingStatus::Active]
        }
    }
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self::from_config(&BookingConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub billboard_id: String,
    pub advertiser_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub amount: f64,
    pub assets: Vec<CreativeAsset>,
}

pub struct BookingLifecycleManager {
    bookings: Arc<dyn BookingRepository>,
    campaigns: Arc<dyn CampaignRepository>,
    billboards: Arc<dyn BillboardRepository>,
    gateway: Arc<dyn PaymentGateway>,
    fleet: Arc<FleetConnectionRegistry>,
    alerts: Arc<AlertManager>,
    policy: BookingPolicy,
}

impl BookingLifecycleManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        campaigns: Arc<dyn CampaignRepository>,
        billboards: Arc<dyn BillboardRepository>,
        gateway: Arc<dyn PaymentGateway>,
        fleet: Arc<FleetConnectionRegistry>,
        alerts: Arc<AlertManager>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            bookings,
            campaigns,
            billboards,
            gateway,
            fleet,
            alerts,
            policy,
        }
    }

    fn validate(&self, request: &BookingRequest) -> FleetResult<()> {
        if request.start_time >= request.end_time {
            return Err(FleetError::Validation(
                "start_time must be before end_time".to_string(),
            ));
        }
        if request.end_time - request.start_time < self.policy.min_duration {
            return Err(FleetError::Validation(format!(
                "booking must run for at least {} minutes",
                self.policy.min_duration.num_minutes()
            )));
        }
        if request.amount <= 0.0 {
            return Err(FleetError::Validation("amount must be positive".to_string()));
        }
        if request.assets.is_empty() {
            return Err(FleetError::Validation(
                "campaign needs at least one asset".to_string(),
            ));
        }
        for asset in &request.assets {
            if asset.checksum.len() != 64 || !asset.checksum.chars().all(|c| c.is_ascii_hexdigit())
            {
                return Err(FleetError::Validation(format!(
                    "asset {} checksum is not a hex sha256 digest",
                    asset.filename
                )));
            }
        }

        // Walk the calendar days touched by the half-open window.
        let mut day = request.start_time.date_naive();
        let last = (request.end_time - Duration::nanoseconds(1)).date_naive();
        while day <= last {
            if self.policy.blackout_dates.contains(&day) {
                return Err(FleetError::Validation(format!(
                    "booking window covers blackout date {}",
                    day
                )));
            }
            day += Duration::days(1);
        }

        if self.billboards.get(&request.billboard_id).is_none() {
            return Err(FleetError::NotFound(format!(
                "billboard {}",
                request.billboard_id
            )));
        }
        Ok(())
    }

    /// Validate, reserve the slot, and open a payment session. The slot is
    /// held from this moment (PENDING_PAYMENT counts toward conflicts) and
    /// released only by cancellation.
    pub async fn create_booking(
        &self,
        request: BookingRequest,
    ) -> FleetResult<(Booking, PaymentSession)> {
        self.validate(&request)?;

        let campaign = Campaign::new(
            request.billboard_id.clone(),
            request.assets,
            request.start_time,
            request.end_time,
        );

        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            billboard_id: request.billboard_id,
            campaign_id: campaign.id,
            advertiser_id: request.advertiser_id.clone(),
            start_time: request.start_time,
            end_time: request.end_time,
            amount: request.amount,
            status: BookingStatus::PendingPayment,
            payment_status: PaymentStatus::Pending,
            payment_ref: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };

        let booking = self
            .bookings
            .insert_if_free(booking, &self.policy.conflict_statuses())?;
        self.campaigns.insert(campaign)?;

        let reference = format!("bk_{}", booking.id.simple());
        let session = match self
            .gateway
            .initialize_payment(booking.amount, &request.advertiser_id, &reference)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                // Release the slot; a booking without a payment session is
                // unusable.
                let _ = self.bookings.transition(
                    booking.id,
                    BookingStatus::PendingPayment,
                    BookingStatus::Cancelled,
                );
                let _ = self
                    .bookings
                    .set_cancellation_reason(booking.id, "payment initialization failed");
                return Err(e);
            }
        };
        let booking = self
            .bookings
            .set_payment(booking.id, PaymentStatus::Pending, Some(session.reference.clone()))?;

        info!(
            booking_id = %booking.id,
            billboard_id = %booking.billboard_id,
            campaign_id = %booking.campaign_id,
            "Booking created"
        );
        metrics::counter!("booking.created").increment(1);
        Ok((booking, session))
    }

    /// Verify the payment and confirm the booking. Verification failure
    /// leaves the booking in PENDING_PAYMENT so the advertiser can retry.
    pub async fn confirm_payment(&self, booking_id: Uuid, payment_ref: &str) -> FleetResult<Booking> {
        let booking = self
            .bookings
            .get(booking_id)
            .ok_or_else(|| FleetError::NotFound(format!("booking {}", booking_id)))?;
        if booking.status != BookingStatus::PendingPayment {
            return Err(FleetError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Confirmed,
            });
        }

        let verification = self.gateway.verify_payment(payment_ref).await?;
        if !verification.success {
            self.bookings
                .set_payment(booking_id, PaymentStatus::Failed, None)?;
            metrics::counter!("booking.payment_failures").increment(1);
            return Err(FleetError::PaymentVerification(format!(
                "payment {} did not verify",
                payment_ref
            )));
        }

        // Conditional update: a concurrent confirmation already in flight
        // makes this one fail rather than double-confirm.
        let booking = self.bookings.transition(
            booking_id,
            BookingStatus::PendingPayment,
            BookingStatus::Confirmed,
        )?;
        let booking = self.bookings.set_payment(
            booking.id,
            PaymentStatus::Paid,
            Some(payment_ref.to_string()),
        )?;

        info!(booking_id = %booking.id, "Booking confirmed");
        metrics::counter!("booking.confirmed").increment(1);
        Ok(booking)
    }

    /// Transition CONFIRMED -> ACTIVE and push the campaign to the device.
    /// The booking goes active optimistically; the campaign's own deployment
    /// status is settled later by the agent's acknowledgement.
    pub async fn activate(&self, booking_id: Uuid) -> FleetResult<Booking> {
        let booking = self
            .bookings
            .get(booking_id)
            .ok_or_else(|| FleetError::NotFound(format!("booking {}", booking_id)))?;
        if Utc::now() < booking.start_time {
            return Err(FleetError::Validation(format!(
                "booking {} does not start until {}",
                booking_id, booking.start_time
            )));
        }

        let booking =
            self.bookings
                .transition(booking_id, BookingStatus::Confirmed, BookingStatus::Active)?;

        let campaign = self
            .campaigns
            .get(booking.campaign_id)
            .ok_or_else(|| FleetError::NotFound(format!("campaign {}", booking.campaign_id)))?;

        let delivery = self.fleet.deploy_campaign(
            &booking.billboard_id,
            ServerMessage::NewCampaign {
                campaign_id: campaign.id,
                assets: campaign.assets.clone(),
                start_time: campaign.start_time,
                end_time: campaign.end_time,
            },
        );
        match delivery {
            DeliveryStatus::Sent => {
                info!(booking_id = %booking.id, campaign_id = %campaign.id, "Campaign pushed to device")
            }
            DeliveryStatus::Queued => {
                warn!(
                    booking_id = %booking.id,
                    campaign_id = %campaign.id,
                    billboard_id = %booking.billboard_id,
                    "Device offline, campaign queued for reconnect"
                )
            }
        }
        metrics::counter!("booking.activated").increment(1);
        Ok(booking)
    }

    /// Transition ACTIVE -> COMPLETED once the window has elapsed, tell the
    /// device to stop, and trigger the payout.
    pub async fn complete(&self, booking_id: Uuid) -> FleetResult<Booking> {
        let booking = self
            .bookings
            .get(booking_id)
            .ok_or_else(|| FleetError::NotFound(format!("booking {}", booking_id)))?;
        if Utc::now() < booking.end_time {
            return Err(FleetError::Validation(format!(
                "booking {} does not end until {}",
                booking_id, booking.end_time
            )));
        }

        let booking = self.bookings.transition(
            booking_id,
            BookingStatus::Active,
            BookingStatus::Completed,
        )?;

        self.fleet
            .stop_campaign(&booking.billboard_id, booking.campaign_id);
        let _ = self.campaigns.transition(
            booking.campaign_id,
            &[
                CampaignStatus::Pending,
                CampaignStatus::Deployed,
                CampaignStatus::Active,
                CampaignStatus::Failed,
            ],
            CampaignStatus::Completed,
            None,
        );

        if let Err(e) = self
            .gateway
            .process_payout(&booking.billboard_id, booking.amount)
            .await
        {
            // Payout is retried by operations; the slot is spent either way.
            warn!(booking_id = %booking.id, error = %e, "Payout failed");
            self.alerts.raise(
                AlertDraft::new(
                    AlertType::PaymentIssue,
                    AlertSeverity::Warning,
                    "Payout failed",
                    format!("payout for booking {} failed: {}", booking.id, e),
                )
                .billboard(&booking.billboard_id)
                .campaign(booking.campaign_id),
            );
        }

        info!(booking_id = %booking.id, "Booking completed");
        metrics::counter!("booking.completed").increment(1);
        Ok(booking)
    }

    /// Cancel from any non-terminal state, stopping the campaign if it is
    /// on screen and optionally refunding.
    pub async fn cancel(
        &self,
        booking_id: Uuid,
        reason: &str,
        refund_amount: Option<f64>,
    ) -> FleetResult<Booking> {
        let booking = self
            .bookings
            .get(booking_id)
            .ok_or_else(|| FleetError::NotFound(format!("booking {}", booking_id)))?;

        if booking.status == BookingStatus::Active {
            self.fleet
                .stop_campaign(&booking.billboard_id, booking.campaign_id);
        }

        let booking = self.bookings.transition_any(
            booking_id,
            &[
                BookingStatus::PendingPayment,
                BookingStatus::Confirmed,
                BookingStatus::Active,
            ],
            BookingStatus::Cancelled,
        )?;
        self.bookings.set_cancellation_reason(booking_id, reason)?;

        let _ = self.campaigns.transition(
            booking.campaign_id,
            &[
                CampaignStatus::Pending,
                CampaignStatus::Deployed,
                CampaignStatus::Active,
                CampaignStatus::Failed,
            ],
            CampaignStatus::Completed,
            Some(format!("cancelled: {}", reason)),
        );

        let booking = if let Some(amount) = refund_amount {
            if let Some(payment_ref) = booking.payment_ref.as_deref() {
                self.gateway.process_refund(payment_ref, amount).await?;
                self.bookings
                    .set_payment(booking_id, PaymentStatus::Refunded, None)?
            } else {
                booking
            }
        } else {
            booking
        };

        info!(booking_id = %booking.id, reason = %reason, "Booking cancelled");
        metrics::counter!("booking.cancelled").increment(1);
        Ok(booking)
    }

    pub fn get_booking(&self, booking_id: Uuid) -> Option<Booking> {
        self.bookings.get(booking_id)
    }

    pub fn get_campaign(&self, campaign_id: Uuid) -> Option<Campaign> {
        self.campaigns.get(campaign_id)
    }

    pub fn alerts(&self) -> &Arc<AlertManager> {
        &self.alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::PaymentVerification;
    use async_trait::async_trait;
    use billboard_core::store::{InMemoryBillboards, InMemoryBookings, InMemoryCampaigns};
    use billboard_core::types::Billboard;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc::UnboundedReceiver;

    struct TestGateway {
        verify_ok: AtomicBool,
    }

    impl TestGateway {
        fn new() -> Self {
            Self {
                verify_ok: AtomicBool::new(true),
            }
        }

        fn fail_verification(&self) {
            self.verify_ok.store(false, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl PaymentGateway for TestGateway {
        async fn initialize_payment(
            &self,
            _amount: f64,
            _payer: &str,
            reference: &str,
        ) -> FleetResult<PaymentSession> {
            Ok(PaymentSession {
                reference: reference.to_string(),
                redirect_url: "https://pay.test/checkout".to_string(),
            })
        }

        async fn verify_payment(&self, _reference: &str) -> FleetResult<PaymentVerification> {
            Ok(PaymentVerification {
                success: self.verify_ok.load(Ordering::SeqCst),
                amount: 500.0,
            })
        }

        async fn process_refund(&self, _reference: &str, _amount: f64) -> FleetResult<()> {
            Ok(())
        }

        async fn process_payout(&self, _recipient: &str, _amount: f64) -> FleetResult<()> {
            Ok(())
        }
    }

    struct Fixture {
        manager: BookingLifecycleManager,
        registry: Arc<FleetConnectionRegistry>,
        gateway: Arc<TestGateway>,
        campaigns: Arc<InMemoryCampaigns>,
    }

    fn fixture() -> Fixture {
        let billboards: Arc<InMemoryBillboards> = Arc::new(InMemoryBillboards::new());
        billboards
            .insert(Billboard::new(
                "bb-1".to_string(),
                "Harbor Bridge East".to_string(),
                None,
                "secret".to_string(),
            ))
            .unwrap();
        let bookings = Arc::new(InMemoryBookings::new());
        let campaigns = Arc::new(InMemoryCampaigns::new());
        let alerts = Arc::new(AlertManager::new());
        let registry = Arc::new(FleetConnectionRegistry::new(
            billboards.clone(),
            campaigns.clone(),
            alerts.clone(),
            16,
        ));
        let gateway = Arc::new(TestGateway::new());
        let manager = BookingLifecycleManager::new(
            bookings,
            campaigns.clone(),
            billboards,
            gateway.clone(),
            registry.clone(),
            alerts,
            BookingPolicy::default(),
        );
        Fixture {
            manager,
            registry,
            gateway,
            campaigns,
        }
    }

    fn asset() -> CreativeAsset {
        CreativeAsset {
            url: "http://assets.local/creative.mp4".to_string(),
            filename: "creative.mp4".to_string(),
            checksum: "ab".repeat(32),
            duration_secs: 30,
        }
    }

    fn request(start_days: i64, end_days: i64) -> BookingRequest {
        let now = Utc::now();
        BookingRequest {
            billboard_id: "bb-1".to_string(),
            advertiser_id: "adv-1".to_string(),
            start_time: now + Duration::days(start_days),
            end_time: now + Duration::days(end_days),
            amount: 500.0,
            assets: vec![asset()],
        }
    }

    fn connect(fixture: &Fixture) -> UnboundedReceiver<ServerMessage> {
        fixture.registry.connect("bb-1", "secret").unwrap()
    }

    async fn confirmed_started_booking(fixture: &Fixture) -> Booking {
        // Started 30 seconds ago, ends tomorrow.
        let now = Utc::now();
        let req = BookingRequest {
            start_time: now - Duration::seconds(30),
            end_time: now + Duration::days(1),
            ..request(0, 0)
        };
        let (booking, session) = fixture.manager.create_booking(req).await.unwrap();
        fixture
            .manager
            .confirm_payment(booking.id, &session.reference)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn overlapping_booking_is_rejected_with_conflict_windows() {
        let f = fixture();
        let (first, _) = f.manager.create_booking(request(0, 7)).await.unwrap();

        let err = f.manager.create_booking(request(3, 10)).await.unwrap_err();
        match err {
            FleetError::BookingConflict { conflicts } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].booking_id, first.id);
                assert_eq!(conflicts[0].start_time, first.start_time);
                assert_eq!(conflicts[0].end_time, first.end_time);
            }
            other => panic!("expected BookingConflict, got {}", other),
        }
    }

    #[tokio::test]
    async fn validation_rejects_bad_requests() {
        let f = fixture();

        let mut inverted = request(2, 1);
        inverted.end_time = inverted.start_time - Duration::hours(1);
        assert!(matches!(
            f.manager.create_booking(inverted).await,
            Err(FleetError::Validation(_))
        ));

        let mut short = request(1, 1);
        short.end_time = short.start_time + Duration::minutes(10);
        assert!(matches!(
            f.manager.create_booking(short).await,
            Err(FleetError::Validation(_))
        ));

        let mut unknown = request(0, 7);
        unknown.billboard_id = "bb-404".to_string();
        assert!(matches!(
            f.manager.create_booking(unknown).await,
            Err(FleetError::NotFound(_))
        ));

        let mut bad_checksum = request(0, 7);
        bad_checksum.assets[0].checksum = "not-hex".to_string();
        assert!(matches!(
            f.manager.create_booking(bad_checksum).await,
            Err(FleetError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn blackout_dates_block_creation() {
        let f = fixture();
        let start = Utc::now() + Duration::days(2);
        let policy = BookingPolicy {
            blackout_dates: vec![(start + Duration::days(1)).date_naive()],
            ..BookingPolicy::default()
        };
        let manager = BookingLifecycleManager {
            policy,
            ..f.manager
        };

        assert!(matches!(
            manager.create_booking(request(2, 5)).await,
            Err(FleetError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn failed_verification_keeps_booking_retryable() {
        let f = fixture();
        let (booking, session) = f.manager.create_booking(request(0, 7)).await.unwrap();

        f.gateway.fail_verification();
        let err = f
            .manager
            .confirm_payment(booking.id, &session.reference)
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::PaymentVerification(_)));

        let stored = f.manager.get_booking(booking.id).unwrap();
        assert_eq!(stored.status, BookingStatus::PendingPayment);
        assert_eq!(stored.payment_status, PaymentStatus::Failed);

        // Retry succeeds once the gateway recovers.
        f.gateway.verify_ok.store(true, Ordering::SeqCst);
        let confirmed = f
            .manager
            .confirm_payment(booking.id, &session.reference)
            .await
            .unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn activation_requires_start_time() {
        let f = fixture();
        let (booking, session) = f.manager.create_booking(request(1, 7)).await.unwrap();
        f.manager
            .confirm_payment(booking.id, &session.reference)
            .await
            .unwrap();

        assert!(matches!(
            f.manager.activate(booking.id).await,
            Err(FleetError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_activation_sends_exactly_one_campaign() {
        let f = fixture();
        let booking = confirmed_started_booking(&f).await;
        let mut rx = connect(&f);

        let (a, b) = tokio::join!(f.manager.activate(booking.id), f.manager.activate(booking.id));
        assert!(a.is_ok() ^ b.is_ok(), "exactly one activation must win");

        let stored = f.manager.get_booking(booking.id).unwrap();
        assert_eq!(stored.status, BookingStatus::Active);

        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::NewCampaign { .. }
        ));
        assert!(rx.try_recv().is_err(), "only one new_campaign may be sent");
    }

    #[tokio::test]
    async fn offline_activation_stays_active_and_queues() {
        let f = fixture();
        let booking = confirmed_started_booking(&f).await;

        let activated = f.manager.activate(booking.id).await.unwrap();
        assert_eq!(activated.status, BookingStatus::Active);
        assert_eq!(f.registry.pending_count("bb-1"), 1);
    }

    #[tokio::test]
    async fn completion_stops_campaign_and_finishes() {
        let f = fixture();
        let now = Utc::now();
        let req = BookingRequest {
            start_time: now - Duration::hours(2),
            end_time: now - Duration::seconds(10),
            ..request(0, 0)
        };
        let (booking, session) = f.manager.create_booking(req).await.unwrap();
        f.manager
            .confirm_payment(booking.id, &session.reference)
            .await
            .unwrap();
        let mut rx = connect(&f);
        f.manager.activate(booking.id).await.unwrap();
        let _ = rx.try_recv();

        let completed = f.manager.complete(booking.id).await.unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::StopCampaign { campaign_id } if campaign_id == booking.campaign_id
        ));
        assert_eq!(
            f.campaigns.get(booking.campaign_id).unwrap().status,
            CampaignStatus::Completed
        );
    }

    #[tokio::test]
    async fn early_completion_is_rejected() {
        let f = fixture();
        let booking = confirmed_started_booking(&f).await;
        f.manager.activate(booking.id).await.unwrap();

        assert!(matches!(
            f.manager.complete(booking.id).await,
            Err(FleetError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn cancel_active_booking_stops_and_refunds() {
        let f = fixture();
        let booking = confirmed_started_booking(&f).await;
        let mut rx = connect(&f);
        f.manager.activate(booking.id).await.unwrap();
        let _ = rx.try_recv();

        let cancelled = f
            .manager
            .cancel(booking.id, "advertiser request", Some(250.0))
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::StopCampaign { .. }
        ));

        let stored = f.manager.get_booking(booking.id).unwrap();
        assert_eq!(
            stored.cancellation_reason.as_deref(),
            Some("advertiser request")
        );
    }

    #[tokio::test]
    async fn terminal_bookings_cannot_be_cancelled() {
        let f = fixture();
        let booking = confirmed_started_booking(&f).await;
        f.manager.cancel(booking.id, "first", None).await.unwrap();

        assert!(matches!(
            f.manager.cancel(booking.id, "second", None).await,
            Err(FleetError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn cancelled_pending_booking_releases_slot() {
        let f = fixture();
        let (booking, _) = f.manager.create_booking(request(0, 7)).await.unwrap();
        f.manager.cancel(booking.id, "abandoned", None).await.unwrap();

        // The same window can be rebooked.
        f.manager.create_booking(request(0, 7)).await.unwrap();
    }
}
