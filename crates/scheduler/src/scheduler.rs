//! Campaign scheduler: periodic sweeps that drive bookings through their
//! time-based transitions, watch fleet health, and publish gauges.
//!
//! Each sweep handles records independently. One booking that fails to
//! transition is logged and alerted on, and the sweep moves to the next
//! record; a poisoned record can never stall the fleet.

use billboard_booking::BookingLifecycleManager;
use billboard_core::config::SchedulerConfig;
use billboard_core::store::BookingRepository;
use billboard_core::types::{AlertSeverity, AlertType};
use billboard_fleet::FleetConnectionRegistry;
use billboard_monitoring::{AlertDraft, AlertManager, HealthMonitor};
use chrono::{Duration, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Supervises the background loops. `start` spawns them, `stop` signals
/// shutdown and drains the join handles.
pub struct CampaignScheduler {
    lifecycle: Arc<BookingLifecycleManager>,
    bookings: Arc<dyn BookingRepository>,
    monitor: Arc<HealthMonitor>,
    alerts: Arc<AlertManager>,
    fleet: Arc<FleetConnectionRegistry>,
    config: SchedulerConfig,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl CampaignScheduler {
    pub fn new(
        lifecycle: Arc<BookingLifecycleManager>,
        bookings: Arc<dyn BookingRepository>,
        monitor: Arc<HealthMonitor>,
        alerts: Arc<AlertManager>,
        fleet: Arc<FleetConnectionRegistry>,
        config: SchedulerConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            lifecycle,
            bookings,
            monitor,
            alerts,
            fleet,
            config,
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Spawn the booking sweep, the health sweep, and the gauge publisher.
    pub fn start(&mut self) {
        let tick = StdDuration::from_secs(self.config.tick_secs.max(1));

        {
            let lifecycle = self.lifecycle.clone();
            let bookings = self.bookings.clone();
            let alerts = self.alerts.clone();
            let config = self.config.clone();
            let mut shutdown = self.shutdown.subscribe();
            self.handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(tick);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            sweep_bookings(&lifecycle, &bookings, &alerts, &config).await;
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                info!("Booking sweep loop stopped");
            }));
        }

        {
            let monitor = self.monitor.clone();
            let mut shutdown = self.shutdown.subscribe();
            self.handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(tick * 5);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let flagged = monitor.sweep(Utc::now());
                            if flagged > 0 {
                                warn!(flagged, "Health sweep marked billboards offline");
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                info!("Health sweep loop stopped");
            }));
        }

        {
            let bookings = self.bookings.clone();
            let alerts = self.alerts.clone();
            let fleet = self.fleet.clone();
            let lookahead = Duration::seconds(self.config.activation_lookahead_secs);
            let mut shutdown = self.shutdown.subscribe();
            self.handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(tick * 10);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            publish_gauges(&bookings, &alerts, &fleet, lookahead);
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                info!("Gauge loop stopped");
            }));
        }

        info!(
            tick_secs = self.config.tick_secs,
            loops = self.handles.len(),
            "Scheduler started"
        );
    }

    /// Signal shutdown and wait for every loop to exit.
    pub async fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler loop panicked");
            }
        }
        info!("Scheduler stopped");
    }
}

/// One pass of the time-based booking transitions: activate confirmed
/// bookings whose window has opened, complete active ones whose window has
/// closed. Returns (activated, completed).
pub async fn sweep_bookings(
    lifecycle: &BookingLifecycleManager,
    bookings: &Arc<dyn BookingRepository>,
    alerts: &AlertManager,
    config: &SchedulerConfig,
) -> (usize, usize) {
    let now = Utc::now();
    let grace = Duration::seconds(config.activation_grace_secs);

    let mut activated = 0;
    for booking in bookings.due_activations(now) {
        if now - booking.start_time > grace {
            warn!(
                booking_id = %booking.id,
                start_time = %booking.start_time,
                "Activating well past scheduled start"
            );
        }
        match lifecycle.activate(booking.id).await {
            Ok(_) => activated += 1,
            Err(e) => {
                error!(booking_id = %booking.id, error = %e, "Scheduled activation failed");
                alerts.raise(
                    AlertDraft::new(
                        AlertType::SchedulerError,
                        AlertSeverity::Warning,
                        "Scheduled activation failed",
                        format!("activation of booking {} failed: {}", booking.id, e),
                    )
                    .billboard(&booking.billboard_id)
                    .campaign(booking.campaign_id),
                );
            }
        }
    }

    let mut completed = 0;
    for booking in bookings.due_completions(now) {
        match lifecycle.complete(booking.id).await {
            Ok(_) => completed += 1,
            Err(e) => {
                error!(booking_id = %booking.id, error = %e, "Scheduled completion failed");
                alerts.raise(
                    AlertDraft::new(
                        AlertType::SchedulerError,
                        AlertSeverity::Warning,
                        "Scheduled completion failed",
                        format!("completion of booking {} failed: {}", booking.id, e),
                    )
                    .billboard(&booking.billboard_id)
                    .campaign(booking.campaign_id),
                );
            }
        }
    }

    if activated > 0 || completed > 0 {
        info!(activated, completed, "Booking sweep finished");
    }
    metrics::counter!("scheduler.activations").increment(activated as u64);
    metrics::counter!("scheduler.completions").increment(completed as u64);
    (activated, completed)
}

fn publish_gauges(
    bookings: &Arc<dyn BookingRepository>,
    alerts: &AlertManager,
    fleet: &FleetConnectionRegistry,
    lookahead: Duration,
) {
    let upcoming = bookings.due_activations(Utc::now() + lookahead).len();
    metrics::gauge!("scheduler.upcoming_activations").set(upcoming as f64);
    metrics::gauge!("fleet.connected").set(fleet.connection_count() as f64);
    metrics::gauge!("alerts.unresolved").set(alerts.unresolved_count() as f64);
}
