use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::calendar::{calendar_event, viewing_details};
use super::domain::{Booking, ViewingSlot};
use super::error::SchedulingError;
use super::gateway::{
    CalendarGenerator, CalendarStatus, Clock, DirectoryPort, NotificationGateway, Recipient,
};
use super::store::ViewingStore;

/// The two reminder stages sent before a viewing.
///
/// Each window is deliberately wider than the scheduler's wake interval so
/// jitter or downtime cannot skip a reminder; the per-booking flag keeps a
/// booking from being reminded twice even when it stays inside the window
/// across several cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    /// Sent when the slot starts within `[now+23h, now+25h)`.
    DayBefore,
    /// Sent when the slot starts within `[now+50min, now+70min)`.
    HourBefore,
}

impl ReminderKind {
    pub const ALL: [ReminderKind; 2] = [ReminderKind::DayBefore, ReminderKind::HourBefore];

    pub fn window(self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            ReminderKind::DayBefore => (now + Duration::hours(23), now + Duration::hours(25)),
            ReminderKind::HourBefore => {
                (now + Duration::minutes(50), now + Duration::minutes(70))
            }
        }
    }

    pub fn already_sent(self, booking: &Booking) -> bool {
        match self {
            ReminderKind::DayBefore => booking.reminder_24h_sent,
            ReminderKind::HourBefore => booking.reminder_1h_sent,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ReminderKind::DayBefore => "24h",
            ReminderKind::HourBefore => "1h",
        }
    }
}

/// Outcome of one scan, mostly for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReminderCycleReport {
    pub sent: usize,
    pub failed: usize,
}

/// Periodic reminder dispatcher.
///
/// One instance runs per process, on its own timer, independent of request
/// handling; it reaches the data exclusively through the shared store. A
/// reminder flag is flipped only after its notification went out, so a
/// failed dispatch is retried on the next wake (at-least-once delivery).
pub struct ReminderScheduler<S, N> {
    store: Arc<S>,
    gateway: Arc<N>,
    directory: Arc<dyn DirectoryPort>,
    calendar: Arc<dyn CalendarGenerator>,
    clock: Arc<dyn Clock>,
    interval: std::time::Duration,
}

impl<S, N> ReminderScheduler<S, N>
where
    S: ViewingStore + 'static,
    N: NotificationGateway + 'static,
{
    pub fn new(
        store: Arc<S>,
        gateway: Arc<N>,
        directory: Arc<dyn DirectoryPort>,
        calendar: Arc<dyn CalendarGenerator>,
        clock: Arc<dyn Clock>,
        interval: std::time::Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            directory,
            calendar,
            clock,
            interval,
        }
    }

    /// Spawns the interval loop. The returned handle stops it.
    pub fn start(self: Arc<Self>) -> ReminderHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let interval = self.interval;

        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            info!(interval_secs = interval.as_secs(), "reminder scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.run_cycle() {
                            Ok(report) => {
                                debug!(sent = report.sent, failed = report.failed, "reminder cycle finished");
                            }
                            Err(err) => {
                                warn!(error = %err, "reminder cycle aborted");
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!("reminder scheduler stopped");
                        break;
                    }
                }
            }
        });

        ReminderHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    /// One scan over both reminder windows. Failures are isolated per
    /// booking: the flag stays unset and the cycle moves on.
    pub fn run_cycle(&self) -> Result<ReminderCycleReport, SchedulingError> {
        let now = self.clock.now();
        let mut report = ReminderCycleReport::default();

        for kind in ReminderKind::ALL {
            let (window_start, window_end) = kind.window(now);
            let due = self.store.reminders_due(kind, window_start, window_end)?;

            for (booking, slot) in due {
                match self.dispatch(kind, &booking, &slot) {
                    Ok(()) => {
                        self.store.mark_reminder_sent(&booking.id, kind, now)?;
                        info!(
                            booking = %booking.id.0,
                            reminder = kind.label(),
                            "viewing reminder sent"
                        );
                        report.sent += 1;
                    }
                    Err(err) => {
                        warn!(
                            booking = %booking.id.0,
                            reminder = kind.label(),
                            error = %err,
                            "viewing reminder failed, will retry next cycle"
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    fn dispatch(
        &self,
        kind: ReminderKind,
        booking: &Booking,
        slot: &ViewingSlot,
    ) -> Result<(), SchedulingError> {
        let property = self
            .directory
            .property(&slot.property_id)?
            .ok_or(SchedulingError::NotFound("property"))?;

        // Application-linked bookings carry the applicant's portal token.
        let portal_token = match &booking.application_id {
            Some(application_id) => self
                .directory
                .application(application_id)?
                .and_then(|application| application.access_token),
            None => None,
        };

        let details = viewing_details(slot, &property);
        let bytes = self
            .calendar
            .generate(&calendar_event(slot, &property, CalendarStatus::Confirmed));
        let recipient = Recipient {
            email: booking.contact.email.clone(),
            name: booking.contact.full_name(),
        };

        self.gateway
            .viewing_reminder(
                &recipient,
                &details,
                kind,
                portal_token.as_deref(),
                Some(&bytes),
            )
            .map_err(|err| SchedulingError::Unavailable(err.to_string()))
    }
}

/// Owns the spawned scheduler task; dropping it without calling
/// [`ReminderHandle::stop`] detaches the loop.
pub struct ReminderHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReminderHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}
