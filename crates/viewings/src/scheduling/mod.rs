//! Viewing-slot scheduling: slots, invitations, capacity-enforced
//! bookings, and the background reminder scheduler.
//!
//! Storage, notification delivery, directory lookups, calendar bytes, and
//! the clock are capability objects passed in at construction, so every
//! service can be exercised against fakes without process-wide state.

pub mod bookings;
pub mod calendar;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod invitations;
pub mod memory;
pub mod reminders;
pub mod router;
pub mod slots;
pub mod store;

#[cfg(test)]
mod tests;

use std::sync::Arc;

pub use bookings::{BookingRequest, BookingService, BookingView, CANCELLATION_NOTICE};
pub use domain::{
    AccessType, ApplicationId, Booking, BookingContact, BookingId, CancellationInitiator,
    InvitationId, InvitationStatus, LandlordId, PropertyId, SlotId, SlotOccupancy, SlotType,
    ViewingInvitation, ViewingSlot,
};
pub use error::SchedulingError;
pub use gateway::{
    ApplicationSummary, CalendarEvent, CalendarGenerator, CalendarStatus, Clock, DirectoryError,
    DirectoryPort, NotificationGateway, NotifyError, PreviousSchedule, PropertySummary, Recipient,
    SystemClock, ViewingDetails,
};
pub use invitations::{InvitationOutcome, InvitationReply, InvitationService, InvitationView};
pub use memory::InMemoryViewingStore;
pub use reminders::{ReminderCycleReport, ReminderHandle, ReminderKind, ReminderScheduler};
pub use router::{viewing_router, LANDLORD_HEADER};
pub use slots::{BulkSlotRequest, NewSlot, SlotPatch, SlotService, SlotView};
pub use store::{SlotCascade, SlotFilter, ViewingStore};

/// The three request-facing services over one shared store, used as the
/// router state.
pub struct ViewingServices<S, N> {
    pub slots: SlotService<S, N>,
    pub bookings: BookingService<S, N>,
    pub invitations: InvitationService<S, N>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl<S, N> ViewingServices<S, N>
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
    ) -> Self {
        Self {
            slots: SlotService::new(
                store.clone(),
                gateway.clone(),
                directory.clone(),
                calendar.clone(),
                clock.clone(),
            ),
            bookings: BookingService::new(
                store.clone(),
                gateway.clone(),
                directory.clone(),
                calendar.clone(),
                clock.clone(),
            ),
            invitations: InvitationService::new(
                store,
                gateway,
                directory,
                calendar,
                clock.clone(),
            ),
            clock,
        }
    }
}
