use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::calendar::{calendar_event, viewing_details};
use super::domain::{
    AccessType, ApplicationId, Booking, BookingContact, BookingId, CancellationInitiator,
    InvitationId, LandlordId, SlotId, ViewingSlot,
};
use super::error::SchedulingError;
use super::gateway::{
    CalendarGenerator, CalendarStatus, Clock, DirectoryPort, NotificationGateway, Recipient,
};
use super::store::ViewingStore;

/// How long before the slot start a booking can still be cancelled.
pub const CANCELLATION_NOTICE: Duration = Duration::hours(1);

/// Payload for a direct (public) booking request.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub application_id: Option<ApplicationId>,
}

/// Booking representation returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    pub id: BookingId,
    pub slot_id: SlotId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub confirmed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<ApplicationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invitation_id: Option<InvitationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Booking> for BookingView {
    fn from(booking: Booking) -> Self {
        Self {
            id: booking.id,
            slot_id: booking.slot_id,
            first_name: booking.contact.first_name,
            last_name: booking.contact.last_name,
            email: booking.contact.email,
            phone: booking.contact.phone,
            confirmed: booking.confirmed,
            application_id: booking.application_id,
            invitation_id: booking.invitation_id,
            cancelled_at: booking.cancelled_at,
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        }
    }
}

static BOOKING_SEQUENCE: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_booking_id() -> BookingId {
    let id = BOOKING_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    BookingId(format!("bkg-{id:06}"))
}

/// The capacity-enforcing reservation engine.
///
/// The duplicate-email and capacity predicates run inside the store's
/// atomic insert, never as a separate read followed by a write, so
/// concurrent requests against the same slot cannot oversell it.
pub struct BookingService<S, N> {
    store: Arc<S>,
    gateway: Arc<N>,
    directory: Arc<dyn DirectoryPort>,
    calendar: Arc<dyn CalendarGenerator>,
    clock: Arc<dyn Clock>,
}

impl<S, N> BookingService<S, N>
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
            store,
            gateway,
            directory,
            calendar,
            clock,
        }
    }

    /// Reserves one seat in a slot.
    ///
    /// A direct booking (no invitation) is only allowed on public slots;
    /// invited-only slots are reachable through invitation acceptance.
    pub fn book(
        &self,
        slot_id: &SlotId,
        request: BookingRequest,
        invitation_id: Option<InvitationId>,
    ) -> Result<BookingView, SchedulingError> {
        let slot = self
            .store
            .fetch_slot(slot_id)?
            .ok_or(SchedulingError::NotFound("viewing slot"))?;

        if invitation_id.is_none() && slot.access_type == AccessType::Invited {
            return Err(SchedulingError::Forbidden(
                "this viewing is by invitation only".to_string(),
            ));
        }

        let now = self.clock.now();
        if slot.start_time <= now {
            return Err(SchedulingError::BadRequest(
                "cannot book a viewing in the past".to_string(),
            ));
        }

        let contact = BookingContact {
            first_name: request.first_name,
            last_name: request.last_name,
            email: request.email,
            phone: request.phone,
        };
        let booking = Booking::new(
            next_booking_id(),
            slot_id.clone(),
            contact,
            request.application_id,
            invitation_id,
            now,
        );

        // Uniqueness and capacity are enforced here, atomically.
        let booking = self.store.insert_booking(booking)?;

        self.send_confirmation(&slot, &booking.contact);

        Ok(booking.into())
    }

    /// Cancels a booking. The deadline is one hour before the slot start;
    /// the deadline instant itself is the last permitted moment.
    pub fn cancel(
        &self,
        slot_id: &SlotId,
        booking_id: &BookingId,
        initiator: CancellationInitiator,
    ) -> Result<BookingView, SchedulingError> {
        let mut booking = self
            .store
            .fetch_booking(booking_id)?
            .filter(|booking| booking.slot_id == *slot_id)
            .ok_or(SchedulingError::NotFound("booking"))?;

        if booking.is_cancelled() {
            return Err(SchedulingError::BadRequest(
                "booking has already been cancelled".to_string(),
            ));
        }

        let slot = self
            .store
            .fetch_slot(slot_id)?
            .ok_or(SchedulingError::NotFound("viewing slot"))?;

        let now = self.clock.now();
        let deadline = slot.start_time - CANCELLATION_NOTICE;
        if now > deadline {
            return Err(SchedulingError::BadRequest(
                "too late to cancel: viewings can be cancelled up to one hour before they start"
                    .to_string(),
            ));
        }

        booking.cancel(now);
        self.store.update_booking(booking.clone())?;

        self.notify_landlord_of_cancellation(&slot, &booking.contact, initiator);

        Ok(booking.into())
    }

    /// All bookings for a slot in creation order; landlord-facing.
    pub fn bookings_for_slot(
        &self,
        requester: &LandlordId,
        slot_id: &SlotId,
    ) -> Result<Vec<BookingView>, SchedulingError> {
        let slot = self
            .store
            .fetch_slot(slot_id)?
            .ok_or(SchedulingError::NotFound("viewing slot"))?;
        let property = self
            .directory
            .property(&slot.property_id)?
            .ok_or(SchedulingError::NotFound("property"))?;
        if property.landlord_id != *requester {
            return Err(SchedulingError::Forbidden(
                "requester does not own this property".to_string(),
            ));
        }

        let bookings = self.store.bookings_for_slot(slot_id)?;
        Ok(bookings.into_iter().map(BookingView::from).collect())
    }

    /// Confirmation is best-effort: the booking is authoritative once
    /// persisted, a failed notification is logged and never rolls it back.
    fn send_confirmation(&self, slot: &ViewingSlot, contact: &BookingContact) {
        let property = match self.directory.property(&slot.property_id) {
            Ok(Some(property)) => property,
            Ok(None) => {
                warn!(slot = %slot.id.0, "property missing, skipping booking confirmation");
                return;
            }
            Err(err) => {
                warn!(slot = %slot.id.0, error = %err, "directory lookup failed for confirmation");
                return;
            }
        };

        let details = viewing_details(slot, &property);
        let bytes = self
            .calendar
            .generate(&calendar_event(slot, &property, CalendarStatus::Confirmed));
        let recipient = Recipient {
            email: contact.email.clone(),
            name: contact.full_name(),
        };
        if let Err(err) = self
            .gateway
            .booking_confirmed(&recipient, &details, Some(&bytes))
        {
            warn!(slot = %slot.id.0, error = %err, "booking confirmation failed");
        }
    }

    fn notify_landlord_of_cancellation(
        &self,
        slot: &ViewingSlot,
        contact: &BookingContact,
        initiator: CancellationInitiator,
    ) {
        let property = match self.directory.property(&slot.property_id) {
            Ok(Some(property)) => property,
            Ok(None) => {
                warn!(slot = %slot.id.0, "property missing, skipping cancellation notice");
                return;
            }
            Err(err) => {
                warn!(slot = %slot.id.0, error = %err, "directory lookup failed for cancellation");
                return;
            }
        };

        let details = viewing_details(slot, &property);
        let landlord = Recipient {
            email: property.landlord_email.clone(),
            name: "Vermieter".to_string(),
        };
        if let Err(err) =
            self.gateway
                .booking_cancelled(&landlord, &contact.full_name(), &details, initiator)
        {
            warn!(slot = %slot.id.0, error = %err, "cancellation notice failed");
        }
    }
}
