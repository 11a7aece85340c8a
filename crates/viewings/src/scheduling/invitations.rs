use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::bookings::{next_booking_id, BookingView};
use super::calendar::{calendar_event, viewing_details};
use super::domain::{
    ApplicationId, Booking, BookingContact, InvitationId, InvitationStatus, LandlordId, SlotId,
    ViewingInvitation, ViewingSlot,
};
use super::error::SchedulingError;
use super::gateway::{
    ApplicationSummary, CalendarGenerator, CalendarStatus, Clock, DirectoryPort,
    NotificationGateway, Recipient,
};
use super::store::ViewingStore;

/// Applicant response to an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationReply {
    Accept,
    Decline,
}

/// Invitation representation joined with slot and applicant display data.
#[derive(Debug, Clone, Serialize)]
pub struct InvitationView {
    pub id: InvitationId,
    pub slot_id: SlotId,
    pub application_id: ApplicationId,
    pub status: InvitationStatus,
    pub invited_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    pub invitation_token: String,
    pub slot_start_time: DateTime<Utc>,
    pub slot_end_time: DateTime<Utc>,
    pub applicant_name: String,
    pub applicant_email: String,
}

/// Result of a token response; a booking is present only for accepts.
#[derive(Debug, Clone, Serialize)]
pub struct InvitationOutcome {
    pub invitation: InvitationView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<BookingView>,
}

static INVITATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_invitation_id() -> InvitationId {
    let id = INVITATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    InvitationId(format!("inv-{id:06}"))
}

/// 64 hex characters, unguessable; grants unauthenticated response access.
fn fresh_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Creates and resolves per-applicant invitations to a slot.
///
/// State machine: `pending → accepted | declined`, both terminal. An
/// accept only becomes meaningful through its booking, so the transition
/// and the capacity-checked insert commit as one unit.
pub struct InvitationService<S, N> {
    store: Arc<S>,
    gateway: Arc<N>,
    directory: Arc<dyn DirectoryPort>,
    calendar: Arc<dyn CalendarGenerator>,
    clock: Arc<dyn Clock>,
}

impl<S, N> InvitationService<S, N>
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

    /// Invites an application to a slot. At most one invitation per
    /// (slot, application) pair; the application must belong to the
    /// slot's property.
    pub fn invite(
        &self,
        requester: &LandlordId,
        slot_id: &SlotId,
        application_id: &ApplicationId,
        send_email: bool,
    ) -> Result<InvitationView, SchedulingError> {
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

        let application = self
            .directory
            .application(application_id)?
            .filter(|application| application.property_id == slot.property_id)
            .ok_or(SchedulingError::NotFound("application"))?;

        let now = self.clock.now();
        let invitation = ViewingInvitation {
            id: next_invitation_id(),
            slot_id: slot_id.clone(),
            application_id: application_id.clone(),
            status: InvitationStatus::Pending,
            invited_at: now,
            responded_at: None,
            invitation_token: fresh_token(),
            created_at: now,
            updated_at: now,
        };
        let invitation = self.store.insert_invitation(invitation)?;

        if send_email {
            let details = viewing_details(&slot, &property);
            let bytes = self
                .calendar
                .generate(&calendar_event(&slot, &property, CalendarStatus::Tentative));
            let recipient = Recipient {
                email: application.email.clone(),
                name: format!("{} {}", application.first_name, application.last_name),
            };
            if let Err(err) = self.gateway.invitation_created(
                &recipient,
                &details,
                &invitation.invitation_token,
                Some(&bytes),
            ) {
                warn!(invitation = %invitation.id.0, error = %err, "invitation email failed");
            }
        }

        self.view(invitation, &slot, &application)
    }

    /// Resolves an invitation through its token.
    ///
    /// Declines are a plain terminal transition with no booking. Accepts
    /// transition the invitation and insert the booking atomically: when
    /// the slot is full the whole operation fails with
    /// [`SchedulingError::CapacityExceeded`] and the invitation stays
    /// pending.
    pub fn respond_by_token(
        &self,
        token: &str,
        reply: InvitationReply,
    ) -> Result<InvitationOutcome, SchedulingError> {
        let invitation = self
            .store
            .fetch_invitation_by_token(token)?
            .ok_or(SchedulingError::NotFound("invitation"))?;

        if !invitation.is_pending() {
            return Err(SchedulingError::BadRequest(
                "invitation has already been answered".to_string(),
            ));
        }

        let slot = self
            .store
            .fetch_slot(&invitation.slot_id)?
            .ok_or(SchedulingError::NotFound("viewing slot"))?;

        let now = self.clock.now();
        if slot.start_time <= now {
            return Err(SchedulingError::BadRequest(
                "the viewing has already taken place".to_string(),
            ));
        }

        let application = self
            .directory
            .application(&invitation.application_id)?
            .ok_or(SchedulingError::NotFound("application"))?;

        match reply {
            InvitationReply::Decline => {
                let mut declined = invitation;
                declined.resolve(InvitationStatus::Declined, now);
                self.store.update_invitation(declined.clone())?;
                Ok(InvitationOutcome {
                    invitation: self.view(declined, &slot, &application)?,
                    booking: None,
                })
            }
            InvitationReply::Accept => {
                let contact = BookingContact {
                    first_name: application.first_name.clone(),
                    last_name: application.last_name.clone(),
                    email: application.email.clone(),
                    phone: application.phone.clone(),
                };
                let booking = Booking::new(
                    next_booking_id(),
                    slot.id.clone(),
                    contact,
                    Some(application.id.clone()),
                    Some(invitation.id.clone()),
                    now,
                );

                let (accepted, booking) =
                    self.store.accept_invitation(&invitation.id, booking, now)?;

                self.send_confirmation(&slot, &booking);

                Ok(InvitationOutcome {
                    invitation: self.view(accepted, &slot, &application)?,
                    booking: Some(booking.into()),
                })
            }
        }
    }

    /// Public fetch used by the token-gated response page.
    pub fn get_by_token(&self, token: &str) -> Result<InvitationView, SchedulingError> {
        let invitation = self
            .store
            .fetch_invitation_by_token(token)?
            .ok_or(SchedulingError::NotFound("invitation"))?;
        self.joined_view(invitation)
    }

    /// Landlord-facing listing for one slot.
    pub fn list_for_slot(
        &self,
        requester: &LandlordId,
        slot_id: &SlotId,
    ) -> Result<Vec<InvitationView>, SchedulingError> {
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

        self.store
            .invitations_for_slot(slot_id)?
            .into_iter()
            .map(|invitation| self.joined_view(invitation))
            .collect()
    }

    pub fn list_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<InvitationView>, SchedulingError> {
        self.store
            .invitations_for_application(application_id)?
            .into_iter()
            .map(|invitation| self.joined_view(invitation))
            .collect()
    }

    fn send_confirmation(&self, slot: &ViewingSlot, booking: &Booking) {
        let property = match self.directory.property(&slot.property_id) {
            Ok(Some(property)) => property,
            Ok(None) => {
                warn!(slot = %slot.id.0, "property missing, skipping acceptance confirmation");
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
            email: booking.contact.email.clone(),
            name: booking.contact.full_name(),
        };
        if let Err(err) = self
            .gateway
            .booking_confirmed(&recipient, &details, Some(&bytes))
        {
            warn!(slot = %slot.id.0, error = %err, "acceptance confirmation failed");
        }
    }

    fn joined_view(
        &self,
        invitation: ViewingInvitation,
    ) -> Result<InvitationView, SchedulingError> {
        let slot = self
            .store
            .fetch_slot(&invitation.slot_id)?
            .ok_or(SchedulingError::NotFound("viewing slot"))?;
        let application = self
            .directory
            .application(&invitation.application_id)?
            .ok_or(SchedulingError::NotFound("application"))?;
        self.view(invitation, &slot, &application)
    }

    fn view(
        &self,
        invitation: ViewingInvitation,
        slot: &ViewingSlot,
        application: &ApplicationSummary,
    ) -> Result<InvitationView, SchedulingError> {
        Ok(InvitationView {
            id: invitation.id,
            slot_id: invitation.slot_id,
            application_id: invitation.application_id,
            status: invitation.status,
            invited_at: invitation.invited_at,
            responded_at: invitation.responded_at,
            invitation_token: invitation.invitation_token,
            slot_start_time: slot.start_time,
            slot_end_time: slot.end_time,
            applicant_name: format!("{} {}", application.first_name, application.last_name),
            applicant_email: application.email.clone(),
        })
    }
}
