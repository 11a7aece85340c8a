use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use super::domain::{
    ApplicationId, Booking, BookingId, InvitationId, InvitationStatus, SlotId, ViewingSlot,
    ViewingInvitation,
};
use super::error::SchedulingError;
use super::reminders::ReminderKind;
use super::store::{SlotCascade, SlotFilter, ViewingStore};

#[derive(Default)]
struct Tables {
    slots: HashMap<SlotId, ViewingSlot>,
    // Vecs preserve creation order, which the listing projections expose.
    bookings: Vec<Booking>,
    invitations: Vec<ViewingInvitation>,
}

/// In-memory storage engine. A single mutex spans all three tables, so
/// every guarded mutation observes and applies its predicates atomically —
/// the serializable-equivalent isolation the booking path requires.
#[derive(Default, Clone)]
pub struct InMemoryViewingStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryViewingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guarded_booking_insert(
        tables: &mut Tables,
        booking: Booking,
    ) -> Result<Booking, SchedulingError> {
        let slot = tables
            .slots
            .get(&booking.slot_id)
            .ok_or(SchedulingError::NotFound("viewing slot"))?;

        let duplicate = tables.bookings.iter().any(|existing| {
            existing.slot_id == booking.slot_id
                && existing.is_active()
                && existing.contact.email.eq_ignore_ascii_case(&booking.contact.email)
        });
        if duplicate {
            return Err(SchedulingError::Conflict(
                "this email has already booked the viewing".to_string(),
            ));
        }

        let active = tables
            .bookings
            .iter()
            .filter(|existing| existing.slot_id == booking.slot_id && existing.is_active())
            .count() as u32;
        if active >= slot.max_attendees {
            return Err(SchedulingError::CapacityExceeded);
        }

        tables.bookings.push(booking.clone());
        Ok(booking)
    }
}

impl ViewingStore for InMemoryViewingStore {
    fn insert_slot(&self, slot: ViewingSlot) -> Result<ViewingSlot, SchedulingError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        tables.slots.insert(slot.id.clone(), slot.clone());
        Ok(slot)
    }

    fn insert_slots(&self, slots: Vec<ViewingSlot>) -> Result<Vec<ViewingSlot>, SchedulingError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        for slot in &slots {
            tables.slots.insert(slot.id.clone(), slot.clone());
        }
        Ok(slots)
    }

    fn fetch_slot(&self, id: &SlotId) -> Result<Option<ViewingSlot>, SchedulingError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.slots.get(id).cloned())
    }

    fn update_slot(&self, slot: ViewingSlot) -> Result<ViewingSlot, SchedulingError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if !tables.slots.contains_key(&slot.id) {
            return Err(SchedulingError::NotFound("viewing slot"));
        }
        tables.slots.insert(slot.id.clone(), slot.clone());
        Ok(slot)
    }

    fn remove_slot(&self, id: &SlotId) -> Result<SlotCascade, SchedulingError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let slot = tables
            .slots
            .remove(id)
            .ok_or(SchedulingError::NotFound("viewing slot"))?;

        let (removed_bookings, kept_bookings) = std::mem::take(&mut tables.bookings)
            .into_iter()
            .partition(|booking| booking.slot_id == *id);
        tables.bookings = kept_bookings;

        let (removed_invitations, kept_invitations) = std::mem::take(&mut tables.invitations)
            .into_iter()
            .partition(|invitation| invitation.slot_id == *id);
        tables.invitations = kept_invitations;

        Ok(SlotCascade {
            slot,
            bookings: removed_bookings,
            invitations: removed_invitations,
        })
    }

    fn list_slots(&self, filter: &SlotFilter) -> Result<Vec<ViewingSlot>, SchedulingError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        let mut slots: Vec<ViewingSlot> = tables
            .slots
            .values()
            .filter(|slot| {
                filter
                    .property_id
                    .as_ref()
                    .map_or(true, |property| slot.property_id == *property)
                    && filter
                        .slot_type
                        .map_or(true, |slot_type| slot.slot_type == slot_type)
                    && filter
                        .access_type
                        .map_or(true, |access| slot.access_type == access)
                    && filter
                        .upcoming_after
                        .map_or(true, |after| slot.start_time > after)
            })
            .cloned()
            .collect();
        slots.sort_by_key(|slot| slot.start_time);
        Ok(slots)
    }

    fn insert_booking(&self, booking: Booking) -> Result<Booking, SchedulingError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        Self::guarded_booking_insert(&mut tables, booking)
    }

    fn fetch_booking(&self, id: &BookingId) -> Result<Option<Booking>, SchedulingError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .bookings
            .iter()
            .find(|booking| booking.id == *id)
            .cloned())
    }

    fn update_booking(&self, booking: Booking) -> Result<(), SchedulingError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        match tables
            .bookings
            .iter_mut()
            .find(|existing| existing.id == booking.id)
        {
            Some(existing) => {
                *existing = booking;
                Ok(())
            }
            None => Err(SchedulingError::NotFound("booking")),
        }
    }

    fn bookings_for_slot(&self, slot_id: &SlotId) -> Result<Vec<Booking>, SchedulingError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .bookings
            .iter()
            .filter(|booking| booking.slot_id == *slot_id)
            .cloned()
            .collect())
    }

    fn active_bookings(&self, slot_id: &SlotId) -> Result<Vec<Booking>, SchedulingError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .bookings
            .iter()
            .filter(|booking| booking.slot_id == *slot_id && booking.is_active())
            .cloned()
            .collect())
    }

    fn count_active_bookings(&self, slot_id: &SlotId) -> Result<u32, SchedulingError> {
        self.active_bookings(slot_id)
            .map(|bookings| bookings.len() as u32)
    }

    fn insert_invitation(
        &self,
        invitation: ViewingInvitation,
    ) -> Result<ViewingInvitation, SchedulingError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let duplicate = tables.invitations.iter().any(|existing| {
            existing.slot_id == invitation.slot_id
                && existing.application_id == invitation.application_id
        });
        if duplicate {
            return Err(SchedulingError::Conflict(
                "an invitation for this application and slot already exists".to_string(),
            ));
        }
        tables.invitations.push(invitation.clone());
        Ok(invitation)
    }

    fn fetch_invitation(
        &self,
        id: &InvitationId,
    ) -> Result<Option<ViewingInvitation>, SchedulingError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .invitations
            .iter()
            .find(|invitation| invitation.id == *id)
            .cloned())
    }

    fn fetch_invitation_by_token(
        &self,
        token: &str,
    ) -> Result<Option<ViewingInvitation>, SchedulingError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .invitations
            .iter()
            .find(|invitation| invitation.invitation_token == token)
            .cloned())
    }

    fn update_invitation(&self, invitation: ViewingInvitation) -> Result<(), SchedulingError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        match tables
            .invitations
            .iter_mut()
            .find(|existing| existing.id == invitation.id)
        {
            Some(existing) => {
                *existing = invitation;
                Ok(())
            }
            None => Err(SchedulingError::NotFound("invitation")),
        }
    }

    fn invitations_for_slot(
        &self,
        slot_id: &SlotId,
    ) -> Result<Vec<ViewingInvitation>, SchedulingError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .invitations
            .iter()
            .filter(|invitation| invitation.slot_id == *slot_id)
            .cloned()
            .collect())
    }

    fn invitations_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<ViewingInvitation>, SchedulingError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .invitations
            .iter()
            .filter(|invitation| invitation.application_id == *application_id)
            .cloned()
            .collect())
    }

    fn count_invitations(&self, slot_id: &SlotId) -> Result<u32, SchedulingError> {
        self.invitations_for_slot(slot_id)
            .map(|invitations| invitations.len() as u32)
    }

    fn accept_invitation(
        &self,
        invitation_id: &InvitationId,
        booking: Booking,
        responded_at: DateTime<Utc>,
    ) -> Result<(ViewingInvitation, Booking), SchedulingError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");

        let pending = tables
            .invitations
            .iter()
            .find(|invitation| invitation.id == *invitation_id)
            .ok_or(SchedulingError::NotFound("invitation"))?;
        if !pending.is_pending() {
            return Err(SchedulingError::BadRequest(
                "invitation has already been answered".to_string(),
            ));
        }

        // Booking first: if the slot is full the invitation must stay
        // pending, so nothing is written on failure.
        let booking = Self::guarded_booking_insert(&mut tables, booking)?;

        let invitation = tables
            .invitations
            .iter_mut()
            .find(|invitation| invitation.id == *invitation_id)
            .expect("invitation present under lock");
        invitation.resolve(InvitationStatus::Accepted, responded_at);
        let accepted = invitation.clone();

        Ok((accepted, booking))
    }

    fn reminders_due(
        &self,
        kind: ReminderKind,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<(Booking, ViewingSlot)>, SchedulingError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        let mut due = Vec::new();
        for booking in &tables.bookings {
            if !booking.is_active() || kind.already_sent(booking) {
                continue;
            }
            let Some(slot) = tables.slots.get(&booking.slot_id) else {
                continue;
            };
            if slot.start_time >= window_start && slot.start_time < window_end {
                due.push((booking.clone(), slot.clone()));
            }
        }
        Ok(due)
    }

    fn mark_reminder_sent(
        &self,
        booking_id: &BookingId,
        kind: ReminderKind,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulingError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let booking = tables
            .bookings
            .iter_mut()
            .find(|booking| booking.id == *booking_id)
            .ok_or(SchedulingError::NotFound("booking"))?;
        match kind {
            ReminderKind::DayBefore => booking.reminder_24h_sent = true,
            ReminderKind::HourBefore => booking.reminder_1h_sent = true,
        }
        booking.updated_at = now;
        Ok(())
    }
}
