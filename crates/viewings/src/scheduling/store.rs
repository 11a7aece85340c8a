use chrono::{DateTime, Utc};

use super::domain::{
    ApplicationId, Booking, BookingId, InvitationId, PropertyId, SlotId, SlotType, ViewingSlot,
    ViewingInvitation, AccessType,
};
use super::error::SchedulingError;
use super::reminders::ReminderKind;

/// Filters applied when listing slots. `upcoming_after` keeps only slots
/// starting strictly after the given instant.
#[derive(Debug, Clone, Default)]
pub struct SlotFilter {
    pub property_id: Option<PropertyId>,
    pub slot_type: Option<SlotType>,
    pub access_type: Option<AccessType>,
    pub upcoming_after: Option<DateTime<Utc>>,
}

/// Rows removed by a cascading slot deletion, returned so the caller can
/// fan out cancellation notices before the data disappears.
#[derive(Debug, Clone)]
pub struct SlotCascade {
    pub slot: ViewingSlot,
    pub bookings: Vec<Booking>,
    pub invitations: Vec<ViewingInvitation>,
}

/// Storage abstraction for the scheduling subsystem.
///
/// The store is the only shared mutable resource; request handlers and the
/// reminder scheduler go through the same instance. The guarded mutations
/// (`insert_booking`, `accept_invitation`, `mark_reminder_sent`) must
/// evaluate their predicates and apply the write as a single atomic unit —
/// concurrent calls against the same slot behave as if serialized with
/// respect to the capacity and uniqueness invariants. Relationship
/// traversal is expressed as explicit query functions returning
/// materialized collections; there is no lazy loading to hide the data a
/// capacity check reads.
pub trait ViewingStore: Send + Sync {
    // Slots.
    fn insert_slot(&self, slot: ViewingSlot) -> Result<ViewingSlot, SchedulingError>;
    fn insert_slots(&self, slots: Vec<ViewingSlot>) -> Result<Vec<ViewingSlot>, SchedulingError>;
    fn fetch_slot(&self, id: &SlotId) -> Result<Option<ViewingSlot>, SchedulingError>;
    fn update_slot(&self, slot: ViewingSlot) -> Result<ViewingSlot, SchedulingError>;
    /// Removes the slot together with its bookings and invitations,
    /// returning everything that was removed.
    fn remove_slot(&self, id: &SlotId) -> Result<SlotCascade, SchedulingError>;
    /// Slots matching `filter`, ordered by `start_time`.
    fn list_slots(&self, filter: &SlotFilter) -> Result<Vec<ViewingSlot>, SchedulingError>;

    // Bookings.
    /// Persists a booking after re-checking, inside the store's own
    /// synchronization: the slot still exists, no active booking shares the
    /// slot and email (`Conflict`), and the active confirmed count is
    /// strictly below the slot's capacity (`CapacityExceeded`).
    fn insert_booking(&self, booking: Booking) -> Result<Booking, SchedulingError>;
    fn fetch_booking(&self, id: &BookingId) -> Result<Option<Booking>, SchedulingError>;
    fn update_booking(&self, booking: Booking) -> Result<(), SchedulingError>;
    /// All bookings for a slot in creation order, cancelled ones included.
    fn bookings_for_slot(&self, slot_id: &SlotId) -> Result<Vec<Booking>, SchedulingError>;
    /// Bookings counted against capacity: confirmed and not cancelled.
    fn active_bookings(&self, slot_id: &SlotId) -> Result<Vec<Booking>, SchedulingError>;
    fn count_active_bookings(&self, slot_id: &SlotId) -> Result<u32, SchedulingError>;

    // Invitations.
    /// Persists an invitation; at most one per (slot, application) pair
    /// (`Conflict`).
    fn insert_invitation(
        &self,
        invitation: ViewingInvitation,
    ) -> Result<ViewingInvitation, SchedulingError>;
    fn fetch_invitation(
        &self,
        id: &InvitationId,
    ) -> Result<Option<ViewingInvitation>, SchedulingError>;
    fn fetch_invitation_by_token(
        &self,
        token: &str,
    ) -> Result<Option<ViewingInvitation>, SchedulingError>;
    fn update_invitation(&self, invitation: ViewingInvitation) -> Result<(), SchedulingError>;
    fn invitations_for_slot(
        &self,
        slot_id: &SlotId,
    ) -> Result<Vec<ViewingInvitation>, SchedulingError>;
    fn invitations_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<ViewingInvitation>, SchedulingError>;
    fn count_invitations(&self, slot_id: &SlotId) -> Result<u32, SchedulingError>;

    /// Accepts a pending invitation and inserts the resulting booking as a
    /// single unit: either both are persisted or neither is. The booking
    /// insert runs the same duplicate and capacity predicates as
    /// [`ViewingStore::insert_booking`]; on failure the invitation must
    /// remain `Pending`.
    fn accept_invitation(
        &self,
        invitation_id: &InvitationId,
        booking: Booking,
        responded_at: DateTime<Utc>,
    ) -> Result<(ViewingInvitation, Booking), SchedulingError>;

    // Reminders.
    /// Active confirmed bookings whose slot starts within
    /// `[window_start, window_end)` and whose flag for `kind` is still
    /// unset. `cancelled_at` is re-checked at read time so a booking
    /// cancelled inside its window is never returned.
    fn reminders_due(
        &self,
        kind: ReminderKind,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<(Booking, ViewingSlot)>, SchedulingError>;
    /// Flips the reminder flag for `kind`, monotonically false→true.
    fn mark_reminder_sent(
        &self,
        booking_id: &BookingId,
        kind: ReminderKind,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulingError>;
}
