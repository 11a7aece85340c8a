use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::calendar::{calendar_event, viewing_details};
use super::domain::{
    AccessType, LandlordId, PropertyId, SlotId, SlotOccupancy, SlotType, ViewingSlot,
};
use super::error::SchedulingError;
use super::gateway::{
    CalendarGenerator, CalendarStatus, Clock, DirectoryPort, NotificationGateway,
    PreviousSchedule, PropertySummary, Recipient,
};
use super::store::{SlotFilter, ViewingStore};

/// Fields accepted when creating a single slot.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSlot {
    pub property_id: PropertyId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub slot_type: SlotType,
    pub access_type: AccessType,
    pub max_attendees: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Bulk generation request: equal-length slots covering a time range on a
/// single date.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkSlotRequest {
    pub property_id: PropertyId,
    pub date: NaiveDate,
    pub time_start: NaiveTime,
    pub time_end: NaiveTime,
    /// Minutes per generated slot; `0` produces one slot over the whole
    /// range.
    pub slot_duration_minutes: u32,
    pub slot_type: SlotType,
    pub access_type: AccessType,
    pub max_attendees: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlotPatch {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub max_attendees: Option<u32>,
    pub notes: Option<String>,
}

/// Slot representation returned to callers, carrying live occupancy.
#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    pub id: SlotId,
    pub property_id: PropertyId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub slot_type: SlotType,
    pub access_type: AccessType,
    pub max_attendees: u32,
    pub confirmed_count: u32,
    pub available_spots: u32,
    pub invitation_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

static SLOT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_slot_id() -> SlotId {
    let id = SLOT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SlotId(format!("slot-{id:06}"))
}

/// Service owning `ViewingSlot` records and their derived occupancy.
pub struct SlotService<S, N> {
    store: Arc<S>,
    gateway: Arc<N>,
    directory: Arc<dyn DirectoryPort>,
    calendar: Arc<dyn CalendarGenerator>,
    clock: Arc<dyn Clock>,
}

impl<S, N> SlotService<S, N>
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

    /// Creates a single slot. Individual slots are clamped to one
    /// attendee regardless of the requested capacity.
    pub fn create(
        &self,
        requester: &LandlordId,
        request: NewSlot,
    ) -> Result<SlotView, SchedulingError> {
        self.owned_property(&request.property_id, requester)?;
        validate_window(request.start_time, request.end_time)?;

        let now = self.clock.now();
        let slot = ViewingSlot {
            id: next_slot_id(),
            property_id: request.property_id,
            start_time: request.start_time,
            end_time: request.end_time,
            slot_type: request.slot_type,
            access_type: request.access_type,
            max_attendees: clamp_capacity(request.slot_type, request.max_attendees)?,
            notes: request.notes,
            created_at: now,
            updated_at: now,
        };

        let slot = self.store.insert_slot(slot)?;
        self.view(&slot)
    }

    /// Generates a contiguous, non-overlapping sequence of slots covering
    /// `[time_start, time_end)` on `date`. A duration of zero yields one
    /// slot spanning the whole range; otherwise the range is divided into
    /// `floor(range / duration)` equal slots and any partial remainder is
    /// dropped.
    pub fn bulk_create(
        &self,
        requester: &LandlordId,
        request: BulkSlotRequest,
    ) -> Result<Vec<SlotView>, SchedulingError> {
        self.owned_property(&request.property_id, requester)?;

        let range_start = request.date.and_time(request.time_start).and_utc();
        let range_end = request.date.and_time(request.time_end).and_utc();
        validate_window(range_start, range_end)?;

        let capacity = clamp_capacity(request.slot_type, request.max_attendees)?;
        let now = self.clock.now();

        let windows: Vec<(DateTime<Utc>, DateTime<Utc>)> = if request.slot_duration_minutes == 0 {
            vec![(range_start, range_end)]
        } else {
            let step = Duration::minutes(i64::from(request.slot_duration_minutes));
            let range = range_end - range_start;
            let count = range.num_minutes() / step.num_minutes();
            (0..count)
                .map(|index| {
                    let start = range_start + step * i32::try_from(index).unwrap_or(i32::MAX);
                    (start, start + step)
                })
                .collect()
        };

        let slots: Vec<ViewingSlot> = windows
            .into_iter()
            .map(|(start, end)| ViewingSlot {
                id: next_slot_id(),
                property_id: request.property_id.clone(),
                start_time: start,
                end_time: end,
                slot_type: request.slot_type,
                access_type: request.access_type,
                max_attendees: capacity,
                notes: request.notes.clone(),
                created_at: now,
                updated_at: now,
            })
            .collect();

        let slots = self.store.insert_slots(slots)?;
        slots.iter().map(|slot| self.view(slot)).collect()
    }

    pub fn get(&self, slot_id: &SlotId) -> Result<SlotView, SchedulingError> {
        let slot = self
            .store
            .fetch_slot(slot_id)?
            .ok_or(SchedulingError::NotFound("viewing slot"))?;
        self.view(&slot)
    }

    /// Occupancy derived live from booking and invitation state.
    pub fn occupancy(&self, slot_id: &SlotId) -> Result<SlotOccupancy, SchedulingError> {
        let slot = self
            .store
            .fetch_slot(slot_id)?
            .ok_or(SchedulingError::NotFound("viewing slot"))?;
        self.occupancy_of(&slot)
    }

    pub fn list(&self, filter: &SlotFilter) -> Result<Vec<SlotView>, SchedulingError> {
        let slots = self.store.list_slots(filter)?;
        slots.iter().map(|slot| self.view(slot)).collect()
    }

    /// Applies a partial update. A changed time window triggers a
    /// reschedule notice to every active booking holder; a reduced
    /// capacity never invalidates bookings already made.
    pub fn update(
        &self,
        requester: &LandlordId,
        slot_id: &SlotId,
        patch: SlotPatch,
    ) -> Result<SlotView, SchedulingError> {
        let previous = self
            .store
            .fetch_slot(slot_id)?
            .ok_or(SchedulingError::NotFound("viewing slot"))?;
        let property = self.owned_property(&previous.property_id, requester)?;

        let mut slot = previous.clone();
        if let Some(start) = patch.start_time {
            slot.start_time = start;
        }
        if let Some(end) = patch.end_time {
            slot.end_time = end;
        }
        if let Some(capacity) = patch.max_attendees {
            slot.max_attendees = clamp_capacity(slot.slot_type, capacity)?;
        }
        if let Some(notes) = patch.notes {
            slot.notes = Some(notes);
        }
        validate_window(slot.start_time, slot.end_time)?;
        slot.updated_at = self.clock.now();

        let slot = self.store.update_slot(slot)?;

        let time_changed =
            slot.start_time != previous.start_time || slot.end_time != previous.end_time;
        if time_changed {
            self.notify_reschedule(&previous, &slot, &property)?;
        }

        self.view(&slot)
    }

    /// Deletes a slot after notifying every active booking holder and
    /// every pending invitee; bookings and invitations are removed with
    /// it.
    pub fn delete(&self, requester: &LandlordId, slot_id: &SlotId) -> Result<(), SchedulingError> {
        let slot = self
            .store
            .fetch_slot(slot_id)?
            .ok_or(SchedulingError::NotFound("viewing slot"))?;
        let property = self.owned_property(&slot.property_id, requester)?;

        let cascade = self.store.remove_slot(slot_id)?;

        let details = viewing_details(&cascade.slot, &property);
        let bytes = self
            .calendar
            .generate(&calendar_event(&cascade.slot, &property, CalendarStatus::Cancelled));

        for booking in cascade.bookings.iter().filter(|booking| booking.is_active()) {
            let recipient = Recipient {
                email: booking.contact.email.clone(),
                name: booking.contact.full_name(),
            };
            if let Err(err) = self
                .gateway
                .slot_cancelled(&recipient, &details, Some(&bytes))
            {
                warn!(booking = %booking.id.0, error = %err, "slot cancellation notice failed");
            }
        }

        for invitation in cascade
            .invitations
            .iter()
            .filter(|invitation| invitation.is_pending())
        {
            let Some(application) = self.directory.application(&invitation.application_id)? else {
                continue;
            };
            let recipient = Recipient {
                email: application.email.clone(),
                name: format!("{} {}", application.first_name, application.last_name),
            };
            if let Err(err) = self
                .gateway
                .slot_cancelled(&recipient, &details, Some(&bytes))
            {
                warn!(invitation = %invitation.id.0, error = %err, "slot cancellation notice failed");
            }
        }

        Ok(())
    }

    fn notify_reschedule(
        &self,
        previous: &ViewingSlot,
        slot: &ViewingSlot,
        property: &PropertySummary,
    ) -> Result<(), SchedulingError> {
        let details = viewing_details(slot, property);
        let old_schedule = PreviousSchedule {
            viewing_date: super::calendar::format_viewing_date(previous.start_time),
            viewing_time: super::calendar::format_viewing_time(previous.start_time),
        };
        let bytes = self
            .calendar
            .generate(&calendar_event(slot, property, CalendarStatus::Confirmed));

        for booking in self.store.active_bookings(&slot.id)? {
            let recipient = Recipient {
                email: booking.contact.email.clone(),
                name: booking.contact.full_name(),
            };
            if let Err(err) =
                self.gateway
                    .slot_rescheduled(&recipient, &details, &old_schedule, Some(&bytes))
            {
                warn!(booking = %booking.id.0, error = %err, "reschedule notice failed");
            }
        }
        Ok(())
    }

    fn occupancy_of(&self, slot: &ViewingSlot) -> Result<SlotOccupancy, SchedulingError> {
        let confirmed_count = self.store.count_active_bookings(&slot.id)?;
        let invitation_count = self.store.count_invitations(&slot.id)?;
        Ok(SlotOccupancy {
            confirmed_count,
            // Saturates: a capacity reduction below the booked count shows
            // zero availability instead of invalidating bookings.
            available_spots: slot.max_attendees.saturating_sub(confirmed_count),
            invitation_count,
        })
    }

    fn view(&self, slot: &ViewingSlot) -> Result<SlotView, SchedulingError> {
        let occupancy = self.occupancy_of(slot)?;
        Ok(SlotView {
            id: slot.id.clone(),
            property_id: slot.property_id.clone(),
            start_time: slot.start_time,
            end_time: slot.end_time,
            slot_type: slot.slot_type,
            access_type: slot.access_type,
            max_attendees: slot.max_attendees,
            confirmed_count: occupancy.confirmed_count,
            available_spots: occupancy.available_spots,
            invitation_count: occupancy.invitation_count,
            notes: slot.notes.clone(),
            created_at: slot.created_at,
            updated_at: slot.updated_at,
        })
    }

    fn owned_property(
        &self,
        property_id: &PropertyId,
        requester: &LandlordId,
    ) -> Result<PropertySummary, SchedulingError> {
        let property = self
            .directory
            .property(property_id)?
            .ok_or(SchedulingError::NotFound("property"))?;
        if property.landlord_id != *requester {
            return Err(SchedulingError::Forbidden(
                "requester does not own this property".to_string(),
            ));
        }
        Ok(property)
    }
}

fn validate_window(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(), SchedulingError> {
    if end <= start {
        return Err(SchedulingError::Validation(
            "end time must be after start time".to_string(),
        ));
    }
    Ok(())
}

fn clamp_capacity(slot_type: SlotType, requested: u32) -> Result<u32, SchedulingError> {
    if requested == 0 {
        return Err(SchedulingError::Validation(
            "max_attendees must be at least 1".to_string(),
        ));
    }
    Ok(match slot_type {
        SlotType::Individual => 1,
        SlotType::Group => requested,
    })
}
