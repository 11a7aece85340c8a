use chrono::{DateTime, Datelike, Utc};

use super::domain::ViewingSlot;
use super::gateway::{CalendarEvent, CalendarStatus, PropertySummary, ViewingDetails};

/// Display date, German locale: `15.02.2026`.
pub fn format_viewing_date(instant: DateTime<Utc>) -> String {
    instant.format("%d.%m.%Y").to_string()
}

/// Display time of day: `14:00`.
pub fn format_viewing_time(instant: DateTime<Utc>) -> String {
    instant.format("%H:%M").to_string()
}

/// Long display form with weekday, e.g. `Sa, 15.02.2026 14:00 Uhr`.
pub fn format_viewing_long(instant: DateTime<Utc>) -> String {
    const WEEKDAYS: [&str; 7] = ["Mo", "Di", "Mi", "Do", "Fr", "Sa", "So"];
    let weekday = WEEKDAYS[instant.weekday().num_days_from_monday() as usize];
    format!("{}, {} Uhr", weekday, instant.format("%d.%m.%Y %H:%M"))
}

/// Assembles the per-event notification payload from a slot and its
/// property record.
pub fn viewing_details(slot: &ViewingSlot, property: &PropertySummary) -> ViewingDetails {
    ViewingDetails {
        slot_id: slot.id.clone(),
        property_title: property.title.clone(),
        property_address: property.full_address(),
        viewing_date: format_viewing_date(slot.start_time),
        viewing_time: format_viewing_time(slot.start_time),
    }
}

/// Assembles the structured calendar entry handed to the byte generator.
pub fn calendar_event(
    slot: &ViewingSlot,
    property: &PropertySummary,
    status: CalendarStatus,
) -> CalendarEvent {
    CalendarEvent {
        slot_id: slot.id.clone(),
        title: format!("Besichtigung: {}", property.title),
        address: property.full_address(),
        start: slot.start_time,
        end: slot.end_time,
        status,
    }
}
