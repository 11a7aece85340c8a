use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    ApplicationId, CancellationInitiator, LandlordId, PropertyId, SlotId,
};
use super::reminders::ReminderKind;

/// Property record as served by the external property CRUD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySummary {
    pub id: PropertyId,
    pub title: String,
    pub address: String,
    pub city: String,
    pub zip_code: String,
    pub landlord_id: LandlordId,
    pub landlord_email: String,
}

impl PropertySummary {
    /// Postal address line used in notifications and calendar entries.
    pub fn full_address(&self) -> String {
        format!("{}, {} {}", self.address, self.zip_code, self.city)
    }
}

/// Application record as served by the external application CRUD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSummary {
    pub id: ApplicationId,
    pub property_id: PropertyId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    /// Token for the applicant's self-service portal, forwarded in
    /// reminder payloads when present.
    pub access_token: Option<String>,
}

/// Lookup seam to the property and application subsystems.
pub trait DirectoryPort: Send + Sync {
    fn property(&self, id: &PropertyId) -> Result<Option<PropertySummary>, DirectoryError>;
    fn application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationSummary>, DirectoryError>;
}

/// Directory transport failure.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Addressee of an outbound notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub name: String,
}

/// Structured viewing data shared by every notification event. Date and
/// time are preformatted display strings; the gateway never re-derives
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewingDetails {
    pub slot_id: SlotId,
    pub property_title: String,
    pub property_address: String,
    pub viewing_date: String,
    pub viewing_time: String,
}

/// Previous schedule carried alongside a reschedule notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousSchedule {
    pub viewing_date: String,
    pub viewing_time: String,
}

/// Outbound notification seam. One call per event type; rendering and
/// delivery (HTML, SMTP) happen behind this trait, never in this crate.
pub trait NotificationGateway: Send + Sync {
    fn booking_confirmed(
        &self,
        recipient: &Recipient,
        details: &ViewingDetails,
        calendar: Option<&[u8]>,
    ) -> Result<(), NotifyError>;

    /// Cancellation notice to the property's landlord, worded by
    /// initiating party.
    fn booking_cancelled(
        &self,
        landlord: &Recipient,
        attendee_name: &str,
        details: &ViewingDetails,
        initiator: CancellationInitiator,
    ) -> Result<(), NotifyError>;

    fn slot_rescheduled(
        &self,
        recipient: &Recipient,
        details: &ViewingDetails,
        previous: &PreviousSchedule,
        calendar: Option<&[u8]>,
    ) -> Result<(), NotifyError>;

    fn slot_cancelled(
        &self,
        recipient: &Recipient,
        details: &ViewingDetails,
        calendar: Option<&[u8]>,
    ) -> Result<(), NotifyError>;

    fn invitation_created(
        &self,
        recipient: &Recipient,
        details: &ViewingDetails,
        invitation_token: &str,
        calendar: Option<&[u8]>,
    ) -> Result<(), NotifyError>;

    fn viewing_reminder(
        &self,
        recipient: &Recipient,
        details: &ViewingDetails,
        kind: ReminderKind,
        portal_token: Option<&str>,
        calendar: Option<&[u8]>,
    ) -> Result<(), NotifyError>;
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Calendar entry status mirrored into generated attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

/// Structured calendar entry handed to the external byte generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub slot_id: SlotId,
    pub title: String,
    pub address: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: CalendarStatus,
}

/// Pure calendar-file generator; byte layout is owned elsewhere.
pub trait CalendarGenerator: Send + Sync {
    fn generate(&self, event: &CalendarEvent) -> Vec<u8>;
}

/// Time source injected into the services so deadline and window logic is
/// deterministic under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used in production wiring.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
