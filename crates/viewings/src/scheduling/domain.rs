use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for viewing slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotId(pub String);

/// Identifier wrapper for bookings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(pub String);

/// Identifier wrapper for viewing invitations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvitationId(pub String);

/// Identifier of a property owned by the external property CRUD.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyId(pub String);

/// Identifier of a rental application owned by the external application CRUD.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Identifier of a landlord account, injected by the upstream auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LandlordId(pub String);

/// Whether a slot hosts a single applicant or a group viewing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotType {
    Individual,
    Group,
}

impl SlotType {
    pub const fn label(self) -> &'static str {
        match self {
            SlotType::Individual => "individual",
            SlotType::Group => "group",
        }
    }
}

/// Access policy for direct booking of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    /// Anyone may book a seat directly.
    Public,
    /// Only holders of a valid invitation may obtain a seat.
    Invited,
}

impl AccessType {
    pub const fn label(self) -> &'static str {
        match self {
            AccessType::Public => "public",
            AccessType::Invited => "invited",
        }
    }
}

/// A bookable time window for a property viewing.
///
/// `end_time > start_time` is a hard invariant, enforced at the service
/// boundary. Individual slots carry `max_attendees == 1` regardless of the
/// capacity requested at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewingSlot {
    pub id: SlotId,
    pub property_id: PropertyId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub slot_type: SlotType,
    pub access_type: AccessType,
    pub max_attendees: u32,
    /// Landlord-only free text, no behavioral effect.
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Contact details denormalized onto a booking at reservation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingContact {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl BookingContact {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A confirmed reservation of one seat in a slot.
///
/// Bookings are never physically deleted except through cascading slot
/// deletion; cancellation is a one-way transition recorded in
/// `cancelled_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub slot_id: SlotId,
    pub contact: BookingContact,
    pub confirmed: bool,
    pub application_id: Option<ApplicationId>,
    pub invitation_id: Option<InvitationId>,
    pub reminder_24h_sent: bool,
    pub reminder_1h_sent: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        id: BookingId,
        slot_id: SlotId,
        contact: BookingContact,
        application_id: Option<ApplicationId>,
        invitation_id: Option<InvitationId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            slot_id,
            contact,
            confirmed: true,
            application_id,
            invitation_id,
            reminder_24h_sent: false,
            reminder_1h_sent: false,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Active bookings are the only kind counted against slot capacity.
    pub fn is_active(&self) -> bool {
        self.confirmed && self.cancelled_at.is_none()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }

    pub(crate) fn cancel(&mut self, now: DateTime<Utc>) {
        self.cancelled_at = Some(now);
        self.confirmed = false;
        self.updated_at = now;
    }
}

/// Lifecycle of a viewing invitation. `Accepted` and `Declined` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

impl InvitationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Declined => "declined",
        }
    }
}

/// A directed, token-gated offer for one applicant to respond to one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewingInvitation {
    pub id: InvitationId,
    pub slot_id: SlotId,
    pub application_id: ApplicationId,
    pub status: InvitationStatus,
    pub invited_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    /// Unique, unguessable token granting unauthenticated response access.
    pub invitation_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ViewingInvitation {
    pub fn is_pending(&self) -> bool {
        self.status == InvitationStatus::Pending
    }

    pub(crate) fn resolve(&mut self, status: InvitationStatus, now: DateTime<Utc>) {
        self.status = status;
        self.responded_at = Some(now);
        self.updated_at = now;
    }
}

/// Which party initiated a booking cancellation; drives notification
/// wording only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationInitiator {
    Applicant,
    Landlord,
}

impl CancellationInitiator {
    pub const fn label(self) -> &'static str {
        match self {
            CancellationInitiator::Applicant => "applicant",
            CancellationInitiator::Landlord => "landlord",
        }
    }
}

/// Live occupancy metrics for a slot, always derived from booking and
/// invitation state rather than cached counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotOccupancy {
    pub confirmed_count: u32,
    pub available_spots: u32,
    pub invitation_count: u32,
}
