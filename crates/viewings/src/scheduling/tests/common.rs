use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::scheduling::domain::{
    AccessType, ApplicationId, CancellationInitiator, LandlordId, PropertyId, SlotId, SlotType,
};
use crate::scheduling::gateway::{
    ApplicationSummary, CalendarEvent, CalendarGenerator, Clock, DirectoryError, DirectoryPort,
    NotificationGateway, NotifyError, PreviousSchedule, PropertySummary, Recipient,
    ViewingDetails,
};
use crate::scheduling::memory::InMemoryViewingStore;
use crate::scheduling::reminders::ReminderKind;
use crate::scheduling::slots::{NewSlot, SlotView};
use crate::scheduling::ViewingServices;

pub(super) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0)
        .single()
        .expect("valid base time")
}

pub(super) fn landlord() -> LandlordId {
    LandlordId("landlord-1".to_string())
}

pub(super) fn other_landlord() -> LandlordId {
    LandlordId("landlord-2".to_string())
}

pub(super) fn property_id() -> PropertyId {
    PropertyId("prop-1".to_string())
}

pub(super) fn application_id() -> ApplicationId {
    ApplicationId("app-1".to_string())
}

/// Settable clock so deadline and window logic is deterministic.
pub(super) struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub(super) fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(super) fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock mutex poisoned") = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

/// Everything the gateway was asked to deliver, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum GatewayEvent {
    BookingConfirmed {
        email: String,
        slot_id: SlotId,
        has_calendar: bool,
    },
    BookingCancelled {
        landlord_email: String,
        attendee: String,
        initiator: CancellationInitiator,
    },
    SlotRescheduled {
        email: String,
        previous_date: String,
        previous_time: String,
    },
    SlotCancelled {
        email: String,
        slot_id: SlotId,
    },
    InvitationCreated {
        email: String,
        token: String,
    },
    Reminder {
        email: String,
        kind: ReminderKind,
        portal_token: Option<String>,
    },
}

/// Recording gateway; delivery to an email in `failing` errors out.
#[derive(Default)]
pub(super) struct RecordingGateway {
    events: Mutex<Vec<GatewayEvent>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingGateway {
    pub(super) fn events(&self) -> Vec<GatewayEvent> {
        self.events.lock().expect("gateway mutex poisoned").clone()
    }

    pub(super) fn fail_for(&self, email: &str) {
        self.failing
            .lock()
            .expect("gateway mutex poisoned")
            .insert(email.to_string());
    }

    pub(super) fn recover(&self, email: &str) {
        self.failing
            .lock()
            .expect("gateway mutex poisoned")
            .remove(email);
    }

    fn deliver(&self, email: &str, event: GatewayEvent) -> Result<(), NotifyError> {
        if self
            .failing
            .lock()
            .expect("gateway mutex poisoned")
            .contains(email)
        {
            return Err(NotifyError::Transport("smtp refused".to_string()));
        }
        self.events
            .lock()
            .expect("gateway mutex poisoned")
            .push(event);
        Ok(())
    }
}

impl NotificationGateway for RecordingGateway {
    fn booking_confirmed(
        &self,
        recipient: &Recipient,
        details: &ViewingDetails,
        calendar: Option<&[u8]>,
    ) -> Result<(), NotifyError> {
        self.deliver(
            &recipient.email,
            GatewayEvent::BookingConfirmed {
                email: recipient.email.clone(),
                slot_id: details.slot_id.clone(),
                has_calendar: calendar.is_some(),
            },
        )
    }

    fn booking_cancelled(
        &self,
        landlord: &Recipient,
        attendee_name: &str,
        _details: &ViewingDetails,
        initiator: CancellationInitiator,
    ) -> Result<(), NotifyError> {
        self.deliver(
            &landlord.email,
            GatewayEvent::BookingCancelled {
                landlord_email: landlord.email.clone(),
                attendee: attendee_name.to_string(),
                initiator,
            },
        )
    }

    fn slot_rescheduled(
        &self,
        recipient: &Recipient,
        _details: &ViewingDetails,
        previous: &PreviousSchedule,
        _calendar: Option<&[u8]>,
    ) -> Result<(), NotifyError> {
        self.deliver(
            &recipient.email,
            GatewayEvent::SlotRescheduled {
                email: recipient.email.clone(),
                previous_date: previous.viewing_date.clone(),
                previous_time: previous.viewing_time.clone(),
            },
        )
    }

    fn slot_cancelled(
        &self,
        recipient: &Recipient,
        details: &ViewingDetails,
        _calendar: Option<&[u8]>,
    ) -> Result<(), NotifyError> {
        self.deliver(
            &recipient.email,
            GatewayEvent::SlotCancelled {
                email: recipient.email.clone(),
                slot_id: details.slot_id.clone(),
            },
        )
    }

    fn invitation_created(
        &self,
        recipient: &Recipient,
        _details: &ViewingDetails,
        invitation_token: &str,
        _calendar: Option<&[u8]>,
    ) -> Result<(), NotifyError> {
        self.deliver(
            &recipient.email,
            GatewayEvent::InvitationCreated {
                email: recipient.email.clone(),
                token: invitation_token.to_string(),
            },
        )
    }

    fn viewing_reminder(
        &self,
        recipient: &Recipient,
        _details: &ViewingDetails,
        kind: ReminderKind,
        portal_token: Option<&str>,
        _calendar: Option<&[u8]>,
    ) -> Result<(), NotifyError> {
        self.deliver(
            &recipient.email,
            GatewayEvent::Reminder {
                email: recipient.email.clone(),
                kind,
                portal_token: portal_token.map(str::to_string),
            },
        )
    }
}

/// Fixture directory: two properties, three applications.
#[derive(Default)]
pub(super) struct FixedDirectory {
    properties: HashMap<PropertyId, PropertySummary>,
    applications: HashMap<ApplicationId, ApplicationSummary>,
}

impl FixedDirectory {
    pub(super) fn with_fixtures() -> Self {
        let mut directory = Self::default();
        directory.add_property(PropertySummary {
            id: property_id(),
            title: "Altbauwohnung am Park".to_string(),
            address: "Parkstrasse 12".to_string(),
            city: "Leipzig".to_string(),
            zip_code: "04103".to_string(),
            landlord_id: landlord(),
            landlord_email: "landlord@example.com".to_string(),
        });
        directory.add_property(PropertySummary {
            id: PropertyId("prop-2".to_string()),
            title: "Neubau Suedstadt".to_string(),
            address: "Gartenweg 3".to_string(),
            city: "Leipzig".to_string(),
            zip_code: "04277".to_string(),
            landlord_id: other_landlord(),
            landlord_email: "other@example.com".to_string(),
        });
        directory.add_application(ApplicationSummary {
            id: application_id(),
            property_id: property_id(),
            first_name: "Alice".to_string(),
            last_name: "Anders".to_string(),
            email: "alice@example.com".to_string(),
            phone: Some("+49 170 1111111".to_string()),
            access_token: Some("portal-token-alice".to_string()),
        });
        directory.add_application(ApplicationSummary {
            id: ApplicationId("app-2".to_string()),
            property_id: property_id(),
            first_name: "Bruno".to_string(),
            last_name: "Berg".to_string(),
            email: "bruno@example.com".to_string(),
            phone: None,
            access_token: None,
        });
        directory.add_application(ApplicationSummary {
            id: ApplicationId("app-3".to_string()),
            property_id: PropertyId("prop-2".to_string()),
            first_name: "Clara".to_string(),
            last_name: "Cramer".to_string(),
            email: "clara@example.com".to_string(),
            phone: None,
            access_token: None,
        });
        directory
    }

    pub(super) fn add_property(&mut self, property: PropertySummary) {
        self.properties.insert(property.id.clone(), property);
    }

    pub(super) fn add_application(&mut self, application: ApplicationSummary) {
        self.applications
            .insert(application.id.clone(), application);
    }
}

impl DirectoryPort for FixedDirectory {
    fn property(&self, id: &PropertyId) -> Result<Option<PropertySummary>, DirectoryError> {
        Ok(self.properties.get(id).cloned())
    }

    fn application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationSummary>, DirectoryError> {
        Ok(self.applications.get(id).cloned())
    }
}

pub(super) struct StubCalendar;

impl CalendarGenerator for StubCalendar {
    fn generate(&self, event: &CalendarEvent) -> Vec<u8> {
        format!("CALENDAR:{}:{:?}", event.slot_id.0, event.status).into_bytes()
    }
}

pub(super) struct TestContext {
    pub(super) store: Arc<InMemoryViewingStore>,
    pub(super) gateway: Arc<RecordingGateway>,
    pub(super) clock: Arc<FixedClock>,
    pub(super) services: ViewingServices<InMemoryViewingStore, RecordingGateway>,
}

pub(super) fn context() -> TestContext {
    let store = Arc::new(InMemoryViewingStore::new());
    let gateway = Arc::new(RecordingGateway::default());
    let directory = Arc::new(FixedDirectory::with_fixtures());
    let clock = Arc::new(FixedClock::at(base_time()));
    let services = ViewingServices::new(
        store.clone(),
        gateway.clone(),
        directory,
        Arc::new(StubCalendar),
        clock.clone(),
    );
    TestContext {
        store,
        gateway,
        clock,
        services,
    }
}

pub(super) fn new_slot(start: DateTime<Utc>, duration_minutes: i64) -> NewSlot {
    NewSlot {
        property_id: property_id(),
        start_time: start,
        end_time: start + Duration::minutes(duration_minutes),
        slot_type: SlotType::Group,
        access_type: AccessType::Public,
        max_attendees: 10,
        notes: None,
    }
}

/// Group slot starting `hours_ahead` after the fixed base time.
pub(super) fn create_slot(ctx: &TestContext, hours_ahead: i64, max_attendees: u32) -> SlotView {
    let mut request = new_slot(base_time() + Duration::hours(hours_ahead), 30);
    request.max_attendees = max_attendees;
    ctx.services
        .slots
        .create(&landlord(), request)
        .expect("slot creation succeeds")
}

pub(super) fn create_invited_slot(
    ctx: &TestContext,
    hours_ahead: i64,
    max_attendees: u32,
) -> SlotView {
    let mut request = new_slot(base_time() + Duration::hours(hours_ahead), 30);
    request.max_attendees = max_attendees;
    request.access_type = AccessType::Invited;
    ctx.services
        .slots
        .create(&landlord(), request)
        .expect("slot creation succeeds")
}

pub(super) fn booking_request(email: &str) -> crate::scheduling::bookings::BookingRequest {
    crate::scheduling::bookings::BookingRequest {
        first_name: "Max".to_string(),
        last_name: "Muster".to_string(),
        email: email.to_string(),
        phone: Some("+49 151 2222222".to_string()),
        application_id: None,
    }
}
