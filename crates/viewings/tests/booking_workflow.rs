use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration, TimeZone, Utc};

use viewings::scheduling::{
    AccessType, ApplicationId, ApplicationSummary, BookingRequest, CalendarEvent,
    CalendarGenerator, CancellationInitiator, Clock, DirectoryError, DirectoryPort,
    InMemoryViewingStore, InvitationReply, InvitationStatus, LandlordId, NotificationGateway,
    NotifyError, PreviousSchedule, PropertyId, PropertySummary, Recipient, ReminderKind,
    ReminderScheduler, SchedulingError, SlotType, SlotView, ViewingDetails, ViewingServices,
    ViewingStore,
};

fn anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 8, 0, 0)
        .single()
        .expect("valid anchor instant")
}

struct FrozenClock(DateTime<Utc>);

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Counts deliveries; never fails.
#[derive(Default)]
struct CountingGateway {
    confirmations: AtomicUsize,
    cancellations: AtomicUsize,
    invitations: AtomicUsize,
    reminders: AtomicUsize,
}

impl NotificationGateway for CountingGateway {
    fn booking_confirmed(
        &self,
        _recipient: &Recipient,
        _details: &ViewingDetails,
        _calendar: Option<&[u8]>,
    ) -> Result<(), NotifyError> {
        self.confirmations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn booking_cancelled(
        &self,
        _landlord: &Recipient,
        _attendee_name: &str,
        _details: &ViewingDetails,
        _initiator: CancellationInitiator,
    ) -> Result<(), NotifyError> {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn slot_rescheduled(
        &self,
        _recipient: &Recipient,
        _details: &ViewingDetails,
        _previous: &PreviousSchedule,
        _calendar: Option<&[u8]>,
    ) -> Result<(), NotifyError> {
        Ok(())
    }

    fn slot_cancelled(
        &self,
        _recipient: &Recipient,
        _details: &ViewingDetails,
        _calendar: Option<&[u8]>,
    ) -> Result<(), NotifyError> {
        Ok(())
    }

    fn invitation_created(
        &self,
        _recipient: &Recipient,
        _details: &ViewingDetails,
        _invitation_token: &str,
        _calendar: Option<&[u8]>,
    ) -> Result<(), NotifyError> {
        self.invitations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn viewing_reminder(
        &self,
        _recipient: &Recipient,
        _details: &ViewingDetails,
        _kind: ReminderKind,
        _portal_token: Option<&str>,
        _calendar: Option<&[u8]>,
    ) -> Result<(), NotifyError> {
        self.reminders.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct SingleProperty;

impl DirectoryPort for SingleProperty {
    fn property(&self, id: &PropertyId) -> Result<Option<PropertySummary>, DirectoryError> {
        if id.0 != "prop-main" {
            return Ok(None);
        }
        Ok(Some(PropertySummary {
            id: id.clone(),
            title: "Stadthaus Mitte".to_string(),
            address: "Hauptstrasse 1".to_string(),
            city: "Berlin".to_string(),
            zip_code: "10115".to_string(),
            landlord_id: LandlordId("landlord-main".to_string()),
            landlord_email: "owner@example.com".to_string(),
        }))
    }

    fn application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationSummary>, DirectoryError> {
        if id.0 != "app-main" {
            return Ok(None);
        }
        Ok(Some(ApplicationSummary {
            id: id.clone(),
            property_id: PropertyId("prop-main".to_string()),
            first_name: "Nora".to_string(),
            last_name: "Neumann".to_string(),
            email: "nora@example.com".to_string(),
            phone: None,
            access_token: Some("portal-nora".to_string()),
        }))
    }
}

struct PlainCalendar;

impl CalendarGenerator for PlainCalendar {
    fn generate(&self, event: &CalendarEvent) -> Vec<u8> {
        event.title.clone().into_bytes()
    }
}

struct Harness {
    store: Arc<InMemoryViewingStore>,
    gateway: Arc<CountingGateway>,
    services: ViewingServices<InMemoryViewingStore, CountingGateway>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryViewingStore::new());
    let gateway = Arc::new(CountingGateway::default());
    let services = ViewingServices::new(
        store.clone(),
        gateway.clone(),
        Arc::new(SingleProperty),
        Arc::new(PlainCalendar),
        Arc::new(FrozenClock(anchor())),
    );
    Harness {
        store,
        gateway,
        services,
    }
}

fn group_slot(harness: &Harness, hours_ahead: i64, max_attendees: u32) -> SlotView {
    let start = anchor() + Duration::hours(hours_ahead);
    harness
        .services
        .slots
        .create(
            &LandlordId("landlord-main".to_string()),
            viewings::scheduling::NewSlot {
                property_id: PropertyId("prop-main".to_string()),
                start_time: start,
                end_time: start + Duration::minutes(45),
                slot_type: SlotType::Group,
                access_type: AccessType::Public,
                max_attendees,
                notes: None,
            },
        )
        .expect("slot creation succeeds")
}

fn request_for(email: &str) -> BookingRequest {
    BookingRequest {
        first_name: "Test".to_string(),
        last_name: "Person".to_string(),
        email: email.to_string(),
        phone: None,
        application_id: None,
    }
}

#[test]
fn concurrent_bookings_never_exceed_capacity() {
    let harness = harness();
    let slot = group_slot(&harness, 48, 3);

    let services = Arc::new(harness.services);
    let mut handles = Vec::new();
    for index in 0..16 {
        let services = services.clone();
        let slot_id = slot.id.clone();
        handles.push(thread::spawn(move || {
            services
                .bookings
                .book(&slot_id, request_for(&format!("p{index}@example.com")), None)
        }));
    }

    let mut accepted = 0;
    let mut capacity_rejections = 0;
    for handle in handles {
        match handle.join().expect("booking thread completes") {
            Ok(_) => accepted += 1,
            Err(SchedulingError::CapacityExceeded) => capacity_rejections += 1,
            Err(err) => panic!("unexpected booking failure: {err}"),
        }
    }

    assert_eq!(accepted, 3);
    assert_eq!(capacity_rejections, 13);
    assert_eq!(
        harness
            .store
            .count_active_bookings(&slot.id)
            .expect("store access succeeds"),
        3
    );
    assert_eq!(harness.gateway.confirmations.load(Ordering::SeqCst), 3);
}

#[test]
fn viewing_lifecycle_from_invitation_to_cancellation() {
    let harness = harness();
    let landlord = LandlordId("landlord-main".to_string());
    let slot = group_slot(&harness, 24, 2);

    // Landlord invites the applicant; the applicant accepts by token.
    let invitation = harness
        .services
        .invitations
        .invite(
            &landlord,
            &slot.id,
            &ApplicationId("app-main".to_string()),
            true,
        )
        .expect("invitation succeeds");
    assert_eq!(harness.gateway.invitations.load(Ordering::SeqCst), 1);

    let outcome = harness
        .services
        .invitations
        .respond_by_token(&invitation.invitation_token, InvitationReply::Accept)
        .expect("acceptance succeeds");
    assert_eq!(outcome.invitation.status, InvitationStatus::Accepted);
    let accepted_booking = outcome.booking.expect("acceptance books a seat");

    // A walk-in takes the remaining seat; the slot is now full.
    harness
        .services
        .bookings
        .book(&slot.id, request_for("walkin@example.com"), None)
        .expect("walk-in booking succeeds");
    let err = harness
        .services
        .bookings
        .book(&slot.id, request_for("late@example.com"), None)
        .expect_err("full slot rejects further bookings");
    assert!(matches!(err, SchedulingError::CapacityExceeded));

    // The slot starts in 24h: one scan sends both day-before reminders.
    let scheduler = ReminderScheduler::new(
        harness.store.clone(),
        harness.gateway.clone(),
        Arc::new(SingleProperty),
        Arc::new(PlainCalendar),
        Arc::new(FrozenClock(anchor())),
        std::time::Duration::from_secs(900),
    );
    let report = scheduler.run_cycle().expect("reminder cycle succeeds");
    assert_eq!(report.sent, 2);
    assert_eq!(harness.gateway.reminders.load(Ordering::SeqCst), 2);

    // The applicant cancels well before the deadline, freeing one seat.
    harness
        .services
        .bookings
        .cancel(
            &slot.id,
            &accepted_booking.id,
            CancellationInitiator::Applicant,
        )
        .expect("cancellation succeeds");
    assert_eq!(harness.gateway.cancellations.load(Ordering::SeqCst), 1);

    let refreshed = harness
        .services
        .slots
        .get(&slot.id)
        .expect("slot lookup succeeds");
    assert_eq!(refreshed.confirmed_count, 1);
    assert_eq!(refreshed.available_spots, 1);

    harness
        .services
        .bookings
        .book(&slot.id, request_for("late@example.com"), None)
        .expect("freed seat is bookable again");
}
