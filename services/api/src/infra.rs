use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;
use viewings::scheduling::{
    ApplicationId, ApplicationSummary, CalendarEvent, CalendarGenerator, CalendarStatus,
    CancellationInitiator, DirectoryError, DirectoryPort, LandlordId, NotificationGateway,
    NotifyError, PreviousSchedule, PropertyId, PropertySummary, Recipient, ReminderKind,
    ViewingDetails,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Notification adapter that writes structured log lines instead of
/// sending mail. Stands in until the SMTP gateway is wired up.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotificationGateway;

impl NotificationGateway for LoggingNotificationGateway {
    fn booking_confirmed(
        &self,
        recipient: &Recipient,
        details: &ViewingDetails,
        _calendar: Option<&[u8]>,
    ) -> Result<(), NotifyError> {
        info!(
            event = "booking_confirmed",
            recipient = %recipient.email,
            slot = %details.slot_id.0,
            date = %details.viewing_date,
            time = %details.viewing_time,
            "notification dispatched"
        );
        Ok(())
    }

    fn booking_cancelled(
        &self,
        landlord: &Recipient,
        attendee_name: &str,
        details: &ViewingDetails,
        initiator: CancellationInitiator,
    ) -> Result<(), NotifyError> {
        info!(
            event = "booking_cancelled",
            recipient = %landlord.email,
            attendee = attendee_name,
            slot = %details.slot_id.0,
            initiator = initiator.label(),
            "notification dispatched"
        );
        Ok(())
    }

    fn slot_rescheduled(
        &self,
        recipient: &Recipient,
        details: &ViewingDetails,
        previous: &PreviousSchedule,
        _calendar: Option<&[u8]>,
    ) -> Result<(), NotifyError> {
        info!(
            event = "slot_rescheduled",
            recipient = %recipient.email,
            slot = %details.slot_id.0,
            previous_date = %previous.viewing_date,
            previous_time = %previous.viewing_time,
            new_date = %details.viewing_date,
            new_time = %details.viewing_time,
            "notification dispatched"
        );
        Ok(())
    }

    fn slot_cancelled(
        &self,
        recipient: &Recipient,
        details: &ViewingDetails,
        _calendar: Option<&[u8]>,
    ) -> Result<(), NotifyError> {
        info!(
            event = "slot_cancelled",
            recipient = %recipient.email,
            slot = %details.slot_id.0,
            "notification dispatched"
        );
        Ok(())
    }

    fn invitation_created(
        &self,
        recipient: &Recipient,
        details: &ViewingDetails,
        invitation_token: &str,
        _calendar: Option<&[u8]>,
    ) -> Result<(), NotifyError> {
        info!(
            event = "invitation_created",
            recipient = %recipient.email,
            slot = %details.slot_id.0,
            token = invitation_token,
            "notification dispatched"
        );
        Ok(())
    }

    fn viewing_reminder(
        &self,
        recipient: &Recipient,
        details: &ViewingDetails,
        kind: ReminderKind,
        portal_token: Option<&str>,
        _calendar: Option<&[u8]>,
    ) -> Result<(), NotifyError> {
        info!(
            event = "viewing_reminder",
            recipient = %recipient.email,
            slot = %details.slot_id.0,
            reminder = kind.label(),
            portal = portal_token.is_some(),
            "notification dispatched"
        );
        Ok(())
    }
}

/// Renders an iCalendar attachment for one viewing event.
#[derive(Default, Clone)]
pub(crate) struct IcsCalendarGenerator;

impl CalendarGenerator for IcsCalendarGenerator {
    fn generate(&self, event: &CalendarEvent) -> Vec<u8> {
        let status = match event.status {
            CalendarStatus::Confirmed => "CONFIRMED",
            CalendarStatus::Tentative => "TENTATIVE",
            CalendarStatus::Cancelled => "CANCELLED",
        };
        let lines = [
            "BEGIN:VCALENDAR".to_string(),
            "VERSION:2.0".to_string(),
            "PRODID:-//Viewing Scheduler//DE".to_string(),
            "METHOD:REQUEST".to_string(),
            "BEGIN:VEVENT".to_string(),
            format!("UID:{}@viewings", event.slot_id.0),
            format!("DTSTAMP:{}", event.start.format("%Y%m%dT%H%M%SZ")),
            format!("DTSTART:{}", event.start.format("%Y%m%dT%H%M%SZ")),
            format!("DTEND:{}", event.end.format("%Y%m%dT%H%M%SZ")),
            format!("SUMMARY:{}", event.title),
            format!("LOCATION:{}", event.address),
            format!("STATUS:{status}"),
            "END:VEVENT".to_string(),
            "END:VCALENDAR".to_string(),
        ];
        lines.join("\r\n").into_bytes()
    }
}

/// In-process directory seeded with demo data. Replaced by HTTP lookups
/// against the property and application services once those expose an
/// internal API.
#[derive(Default, Clone)]
pub(crate) struct StaticDirectory {
    properties: HashMap<PropertyId, PropertySummary>,
    applications: HashMap<ApplicationId, ApplicationSummary>,
}

impl StaticDirectory {
    pub(crate) fn demo() -> Self {
        let mut directory = Self::default();
        let property = PropertySummary {
            id: PropertyId("prop-000001".to_string()),
            title: "3-Zimmer-Wohnung Lindenallee".to_string(),
            address: "Lindenallee 24".to_string(),
            city: "Hamburg".to_string(),
            zip_code: "20259".to_string(),
            landlord_id: LandlordId("landlord-000001".to_string()),
            landlord_email: "vermieter@example.com".to_string(),
        };
        let application = ApplicationSummary {
            id: ApplicationId("app-000001".to_string()),
            property_id: property.id.clone(),
            first_name: "Jana".to_string(),
            last_name: "Jacobi".to_string(),
            email: "jana@example.com".to_string(),
            phone: Some("+49 40 5550100".to_string()),
            access_token: Some("demo-portal-token".to_string()),
        };
        directory.properties.insert(property.id.clone(), property);
        directory
            .applications
            .insert(application.id.clone(), application);
        directory
    }
}

impl DirectoryPort for StaticDirectory {
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
