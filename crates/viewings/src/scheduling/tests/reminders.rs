use std::sync::Arc;

use chrono::Duration;

use crate::scheduling::domain::CancellationInitiator;
use crate::scheduling::reminders::{ReminderKind, ReminderScheduler};
use crate::scheduling::store::ViewingStore;

use super::common::{
    application_id, booking_request, context, create_slot, FixedDirectory, GatewayEvent,
    StubCalendar, TestContext,
};

fn scheduler(ctx: &TestContext) -> ReminderScheduler<
    crate::scheduling::memory::InMemoryViewingStore,
    super::common::RecordingGateway,
> {
    ReminderScheduler::new(
        ctx.store.clone(),
        ctx.gateway.clone(),
        Arc::new(FixedDirectory::with_fixtures()),
        Arc::new(StubCalendar),
        ctx.clock.clone(),
        std::time::Duration::from_secs(900),
    )
}

fn reminder_events(ctx: &TestContext) -> Vec<GatewayEvent> {
    ctx.gateway
        .events()
        .into_iter()
        .filter(|event| matches!(event, GatewayEvent::Reminder { .. }))
        .collect()
}

#[test]
fn day_before_reminder_is_sent_once() {
    let ctx = context();
    let slot = create_slot(&ctx, 24, 3);
    let booking = ctx
        .services
        .bookings
        .book(&slot.id, booking_request("max@example.com"), None)
        .expect("booking succeeds");

    let scheduler = scheduler(&ctx);
    let report = scheduler.run_cycle().expect("cycle succeeds");
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 0);

    let stored = ctx
        .store
        .fetch_booking(&booking.id)
        .expect("store access succeeds")
        .expect("booking exists");
    assert!(stored.reminder_24h_sent);
    assert!(!stored.reminder_1h_sent);

    // A second scan inside the same window sends nothing new.
    let report = scheduler.run_cycle().expect("cycle succeeds");
    assert_eq!(report.sent, 0);
    assert_eq!(
        reminder_events(&ctx),
        vec![GatewayEvent::Reminder {
            email: "max@example.com".to_string(),
            kind: ReminderKind::DayBefore,
            portal_token: None,
        }]
    );
}

#[test]
fn hour_before_reminder_carries_the_portal_token() {
    let ctx = context();
    let slot = create_slot(&ctx, 1, 3);
    let mut request = booking_request("alice@example.com");
    request.application_id = Some(application_id());
    ctx.services
        .bookings
        .book(&slot.id, request, None)
        .expect("booking succeeds");

    let report = scheduler(&ctx).run_cycle().expect("cycle succeeds");
    assert_eq!(report.sent, 1);
    assert_eq!(
        reminder_events(&ctx),
        vec![GatewayEvent::Reminder {
            email: "alice@example.com".to_string(),
            kind: ReminderKind::HourBefore,
            portal_token: Some("portal-token-alice".to_string()),
        }]
    );
}

#[test]
fn slots_outside_both_windows_are_ignored() {
    let ctx = context();
    let slot = create_slot(&ctx, 26, 3);
    ctx.services
        .bookings
        .book(&slot.id, booking_request("max@example.com"), None)
        .expect("booking succeeds");

    let report = scheduler(&ctx).run_cycle().expect("cycle succeeds");
    assert_eq!(report.sent, 0);
    assert!(reminder_events(&ctx).is_empty());
}

#[test]
fn window_start_is_inclusive_and_end_is_exclusive() {
    let ctx = context();
    let at_start = create_slot(&ctx, 23, 3);
    let at_end = create_slot(&ctx, 25, 3);
    ctx.services
        .bookings
        .book(&at_start.id, booking_request("start@example.com"), None)
        .expect("booking succeeds");
    ctx.services
        .bookings
        .book(&at_end.id, booking_request("end@example.com"), None)
        .expect("booking succeeds");

    let report = scheduler(&ctx).run_cycle().expect("cycle succeeds");
    assert_eq!(report.sent, 1);
    assert_eq!(
        reminder_events(&ctx),
        vec![GatewayEvent::Reminder {
            email: "start@example.com".to_string(),
            kind: ReminderKind::DayBefore,
            portal_token: None,
        }]
    );
}

#[test]
fn cancelled_bookings_are_never_reminded() {
    let ctx = context();
    let slot = create_slot(&ctx, 24, 3);
    let booking = ctx
        .services
        .bookings
        .book(&slot.id, booking_request("max@example.com"), None)
        .expect("booking succeeds");
    ctx.services
        .bookings
        .cancel(&slot.id, &booking.id, CancellationInitiator::Applicant)
        .expect("cancellation succeeds");

    let report = scheduler(&ctx).run_cycle().expect("cycle succeeds");
    assert_eq!(report.sent, 0);
    assert!(reminder_events(&ctx).is_empty());
}

#[test]
fn a_failed_reminder_is_retried_on_the_next_cycle() {
    let ctx = context();
    let slot = create_slot(&ctx, 24, 3);
    let failing = ctx
        .services
        .bookings
        .book(&slot.id, booking_request("down@example.com"), None)
        .expect("booking succeeds");
    let healthy = ctx
        .services
        .bookings
        .book(&slot.id, booking_request("up@example.com"), None)
        .expect("booking succeeds");

    ctx.gateway.fail_for("down@example.com");
    let scheduler = scheduler(&ctx);
    let report = scheduler.run_cycle().expect("cycle succeeds");
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 1);

    let stored_failing = ctx
        .store
        .fetch_booking(&failing.id)
        .expect("store access succeeds")
        .expect("booking exists");
    assert!(!stored_failing.reminder_24h_sent);
    let stored_healthy = ctx
        .store
        .fetch_booking(&healthy.id)
        .expect("store access succeeds")
        .expect("booking exists");
    assert!(stored_healthy.reminder_24h_sent);

    ctx.gateway.recover("down@example.com");
    let report = scheduler.run_cycle().expect("cycle succeeds");
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 0);
    let stored_failing = ctx
        .store
        .fetch_booking(&failing.id)
        .expect("store access succeeds")
        .expect("booking exists");
    assert!(stored_failing.reminder_24h_sent);
}

#[test]
fn both_reminders_fire_for_a_booking_moving_through_the_windows() {
    let ctx = context();
    let slot = create_slot(&ctx, 24, 3);
    ctx.services
        .bookings
        .book(&slot.id, booking_request("max@example.com"), None)
        .expect("booking succeeds");

    let scheduler = scheduler(&ctx);
    assert_eq!(scheduler.run_cycle().expect("cycle succeeds").sent, 1);

    ctx.clock.set(slot.start_time - Duration::minutes(60));
    assert_eq!(scheduler.run_cycle().expect("cycle succeeds").sent, 1);

    let kinds: Vec<ReminderKind> = reminder_events(&ctx)
        .into_iter()
        .map(|event| match event {
            GatewayEvent::Reminder { kind, .. } => kind,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(kinds, vec![ReminderKind::DayBefore, ReminderKind::HourBefore]);
}

#[tokio::test(start_paused = true)]
async fn background_loop_scans_on_its_interval_and_stops_cleanly() {
    let ctx = context();
    let slot = create_slot(&ctx, 24, 3);
    ctx.services
        .bookings
        .book(&slot.id, booking_request("max@example.com"), None)
        .expect("booking succeeds");

    let handle = Arc::new(scheduler(&ctx)).start();
    // Let the spawned loop register its interval timer at t=0 before the
    // clock is advanced; otherwise the first tick lands one interval late.
    tokio::task::yield_now().await;
    assert!(reminder_events(&ctx).is_empty());

    // Paused time: advancing past one interval fires the first tick, then
    // the loop task needs to be polled through it before the scan lands.
    tokio::time::advance(std::time::Duration::from_secs(901)).await;
    for _ in 0..64 {
        if !reminder_events(&ctx).is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(reminder_events(&ctx).len(), 1);

    handle.stop().await;
}
