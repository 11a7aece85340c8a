use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use tracing::info;
use viewings::config::AppConfig;
use viewings::error::AppError;
use viewings::scheduling::{
    InMemoryViewingStore, ReminderScheduler, SystemClock, ViewingServices,
};
use viewings::telemetry;

use crate::cli::ServeArgs;
use crate::infra::{AppState, IcsCalendarGenerator, LoggingNotificationGateway, StaticDirectory};
use crate::routes::with_viewing_routes;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryViewingStore::new());
    let gateway = Arc::new(LoggingNotificationGateway);
    let directory = Arc::new(StaticDirectory::demo());
    let calendar = Arc::new(IcsCalendarGenerator);
    let clock = Arc::new(SystemClock);

    let services = Arc::new(ViewingServices::new(
        store.clone(),
        gateway.clone(),
        directory.clone(),
        calendar.clone(),
        clock.clone(),
    ));

    let scheduler = Arc::new(ReminderScheduler::new(
        store,
        gateway,
        directory,
        calendar,
        clock,
        Duration::from_secs(config.reminders.interval_minutes * 60),
    ));
    let reminder_handle = scheduler.start();

    let app = with_viewing_routes(services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "viewing scheduler ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reminder_handle.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        info!("shutdown signal listener failed, exiting on serve completion");
    }
}
