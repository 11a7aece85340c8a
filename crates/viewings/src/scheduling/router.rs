use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::bookings::BookingRequest;
use super::domain::{
    AccessType, ApplicationId, BookingId, CancellationInitiator, LandlordId, SlotId, SlotType,
};
use super::error::SchedulingError;
use super::gateway::{Clock, NotificationGateway};
use super::invitations::InvitationReply;
use super::slots::{BulkSlotRequest, NewSlot, SlotPatch};
use super::store::{SlotFilter, ViewingStore};
use super::ViewingServices;

/// Header carrying the authenticated landlord id, injected by the
/// upstream auth layer. Token-gated and public routes ignore it.
pub const LANDLORD_HEADER: &str = "x-landlord-id";

/// Router builder exposing the scheduling subsystem's HTTP surface.
pub fn viewing_router<S, N>(services: Arc<ViewingServices<S, N>>) -> Router
where
    S: ViewingStore + 'static,
    N: NotificationGateway + 'static,
{
    Router::new()
        .route(
            "/api/v1/viewings",
            get(list_slots_handler::<S, N>).post(create_slot_handler::<S, N>),
        )
        .route("/api/v1/viewings/bulk", post(bulk_create_handler::<S, N>))
        .route(
            "/api/v1/viewings/:slot_id",
            get(get_slot_handler::<S, N>)
                .patch(update_slot_handler::<S, N>)
                .delete(delete_slot_handler::<S, N>),
        )
        .route(
            "/api/v1/viewings/:slot_id/bookings",
            get(list_bookings_handler::<S, N>),
        )
        .route("/api/v1/viewings/:slot_id/book", post(book_handler::<S, N>))
        .route(
            "/api/v1/viewings/:slot_id/bookings/:booking_id",
            axum::routing::delete(cancel_booking_handler::<S, N>),
        )
        .route(
            "/api/v1/viewings/:slot_id/invitations",
            get(list_slot_invitations_handler::<S, N>).post(invite_handler::<S, N>),
        )
        .route(
            "/api/v1/applications/:application_id/invitations",
            get(list_application_invitations_handler::<S, N>),
        )
        .route(
            "/api/v1/invitations/:token",
            get(get_invitation_handler::<S, N>),
        )
        .route(
            "/api/v1/invitations/:token/respond",
            post(respond_invitation_handler::<S, N>),
        )
        .with_state(services)
}

fn error_response(err: SchedulingError) -> Response {
    let payload = json!({ "error": err.to_string() });
    (err.status_code(), Json(payload)).into_response()
}

fn landlord_from(headers: &HeaderMap) -> Result<LandlordId, SchedulingError> {
    headers
        .get(LANDLORD_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(|value| LandlordId(value.to_string()))
        .ok_or_else(|| SchedulingError::Forbidden("missing landlord identity".to_string()))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListSlotsQuery {
    property_id: Option<String>,
    slot_type: Option<SlotType>,
    access_type: Option<AccessType>,
    #[serde(default)]
    upcoming: bool,
}

async fn list_slots_handler<S, N>(
    State(services): State<Arc<ViewingServices<S, N>>>,
    Query(query): Query<ListSlotsQuery>,
) -> Response
where
    S: ViewingStore + 'static,
    N: NotificationGateway + 'static,
{
    let filter = SlotFilter {
        property_id: query.property_id.map(super::domain::PropertyId),
        slot_type: query.slot_type,
        access_type: query.access_type,
        upcoming_after: query.upcoming.then(|| services.clock.now()),
    };

    match services.slots.list(&filter) {
        Ok(items) => {
            let total = items.len();
            (StatusCode::OK, Json(json!({ "items": items, "total": total }))).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn create_slot_handler<S, N>(
    State(services): State<Arc<ViewingServices<S, N>>>,
    headers: HeaderMap,
    Json(request): Json<NewSlot>,
) -> Response
where
    S: ViewingStore + 'static,
    N: NotificationGateway + 'static,
{
    let requester = match landlord_from(&headers) {
        Ok(requester) => requester,
        Err(err) => return error_response(err),
    };
    match services.slots.create(&requester, request) {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn bulk_create_handler<S, N>(
    State(services): State<Arc<ViewingServices<S, N>>>,
    headers: HeaderMap,
    Json(request): Json<BulkSlotRequest>,
) -> Response
where
    S: ViewingStore + 'static,
    N: NotificationGateway + 'static,
{
    let requester = match landlord_from(&headers) {
        Ok(requester) => requester,
        Err(err) => return error_response(err),
    };
    match services.slots.bulk_create(&requester, request) {
        Ok(items) => {
            let total = items.len();
            (
                StatusCode::CREATED,
                Json(json!({ "items": items, "total": total })),
            )
                .into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn get_slot_handler<S, N>(
    State(services): State<Arc<ViewingServices<S, N>>>,
    Path(slot_id): Path<String>,
) -> Response
where
    S: ViewingStore + 'static,
    N: NotificationGateway + 'static,
{
    match services.slots.get(&SlotId(slot_id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn update_slot_handler<S, N>(
    State(services): State<Arc<ViewingServices<S, N>>>,
    headers: HeaderMap,
    Path(slot_id): Path<String>,
    Json(patch): Json<SlotPatch>,
) -> Response
where
    S: ViewingStore + 'static,
    N: NotificationGateway + 'static,
{
    let requester = match landlord_from(&headers) {
        Ok(requester) => requester,
        Err(err) => return error_response(err),
    };
    match services.slots.update(&requester, &SlotId(slot_id), patch) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn delete_slot_handler<S, N>(
    State(services): State<Arc<ViewingServices<S, N>>>,
    headers: HeaderMap,
    Path(slot_id): Path<String>,
) -> Response
where
    S: ViewingStore + 'static,
    N: NotificationGateway + 'static,
{
    let requester = match landlord_from(&headers) {
        Ok(requester) => requester,
        Err(err) => return error_response(err),
    };
    match services.slots.delete(&requester, &SlotId(slot_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

async fn list_bookings_handler<S, N>(
    State(services): State<Arc<ViewingServices<S, N>>>,
    headers: HeaderMap,
    Path(slot_id): Path<String>,
) -> Response
where
    S: ViewingStore + 'static,
    N: NotificationGateway + 'static,
{
    let requester = match landlord_from(&headers) {
        Ok(requester) => requester,
        Err(err) => return error_response(err),
    };
    match services
        .bookings
        .bookings_for_slot(&requester, &SlotId(slot_id))
    {
        Ok(items) => {
            let total = items.len();
            (StatusCode::OK, Json(json!({ "items": items, "total": total }))).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn book_handler<S, N>(
    State(services): State<Arc<ViewingServices<S, N>>>,
    Path(slot_id): Path<String>,
    Json(request): Json<BookingRequest>,
) -> Response
where
    S: ViewingStore + 'static,
    N: NotificationGateway + 'static,
{
    match services.bookings.book(&SlotId(slot_id), request, None) {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CancelQuery {
    initiator: Option<CancellationInitiator>,
}

async fn cancel_booking_handler<S, N>(
    State(services): State<Arc<ViewingServices<S, N>>>,
    Path((slot_id, booking_id)): Path<(String, String)>,
    Query(query): Query<CancelQuery>,
) -> Response
where
    S: ViewingStore + 'static,
    N: NotificationGateway + 'static,
{
    let initiator = query.initiator.unwrap_or(CancellationInitiator::Applicant);
    match services
        .bookings
        .cancel(&SlotId(slot_id), &BookingId(booking_id), initiator)
    {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct InviteRequest {
    application_id: String,
    #[serde(default = "default_send_email")]
    send_email: bool,
}

fn default_send_email() -> bool {
    true
}

async fn invite_handler<S, N>(
    State(services): State<Arc<ViewingServices<S, N>>>,
    headers: HeaderMap,
    Path(slot_id): Path<String>,
    Json(request): Json<InviteRequest>,
) -> Response
where
    S: ViewingStore + 'static,
    N: NotificationGateway + 'static,
{
    let requester = match landlord_from(&headers) {
        Ok(requester) => requester,
        Err(err) => return error_response(err),
    };
    match services.invitations.invite(
        &requester,
        &SlotId(slot_id),
        &ApplicationId(request.application_id),
        request.send_email,
    ) {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn list_slot_invitations_handler<S, N>(
    State(services): State<Arc<ViewingServices<S, N>>>,
    headers: HeaderMap,
    Path(slot_id): Path<String>,
) -> Response
where
    S: ViewingStore + 'static,
    N: NotificationGateway + 'static,
{
    let requester = match landlord_from(&headers) {
        Ok(requester) => requester,
        Err(err) => return error_response(err),
    };
    match services
        .invitations
        .list_for_slot(&requester, &SlotId(slot_id))
    {
        Ok(items) => {
            let total = items.len();
            (StatusCode::OK, Json(json!({ "items": items, "total": total }))).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn list_application_invitations_handler<S, N>(
    State(services): State<Arc<ViewingServices<S, N>>>,
    Path(application_id): Path<String>,
) -> Response
where
    S: ViewingStore + 'static,
    N: NotificationGateway + 'static,
{
    match services
        .invitations
        .list_for_application(&ApplicationId(application_id))
    {
        Ok(items) => {
            let total = items.len();
            (StatusCode::OK, Json(json!({ "items": items, "total": total }))).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn get_invitation_handler<S, N>(
    State(services): State<Arc<ViewingServices<S, N>>>,
    Path(token): Path<String>,
) -> Response
where
    S: ViewingStore + 'static,
    N: NotificationGateway + 'static,
{
    match services.invitations.get_by_token(&token) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RespondRequest {
    response: InvitationReply,
}

async fn respond_invitation_handler<S, N>(
    State(services): State<Arc<ViewingServices<S, N>>>,
    Path(token): Path<String>,
    Json(request): Json<RespondRequest>,
) -> Response
where
    S: ViewingStore + 'static,
    N: NotificationGateway + 'static,
{
    match services
        .invitations
        .respond_by_token(&token, request.response)
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}
