//! REST surface: read-only room/user listing plus a health check. Served
//! from the same router as the WebSocket upgrade endpoint, behind a
//! permissive CORS layer (the service runs behind arbitrary browser
//! origins and does not gate by origin).

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::response::api_ok;
use crate::api::{ws, AppState};
use crate::error::JukeboxError;

#[derive(Debug, Deserialize)]
pub struct RoomsQuery {
    #[serde(default)]
    page: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    search: Option<String>,
}

#[derive(Debug, Serialize)]
struct RoomSummaryResponse {
    slug: String,
    user_count: usize,
    queue_length: usize,
    created_at: f64,
    has_host: bool,
}

#[derive(Debug, Serialize)]
struct RoomsResponse {
    rooms: Vec<RoomSummaryResponse>,
    page: usize,
    limit: usize,
    has_more: bool,
    total: usize,
}

async fn list_rooms(State(state): State<AppState>, Query(query): Query<RoomsQuery>) -> Response {
    let page = query.page.unwrap_or(0);
    let limit = query.limit.unwrap_or(20);
    let listing = state
        .services
        .room_registry
        .list(page, limit, query.search.as_deref());

    api_ok(RoomsResponse {
        rooms: listing
            .rooms
            .into_iter()
            .map(|r| RoomSummaryResponse {
                slug: r.slug,
                user_count: r.user_count,
                queue_length: r.queue_length,
                created_at: r.created_at,
                has_host: r.has_host,
            })
            .collect(),
        page: listing.page,
        limit: listing.limit,
        has_more: listing.has_more,
        total: listing.total,
    })
}

#[derive(Debug, Deserialize)]
pub struct RoomUsersQuery {
    #[serde(default)]
    page: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct UserResponse {
    name: String,
    role: crate::room::Role,
    client_ip: String,
    client_port: u16,
}

#[derive(Debug, Serialize)]
struct RoomUsersResponse {
    users: Vec<UserResponse>,
    page: usize,
    limit: usize,
    total: usize,
    has_more: bool,
}

/// Performs a passive liveness sweep as a side effect of listing: any user
/// whose transport is no longer connected is dropped before the page is
/// computed. Returns 404 for a nonexistent slug.
async fn room_users(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<RoomUsersQuery>,
) -> Result<Response, JukeboxError> {
    let room = state
        .services
        .room_registry
        .get(&slug)
        .ok_or_else(|| JukeboxError::RoomNotFound(slug.clone()))?;

    room.sweep_dead_connections();

    let page = query.page.unwrap_or(0);
    let limit = query.limit.unwrap_or(10);
    let (users, total) = room.users_page(page, limit);

    Ok(api_ok(RoomUsersResponse {
        users: users
            .into_iter()
            .map(|u| UserResponse {
                name: u.name,
                role: u.role,
                client_ip: u.client_ip,
                client_port: u.client_port,
            })
            .collect(),
        page,
        limit,
        total,
        has_more: (page + 1) * limit < total,
    }))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    rooms: usize,
    connections: usize,
}

async fn healthz(State(state): State<AppState>) -> Response {
    api_ok(HealthResponse {
        status: "ok",
        rooms: state.services.room_registry.room_count(),
        connections: state.services.room_registry.connection_count(),
    })
}

/// Builds the combined REST + WebSocket router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/rooms", get(list_rooms))
        .route("/api/rooms/{slug}/users", get(room_users))
        .route("/ws/{slug}", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
