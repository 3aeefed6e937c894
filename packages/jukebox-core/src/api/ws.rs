//! WebSocket session handler (C9): per-connection command loop, joins and
//! leaves, and dispatch into a room.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use log::{debug, warn};
use tokio::sync::mpsc;

use crate::api::AppState;
use crate::ingest;
use crate::room::{ConnectionId, Operation, Room, Transport};
use crate::session::{
    AddPendingDownloadPayload, AddToQueuePayload, CheckRoomExistsPayload, IncomingEnvelope, ItemIdPayload,
    PagePayload, ReorderItemPayload, SeekPayload, SetModeratorPayload, SetTrackPayload,
};

/// Forwards outbound text frames to the socket's write half over an
/// unbounded channel, decoupling the room's broadcast loop from this
/// connection's own write speed.
struct ChannelTransport {
    tx: mpsc::UnboundedSender<String>,
    open: Arc<AtomicBool>,
}

impl Transport for ChannelTransport {
    fn send_text(&self, text: String) -> bool {
        if !self.open.load(Ordering::SeqCst) {
            return false;
        }
        self.tx.send(text).is_ok()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Ensures `Room::leave` runs on every exit path, including a panic
/// unwinding through this task.
struct ConnectionGuard {
    room: Arc<Room>,
    id: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.room.leave(self.id);
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(slug): Path<String>,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, slug, state, addr))
}

async fn handle_socket(socket: WebSocket, slug: String, state: AppState, addr: SocketAddr) {
    let room = state.services.room_registry.get_or_create(&slug);
    let id = ConnectionId::next();

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let open = Arc::new(AtomicBool::new(true));

    let writer_open = open.clone();
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                writer_open.store(false, Ordering::SeqCst);
                break;
            }
        }
        writer_open.store(false, Ordering::SeqCst);
    });

    let transport: Arc<dyn Transport> = Arc::new(ChannelTransport { tx, open: open.clone() });

    // Defensive dedup: a stale registration for this id cannot exist since
    // ids are freshly minted per connection, but a prior session for the
    // same transport could still be registered under a different id if the
    // client reconnects with the same address; `join` itself handles host
    // succession idempotently via `leave`.
    if room.join(id, transport, "No name".to_string(), addr).is_err() {
        writer.abort();
        return;
    }
    let _guard = ConnectionGuard { room: room.clone(), id };

    room.send_initial_state(id);

    while let Some(Ok(msg)) = stream.next().await {
        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Close(_) => break,
            _ => continue,
        };

        let envelope: IncomingEnvelope = match serde_json::from_str(&text) {
            Ok(e) => e,
            Err(err) => {
                warn!("malformed envelope from {addr}: {err}");
                continue;
            }
        };

        debug!("dispatching {} from {addr} in room {slug}", envelope.kind);
        dispatch(&state, &room, id, addr, envelope).await;
    }

    open.store(false, Ordering::SeqCst);
    writer.abort();
    // `_guard` drops here, calling `room.leave(id)` exactly once.
}

async fn dispatch(state: &AppState, room: &Arc<Room>, id: ConnectionId, addr: SocketAddr, envelope: IncomingEnvelope) {
    macro_rules! require_auth {
        ($op:expr) => {
            if let Err(err) = room.authorize(id, $op) {
                room.send_error(id, err.to_string());
                return;
            }
        };
    }

    macro_rules! parse_payload {
        ($ty:ty) => {
            match serde_json::from_value::<$ty>(envelope.payload.clone()) {
                Ok(p) => p,
                Err(err) => {
                    room.send_error(id, format!("malformed payload: {err}"));
                    return;
                }
            }
        };
    }

    match envelope.kind.as_str() {
        "play" => {
            require_auth!(Operation::PlaybackControl);
            room.play();
        }
        "pause" => {
            require_auth!(Operation::PlaybackControl);
            room.pause();
        }
        "seek" => {
            require_auth!(Operation::PlaybackControl);
            let payload: SeekPayload = parse_payload!(SeekPayload);
            room.seek(payload.position);
        }
        "set_track" => {
            require_auth!(Operation::PlaybackControl);
            let payload: SetTrackPayload = parse_payload!(SetTrackPayload);
            room.set_track_from_url_or_track(payload.track, payload.is_playing);
        }
        "next-track" => {
            require_auth!(Operation::PlaybackControl);
            room.next_track();
        }
        "previous-track" => {
            require_auth!(Operation::PlaybackControl);
            room.previous_track();
        }
        "shuffle_queue" => {
            require_auth!(Operation::QueueEdit);
            room.shuffle_queue();
        }
        "repeat_track" => {
            require_auth!(Operation::QueueEdit);
            room.repeat_track();
        }
        "delete_item" => {
            require_auth!(Operation::QueueEdit);
            let payload: ItemIdPayload = parse_payload!(ItemIdPayload);
            room.delete_item(&payload.item_id);
        }
        "reorder_item" => {
            require_auth!(Operation::QueueEdit);
            let payload: ReorderItemPayload = parse_payload!(ReorderItemPayload);
            room.reorder_item(&payload.item_id, payload.direction);
        }
        "approve_item" => {
            require_auth!(Operation::QueueEdit);
            let payload: ItemIdPayload = parse_payload!(ItemIdPayload);
            room.approve_item(&payload.item_id);
        }
        "add_to_queue" => {
            require_auth!(Operation::QueueEdit);
            let payload: AddToQueuePayload = parse_payload!(AddToQueuePayload);
            room.add_to_queue(payload.item);
        }
        "add_pending_download" => {
            require_auth!(Operation::QueueEdit);
            let payload: AddPendingDownloadPayload = parse_payload!(AddPendingDownloadPayload);
            handle_add_pending_download(state, room, id, addr, payload).await;
        }
        "set_moderator" => {
            require_auth!(Operation::SetModerator);
            let payload: SetModeratorPayload = parse_payload!(SetModeratorPayload);
            let target_ip = match payload.client_ip.parse() {
                Ok(ip) => ip,
                Err(_) => {
                    room.send_error(id, "invalid client_ip");
                    return;
                }
            };
            let target_addr = SocketAddr::new(target_ip, payload.client_port.unwrap_or(0));
            if let Err(err) = room.set_moderator(target_addr, payload.is_moderator) {
                room.send_error(id, err.to_string());
            }
        }
        "dance" => {
            room.dance();
        }
        "ping" => {
            room.ping(id);
        }
        "get_state" => {
            room.get_state(id);
        }
        "get_queue" => {
            room.get_queue(id);
        }
        "get_users" => {
            let payload: PagePayload = parse_payload!(PagePayload);
            room.send_users_page(id, payload.page.unwrap_or(0), payload.limit.unwrap_or(10));
        }
        "check_room_exists" => {
            let payload: CheckRoomExistsPayload = parse_payload!(CheckRoomExistsPayload);
            let exists = state.services.room_registry.get(&payload.slug).is_some();
            room.send_to(id, "room_exists", serde_json::json!({ "slug": payload.slug, "exists": exists }));
        }
        other => {
            warn!("unknown command type {other} from {addr}");
        }
    }
}

async fn handle_add_pending_download(
    state: &AppState,
    room: &Arc<Room>,
    id: ConnectionId,
    addr: SocketAddr,
    payload: AddPendingDownloadPayload,
) {
    if !state.services.in_flight.try_acquire(addr.ip()) {
        room.send_error(id, "An ingest is already in progress for this address");
        return;
    }
    if !state.services.rate_limiter.allow(&addr.ip().to_string()) {
        state.services.in_flight.release(addr.ip());
        room.send_error(id, "Rate limited, try again shortly");
        return;
    }

    let item_id = room.add_pending_download(
        payload.item.title,
        payload.item.artist,
        payload.item.artwork,
        payload.item.duration,
        payload.item.video_id.clone(),
    );

    ingest::schedule(
        state.services.spawner.clone(),
        state.services.download_queue.clone(),
        state.services.in_flight.clone(),
        room.clone(),
        addr.ip(),
        item_id,
        payload.item.video_id,
    );
}
