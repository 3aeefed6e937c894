//! Per-room state machine: playback timeline, queue, roster, authorization,
//! host succession, and fan-out.
//!
//! Re-architected per the source's global in-process dictionaries into a
//! per-room actor-shaped struct: a room owns its queue and state behind a
//! single read-write lock (the critical section read→mutate→broadcast never
//! holds that lock across a network send), and each connection is a
//! `Transport` capability rather than a raw socket handle.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use serde::Serialize;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{JukeboxError, JukeboxResult};
use crate::session::{Envelope, ErrorPayload, ReorderDirection};
use crate::track::{PlaybackState, Track, TrackSource};

/// Opaque per-connection identity, stable for the lifetime of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::SeqCst))
    }
}

/// Capability a room needs from a connection: send a pre-serialized frame,
/// and report whether it is still open. Send failure is itself evidence of
/// closure and is routed through the same `leave` path.
pub trait Transport: Send + Sync {
    fn send_text(&self, text: String) -> bool;
    fn is_open(&self) -> bool;
}

/// Role-based authorization tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Moderator,
    Listener,
}

/// Operations gated by [`Room::authorize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    PlaybackControl,
    QueueEdit,
    SetModerator,
}

struct UserRecord {
    transport: Arc<dyn Transport>,
    name: String,
    role: Role,
    addr: SocketAddr,
}

#[derive(Debug, Serialize, Clone)]
pub struct UserView {
    pub name: String,
    pub role: Role,
    pub client_ip: String,
    pub client_port: u16,
}

struct RoomInner {
    queue: Vec<Track>,
    state: PlaybackState,
    host: Option<ConnectionId>,
}

/// Outcome of `add_pending_download`, telling the caller (session layer)
/// whether to schedule an ingest task.
pub enum PendingDownloadOutcome {
    Scheduled { item_id: String },
    AlreadyInFlight,
}

pub struct Room {
    pub slug: String,
    pub created_at: f64,
    inner: RwLock<RoomInner>,
    users: DashMap<ConnectionId, UserRecord>,
    clock: Arc<dyn Clock>,
}

impl Room {
    pub fn new(slug: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_secs();
        Self {
            slug: slug.into(),
            created_at: now,
            inner: RwLock::new(RoomInner {
                queue: Vec::new(),
                state: PlaybackState::default(),
                host: None,
            }),
            users: DashMap::new(),
            clock,
        }
    }

    fn now(&self) -> f64 {
        self.clock.now_secs()
    }

    // ---- roster -----------------------------------------------------

    /// Rejects if the transport is already closed. Promotes to host when no
    /// host is currently connected.
    pub fn join(&self, id: ConnectionId, transport: Arc<dyn Transport>, name: String, addr: SocketAddr) -> JukeboxResult<()> {
        if !transport.is_open() {
            return Err(JukeboxError::Internal("transport not connected".into()));
        }

        let mut inner = self.inner.write();
        let host_connected = inner
            .host
            .map(|h| self.users.get(&h).map(|u| u.transport.is_open()).unwrap_or(false))
            .unwrap_or(false);

        let role = if inner.host.is_none() || !host_connected {
            inner.host = Some(id);
            Role::Host
        } else {
            Role::Listener
        };
        drop(inner);

        self.users.insert(
            id,
            UserRecord {
                transport,
                name: if name.is_empty() { "No name".to_string() } else { name },
                role,
                addr,
            },
        );

        self.broadcast_users();
        Ok(())
    }

    /// Idempotent: a second call for an already-absent connection is a no-op.
    pub fn leave(&self, id: ConnectionId) {
        if self.users.remove(&id).is_none() {
            return;
        }

        let mut inner = self.inner.write();
        if inner.host == Some(id) {
            inner.host = None;
            let successor = self
                .users
                .iter()
                .find(|entry| entry.value().role == Role::Moderator && entry.value().transport.is_open())
                .map(|entry| *entry.key())
                .or_else(|| {
                    self.users
                        .iter()
                        .find(|entry| entry.value().transport.is_open())
                        .map(|entry| *entry.key())
                });

            if let Some(successor_id) = successor {
                inner.host = Some(successor_id);
                drop(inner);
                if let Some(mut user) = self.users.get_mut(&successor_id) {
                    user.role = Role::Host;
                }
                self.send_user_info(successor_id);
            } else {
                drop(inner);
            }
        }

        self.broadcast_users();
    }

    fn send_user_info(&self, id: ConnectionId) {
        if let Some(user) = self.users.get(&id) {
            let payload = UserView {
                name: user.name.clone(),
                role: user.role,
                client_ip: user.addr.ip().to_string(),
                client_port: user.addr.port(),
            };
            let envelope = Envelope::new("user_info", payload, self.now());
            if let Ok(text) = serde_json::to_string(&envelope) {
                user.transport.send_text(text);
            }
        }
    }

    pub fn authorize(&self, id: ConnectionId, op: Operation) -> JukeboxResult<()> {
        let role = self
            .users
            .get(&id)
            .map(|u| u.role)
            .ok_or_else(|| JukeboxError::AuthorizationDenied("connection not in room".into()))?;

        let allowed = match op {
            Operation::PlaybackControl | Operation::QueueEdit => {
                matches!(role, Role::Host | Role::Moderator)
            }
            Operation::SetModerator => matches!(role, Role::Host),
        };

        if allowed {
            Ok(())
        } else {
            Err(JukeboxError::AuthorizationDenied(
                "Only hosts and moderators may perform this action".into(),
            ))
        }
    }

    // ---- broadcast ----------------------------------------------------

    /// Fans an envelope out to every connected user, optionally excluding
    /// one. Dead transports are removed via `leave` as they're discovered.
    pub fn broadcast<T: Serialize>(&self, kind: &'static str, payload: T, exclude: Option<ConnectionId>) {
        let envelope = Envelope::new(kind, payload, self.now());
        let Ok(text) = serde_json::to_string(&envelope) else {
            return;
        };
        let snapshot: Vec<(ConnectionId, Arc<dyn Transport>)> = self
            .users
            .iter()
            .filter(|e| Some(*e.key()) != exclude)
            .map(|e| (*e.key(), e.value().transport.clone()))
            .collect();

        let mut dead = Vec::new();
        for (id, transport) in snapshot {
            if !transport.is_open() || !transport.send_text(text.clone()) {
                dead.push(id);
            }
        }
        for id in dead {
            self.leave(id);
        }
    }

    pub fn send_to(&self, id: ConnectionId, kind: &'static str, payload: impl Serialize) {
        if let Some(user) = self.users.get(&id) {
            let envelope = Envelope::new(kind, payload, self.now());
            if let Ok(text) = serde_json::to_string(&envelope) {
                user.transport.send_text(text);
            }
        }
    }

    pub fn send_error(&self, id: ConnectionId, message: impl Into<String>) {
        self.send_to(id, "error", ErrorPayload { message: message.into() });
    }

    fn broadcast_users(&self) {
        self.broadcast_users_page(0, 10, None);
    }

    fn broadcast_users_page(&self, page: usize, limit: usize, exclude: Option<ConnectionId>) {
        let (users, total) = self.users_page(page, limit);
        self.broadcast(
            "users_sync",
            UsersSyncPayload {
                users,
                page,
                limit,
                total,
                has_more: (page + 1) * limit < total,
            },
            exclude,
        );
    }

    pub fn send_users_page(&self, id: ConnectionId, page: usize, limit: usize) {
        let (users, total) = self.users_page(page, limit);
        self.send_to(
            id,
            "users_sync",
            UsersSyncPayload {
                users,
                page,
                limit,
                total,
                has_more: (page + 1) * limit < total,
            },
        );
    }

    pub fn users_page(&self, page: usize, limit: usize) -> (Vec<UserView>, usize) {
        let active: Vec<UserView> = self
            .users
            .iter()
            .filter(|e| e.value().transport.is_open())
            .map(|e| UserView {
                name: e.value().name.clone(),
                role: e.value().role,
                client_ip: e.value().addr.ip().to_string(),
                client_port: e.value().addr.port(),
            })
            .collect();
        let total = active.len();
        let start = page.saturating_mul(limit).min(total);
        let end = (start + limit).min(total);
        (active[start..end].to_vec(), total)
    }

    /// Active user count, for REST listing and operational logging.
    pub fn active_user_count(&self) -> usize {
        self.users.iter().filter(|e| e.value().transport.is_open()).count()
    }

    pub fn has_host(&self) -> bool {
        self.inner.read().host.is_some()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.read().queue.len()
    }

    /// Id of the current track, if any. Used for operational introspection
    /// and by tests.
    pub fn current_track_id(&self) -> Option<String> {
        self.inner.read().state.track.as_ref().map(|t| t.id.clone())
    }

    /// Passive liveness sweep: drops any user whose transport is no longer
    /// connected. Used by the REST roster listing so stale entries never
    /// leak out of a read path.
    pub fn sweep_dead_connections(&self) {
        let dead: Vec<ConnectionId> = self
            .users
            .iter()
            .filter(|e| !e.value().transport.is_open())
            .map(|e| *e.key())
            .collect();
        for id in dead {
            self.leave(id);
        }
    }

    // ---- selection rule -------------------------------------------------

    fn first_available_from(queue: &[Track], start: usize) -> Option<usize> {
        let len = queue.len();
        if len == 0 {
            return None;
        }
        (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&idx| queue[idx].is_available())
    }

    fn current_index(queue: &[Track], state: &PlaybackState) -> Option<usize> {
        let current = state.track.as_ref()?;
        queue.iter().position(|t| t.id == current.id)
    }

    // ---- playback commands ----------------------------------------------

    pub fn play(&self) {
        let mut inner = self.inner.write();
        let now = self.now();
        inner.state.position = inner.state.effective_position(now);
        inner.state.start_time = Some(now - inner.state.position);
        inner.state.is_playing = true;
        let start_time = inner.state.start_time;
        drop(inner);
        self.broadcast("play", PlayPayload { start_time }, None);
    }

    pub fn pause(&self) {
        let mut inner = self.inner.write();
        let now = self.now();
        if inner.state.is_playing {
            inner.state.position = inner.state.effective_position(now);
        }
        inner.state.is_playing = false;
        let position = inner.state.position;
        drop(inner);
        self.broadcast("pause", PausePayload { position }, None);
    }

    pub fn seek(&self, position: f64) {
        let mut inner = self.inner.write();
        let now = self.now();
        inner.state.position = position;
        if inner.state.is_playing {
            inner.state.start_time = Some(now - position);
        }
        let is_playing = inner.state.is_playing;
        drop(inner);
        self.broadcast("seek", SeekBroadcast { position, is_playing }, None);
    }

    pub fn set_track(&self, track: Option<Track>, playing: bool) {
        let mut inner = self.inner.write();
        let now = self.now();
        inner.state.set_track(track.clone(), playing, now);
        drop(inner);
        self.broadcast("set_track", SetTrackBroadcast { track, is_playing: playing }, None);
    }

    pub fn set_track_from_url_or_track(&self, track_or_url: crate::session::TrackOrUrl, playing_hint: Option<bool>) {
        let track = match track_or_url {
            crate::session::TrackOrUrl::Track(t) => t,
            crate::session::TrackOrUrl::Url(url) => Track {
                id: Uuid::new_v4().to_string(),
                title: url.rsplit('/').next().unwrap_or(&url).to_string(),
                artist: String::new(),
                url: url.clone(),
                artwork: None,
                source: Track::source_from_url(&url),
                duration: None,
                is_suggested: false,
                is_pending: false,
                votes: 0,
                video_id: None,
            },
        };
        self.set_track(Some(track), playing_hint.unwrap_or(false));
    }

    fn advance(&self, kind: &'static str, next_index: impl Fn(&[Track], Option<usize>) -> Option<usize>) {
        let mut inner = self.inner.write();
        let now = self.now();
        let current_idx = Self::current_index(&inner.queue, &inner.state);
        let new_idx = next_index(&inner.queue, current_idx);
        let track = new_idx.map(|i| inner.queue[i].clone());
        inner.state.set_track(track.clone(), track.is_some(), now);
        drop(inner);
        self.broadcast(kind, SetTrackBroadcast { track, is_playing: new_idx.is_some() }, None);
    }

    /// Scans forward from `(current+1) mod len`, filtered to available
    /// tracks; if the current track isn't in the queue, scans from index 0.
    pub fn next_track(&self) {
        self.advance("next-track", |queue, current_idx| {
            let start = match current_idx {
                Some(i) => (i + 1) % queue.len().max(1),
                None => 0,
            };
            Self::first_available_from(queue, start)
        });
    }

    /// Wraps to the last track on underflow. Does not filter by
    /// availability (asymmetric with `next_track` by design, see DESIGN.md).
    pub fn previous_track(&self) {
        self.advance("previous-track", |queue, current_idx| {
            if queue.is_empty() {
                return None;
            }
            let idx = match current_idx {
                Some(0) | None => queue.len() - 1,
                Some(i) => i - 1,
            };
            Some(idx)
        });
    }

    /// Pins the current track at index 0, uniform-randomly permutes the rest.
    pub fn shuffle_queue(&self) {
        let mut inner = self.inner.write();
        let current_idx = Self::current_index(&inner.queue, &inner.state);
        if let Some(idx) = current_idx {
            inner.queue.swap(0, idx);
            let (_, rest) = inner.queue.split_at_mut(1);
            rest.shuffle(&mut rand::thread_rng());
        } else {
            inner.queue.shuffle(&mut rand::thread_rng());
        }
        drop(inner);
        self.broadcast_queue();
    }

    /// Materializes a copy of the current track with a fresh id immediately
    /// after its position.
    pub fn repeat_track(&self) {
        let mut inner = self.inner.write();
        if let Some(idx) = Self::current_index(&inner.queue, &inner.state) {
            let mut copy = inner.queue[idx].clone();
            copy.id = Uuid::new_v4().to_string();
            inner.queue.insert(idx + 1, copy);
        }
        drop(inner);
        self.broadcast_queue();
    }

    pub fn delete_item(&self, item_id: &str) {
        let mut inner = self.inner.write();
        let now = self.now();
        let removed_idx = inner.queue.iter().position(|t| t.id == item_id);
        let Some(removed_idx) = removed_idx else {
            return;
        };
        let was_current = Self::current_index(&inner.queue, &inner.state) == Some(removed_idx);
        inner.queue.remove(removed_idx);

        if was_current {
            let new_idx = Self::first_available_from(&inner.queue, 0);
            let track = new_idx.map(|i| inner.queue[i].clone());
            inner.state.set_track(track.clone(), false, now);
            drop(inner);
            self.broadcast_queue();
            self.broadcast("set_track", SetTrackBroadcast { track, is_playing: false }, None);
        } else {
            drop(inner);
            self.broadcast_queue();
        }
    }

    pub fn reorder_item(&self, item_id: &str, direction: ReorderDirection) {
        let mut inner = self.inner.write();
        if let Some(idx) = inner.queue.iter().position(|t| t.id == item_id) {
            let swap_with = match direction {
                ReorderDirection::Up => idx.checked_sub(1),
                ReorderDirection::Down => {
                    if idx + 1 < inner.queue.len() {
                        Some(idx + 1)
                    } else {
                        None
                    }
                }
            };
            if let Some(other) = swap_with {
                inner.queue.swap(idx, other);
            }
        }
        drop(inner);
        self.broadcast_queue();
    }

    pub fn approve_item(&self, item_id: &str) {
        let mut inner = self.inner.write();
        if let Some(track) = inner.queue.iter_mut().find(|t| t.id == item_id) {
            track.is_suggested = false;
        }
        drop(inner);
        self.broadcast_queue();
    }

    /// Assigns a fresh id; if no current track exists and the new item is
    /// immediately playable, promotes it via the selection rule.
    pub fn add_to_queue(&self, mut item: Track) {
        item.video_id = Some(item.id.clone());
        item.id = Uuid::new_v4().to_string();
        let mut inner = self.inner.write();
        let needs_promotion = inner.state.track.is_none() && item.is_available();
        inner.queue.push(item);
        let promote_idx = if needs_promotion {
            Self::first_available_from(&inner.queue, 0)
        } else {
            None
        };
        drop(inner);
        self.broadcast_queue();

        if let Some(idx) = promote_idx {
            let mut inner = self.inner.write();
            let now = self.now();
            let track = inner.queue.get(idx).cloned();
            inner.state.set_track(track.clone(), false, now);
            drop(inner);
            self.broadcast("set_track", SetTrackBroadcast { track, is_playing: false }, None);
        }
    }

    /// Returns `AlreadyInFlight` when `in_flight` already has an entry for
    /// this address (caller checks before calling); otherwise creates the
    /// pending entry and returns its id for the caller to schedule ingest.
    pub fn add_pending_download(&self, title: String, artist: Option<String>, artwork: Option<String>, duration: Option<f64>, video_id: String) -> String {
        let item = Track {
            id: Uuid::new_v4().to_string(),
            title,
            artist: artist.unwrap_or_default(),
            url: String::new(),
            artwork,
            source: TrackSource::Youtube,
            duration,
            is_suggested: false,
            is_pending: true,
            votes: 0,
            video_id: Some(video_id),
        };
        let id = item.id.clone();
        self.inner.write().queue.push(item);
        self.broadcast_queue();
        id
    }

    /// Invoked by the ingest coupling (§4.9) on success: patches the pending
    /// item in place if it's still present.
    pub fn complete_pending_download(&self, item_id: &str, url: String, artwork: Option<String>, reported_duration: Option<f64>) {
        let mut inner = self.inner.write();
        let Some(track) = inner.queue.iter_mut().find(|t| t.id == item_id) else {
            return;
        };
        track.url = url;
        if artwork.is_some() {
            track.artwork = artwork;
        }
        track.duration = reported_duration
            .map(|d| (d - crate::protocol_constants::TAIL_SILENCE_BUFFER_SECS).max(1.0));
        track.is_pending = false;
        track.video_id = None;
        let needs_promotion = inner.state.track.is_none();
        drop(inner);
        self.broadcast_queue();

        if needs_promotion {
            self.set_first_available();
        }
    }

    /// Invoked by the ingest coupling on timeout/failure: marks the item as
    /// a visible failure (empty url, no longer pending).
    pub fn fail_pending_download(&self, item_id: &str) {
        let mut inner = self.inner.write();
        if let Some(track) = inner.queue.iter_mut().find(|t| t.id == item_id) {
            track.url.clear();
            track.is_pending = false;
        }
        drop(inner);
        self.broadcast_queue();
    }

    fn set_first_available(&self) {
        let mut inner = self.inner.write();
        let now = self.now();
        let idx = Self::first_available_from(&inner.queue, 0);
        let track = idx.map(|i| inner.queue[i].clone());
        if track.is_none() {
            return;
        }
        inner.state.set_track(track.clone(), false, now);
        drop(inner);
        self.broadcast("set_track", SetTrackBroadcast { track, is_playing: false }, None);
    }

    /// Cannot target the current host. Promotes/demotes between moderator
    /// and listener. Sends `user_info` to the affected connection.
    pub fn set_moderator(&self, addr: SocketAddr, is_moderator: bool) -> JukeboxResult<()> {
        let host_id = self.inner.read().host;
        let target_id = self
            .users
            .iter()
            .find(|e| e.value().addr.ip() == addr.ip() && (addr.port() == 0 || e.value().addr.port() == addr.port()))
            .map(|e| *e.key())
            .ok_or_else(|| JukeboxError::ItemNotFound("no such connection".into()))?;

        if Some(target_id) == host_id {
            return Err(JukeboxError::AuthorizationDenied("cannot target the current host".into()));
        }

        if let Some(mut user) = self.users.get_mut(&target_id) {
            user.role = if is_moderator { Role::Moderator } else { Role::Listener };
        }
        self.send_user_info(target_id);
        self.broadcast_users();
        Ok(())
    }

    pub fn dance(&self) {
        self.broadcast("dance", serde_json::json!({}), None);
    }

    pub fn ping(&self, id: ConnectionId) {
        self.send_to(id, "pong", serde_json::json!({}));
    }

    pub fn get_state(&self, id: ConnectionId) {
        let inner = self.inner.read();
        let now = self.now();
        let payload = StateSyncPayload {
            track: inner.state.track.clone(),
            is_playing: inner.state.is_playing,
            position: inner.state.effective_position(now),
            duration: inner.state.duration,
        };
        drop(inner);
        self.send_to(id, "state_sync", payload);
    }

    pub fn get_queue(&self, id: ConnectionId) {
        let queue = self.inner.read().queue.clone();
        self.send_to(id, "queue_sync", QueueSyncPayload { queue });
    }

    fn broadcast_queue(&self) {
        let queue = self.inner.read().queue.clone();
        self.broadcast("queue_sync", QueueSyncPayload { queue }, None);
    }

    /// Sends the joiner's initial `state_sync`, `queue_sync`, `user_info`
    /// trio, per the session handler's connect sequence.
    pub fn send_initial_state(&self, id: ConnectionId) {
        self.get_state(id);
        self.get_queue(id);
        self.send_user_info(id);
    }

    /// Snapshot used by the global ticker to decide whether this room's
    /// track has elapsed.
    pub fn ticker_snapshot(&self) -> Option<TickerSnapshot> {
        let inner = self.inner.read();
        let start_time = inner.state.start_time?;
        let duration = inner.state.duration?;
        if !inner.state.is_playing {
            return None;
        }
        Some(TickerSnapshot { start_time, duration })
    }
}

pub struct TickerSnapshot {
    pub start_time: f64,
    pub duration: f64,
}

#[derive(Debug, Serialize)]
struct PlayPayload {
    start_time: Option<f64>,
}

#[derive(Debug, Serialize)]
struct PausePayload {
    position: f64,
}

#[derive(Debug, Serialize)]
struct SeekBroadcast {
    position: f64,
    is_playing: bool,
}

#[derive(Debug, Serialize)]
struct SetTrackBroadcast {
    track: Option<Track>,
    is_playing: bool,
}

#[derive(Debug, Serialize)]
struct StateSyncPayload {
    track: Option<Track>,
    is_playing: bool,
    position: f64,
    duration: Option<f64>,
}

#[derive(Debug, Serialize)]
struct QueueSyncPayload {
    queue: Vec<Track>,
}

#[derive(Debug, Serialize)]
struct UsersSyncPayload {
    users: Vec<UserView>,
    page: usize,
    limit: usize,
    total: usize,
    has_more: bool,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::AtomicBool;

    pub struct TestTransport {
        pub open: Arc<AtomicBool>,
        pub sent: Arc<parking_lot::Mutex<Vec<String>>>,
    }

    impl TestTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                open: Arc::new(AtomicBool::new(true)),
                sent: Arc::new(parking_lot::Mutex::new(Vec::new())),
            })
        }

        pub fn close(&self) {
            self.open.store(false, Ordering::SeqCst);
        }

        pub fn messages(&self) -> Vec<String> {
            self.sent.lock().clone()
        }
    }

    impl Transport for TestTransport {
        fn send_text(&self, text: String) -> bool {
            if !self.is_open() {
                return false;
            }
            self.sent.lock().push(text);
            true
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::TestTransport;
    use super::*;
    use crate::clock::TestClock;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    fn room() -> (Room, Arc<TestClock>) {
        let clock = Arc::new(TestClock::new());
        (Room::new("room1", clock.clone()), clock)
    }

    fn track(id: &str, duration: f64) -> Track {
        Track {
            id: id.into(),
            title: id.into(),
            artist: String::new(),
            url: format!("https://example.test/{id}.mp3"),
            artwork: None,
            source: TrackSource::Html5,
            duration: Some(duration),
            is_suggested: false,
            is_pending: false,
            votes: 0,
            video_id: None,
        }
    }

    #[test]
    fn first_joiner_becomes_host() {
        let (room, _clock) = room();
        let a = ConnectionId::next();
        room.join(a, TestTransport::new(), "A".into(), addr(1)).unwrap();
        room.authorize(a, Operation::PlaybackControl).unwrap();
    }

    #[test]
    fn second_joiner_is_listener_and_cannot_play() {
        let (room, _clock) = room();
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        room.join(a, TestTransport::new(), "A".into(), addr(1)).unwrap();
        room.join(b, TestTransport::new(), "B".into(), addr(2)).unwrap();
        assert!(room.authorize(b, Operation::PlaybackControl).is_err());
    }

    #[test]
    fn host_succession_promotes_moderator_first() {
        let (room, _clock) = room();
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        let c = ConnectionId::next();
        room.join(a, TestTransport::new(), "A".into(), addr(1)).unwrap();
        room.join(b, TestTransport::new(), "B".into(), addr(2)).unwrap();
        room.join(c, TestTransport::new(), "C".into(), addr(3)).unwrap();
        room.set_moderator(addr(3), true).unwrap();

        room.leave(a);
        assert!(room.authorize(c, Operation::PlaybackControl).is_ok());
        assert!(room.authorize(b, Operation::PlaybackControl).is_err());
    }

    #[test]
    fn host_succession_falls_back_to_arbitrary_user() {
        let (room, _clock) = room();
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        room.join(a, TestTransport::new(), "A".into(), addr(1)).unwrap();
        room.join(b, TestTransport::new(), "B".into(), addr(2)).unwrap();

        room.leave(a);
        assert!(room.authorize(b, Operation::PlaybackControl).is_ok());
    }

    #[test]
    fn play_then_pause_with_no_drift_yields_zero_position() {
        let (room, _clock) = room();
        room.add_to_queue(track("1", 100.0));
        room.play();
        room.pause();
        room.get_state(ConnectionId::next());
    }

    #[test]
    fn seek_while_paused_preserves_paused_state() {
        let (room, _clock) = room();
        room.add_to_queue(track("1", 100.0));
        room.seek(42.0);
        let snapshot = room.ticker_snapshot();
        assert!(snapshot.is_none());
    }

    #[test]
    fn shuffle_preserves_current_track_at_index_zero() {
        let (room, _clock) = room();
        for i in 0..5 {
            room.add_to_queue(track(&i.to_string(), 10.0));
        }
        room.set_track(Some(track("0", 10.0)), false);
        room.shuffle_queue();
        let queue = room.inner.read().queue.clone();
        assert_eq!(queue[0].id, "0");
    }

    #[test]
    fn repeat_track_adds_one_item_with_fresh_id() {
        let (room, _clock) = room();
        room.add_to_queue(track("1", 10.0));
        room.set_track(Some(track("1", 10.0)), false);
        let before = room.queue_len();
        room.repeat_track();
        assert_eq!(room.queue_len(), before + 1);
    }

    #[test]
    fn next_track_skips_pending_items() {
        let (room, _clock) = room();
        let mut pending = track("2", 10.0);
        pending.is_pending = true;
        pending.url.clear();
        room.add_to_queue(track("1", 10.0));
        room.add_to_queue(pending);
        room.add_to_queue(track("3", 10.0));
        room.set_track(Some(track("1", 10.0)), false);
        room.next_track();
        let current = room.inner.read().state.track.clone().unwrap();
        assert_eq!(current.id, "3");
    }

    #[test]
    fn next_then_previous_returns_to_start() {
        let (room, _clock) = room();
        room.add_to_queue(track("1", 10.0));
        room.add_to_queue(track("2", 10.0));
        room.set_track(Some(track("1", 10.0)), false);
        room.next_track();
        room.previous_track();
        let current = room.inner.read().state.track.clone().unwrap();
        assert_eq!(current.id, "1");
    }

    #[test]
    fn ticker_snapshot_requires_playing_with_duration() {
        let (room, _clock) = room();
        room.add_to_queue(track("1", 5.0));
        assert!(room.ticker_snapshot().is_none());
        room.set_track(Some(track("1", 5.0)), true);
        assert!(room.ticker_snapshot().is_some());
    }

    #[test]
    fn delete_current_item_clears_track_when_queue_empty() {
        let (room, _clock) = room();
        room.add_to_queue(track("1", 5.0));
        room.set_track(Some(track("1", 5.0)), false);
        room.delete_item("1");
        assert!(room.inner.read().state.track.is_none());
    }
}
