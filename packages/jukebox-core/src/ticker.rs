//! Single global background loop advancing any room whose current track has
//! elapsed. Never holds a room-wide lock across network I/O: each tick takes
//! a snapshot of the registry, and each room's own `next_track` call takes
//! its own lock internally.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::room_registry::RoomRegistry;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Runs until `shutdown` is cancelled, sleeping `TICK_INTERVAL` between
/// sweeps and exiting promptly on cancellation rather than mid-sleep.
pub async fn run(registry: Arc<RoomRegistry>, clock: Arc<dyn Clock>, shutdown: CancellationToken) {
    info!("ticker started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("ticker stopping on shutdown signal");
                break;
            }
            _ = tokio::time::sleep(TICK_INTERVAL) => {}
        }

        let now = clock.now_secs();
        let rooms = registry.snapshot();
        debug!("ticker sweep over {} rooms", rooms.len());
        for room in rooms {
            if let Some(snapshot) = room.ticker_snapshot() {
                if now - snapshot.start_time >= snapshot.duration {
                    info!("ticker advancing room {} past track end", room.slug);
                    room.next_track();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::room::test_support::TestTransport;
    use crate::room::{ConnectionId, Operation};
    use crate::track::{Track, TrackSource};
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

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

    #[tokio::test(start_paused = true)]
    async fn ticker_advances_room_past_track_end() {
        let clock = Arc::new(TestClock::new());
        let registry = Arc::new(RoomRegistry::new(clock.clone()));
        let room = registry.get_or_create("room1");
        let conn = ConnectionId::next();
        room.join(
            conn,
            TestTransport::new(),
            "A".into(),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 1),
        )
        .unwrap();
        let _ = room.authorize(conn, Operation::PlaybackControl);

        room.add_to_queue(track("1", 5.0));
        room.add_to_queue(track("2", 5.0));
        room.set_track(Some(track("1", 5.0)), true);

        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();
        let registry_clone = registry.clone();
        let clock_clone: Arc<dyn Clock> = clock.clone();
        let handle = tokio::spawn(async move {
            run(registry_clone, clock_clone, shutdown_clone).await;
        });

        clock.advance(6.0);
        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;

        shutdown.cancel();
        let _ = handle.await;

        assert_eq!(room.current_track_id().as_deref(), Some("2"));
    }
}
