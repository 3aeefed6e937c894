//! Couples the download queue (C5) to a room's queue (C6). Owns the
//! per-address in-flight cap and the background task that waits on a
//! submitted download and patches the room's pending item on completion.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;

use crate::download_queue::DownloadQueue;
use crate::protocol_constants::INGEST_AWAIT_DEADLINE;
use crate::room::Room;
use crate::runtime::TaskSpawner;

/// Tracks which addresses currently have an ingest in flight. A single lock
/// around insert/remove is sufficient per the resource model.
#[derive(Default)]
pub struct InFlightMap {
    addresses: Mutex<HashSet<IpAddr>>,
}

impl InFlightMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true and records the address if it wasn't already in flight.
    pub fn try_acquire(&self, addr: IpAddr) -> bool {
        self.addresses.lock().insert(addr)
    }

    pub fn release(&self, addr: IpAddr) {
        self.addresses.lock().remove(&addr);
    }
}

/// Schedules the background ingest task for a pending queue item. Called
/// immediately after `Room::add_pending_download` enqueues and broadcasts
/// the pending entry.
pub fn schedule(
    spawner: Arc<dyn TaskSpawner>,
    download_queue: Arc<DownloadQueue>,
    in_flight: Arc<InFlightMap>,
    room: Arc<Room>,
    addr: IpAddr,
    item_id: String,
    video_id: String,
) {
    spawner.spawn(async move {
        let task_id = download_queue.submit(video_id.clone(), "mp3");
        info!("ingest started video_id={video_id} room={} item={item_id}", room.slug);

        match download_queue.await_task(&task_id, INGEST_AWAIT_DEADLINE).await {
            Ok(result) => {
                info!("ingest completed video_id={video_id} room={}", room.slug);
                room.complete_pending_download(&item_id, result.url, result.artwork, result.duration);
            }
            Err(err) => {
                warn!("ingest failed video_id={video_id} room={}: {err}", room.slug);
                room.fail_pending_download(&item_id);
            }
        }

        in_flight.release(addr);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_map_rejects_second_acquire_for_same_address() {
        let map = InFlightMap::new();
        let addr: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(map.try_acquire(addr));
        assert!(!map.try_acquire(addr));
        map.release(addr);
        assert!(map.try_acquire(addr));
    }

    #[test]
    fn in_flight_map_is_independent_per_address() {
        let map = InFlightMap::new();
        let a: IpAddr = "127.0.0.1".parse().unwrap();
        let b: IpAddr = "127.0.0.2".parse().unwrap();
        assert!(map.try_acquire(a));
        assert!(map.try_acquire(b));
    }
}
