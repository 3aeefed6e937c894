//! Process-wide map of slug to [`Room`]. Reads are frequent, writes rare —
//! a single lock around the map itself suffices; each room internally
//! serializes its own writers.

use std::sync::Arc;

use dashmap::DashMap;

use crate::clock::Clock;
use crate::room::Room;

/// Number of smoke-test rooms pre-created at startup.
pub const BOOTSTRAP_ROOM_COUNT: usize = 13;

/// One page of the room listing.
pub struct RoomSummary {
    pub slug: String,
    pub user_count: usize,
    pub queue_length: usize,
    pub created_at: f64,
    pub has_host: bool,
}

pub struct RoomListPage {
    pub rooms: Vec<RoomSummary>,
    pub page: usize,
    pub limit: usize,
    pub has_more: bool,
    pub total: usize,
}

/// Maps slugs to rooms. Emptiness-triggered deletion is disabled per
/// decision in DESIGN.md: a room, once created, lives for process lifetime.
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Room>>,
    clock: Arc<dyn Clock>,
}

impl RoomRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rooms: DashMap::new(),
            clock,
        }
    }

    /// Pre-creates `room1`..`room{BOOTSTRAP_ROOM_COUNT}` for smoke tests.
    pub fn with_bootstrap_rooms(clock: Arc<dyn Clock>) -> Self {
        let registry = Self::new(clock);
        for i in 1..=BOOTSTRAP_ROOM_COUNT {
            registry.get_or_create(&format!("room{i}"));
        }
        registry
    }

    /// Never returns none: creates the room lazily on first reference.
    pub fn get_or_create(&self, slug: &str) -> Arc<Room> {
        if let Some(room) = self.rooms.get(slug) {
            return room.clone();
        }
        self.rooms
            .entry(slug.to_string())
            .or_insert_with(|| Arc::new(Room::new(slug, self.clock.clone())))
            .clone()
    }

    pub fn get(&self, slug: &str) -> Option<Arc<Room>> {
        self.rooms.get(slug).map(|r| r.clone())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.rooms.iter().map(|r| r.active_user_count()).sum()
    }

    /// Lists rooms by substring (case-insensitive) match against slug,
    /// sorted by `created_at` descending, paginated.
    pub fn list(&self, page: usize, limit: usize, search: Option<&str>) -> RoomListPage {
        let needle = search.map(|s| s.to_lowercase());
        let mut all: Vec<RoomSummary> = self
            .rooms
            .iter()
            .filter(|entry| {
                needle
                    .as_ref()
                    .map(|n| entry.key().to_lowercase().contains(n.as_str()))
                    .unwrap_or(true)
            })
            .map(|entry| RoomSummary {
                slug: entry.key().clone(),
                user_count: entry.value().active_user_count(),
                queue_length: entry.value().queue_len(),
                created_at: entry.value().created_at,
                has_host: entry.value().has_host(),
            })
            .collect();

        all.sort_by(|a, b| b.created_at.partial_cmp(&a.created_at).unwrap_or(std::cmp::Ordering::Equal));

        let total = all.len();
        let start = page.saturating_mul(limit).min(total);
        let end = (start + limit).min(total);
        let rooms = all.drain(start..end).collect();

        RoomListPage {
            rooms,
            page,
            limit,
            has_more: end < total,
            total,
        }
    }

    /// All rooms, for the ticker's per-tick snapshot.
    pub fn snapshot(&self) -> Vec<Arc<Room>> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;

    #[test]
    fn get_or_create_is_idempotent() {
        let registry = RoomRegistry::new(Arc::new(TestClock::new()));
        let a = registry.get_or_create("room1");
        let b = registry.get_or_create("room1");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn bootstrap_creates_thirteen_rooms() {
        let registry = RoomRegistry::with_bootstrap_rooms(Arc::new(TestClock::new()));
        assert_eq!(registry.room_count(), BOOTSTRAP_ROOM_COUNT);
    }

    #[test]
    fn list_filters_by_search_substring_case_insensitive() {
        let registry = RoomRegistry::new(Arc::new(TestClock::new()));
        registry.get_or_create("Lobby");
        registry.get_or_create("study-room");
        let page = registry.list(0, 10, Some("lob"));
        assert_eq!(page.rooms.len(), 1);
        assert_eq!(page.rooms[0].slug, "Lobby");
    }

    #[test]
    fn list_paginates() {
        let registry = RoomRegistry::new(Arc::new(TestClock::new()));
        for i in 0..5 {
            registry.get_or_create(&format!("room-{i}"));
        }
        let page = registry.list(0, 2, None);
        assert_eq!(page.rooms.len(), 2);
        assert!(page.has_more);
        assert_eq!(page.total, 5);
    }
}
