//! Jukebox Core - shared library for the multi-room synchronized jukebox
//! server.
//!
//! This crate implements the three subsystems that make up the server's
//! hard engineering:
//!
//! - [`room`]: per-room state machine - playback timeline, queue, roster,
//!   authorization, host succession, and fan-out.
//! - [`ticker`]: a single global background loop advancing any room whose
//!   current track has elapsed.
//! - [`download_queue`] and [`ingest`]: a bounded worker pool for external
//!   audio ingestion, coupled to a room's queue.
//!
//! # Architecture
//!
//! - [`clock`]: injectable wall-clock source
//! - [`rate_limiter`]: sliding-window admission control
//! - [`blob_store`]: narrow interface over the external object store
//! - [`media_provider`]: metadata, size estimation, and audio extraction
//! - [`room_registry`]: process-wide slug-to-room map
//! - [`session`]: wire protocol envelope and command/event payload types
//! - [`api`]: REST listing and WebSocket entry point
//! - [`bootstrap`]: composition root wiring every service together
//! - [`error`]: centralized error types
//! - [`config`]: runtime configuration

#![warn(clippy::all)]

pub mod api;
pub mod blob_store;
pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod download_queue;
pub mod error;
pub mod ingest;
pub mod media_provider;
pub mod protocol_constants;
pub mod rate_limiter;
pub mod room;
pub mod room_registry;
pub mod runtime;
pub mod session;
pub mod ticker;
pub mod track;

pub use api::{start_server, AppState, ServerError};
pub use blob_store::{BlobStore, InMemoryBlobStore, SupabaseBlobStore};
pub use bootstrap::{bootstrap_services, BootstrappedServices};
pub use clock::{Clock, SystemClock, TestClock};
pub use config::Config;
pub use download_queue::DownloadQueue;
pub use error::{ErrorCode, JukeboxError, JukeboxResult};
pub use media_provider::{ExternalToolMediaProvider, MediaProvider, StubMediaProvider};
pub use rate_limiter::RateLimiter;
pub use room::{ConnectionId, Role, Room};
pub use room_registry::RoomRegistry;
pub use runtime::{TaskSpawner, TokioSpawner};
pub use track::{PlaybackState, Track, TrackSource};
