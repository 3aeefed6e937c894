//! Composition root: wires the clock, rate limiter, adapters, download
//! queue, room registry, and ticker into a single handle the server binary
//! can hold and shut down cleanly.

use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio_util::sync::CancellationToken;

use crate::blob_store::{BlobStore, SupabaseBlobStore};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::download_queue::DownloadQueue;
use crate::error::JukeboxResult;
use crate::ingest::InFlightMap;
use crate::media_provider::{ExternalToolMediaProvider, MediaProvider};
use crate::rate_limiter::RateLimiter;
use crate::room_registry::RoomRegistry;
use crate::runtime::{TaskSpawner, TokioSpawner};

fn create_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("building the shared HTTP client must not fail")
}

/// Handle to every long-lived service, cloned into request handlers and the
/// session loop. Cheap to clone: every field is an `Arc`.
#[derive(Clone)]
pub struct BootstrappedServices {
    pub clock: Arc<dyn Clock>,
    pub rate_limiter: Arc<RateLimiter>,
    pub blob_store: Arc<dyn BlobStore>,
    pub media_provider: Arc<dyn MediaProvider>,
    pub download_queue: Arc<DownloadQueue>,
    pub room_registry: Arc<RoomRegistry>,
    pub in_flight: Arc<InFlightMap>,
    pub spawner: Arc<dyn TaskSpawner>,
    pub cancel_token: CancellationToken,
    pub config: Config,
}

impl BootstrappedServices {
    /// Cancels the shared shutdown token so the ticker and download workers
    /// stop accepting new work at their next opportunity, then logs the
    /// final room/connection counts for operational visibility.
    pub async fn shutdown(&self) {
        info!(
            "shutting down: {} rooms, {} active connections",
            self.room_registry.room_count(),
            self.room_registry.connection_count()
        );
        self.cancel_token.cancel();
    }
}

/// Builds every service in dependency order: clock first (nothing depends on
/// it but it backs everything else), then the adapters, then the queue and
/// registry that depend on them, then the ticker task itself.
pub fn bootstrap_services(config: Config) -> JukeboxResult<BootstrappedServices> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cancel_token = CancellationToken::new();
    let spawner: Arc<dyn TaskSpawner> = Arc::new(TokioSpawner::current());

    let rate_limiter = Arc::new(RateLimiter::new(
        clock.clone(),
        config.youtube_download_rate_limit,
        config.youtube_download_rate_window,
    ));

    let http_client = create_http_client();
    let blob_store: Arc<dyn BlobStore> = Arc::new(SupabaseBlobStore::new(
        http_client,
        config.supabase_url.clone(),
        config.supabase_key.clone(),
        config.supabase_bucket.clone(),
        config.cloudflare_domain.clone(),
    ));

    let media_provider: Arc<dyn MediaProvider> =
        Arc::new(ExternalToolMediaProvider::new("yt-dlp"));

    let download_queue = DownloadQueue::new(
        config.youtube_download_max_workers,
        blob_store.clone(),
        media_provider.clone(),
        cancel_token.clone(),
    );

    let room_registry = Arc::new(RoomRegistry::with_bootstrap_rooms(clock.clone()));
    let in_flight = Arc::new(InFlightMap::new());

    spawner.spawn({
        let registry = room_registry.clone();
        let clock = clock.clone();
        let shutdown = cancel_token.clone();
        async move {
            crate::ticker::run(registry, clock, shutdown).await;
        }
    });

    info!(
        "bootstrap complete: {} bootstrap rooms, {} download workers",
        room_registry.room_count(),
        config.youtube_download_max_workers
    );

    Ok(BootstrappedServices {
        clock,
        rate_limiter,
        blob_store,
        media_provider,
        download_queue,
        room_registry,
        in_flight,
        spawner,
        cancel_token,
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_creates_smoke_test_rooms() {
        let services = bootstrap_services(Config::default()).unwrap();
        assert_eq!(services.room_registry.room_count(), crate::room_registry::BOOTSTRAP_ROOM_COUNT);
    }

    #[tokio::test]
    async fn shutdown_cancels_the_shared_token() {
        let services = bootstrap_services(Config::default()).unwrap();
        assert!(!services.cancel_token.is_cancelled());
        services.shutdown().await;
        assert!(services.cancel_token.is_cancelled());
    }
}
