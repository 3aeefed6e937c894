//! Runtime configuration. Single source of parameters passed into
//! bootstrap; no on-disk persisted configuration is required (§6
//! Persistence: none), so there is no config-file load path beyond
//! environment variables and CLI flags.

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{DEFAULT_DOWNLOAD_WORKERS, DEFAULT_RATE_LIMIT_MAX, DEFAULT_RATE_LIMIT_WINDOW_SECS};

fn default_bucket() -> String {
    "jukebox-tracks".to_string()
}

fn default_rate_limit_max() -> usize {
    DEFAULT_RATE_LIMIT_MAX
}

fn default_rate_limit_window() -> f64 {
    DEFAULT_RATE_LIMIT_WINDOW_SECS
}

fn default_workers() -> usize {
    DEFAULT_DOWNLOAD_WORKERS
}

fn default_bind_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub supabase_url: String,
    pub supabase_key: String,
    #[serde(default = "default_bucket")]
    pub supabase_bucket: String,
    pub cloudflare_domain: Option<String>,

    #[serde(default = "default_rate_limit_max")]
    pub youtube_download_rate_limit: usize,
    #[serde(default = "default_rate_limit_window")]
    pub youtube_download_rate_window: f64,
    #[serde(default = "default_workers")]
    pub youtube_download_max_workers: usize,

    #[serde(default = "default_bind_port")]
    pub bind_port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_key: String::new(),
            supabase_bucket: default_bucket(),
            cloudflare_domain: None,
            youtube_download_rate_limit: default_rate_limit_max(),
            youtube_download_rate_window: default_rate_limit_window(),
            youtube_download_max_workers: default_workers(),
            bind_port: default_bind_port(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Reads every field from its environment variable, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("SUPABASE_URL") {
            config.supabase_url = v;
        }
        if let Ok(v) = std::env::var("SUPABASE_KEY") {
            config.supabase_key = v;
        }
        if let Ok(v) = std::env::var("SUPABASE_BUCKET") {
            config.supabase_bucket = v;
        }
        if let Ok(v) = std::env::var("CLOUDFLARE_DOMAIN") {
            config.cloudflare_domain = Some(v);
        }
        if let Ok(v) = std::env::var("YOUTUBE_DOWNLOAD_RATE_LIMIT") {
            if let Ok(parsed) = v.parse() {
                config.youtube_download_rate_limit = parsed;
            }
        }
        if let Ok(v) = std::env::var("YOUTUBE_DOWNLOAD_RATE_WINDOW") {
            if let Ok(parsed) = v.parse() {
                config.youtube_download_rate_window = parsed;
            }
        }
        if let Ok(v) = std::env::var("YOUTUBE_DOWNLOAD_MAX_WORKERS") {
            if let Ok(parsed) = v.parse() {
                config.youtube_download_max_workers = parsed;
            }
        }
        if let Ok(v) = std::env::var("JUKEBOX_BIND_PORT") {
            if let Ok(parsed) = v.parse() {
                config.bind_port = parsed;
            }
        }
        if let Ok(v) = std::env::var("JUKEBOX_LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.supabase_bucket, "jukebox-tracks");
        assert_eq!(config.youtube_download_rate_limit, 5);
        assert_eq!(config.youtube_download_rate_window, 60.0);
        assert_eq!(config.youtube_download_max_workers, 3);
        assert_eq!(config.bind_port, 8080);
        assert_eq!(config.log_level, "info");
    }
}
