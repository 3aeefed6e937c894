//! Queue and playback data model.
//!
//! Field casing intentionally mirrors the wire protocol exactly rather than a
//! blanket `rename_all`: some fields are camelCase (`isSuggested`,
//! `isPending`) and others snake_case (`is_playing`, `start_time`), matching
//! what clients already expect on the wire.

use serde::{Deserialize, Serialize};

/// Where a queue item's media originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackSource {
    Html5,
    Youtube,
}

/// A single queue entry. Treated as immutable by convention; mutations
/// replace the record rather than editing fields in place, except where
/// noted (ingest completion patches a pending entry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub artwork: Option<String>,
    pub source: TrackSource,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(rename = "isSuggested", default)]
    pub is_suggested: bool,
    #[serde(rename = "isPending", default)]
    pub is_pending: bool,
    #[serde(default)]
    pub votes: u32,
    #[serde(rename = "video_id", default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
}

impl Track {
    /// A track is eligible to become the current track when it is neither
    /// pending ingest nor awaiting approval, and carries a resolvable URL.
    pub fn is_available(&self) -> bool {
        !self.is_pending && !self.is_suggested && !self.url.is_empty()
    }

    /// Infers [`TrackSource`] from a bare URL's host, per the `set_track`
    /// normalization rule.
    pub fn source_from_url(url: &str) -> TrackSource {
        let host = url
            .split("://")
            .nth(1)
            .unwrap_or(url)
            .split('/')
            .next()
            .unwrap_or("")
            .trim_start_matches("www.");
        if host == "youtube.com" || host == "youtu.be" {
            TrackSource::Youtube
        } else {
            TrackSource::Html5
        }
    }
}

/// Authoritative per-room playback state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackState {
    pub track: Option<Track>,
    pub is_playing: bool,
    pub start_time: Option<f64>,
    pub position: f64,
    pub duration: Option<f64>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            track: None,
            is_playing: false,
            start_time: None,
            position: 0.0,
            duration: None,
        }
    }
}

impl PlaybackState {
    /// Computes the position to report right now: derived from `start_time`
    /// while playing, otherwise the stored value.
    pub fn effective_position(&self, now: f64) -> f64 {
        match (self.is_playing, self.start_time) {
            (true, Some(start)) => (now - start).max(0.0),
            _ => self.position,
        }
    }

    /// Replaces the current track, resetting position per (I3) and syncing
    /// `duration` per (I4).
    pub fn set_track(&mut self, track: Option<Track>, playing: bool, now: f64) {
        self.duration = track.as_ref().and_then(|t| t.duration);
        self.track = track;
        self.position = 0.0;
        self.is_playing = playing;
        self.start_time = if playing { Some(now) } else { None };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, url: &str) -> Track {
        Track {
            id: id.into(),
            title: "t".into(),
            artist: String::new(),
            url: url.into(),
            artwork: None,
            source: TrackSource::Html5,
            duration: Some(10.0),
            is_suggested: false,
            is_pending: false,
            votes: 0,
            video_id: None,
        }
    }

    #[test]
    fn available_requires_url_and_not_pending_or_suggested() {
        let mut t = track("1", "https://x/1.mp3");
        assert!(t.is_available());
        t.is_pending = true;
        assert!(!t.is_available());
        t.is_pending = false;
        t.is_suggested = true;
        assert!(!t.is_available());
        t.is_suggested = false;
        t.url.clear();
        assert!(!t.is_available());
    }

    #[test]
    fn source_from_url_detects_youtube_hosts() {
        assert_eq!(
            Track::source_from_url("https://youtu.be/abc"),
            TrackSource::Youtube
        );
        assert_eq!(
            Track::source_from_url("https://www.youtube.com/watch?v=abc"),
            TrackSource::Youtube
        );
        assert_eq!(
            Track::source_from_url("https://example.com/a.mp3"),
            TrackSource::Html5
        );
    }

    #[test]
    fn effective_position_derives_from_start_time_while_playing() {
        let mut state = PlaybackState::default();
        state.set_track(Some(track("1", "u")), true, 100.0);
        assert_eq!(state.effective_position(110.0), 10.0);
        state.is_playing = false;
        state.position = 5.0;
        assert_eq!(state.effective_position(110.0), 5.0);
    }
}
