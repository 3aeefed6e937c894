//! Wire protocol types for the WebSocket transport: the envelope shape,
//! incoming command payloads, and outgoing event payloads.

use serde::{Deserialize, Serialize};

use crate::track::Track;

/// Generic outgoing envelope: `{type, payload, server_time}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub payload: T,
    pub server_time: f64,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(kind: &'static str, payload: T, now: f64) -> Self {
        Self {
            kind,
            payload,
            server_time: now,
        }
    }
}

/// Raw incoming frame, parsed before dispatch. Payload is re-parsed per
/// command variant so malformed fields surface as `MalformedCommand` rather
/// than a panic.
#[derive(Debug, Deserialize)]
pub struct IncomingEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct SeekPayload {
    pub position: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TrackOrUrl {
    Url(String),
    Track(Track),
}

#[derive(Debug, Deserialize)]
pub struct SetTrackPayload {
    pub track: TrackOrUrl,
    #[serde(default)]
    pub is_playing: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ItemIdPayload {
    pub item_id: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReorderDirection {
    Up,
    Down,
}

#[derive(Debug, Deserialize)]
pub struct ReorderItemPayload {
    pub item_id: String,
    pub direction: ReorderDirection,
}

#[derive(Debug, Deserialize)]
pub struct AddToQueuePayload {
    pub item: Track,
}

#[derive(Debug, Deserialize)]
pub struct PendingDownloadItem {
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub artwork: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    pub video_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AddPendingDownloadPayload {
    pub item: PendingDownloadItem,
}

#[derive(Debug, Deserialize)]
pub struct SetModeratorPayload {
    pub client_ip: String,
    #[serde(default)]
    pub client_port: Option<u16>,
    pub is_moderator: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct PagePayload {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CheckRoomExistsPayload {
    pub slug: String,
}

/// Outgoing payload: `{message}`, sent to the offending sender only.
#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}
