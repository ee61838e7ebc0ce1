//! Server-Sent-Event framing and message decoding.

use homelink_core::{ApplianceEvent, ApplianceId, DeviceConnectivity};
use serde::Deserialize;
use tracing::debug;

/// One complete SSE event frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// `id:` field, carrying the appliance id on this platform.
    pub id: Option<String>,

    /// `event:` field.
    pub event: Option<String>,

    /// Joined `data:` lines.
    pub data: String,
}

/// A parsed unit of the SSE byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// A complete event.
    Event(SseEvent),

    /// A comment line (`: ...`), used by providers as keep-alive.
    Comment(String),
}

/// Incremental SSE parser.
///
/// Fed raw chunks; yields complete frames. Chunk boundaries may fall
/// anywhere, including inside a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    id: Option<String>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    /// Create an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.finish_event().map(SseFrame::Event);
        }

        if let Some(comment) = line.strip_prefix(':') {
            return Some(SseFrame::Comment(comment.trim_start().to_string()));
        }

        let (field, value) = line
            .split_once(':')
            .map_or((line, ""), |(f, v)| (f, v.strip_prefix(' ').unwrap_or(v)));

        match field {
            "id" => self.id = Some(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // "retry" and unknown fields are ignored.
            _ => {}
        }
        None
    }

    fn finish_event(&mut self) -> Option<SseEvent> {
        if self.id.is_none() && self.event.is_none() && self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            id: self.id.take(),
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

/// A platform message decoded from a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// State-change items for one appliance.
    Events {
        /// The appliance the items belong to.
        appliance_id: ApplianceId,
        /// The items, in arrival order.
        events: Vec<ApplianceEvent>,
    },

    /// Appliance connectivity changed.
    Connectivity {
        /// The appliance whose connectivity changed.
        appliance_id: ApplianceId,
        /// New connectivity.
        connectivity: DeviceConnectivity,
    },
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(default)]
    items: Vec<EventItem>,
    #[serde(default, rename = "applianceId", alias = "haId")]
    appliance_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventItem {
    key: String,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
}

/// Decode an SSE event into a platform message.
///
/// Keep-alives decode to `None`; so do unknown event names and events whose
/// appliance cannot be determined (both logged and dropped).
///
/// # Errors
/// Returns a JSON error if a data payload is present but malformed.
pub fn decode_frame(frame: &SseEvent) -> Result<Option<StreamMessage>, serde_json::Error> {
    let name = frame.event.as_deref().unwrap_or_default();

    match name {
        "KEEP-ALIVE" => Ok(None),
        "CONNECTED" | "DISCONNECTED" => {
            let Some(appliance_id) = resolve_appliance_id(frame)? else {
                debug!(event = name, "Connectivity event without appliance id, dropping");
                return Ok(None);
            };
            let connectivity = if name == "CONNECTED" {
                DeviceConnectivity::Connected
            } else {
                DeviceConnectivity::Disconnected
            };
            Ok(Some(StreamMessage::Connectivity {
                appliance_id,
                connectivity,
            }))
        }
        "STATUS" | "NOTIFY" | "EVENT" => {
            let Some(appliance_id) = resolve_appliance_id(frame)? else {
                debug!(event = name, "Event without appliance id, dropping");
                return Ok(None);
            };
            let payload: EventPayload = serde_json::from_str(&frame.data)?;
            let events = payload
                .items
                .into_iter()
                .map(|item| ApplianceEvent {
                    appliance_id: appliance_id.clone(),
                    key: item.key,
                    value: item.value,
                    unit: item.unit,
                    timestamp: item.timestamp,
                })
                .collect();
            Ok(Some(StreamMessage::Events {
                appliance_id,
                events,
            }))
        }
        other => {
            debug!(event = other, "Unknown stream event name, dropping");
            Ok(None)
        }
    }
}

fn resolve_appliance_id(frame: &SseEvent) -> Result<Option<ApplianceId>, serde_json::Error> {
    if let Some(id) = frame.id.as_deref().filter(|id| !id.is_empty()) {
        return Ok(Some(ApplianceId::from(id)));
    }
    if frame.data.is_empty() {
        return Ok(None);
    }
    let payload: EventPayload = serde_json::from_str(&frame.data)?;
    Ok(payload.appliance_id.map(ApplianceId::new))
}
