//! Anomaly events
//!
//! Scanners raise protocol anomalies as fire-and-forget events. Each event
//! is emitted as a structured JSON log record and queued on the session so
//! the host can hand it to its event queue.

use log::warn;
use serde::Serialize;

/// Generator id of client-side HTTP anomalies
pub const GID_HTTP_CLIENT: u32 = 119;
/// Generator id of HTTP anomalies seen in either direction
pub const GID_HTTP: u32 = 120;

/// Anomaly kinds raised while looking for message boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// HTTP/0.9 request (no version, no headers)
    SimpleRequest,
    /// POST without Content-Length or chunked encoding
    UnboundedPost,
    /// Body size or chunk size unusable (overflow, garbage, or missing)
    MessageSizeException,
}

impl AnomalyKind {
    /// (generator id, signature id)
    pub fn ids(self) -> (u32, u32) {
        match self {
            AnomalyKind::SimpleRequest => (GID_HTTP_CLIENT, 32),
            AnomalyKind::UnboundedPost => (GID_HTTP_CLIENT, 35),
            AnomalyKind::MessageSizeException => (GID_HTTP, 8),
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            AnomalyKind::SimpleRequest => "(http_inspect) SIMPLE REQUEST",
            AnomalyKind::UnboundedPost => {
                "(http_inspect) UNBOUNDED POST WITHOUT CONTENT-LENGTH OR CHUNKS"
            }
            AnomalyKind::MessageSizeException => {
                "(http_inspect) MESSAGE WITH INVALID CONTENT-LENGTH OR CHUNK SIZE"
            }
        }
    }
}

/// One anomaly
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnomalyEvent {
    pub kind: AnomalyKind,
    pub generator_id: u32,
    pub signature_id: u32,
    pub message: &'static str,
    /// Offending value, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AnomalyEvent {
    pub fn new(kind: AnomalyKind) -> Self {
        let (generator_id, signature_id) = kind.ids();
        Self {
            kind,
            generator_id,
            signature_id,
            message: kind.message(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: &str) -> Self {
        self.detail = Some(detail.to_string());
        self
    }

    /// Log the event
    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(json) => warn!("[PAF-ANOMALY] {}", json),
            Err(e) => {
                warn!("Failed to serialize anomaly event: {}", e);
            }
        }
    }
}

/// Destination for anomaly events
pub trait EventSink {
    fn post(&mut self, event: AnomalyEvent);
}

impl EventSink for Vec<AnomalyEvent> {
    fn post(&mut self, event: AnomalyEvent) {
        self.push(event);
    }
}

/// Create a simple request event
pub fn simple_request() -> AnomalyEvent {
    AnomalyEvent::new(AnomalyKind::SimpleRequest)
}

/// Create an unbounded POST event
pub fn unbounded_post() -> AnomalyEvent {
    AnomalyEvent::new(AnomalyKind::UnboundedPost)
}

/// Create a message size exception event
pub fn message_size(detail: &str) -> AnomalyEvent {
    AnomalyEvent::new(AnomalyKind::MessageSizeException).with_detail(detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = message_size("content-length overflow");

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("message_size_exception"));
        assert!(json.contains("\"generator_id\":120"));
        assert!(json.contains("\"signature_id\":8"));
        assert!(json.contains("content-length overflow"));
    }

    #[test]
    fn test_detail_omitted_when_absent() {
        let json = serde_json::to_string(&unbounded_post()).unwrap();
        assert!(!json.contains("detail"));
        assert!(json.contains("unbounded_post"));
    }

    #[test]
    fn test_ids() {
        assert_eq!(simple_request().generator_id, GID_HTTP_CLIENT);
        assert_eq!(AnomalyKind::UnboundedPost.ids(), (119, 35));
        assert_eq!(AnomalyKind::MessageSizeException.ids(), (120, 8));
    }

    #[test]
    fn test_vec_sink() {
        let mut sink: Vec<AnomalyEvent> = Vec::new();
        sink.post(simple_request());
        assert_eq!(sink[0].kind, AnomalyKind::SimpleRequest);
    }
}
