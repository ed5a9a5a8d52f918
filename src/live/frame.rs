use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

/// 推送给客户端的一帧
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveFrame {
    pub event: String,
    pub data: Value,
}

impl LiveFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn connected(session_id: Uuid, topic: &str, message: &str) -> Self {
        Self::new(
            "connected",
            json!({
                "message": message,
                "session_id": session_id,
                "topic": topic,
                "timestamp": Utc::now(),
            }),
        )
    }

    pub fn heartbeat() -> Self {
        Self::new("heartbeat", json!({ "timestamp": Utc::now() }))
    }

    /// `event: <type>\ndata: <json>\n\n`
    pub fn encode(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_as_text_event() {
        let frame = LiveFrame::new("update", json!({"a": "line\nbreak"}));
        assert_eq!(
            frame.encode(),
            "event: update\ndata: {\"a\":\"line\\nbreak\"}\n\n"
        );
    }

    #[test]
    fn connected_frame_carries_session_id() {
        let id = Uuid::new_v4();
        let frame = LiveFrame::connected(id, "api_logs:updates", "hello");
        assert_eq!(frame.event, "connected");
        assert_eq!(frame.data["session_id"], id.to_string());
        assert!(frame.data["timestamp"].is_string());
    }
}
