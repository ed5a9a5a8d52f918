use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 事件总线上传递的消息信封，不持久化
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_type_field() {
        let envelope = EventEnvelope::new("log_recorded", json!({"endpoint": "/v1/users"}));
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["type"], "log_recorded");
        assert_eq!(value["data"]["endpoint"], "/v1/users");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn rejects_payload_without_envelope_fields() {
        assert!(serde_json::from_str::<EventEnvelope>(r#"{"data": 1}"#).is_err());
        assert!(serde_json::from_str::<EventEnvelope>("not json").is_err());
    }
}
