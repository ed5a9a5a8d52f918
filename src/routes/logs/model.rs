use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::usage::NewApiLog;

#[derive(Debug, Deserialize)]
pub struct RecordLogRequest {
    pub client_id: String,
    pub ip: String,
    pub endpoint: String,
}

impl RecordLogRequest {
    pub fn validate(self) -> Result<NewApiLog, AppError> {
        let client_id = Uuid::parse_str(self.client_id.trim())
            .map_err(|_| AppError::BadRequest("invalid client_id format".into()))?;

        let ip = self.ip.trim();
        if ip.is_empty() {
            return Err(AppError::BadRequest("IP address is required".into()));
        }
        ip.parse::<IpAddr>()
            .map_err(|_| AppError::BadRequest("invalid IP address format".into()))?;

        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(AppError::BadRequest("endpoint is required".into()));
        }

        Ok(NewApiLog {
            client_id,
            ip: ip.to_string(),
            endpoint: endpoint.to_string(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordLogResponse {
    pub log_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub remaining_requests: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(client_id: &str, ip: &str, endpoint: &str) -> RecordLogRequest {
        RecordLogRequest {
            client_id: client_id.into(),
            ip: ip.into(),
            endpoint: endpoint.into(),
        }
    }

    #[test]
    fn accepts_v4_and_v6_addresses() {
        let id = Uuid::new_v4().to_string();
        assert!(request(&id, "192.168.1.100", "/v1/users").validate().is_ok());
        assert!(request(&id, "::1", "/v1/users").validate().is_ok());
    }

    #[test]
    fn rejects_bad_fields() {
        let id = Uuid::new_v4().to_string();
        assert!(matches!(
            request("not-a-uuid", "10.0.0.1", "/v1").validate(),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            request(&id, "999.1.1.1", "/v1").validate(),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            request(&id, "10.0.0.1", "  ").validate(),
            Err(AppError::BadRequest(_))
        ));
    }
}
