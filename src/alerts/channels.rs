//! Alert channel implementations

use super::delivery::{DeliveryError, DeliveryJob};
use crate::config::EmailSettings;
use std::time::Duration;
use tracing::info;

/// Trait for alert channels
pub trait AlertChannel: Send + Sync {
    fn send(&mut self, job: &DeliveryJob) -> Result<(), DeliveryError>;
    fn id(&self) -> &str;
    fn name(&self) -> &str;
}

/// E-mail alerts through the EmailJS REST API.
pub struct EmailJsChannel {
    id: String,
    endpoint: String,
    service_id: Option<String>,
    template_id: Option<String>,
    public_key: Option<String>,
    timeout: Duration,
}

impl EmailJsChannel {
    pub fn from_settings(settings: &EmailSettings) -> Self {
        Self {
            id: "emailjs".to_string(),
            endpoint: settings.endpoint.clone(),
            service_id: settings.service_id.clone(),
            template_id: settings.template_id.clone(),
            public_key: settings.public_key.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    pub fn is_configured(&self) -> bool {
        [&self.service_id, &self.template_id, &self.public_key]
            .iter()
            .all(|v| v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false))
    }

    /// Request body for the send endpoint, or `NotConfigured` when a key is missing.
    pub fn payload(&self, job: &DeliveryJob) -> Result<serde_json::Value, DeliveryError> {
        let (Some(service_id), Some(template_id), Some(public_key)) =
            (&self.service_id, &self.template_id, &self.public_key)
        else {
            return Err(DeliveryError::NotConfigured(
                "EmailJS service id, template id or public key missing".to_string(),
            ));
        };
        if !self.is_configured() {
            return Err(DeliveryError::NotConfigured(
                "EmailJS keys must not be empty".to_string(),
            ));
        }
        let n = &job.notification;
        let message = if n.message.is_empty() {
            n.value.clone()
        } else {
            n.message.clone()
        };
        Ok(serde_json::json!({
            "service_id": service_id,
            "template_id": template_id,
            "user_id": public_key,
            "template_params": {
                "to_email": job.recipient,
                "subject": format!("KRISHIPATH Alert • {} • {}", n.kind, n.truck),
                "message": message,
                "severity": n.severity.as_str(),
                "truck": n.truck,
                "category": n.category.as_str(),
                "value": n.value,
                "timestamp": n.timestamp.to_rfc3339(),
            }
        }))
    }
}

/// 429 and 5xx are worth retrying; any other non-success status is not.
pub fn classify_status(status: reqwest::StatusCode) -> Result<(), DeliveryError> {
    if status.is_success() {
        Ok(())
    } else if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        Err(DeliveryError::Transient(format!("HTTP {}", status)))
    } else {
        Err(DeliveryError::Permanent(format!("HTTP {}", status)))
    }
}

impl AlertChannel for EmailJsChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "EmailJS"
    }

    fn send(&mut self, job: &DeliveryJob) -> Result<(), DeliveryError> {
        let payload = self.payload(job)?;

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| DeliveryError::Permanent(format!("HTTP client: {}", e)))?;

        let response = client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .map_err(|e| DeliveryError::Transient(e.to_string()))?;

        classify_status(response.status())
    }
}

/// Writes alerts to the log. Always succeeds.
pub struct LogChannel {
    id: String,
}

impl LogChannel {
    pub fn new() -> Self {
        Self {
            id: "log".to_string(),
        }
    }
}

impl Default for LogChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertChannel for LogChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Log"
    }

    fn send(&mut self, job: &DeliveryJob) -> Result<(), DeliveryError> {
        let n = &job.notification;
        info!(
            "Alert [{}] {} {}: {} ({}) -> {}",
            n.severity.as_str(),
            n.kind,
            n.truck,
            n.message,
            n.value,
            job.recipient
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertKind, Notification, Severity};
    use chrono::{TimeZone, Utc};

    fn configured() -> EmailSettings {
        EmailSettings {
            service_id: Some("service_1".to_string()),
            template_id: Some("template_1".to_string()),
            public_key: Some("pk_1".to_string()),
            ..EmailSettings::default()
        }
    }

    fn job() -> DeliveryJob {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap();
        DeliveryJob {
            notification: Notification::new(
                AlertKind::Connection,
                "GJ-01-LIVE",
                "GJ-01-LIVE: connection lost / no signal".to_string(),
                "Offline".to_string(),
                Severity::Critical,
                ts,
            ),
            recipient: "ops@example.com".to_string(),
        }
    }

    #[test]
    fn test_payload_shape() {
        let channel = EmailJsChannel::from_settings(&configured());
        let payload = channel.payload(&job()).unwrap();
        assert_eq!(payload["service_id"], "service_1");
        assert_eq!(payload["user_id"], "pk_1");
        let params = &payload["template_params"];
        assert_eq!(params["to_email"], "ops@example.com");
        assert_eq!(params["subject"], "KRISHIPATH Alert • connection • GJ-01-LIVE");
        assert_eq!(params["category"], "fleet");
        assert_eq!(params["severity"], "critical");
        assert_eq!(params["value"], "Offline");
        assert_eq!(params["timestamp"], "2024-05-01T10:30:00+00:00");
    }

    #[test]
    fn test_missing_keys_are_not_configured() {
        let mut channel = EmailJsChannel::from_settings(&EmailSettings::default());
        assert!(!channel.is_configured());
        assert!(matches!(
            channel.send(&job()),
            Err(DeliveryError::NotConfigured(_))
        ));

        let mut settings = configured();
        settings.public_key = Some(" ".to_string());
        let channel = EmailJsChannel::from_settings(&settings);
        assert!(matches!(
            channel.payload(&job()),
            Err(DeliveryError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_status_classification() {
        use reqwest::StatusCode;
        assert!(classify_status(StatusCode::OK).is_ok());
        assert!(classify_status(StatusCode::BAD_GATEWAY)
            .unwrap_err()
            .is_retryable());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS)
            .unwrap_err()
            .is_retryable());
        assert!(!classify_status(StatusCode::BAD_REQUEST)
            .unwrap_err()
            .is_retryable());
    }

    #[test]
    fn test_log_channel_always_succeeds() {
        let mut channel = LogChannel::new();
        assert!(channel.send(&job()).is_ok());
        assert_eq!(channel.id(), "log");
    }
}
