use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::SmsSettings;
use crate::error::{AppError, AppResult};

const SMS_API_BASE: &str = "https://sens.apigw.ntruss.com";

/// SMS delivery collaborator (SENS-style gateway with HMAC-signed requests).
#[derive(Clone)]
pub struct SmsClient {
    settings: SmsSettings,
    http: reqwest::Client,
}

impl SmsClient {
    pub fn new(settings: SmsSettings) -> Self {
        Self {
            settings,
            http: reqwest::Client::new(),
        }
    }

    fn sign(&self, method: &str, uri: &str, timestamp: i64) -> AppResult<String> {
        let message = format!("{method} {uri}\n{timestamp}\n{}", self.settings.access_key);
        let mut mac = Hmac::<Sha256>::new_from_slice(self.settings.secret_key.as_bytes())
            .map_err(|_| AppError::Config("invalid sms secret key".into()))?;
        mac.update(message.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    pub async fn send(&self, phone: &str, content: &str) -> AppResult<()> {
        let uri = format!("/sms/v2/services/{}/messages", self.settings.service_id);
        let timestamp = chrono::Utc::now().timestamp_millis();
        let signature = self.sign("POST", &uri, timestamp)?;

        let body = serde_json::json!({
            "type": "SMS",
            "from": self.settings.calling_number,
            "content": content,
            "messages": [{ "to": phone }],
        });

        let response = self
            .http
            .post(format!("{SMS_API_BASE}{uri}"))
            .header("x-ncp-apigw-timestamp", timestamp.to_string())
            .header("x-ncp-iam-access-key", &self.settings.access_key)
            .header("x-ncp-apigw-signature-v2", signature)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::DeliveryFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::DeliveryFailed(format!(
                "sms gateway returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SmsClient {
        SmsClient::new(SmsSettings {
            service_id: "svc".into(),
            access_key: "access".into(),
            secret_key: "secret".into(),
            calling_number: "01000000000".into(),
        })
    }

    #[test]
    fn signature_is_deterministic_for_same_request() {
        let client = client();
        let a = client.sign("POST", "/sms/v2/services/svc/messages", 1700000000000).unwrap();
        let b = client.sign("POST", "/sms/v2/services/svc/messages", 1700000000000).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn signature_varies_with_timestamp() {
        let client = client();
        let a = client.sign("POST", "/x", 1).unwrap();
        let b = client.sign("POST", "/x", 2).unwrap();
        assert_ne!(a, b);
    }
}
