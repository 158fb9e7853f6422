use std::sync::Arc;

use aws_sdk_s3::primitives::ByteStream;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::config::StorageSettings;
use crate::error::{AppError, AppResult};

/// Object storage for message attachments.
#[derive(Clone)]
pub struct StorageService {
    client: Arc<aws_sdk_s3::Client>,
    bucket: String,
    base_url: Option<String>,
}

impl StorageService {
    pub async fn from_settings(settings: StorageSettings) -> Self {
        let aws_config = aws_config::load_from_env().await;
        Self {
            client: Arc::new(aws_sdk_s3::Client::new(&aws_config)),
            bucket: settings.bucket,
            base_url: settings.base_url,
        }
    }

    fn random_key(prefix: &str) -> String {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        format!("{prefix}/{}", hex::encode(bytes))
    }

    /// Public URL for a stored object.
    pub fn url_for(&self, key: &str) -> String {
        match &self.base_url {
            Some(base) => format!("{}/{key}", base.trim_end_matches('/')),
            None => format!("https://{}.s3.amazonaws.com/{key}", self.bucket),
        }
    }

    /// Upload a chat image under a random key and return its public URL.
    pub async fn upload_image(&self, data: Vec<u8>) -> AppResult<String> {
        let key = Self::random_key("chat-images");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("image/jpeg")
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        tracing::debug!(key, "image uploaded");
        Ok(self.url_for(&key))
    }

    pub async fn delete(&self, key: &str) -> AppResult<bool> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        Ok(true)
    }

    pub async fn exists(&self, key: &str) -> AppResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(AppError::Storage(service_err.to_string()))
                }
            }
        }
    }
}
