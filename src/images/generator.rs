use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::config::GeneratorConfig;

const FALLBACK_CONTENT_TYPE: &str = "image/png";

/// Binary image returned by the generator.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub body: Bytes,
    pub content_type: String,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> anyhow::Result<GeneratedImage>;
}

/// Calls `POST {base_url}/generate` with `{"prompt": ...}` and expects raw image bytes back.
#[derive(Clone)]
pub struct HttpImageGenerator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpImageGenerator {
    pub fn new(cfg: &GeneratorConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build image API client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/generate", cfg.base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    async fn generate(&self, prompt: &str) -> anyhow::Result<GeneratedImage> {
        let res = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await
            .context("image API request")?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            let text: String = text.chars().take(200).collect();
            anyhow::bail!("image API responded with {}: {}", status, text);
        }

        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());
        if content_type == "application/json" || content_type.starts_with("text/") {
            anyhow::bail!("image API returned {} instead of an image", content_type);
        }
        let content_type = if content_type.starts_with("image/") {
            content_type
        } else {
            FALLBACK_CONTENT_TYPE.to_string()
        };

        let body = res.bytes().await.context("read image API body")?;
        anyhow::ensure!(!body.is_empty(), "image API returned an empty body");

        debug!(bytes = body.len(), %content_type, "image generated");
        Ok(GeneratedImage { body, content_type })
    }
}
