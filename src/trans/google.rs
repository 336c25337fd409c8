//! Google web translation engine.
//! Talks to the free `translate_a/single` endpoint with a pooled client.
//! There is no dedicated detection API: detection is a translation call whose
//! response carries the detected source language, so the translated text is
//! returned alongside it for reuse.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::{CharacterQuota, TransError, TransResult, Translator};

const ENGINE_NAME: &str = "google";
const BASE_URL: &str = "https://translate.googleapis.com/translate_a/single";
/// The web endpoint rejects very long inputs.
const MAX_TEXT_LENGTH: usize = 5_000;

pub struct GoogleTranslator {
    http: reqwest::Client,
    base_url: String,
}

impl GoogleTranslator {
    pub fn new() -> Result<Self, TransError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransError::Api(e.to_string()))?;

        Ok(Self {
            http,
            base_url: BASE_URL.to_string(),
        })
    }

    #[cfg(test)]
    fn with_base_url(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    async fn request(
        &self,
        content: &str,
        tgt_lang: &str,
        src_lang: Option<&str>,
    ) -> Result<TransResult, TransError> {
        if content.is_empty() {
            return Err(TransError::InvalidInput("empty content".into()));
        }
        if content.chars().count() > MAX_TEXT_LENGTH {
            return Err(TransError::InvalidInput(format!(
                "content exceeds {MAX_TEXT_LENGTH} characters"
            )));
        }

        let sl = src_lang.filter(|s| !s.is_empty()).unwrap_or("auto");
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("client", "gtx"),
                ("sl", sl),
                ("tl", tgt_lang),
                ("dt", "t"),
                ("q", content),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransError::Timeout
                } else {
                    TransError::Api(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(|secs| secs * 1_000)
                .unwrap_or(0);
            warn!(retry_after_ms, "google endpoint rate limited");
            return Err(TransError::RateLimited { retry_after_ms });
        }
        if status.as_u16() == 400 {
            // The endpoint answers 400 for unknown language codes.
            return Err(TransError::UnsupportedLanguagePair(format!(
                "sl={sl}, tl={tgt_lang}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransError::Api(format!(
                "unexpected status {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| TransError::Api(format!("response parse error: {e}")))?;
        parse_response(&payload)
    }
}

/// Extract translated text and detected source language from the nested
/// array response: `[[["<tgt>","<src>",..],..],null,"<lang>",..]`.
fn parse_response(payload: &Value) -> Result<TransResult, TransError> {
    let sentences = payload
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| TransError::Api("unrecognized response format".into()))?;

    let mut text = String::new();
    for sentence in sentences {
        if let Some(part) = sentence.get(0).and_then(Value::as_str) {
            text.push_str(part);
        }
    }

    let detected = payload.get(2).and_then(Value::as_str).map(str::to_string);
    debug!(detected = detected.as_deref().unwrap_or("?"), "google translation completed");

    Ok(TransResult {
        text: Some(text),
        detected_source_lang: detected,
        metadata: Some(serde_json::json!({ "engine": ENGINE_NAME })),
    })
}

#[async_trait]
impl Translator for GoogleTranslator {
    fn engine_name(&self) -> &str {
        ENGINE_NAME
    }

    async fn detect_language(&self, content: &str, tgt_lang: &str) -> Result<TransResult, TransError> {
        self.request(content, tgt_lang, None).await
    }

    async fn translation(
        &self,
        content: &str,
        tgt_lang: &str,
        src_lang: Option<&str>,
    ) -> Result<TransResult, TransError> {
        self.request(content, tgt_lang, src_lang).await
    }

    async fn get_quota_status(&self) -> Result<CharacterQuota, TransError> {
        // The free web endpoint has no quota accounting.
        Ok(CharacterQuota {
            count: 0,
            limit: 0,
            is_quota_valid: false,
        })
    }
}
