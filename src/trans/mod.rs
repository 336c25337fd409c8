//! Translation layer: engine interface, bundled engines and the manager that
//! combines them with the cache and in-flight deduplication.

pub mod detect;
pub mod google;
pub mod manager;

use async_trait::async_trait;
use thiserror::Error;

/// Result of a translation or language detection call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransResult {
    /// Translated text. Engines without a dedicated detection API also fill
    /// this during detection.
    pub text: Option<String>,
    pub detected_source_lang: Option<String>,
    /// Engine-specific extra data (billed characters, model name, ...).
    pub metadata: Option<serde_json::Value>,
}

/// Character quota reported by a translation engine.
#[derive(Debug, Clone, Default)]
pub struct CharacterQuota {
    pub count: u64,
    pub limit: u64,
    pub is_quota_valid: bool,
}

/// Translation error taxonomy. Cloneable so an in-flight producer's failure
/// can be propagated to every waiter.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransError {
    #[error("translation API error: {0}")]
    Api(String),
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("translation quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("unsupported language pair: {0}")]
    UnsupportedLanguagePair(String),
    #[error("translation timeout")]
    Timeout,
    /// Timeout-class error for in-flight waits; the message distinguishes a
    /// plain timeout from teardown cancellation.
    #[error("{0}")]
    InflightTimeout(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl TransError {
    /// Whether this error belongs to the in-flight timeout class.
    pub fn is_inflight_timeout(&self) -> bool {
        matches!(self, TransError::InflightTimeout(_))
    }
}

/// Pluggable translation engine.
#[async_trait]
pub trait Translator: Send + Sync {
    fn engine_name(&self) -> &str;

    /// Engines without a dedicated detection endpoint return the translation
    /// produced while detecting; callers may reuse it.
    fn has_dedicated_detection_api(&self) -> bool {
        false
    }

    /// Classify an error as rate limiting for the adaptive limiter.
    fn is_rate_limit_error(&self, err: &TransError) -> bool {
        matches!(err, TransError::RateLimited { .. })
    }

    async fn detect_language(&self, content: &str, tgt_lang: &str) -> Result<TransResult, TransError>;

    async fn translation(
        &self,
        content: &str,
        tgt_lang: &str,
        src_lang: Option<&str>,
    ) -> Result<TransResult, TransError>;

    async fn get_quota_status(&self) -> Result<CharacterQuota, TransError>;

    async fn close(&self) {}
}
