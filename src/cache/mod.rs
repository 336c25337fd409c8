//! Translation cache subsystem: persistent SQLite store plus in-flight
//! request deduplication.

pub mod inflight;
pub mod store;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// One row of the translation cache.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationCacheEntry {
    pub cache_key: String,
    pub normalized_source: String,
    pub source_lang: String,
    pub target_lang: String,
    pub translation_text: String,
    /// Translation style identifier; empty means "common".
    pub translation_profile: String,
    /// Engine name; empty means engine-agnostic fallback entry.
    pub engine: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub hit_count: i64,
}

/// One row of the language detection cache.
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageDetectionCacheEntry {
    pub normalized_source: String,
    pub detected_lang: String,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// Aggregate cache statistics, computed on demand and never persisted.
#[derive(Debug, Clone, Default)]
pub struct CacheStatistics {
    pub total_entries: u64,
    pub total_hits: u64,
    /// hit_count -> number of entries with that count.
    pub hit_distribution: HashMap<i64, u64>,
    /// engine name -> number of entries.
    pub engine_distribution: HashMap<String, u64>,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}
