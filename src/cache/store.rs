//! Persistent translation / language-detection cache backed by SQLite.
//! Keys are blake3 hashes of NFC-normalized source text plus the language
//! pair, profile and engine. TTL expiry is applied lazily on read (expired
//! rows are deleted, not just skipped) and per-engine capacity is enforced
//! with an LRU + lowest-hit-count tie-break.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, error, info, warn};
use unicode_normalization::UnicodeNormalization;

use super::{CacheStatistics, LanguageDetectionCacheEntry, TranslationCacheEntry};

/// TTL for translation entries: 7 days.
const TRANSLATION_TTL_DAYS: i64 = 7;
/// TTL for language detection entries: 30 days.
const DETECTION_TTL_DAYS: i64 = 30;
/// Maximum translation entries kept per engine.
const MAX_ENTRIES_PER_ENGINE: u64 = 200;
/// Source texts longer than this (in chars) are never cached. 0 disables.
const CACHE_TEXT_LENGTH_LIMIT: usize = 50;
/// Schema version recorded in the metadata table.
const DB_SCHEMA_VERSION: i64 = 2;

const SECS_PER_DAY: i64 = 86_400;

/// Tunable limits, mostly overridden in tests.
#[derive(Debug, Clone)]
pub struct CacheLimits {
    pub translation_ttl_days: i64,
    pub detection_ttl_days: i64,
    pub max_entries_per_engine: u64,
    pub text_length_limit: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            translation_ttl_days: TRANSLATION_TTL_DAYS,
            detection_ttl_days: DETECTION_TTL_DAYS,
            max_entries_per_engine: MAX_ENTRIES_PER_ENGINE,
            text_length_limit: CACHE_TEXT_LENGTH_LIMIT,
        }
    }
}

/// SQLite-backed cache store. All read-modify-write sequences run under the
/// single connection lock, so concurrent callers never interleave an expiry
/// check with another caller's delete.
pub struct CacheStore {
    conn: Mutex<Connection>,
    limits: CacheLimits,
}

impl CacheStore {
    /// Open (or create) the cache database at the given path.
    pub fn open(db_path: &Path) -> Result<Self, String> {
        Self::open_with(db_path, CacheLimits::default())
    }

    /// Open with explicit limits.
    pub fn open_with(db_path: &Path, limits: CacheLimits) -> Result<Self, String> {
        let conn = Connection::open(db_path)
            .map_err(|e| format!("failed to open cache database: {e}"))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| format!("PRAGMA failed: {e}"))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS translation_cache (
                cache_key TEXT PRIMARY KEY,
                normalized_source TEXT NOT NULL,
                source_lang TEXT NOT NULL,
                target_lang TEXT NOT NULL,
                translation_text TEXT NOT NULL,
                translation_profile TEXT NOT NULL,
                engine TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                last_used_at INTEGER NOT NULL,
                hit_count INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_trans_last_used
                ON translation_cache(last_used_at);
            CREATE INDEX IF NOT EXISTS idx_trans_engine
                ON translation_cache(engine);

            CREATE TABLE IF NOT EXISTS language_detection_cache (
                normalized_source TEXT PRIMARY KEY,
                detected_lang TEXT NOT NULL,
                confidence REAL NOT NULL,
                created_at INTEGER NOT NULL,
                last_used_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_lang_last_used
                ON language_detection_cache(last_used_at);

            CREATE TABLE IF NOT EXISTS cache_metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .map_err(|e| format!("create tables failed: {e}"))?;

        conn.execute(
            "INSERT OR IGNORE INTO cache_metadata (key, value) VALUES ('schema_version', ?1)",
            params![DB_SCHEMA_VERSION.to_string()],
        )
        .map_err(|e| format!("metadata insert failed: {e}"))?;

        let stored_version: Option<String> = conn
            .query_row(
                "SELECT value FROM cache_metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| format!("metadata read failed: {e}"))?;
        if let Some(version) = stored_version {
            if version != DB_SCHEMA_VERSION.to_string() {
                warn!(
                    stored = %version,
                    expected = DB_SCHEMA_VERSION,
                    "cache database schema version mismatch"
                );
            }
        }

        info!(path = %db_path.display(), "cache store opened (WAL mode)");

        Ok(Self {
            conn: Mutex::new(conn),
            limits,
        })
    }

    /// Unicode canonical (NFC) normalization, applied identically at
    /// registration and lookup time.
    pub fn normalize_text(text: &str) -> String {
        text.nfc().collect()
    }

    /// Whether the source text may be cached at all.
    fn is_cache_eligible(&self, source_text: &str) -> bool {
        if source_text.trim().is_empty() {
            return false;
        }
        if self.limits.text_length_limit == 0 {
            return true;
        }
        source_text.chars().count() <= self.limits.text_length_limit
    }

    /// Compute the cache key from normalized inputs. `engine` of None and
    /// `Some("")` both produce the engine-agnostic ("common") key.
    pub fn cache_key(
        normalized_source: &str,
        source_lang: &str,
        target_lang: &str,
        translation_profile: &str,
        engine: Option<&str>,
    ) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(normalized_source.as_bytes());
        hasher.update(b"|");
        hasher.update(source_lang.as_bytes());
        hasher.update(b"|");
        hasher.update(target_lang.as_bytes());
        hasher.update(b"|");
        hasher.update(translation_profile.as_bytes());
        hasher.update(b"|");
        hasher.update(engine.unwrap_or("").as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Translation hash key for a raw source text, shared with the in-flight
    /// manager so both layers agree on request identity. None when the text
    /// is not cache-eligible.
    pub fn translation_hash_key(
        &self,
        source_text: &str,
        source_lang: &str,
        target_lang: &str,
        engine: Option<&str>,
    ) -> Option<String> {
        if !self.is_cache_eligible(source_text) {
            return None;
        }
        let normalized = Self::normalize_text(source_text);
        Some(Self::cache_key(&normalized, source_lang, target_lang, "", engine))
    }

    /// Search for a translation. Tries the engine-specific key first and
    /// falls back to the common (engine-agnostic) key before declaring a
    /// miss. A hit bumps last_used_at / hit_count and the returned entry
    /// reflects the post-update values.
    pub fn search_translation(
        &self,
        source_text: &str,
        source_lang: &str,
        target_lang: &str,
        translation_profile: &str,
        engine: Option<&str>,
    ) -> Option<TranslationCacheEntry> {
        if !self.is_cache_eligible(source_text) {
            return None;
        }
        let normalized = Self::normalize_text(source_text);
        let key = Self::cache_key(&normalized, source_lang, target_lang, translation_profile, engine);

        let conn = self.conn.lock();
        match self.search_translation_locked(&conn, &key) {
            Ok(Some(entry)) => return Some(entry),
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "error searching translation cache");
                return None;
            }
        }

        // Engine-specific miss: fall back to the common cache.
        if engine.map_or(false, |e| !e.is_empty()) {
            debug!(key = &key[..16], "engine-specific cache miss, trying common fallback");
            let common_key =
                Self::cache_key(&normalized, source_lang, target_lang, translation_profile, None);
            match self.search_translation_locked(&conn, &common_key) {
                Ok(Some(entry)) => {
                    debug!("cache hit via common fallback");
                    return Some(entry);
                }
                Ok(None) => {}
                Err(e) => error!(error = %e, "error searching common translation cache"),
            }
        }
        None
    }

    fn search_translation_locked(
        &self,
        conn: &Connection,
        cache_key: &str,
    ) -> rusqlite::Result<Option<TranslationCacheEntry>> {
        let row: Option<TranslationCacheEntry> = conn
            .query_row(
                "SELECT cache_key, normalized_source, source_lang, target_lang,
                        translation_text, translation_profile, engine,
                        created_at, last_used_at, hit_count
                 FROM translation_cache
                 WHERE cache_key = ?1",
                params![cache_key],
                |row| {
                    Ok(TranslationCacheEntry {
                        cache_key: row.get(0)?,
                        normalized_source: row.get(1)?,
                        source_lang: row.get(2)?,
                        target_lang: row.get(3)?,
                        translation_text: row.get(4)?,
                        translation_profile: row.get(5)?,
                        engine: row.get(6)?,
                        created_at: epoch_to_datetime(row.get(7)?),
                        last_used_at: epoch_to_datetime(row.get(8)?),
                        hit_count: row.get(9)?,
                    })
                },
            )
            .optional()?;

        let Some(mut entry) = row else {
            debug!(key = &cache_key[..16], "translation cache miss");
            return Ok(None);
        };

        let now = now_epoch();
        let cutoff = now - self.limits.translation_ttl_days * SECS_PER_DAY;
        if entry.last_used_at.timestamp() < cutoff {
            // Expired: lazily remove the row and treat as a miss.
            conn.execute(
                "DELETE FROM translation_cache WHERE cache_key = ?1",
                params![cache_key],
            )?;
            debug!(key = &cache_key[..16], "translation cache entry expired, deleted");
            return Ok(None);
        }

        conn.execute(
            "UPDATE translation_cache
             SET last_used_at = ?1, hit_count = hit_count + 1
             WHERE cache_key = ?2",
            params![now, cache_key],
        )?;
        entry.last_used_at = epoch_to_datetime(now);
        entry.hit_count += 1;
        debug!(key = &cache_key[..16], hit_count = entry.hit_count, "translation cache hit");
        Ok(Some(entry))
    }

    /// Register a translation result. Replaces any existing entry under the
    /// same key and resets hit_count to 0, then enforces the per-engine
    /// capacity limit.
    pub fn register_translation(
        &self,
        source_text: &str,
        source_lang: &str,
        target_lang: &str,
        translation_text: &str,
        engine: &str,
        translation_profile: &str,
    ) -> bool {
        if !self.is_cache_eligible(source_text) {
            return false;
        }
        let normalized = Self::normalize_text(source_text);
        let key = Self::cache_key(
            &normalized,
            source_lang,
            target_lang,
            translation_profile,
            Some(engine),
        );

        let conn = self.conn.lock();
        let now = now_epoch();
        if let Err(e) = conn.execute(
            "INSERT OR REPLACE INTO translation_cache
             (cache_key, normalized_source, source_lang, target_lang,
              translation_text, translation_profile, engine,
              created_at, last_used_at, hit_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)",
            params![
                key,
                normalized,
                source_lang,
                target_lang,
                translation_text,
                translation_profile,
                engine,
                now,
                now
            ],
        ) {
            error!(error = %e, "error registering translation cache entry");
            return false;
        }
        debug!(key = &key[..16], "translation cached");

        if let Err(e) = self.enforce_capacity_locked(&conn, engine) {
            error!(error = %e, engine, "error enforcing cache capacity limit");
        }
        true
    }

    fn enforce_capacity_locked(&self, conn: &Connection, engine: &str) -> rusqlite::Result<()> {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM translation_cache WHERE engine = ?1",
            params![engine],
            |row| row.get(0),
        )?;
        if count > self.limits.max_entries_per_engine {
            let to_delete = count - self.limits.max_entries_per_engine;
            conn.execute(
                "DELETE FROM translation_cache
                 WHERE cache_key IN (
                     SELECT cache_key FROM translation_cache
                     WHERE engine = ?1
                     ORDER BY last_used_at ASC, hit_count ASC
                     LIMIT ?2
                 )",
                params![engine, to_delete as i64],
            )?;
            info!(deleted = to_delete, engine, "evicted LRU translation cache entries");
        }
        Ok(())
    }

    /// Search the language detection cache. A hit bumps last_used_at;
    /// expired entries are removed and reported as misses.
    pub fn search_language_detection(&self, source_text: &str) -> Option<LanguageDetectionCacheEntry> {
        if !self.is_cache_eligible(source_text) {
            return None;
        }
        let normalized = Self::normalize_text(source_text);
        let conn = self.conn.lock();

        let result: rusqlite::Result<Option<LanguageDetectionCacheEntry>> = (|| {
            let row: Option<LanguageDetectionCacheEntry> = conn
                .query_row(
                    "SELECT normalized_source, detected_lang, confidence,
                            created_at, last_used_at
                     FROM language_detection_cache
                     WHERE normalized_source = ?1",
                    params![normalized],
                    |row| {
                        Ok(LanguageDetectionCacheEntry {
                            normalized_source: row.get(0)?,
                            detected_lang: row.get(1)?,
                            confidence: row.get(2)?,
                            created_at: epoch_to_datetime(row.get(3)?),
                            last_used_at: epoch_to_datetime(row.get(4)?),
                        })
                    },
                )
                .optional()?;

            let Some(mut entry) = row else {
                debug!("language detection cache miss");
                return Ok(None);
            };

            let now = now_epoch();
            let cutoff = now - self.limits.detection_ttl_days * SECS_PER_DAY;
            if entry.last_used_at.timestamp() < cutoff {
                conn.execute(
                    "DELETE FROM language_detection_cache WHERE normalized_source = ?1",
                    params![normalized],
                )?;
                debug!("language detection cache entry expired, deleted");
                return Ok(None);
            }

            conn.execute(
                "UPDATE language_detection_cache SET last_used_at = ?1 WHERE normalized_source = ?2",
                params![now, normalized],
            )?;
            entry.last_used_at = epoch_to_datetime(now);
            debug!(lang = %entry.detected_lang, "language detection cache hit");
            Ok(Some(entry))
        })();

        match result {
            Ok(entry) => entry,
            Err(e) => {
                error!(error = %e, "error searching language detection cache");
                None
            }
        }
    }

    /// Register a language detection result.
    pub fn register_language_detection(
        &self,
        source_text: &str,
        detected_lang: &str,
        confidence: f64,
    ) -> bool {
        if !self.is_cache_eligible(source_text) {
            return false;
        }
        let normalized = Self::normalize_text(source_text);
        let conn = self.conn.lock();
        let now = now_epoch();
        match conn.execute(
            "INSERT OR REPLACE INTO language_detection_cache
             (normalized_source, detected_lang, confidence, created_at, last_used_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![normalized, detected_lang, confidence, now, now],
        ) {
            Ok(_) => {
                debug!(lang = detected_lang, "language detection cached");
                true
            }
            Err(e) => {
                error!(error = %e, "error registering language detection cache entry");
                false
            }
        }
    }

    /// Sweep both tables, deleting every row past its TTL. Intended to run
    /// on a periodic schedule rather than on every access.
    pub fn cleanup_expired(&self) {
        let conn = self.conn.lock();
        let now = now_epoch();

        let trans_cutoff = now - self.limits.translation_ttl_days * SECS_PER_DAY;
        match conn.execute(
            "DELETE FROM translation_cache WHERE last_used_at < ?1",
            params![trans_cutoff],
        ) {
            Ok(deleted) => info!(deleted, "expired translation cache entries removed"),
            Err(e) => error!(error = %e, "error during translation cache cleanup"),
        }

        let detect_cutoff = now - self.limits.detection_ttl_days * SECS_PER_DAY;
        match conn.execute(
            "DELETE FROM language_detection_cache WHERE last_used_at < ?1",
            params![detect_cutoff],
        ) {
            Ok(deleted) => info!(deleted, "expired language detection cache entries removed"),
            Err(e) => error!(error = %e, "error during language detection cache cleanup"),
        }
    }

    /// Aggregate statistics over the translation cache.
    pub fn get_statistics(&self) -> CacheStatistics {
        let conn = self.conn.lock();
        let result: rusqlite::Result<CacheStatistics> = (|| {
            let (total_entries, total_hits): (u64, Option<i64>) = conn.query_row(
                "SELECT COUNT(*), SUM(hit_count) FROM translation_cache",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let mut stats = CacheStatistics {
                total_entries,
                total_hits: total_hits.unwrap_or(0).max(0) as u64,
                ..CacheStatistics::default()
            };

            let mut stmt =
                conn.prepare("SELECT hit_count, COUNT(*) FROM translation_cache GROUP BY hit_count")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, u64>(1)?)))?;
            for row in rows {
                let (hits, count) = row?;
                stats.hit_distribution.insert(hits, count);
            }

            let mut stmt =
                conn.prepare("SELECT engine, COUNT(*) FROM translation_cache GROUP BY engine")?;
            let rows =
                stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))?;
            for row in rows {
                let (engine, count) = row?;
                stats.engine_distribution.insert(engine, count);
            }

            let (oldest, newest): (Option<i64>, Option<i64>) = conn.query_row(
                "SELECT MIN(created_at), MAX(created_at) FROM translation_cache",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            stats.oldest_entry = oldest.map(epoch_to_datetime);
            stats.newest_entry = newest.map(epoch_to_datetime);

            Ok(stats)
        })();

        match result {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "error computing cache statistics");
                CacheStatistics::default()
            }
        }
    }

    /// Dump all translation rows, most-hit first, to a human-readable report.
    pub fn export_detailed(&self, output_path: &Path) -> bool {
        use std::io::Write;

        let conn = self.conn.lock();
        let result: Result<(), String> = (|| {
            let mut stmt = conn
                .prepare(
                    "SELECT cache_key, normalized_source, source_lang, target_lang,
                            translation_text, engine, hit_count, last_used_at
                     FROM translation_cache
                     ORDER BY hit_count DESC, last_used_at DESC",
                )
                .map_err(|e| e.to_string())?;

            let mut file = std::fs::File::create(output_path).map_err(|e| e.to_string())?;
            writeln!(file, "Translation Cache Detailed Export").map_err(|e| e.to_string())?;
            writeln!(file, "{}\n", "=".repeat(80)).map_err(|e| e.to_string())?;

            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, i64>(7)?,
                    ))
                })
                .map_err(|e| e.to_string())?;

            for row in rows {
                let (key, source, src_lang, tgt_lang, translation, engine, hits, last_used) =
                    row.map_err(|e| e.to_string())?;
                writeln!(file, "Cache Key: {key}").map_err(|e| e.to_string())?;
                writeln!(file, "Source: {source}").map_err(|e| e.to_string())?;
                writeln!(file, "Languages: {src_lang} -> {tgt_lang}").map_err(|e| e.to_string())?;
                writeln!(file, "Translation: {translation}").map_err(|e| e.to_string())?;
                writeln!(file, "Engine: {engine}").map_err(|e| e.to_string())?;
                writeln!(file, "Hit Count: {hits}").map_err(|e| e.to_string())?;
                writeln!(file, "Last Used: {}", epoch_to_datetime(last_used).to_rfc3339())
                    .map_err(|e| e.to_string())?;
                writeln!(file, "{}", "-".repeat(80)).map_err(|e| e.to_string())?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                info!(path = %output_path.display(), "cache data exported");
                true
            }
            Err(e) => {
                error!(error = %e, "error exporting cache data");
                false
            }
        }
    }
}

/// Current time as Unix timestamp (seconds).
fn now_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Convert persisted epoch seconds to a timezone-aware datetime.
fn epoch_to_datetime(value: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(value, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> CacheStore {
        CacheStore::open(&dir.path().join("cache.db")).expect("open store")
    }

    /// Force an entry's last_used_at for expiry / eviction tests.
    fn set_last_used(store: &CacheStore, source: &str, engine: &str, epoch: i64) {
        let normalized = CacheStore::normalize_text(source);
        let key = CacheStore::cache_key(&normalized, "en", "ja", "", Some(engine));
        let changed = store
            .conn
            .lock()
            .execute(
                "UPDATE translation_cache SET last_used_at = ?1 WHERE cache_key = ?2",
                params![epoch, key],
            )
            .unwrap();
        assert_eq!(changed, 1);
    }

    fn translation_row_count(store: &CacheStore, engine: &str) -> u64 {
        store
            .conn
            .lock()
            .query_row(
                "SELECT COUNT(*) FROM translation_cache WHERE engine = ?1",
                params![engine],
                |row| row.get(0),
            )
            .unwrap()
    }

    #[test]
    fn miss_then_register_then_hit() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        assert!(store
            .search_translation("Hello world", "en", "ja", "", Some("DeepL"))
            .is_none());
        assert!(store.register_translation("Hello world", "en", "ja", "こんにちは世界", "DeepL", ""));

        let entry = store
            .search_translation("Hello world", "en", "ja", "", Some("DeepL"))
            .expect("hit after registration");
        assert_eq!(entry.translation_text, "こんにちは世界");
        assert_eq!(entry.hit_count, 1);
        assert_eq!(entry.engine, "DeepL");
    }

    #[test]
    fn reregistration_resets_hit_count() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        assert!(store.register_translation("hello", "en", "ja", "やあ", "google", ""));
        // Two hits.
        store.search_translation("hello", "en", "ja", "", Some("google")).unwrap();
        let entry = store.search_translation("hello", "en", "ja", "", Some("google")).unwrap();
        assert_eq!(entry.hit_count, 2);

        // Re-registering replaces the entry and resets the counter.
        assert!(store.register_translation("hello", "en", "ja", "こんにちは", "google", ""));
        let entry = store.search_translation("hello", "en", "ja", "", Some("google")).unwrap();
        assert_eq!(entry.translation_text, "こんにちは");
        assert_eq!(entry.hit_count, 1);
    }

    #[test]
    fn common_fallback_when_engine_key_misses() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        // Only the engine-agnostic entry exists.
        assert!(store.register_translation("good morning", "en", "ja", "おはよう", "", ""));

        let entry = store
            .search_translation("good morning", "en", "ja", "", Some("DeepL"))
            .expect("common fallback hit");
        assert_eq!(entry.engine, "");
        assert_eq!(entry.translation_text, "おはよう");
    }

    #[test]
    fn nfc_and_nfd_forms_hit_the_same_entry() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let nfc = "caf\u{e9}"; // café, composed
        let nfd = "cafe\u{301}"; // café, decomposed
        assert!(store.register_translation(nfc, "fr", "en", "coffee", "google", ""));

        let entry = store
            .search_translation(nfd, "fr", "en", "", Some("google"))
            .expect("unicode-equivalent lookup must hit");
        assert_eq!(entry.translation_text, "coffee");
    }

    #[test]
    fn expired_entry_is_deleted_on_read() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        assert!(store.register_translation("stale", "en", "ja", "古い", "google", ""));
        // Force last_used_at to (now - TTL - 1 day).
        let expired = now_epoch() - (TRANSLATION_TTL_DAYS + 1) * SECS_PER_DAY;
        set_last_used(&store, "stale", "google", expired);

        assert!(store.search_translation("stale", "en", "ja", "", Some("google")).is_none());
        // The read physically removed the row.
        assert_eq!(translation_row_count(&store, "google"), 0);
    }

    #[test]
    fn capacity_eviction_removes_least_recently_used() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open_with(
            &dir.path().join("cache.db"),
            CacheLimits {
                max_entries_per_engine: 5,
                ..CacheLimits::default()
            },
        )
        .unwrap();

        for i in 0..5 {
            assert!(store.register_translation(
                &format!("text {i}"),
                "en",
                "ja",
                &format!("訳 {i}"),
                "google",
                "",
            ));
            // Give each entry a distinct, increasing recency.
            set_last_used(&store, &format!("text {i}"), "google", 1_000 + i);
        }

        // Five more registrations push the five oldest out one by one.
        for i in 5..10 {
            assert!(store.register_translation(
                &format!("text {i}"),
                "en",
                "ja",
                &format!("訳 {i}"),
                "google",
                "",
            ));
        }

        assert_eq!(translation_row_count(&store, "google"), 5);
        // The early, least-recently-used entries are gone.
        for i in 0..5 {
            assert!(store
                .search_translation(&format!("text {i}"), "en", "ja", "", Some("google"))
                .is_none());
        }
        for i in 5..10 {
            assert!(store
                .search_translation(&format!("text {i}"), "en", "ja", "", Some("google"))
                .is_some());
        }
    }

    #[test]
    fn eviction_tie_break_prefers_keeping_higher_hit_count() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open_with(
            &dir.path().join("cache.db"),
            CacheLimits {
                max_entries_per_engine: 2,
                ..CacheLimits::default()
            },
        )
        .unwrap();

        assert!(store.register_translation("alpha", "en", "ja", "ア", "google", ""));
        assert!(store.register_translation("bravo", "en", "ja", "ブ", "google", ""));
        // Same recency for both, but alpha has been reused.
        store.search_translation("alpha", "en", "ja", "", Some("google")).unwrap();
        set_last_used(&store, "alpha", "google", 1_000);
        set_last_used(&store, "bravo", "google", 1_000);

        // Third registration forces one eviction; bravo (hit_count 0) loses.
        assert!(store.register_translation("charlie", "en", "ja", "チ", "google", ""));
        assert!(store.search_translation("bravo", "en", "ja", "", Some("google")).is_none());
        assert!(store.search_translation("alpha", "en", "ja", "", Some("google")).is_some());
    }

    #[test]
    fn blank_or_oversized_text_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        assert!(!store.register_translation("", "en", "ja", "x", "google", ""));
        assert!(!store.register_translation("   ", "en", "ja", "x", "google", ""));
        let long = "a".repeat(CACHE_TEXT_LENGTH_LIMIT + 1);
        assert!(!store.register_translation(&long, "en", "ja", "x", "google", ""));
        assert!(store.search_translation(&long, "en", "ja", "", Some("google")).is_none());
    }

    #[test]
    fn language_detection_roundtrip_and_expiry() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        assert!(store.search_language_detection("bonjour").is_none());
        assert!(store.register_language_detection("bonjour", "fr", 0.93));

        let entry = store.search_language_detection("bonjour").expect("hit");
        assert_eq!(entry.detected_lang, "fr");
        assert!((entry.confidence - 0.93).abs() < f64::EPSILON);

        let expired = now_epoch() - (DETECTION_TTL_DAYS + 1) * SECS_PER_DAY;
        store
            .conn
            .lock()
            .execute(
                "UPDATE language_detection_cache SET last_used_at = ?1",
                params![expired],
            )
            .unwrap();
        assert!(store.search_language_detection("bonjour").is_none());
    }

    #[test]
    fn cleanup_expired_sweeps_both_tables() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.register_translation("old", "en", "ja", "古", "google", "");
        store.register_translation("new", "en", "ja", "新", "google", "");
        store.register_language_detection("vieux", "fr", 1.0);
        let expired = now_epoch() - 400 * SECS_PER_DAY;
        set_last_used(&store, "old", "google", expired);
        store
            .conn
            .lock()
            .execute(
                "UPDATE language_detection_cache SET last_used_at = ?1",
                params![expired],
            )
            .unwrap();

        store.cleanup_expired();
        assert_eq!(translation_row_count(&store, "google"), 1);
        assert!(store.search_language_detection("vieux").is_none());
    }

    #[test]
    fn statistics_reflect_contents() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.register_translation("one", "en", "ja", "一", "google", "");
        store.register_translation("two", "en", "ja", "二", "deepl", "");
        store.search_translation("one", "en", "ja", "", Some("google")).unwrap();

        let stats = store.get_statistics();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.total_hits, 1);
        assert_eq!(stats.engine_distribution.get("google"), Some(&1));
        assert_eq!(stats.engine_distribution.get("deepl"), Some(&1));
        assert!(stats.oldest_entry.is_some());
        assert!(stats.newest_entry.is_some());
    }

    #[test]
    fn export_writes_report() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.register_translation("hello", "en", "ja", "こんにちは", "google", "");

        let out = dir.path().join("export.txt");
        assert!(store.export_detailed(&out));
        let body = std::fs::read_to_string(&out).unwrap();
        assert!(body.contains("hello"));
        assert!(body.contains("en -> ja"));
    }
}
