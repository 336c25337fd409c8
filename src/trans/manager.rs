//! Translation orchestration.
//! Owns the engine instances and the active-engine list, applies the
//! adaptive rate limiter, and combines the persistent cache with in-flight
//! deduplication so identical concurrent requests trigger a single
//! external call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::cache::inflight::InFlightManager;
use crate::cache::store::CacheStore;
use crate::config::TranslationSettings;
use crate::trans::google::GoogleTranslator;
use crate::trans::{detect, CharacterQuota, TransError, TransResult, Translator};

const ADAPTIVE_LIMITER_BASE_COOLDOWN: Duration = Duration::from_secs(1);
const ADAPTIVE_LIMITER_MAX_COOLDOWN: Duration = Duration::from_secs(30);
const ADAPTIVE_LIMITER_RESET: Duration = Duration::from_secs(60);
const ADAPTIVE_LIMITER_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Language codes accepted in forced-language prefixes like "en:ja:".
const KNOWN_LANG_CODES: &[&str] = &[
    "en", "ja", "zh", "zh-CN", "zh-TW", "ko", "fr", "de", "es", "ru", "pt", "it", "ar", "hi",
    "tr", "vi", "th", "nl", "pl", "uk", "id",
];

/// Translation request state threaded through detection and translation.
#[derive(Debug, Clone)]
pub struct TranslationInfo {
    pub content: String,
    pub src_lang: Option<String>,
    /// Empty until the target language is determined.
    pub tgt_lang: String,
    pub translated_text: String,
    pub is_translate: bool,
}

impl TranslationInfo {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            src_lang: None,
            tgt_lang: String::new(),
            translated_text: String::new(),
            is_translate: true,
        }
    }
}

/// Exponential backoff applied when an engine reports rate limiting.
struct AdaptiveRateLimiter {
    error_count: u32,
    last_error: Option<Instant>,
    until: Option<Instant>,
    last_log: Option<Instant>,
}

impl AdaptiveRateLimiter {
    fn new() -> Self {
        Self {
            error_count: 0,
            last_error: None,
            until: None,
            last_log: None,
        }
    }

    fn blocked(&mut self) -> bool {
        let now = Instant::now();
        if let Some(until) = self.until {
            if now < until {
                let should_log = self
                    .last_log
                    .map_or(true, |t| now.duration_since(t) >= ADAPTIVE_LIMITER_LOG_INTERVAL);
                if should_log {
                    let remaining = until.duration_since(now).as_secs_f64();
                    warn!(remaining_sec = remaining, "translation temporarily throttled");
                    self.last_log = Some(now);
                }
                return true;
            }
        }
        false
    }

    fn register(&mut self) {
        let now = Instant::now();
        if self
            .last_error
            .map_or(false, |t| now.duration_since(t) > ADAPTIVE_LIMITER_RESET)
        {
            self.error_count = 0;
        }
        self.error_count += 1;
        self.last_error = Some(now);

        let backoff = ADAPTIVE_LIMITER_BASE_COOLDOWN
            .saturating_mul(1u32 << (self.error_count - 1).min(16))
            .min(ADAPTIVE_LIMITER_MAX_COOLDOWN);
        let candidate = now + backoff;
        self.until = Some(self.until.map_or(candidate, |u| u.max(candidate)));
    }
}

type EngineConstructor = fn() -> Result<Arc<dyn Translator>, TransError>;

/// Known engines, registered explicitly at startup.
fn engine_constructors() -> Vec<(&'static str, EngineConstructor)> {
    vec![("google", || Ok(Arc::new(GoogleTranslator::new()?)))]
}

/// Manager for translation engines, caching and in-flight deduplication.
pub struct TransManager {
    settings: TranslationSettings,
    engines: HashMap<String, Arc<dyn Translator>>,
    /// Active engine names in priority order; the head is the current engine.
    active_engines: Mutex<Vec<String>>,
    cache: Option<Arc<CacheStore>>,
    inflight: Option<Arc<InFlightManager>>,
    limiter: Mutex<AdaptiveRateLimiter>,
    lang_prefix_two: Regex,
    lang_prefix_one: Regex,
}

impl TransManager {
    pub fn new(
        settings: TranslationSettings,
        cache: Option<Arc<CacheStore>>,
        inflight: Option<Arc<InFlightManager>>,
    ) -> Self {
        Self {
            settings,
            engines: HashMap::new(),
            active_engines: Mutex::new(Vec::new()),
            cache,
            inflight,
            limiter: Mutex::new(AdaptiveRateLimiter::new()),
            lang_prefix_two: Regex::new(
                r"(?:^|\s)(?P<lang1>[A-Za-z]{2,3}(?:-[A-Za-z]{2})?):(?P<lang2>[A-Za-z]{2,3}(?:-[A-Za-z]{2})?):",
            )
            .expect("two-language pattern must compile"),
            lang_prefix_one: Regex::new(r"(?:^|\s)(?P<lang>[A-Za-z]{2,3}(?:-[A-Za-z]{2})?):")
                .expect("one-language pattern must compile"),
        }
    }

    /// Instantiate the configured engines. Missing or failing engines are
    /// logged and skipped; the bot keeps running with the remainder.
    pub fn initialize(&mut self) {
        info!("translation manager initialization started");
        let mut active = Vec::new();
        for name in self.settings.engines.clone() {
            let Some((_, constructor)) = engine_constructors().into_iter().find(|(n, _)| *n == name)
            else {
                error!(engine = %name, "translation engine is not registered");
                continue;
            };
            match constructor() {
                Ok(instance) => {
                    info!(engine = %name, "translation engine initialized");
                    self.engines.insert(name.clone(), instance);
                    active.push(name);
                }
                Err(e) => {
                    error!(engine = %name, error = %e, "translation engine setup failed");
                }
            }
        }
        *self.active_engines.lock() = active;
    }

    /// Register an already-built engine. Used by tests and embedders.
    pub fn register_engine(&mut self, engine: Arc<dyn Translator>) {
        let name = engine.engine_name().to_string();
        self.engines.insert(name.clone(), engine);
        self.active_engines.lock().push(name);
    }

    pub fn engine_names(&self) -> Vec<String> {
        self.active_engines.lock().clone()
    }

    fn current_engine(&self) -> Result<Arc<dyn Translator>, TransError> {
        let active = self.active_engines.lock();
        let name = active
            .first()
            .ok_or_else(|| TransError::Api("no translation engines currently available".into()))?;
        self.engines
            .get(name)
            .cloned()
            .ok_or_else(|| TransError::Api(format!("invalid translation engine key: {name}")))
    }

    fn rate_limit_blocked(&self) -> bool {
        self.limiter.lock().blocked()
    }

    /// Classify an engine error; returns true when it was rate limiting.
    fn handle_rate_limit_error(&self, engine: &dyn Translator, err: &TransError) -> bool {
        if engine.is_rate_limit_error(err) {
            self.limiter.lock().register();
            warn!(error = %err, "translation rate limit detected");
            return true;
        }
        false
    }

    fn handle_translation_failure(&self, info: &mut TranslationInfo, err: &TransError, context: &str) -> bool {
        match err {
            TransError::QuotaExceeded(_) => {
                error!(error = %err, "{context} quota exceeded");
            }
            TransError::UnsupportedLanguagePair(_) => {
                error!(
                    error = %err,
                    src = info.src_lang.as_deref().unwrap_or("?"),
                    tgt = %info.tgt_lang,
                    "{context} unsupported language pair"
                );
            }
            other => {
                let classified = self
                    .current_engine()
                    .map(|engine| self.handle_rate_limit_error(engine.as_ref(), other))
                    .unwrap_or(false);
                if !classified {
                    error!(error = %other, "{context} failed");
                }
            }
        }
        info.translated_text.clear();
        false
    }

    /// Detect the content language, preferring the detection cache, then a
    /// reliable local detection, then the active engine.
    pub async fn detect_language(&self, info: &mut TranslationInfo) -> bool {
        debug!(content = %info.content, "language detection started");
        if info.content.is_empty() {
            debug!("content is empty after preprocessing");
            return false;
        }

        if self.fetch_language_detection_cache(info) {
            debug!(lang = info.src_lang.as_deref().unwrap_or("?"), "language detection cache hit");
            return info.is_translate;
        }

        // Reliable local detection avoids an engine round-trip entirely.
        if let Some(detection) = detect::detect_language(&info.content) {
            if detection.lang != "other" {
                info.src_lang = Some(detection.lang.clone());
                if let Some(cache) = &self.cache {
                    cache.register_language_detection(&info.content, &detection.lang, detection.confidence);
                }
                debug!(lang = %detection.lang, "local language detection used");
                return info.is_translate;
            }
        }

        if self.rate_limit_blocked() {
            return false;
        }

        let engine = match self.current_engine() {
            Ok(engine) => engine,
            Err(e) => {
                error!(error = %e, "language detection failed");
                return false;
            }
        };

        let result = engine
            .detect_language(&info.content, &self.settings.second_language)
            .await;
        match result {
            Ok(result) => match result.detected_source_lang.as_deref() {
                // URL-like content is reported as undetermined; assign
                // English and skip translation.
                Some("und") => {
                    info!("unverifiable content, assigned language 'en'");
                    info.src_lang = Some("en".to_string());
                    info.tgt_lang = "en".to_string();
                    info.translated_text = info.content.clone();
                    info.is_translate = false;
                }
                Some(src) => {
                    info.src_lang = Some(src.to_string());
                    if !engine.has_dedicated_detection_api() {
                        info.translated_text = result.text.clone().unwrap_or_default();
                    }
                    if let Some(cache) = &self.cache {
                        cache.register_language_detection(&info.content, src, 1.0);
                    }
                }
                None => {
                    let err = TransError::Api("unknown error during language detection".into());
                    return self.handle_translation_failure(info, &err, "language detection");
                }
            },
            Err(err) => {
                return self.handle_translation_failure(info, &err, "language detection");
            }
        }

        debug!(lang = info.src_lang.as_deref().unwrap_or("?"), "final detected language");
        info.is_translate
    }

    fn fetch_language_detection_cache(&self, info: &mut TranslationInfo) -> bool {
        if let Some(cache) = &self.cache {
            if let Some(entry) = cache.search_language_detection(&info.content) {
                info.src_lang = Some(entry.detected_lang);
                return true;
            }
        }
        false
    }

    /// Extract forced language codes like "en:ja:" or "ja:" from the content.
    pub fn parse_language_prefix(&self, info: &mut TranslationInfo) -> bool {
        if info.content.is_empty() {
            return false;
        }

        if let Some(caps) = self.lang_prefix_two.captures(&info.content) {
            let code1 = validate_language_code(&caps["lang1"]);
            let code2 = validate_language_code(&caps["lang2"]);
            if let (Some(code1), Some(code2)) = (code1, code2) {
                let whole = caps.get(0).expect("match exists");
                let (start, end) = (whole.start(), whole.end());
                info.src_lang = Some(code1);
                info.tgt_lang = code2;
                info.content = remove_span(&info.content, start, end);
                return true;
            }
        }

        if let Some(caps) = self.lang_prefix_one.captures(&info.content) {
            if let Some(code) = validate_language_code(&caps["lang"]) {
                let whole = caps.get(0).expect("match exists");
                let (start, end) = (whole.start(), whole.end());
                info.tgt_lang = code;
                info.content = remove_span(&info.content, start, end);
                return true;
            }
        }
        false
    }

    /// Pick the target language: anything foreign goes to the native
    /// language, native content goes to the second language.
    pub fn determine_target_language(&self, info: &mut TranslationInfo) -> bool {
        if !info.tgt_lang.is_empty() {
            debug!(tgt = %info.tgt_lang, "target language already set");
            return true;
        }

        let native = &self.settings.native_language;
        let second = &self.settings.second_language;
        if info.src_lang.as_deref() != Some(native.as_str()) {
            info.tgt_lang = native.clone();
        } else {
            info.tgt_lang = second.clone();
        }
        debug!(tgt = %info.tgt_lang, "target language selected");
        info.is_translate
    }

    /// Translate the content, consulting the cache and in-flight layer
    /// first. On failure the translated channel stays empty and the caller
    /// proceeds without it.
    pub async fn perform_translation(&self, info: &mut TranslationInfo) -> bool {
        debug!(content = %info.content, "translation started");

        if info.content.is_empty() {
            info.translated_text.clear();
            return false;
        }

        // Detection may already have produced the right translation.
        if !info.translated_text.is_empty() && info.tgt_lang == self.settings.second_language {
            debug!("reusing translation from detection");
            return true;
        }

        if self.fetch_cached_translation(info) {
            debug!("translation cache hit");
            return true;
        }

        if self.rate_limit_blocked() {
            info.translated_text.clear();
            return false;
        }

        let engine = match self.current_engine() {
            Ok(engine) => engine,
            Err(e) => {
                error!(error = %e, "translation failed");
                info.translated_text.clear();
                return false;
            }
        };
        let engine_name = engine.engine_name().to_string();

        let hash_key = self.build_translation_hash_key(info, &engine_name);

        // In-flight reuse: wait briefly for an identical pending request.
        if let (Some(inflight), Some(key)) = (&self.inflight, &hash_key) {
            match inflight.mark_start(key).await {
                Ok(Some(result)) => {
                    info.translated_text = result.text.unwrap_or_default();
                    debug!("received in-flight translation result");
                    return true;
                }
                Ok(None) => {
                    // This caller is the producer; fall through and compute.
                }
                Err(err) if err.is_inflight_timeout() => {
                    warn!(error = %err, "in-flight translation wait gave up");
                    info.translated_text.clear();
                    return false;
                }
                Err(err) => {
                    return self.handle_translation_failure(info, &err, "in-flight translation");
                }
            }
        }

        let result = engine
            .translation(&info.content, &info.tgt_lang, info.src_lang.as_deref())
            .await;
        match result {
            Ok(result) => {
                info.translated_text = result.text.clone().unwrap_or_default();
                self.write_translation_cache(info, &engine_name);
                if let (Some(inflight), Some(key)) = (&self.inflight, &hash_key) {
                    inflight.store_result(key, result);
                }
                debug!(
                    src = info.src_lang.as_deref().unwrap_or("?"),
                    tgt = %info.tgt_lang,
                    "translation completed"
                );
                true
            }
            Err(err) => {
                if let (Some(inflight), Some(key)) = (&self.inflight, &hash_key) {
                    inflight.store_exception(key, err.clone());
                }
                self.handle_translation_failure(info, &err, "translation")
            }
        }
    }

    fn build_translation_hash_key(&self, info: &TranslationInfo, engine_name: &str) -> Option<String> {
        let src = info.src_lang.as_deref()?;
        if info.tgt_lang.is_empty() {
            return None;
        }
        let cache = self.cache.as_ref()?;
        cache.translation_hash_key(&info.content, src, &info.tgt_lang, Some(engine_name))
    }

    fn fetch_cached_translation(&self, info: &mut TranslationInfo) -> bool {
        let Some(cache) = &self.cache else { return false };
        let Some(src) = info.src_lang.as_deref() else { return false };
        if info.tgt_lang.is_empty() {
            return false;
        }
        let engine_name = match self.current_engine() {
            Ok(engine) => engine.engine_name().to_string(),
            Err(_) => return false,
        };
        if let Some(entry) =
            cache.search_translation(&info.content, src, &info.tgt_lang, "", Some(&engine_name))
        {
            info.translated_text = entry.translation_text;
            return true;
        }
        false
    }

    /// Register the fresh translation under both the engine-specific key and
    /// the common key, so other engines benefit from the shared entry.
    fn write_translation_cache(&self, info: &TranslationInfo, engine_name: &str) -> bool {
        let Some(cache) = &self.cache else { return false };
        let Some(src) = info.src_lang.as_deref() else { return false };
        if info.tgt_lang.is_empty() {
            return false;
        }
        let success = cache.register_translation(
            &info.content,
            src,
            &info.tgt_lang,
            &info.translated_text,
            engine_name,
            "",
        );
        cache.register_translation(&info.content, src, &info.tgt_lang, &info.translated_text, "", "");
        success
    }

    /// Usage statistics of the active engine.
    pub async fn get_usage(&self) -> CharacterQuota {
        match self.current_engine() {
            Ok(engine) => match engine.get_quota_status().await {
                Ok(quota) => quota,
                Err(err) => {
                    error!(error = %err, "quota query failed");
                    CharacterQuota::default()
                }
            },
            Err(err) => {
                error!(error = %err, "quota query failed");
                CharacterQuota::default()
            }
        }
    }

    /// Shut down every engine instance.
    pub async fn shutdown_engines(&self) {
        info!("translation manager termination started");
        for engine in self.engines.values() {
            engine.close().await;
        }
        info!("translation manager termination completed");
    }
}

fn validate_language_code(lang: &str) -> Option<String> {
    KNOWN_LANG_CODES
        .iter()
        .find(|code| code.eq_ignore_ascii_case(lang))
        .map(|code| code.to_string())
}

/// Blank a matched span and compress the leftover whitespace.
fn remove_span(content: &str, start: usize, end: usize) -> String {
    let mut replaced = String::with_capacity(content.len());
    replaced.push_str(&content[..start]);
    replaced.push(' ');
    replaced.push_str(&content[end..]);
    let mut compressed = String::with_capacity(replaced.len());
    let mut last_was_space = false;
    for c in replaced.chars() {
        if c == ' ' {
            if !last_was_space {
                compressed.push(c);
            }
            last_was_space = true;
        } else {
            compressed.push(c);
            last_was_space = false;
        }
    }
    compressed.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct MockTranslator {
        calls: AtomicUsize,
        response: Result<TransResult, TransError>,
        delay: Duration,
    }

    impl MockTranslator {
        fn ok(text: &str, detected: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                response: Ok(TransResult {
                    text: Some(text.to_string()),
                    detected_source_lang: Some(detected.to_string()),
                    metadata: None,
                }),
                delay: Duration::ZERO,
            }
        }

        fn failing(err: TransError) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                response: Err(err),
                delay: Duration::ZERO,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Translator for MockTranslator {
        fn engine_name(&self) -> &str {
            "mock"
        }

        async fn detect_language(&self, _content: &str, _tgt: &str) -> Result<TransResult, TransError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }

        async fn translation(
            &self,
            _content: &str,
            _tgt: &str,
            _src: Option<&str>,
        ) -> Result<TransResult, TransError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.response.clone()
        }

        async fn get_quota_status(&self) -> Result<CharacterQuota, TransError> {
            Ok(CharacterQuota {
                count: 10,
                limit: 100,
                is_quota_valid: true,
            })
        }
    }

    fn manager_with(
        engine: Arc<MockTranslator>,
        cache: Option<Arc<CacheStore>>,
        inflight: Option<Arc<InFlightManager>>,
    ) -> TransManager {
        let mut manager = TransManager::new(TranslationSettings::default(), cache, inflight);
        manager.register_engine(engine);
        manager
    }

    fn info(content: &str, src: &str, tgt: &str) -> TranslationInfo {
        let mut info = TranslationInfo::new(content);
        info.src_lang = Some(src.to_string());
        info.tgt_lang = tgt.to_string();
        info
    }

    #[tokio::test]
    async fn translation_result_is_cached_for_reuse() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(CacheStore::open(&dir.path().join("cache.db")).unwrap());
        let engine = Arc::new(MockTranslator::ok("こんにちは世界", "en"));
        let manager = manager_with(Arc::clone(&engine), Some(Arc::clone(&cache)), None);

        let mut first = info("Hello world", "en", "ja");
        assert!(manager.perform_translation(&mut first).await);
        assert_eq!(first.translated_text, "こんにちは世界");
        assert_eq!(engine.call_count(), 1);

        // Second identical request is served from the cache.
        let mut second = info("Hello world", "en", "ja");
        assert!(manager.perform_translation(&mut second).await);
        assert_eq!(second.translated_text, "こんにちは世界");
        assert_eq!(engine.call_count(), 1);
    }

    #[tokio::test]
    async fn fresh_translation_registers_common_entry_too() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(CacheStore::open(&dir.path().join("cache.db")).unwrap());
        let engine = Arc::new(MockTranslator::ok("やあ", "en"));
        let manager = manager_with(engine, Some(Arc::clone(&cache)), None);

        let mut request = info("hi there", "en", "ja");
        assert!(manager.perform_translation(&mut request).await);

        // The write happened under the engine key and the common key, so a
        // different engine's lookup falls back to the shared entry.
        let entry = cache
            .search_translation("hi there", "en", "ja", "", Some("some-other-engine"))
            .expect("common fallback entry must exist");
        assert_eq!(entry.engine, "");
        assert_eq!(entry.translation_text, "やあ");
    }

    #[tokio::test]
    async fn quota_exceeded_downgrades_to_no_output() {
        let engine = Arc::new(MockTranslator::failing(TransError::QuotaExceeded(
            "monthly limit".into(),
        )));
        let manager = manager_with(engine, None, None);

        let mut request = info("hello", "en", "ja");
        assert!(!manager.perform_translation(&mut request).await);
        assert!(request.translated_text.is_empty());
    }

    #[tokio::test]
    async fn rate_limit_error_throttles_next_call() {
        let engine = Arc::new(MockTranslator::failing(TransError::RateLimited {
            retry_after_ms: 0,
        }));
        let manager = manager_with(Arc::clone(&engine), None, None);

        let mut request = info("hello", "en", "ja");
        assert!(!manager.perform_translation(&mut request).await);
        assert_eq!(engine.call_count(), 1);

        // Within the cooldown the engine is not called at all.
        let mut request = info("hello again", "en", "ja");
        assert!(!manager.perform_translation(&mut request).await);
        assert_eq!(engine.call_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_identical_requests_share_one_computation() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(CacheStore::open(&dir.path().join("cache.db")).unwrap());
        let inflight = Arc::new(InFlightManager::new());
        inflight.component_load();

        let engine = Arc::new(MockTranslator {
            calls: AtomicUsize::new(0),
            response: Ok(TransResult {
                text: Some("遅い翻訳".to_string()),
                detected_source_lang: Some("en".to_string()),
                metadata: None,
            }),
            delay: Duration::from_millis(100),
        });
        let manager = Arc::new(manager_with(
            Arc::clone(&engine),
            Some(cache),
            Some(inflight),
        ));

        let first = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                let mut info = info("slow text", "en", "ja");
                (manager.perform_translation(&mut info).await, info.translated_text)
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                let mut info = info("slow text", "en", "ja");
                (manager.perform_translation(&mut info).await, info.translated_text)
            })
        };

        let (ok1, text1) = first.await.unwrap();
        let (ok2, text2) = second.await.unwrap();
        assert!(ok1 && ok2);
        assert_eq!(text1, "遅い翻訳");
        assert_eq!(text2, "遅い翻訳");
        // The second request reused the first computation.
        assert_eq!(engine.call_count(), 1);
    }

    #[tokio::test]
    async fn detection_uses_cache_before_engine() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(CacheStore::open(&dir.path().join("cache.db")).unwrap());
        cache.register_language_detection("cached text", "fr", 1.0);

        let engine = Arc::new(MockTranslator::ok("ignored", "en"));
        let manager = manager_with(Arc::clone(&engine), Some(cache), None);

        let mut request = TranslationInfo::new("cached text");
        assert!(manager.detect_language(&mut request).await);
        assert_eq!(request.src_lang.as_deref(), Some("fr"));
        assert_eq!(engine.call_count(), 0);
    }

    #[test]
    fn language_prefix_parsing() {
        let manager = manager_with(Arc::new(MockTranslator::ok("", "en")), None, None);

        let mut request = TranslationInfo::new("en:ja: hello world");
        assert!(manager.parse_language_prefix(&mut request));
        assert_eq!(request.src_lang.as_deref(), Some("en"));
        assert_eq!(request.tgt_lang, "ja");
        assert_eq!(request.content, "hello world");

        let mut request = TranslationInfo::new("ja: good morning");
        assert!(manager.parse_language_prefix(&mut request));
        assert_eq!(request.tgt_lang, "ja");
        assert_eq!(request.content, "good morning");

        let mut request = TranslationInfo::new("zz:qq: nothing");
        assert!(!manager.parse_language_prefix(&mut request));
        assert_eq!(request.content, "zz:qq: nothing");
    }

    #[test]
    fn target_language_selection() {
        let manager = manager_with(Arc::new(MockTranslator::ok("", "en")), None, None);

        // Default settings: native ja, second en.
        let mut request = TranslationInfo::new("hello");
        request.src_lang = Some("en".to_string());
        assert!(manager.determine_target_language(&mut request));
        assert_eq!(request.tgt_lang, "ja");

        let mut request = TranslationInfo::new("こんにちは");
        request.src_lang = Some("ja".to_string());
        assert!(manager.determine_target_language(&mut request));
        assert_eq!(request.tgt_lang, "en");
    }
}
