//! Bot entry point.
//! Wires the cache, translation and TTS subsystems together and feeds them
//! chat messages from stdin (the chat platform integration is an external
//! collaborator; each input line stands in for one delivered message).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use yomiage::cache::inflight::InFlightManager;
use yomiage::cache::store::CacheStore;
use yomiage::chat::{ChatSink, ConsoleSink};
use yomiage::config::Config;
use yomiage::trans::manager::{TransManager, TranslationInfo};
use yomiage::tts::manager::TtsManager;
use yomiage::tts::params::{TtsParam, UserCategory};

const CONFIG_PATH: &str = "yomiage.json";
const CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(3_600);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "yomiage=debug".parse().expect("default filter must parse")),
        )
        .with_target(true)
        .init();

    info!("yomiage starting");

    let config = match Config::load_from_file(Path::new(CONFIG_PATH)) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "config load failed, using defaults");
            Config::default()
        }
    };

    // Persistent cache; a failure degrades to uncached operation.
    let cache = match CacheStore::open(&config.general.cache_db_path) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(error = %e, "cache store unavailable, translations will not be cached");
            None
        }
    };

    let inflight = Arc::new(InFlightManager::new());
    inflight.component_load();

    let mut trans_manager = TransManager::new(
        config.translation.clone(),
        cache.clone(),
        Some(Arc::clone(&inflight)),
    );
    trans_manager.initialize();
    let trans_manager = Arc::new(trans_manager);
    for name in trans_manager.engine_names() {
        println!("Loaded translation engine: {name}");
    }

    let tts_manager = Arc::new(TtsManager::new(&config));
    tts_manager.initialize().await;

    // Periodic cache sweep; lazy expiry on read covers the rest.
    let shutdown = CancellationToken::new();
    if let Some(cache) = cache.clone() {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CACHE_CLEANUP_INTERVAL);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => cache.cleanup_expired(),
                }
            }
        });
    }

    let sink = ConsoleSink;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim().to_string();
                    if !line.is_empty() {
                        process_chat_message(line, &trans_manager, &tts_manager, &sink).await;
                    }
                }
                Ok(None) => {
                    info!("input closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "error reading input");
                    break;
                }
            }
        }
    }

    info!("yomiage shutting down");
    shutdown.cancel();
    tts_manager.close().await;
    trans_manager.shutdown_engines().await;
    inflight.component_teardown();
    info!("yomiage stopped");
}

/// One message through the pipeline: language handling, translation, chat
/// and console echo, then speech readout. Failures along the way silently
/// drop the affected channel; the log carries the detail.
async fn process_chat_message(
    line: String,
    trans_manager: &Arc<TransManager>,
    tts_manager: &Arc<TtsManager>,
    sink: &ConsoleSink,
) {
    let mut info = TranslationInfo::new(line);

    // Per-message voice selection and inline parameter commands.
    tts_manager.select_voice_usertype(UserCategory::Others);
    tts_manager.command_voiceparameters(&mut info.content);
    trans_manager.parse_language_prefix(&mut info);

    let detected = trans_manager.detect_language(&mut info).await;
    if detected {
        trans_manager.determine_target_language(&mut info);
        if trans_manager.perform_translation(&mut info).await && !info.translated_text.is_empty() {
            let header = format!(
                "[{} -> {}]",
                info.src_lang.as_deref().unwrap_or("?"),
                info.tgt_lang
            );
            sink.send_chat_message(&info.translated_text, Some(&header), None);
            sink.print_console_message(&info.translated_text, Some(&header), None);
        }
    }

    // Read out the translation when there is one, the original otherwise.
    let (content, content_lang) = if !info.translated_text.is_empty() {
        (info.translated_text.clone(), Some(info.tgt_lang.clone()))
    } else {
        (info.content.clone(), info.src_lang.clone())
    };

    let Ok(tts_info) = tts_manager.get_voice_param(content_lang.as_deref()) else {
        return;
    };
    let param = TtsParam {
        content,
        content_lang,
        tts_info,
        filepath: None,
        message_id: Some(uuid::Uuid::new_v4().to_string()),
        author_name: None,
    };
    if let Some(prepared) = tts_manager.prepare_tts_content(param) {
        tts_manager.enqueue_tts_synthesis(prepared).await;
    }
}
