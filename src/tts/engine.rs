//! TTS engine abstraction.
//! Engines either write a WAV file and forward the param into the playback
//! queue, or trigger playback remotely on their own. The playback sender and
//! audio directory are injected explicitly through [`EngineContext`].

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::config::EngineSettings;
use crate::queue::TaskQueue;
use crate::tts::params::{TtsParam, UserTypeInfo};
use crate::tts::TtsError;

/// Timeout for terminating a linked engine process.
const KILL_TIMEOUT: Duration = Duration::from_secs(3);

const DEFAULT_PROTOCOL: &str = "http";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 65535;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Dynamic/private port range allowed for local TTS servers.
const PORT_RANGE: (u16, u16) = (49152, 65535);

/// Audio formats engines are allowed to produce.
pub const SUPPORTED_FORMATS: &[&str] = &["wav", "mp3"];

/// Server config string: "[protocol://]host:port".
const SERVER_CONFIG_PATTERN: &str =
    r"^(?:(?P<protocol>[a-zA-Z][a-zA-Z0-9+.-]*)://)?(?P<host>[^:/?#]+):(?P<port>\d+)$";

/// Per-engine connection settings parsed from the configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub early_speech: bool,
    pub linked_startup: bool,
    pub exec_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            protocol: DEFAULT_PROTOCOL.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            early_speech: false,
            linked_startup: false,
            exec_path: None,
        }
    }
}

impl EngineConfig {
    pub fn from_settings(settings: &EngineSettings) -> Result<Self, TtsError> {
        let mut config = Self::default();

        if let Some(server) = settings.server.as_deref() {
            let (protocol, host, port) = Self::parse_server_config(server)?;
            config.protocol = protocol;
            config.host = host;
            config.port = port;
        }

        if settings.timeout > 0.0 {
            config.timeout = Duration::from_secs_f64(settings.timeout);
        } else if settings.timeout < 0.0 {
            warn!(timeout = settings.timeout, "invalid timeout setting, using default");
        }

        config.early_speech = settings.early_speech;
        config.linked_startup = settings.auto_startup;
        config.exec_path = settings.execute_path.clone();
        Ok(config)
    }

    /// Parse "[protocol://]host:port" with a port-range check.
    fn parse_server_config(server: &str) -> Result<(String, String, u16), TtsError> {
        let re = Regex::new(SERVER_CONFIG_PATTERN).expect("server pattern must compile");
        let caps = re
            .captures(server)
            .ok_or_else(|| TtsError::ServerConfig(format!("invalid format: '{server}'")))?;

        let protocol = caps
            .name("protocol")
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string());
        if protocol != "http" && protocol != "https" {
            return Err(TtsError::ServerConfig(format!(
                "invalid protocol '{protocol}', expected 'http' or 'https'"
            )));
        }

        let host = caps["host"].to_string();
        let port: u16 = caps["port"]
            .parse()
            .map_err(|_| TtsError::ServerConfig(format!("invalid port in '{server}'")))?;
        if !(PORT_RANGE.0..=PORT_RANGE.1).contains(&port) {
            return Err(TtsError::ServerConfig(format!(
                "port {port} outside allowed range {}..={}",
                PORT_RANGE.0, PORT_RANGE.1
            )));
        }

        Ok((protocol, host, port))
    }

    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// Shared services injected into every engine: the playback queue and the
/// directory for temporary audio files.
#[derive(Clone)]
pub struct EngineContext {
    playback_queue: Arc<TaskQueue<TtsParam>>,
    audio_dir: PathBuf,
}

impl EngineContext {
    pub fn new(playback_queue: Arc<TaskQueue<TtsParam>>, audio_dir: PathBuf) -> Self {
        Self {
            playback_queue,
            audio_dir,
        }
    }

    /// Hand a synthesized param to the playback queue.
    pub async fn play(&self, param: TtsParam) {
        debug!(file = ?param.filepath, "adding to playback queue");
        if let Err(e) = self.playback_queue.put(param).await {
            warn!(error = %e, "failed to enqueue playback item");
        }
    }

    /// Unique audio file path: "{prefix}_{uuid}.{suffix}".
    pub fn create_audio_filename(&self, prefix: &str, suffix: &str) -> Result<PathBuf, TtsError> {
        if !SUPPORTED_FORMATS.contains(&suffix.to_lowercase().as_str()) {
            return Err(TtsError::NotSupported(format!(
                "'{suffix}' is an unsupported audio format"
            )));
        }
        let unique = uuid::Uuid::new_v4();
        Ok(self.audio_dir.join(format!("{prefix}_{{{unique}}}.{suffix}")))
    }

    /// Write audio data to a new file. Refuses to overwrite.
    pub fn save_audio_file(&self, filepath: &Path, data: &[u8]) -> Result<(), TtsError> {
        use std::io::Write;

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(filepath)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => TtsError::FileExists(filepath.to_path_buf()),
                _ => TtsError::FileCreate(format!("'{}': {e}", filepath.display())),
            })?;
        file.write_all(data)
            .and_then(|_| file.flush())
            .map_err(|e| TtsError::FileCreate(format!("'{}': {e}", filepath.display())))
    }
}

/// Pluggable TTS engine. Hooks other than `speech_synthesis` default to
/// no-ops so engines only implement what applies to them.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    fn engine_name(&self) -> &str;

    /// Apply configuration. Returning false excludes the engine from the
    /// handler map.
    fn initialize_engine(&mut self, settings: &EngineSettings) -> bool;

    /// Start an external engine process if linked startup is configured.
    async fn execute(&self) -> Result<(), TtsError> {
        Ok(())
    }

    /// One-time warm-up once the engine process accepts requests.
    async fn async_init(&self, _voice_params: &UserTypeInfo) -> Result<(), TtsError> {
        info!(engine = self.engine_name(), "engine initialised");
        Ok(())
    }

    /// Produce audio for the param and enqueue it for playback, or play it
    /// remotely. Takes ownership: the param has exactly one owner per
    /// pipeline stage.
    async fn speech_synthesis(&self, param: TtsParam) -> Result<(), TtsError>;

    async fn close(&self) -> Result<(), TtsError> {
        info!(engine = self.engine_name(), "engine termination");
        Ok(())
    }

    /// Tear down an external engine process.
    async fn termination(&self) -> Result<(), TtsError> {
        Ok(())
    }
}

pub type EngineHandlerMap = HashMap<String, Arc<dyn SpeechEngine>>;

/// Call one hook on every engine concurrently, logging (never raising)
/// per-engine failures so one broken engine cannot stop the others.
pub async fn dispatch_engines<F, Fut>(handlers: &EngineHandlerMap, method_name: &str, f: F)
where
    F: Fn(Arc<dyn SpeechEngine>) -> Fut,
    Fut: Future<Output = Result<(), TtsError>>,
{
    debug!(method = method_name, engines = handlers.len(), "dispatching engine method");
    let mut names = Vec::with_capacity(handlers.len());
    let mut futures = Vec::with_capacity(handlers.len());
    for (name, engine) in handlers {
        names.push(name.clone());
        futures.push(f(Arc::clone(engine)));
    }

    for (name, result) in names.into_iter().zip(join_all(futures).await) {
        if let Err(e) = result {
            error!(engine = %name, method = method_name, error = %e, "engine method failed");
        }
    }
}

/// External process launched alongside an engine (linked startup).
pub struct LinkedProcess {
    child: tokio::sync::Mutex<Option<tokio::process::Child>>,
}

impl Default for LinkedProcess {
    fn default() -> Self {
        Self {
            child: tokio::sync::Mutex::new(None),
        }
    }
}

impl LinkedProcess {
    /// Spawn the executable; failure to start is logged, not fatal.
    pub async fn execute(&self, exec_path: &Path) {
        let mut guard = self.child.lock().await;
        if guard.is_some() {
            debug!("linked process already running");
            return;
        }
        match tokio::process::Command::new(exec_path)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
        {
            Ok(child) => {
                debug!(path = %exec_path.display(), "linked process started");
                *guard = Some(child);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!(path = %exec_path.display(), "executable file not found");
            }
            Err(e) => {
                error!(path = %exec_path.display(), error = %e, "failed to execute file");
            }
        }
    }

    /// Terminate the linked process, waiting up to the kill timeout.
    pub async fn kill(&self) {
        let mut guard = self.child.lock().await;
        let Some(mut child) = guard.take() else {
            return;
        };
        if let Some(pid) = child.id() {
            info!(pid, "terminating linked process");
        }
        if let Err(e) = child.start_kill() {
            error!(error = %e, "failed to terminate linked process");
            return;
        }
        match tokio::time::timeout(KILL_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "linked process exited"),
            Ok(Err(e)) => error!(error = %e, "error waiting for linked process exit"),
            Err(_) => error!("timeout while terminating linked process"),
        }
    }
}
