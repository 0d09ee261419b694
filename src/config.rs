use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{PilotError, PilotResult};
use crate::surface::adb::{AdbSettings, AdbSurfaceFactory, DockerAdbShell};
use crate::surface::vnc::{VncSettings, VncSurfaceFactory};
use crate::surface::{SurfaceFactory, SurfaceKind};

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub surface: SurfaceConfig,
    #[serde(default)]
    pub vnc: VncConfig,
    #[serde(default)]
    pub adb: AdbConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceConfig {
    pub kind: SurfaceKind,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            kind: SurfaceKind::Vnc,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VncConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Logical resolution the agent reasons in.
    pub width: u32,
    pub height: u32,
    pub connect_timeout_ms: u64,
    pub update_wait_ms: u64,
}

impl Default for VncConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5900,
            password: None,
            width: 800,
            height: 600,
            connect_timeout_ms: 30_000,
            update_wait_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdbConfig {
    /// Docker container running the emulator and its adb server.
    pub container: Option<String>,
    /// Device serial for a host-side adb.
    pub serial: Option<String>,
    pub target_width: u32,
    pub target_height: u32,
    pub display_density: Option<u32>,
    pub boot_poll_attempts: u32,
    pub boot_poll_interval_ms: u64,
    /// A single `adb` invocation is abandoned after this long.
    pub command_timeout_ms: u64,
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            container: Some("bua-android-tablet".into()),
            serial: None,
            target_width: 1000,
            target_height: 1000,
            display_density: Some(200),
            boot_poll_attempts: 60,
            boot_poll_interval_ms: 2000,
            command_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub active_provider: String,
    pub providers: HashMap<String, ProviderEntry>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderEntry {
                display_name: "OpenAI".into(),
                api_base: "https://api.openai.com/v1/chat/completions".into(),
                model: "gpt-4o".into(),
                temperature: default_temperature(),
                stream: false,
                api_key: None,
            },
        );
        Self {
            active_provider: "openai".into(),
            providers,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    /// Full chat-completions endpoint URL.
    pub api_base: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Use SSE streaming for replies.
    #[serde(default)]
    pub stream: bool,
    /// Optional API key stored in config.toml (env var PILOT_<ID>_API_KEY wins).
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_temperature() -> f64 {
    0.8
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Capture a fresh frame for every decision.
    #[default]
    Live,
    /// Use the frame the periodic capture task cached most recently.
    Cached,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Goal appended to the system prompt.
    pub instruction: String,
    pub action_delay_ms: u64,
    pub screenshot_delay_ms: u64,
    pub capture_mode: CaptureMode,
    /// Prior turns kept in the conversation window.
    pub max_turns: usize,
    /// How many of the most recent prior turns keep their screenshot.
    pub history_images: usize,
    pub error_backoff_ms: u64,
    pub reconnect_backoff_ms: u64,
    pub autostart: bool,
    pub autostart_delay_ms: u64,
    pub autostart_retry_ms: u64,
    /// Append each iteration to a JSONL session log.
    pub record_history: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            instruction: "Complete the task shown on screen.".into(),
            action_delay_ms: 150,
            screenshot_delay_ms: 300,
            capture_mode: CaptureMode::Live,
            max_turns: 10,
            history_images: 2,
            error_backoff_ms: 2000,
            reconnect_backoff_ms: 5000,
            autostart: true,
            autostart_delay_ms: 5000,
            autostart_retry_ms: 10_000,
            record_history: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:3000".into(),
        }
    }
}

impl AppConfig {
    /// Apply environment overrides. `env` is the variable lookup.
    pub fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) -> PilotResult<()> {
        if let Some(host) = env("VNC_HOST") {
            self.vnc.host = host;
        }
        if let Some(port) = parse_env(&env, "VNC_PORT")? {
            self.vnc.port = port;
        }
        if let Some(password) = env("VNC_PASSWORD") {
            self.vnc.password = Some(password).filter(|p| !p.is_empty());
        }
        if let Some(container) = env("ANDROID_CONTAINER") {
            self.adb.container = Some(container).filter(|c| !c.is_empty());
        }
        if let Some(w) = parse_env(&env, "TARGET_WIDTH")? {
            self.adb.target_width = w;
        }
        if let Some(h) = parse_env(&env, "TARGET_HEIGHT")? {
            self.adb.target_height = h;
        }
        if let Some(density) = parse_env(&env, "DISPLAY_DENSITY")? {
            self.adb.display_density = Some(density);
        }
        if let Some(delay) = parse_env(&env, "AGENT_START_DELAY")? {
            self.agent.autostart_delay_ms = delay;
        }
        if let Some(model) = env("LLM_MODEL") {
            if let Some(entry) = self.llm.providers.get_mut(&self.llm.active_provider) {
                entry.model = model;
            }
        }
        Ok(())
    }

    pub fn vnc_settings(&self) -> VncSettings {
        VncSettings {
            host: self.vnc.host.clone(),
            port: self.vnc.port,
            password: self.vnc.password.clone(),
            width: self.vnc.width,
            height: self.vnc.height,
            connect_timeout: Duration::from_millis(self.vnc.connect_timeout_ms),
            update_wait: Duration::from_millis(self.vnc.update_wait_ms),
        }
    }

    pub fn adb_settings(&self) -> AdbSettings {
        AdbSettings {
            target_width: self.adb.target_width,
            target_height: self.adb.target_height,
            display_density: self.adb.display_density,
            boot_poll_attempts: self.adb.boot_poll_attempts,
            boot_poll_interval: Duration::from_millis(self.adb.boot_poll_interval_ms),
            command_timeout: Duration::from_millis(self.adb.command_timeout_ms),
        }
    }

    /// Factory for the configured surface kind.
    pub fn build_surface_factory(&self) -> Arc<dyn SurfaceFactory> {
        match self.surface.kind {
            SurfaceKind::Vnc => Arc::new(VncSurfaceFactory::new(self.vnc_settings())),
            SurfaceKind::Adb => {
                let shell = DockerAdbShell::new(self.adb.container.clone(), self.adb.serial.clone());
                Arc::new(AdbSurfaceFactory::new(self.adb_settings(), Arc::new(shell)))
            }
        }
    }
}

fn parse_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, name: &str) -> PilotResult<Option<T>> {
    match env(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| PilotError::Config(format!("{name}={raw:?} is not a valid number"))),
    }
}

/// Locate config.toml: an explicit path, then next to the executable, then
/// the working directory. `Ok(None)` means run on defaults.
pub fn resolve_config_path(explicit: Option<&Path>) -> PilotResult<Option<PathBuf>> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(PilotError::Config(format!("{} not found", path.display())));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(Some(candidate));
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join(CONFIG_FILE);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(Some(candidate));
    }

    Ok(None)
}

pub fn load_config_from(path: &Path) -> PilotResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(
        path = %path.display(),
        surface = ?config.surface.kind,
        provider = %config.llm.active_provider,
        "config loaded"
    );
    Ok(config)
}

/// Resolve, read and apply process environment overrides.
pub fn load_config(explicit: Option<&Path>) -> PilotResult<AppConfig> {
    let mut config = match resolve_config_path(explicit)? {
        Some(path) => load_config_from(&path)?,
        None => {
            tracing::warn!("config.toml not found next to executable or in working directory; using defaults");
            AppConfig::default()
        }
    };
    config.apply_env_overrides(|name| std::env::var(name).ok())?;
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &Path) -> PilotResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
