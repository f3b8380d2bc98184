//! Tapdeck configuration
//!
//! Layered: built-in defaults, an optional TOML file, then
//! `TAPDECK__SECTION__KEY` environment variables (a `.env` file is honored).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tapdeck_common::{Action, ActionKind};

/// Environment variable prefix, e.g. `TAPDECK__HTTP__PORT=8080`
pub const ENV_PREFIX: &str = "TAPDECK";

/// Daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TapdeckConfig {
    /// Management API
    pub http: HttpSettings,
    /// Binding table storage
    pub registry: RegistrySettings,
    /// Tag reader input
    pub reader: ReaderSettings,
    /// Button input
    pub buttons: ButtonSettings,
    /// Media playback backend
    pub playback: PlaybackSettings,
    /// Audible scan feedback
    pub feedback: FeedbackSettings,
    /// Host control
    pub system: SystemSettings,
}

impl TapdeckConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .context("invalid configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.reader.enabled && self.reader.source.trim().is_empty() {
            bail!("reader.source must not be empty when the reader is enabled");
        }
        self.buttons.actions()?;
        Ok(())
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http.host, self.http.port)
    }
}

/// Management API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
    /// Web UI served for every path outside the API
    pub static_dir: Option<PathBuf>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6681,
            static_dir: Some(PathBuf::from("/usr/share/tapdeck/webui")),
        }
    }
}

/// Registry snapshot location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub path: PathBuf,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/tapdeck/tags.json"),
        }
    }
}

/// Tag reader settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSettings {
    pub enabled: bool,
    /// `stdin`, or a path to a line-oriented device or FIFO
    pub source: String,
    pub debounce_ms: u64,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            source: "stdin".to_string(),
            debounce_ms: tapdeck_common::DEFAULT_TAG_DEBOUNCE_MS,
        }
    }
}

impl ReaderSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// One physical button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonBinding {
    pub pin: u8,
    /// Action kind name
    pub action: String,
    #[serde(default)]
    pub parameter: Option<String>,
}

impl ButtonBinding {
    pub fn new(pin: u8, action: ActionKind) -> Self {
        Self {
            pin,
            action: action.name().to_string(),
            parameter: None,
        }
    }

    /// Validate into an executable action
    pub fn resolve(&self) -> Result<Action> {
        let kind = ActionKind::from_name(&self.action)
            .with_context(|| format!("button on pin {}", self.pin))?;
        kind.validate(self.parameter.as_deref())
            .with_context(|| format!("button on pin {}", self.pin))
    }
}

/// Button input settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonSettings {
    /// Edge source path; buttons are disabled when unset
    pub source: Option<PathBuf>,
    pub debounce_ms: u64,
    pub bindings: Vec<ButtonBinding>,
}

impl Default for ButtonSettings {
    fn default() -> Self {
        Self {
            source: None,
            debounce_ms: tapdeck_common::DEFAULT_BUTTON_DEBOUNCE_MS,
            bindings: vec![
                ButtonBinding::new(11, ActionKind::Shutdown),
                ButtonBinding::new(12, ActionKind::PlayPause),
            ],
        }
    }
}

impl ButtonSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Pin → action table; fails on invalid bindings or a pin bound twice
    pub fn actions(&self) -> Result<HashMap<u8, Action>> {
        let mut seen = HashSet::new();
        let mut actions = HashMap::with_capacity(self.bindings.len());
        for binding in &self.bindings {
            if !seen.insert(binding.pin) {
                bail!("pin {} is bound more than once", binding.pin);
            }
            actions.insert(binding.pin, binding.resolve()?);
        }
        Ok(actions)
    }
}

/// Playback backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// JSON-RPC endpoint of the media server
    pub rpc_url: String,
    pub timeout_secs: u64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            rpc_url: crate::infra::mopidy::DEFAULT_RPC_URL.to_string(),
            timeout_secs: 5,
        }
    }
}

impl PlaybackSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Scan feedback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackSettings {
    pub enabled: bool,
    /// Player program and its arguments; the cue file is appended
    pub player: Vec<String>,
    /// Directory holding `success.wav` and `fail.wav`
    pub sounds_dir: PathBuf,
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            player: vec!["aplay".to_string(), "-q".to_string()],
            sounds_dir: PathBuf::from("/usr/share/tapdeck/sounds"),
        }
    }
}

/// Host control settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSettings {
    pub shutdown_command: Vec<String>,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            shutdown_command: ["sudo", "/sbin/shutdown", "-h", "now"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}
