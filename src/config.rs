//! Bridge configuration parsing, validation, and environment overrides.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::models::query::DEFAULT_PERSONA;
use crate::{AppError, Result};

/// Environment variable that overrides [`BridgeConfig::notebook_id`].
pub const NOTEBOOK_ID_ENV: &str = "NOTEBOOK_BRIDGE_NOTEBOOK_ID";

/// One way of starting the helper process.
///
/// Strategies are tried in the order they appear in [`BridgeConfig::launch`];
/// the first one whose executable resolves is used.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LaunchStrategy {
    /// Run an installed command directly.
    Command {
        /// Command name looked up on `PATH`, or a path to an executable.
        program: String,
        /// Arguments passed to the command.
        #[serde(default)]
        args: Vec<String>,
    },
    /// Run the helper's module entry point through an interpreter
    /// (`<runtime> -m <module>`).
    Module {
        /// Interpreter looked up on `PATH`, or a path to one.
        runtime: String,
        /// Module name passed after `-m`.
        module: String,
    },
}

impl LaunchStrategy {
    /// Executable that must resolve for this strategy to be usable.
    #[must_use]
    pub fn program(&self) -> &str {
        match self {
            Self::Command { program, .. } => program,
            Self::Module { runtime, .. } => runtime,
        }
    }

    /// Arguments passed to [`Self::program`].
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::Command { args, .. } => args.clone(),
            Self::Module { module, .. } => vec!["-m".to_owned(), module.clone()],
        }
    }
}

fn default_notebook_id() -> String {
    "53e585fb-63e8-4432-b245-db2584895a6e".into()
}

fn default_persona() -> String {
    DEFAULT_PERSONA.into()
}

fn default_tool_name() -> String {
    "notebook_query".into()
}

fn default_protocol_version() -> String {
    "2024-11-05".into()
}

fn default_client_name() -> String {
    "notebook-bridge".into()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").into()
}

fn default_startup_grace_ms() -> u64 {
    500
}

fn default_handshake_timeout_seconds() -> u64 {
    60
}

fn default_call_timeout_seconds() -> u64 {
    300
}

fn default_launch() -> Vec<LaunchStrategy> {
    vec![
        LaunchStrategy::Command {
            program: "notebooklm-mcp".into(),
            args: Vec::new(),
        },
        LaunchStrategy::Command {
            program: "notebooklm-mcp-server".into(),
            args: Vec::new(),
        },
        LaunchStrategy::Module {
            runtime: "python3".into(),
            module: "notebooklm_mcp".into(),
        },
    ]
}

/// Bridge configuration parsed from an optional TOML file.
///
/// Every field has a default, so an empty document is a valid configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BridgeConfig {
    /// Knowledge-base notebook queried by every tool call.
    #[serde(default = "default_notebook_id")]
    pub notebook_id: String,
    /// Instructional preamble prepended to every question.
    #[serde(default = "default_persona")]
    pub persona: String,
    /// Tool name sent in `tools/call`.
    #[serde(default = "default_tool_name")]
    pub tool_name: String,
    /// Protocol version announced in `initialize`.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    /// Client name announced in `initialize`.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Client version announced in `initialize`.
    #[serde(default = "default_client_version")]
    pub client_version: String,
    /// Delay after spawning before checking that the helper is still alive.
    #[serde(default = "default_startup_grace_ms")]
    pub startup_grace_ms: u64,
    /// Handshake deadline; 0 waits indefinitely.
    #[serde(default = "default_handshake_timeout_seconds")]
    pub handshake_timeout_seconds: u64,
    /// Tool-call deadline; 0 waits indefinitely.
    #[serde(default = "default_call_timeout_seconds")]
    pub call_timeout_seconds: u64,
    /// Ordered launch strategies, first resolvable wins.
    #[serde(default = "default_launch")]
    pub launch: Vec<LaunchStrategy>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            notebook_id: default_notebook_id(),
            persona: default_persona(),
            tool_name: default_tool_name(),
            protocol_version: default_protocol_version(),
            client_name: default_client_name(),
            client_version: default_client_version(),
            startup_grace_ms: default_startup_grace_ms(),
            handshake_timeout_seconds: default_handshake_timeout_seconds(),
            call_timeout_seconds: default_call_timeout_seconds(),
            launch: default_launch(),
        }
    }
}

impl BridgeConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides, then re-validate.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the overridden configuration is invalid.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(notebook_id) = env::var(NOTEBOOK_ID_ENV) {
            info!(env = NOTEBOOK_ID_ENV, "config: notebook id overridden from environment");
            self.notebook_id = notebook_id;
        }
        self.validate()
    }

    /// Grace period between spawning the helper and the liveness check.
    #[must_use]
    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    /// Handshake deadline, or `None` when disabled.
    #[must_use]
    pub fn handshake_timeout(&self) -> Option<Duration> {
        non_zero_seconds(self.handshake_timeout_seconds)
    }

    /// Tool-call deadline, or `None` when disabled.
    #[must_use]
    pub fn call_timeout(&self) -> Option<Duration> {
        non_zero_seconds(self.call_timeout_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.notebook_id.trim().is_empty() {
            return Err(AppError::Config("notebook_id must not be empty".into()));
        }

        if self.tool_name.trim().is_empty() {
            return Err(AppError::Config("tool_name must not be empty".into()));
        }

        if self.launch.is_empty() {
            return Err(AppError::Config(
                "launch must list at least one strategy".into(),
            ));
        }

        if let Some(strategy) = self.launch.iter().find(|s| s.program().trim().is_empty()) {
            return Err(AppError::Config(format!(
                "launch strategy has an empty executable: {strategy:?}"
            )));
        }

        Ok(())
    }
}

fn non_zero_seconds(seconds: u64) -> Option<Duration> {
    (seconds > 0).then(|| Duration::from_secs(seconds))
}
