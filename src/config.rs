use anyhow::{bail, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::account::DeviceConfig;

pub const CONFIG_FILE_NAME: &str = "auth-lifecycle.toml";
pub const ENV_PREFIX: &str = "AUTH_LIFECYCLE";
/// Largest broadcast buffer a machine will allocate for state notifications
pub const MAX_NOTIFICATION_CAPACITY: usize = 1 << 16;

/// Main configuration structure for the auth lifecycle machine
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthLifecycleConfig {
    /// Identity this device registers with the account
    pub device: DeviceConfig,
    /// Internal machine limits and notification settings
    pub machine: MachineConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Maximum account-service calls one internal machine may make
    pub max_internal_steps: usize,
    /// Fail a step whose call has not settled after this many milliseconds
    pub step_timeout_ms: Option<u64>,
    /// Buffered state-change notifications per subscriber
    pub notification_capacity: usize,
    /// Number of applied transitions kept in history
    pub history_limit: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            max_internal_steps: 20,
            step_timeout_ms: None,
            notification_capacity: 64,
            history_limit: 100,
        }
    }
}

impl MachineConfig {
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level, or any `EnvFilter` directive
    pub log_level: String,
    /// Emit logs as JSON lines
    pub json_logs: bool,
    /// Enable metrics collection
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

impl AuthLifecycleConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. auth-lifecycle.toml in the working directory
    /// 3. Environment variables (prefixed with AUTH_LIFECYCLE_, sections split by `__`)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE_NAME))
    }

    /// Same as [`Self::load`] with an explicit config file path. A missing file is skipped.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::build(Some(path), Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("device.capabilities")
    }

    fn build(path: Option<&Path>, environment: Environment) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(File::from(path));
            }
        }

        builder = builder.add_source(environment);

        let config: AuthLifecycleConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.machine.max_internal_steps == 0 {
            bail!("machine.max_internal_steps must be at least 1");
        }
        if self.machine.notification_capacity == 0 {
            bail!("machine.notification_capacity must be at least 1");
        }
        if self.machine.notification_capacity > MAX_NOTIFICATION_CAPACITY {
            bail!(
                "machine.notification_capacity must be at most {}",
                MAX_NOTIFICATION_CAPACITY
            );
        }
        if self.machine.step_timeout_ms == Some(0) {
            bail!("machine.step_timeout_ms must be greater than 0 when set");
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}
