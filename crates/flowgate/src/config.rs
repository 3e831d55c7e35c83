//! Layered configuration: built-in defaults, a TOML file, then
//! `FLOWGATE__SECTION__KEY` environment variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::backend::{
    AssistantBackend, BackendMode, RemoteBackendConfig, SimulationTiming, select_backend,
};

pub const APP_NAME: &str = "flowgate";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Seconds between WebSocket pings (0 disables)
    pub keepalive_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            keepalive_secs: 30,
        }
    }
}

/// Assistant backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// "auto", "remote" or "simulated"
    pub mode: BackendMode,
    /// WebSocket URL of the agent (e.g. "ws://127.0.0.1:8090/acp")
    pub url: Option<String>,
    /// Command that starts the agent when it is not running
    pub command: Option<Vec<String>>,
    /// Seconds to wait for a freshly started agent
    pub startup_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            mode: BackendMode::Auto,
            url: None,
            command: None,
            startup_timeout_secs: 30,
        }
    }
}

/// Delays of the demo stream used when no backend is configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub warmup_ms: u64,
    pub char_delay_ms: u64,
    pub trailing_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let timing = SimulationTiming::default();
        Self {
            warmup_ms: timing.warmup.as_millis() as u64,
            char_delay_ms: timing.char_delay.as_millis() as u64,
            trailing_ms: timing.trailing.as_millis() as u64,
        }
    }
}

impl AppConfig {
    pub fn simulation_timing(&self) -> SimulationTiming {
        SimulationTiming {
            warmup: Duration::from_millis(self.simulation.warmup_ms),
            char_delay: Duration::from_millis(self.simulation.char_delay_ms),
            trailing: Duration::from_millis(self.simulation.trailing_ms),
        }
    }

    /// Remote agent settings, if an agent URL is configured.
    pub fn remote_backend(&self) -> Option<RemoteBackendConfig> {
        let url = self.backend.url.as_ref().filter(|url| !url.trim().is_empty())?;
        Some(RemoteBackendConfig {
            url: url.clone(),
            command: self.backend.command.clone(),
            startup_timeout: Duration::from_secs(self.backend.startup_timeout_secs),
        })
    }

    /// Build the backend this configuration selects.
    pub fn build_backend(&self) -> Result<Arc<dyn AssistantBackend>> {
        select_backend(
            self.backend.mode,
            self.remote_backend(),
            self.simulation_timing(),
        )
    }

    pub fn keepalive(&self) -> Option<Duration> {
        (self.server.keepalive_secs > 0).then(|| Duration::from_secs(self.server.keepalive_secs))
    }
}

/// Load configuration from `path` (optional) and the environment.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let built = Config::builder()
        .add_source(
            File::from(path)
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(
            Environment::with_prefix(&env_prefix())
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("reading configuration from {}", path.display()))?;

    built
        .try_deserialize()
        .context("parsing configuration")
}

/// Like [`load_config`], but first writes the default file if none exists.
pub fn load_or_init_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        write_default_config(path)?;
        log::info!("Created default config at {}", path.display());
    }
    load_config(path)
}

/// Write the default configuration to `path`, creating parent directories.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = default_config_header(path);
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

fn default_config_header(path: &Path) -> String {
    let mut buffer = String::new();
    buffer.push_str("# Configuration for ");
    buffer.push_str(APP_NAME);
    buffer.push('\n');
    buffer.push_str("# File: ");
    buffer.push_str(&path.display().to_string());
    buffer.push('\n');
    buffer.push_str("# Set backend.url to relay chats to an assistant agent;\n");
    buffer.push_str("# without it the gateway streams simulated replies.\n");
    buffer.push('\n');
    buffer
}

/// Resolve the config file path from an optional `--config` override.
///
/// A directory override resolves to `config.toml` inside it.
pub fn resolve_config_path(override_path: Option<PathBuf>) -> Result<PathBuf> {
    let path = match override_path {
        Some(path) => {
            let expanded = expand_path(path)?;
            if expanded.is_dir() {
                expanded.join("config.toml")
            } else {
                expanded
            }
        }
        None => default_config_dir()?.join("config.toml"),
    };

    if path.parent().is_none() {
        return Err(anyhow!("invalid config file path: {path:?}"));
    }
    Ok(path)
}

fn expand_path(path: PathBuf) -> Result<PathBuf> {
    match path.to_str() {
        Some(text) => {
            let expanded = shellexpand::full(text).context("expanding path")?;
            Ok(PathBuf::from(expanded.to_string()))
        }
        None => Ok(path),
    }
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.backend.mode, BackendMode::Auto);
        assert!(config.remote_backend().is_none());
        assert_eq!(config.simulation_timing(), SimulationTiming::default());
        assert_eq!(config.keepalive(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[server]
port = 9100
keepalive_secs = 0

[backend]
mode = "remote"
url = "ws://127.0.0.1:8090/acp"
command = ["agent", "--port", "8090"]
startup_timeout_secs = 5

[simulation]
char_delay_ms = 1
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.keepalive(), None);
        assert_eq!(config.backend.mode, BackendMode::Remote);
        assert_eq!(config.simulation.char_delay_ms, 1);
        assert_eq!(config.simulation.warmup_ms, 500);

        let remote = config.remote_backend().unwrap();
        assert_eq!(remote.url, "ws://127.0.0.1:8090/acp");
        assert_eq!(
            remote.command,
            Some(vec![
                "agent".to_string(),
                "--port".to_string(),
                "8090".to_string()
            ])
        );
        assert_eq!(remote.startup_timeout, Duration::from_secs(5));

        let backend = config.build_backend().unwrap();
        assert!(backend.is_available());
    }

    #[test]
    fn test_blank_url_means_simulation() {
        let mut config = AppConfig::default();
        config.backend.url = Some("  ".to_string());
        assert!(config.remote_backend().is_none());
        assert!(!config.build_backend().unwrap().is_available());
    }

    #[test]
    fn test_default_config_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        write_default_config(&path).unwrap();

        let body = fs::read_to_string(&path).unwrap();
        assert!(body.starts_with("# Configuration for flowgate"));

        let config = load_config(&path).unwrap();
        assert_eq!(config.server.port, ServerConfig::default().port);
        assert_eq!(config.backend.mode, BackendMode::Auto);
    }

    #[test]
    fn test_first_run_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowgate").join("config.toml");
        assert!(!path.exists());

        let config = load_or_init_config(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.server.port, 8000);

        // An existing file is left alone.
        fs::write(&path, "[server]\nport = 9001\n").unwrap();
        assert_eq!(load_or_init_config(&path).unwrap().server.port, 9001);
    }

    #[test]
    fn test_directory_override_resolves_to_config_toml() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_config_path(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(resolved, dir.path().join("config.toml"));
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(env_prefix(), "FLOWGATE");
    }
}
