use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::artifacts::{DownloadError, TransportSession, DEFAULT_MAX_READ_SIZE};
use crate::pwscore::DEFAULT_PWSCORE_PATH;

pub const CONFIG_ENV: &str = "SOS_CONSOLE_CONFIG";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/sos-console.toml";

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        error: std::io::Error,
    },
    Parse {
        path: PathBuf,
        error: toml::de::Error,
    },
    Invalid {
        path: PathBuf,
        detail: String,
    },
    MissingTransport,
    Transport(DownloadError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, error } => {
                write!(f, "failed to read config {}: {error}", path.display())
            }
            ConfigError::Parse { path, error } => {
                write!(f, "failed to parse config {}: {error}", path.display())
            }
            ConfigError::Invalid { path, detail } => {
                write!(f, "invalid config {}: {detail}", path.display())
            }
            ConfigError::MissingTransport => write!(
                f,
                "no [transport] section configured; set uri, host and csrf_token to build download links"
            ),
            ConfigError::Transport(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    pub uri: String,
    #[serde(default = "default_transport_host")]
    pub host: String,
    pub csrf_token: String,
}

fn default_transport_host() -> String {
    "localhost".to_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConsoleConfig {
    /// Skips sos.conf lookup when set.
    pub report_dir: Option<PathBuf>,
    pub sos_command: Vec<String>,
    pub superuser_command: Vec<String>,
    pub poll_interval_ms: u64,
    pub max_read_size: u64,
    pub pwscore_path: PathBuf,
    pub transport: Option<TransportConfig>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            report_dir: None,
            sos_command: vec!["sos".to_owned(), "report".to_owned(), "--batch".to_owned()],
            superuser_command: vec!["sudo".to_owned(), "--non-interactive".to_owned()],
            poll_interval_ms: 1000,
            max_read_size: DEFAULT_MAX_READ_SIZE,
            pwscore_path: PathBuf::from(DEFAULT_PWSCORE_PATH),
            transport: None,
        }
    }
}

impl ConsoleConfig {
    /// Loads the first config found: explicit path, `SOS_CONSOLE_CONFIG`,
    /// then the system file. No file at all means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Self::load_from(explicit, env_path.as_deref(), Path::new(SYSTEM_CONFIG_PATH))
    }

    pub fn load_from(
        explicit: Option<&Path>,
        env_path: Option<&Path>,
        system_path: &Path,
    ) -> Result<Self, ConfigError> {
        if let Some(path) = explicit.or(env_path) {
            return Self::read(path);
        }
        if system_path.is_file() {
            return Self::read(system_path);
        }
        log::debug!("no config file found, using defaults");
        Ok(Self::default())
    }

    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_path_buf(),
            error,
        })?;
        let config = Self::parse(&source).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })?;
        config.validate(path)?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        if self.sos_command.is_empty() {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                detail: "sos_command must not be empty".to_owned(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                detail: "poll_interval_ms must be positive".to_owned(),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn transport_session(&self) -> Result<TransportSession, ConfigError> {
        let transport = self
            .transport
            .as_ref()
            .ok_or(ConfigError::MissingTransport)?;
        TransportSession::parse(&transport.uri, &transport.host, &transport.csrf_token)
            .map_err(ConfigError::Transport)
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
