use std::{env, fmt, fs, path, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub directory: Directory,
    pub schedule: Schedule,
    pub probe: Probe,
}

/// Job directory / result store connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Directory {
    pub server_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schedule {
    pub fetch_interval_seconds: u64,
    pub heartbeat_interval_seconds: u64,
    pub tick_millis: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Probe {
    pub ping_program: String,
    pub sink_timeout_seconds: u64,
}

/// Values given on the command line; they win over file and environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub api_key: Option<String>,
    pub server_url: Option<String>,
    pub fetch_interval_seconds: Option<u64>,
    pub heartbeat_interval_seconds: Option<u64>,
    pub ping_program: Option<String>,
}

impl Default for Directory {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:5001".into(),
            api_key: None,
            request_timeout_seconds: 10,
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self { fetch_interval_seconds: 300, heartbeat_interval_seconds: 60, tick_millis: 1000 }
    }
}

impl Default for Probe {
    fn default() -> Self {
        Self { ping_program: "ping".into(), sink_timeout_seconds: 5 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self { directory: Directory::default(), schedule: Schedule::default(), probe: Probe::default() }
    }
}

/// Used to ensure we are actually reading a toml file
pub fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/probe-agent/config.toml or
/// $HOME/.config/...)
pub fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    default_config_path_with(|name| env::var(name).ok())
}

fn default_config_path_with<F>(lookup: F) -> Result<path::PathBuf, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let path = if let Some(config_home) = lookup("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = lookup("HOME").filter(|v| !v.is_empty()) {
        path::PathBuf::from(home_dir).join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("probe-agent/config.toml"))
}

/// Parse `name` into `target`, keeping the current value when it does not parse
fn parse_env<F, T>(lookup: &F, name: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    if let Some(raw) = lookup(name) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(error) => warn!(variable = name, %error, "Ignoring unparseable environment value"),
        }
    }
}

fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 { "****".into() } else { format!("{visible}****") }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        let api_key =
            self.directory.api_key.as_deref().map(mask_secret).unwrap_or_else(|| "<not set>".into());

        writeln!(f, "Current Probe Configuration:")?;
        write_title_1(f, "Directory")?;
        write_1(f, "Server URL", &self.directory.server_url)?;
        write_1(f, "API Key", &api_key)?;
        write_1(f, "Request Timeout (s)", &self.directory.request_timeout_seconds)?;
        write_title_1(f, "Schedule")?;
        write_1(f, "Fetch Interval (s)", &self.schedule.fetch_interval_seconds)?;
        write_1(f, "Heartbeat Interval (s)", &self.schedule.heartbeat_interval_seconds)?;
        write_1(f, "Tick (ms)", &self.schedule.tick_millis)?;
        write_title_1(f, "Probe")?;
        write_1(f, "Ping Program", &self.probe.ping_program)?;
        write_1(f, "Sink Timeout (s)", &self.probe.sink_timeout_seconds)?;

        Ok(())
    }
}

impl Config {
    /// Effective configuration: file, then environment, then command line.
    pub fn load(
        optional_path: Option<&path::Path>,
        overrides: &Overrides,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::from_config(optional_path)?;
        config.apply_env(|name| env::var(name).ok());
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Read the config file.
    ///
    /// An explicit path must exist. Without one, the default location is used
    /// when present and built-in defaults otherwise.
    pub fn from_config(optional_path: Option<&path::Path>) -> Result<Self, ConfigError> {
        let config_path = match optional_path {
            Some(path) => normalize_toml_path(path),
            None => match default_config_path() {
                Ok(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let raw_string = fs::read_to_string(&config_path)
            .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
        toml::from_str(raw_string.as_str())
            .map_err(|source| ConfigError::ParseFailed { path: config_path, source })
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }

    /// Apply the `API_KEY`, `SERVER_URL`, `FETCH_INTERVAL`, ... variables.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_key) = lookup("API_KEY").filter(|v| !v.trim().is_empty()) {
            self.directory.api_key = Some(api_key.trim().to_string());
        }
        if let Some(server_url) = lookup("SERVER_URL").filter(|v| !v.trim().is_empty()) {
            self.directory.server_url = server_url.trim().to_string();
        }
        if let Some(program) = lookup("PING_PROGRAM").filter(|v| !v.trim().is_empty()) {
            self.probe.ping_program = program.trim().to_string();
        }
        parse_env(&lookup, "FETCH_INTERVAL", &mut self.schedule.fetch_interval_seconds);
        parse_env(&lookup, "HEARTBEAT_INTERVAL", &mut self.schedule.heartbeat_interval_seconds);
        parse_env(&lookup, "TICK_MILLIS", &mut self.schedule.tick_millis);
        parse_env(&lookup, "REQUEST_TIMEOUT", &mut self.directory.request_timeout_seconds);
        parse_env(&lookup, "SINK_TIMEOUT", &mut self.probe.sink_timeout_seconds);
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(api_key) = &overrides.api_key {
            self.directory.api_key = Some(api_key.clone());
        }
        if let Some(server_url) = &overrides.server_url {
            self.directory.server_url = server_url.clone();
        }
        if let Some(seconds) = overrides.fetch_interval_seconds {
            self.schedule.fetch_interval_seconds = seconds;
        }
        if let Some(seconds) = overrides.heartbeat_interval_seconds {
            self.schedule.heartbeat_interval_seconds = seconds;
        }
        if let Some(program) = &overrides.ping_program {
            self.probe.ping_program = program.clone();
        }
    }

    /// Check everything except the API key, which only `run` needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("fetch_interval_seconds", self.schedule.fetch_interval_seconds),
            ("heartbeat_interval_seconds", self.schedule.heartbeat_interval_seconds),
            ("tick_millis", self.schedule.tick_millis),
            ("request_timeout_seconds", self.directory.request_timeout_seconds),
            ("sink_timeout_seconds", self.probe.sink_timeout_seconds),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ZeroValue(field));
        }

        self.server_url()?;
        Ok(())
    }

    /// The credential for the directory service; its absence is fatal.
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.directory
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn server_url(&self) -> Result<Url, ConfigError> {
        let raw = self.directory.server_url.trim();
        let invalid = |reason: String| ConfigError::InvalidServerUrl { url: raw.to_string(), reason };

        let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(invalid(format!("unsupported scheme '{other}'"))),
        }
    }
}
