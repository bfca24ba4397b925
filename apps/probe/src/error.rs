use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API key is not set (use --api-key, the API_KEY variable or `api_key` in the config file)")]
    MissingApiKey,

    #[error("Failed to read config file {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write config file {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("Config file {} already exists", .0.display())]
    AlreadyExists(PathBuf),

    #[error("No config directory available (neither XDG_CONFIG_HOME nor HOME is set)")]
    ConfigPathUnavailable,

    #[error("Invalid server URL '{url}': {reason}")]
    InvalidServerUrl { url: String, reason: String },

    #[error("{0} must be at least 1")]
    ZeroValue(&'static str),
}

/// Failures talking to the job directory / result store
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("{endpoint} request failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status { endpoint: &'static str, status: u16, body: String },

    #[error("{endpoint} returned an unreadable body: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures pushing a status to the monitoring sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Invalid sink URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Unsupported sink URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("Connection error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("HTTP Error {status}: {body}")]
    Status { status: u16, body: String },
}

/// Failures running the ping tool itself
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Ping did not finish within {}s", .0.as_secs())]
    TimedOut(Duration),
}

/// Keep response bodies in error messages short.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX_BODY_CHARS: usize = 200;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_BODY_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
