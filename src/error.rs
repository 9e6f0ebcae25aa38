use std::path::PathBuf;

use thiserror::Error;

/// Profile and settings errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field '{field}' for {role}")]
    MissingField { field: &'static str, role: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read profile {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse profile {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read settings: {0}")]
    ReadSettings(#[source] std::io::Error),

    #[error("failed to parse settings: {0}")]
    ParseSettings(#[source] toml::de::Error),
}

/// Errors raised while applying `dotted.path=value` CLI overrides.
#[derive(Error, Debug)]
pub enum OverrideError {
    #[error("override syntax must be 'dotted.path=value', got '{0}'")]
    Syntax(String),

    #[error("illegal list index '{segment}' at '{path}'")]
    IllegalIndex { segment: String, path: String },

    #[error("list index {index} out of bounds (len {len}) at '{path}'")]
    IndexOutOfBounds {
        index: usize,
        len: usize,
        path: String,
    },
}

/// Cluster record storage errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cluster '{0}' already exists")]
    Duplicate(String),

    #[error("cluster '{0}' does not exist")]
    NotFound(String),

    #[error("wrong cluster name '{given}', use '{canonical}' instead")]
    InvalidName { given: String, canonical: String },

    #[error("failed to access cluster record '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode cluster record '{name}': {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Override(#[from] OverrideError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("connection to {endpoint} failed after {attempts} attempts")]
    Connection { endpoint: String, attempts: u32 },

    #[error("timed out waiting for {what} after {attempts} attempts")]
    Timeout { what: String, attempts: u32 },

    #[error("remote command on {host} failed: {reason}")]
    Remote { host: String, reason: String },

    #[error("provider request failed: {0}")]
    Provider(String),

    #[error(
        "creating cluster '{name}' failed; instance(s) still running: [{}]: {source}",
        .instances.join(", ")
    )]
    CreateFailed {
        name: String,
        instances: Vec<String>,
        #[source]
        source: Box<Error>,
    },

    #[error("cluster record '{name}' is unusable: {reason}")]
    Record { name: String, reason: String },

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("refusing to proceed: {0}")]
    Refused(String),

    #[error("operation interrupted")]
    Interrupted,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        // dialoguer::Error wraps an IO error
        Error::Io(std::io::Error::other(err.to_string()))
    }
}
