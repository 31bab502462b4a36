//! Error types for the core crate, split by component boundary the way the
//! teacher splits `LinkError`/`ModemError` in its bonding engine — callers
//! further up (the agent daemon shell) fold these into `anyhow::Error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("invalid value for `{key}`: {message}")]
    InvalidValue { key: String, message: String },
    #[error("score weights for class `{class}` must sum to 100, got {sum:.4}")]
    WeightsNotNormalized { class: String, sum: f64 },
}

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("probe timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("member `{0}` has no resolvable address")]
    NoAddress(String),
    #[error("transport error: {0}")]
    Transport(#[source] anyhow::Error),
    #[error("endpoint refused connection: {0}")]
    Refused(String),
    #[error("unsupported platform surface: {0}")]
    Unsupported(&'static str),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown member `{0}`")]
    UnknownMember(String),
    #[error("ring buffer capacity must be non-zero")]
    ZeroCapacity,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("backend `{backend}` apply failed: {message}")]
    ApplyFailed { backend: String, message: String },
    #[error("verification failed after {attempts} attempts for member `{member}`")]
    VerificationFailed { member: String, attempts: u32 },
    #[error("no backend available")]
    NoBackend,
    #[error("command execution error: {0}")]
    Exec(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to open audit log {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write audit record: {0}")]
    Write(#[source] std::io::Error),
    #[error("failed to rotate audit log: {0}")]
    Rotate(#[source] std::io::Error),
}
