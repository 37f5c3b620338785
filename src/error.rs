//! Top-level error types for PocketPaw.

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors. Fatal at startup, never recovered at runtime.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to prepare config directory {path}: {source}")]
    ConfigDir {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("channel '{channel}' is not configured: {missing}")]
    ChannelNotConfigured { channel: String, missing: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Persistence errors for the mission-control store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to load {kind} from {path}: {source}")]
    Load {
        kind: &'static str,
        path: String,
        source: anyhow::Error,
    },

    #[error("failed to persist {kind}: {source}")]
    Persist {
        kind: &'static str,
        source: anyhow::Error,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Input validation errors. Surface as 400/422 at the API boundary.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    #[error("{field} too long: {actual} chars (max {max})")]
    TooLong {
        field: &'static str,
        actual: usize,
        max: usize,
    },

    #[error("{field} too short: {actual} chars (min {min})")]
    TooShort {
        field: &'static str,
        actual: usize,
        min: usize,
    },

    #[error("Invalid research_depth '{value}': must be one of {valid:?}")]
    InvalidResearchDepth {
        value: String,
        valid: &'static [&'static str],
    },

    #[error("invalid {field} value: {value}")]
    InvalidEnum { field: &'static str, value: String },

    #[error("dependency graph has a cycle involving task {task_id}")]
    DependencyCycle { task_id: String },

    #[error("task {task_id} depends on unknown task {missing}")]
    UnknownDependency { task_id: String, missing: String },
}

/// Agent execution and routing errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("unknown agent backend: {0}")]
    UnknownBackend(String),

    #[error("maximum concurrent tasks ({max}) reached")]
    CapacityExceeded { max: usize },

    #[error("task {task_id} is already running")]
    AlreadyRunning { task_id: String },

    #[error("agent run failed: {0}")]
    RunFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Channel adapter and media errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("media download failed: {0}")]
    MediaDownload(String),

    #[error("file '{name}' ({size_mb:.1} MB) exceeds limit of {max_mb} MB")]
    MediaTooLarge {
        name: String,
        size_mb: f64,
        max_mb: u64,
    },

    #[error("send failed on {channel}: {reason}")]
    SendFailed { channel: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
