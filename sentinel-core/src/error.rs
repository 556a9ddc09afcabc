use thiserror::Error;

/// All errors produced by sentinel-core.
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("no default input device found")]
    NoInputDevice,

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed audio payload: {0}")]
    Decode(String),

    #[error("no available team for this incident")]
    NoMatch,

    #[error("incident {0} already has an assignment")]
    AlreadyAssigned(String),

    #[error("team {0} is not available")]
    TeamUnavailable(String),

    #[error("unknown incident: {0}")]
    UnknownIncident(String),

    #[error("unknown team: {0}")]
    UnknownTeam(String),

    #[error("session is already running")]
    AlreadyRunning,

    #[error("session is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SentinelError>;
