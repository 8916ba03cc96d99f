use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Emulator process not found: {0}")]
    ProcessNotFound(String),

    #[error("Failed to open emulator process: {0}")]
    ProcessOpenFailed(String),

    #[error("Failed to read host memory at address {address:#x}: {message}")]
    MemoryFault { address: u64, message: String },

    #[error("Guest address {guest:#x} is unmapped")]
    Unmapped { guest: u64 },

    #[error("Monitor channel disconnected")]
    Disconnected,

    #[error("Monitor request timed out: {0}")]
    Timeout(String),

    #[error("Monitor protocol error: {0}")]
    Protocol(String),

    #[error("Failed to decode value: {0}")]
    Decode(String),

    #[error("Invalid layout schema: {0}")]
    InvalidSchema(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error requires a monitor channel reconnect before
    /// any further translation can succeed.
    pub fn is_channel_fault(&self) -> bool {
        matches!(
            self,
            Error::Disconnected | Error::Timeout(_) | Error::Protocol(_)
        )
    }

    /// Check if this error is a per-address fault (the channel itself is
    /// still healthy and the tick can be retried).
    pub fn is_memory_fault(&self) -> bool {
        matches!(self, Error::MemoryFault { .. } | Error::Unmapped { .. })
    }
}
