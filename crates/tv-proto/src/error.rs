use thiserror::Error;

/// Failure to obtain a channel roster.  An empty roster is *not* an error;
/// it is reported as a zero-length list and handled as its own UI state.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    /// Connection, DNS, TLS or timeout failure.
    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    /// The endpoint answered with a non-2xx status.
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    /// The listing endpoint returned something that is not a channel array.
    #[error("channel list from {url} is malformed: {reason}")]
    Malformed { url: String, reason: String },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Network { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::Malformed { url, .. } => url,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChannelListError {
    #[error("duplicate channel id {0:?}")]
    DuplicateId(String),

    #[error("channel {name:?} is missing a name or url")]
    MissingField { name: String },
}

/// Errors raised by a streaming engine while accepting a command.  Playback
/// failures are *not* reported here; they arrive later as engine events.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("streaming engine is not available: {0}")]
    Unavailable(String),

    #[error("streaming engine rejected the source {url}: {reason}")]
    Rejected { url: String, reason: String },
}
