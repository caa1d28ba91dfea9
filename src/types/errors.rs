use thiserror::Error;

// === BackendError ===

/// Failures reported by a backend call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The target table does not exist in the backend schema.
    #[error("Table not found: {0}")]
    MissingTable(String),
    /// An authorization or row-level policy rejected the request.
    #[error("Denied by access policy: {0}")]
    PolicyDenied(String),
    /// The backend rejected the request for another reason.
    #[error("Backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// The request never reached the backend or the response was lost.
    #[error("Network error: {0}")]
    Network(String),
    /// The call requires a signed-in session.
    #[error("No active session")]
    NoSession,
    /// The response body did not match the expected shape.
    #[error("Malformed backend response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err.to_string())
    }
}

// === FetchError ===

/// Errors from a full bookmark fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Failed to fetch bookmarks: {0}")]
    Backend(#[from] BackendError),
}

// === DispatchError ===

/// Why a backend rejection happened, as surfaced to dispatcher callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RejectReason {
    #[error("the bookmarks table is missing: {0}")]
    MissingTable(String),
    #[error("access policy denied the request: {0}")]
    PolicyDenied(String),
    #[error("{message} (status {status})")]
    Other { status: u16, message: String },
}

/// Errors surfaced by the create and delete dispatchers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// No identity is signed in.
    #[error("Not authenticated")]
    NotAuthenticated,
    /// A required input field is empty.
    #[error("Validation failed: {0} must not be empty")]
    Validation(String),
    /// The backend refused the mutation.
    #[error("Backend rejected mutation: {0}")]
    BackendRejected(RejectReason),
    /// The backend could not be reached.
    #[error("Network error: {0}")]
    Network(String),
}

impl From<BackendError> for DispatchError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::MissingTable(msg) => {
                DispatchError::BackendRejected(RejectReason::MissingTable(msg))
            }
            BackendError::PolicyDenied(msg) => {
                DispatchError::BackendRejected(RejectReason::PolicyDenied(msg))
            }
            BackendError::Rejected { status, message } => {
                DispatchError::BackendRejected(RejectReason::Other { status, message })
            }
            BackendError::Network(msg) => DispatchError::Network(msg),
            BackendError::NoSession => DispatchError::NotAuthenticated,
            BackendError::Decode(msg) => DispatchError::BackendRejected(RejectReason::Other {
                status: 0,
                message: msg,
            }),
        }
    }
}

// === ChannelError ===

/// Errors related to the push channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel could not be opened.
    #[error("Failed to open change channel: {0}")]
    Open(#[from] BackendError),
    /// A channel is already open for this store.
    #[error("Change channel already open")]
    AlreadyOpen,
    /// The channel sent a frame that could not be understood.
    #[error("Change channel protocol error: {0}")]
    Protocol(String),
}

// === ConfigError ===

/// Errors related to loading and saving client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading or writing the config file.
    #[error("Config I/O error: {0}")]
    Io(String),
    /// The config file could not be parsed or written.
    #[error("Config serialization error: {0}")]
    Serialization(String),
    /// A config value failed validation.
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}
