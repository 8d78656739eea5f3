use thiserror::Error;

/// Type alias for Result with DigestError
pub type Result<T> = std::result::Result<T, DigestError>;

/// Returned in place of a digest when the login was not completed in time
pub const AUTH_TIMEOUT_MESSAGE: &str = "Login timeout. Please try again.";

/// Returned when a run finished without a single usable message
pub const NO_MESSAGES_MESSAGE: &str = "No messages found. This could be because:\n\
1. No chats were visible in the chat list\n\
2. The chat limit excluded every chat\n\
3. The messages could not be read from the page";

/// Returned when the browser could not be started at all
pub const SESSION_UNAVAILABLE_MESSAGE: &str =
    "Failed to start Chrome. Please make sure Chrome browser is installed and up to date.";

/// Returned when the browser went away in the middle of a run
pub const SESSION_TERMINATED_MESSAGE: &str =
    "The browser session ended unexpectedly. Please try again.";

/// Which field of a message a normalization cascade failed to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageField {
    Body,
    Sender,
    Timestamp,
}

impl std::fmt::Display for MessageField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageField::Body => write!(f, "body"),
            MessageField::Sender => write!(f, "sender"),
            MessageField::Timestamp => write!(f, "timestamp"),
        }
    }
}

/// Error taxonomy for a digest run
#[derive(Error, Debug)]
pub enum DigestError {
    /// Browser or driver could not be started
    #[error("Browser session unavailable: {0}")]
    SessionUnavailable(String),

    /// Login was not completed within its bound
    #[error("Authentication timed out: {0}")]
    AuthTimeout(String),

    /// The chat list resolved to zero conversations
    #[error("No conversations found")]
    NoConversationsFound,

    /// A conversation yielded zero messages after every cascade and retry
    #[error("No messages harvested from '{title}'")]
    HarvestExhausted { title: String },

    /// A field cascade fully failed for one message
    #[error("Could not extract {field} for message {ordinal}")]
    NormalizationGap { field: MessageField, ordinal: usize },

    /// Browser crashed or was closed mid-run
    #[error("Browser session terminated: {0}")]
    SessionTerminated(String),

    /// A single page operation failed
    #[error("Driver error: {0}")]
    Driver(String),

    /// Boundary arguments out of range
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A mail transport refused the digest
    #[error("Mail delivery failed: {0}")]
    Delivery(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl DigestError {
    /// Errors that abort the whole run instead of skipping one chat or message
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            DigestError::SessionUnavailable(_)
                | DigestError::AuthTimeout(_)
                | DigestError::SessionTerminated(_)
        )
    }

    /// The single string handed back to the caller in place of a digest
    pub fn user_message(&self) -> String {
        match self {
            DigestError::SessionUnavailable(_) => SESSION_UNAVAILABLE_MESSAGE.to_string(),
            DigestError::AuthTimeout(_) => AUTH_TIMEOUT_MESSAGE.to_string(),
            DigestError::NoConversationsFound => NO_MESSAGES_MESSAGE.to_string(),
            DigestError::SessionTerminated(_) => SESSION_TERMINATED_MESSAGE.to_string(),
            other => format!("An unexpected error occurred: {}", other),
        }
    }
}

impl From<chromiumoxide::error::CdpError> for DigestError {
    fn from(error: chromiumoxide::error::CdpError) -> Self {
        DigestError::Driver(error.to_string())
    }
}
