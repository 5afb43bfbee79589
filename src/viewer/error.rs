use crate::viewer::window::WindowId;

/// Status code written for a command that completed without error.
pub const STATUS_OK: i32 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerError {
    /// The command queue was at capacity and the newest request was dropped.
    QueueFull { operation: &'static str },
    /// An identical request was already queued.
    Duplicate { operation: &'static str },
    InvalidArguments(String),
    /// The windowing provider could not create a context for this window.
    /// Fatal to the window, never to the process.
    ContextAcquisitionFailed { title: String, reason: String },
    UnknownWindow(WindowId),
    /// The owner thread is gone (or never started); the request was not run.
    OwnerStopped,
    /// A synchronous round trip was attempted from the owner thread itself.
    OwnerThreadReentry,
}

impl ViewerError {
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidArguments(_) => 1,
            Self::ContextAcquisitionFailed { .. } => 4,
            Self::UnknownWindow(_) => 5,
            Self::QueueFull { .. } => 6,
            Self::Duplicate { .. } => 7,
            Self::OwnerStopped => 8,
            Self::OwnerThreadReentry => 9,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }
}

impl std::fmt::Display for ViewerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QueueFull { operation } => {
                write!(f, "queue full - '{operation}' command dropped")
            }
            Self::Duplicate { operation } => {
                write!(f, "'{operation}' command already queued")
            }
            Self::InvalidArguments(message) => write!(f, "invalid arguments: {message}"),
            Self::ContextAcquisitionFailed { title, reason } => {
                write!(f, "unable to acquire a graphics context for '{title}': {reason}")
            }
            Self::UnknownWindow(id) => write!(f, "no active window with id {id}"),
            Self::OwnerStopped => write!(f, "viewer owner thread is not running"),
            Self::OwnerThreadReentry => {
                write!(f, "synchronous viewer call issued from the owner thread")
            }
        }
    }
}

impl std::error::Error for ViewerError {}

/// Converts a command outcome into the integer status convention used by
/// the result slot.
pub fn status_code<T>(result: &Result<T, ViewerError>) -> i32 {
    match result {
        Ok(_) => STATUS_OK,
        Err(err) => err.code(),
    }
}
