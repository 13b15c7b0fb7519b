use std::fmt;

/// Failure categories raised by the engine.
///
/// Engine calls return `anyhow::Result`; when the failure originates in the
/// engine itself the error carries one of these, so callers can tell a
/// missing asset from an I/O problem with `downcast_ref::<LmError>()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LmError {
    /// An API was called before `Engine::init` or after `Engine::shutdown`.
    Uninitialized,
    /// A property, name or combination of arguments is not acceptable.
    InvalidArgument(String),
    /// The requested feature or file format is not supported.
    Unsupported(String),
    /// A component key, plugin, asset or scene could not be found.
    NotFound(String),
    /// Reading or writing a file failed.
    Io { path: String, message: String },
}

impl fmt::Display for LmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LmError::Uninitialized => {
                write!(f, "engine is not initialized; call Engine::init first")
            }
            LmError::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            LmError::Unsupported(message) => write!(f, "unsupported: {message}"),
            LmError::NotFound(message) => write!(f, "not found: {message}"),
            LmError::Io { path, message } => write!(f, "i/o error on '{path}': {message}"),
        }
    }
}

impl std::error::Error for LmError {}

/// Returns the engine error kind carried by `err`, if any.
pub fn kind(err: &anyhow::Error) -> Option<&LmError> {
    err.downcast_ref::<LmError>()
}
