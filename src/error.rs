/*!

The error type shared by every fallible operation in the crate.

Configuration errors are raised at the call site that builds the invalid request. Missing data
during playback is never an error: unknown regions read as `None`.

*/

use std::fmt::{self, Display};
use std::io;

#[derive(Debug)]
pub enum IxaError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CsvError(csv::Error),
    LoggerError(log::SetLoggerError),
    /// A malformed simulation request or integrator call. Fatal to that one computation only.
    InvalidConfiguration(String),
    /// A region row arrived after the input barrier sealed the cache.
    CacheSealed(String),
    /// Playback was started before every expected input reported completion.
    InputsNotLoaded,
    InvalidPlaybackTransition {
        from: &'static str,
        action: &'static str,
    },
    IxaError(String),
}

impl IxaError {
    pub(crate) fn invalid_configuration(message: impl Into<String>) -> Self {
        IxaError::InvalidConfiguration(message.into())
    }
}

impl From<io::Error> for IxaError {
    fn from(error: io::Error) -> Self {
        IxaError::IoError(error)
    }
}

impl From<serde_json::Error> for IxaError {
    fn from(error: serde_json::Error) -> Self {
        IxaError::JsonError(error)
    }
}

impl From<csv::Error> for IxaError {
    fn from(error: csv::Error) -> Self {
        IxaError::CsvError(error)
    }
}

impl From<log::SetLoggerError> for IxaError {
    fn from(error: log::SetLoggerError) -> Self {
        IxaError::LoggerError(error)
    }
}

impl From<String> for IxaError {
    fn from(error: String) -> Self {
        IxaError::IxaError(error)
    }
}

impl From<&str> for IxaError {
    fn from(error: &str) -> Self {
        IxaError::IxaError(error.to_string())
    }
}

impl std::error::Error for IxaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IxaError::IoError(error) => Some(error),
            IxaError::JsonError(error) => Some(error),
            IxaError::CsvError(error) => Some(error),
            IxaError::LoggerError(error) => Some(error),
            _ => None,
        }
    }
}

impl Display for IxaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IxaError::IoError(error) => write!(f, "io error: {error}"),
            IxaError::JsonError(error) => write!(f, "json error: {error}"),
            IxaError::CsvError(error) => write!(f, "csv error: {error}"),
            IxaError::LoggerError(error) => write!(f, "logger error: {error}"),
            IxaError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {message}")
            }
            IxaError::CacheSealed(code) => {
                write!(f, "region cache is sealed; cannot add region {code}")
            }
            IxaError::InputsNotLoaded => {
                write!(f, "playback cannot start before all inputs are loaded")
            }
            IxaError::InvalidPlaybackTransition { from, action } => {
                write!(f, "cannot {action} playback while {from}")
            }
            IxaError::IxaError(message) => write!(f, "{message}"),
        }
    }
}
