use crate::dispatcher::DispatchError;
use crate::external::ConnectionError;

use std::{error::Error, fmt::Display};

/// Anything that stops a binary from running.
#[derive(Debug)]
pub enum MonitorError {
    /// Terminal, file or port io failed.
    IOError(std::io::Error),
    /// The dispatcher refused an operation.
    Dispatch(DispatchError),
    /// An external connection could not be opened.
    Connection(ConnectionError),
}

impl Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorError::IOError(e) => write!(f, "io error: {}", e),
            MonitorError::Dispatch(e) => write!(f, "{}", e),
            MonitorError::Connection(e) => write!(f, "external connection: {}", e),
        }
    }
}

impl Error for MonitorError {}

impl From<std::io::Error> for MonitorError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl From<DispatchError> for MonitorError {
    fn from(value: DispatchError) -> Self {
        Self::Dispatch(value)
    }
}

impl From<ConnectionError> for MonitorError {
    fn from(value: ConnectionError) -> Self {
        Self::Connection(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_dispatch_errors() {
        let e: MonitorError = DispatchError::MergeNeedsTwoScenarios.into();
        assert_eq!(
            e.to_string(),
            "at least two scenarios are required for merge to make sense"
        );
    }
}
