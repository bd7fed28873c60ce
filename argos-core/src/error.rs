//! Error types for Argos

use thiserror::Error;

/// Result type alias for Argos operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Argos
#[derive(Error, Debug)]
pub enum Error {
    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Interface does not exist
    #[error("Interface {0} does not exist")]
    InterfaceNotFound(String),

    /// Interface error
    #[error("Interface error: {0}")]
    Interface(String),

    /// Bridge creation or configuration error
    #[error("Bridge error: {0}")]
    Bridge(String),

    /// Capture error that is not tied to a single interface
    #[error("Packet capture error: {0}")]
    Capture(String),

    /// Capture collaborator failure on one interface
    #[error("Packet capture failed on {interface}: {source}")]
    CaptureFailed {
        interface: String,
        #[source]
        source: Box<Error>,
    },

    /// External command exited with a non-zero status
    #[error("{context}: {stderr}")]
    Command {
        context: String,
        command: String,
        stderr: String,
    },

    /// External command executable is missing
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Result or configuration (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Packet parsing error
    #[error("Packet parsing error: {0}")]
    PacketParsing(String),

    /// Execution failed
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Operation interrupted
    #[error("Operation interrupted: {0}")]
    Interrupted(String),
}

impl Error {
    /// Create a capture error with a custom message
    pub fn capture<S: Into<String>>(msg: S) -> Self {
        Error::Capture(msg.into())
    }

    /// Create a bridge error with a custom message
    pub fn bridge<S: Into<String>>(msg: S) -> Self {
        Error::Bridge(msg.into())
    }

    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Wrap a collaborator error as a capture failure on `interface`
    pub fn capture_failed<S: Into<String>>(interface: S, source: Error) -> Self {
        Error::CaptureFailed {
            interface: interface.into(),
            source: Box::new(source),
        }
    }

    pub fn is_interface_error(&self) -> bool {
        matches!(self, Error::InterfaceNotFound(_) | Error::Interface(_))
    }

    pub fn is_bridge_error(&self) -> bool {
        matches!(self, Error::Bridge(_))
    }

    pub fn is_capture_error(&self) -> bool {
        matches!(self, Error::Capture(_) | Error::CaptureFailed { .. })
    }

    pub fn is_command_error(&self) -> bool {
        matches!(self, Error::Command { .. } | Error::CommandNotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_capture_failed_keeps_source() {
        let err = Error::capture_failed("eth0", Error::capture("libpcap not available"));
        assert!(err.is_capture_error());
        assert_eq!(
            err.to_string(),
            "Packet capture failed on eth0: Packet capture error: libpcap not available"
        );
        let source = err.source().expect("source preserved");
        assert!(source.to_string().contains("libpcap not available"));
    }

    #[test]
    fn test_interface_not_found_message() {
        let err = Error::InterfaceNotFound("wlan9".to_string());
        assert!(err.is_interface_error());
        assert!(!err.is_capture_error());
        assert_eq!(err.to_string(), "Interface wlan9 does not exist");
    }

    #[test]
    fn test_command_error_includes_stderr() {
        let err = Error::Command {
            context: "Failed to create bridge br0".to_string(),
            command: "ip link add br0 type bridge".to_string(),
            stderr: "RTNETLINK answers: Operation not permitted".to_string(),
        };
        assert!(err.is_command_error());
        assert_eq!(
            err.to_string(),
            "Failed to create bridge br0: RTNETLINK answers: Operation not permitted"
        );
    }
}
