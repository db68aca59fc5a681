//! Error types for tun-firewall
//!
//! This module defines the error hierarchy for the firewall core.
//! All errors are categorized by subsystem and include recovery hints.

use std::io;

use thiserror::Error;

/// Top-level error type for tun-firewall
#[derive(Debug, Error)]
pub enum FirewallError {
    /// Configuration errors (file parsing, validation)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Packet parsing errors
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    /// Tunnel device errors
    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    /// Session lifecycle errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// I/O errors not covered by other categories
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FirewallError {
    /// Check if this error is recoverable (can retry operation)
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) => false,
            Self::Packet(e) => e.is_recoverable(),
            Self::Tunnel(e) => e.is_recoverable(),
            Self::Session(e) => e.is_recoverable(),
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
            ),
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found or inaccessible
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Validation error (invalid values, missing required fields)
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// Environment variable error
    #[error("Environment variable error: {name}: {reason}")]
    EnvError { name: String, reason: String },

    /// Invalid rule definition
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    /// I/O error while reading config
    #[error("I/O error reading configuration: {0}")]
    IoError(#[from] io::Error),
}

impl ConfigError {
    /// Config errors are generally not recoverable without user intervention
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        false
    }
}

/// Packet parsing errors
///
/// Packet errors are recovered locally by the forwarding loop: the offending
/// packet is dropped and the loop continues with the next read.
#[derive(Debug, Error)]
pub enum PacketError {
    /// Buffer too short to contain a minimal IPv4 header
    #[error("Malformed packet: {len} bytes, need at least {min}")]
    Malformed { len: usize, min: usize },
}

impl PacketError {
    /// Packet errors never terminate the session
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        true
    }
}

/// Tunnel device errors
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The platform refused or failed to create the virtual interface
    #[error("Failed to establish tunnel device: {0}")]
    Establishment(String),

    /// Read/write failure while the session is running; fatal to the session
    #[error("Tunnel I/O error: {0}")]
    Io(#[from] io::Error),

    /// The device handle has been closed
    #[error("Tunnel device is closed")]
    Closed,

    /// Missing privileges to create the interface
    #[error("Permission denied: creating a TUN device requires CAP_NET_ADMIN")]
    PermissionDenied,
}

impl TunnelError {
    /// Check if this error is recoverable
    ///
    /// Establishment failures can be retried with an explicit `start()`;
    /// I/O failures terminate the current session.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Establishment(_) => true,
            Self::Io(_) | Self::Closed | Self::PermissionDenied => false,
        }
    }

    /// Create an establishment error
    pub fn establishment(reason: impl Into<String>) -> Self {
        Self::Establishment(reason.into())
    }
}

/// Session lifecycle errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// `start()` called while a session is already running
    #[error("Session is already running")]
    AlreadyRunning,

    /// `start()` called while the previous session is still shutting down
    #[error("Session is stopping")]
    Stopping,

    /// Tunnel establishment failed; the session stays in its previous state
    #[error(transparent)]
    Establishment(#[from] TunnelError),
}

impl SessionError {
    /// Check if this error is recoverable
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::AlreadyRunning => false,
            Self::Stopping => true,
            Self::Establishment(e) => e.is_recoverable(),
        }
    }
}

/// Type alias for Result with `FirewallError`
pub type Result<T> = std::result::Result<T, FirewallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_recovery_classification() {
        // Config errors are not recoverable
        let config_err = ConfigError::ValidationError("test".into());
        assert!(!config_err.is_recoverable());

        // Malformed packets are recovered locally
        let packet_err = PacketError::Malformed { len: 10, min: 20 };
        assert!(packet_err.is_recoverable());

        // Establishment failures can be retried with an explicit start()
        let est_err = TunnelError::establishment("device busy");
        assert!(est_err.is_recoverable());

        // I/O failures are fatal to the session
        let io_err = TunnelError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(!io_err.is_recoverable());

        // A handle closed out from under the session is equally fatal
        assert!(!TunnelError::Closed.is_recoverable());

        // Permission denied is not recoverable
        assert!(!TunnelError::PermissionDenied.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = PacketError::Malformed { len: 10, min: 20 };
        let msg = err.to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("20"));

        let err = TunnelError::PermissionDenied;
        assert!(err.to_string().contains("CAP_NET_ADMIN"));
    }

    #[test]
    fn test_error_conversion() {
        let tunnel_err = TunnelError::establishment("refused");
        let session_err: SessionError = tunnel_err.into();
        assert!(matches!(session_err, SessionError::Establishment(_)));

        let io_err = io::Error::new(io::ErrorKind::TimedOut, "timeout");
        let fw_err: FirewallError = io_err.into();
        assert!(fw_err.is_recoverable());
    }
}
