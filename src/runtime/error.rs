// ABOUTME: Runtime error types with SNAFU pattern.
// ABOUTME: Covers failures to reach or construct a client for the container engine.

use snafu::Snafu;

/// Failure to construct a client for, or reach, the container engine.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RuntimeError {
    #[snafu(display("unsupported engine host {host}: expected unix://, tcp:// or http://"))]
    UnsupportedHost { host: String },

    #[snafu(display("TLS verification needs a tcp:// or https:// engine host, got {host}"))]
    TlsHost { host: String },

    #[snafu(display("runtime connection failed: {source}"))]
    Connection { source: bollard::errors::Error },

    #[snafu(display("engine at {host} did not answer ping: {source}"))]
    Unreachable {
        host: String,
        source: bollard::errors::Error,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// The configured host string could not be used.
    InvalidHost,
    /// Failed to build a client for the engine socket.
    ConnectionFailed,
    /// Client built but the engine did not respond.
    Unreachable,
}

impl RuntimeError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> RuntimeErrorKind {
        match self {
            RuntimeError::UnsupportedHost { .. } | RuntimeError::TlsHost { .. } => {
                RuntimeErrorKind::InvalidHost
            }
            RuntimeError::Connection { .. } => RuntimeErrorKind::ConnectionFailed,
            RuntimeError::Unreachable { .. } => RuntimeErrorKind::Unreachable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_host_kind() {
        let err = RuntimeError::UnsupportedHost {
            host: "ssh://box".to_string(),
        };
        assert_eq!(err.kind(), RuntimeErrorKind::InvalidHost);
        assert!(err.to_string().contains("ssh://box"));
    }
}
