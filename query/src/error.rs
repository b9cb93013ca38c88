//! Error taxonomy for talking to a single server

use serde::Serialize;
use shared::CodecError;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Failures of the datagram transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {addr}: {source}")]
    Connection {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    #[error("channel is closed")]
    Closed,
}

/// Failures of one server query
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("malformed response: {0}")]
    Decode(#[from] CodecError),
}

/// User-facing classification of a failed query
///
/// Raw error text stays in the logs; only these categories reach the
/// output document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCategory {
    #[serde(rename = "Connection timeout")]
    Timeout,
    #[serde(rename = "Connection refused")]
    ConnectionRefused,
    #[serde(rename = "Host unreachable")]
    HostUnreachable,
    #[serde(rename = "Query failed")]
    Connection,
    #[serde(rename = "Invalid response")]
    Decode,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Timeout => "Connection timeout",
            ErrorCategory::ConnectionRefused => "Connection refused",
            ErrorCategory::HostUnreachable => "Host unreachable",
            ErrorCategory::Connection => "Query failed",
            ErrorCategory::Decode => "Invalid response",
        }
    }

    fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorCategory::Timeout,
            io::ErrorKind::ConnectionRefused => ErrorCategory::ConnectionRefused,
            io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
                ErrorCategory::HostUnreachable
            }
            _ => ErrorCategory::Connection,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl QueryError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            QueryError::Transport(TransportError::Timeout(_)) => ErrorCategory::Timeout,
            QueryError::Transport(TransportError::Connection { source, .. })
            | QueryError::Transport(TransportError::Resolve { source, .. })
            | QueryError::Transport(TransportError::Io(source)) => ErrorCategory::from_io(source),
            QueryError::Transport(TransportError::Closed) => ErrorCategory::Connection,
            QueryError::Decode(_) => ErrorCategory::Decode,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, QueryError::Transport(TransportError::Timeout(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_category() {
        let err = QueryError::from(TransportError::Timeout(Duration::from_secs(3)));
        assert!(err.is_timeout());
        assert_eq!(err.category(), ErrorCategory::Timeout);
        assert_eq!(err.category().to_string(), "Connection timeout");
    }

    #[test]
    fn test_io_categories() {
        let refused = QueryError::from(TransportError::Io(io::Error::from(
            io::ErrorKind::ConnectionRefused,
        )));
        assert_eq!(refused.category(), ErrorCategory::ConnectionRefused);

        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let unreachable = QueryError::from(TransportError::Connection {
            addr,
            source: io::Error::from(io::ErrorKind::NetworkUnreachable),
        });
        assert_eq!(unreachable.category(), ErrorCategory::HostUnreachable);

        let unresolved = QueryError::from(TransportError::Resolve {
            host: "nowhere.invalid:27011".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        });
        assert_eq!(unresolved.category(), ErrorCategory::Connection);

        let other = QueryError::from(TransportError::Io(io::Error::other("boom")));
        assert_eq!(other.category(), ErrorCategory::Connection);
        assert!(!other.is_timeout());
    }

    #[test]
    fn test_decode_category() {
        let err = QueryError::from(CodecError::SplitPacket);
        assert_eq!(err.category(), ErrorCategory::Decode);
        assert_eq!(err.category().as_str(), "Invalid response");
    }
}
