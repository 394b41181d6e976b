use std::io;

pub type Result<T> = std::result::Result<T, FsError>;

/// Failure taxonomy shared by every backend.
///
/// Ordinary existence mismatches (creating a file that already exists,
/// deleting one that does not) are *not* errors; the operations report them
/// as `Ok(false)` / `Ok(None)` instead.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Transport or authentication failure while establishing the session.
    /// Fatal to the adapter instance; reconnect or discard it.
    #[error("failed to connect to {endpoint}")]
    Connection {
        endpoint: String,
        #[source]
        source: anyhow::Error,
    },

    /// A read was requested for a path that holds no file.
    #[error("no file at {path}")]
    NotFound { path: String },

    /// A path the core itself cannot decompose.
    #[error("invalid remote path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// A backend-native hard failure not explained by the existence rules:
    /// permission denied, quota exceeded, path rejected by the server.
    /// The raw backend error rides along as the source; it never surfaces
    /// as its own type.
    #[error("{op} failed for {path}")]
    Protocol {
        op: &'static str,
        path: String,
        #[source]
        source: anyhow::Error,
    },

    /// Local I/O failure while staging or buffering transfer data.
    #[error("local staging failed")]
    Staging(#[source] io::Error),
}

impl FsError {
    pub(crate) fn connection(
        endpoint: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        FsError::Connection {
            endpoint: endpoint.into(),
            source: source.into(),
        }
    }

    pub(crate) fn protocol(
        op: &'static str,
        path: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        FsError::Protocol {
            op,
            path: path.into(),
            source: source.into(),
        }
    }
}
