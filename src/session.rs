//! The seam between the shared file-operation algorithms and the three
//! protocol backends.
//!
//! Each adapter owns exactly one implementation of [`ProtocolSession`]; the
//! operation layer in [`crate::ops`] is written once against this trait. The
//! primitives mirror what every target protocol can express in a single
//! round trip — everything composite (recursive mkdir, staged copies,
//! idempotent outcomes) lives above this seam.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;

use crate::client::FileMetadata;
use crate::error::{FsError, Result};

/// One entry of a remote directory listing.
#[derive(Debug, Clone)]
pub(crate) struct RemoteEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

/// Primitives an opened, authenticated session must expose.
///
/// Errors returned by these methods are already mapped into [`FsError`];
/// "missing" conditions a primitive can express structurally (FTP reply 550,
/// SFTP `NoSuchFile`, smbclient `NT_STATUS_*` tokens) are resolved to normal
/// return values, never surfaced as errors.
#[async_trait]
pub(crate) trait ProtocolSession: Send {
    /// Whether a directory exists at `path`.
    async fn dir_exists(&mut self, path: &str) -> Result<bool>;

    /// Create a single directory; every ancestor must already exist.
    async fn make_dir(&mut self, path: &str) -> Result<()>;

    /// List the entries of a directory.
    async fn list_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>>;

    /// Whether a *file* (never a directory) exists at `path`. A missing
    /// parent directory reports `false`, not an error.
    async fn file_exists(&mut self, path: &str) -> Result<bool>;

    /// Remove the file at `path`.
    async fn remove_file(&mut self, path: &str) -> Result<()>;

    /// Whether the backend can rename `from` to `to` natively. Defaults to
    /// yes; SMB says no across shares and the move falls back to staging.
    fn can_rename(&self, from: &str, to: &str) -> bool {
        let _ = (from, to);
        true
    }

    /// Rename `from` to `to`; the target must not exist.
    async fn rename(&mut self, from: &str, to: &str) -> Result<()>;

    /// Open a reader positioned at the start of the file.
    async fn open_reader(&mut self, path: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>>;

    /// Write the full contents of `source` to a new file at `path`.
    async fn store_stream<'a>(
        &mut self,
        path: &str,
        source: &'a mut (dyn AsyncRead + Send + Unpin + 'a),
    ) -> Result<()>;

    /// Write a local file to `path`. The default goes through
    /// [`ProtocolSession::store_stream`]; SMB overrides it to hand the local
    /// path straight to smbclient.
    async fn store_local(&mut self, path: &str, local: &Path) -> Result<()> {
        let mut file = tokio::fs::File::open(local).await.map_err(FsError::Staging)?;
        self.store_stream(path, &mut file).await
    }

    /// Metadata of the file at `path`, or `None` when the file or its parent
    /// directory cannot be located.
    async fn stat(&mut self, path: &str) -> Result<Option<FileMetadata>>;

    /// Tear the session down. Best effort; failures are for the caller to log.
    async fn teardown(&mut self) -> Result<()>;
}
