pub mod ftp;
pub mod sftp;
pub mod smb;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::Result;

/// Metadata of a remote file, as reported by [`FileSystemClient::file_metadata`].
///
/// The timestamps are optional because their absence is a permanent property
/// of a backend, not a transient failure: SFTP never reports a creation time,
/// and the smbclient transport only surfaces the listing timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub path: String,
    pub size: u64,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

/// The protocol-agnostic file operations contract.
///
/// One instance owns at most one session at a time: [`connect`] establishes
/// it, [`close`] releases it, and re-connecting after a close is allowed.
/// Instances take `&mut self` throughout, so a single instance cannot be
/// shared across concurrent call sites; callers needing concurrency create
/// one client per concurrent unit of work.
///
/// Operations that return `bool` report ordinary existence mismatches as
/// `Ok(false)` — expected outcomes, not failures.
///
/// # Panics
///
/// Calling any operation other than [`connect`] and [`close`] before a
/// session exists is a programming error and panics.
///
/// [`connect`]: FileSystemClient::connect
/// [`close`]: FileSystemClient::close
#[async_trait]
pub trait FileSystemClient: Send {
    /// Establish the session. Must be called before any other operation.
    async fn connect(&mut self) -> Result<()>;

    /// Create a new file at `path` from `source`, creating missing ancestor
    /// directories. Returns `Ok(false)` if a file already exists there; the
    /// existing file is left untouched.
    async fn create_file(
        &mut self,
        path: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<bool>;

    /// Delete the file at `path`. Returns `Ok(false)` if it does not exist.
    async fn delete_file(&mut self, path: &str) -> Result<bool>;

    /// Move `from` to `to`, deleting an existing target first
    /// (last-write-wins) and creating missing ancestors of `to`. Returns
    /// `Ok(false)` if `from` does not exist.
    async fn move_file(&mut self, from: &str, to: &str) -> Result<bool>;

    /// Copy `from` to `to`, with the same target-overwrite policy as
    /// [`move_file`](FileSystemClient::move_file).
    async fn copy_file(&mut self, from: &str, to: &str) -> Result<bool>;

    /// Open a reader positioned at the start of the file at `path`. Fails
    /// with [`FsError::NotFound`](crate::FsError::NotFound) if there is no
    /// file. The caller owns the reader and must drop it before issuing
    /// operations that depend on the same underlying channel.
    async fn open_reader(&mut self, path: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>>;

    /// Metadata of the file at `path`, or `Ok(None)` when the file — or its
    /// parent directory — cannot be located.
    async fn file_metadata(&mut self, path: &str) -> Result<Option<FileMetadata>>;

    /// Release the session. Idempotent, and safe to call even if `connect`
    /// never fully succeeded; teardown failures are logged, not raised.
    async fn close(&mut self) -> Result<()>;
}

/// Where and how to reach a remote server.
///
/// The password is excluded from serialization so the value can travel
/// through configuration without leaking credentials; `connect` fails with a
/// connection error when it is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
}

impl Endpoint {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: Some(password.into()),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Protocol {
    Ftp,
    Sftp,
    Smb,
}

impl Protocol {
    /// Conventional port of the backend.
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Ftp => 21,
            Protocol::Sftp => 22,
            Protocol::Smb => 445,
        }
    }
}

/// Build the adapter for `protocol`, not yet connected.
pub fn client_for(protocol: Protocol, endpoint: Endpoint) -> Box<dyn FileSystemClient> {
    match protocol {
        Protocol::Ftp => Box::new(ftp::FtpClient::new(endpoint)),
        Protocol::Sftp => Box::new(sftp::SftpClient::new(endpoint)),
        Protocol::Smb => Box::new(smb::SmbClient::new(endpoint)),
    }
}
