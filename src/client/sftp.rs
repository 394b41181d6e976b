use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use russh::client::AuthResult;
use russh::keys::PublicKey;
use russh_sftp::protocol::{FileAttributes, FileType, StatusCode};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info};

use super::{Endpoint, FileMetadata, FileSystemClient};
use crate::error::{FsError, Result};
use crate::ops;
use crate::session::{ProtocolSession, RemoteEntry};

/// SFTP backend over an SSH session.
///
/// Existence is probed with a direct stat, and "missing" is recognized from
/// the structured `NoSuchFile` status code — never from the error message
/// text. SFTP reports no creation time; `created` is permanently `None` on
/// this backend.
pub struct SftpClient {
    endpoint: Endpoint,
    session: Option<SftpSession>,
}

impl SftpClient {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            session: None,
        }
    }

    fn session(&mut self) -> &mut SftpSession {
        self.session
            .as_mut()
            .expect("connect() must be called before issuing operations")
    }
}

/// SSH client handler. The trust model is credential-only, like the other
/// backends: the server key is accepted without pinning.
struct AcceptingHandler;

impl russh::client::Handler for AcceptingHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

#[async_trait]
impl FileSystemClient for SftpClient {
    async fn connect(&mut self) -> Result<()> {
        let addr = self.endpoint.addr();
        let password = self
            .endpoint
            .password
            .clone()
            .ok_or_else(|| FsError::connection(addr.clone(), anyhow!("password not configured")))?;

        let config = Arc::new(russh::client::Config::default());
        let mut handle = russh::client::connect(
            config,
            (self.endpoint.host.as_str(), self.endpoint.port),
            AcceptingHandler,
        )
        .await
        .map_err(|err| FsError::connection(addr.clone(), err))?;

        let auth = handle
            .authenticate_password(self.endpoint.username.as_str(), password)
            .await
            .map_err(|err| FsError::connection(addr.clone(), err))?;
        if !matches!(auth, AuthResult::Success) {
            return Err(FsError::connection(
                addr,
                anyhow!(
                    "password authentication rejected for {}",
                    self.endpoint.username
                ),
            ));
        }

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|err| FsError::connection(addr.clone(), err))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|err| FsError::connection(addr.clone(), err))?;
        let sftp = russh_sftp::client::SftpSession::new(channel.into_stream())
            .await
            .map_err(|err| FsError::connection(addr.clone(), err))?;

        info!(endpoint = %addr, "connected to SFTP server");
        self.session = Some(SftpSession { handle, sftp });
        Ok(())
    }

    async fn create_file(
        &mut self,
        path: &str,
        source: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<bool> {
        ops::create_file(self.session(), path, source).await
    }

    async fn delete_file(&mut self, path: &str) -> Result<bool> {
        ops::delete_file(self.session(), path).await
    }

    async fn move_file(&mut self, from: &str, to: &str) -> Result<bool> {
        ops::move_file(self.session(), from, to).await
    }

    async fn copy_file(&mut self, from: &str, to: &str) -> Result<bool> {
        ops::copy_file(self.session(), from, to).await
    }

    async fn open_reader(&mut self, path: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        ops::open_reader(self.session(), path).await
    }

    async fn file_metadata(&mut self, path: &str) -> Result<Option<FileMetadata>> {
        self.session().stat(path).await
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            if let Err(err) = session.teardown().await {
                debug!(error = %err, "SSH disconnect reported an error during close");
            }
        }
        Ok(())
    }
}

/// An open SFTP subsystem channel plus the SSH session that carries it.
struct SftpSession {
    handle: russh::client::Handle<AcceptingHandler>,
    sftp: russh_sftp::client::SftpSession,
}

/// Structured check for SSH_FX_NO_SUCH_FILE.
fn is_no_such_file(err: &russh_sftp::client::error::Error) -> bool {
    matches!(
        err,
        russh_sftp::client::error::Error::Status(status)
            if status.status_code == StatusCode::NoSuchFile
    )
}

fn timestamp(secs: Option<u32>) -> Option<DateTime<Utc>> {
    secs.and_then(|t| DateTime::from_timestamp(i64::from(t), 0))
}

impl SftpSession {
    /// Stat that resolves `NoSuchFile` — including a missing parent
    /// directory — to `None`.
    async fn attrs(&mut self, path: &str) -> Result<Option<FileAttributes>> {
        match self.sftp.metadata(path).await {
            Ok(attrs) => Ok(Some(attrs)),
            Err(err) if is_no_such_file(&err) => Ok(None),
            Err(err) => Err(FsError::protocol("stat", path, err)),
        }
    }
}

#[async_trait]
impl ProtocolSession for SftpSession {
    async fn dir_exists(&mut self, path: &str) -> Result<bool> {
        Ok(self
            .attrs(path)
            .await?
            .map(|attrs| attrs.is_dir())
            .unwrap_or(false))
    }

    async fn make_dir(&mut self, path: &str) -> Result<()> {
        self.sftp
            .create_dir(path)
            .await
            .map_err(|err| FsError::protocol("mkdir", path, err))
    }

    async fn list_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        let entries = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|err| FsError::protocol("readdir", path, err))?;
        Ok(entries
            .into_iter()
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| {
                let attrs = entry.metadata();
                RemoteEntry {
                    name: entry.file_name().to_string(),
                    size: attrs.size.unwrap_or(0),
                    is_dir: attrs.is_dir(),
                    created: None,
                    modified: timestamp(attrs.mtime),
                }
            })
            .collect())
    }

    async fn file_exists(&mut self, path: &str) -> Result<bool> {
        Ok(self
            .attrs(path)
            .await?
            .map(|attrs| matches!(attrs.file_type(), FileType::File))
            .unwrap_or(false))
    }

    async fn remove_file(&mut self, path: &str) -> Result<()> {
        self.sftp
            .remove_file(path)
            .await
            .map_err(|err| FsError::protocol("rm", path, err))
    }

    async fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.sftp
            .rename(from, to)
            .await
            .map_err(|err| FsError::protocol("rename", from, err))
    }

    async fn open_reader(&mut self, path: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let file = self
            .sftp
            .open(path)
            .await
            .map_err(|err| FsError::protocol("open", path, err))?;
        Ok(Box::new(file))
    }

    async fn store_stream<'a>(
        &mut self,
        path: &str,
        source: &'a mut (dyn AsyncRead + Send + Unpin + 'a),
    ) -> Result<()> {
        let mut remote = self
            .sftp
            .create(path)
            .await
            .map_err(|err| FsError::protocol("create", path, err))?;
        tokio::io::copy(source, &mut remote)
            .await
            .map_err(|err| FsError::protocol("write", path, err))?;
        remote
            .shutdown()
            .await
            .map_err(|err| FsError::protocol("write", path, err))?;
        Ok(())
    }

    async fn stat(&mut self, path: &str) -> Result<Option<FileMetadata>> {
        Ok(self.attrs(path).await?.and_then(|attrs| {
            if !matches!(attrs.file_type(), FileType::File) {
                return None;
            }
            Some(FileMetadata {
                path: path.to_string(),
                size: attrs.size.unwrap_or(0),
                // SFTP has no notion of creation time.
                created: None,
                modified: timestamp(attrs.mtime),
            })
        }))
    }

    async fn teardown(&mut self) -> Result<()> {
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "english")
            .await
            .map_err(|err| FsError::protocol("disconnect", "", err))
    }
}
