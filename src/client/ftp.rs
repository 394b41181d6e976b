use std::io::{self, Cursor};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use suppaftp::list;
use suppaftp::types::{FileType, FtpError, FtpResult};
use suppaftp::{FtpStream, Status};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

use super::{Endpoint, FileMetadata, FileSystemClient};
use crate::error::{FsError, Result};
use crate::session::{ProtocolSession, RemoteEntry};
use crate::{ops, probe};

/// FTP backend.
///
/// RFC 959 leaves existence checks and listings underspecified, so this
/// adapter probes by changing into the parent directory and matching the leaf
/// name against parsed `LIST` output. Reply 550 is the protocol's structured
/// "unavailable" signal and is mapped to plain "missing", never to an error.
/// Listings carry a single timestamp; it is reported as both creation and
/// modification time.
pub struct FtpClient {
    endpoint: Endpoint,
    session: Option<FtpSession>,
}

impl FtpClient {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            session: None,
        }
    }

    fn session(&mut self) -> &mut FtpSession {
        self.session
            .as_mut()
            .expect("connect() must be called before issuing operations")
    }
}

#[async_trait]
impl FileSystemClient for FtpClient {
    async fn connect(&mut self) -> Result<()> {
        let addr = self.endpoint.addr();
        let username = self.endpoint.username.clone();
        let password = self
            .endpoint
            .password
            .clone()
            .ok_or_else(|| FsError::connection(addr.clone(), anyhow!("password not configured")))?;

        let connect_addr = addr.clone();
        let stream = tokio::task::spawn_blocking(move || -> FtpResult<FtpStream> {
            let mut ftp = FtpStream::connect(&connect_addr)?;
            ftp.login(&username, &password)?;
            // ASCII mode corrupts arbitrary bytes.
            ftp.transfer_type(FileType::Binary)?;
            Ok(ftp)
        })
        .await
        .map_err(|err| FsError::connection(addr.clone(), err))?
        .map_err(|err| FsError::connection(addr.clone(), err))?;

        info!(endpoint = %addr, "connected to FTP server");
        self.session = Some(FtpSession {
            stream: Some(stream),
        });
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
                debug!(error = %err, "FTP quit reported an error during close");
            }
        }
        Ok(())
    }
}

/// One logged-in control connection. suppaftp is blocking, so every round
/// trip moves the stream into `spawn_blocking` and back.
struct FtpSession {
    stream: Option<FtpStream>,
}

impl FtpSession {
    async fn run<T, F>(&mut self, f: F) -> FtpResult<T>
    where
        F: FnOnce(&mut FtpStream) -> FtpResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut stream = self
            .stream
            .take()
            .expect("FTP stream lost to an earlier worker panic");
        let (stream, result) = tokio::task::spawn_blocking(move || {
            let result = f(&mut stream);
            (stream, result)
        })
        .await
        .map_err(|err| FtpError::ConnectionError(io::Error::other(err)))?;
        self.stream = Some(stream);
        result
    }
}

/// Reply 550: the server reports the path as unavailable.
fn is_unavailable(err: &FtpError) -> bool {
    matches!(err, FtpError::UnexpectedResponse(response) if response.status == Status::FileUnavailable)
}

fn entry_from_line(line: &str) -> Option<RemoteEntry> {
    let parsed = list::File::try_from(line).ok()?;
    let modified = Some(DateTime::<Utc>::from(parsed.modified()));
    Some(RemoteEntry {
        name: parsed.name().to_string(),
        size: parsed.size() as u64,
        is_dir: parsed.is_directory(),
        created: modified,
        modified,
    })
}

#[async_trait]
impl ProtocolSession for FtpSession {
    async fn dir_exists(&mut self, path: &str) -> Result<bool> {
        let dir = path.to_string();
        match self.run(move |ftp| ftp.cwd(&dir)).await {
            Ok(()) => Ok(true),
            Err(err) if is_unavailable(&err) => Ok(false),
            Err(err) => Err(FsError::protocol("cwd", path, err)),
        }
    }

    async fn make_dir(&mut self, path: &str) -> Result<()> {
        let dir = path.to_string();
        self.run(move |ftp| ftp.mkdir(&dir))
            .await
            .map_err(|err| FsError::protocol("mkdir", path, err))
    }

    async fn list_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        let dir = path.to_string();
        let lines = self
            .run(move |ftp| {
                ftp.cwd(&dir)?;
                ftp.list(None)
            })
            .await
            .map_err(|err| FsError::protocol("list", path, err))?;
        Ok(lines.iter().filter_map(|line| entry_from_line(line)).collect())
    }

    async fn file_exists(&mut self, path: &str) -> Result<bool> {
        probe::via_listing(self, path).await
    }

    async fn remove_file(&mut self, path: &str) -> Result<()> {
        let file = path.to_string();
        self.run(move |ftp| ftp.rm(&file))
            .await
            .map_err(|err| FsError::protocol("rm", path, err))
    }

    async fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let (src, dst) = (from.to_string(), to.to_string());
        self.run(move |ftp| ftp.rename(&src, &dst))
            .await
            .map_err(|err| FsError::protocol("rename", from, err))
    }

    async fn open_reader(&mut self, path: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let file = path.to_string();
        let buffer = self
            .run(move |ftp| ftp.retr_as_buffer(&file))
            .await
            .map_err(|err| FsError::protocol("retr", path, err))?;
        Ok(Box::new(buffer))
    }

    async fn store_stream<'a>(
        &mut self,
        path: &str,
        source: &'a mut (dyn AsyncRead + Send + Unpin + 'a),
    ) -> Result<()> {
        let mut data = Vec::new();
        source.read_to_end(&mut data).await.map_err(FsError::Staging)?;
        let file = path.to_string();
        self.run(move |ftp| ftp.put_file(&file, &mut Cursor::new(data)).map(|_| ()))
            .await
            .map_err(|err| FsError::protocol("stor", path, err))
    }

    async fn stat(&mut self, path: &str) -> Result<Option<FileMetadata>> {
        probe::stat_via_listing(self, path).await
    }

    async fn teardown(&mut self) -> Result<()> {
        self.run(|ftp| ftp.quit())
            .await
            .map_err(|err| FsError::protocol("quit", "", err))
    }
}
