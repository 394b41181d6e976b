use std::fmt;
use std::path::Path;
use std::process::Command;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::process::Command as TokioCommand;
use tracing::info;

use super::{Endpoint, FileMetadata, FileSystemClient};
use crate::error::{FsError, Result};
use crate::session::{ProtocolSession, RemoteEntry};
use crate::{ops, probe};

/// SMB/CIFS backend driven through the `smbclient` binary.
///
/// Paths name the share in their first component: `/share/dir/file.txt`.
/// Every primitive is one `smbclient //host/share -c "…"` invocation;
/// failures are classified by the `NT_STATUS_*` token in the output, which is
/// a stable identifier, unlike the surrounding message text. The listing
/// output carries only a modification timestamp, so `created` is permanently
/// `None` on this backend.
pub struct SmbClient {
    endpoint: Endpoint,
    session: Option<SmbSession>,
}

impl SmbClient {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            session: None,
        }
    }

    fn session(&mut self) -> &mut SmbSession {
        self.session
            .as_mut()
            .expect("connect() must be called before issuing operations")
    }

    fn check_smbclient_available() -> Result<()> {
        let output = Command::new("smbclient").arg("--version").output();
        match output {
            Ok(output) if output.status.success() => Ok(()),
            _ => Err(FsError::connection(
                "smbclient",
                anyhow!("smbclient not found. Please install the samba client package"),
            )),
        }
    }
}

#[async_trait]
impl FileSystemClient for SmbClient {
    async fn connect(&mut self) -> Result<()> {
        Self::check_smbclient_available()?;

        let addr = self.endpoint.addr();
        let password = self
            .endpoint
            .password
            .clone()
            .ok_or_else(|| FsError::connection(addr.clone(), anyhow!("password not configured")))?;

        let session = SmbSession {
            host: self.endpoint.host.clone(),
            port: self.endpoint.port,
            username: self.endpoint.username.clone(),
            password,
        };

        // Authentication probe: list the server's shares.
        let mut cmd = TokioCommand::new("smbclient");
        cmd.arg("-L")
            .arg(format!("//{}", session.host))
            .arg("-p")
            .arg(session.port.to_string())
            .arg("-U")
            .arg(format!("{}%{}", session.username, session.password))
            .arg("-N");
        let output = cmd
            .output()
            .await
            .map_err(|err| FsError::connection(addr.clone(), err))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(FsError::connection(addr, anyhow!("{}", stderr.trim())));
        }

        info!(endpoint = %addr, "connected to SMB server");
        self.session = Some(session);
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
        // Each command ran as its own smbclient invocation; dropping the
        // session only forgets the credentials.
        self.session = None;
        Ok(())
    }
}

/// Status tokens that mean "the path (or its share) does not exist".
const NOT_FOUND_MARKERS: [&str; 5] = [
    "NT_STATUS_OBJECT_NAME_NOT_FOUND",
    "NT_STATUS_OBJECT_PATH_NOT_FOUND",
    "NT_STATUS_NO_SUCH_FILE",
    "NT_STATUS_NOT_A_DIRECTORY",
    "NT_STATUS_BAD_NETWORK_NAME",
];

#[derive(Debug)]
struct SmbCommandError(String);

impl SmbCommandError {
    fn is_not_found(&self) -> bool {
        NOT_FOUND_MARKERS.iter().any(|marker| self.0.contains(marker))
    }
}

impl fmt::Display for SmbCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "smbclient command failed: {}", self.0.trim())
    }
}

impl std::error::Error for SmbCommandError {}

/// Validated connection parameters. smbclient keeps no channel open between
/// invocations, so the session is the credentials plus the classification
/// logic around each subprocess run.
struct SmbSession {
    host: String,
    port: u16,
    username: String,
    password: String,
}

/// Split `/share/dir/file` into the share name and the path inside it.
fn split_share(path: &str) -> Result<(&str, &str)> {
    let trimmed = path.trim_start_matches('/');
    match trimmed.split_once('/') {
        Some((share, inner)) if !share.is_empty() => Ok((share, inner)),
        None if !trimmed.is_empty() => Ok((trimmed, "")),
        _ => Err(FsError::InvalidPath {
            path: path.to_string(),
            reason: "SMB paths start with the share name",
        }),
    }
}

fn parse_list_line(line: &str) -> Option<RemoteEntry> {
    // smbclient ls output:
    //   filename                          D        0  Wed Dec 25 10:30:45 2024
    //   filename                         AH     1234  Wed Dec 25 10:30:45 2024
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.contains("blocks of size") {
        return None;
    }

    // Fixed-width columns: the first 35 characters hold the padded filename.
    if line.len() < 36 {
        return None;
    }
    let name = line.get(..35)?.trim();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }

    let rest = line.get(35..)?.trim();
    let parts: Vec<&str> = rest.split_whitespace().collect();
    if parts.is_empty() {
        return None;
    }

    let attributes = parts[0];
    let is_dir = attributes.contains('D');
    let size = if parts.len() > 1 && !is_dir {
        parts[1].parse::<u64>().unwrap_or(0)
    } else {
        0
    };

    Some(RemoteEntry {
        name: name.to_string(),
        size,
        is_dir,
        created: None,
        modified: parse_list_timestamp(&parts),
    })
}

fn parse_list_timestamp(parts: &[&str]) -> Option<DateTime<Utc>> {
    if parts.len() < 7 {
        return None;
    }
    let stamp = parts[2..7].join(" ");
    NaiveDateTime::parse_from_str(&stamp, "%a %b %e %H:%M:%S %Y")
        .ok()
        .map(|naive| naive.and_utc())
}

impl SmbSession {
    async fn run_command(
        &self,
        share: &str,
        command: &str,
    ) -> std::result::Result<String, SmbCommandError> {
        let mut cmd = TokioCommand::new("smbclient");
        cmd.arg(format!("//{}/{}", self.host, share))
            .arg("-p")
            .arg(self.port.to_string())
            .arg("-U")
            .arg(format!("{}%{}", self.username, self.password))
            .arg("-N")
            .arg("-c")
            .arg(command);

        let output = cmd
            .output()
            .await
            .map_err(|err| SmbCommandError(err.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        // smbclient reports NT_STATUS failures on stdout and does not always
        // set a failing exit status for them.
        if !output.status.success() || stdout.contains("NT_STATUS_") {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SmbCommandError(format!("{stdout}{stderr}")));
        }
        Ok(stdout)
    }
}

#[async_trait]
impl ProtocolSession for SmbSession {
    async fn dir_exists(&mut self, path: &str) -> Result<bool> {
        let (share, inner) = split_share(path)?;
        let command = if inner.is_empty() {
            // The share root itself: reachable iff it lists.
            "ls".to_string()
        } else {
            format!("cd \"{inner}\"")
        };
        match self.run_command(share, &command).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(FsError::protocol("cd", path, err)),
        }
    }

    async fn make_dir(&mut self, path: &str) -> Result<()> {
        let (share, inner) = split_share(path)?;
        if inner.is_empty() {
            return Err(FsError::protocol(
                "mkdir",
                path,
                anyhow!("a share cannot be created through the file contract"),
            ));
        }
        self.run_command(share, &format!("mkdir \"{inner}\""))
            .await
            .map(|_| ())
            .map_err(|err| FsError::protocol("mkdir", path, err))
    }

    async fn list_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        let (share, inner) = split_share(path)?;
        let command = if inner.is_empty() {
            "ls".to_string()
        } else {
            format!("cd \"{inner}\"; ls")
        };
        let output = self
            .run_command(share, &command)
            .await
            .map_err(|err| FsError::protocol("ls", path, err))?;
        Ok(output.lines().filter_map(parse_list_line).collect())
    }

    async fn file_exists(&mut self, path: &str) -> Result<bool> {
        probe::via_listing(self, path).await
    }

    async fn remove_file(&mut self, path: &str) -> Result<()> {
        let (share, inner) = split_share(path)?;
        self.run_command(share, &format!("del \"{inner}\""))
            .await
            .map(|_| ())
            .map_err(|err| FsError::protocol("del", path, err))
    }

    fn can_rename(&self, from: &str, to: &str) -> bool {
        // smbclient renames inside one share only; cross-share moves take
        // the staging fallback.
        match (split_share(from), split_share(to)) {
            (Ok((from_share, _)), Ok((to_share, _))) => from_share == to_share,
            _ => true,
        }
    }

    async fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let (share, inner_from) = split_share(from)?;
        let (_, inner_to) = split_share(to)?;
        self.run_command(share, &format!("rename \"{inner_from}\" \"{inner_to}\""))
            .await
            .map(|_| ())
            .map_err(|err| FsError::protocol("rename", from, err))
    }

    async fn open_reader(&mut self, path: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let (share, inner) = split_share(path)?;
        let staging = tempfile::NamedTempFile::new().map_err(FsError::Staging)?;
        let local = staging.path().to_string_lossy().to_string();
        self.run_command(share, &format!("get \"{inner}\" \"{local}\""))
            .await
            .map(|_| ())
            .map_err(|err| FsError::protocol("get", path, err))?;
        let content = tokio::fs::read(staging.path())
            .await
            .map_err(FsError::Staging)?;
        Ok(Box::new(std::io::Cursor::new(content)))
    }

    async fn store_stream<'a>(
        &mut self,
        path: &str,
        source: &'a mut (dyn AsyncRead + Send + Unpin + 'a),
    ) -> Result<()> {
        // smbclient uploads from a named local file, so arbitrary streams
        // pass through a scoped temporary first.
        let staging = tempfile::NamedTempFile::new().map_err(FsError::Staging)?;
        let mut local = tokio::fs::File::from_std(staging.reopen().map_err(FsError::Staging)?);
        tokio::io::copy(source, &mut local)
            .await
            .map_err(FsError::Staging)?;
        local.flush().await.map_err(FsError::Staging)?;
        drop(local);
        self.store_local(path, staging.path()).await
    }

    async fn store_local(&mut self, path: &str, local: &Path) -> Result<()> {
        let (share, inner) = split_share(path)?;
        let local = local.to_string_lossy();
        self.run_command(share, &format!("put \"{local}\" \"{inner}\""))
            .await
            .map(|_| ())
            .map_err(|err| FsError::protocol("put", path, err))
    }

    async fn stat(&mut self, path: &str) -> Result<Option<FileMetadata>> {
        probe::stat_via_listing(self, path).await
    }

    async fn teardown(&mut self) -> Result<()> {
        Ok(())
    }
}
