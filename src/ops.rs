//! The unified operations, written once against [`ProtocolSession`].
//!
//! Everything here resolves existence locally and converts ordinary
//! existence mismatches into boolean no-op outcomes; only hard backend
//! failures propagate as errors. The adapters delegate straight into these
//! functions, so all three backends share one idempotency contract.

use tokio::io::AsyncRead;
use tracing::debug;

use crate::ensure::ensure_dirs;
use crate::error::{FsError, Result};
use crate::path;
use crate::session::ProtocolSession;
use crate::transfer::copy_via_staging;

/// Create a new file from `source`. Returns `Ok(false)` without touching the
/// remote side if a file already exists at `path`.
pub(crate) async fn create_file<S: ProtocolSession>(
    session: &mut S,
    path: &str,
    source: &mut (dyn AsyncRead + Send + Unpin),
) -> Result<bool> {
    if session.file_exists(path).await? {
        debug!(path, "not creating: file already exists");
        return Ok(false);
    }
    let (dir, _) = path::split(path)?;
    ensure_dirs(session, dir).await?;
    session.store_stream(path, source).await?;
    Ok(true)
}

/// Delete the file at `path`. Returns `Ok(false)` if no file exists there.
pub(crate) async fn delete_file<S: ProtocolSession>(session: &mut S, path: &str) -> Result<bool> {
    if !session.file_exists(path).await? {
        return Ok(false);
    }
    session.remove_file(path).await?;
    Ok(true)
}

/// Move `from` to `to`. Native rename when the backend supports the pair,
/// staged copy plus source delete otherwise.
pub(crate) async fn move_file<S: ProtocolSession>(
    session: &mut S,
    from: &str,
    to: &str,
) -> Result<bool> {
    if !prepare_target(session, from, to).await? {
        return Ok(false);
    }
    if session.can_rename(from, to) {
        session.rename(from, to).await?;
    } else {
        copy_via_staging(session, from, to).await?;
        session.remove_file(from).await?;
    }
    Ok(true)
}

/// Copy `from` to `to` through the local staging engine.
pub(crate) async fn copy_file<S: ProtocolSession>(
    session: &mut S,
    from: &str,
    to: &str,
) -> Result<bool> {
    if !prepare_target(session, from, to).await? {
        return Ok(false);
    }
    copy_via_staging(session, from, to).await?;
    Ok(true)
}

/// Open a reader over the file at `path`; [`FsError::NotFound`] if absent.
pub(crate) async fn open_reader<S: ProtocolSession>(
    session: &mut S,
    path: &str,
) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
    if !session.file_exists(path).await? {
        return Err(FsError::NotFound {
            path: path.to_string(),
        });
    }
    session.open_reader(path).await
}

/// Shared preamble of move and copy: report the no-op when the source is
/// missing, displace an existing target (last-write-wins), and otherwise make
/// sure the target's ancestor directories exist.
async fn prepare_target<S: ProtocolSession>(session: &mut S, from: &str, to: &str) -> Result<bool> {
    if !session.file_exists(from).await? {
        debug!(from, "source file does not exist; nothing to transfer");
        return Ok(false);
    }
    if session.file_exists(to).await? {
        debug!(to, "target file already exists; deleting it first");
        session.remove_file(to).await?;
    } else {
        let (dir, _) = path::split(to)?;
        ensure_dirs(session, dir).await?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemorySession;
    use std::io::Cursor;
    use tokio::io::AsyncReadExt;

    async fn read_all(session: &mut MemorySession, path: &str) -> Vec<u8> {
        let mut reader = open_reader(session, path).await.unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await.unwrap();
        content
    }

    #[tokio::test]
    async fn create_streams_data_to_a_new_file() {
        let mut session = MemorySession::new();
        session.add_dir("/inbox");
        let mut source = Cursor::new(b"abcdef 1234567890".to_vec());

        assert!(create_file(&mut session, "/inbox/new.xlsx", &mut source)
            .await
            .unwrap());
        assert_eq!(
            read_all(&mut session, "/inbox/new.xlsx").await,
            b"abcdef 1234567890"
        );
    }

    #[tokio::test]
    async fn create_is_a_no_op_when_the_file_exists() {
        let mut session = MemorySession::new();
        session.add_file("/inbox/kept.txt", b"original");
        let mut source = Cursor::new(b"replacement".to_vec());

        assert!(!create_file(&mut session, "/inbox/kept.txt", &mut source)
            .await
            .unwrap());
        // content unchanged
        assert_eq!(read_all(&mut session, "/inbox/kept.txt").await, b"original");
    }

    #[tokio::test]
    async fn create_builds_every_missing_ancestor() {
        let mut session = MemorySession::new();
        let mut source = Cursor::new(b"deep".to_vec());

        assert!(create_file(&mut session, "/a/b/c/file.txt", &mut source)
            .await
            .unwrap());
        assert_eq!(session.created_dirs, vec!["/a", "/a/b", "/a/b/c"]);
        assert_eq!(read_all(&mut session, "/a/b/c/file.txt").await, b"deep");
    }

    #[tokio::test]
    async fn create_round_trips_empty_input() {
        let mut session = MemorySession::new();
        let mut source = Cursor::new(Vec::new());

        assert!(create_file(&mut session, "/inbox/empty", &mut source)
            .await
            .unwrap());
        assert_eq!(read_all(&mut session, "/inbox/empty").await, b"");
    }

    #[tokio::test]
    async fn delete_twice_reports_deleted_then_not_deleted() {
        let mut session = MemorySession::new();
        session.add_file("/inbox/doomed.txt", b"x");

        assert!(delete_file(&mut session, "/inbox/doomed.txt").await.unwrap());
        assert!(!delete_file(&mut session, "/inbox/doomed.txt").await.unwrap());
    }

    #[tokio::test]
    async fn delete_of_a_missing_file_changes_nothing() {
        let mut session = MemorySession::new();
        session.add_file("/inbox/other.txt", b"x");

        assert!(!delete_file(&mut session, "/inbox/missing.txt").await.unwrap());
        assert_eq!(session.files.len(), 1);
    }

    #[tokio::test]
    async fn move_renames_when_the_backend_can() {
        let mut session = MemorySession::new();
        session.add_file("/from/a.txt", b"payload");

        assert!(move_file(&mut session, "/from/a.txt", "/to/a.txt")
            .await
            .unwrap());
        assert_eq!(session.renames, 1);
        assert!(!session.files.contains_key("/from/a.txt"));
        assert_eq!(read_all(&mut session, "/to/a.txt").await, b"payload");
    }

    #[tokio::test]
    async fn move_overwrites_an_existing_target() {
        let mut session = MemorySession::new();
        session.add_file("/from/a.txt", b"winner");
        session.add_file("/to/a.txt", b"loser");

        assert!(move_file(&mut session, "/from/a.txt", "/to/a.txt")
            .await
            .unwrap());
        assert!(!session.files.contains_key("/from/a.txt"));
        assert_eq!(read_all(&mut session, "/to/a.txt").await, b"winner");
    }

    #[tokio::test]
    async fn move_without_native_rename_stages_and_deletes_the_source() {
        let mut session = MemorySession::new();
        session.allow_rename = false;
        session.add_file("/from/a.txt", b"payload");

        assert!(move_file(&mut session, "/from/a.txt", "/to/a.txt")
            .await
            .unwrap());
        assert_eq!(session.renames, 0);
        assert!(!session.files.contains_key("/from/a.txt"));
        assert_eq!(read_all(&mut session, "/to/a.txt").await, b"payload");
    }

    #[tokio::test]
    async fn move_of_a_missing_source_is_a_no_op() {
        let mut session = MemorySession::new();
        session.add_file("/to/a.txt", b"kept");

        assert!(!move_file(&mut session, "/from/a.txt", "/to/a.txt")
            .await
            .unwrap());
        // the target is not displaced when the source is missing
        assert_eq!(read_all(&mut session, "/to/a.txt").await, b"kept");
    }

    #[tokio::test]
    async fn copy_keeps_the_source_and_overwrites_the_target() {
        let mut session = MemorySession::new();
        session.add_file("/from/a.txt", b"payload");
        session.add_file("/to/a.txt", b"old");

        assert!(copy_file(&mut session, "/from/a.txt", "/to/a.txt")
            .await
            .unwrap());
        assert_eq!(read_all(&mut session, "/from/a.txt").await, b"payload");
        assert_eq!(read_all(&mut session, "/to/a.txt").await, b"payload");
    }

    #[tokio::test]
    async fn copy_creates_the_target_directories() {
        let mut session = MemorySession::new();
        session.add_file("/from/a.txt", b"payload");

        assert!(copy_file(&mut session, "/from/a.txt", "/deep/nested/a.txt")
            .await
            .unwrap());
        assert_eq!(session.created_dirs, vec!["/deep", "/deep/nested"]);
    }

    #[tokio::test]
    async fn open_reader_signals_not_found() {
        let mut session = MemorySession::new();
        let err = match open_reader(&mut session, "/nowhere/a.txt").await {
            Ok(_) => panic!("expected open_reader to signal not found"),
            Err(e) => e,
        };
        assert!(matches!(err, FsError::NotFound { .. }));
    }
}
