//! Copy-via-local-staging fallback.
//!
//! None of the target backends exposes a uniform remote-to-remote copy, so
//! copies read the source fully into a scoped local temporary file and write
//! that file back to the destination. The destination write does not begin
//! until the staging read has completed, so a stream error during staging
//! never leaves a partially written target behind.

use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::{FsError, Result};
use crate::session::ProtocolSession;

/// Copy the remote file `from` to the remote path `to`, staging the bytes
/// through a local temporary file.
///
/// The temporary file is removed on success and failure alike: it is owned by
/// a [`tempfile::NamedTempFile`], which unlinks on drop. A removal failure
/// after the transfer has already succeeded is logged, not escalated.
pub(crate) async fn copy_via_staging<S: ProtocolSession>(
    session: &mut S,
    from: &str,
    to: &str,
) -> Result<()> {
    let staging = tempfile::NamedTempFile::new().map_err(FsError::Staging)?;

    let mut reader = session.open_reader(from).await?;
    let mut writer =
        tokio::fs::File::from_std(staging.reopen().map_err(FsError::Staging)?);
    tokio::io::copy(&mut reader, &mut writer)
        .await
        .map_err(FsError::Staging)?;
    writer.flush().await.map_err(FsError::Staging)?;
    drop(writer);
    drop(reader);

    session.store_local(to, staging.path()).await?;

    if let Err(err) = staging.close() {
        warn!(from, to, error = %err, "staging file left behind after successful copy");
    }
    Ok(())
}
