//! Listing-based existence resolution shared by the backends that cannot
//! stat a path directly.
//!
//! A file "exists" only if its parent directory lists it as a file entry;
//! a parent that itself does not exist means the file does not exist —
//! never an error, so that stat on a path whose directory is absent can
//! report "absent".

use crate::client::FileMetadata;
use crate::error::Result;
use crate::path;
use crate::session::{ProtocolSession, RemoteEntry};

/// Resolve file existence by listing the parent directory and matching the
/// leaf name against file entries.
pub(crate) async fn via_listing<S: ProtocolSession>(session: &mut S, path: &str) -> Result<bool> {
    Ok(find_entry(session, path).await?.is_some())
}

/// Resolve metadata from the parent directory listing.
pub(crate) async fn stat_via_listing<S: ProtocolSession>(
    session: &mut S,
    path: &str,
) -> Result<Option<FileMetadata>> {
    Ok(find_entry(session, path).await?.map(|entry| FileMetadata {
        path: path.to_string(),
        size: entry.size,
        created: entry.created,
        modified: entry.modified,
    }))
}

async fn find_entry<S: ProtocolSession>(
    session: &mut S,
    path: &str,
) -> Result<Option<RemoteEntry>> {
    let (dir, leaf) = path::split(path)?;
    if !session.dir_exists(dir).await? {
        return Ok(None);
    }
    let entries = session.list_dir(dir).await?;
    Ok(entries
        .into_iter()
        .find(|entry| !entry.is_dir && entry.name == leaf))
}
