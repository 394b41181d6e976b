//! Recursive directory creation.
//!
//! None of the target protocols has a uniform "mkdir -p", so missing
//! ancestors are created one level at a time, top down. The walk operates on
//! the parsed ancestor chain and is therefore bounded by the path's component
//! count; it terminates at the root sentinel the backend already guarantees
//! exists (`/`, or the share root for SMB).

use tracing::debug;

use crate::error::Result;
use crate::path;
use crate::session::ProtocolSession;

/// Make sure the directory `dir` and every ancestor of it exist.
pub(crate) async fn ensure_dirs<S: ProtocolSession>(session: &mut S, dir: &str) -> Result<()> {
    if path::is_root(dir) || session.dir_exists(dir).await? {
        return Ok(());
    }
    for ancestor in path::ancestors(dir) {
        if !session.dir_exists(ancestor).await? {
            debug!(dir = ancestor, "creating missing ancestor directory");
            session.make_dir(ancestor).await?;
        }
    }
    Ok(())
}
