//! In-memory `ProtocolSession` fake plus a mockall mock, shared by the unit
//! tests of the operation layer.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::path::Path;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use mockall::mock;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::client::FileMetadata;
use crate::error::{FsError, Result};
use crate::path;
use crate::session::{ProtocolSession, RemoteEntry};

/// A fake backend over plain maps. The root directory always exists; every
/// other directory must be created explicitly, which lets tests assert the
/// ensurer's behavior.
pub(crate) struct MemorySession {
    pub dirs: BTreeSet<String>,
    pub files: BTreeMap<String, Vec<u8>>,
    /// Directories created through `make_dir`, in call order.
    pub created_dirs: Vec<String>,
    /// When false, `can_rename` reports no native rename and moves must go
    /// through the staging fallback.
    pub allow_rename: bool,
    /// When true, every `store_stream` fails after the existence checks,
    /// simulating a write-phase failure of a staged copy.
    pub fail_stores: bool,
    pub renames: usize,
}

impl MemorySession {
    pub fn new() -> Self {
        Self {
            dirs: BTreeSet::new(),
            files: BTreeMap::new(),
            created_dirs: Vec::new(),
            allow_rename: true,
            fail_stores: false,
            renames: 0,
        }
    }

    pub fn add_dir(&mut self, dir: &str) {
        for ancestor in path::ancestors(dir) {
            self.dirs.insert(ancestor.to_string());
        }
    }

    pub fn add_file(&mut self, file_path: &str, content: &[u8]) {
        let (dir, _) = path::split(file_path).unwrap();
        self.add_dir(dir);
        self.files.insert(file_path.to_string(), content.to_vec());
    }

    fn parent_exists(&self, file_path: &str) -> Result<bool> {
        let (dir, _) = path::split(file_path)?;
        Ok(path::is_root(dir) || self.dirs.contains(dir))
    }
}

#[async_trait]
impl ProtocolSession for MemorySession {
    async fn dir_exists(&mut self, dir: &str) -> Result<bool> {
        Ok(path::is_root(dir) || self.dirs.contains(dir))
    }

    async fn make_dir(&mut self, dir: &str) -> Result<()> {
        let (parent, _) = path::split(dir)?;
        if !(path::is_root(parent) || self.dirs.contains(parent)) {
            return Err(FsError::protocol(
                "mkdir",
                dir,
                anyhow::anyhow!("parent directory missing"),
            ));
        }
        self.dirs.insert(dir.to_string());
        self.created_dirs.push(dir.to_string());
        Ok(())
    }

    async fn list_dir(&mut self, dir: &str) -> Result<Vec<RemoteEntry>> {
        let mut entries = Vec::new();
        for (file_path, content) in &self.files {
            if let Ok((file_dir, leaf)) = path::split(file_path) {
                if file_dir == dir {
                    entries.push(RemoteEntry {
                        name: leaf.to_string(),
                        size: content.len() as u64,
                        is_dir: false,
                        created: None,
                        modified: Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
                    });
                }
            }
        }
        for sub in &self.dirs {
            if let Ok((sub_dir, leaf)) = path::split(sub) {
                if sub_dir == dir {
                    entries.push(RemoteEntry {
                        name: leaf.to_string(),
                        size: 0,
                        is_dir: true,
                        created: None,
                        modified: None,
                    });
                }
            }
        }
        Ok(entries)
    }

    async fn file_exists(&mut self, file_path: &str) -> Result<bool> {
        Ok(self.parent_exists(file_path)? && self.files.contains_key(file_path))
    }

    async fn remove_file(&mut self, file_path: &str) -> Result<()> {
        self.files
            .remove(file_path)
            .map(|_| ())
            .ok_or_else(|| FsError::protocol("rm", file_path, anyhow::anyhow!("no such file")))
    }

    fn can_rename(&self, _from: &str, _to: &str) -> bool {
        self.allow_rename
    }

    async fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let content = self
            .files
            .remove(from)
            .ok_or_else(|| FsError::protocol("rename", from, anyhow::anyhow!("no such file")))?;
        self.files.insert(to.to_string(), content);
        self.renames += 1;
        Ok(())
    }

    async fn open_reader(&mut self, file_path: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let content = self
            .files
            .get(file_path)
            .cloned()
            .ok_or_else(|| FsError::protocol("read", file_path, anyhow::anyhow!("no such file")))?;
        Ok(Box::new(Cursor::new(content)))
    }

    async fn store_stream<'a>(
        &mut self,
        file_path: &str,
        source: &'a mut (dyn AsyncRead + Send + Unpin + 'a),
    ) -> Result<()> {
        if self.fail_stores {
            return Err(FsError::protocol(
                "store",
                file_path,
                anyhow::anyhow!("simulated write failure"),
            ));
        }
        if !self.parent_exists(file_path)? {
            return Err(FsError::protocol(
                "store",
                file_path,
                anyhow::anyhow!("parent directory missing"),
            ));
        }
        let mut content = Vec::new();
        source
            .read_to_end(&mut content)
            .await
            .map_err(FsError::Staging)?;
        self.files.insert(file_path.to_string(), content);
        Ok(())
    }

    async fn stat(&mut self, file_path: &str) -> Result<Option<FileMetadata>> {
        if !self.parent_exists(file_path)? {
            return Ok(None);
        }
        Ok(self.files.get(file_path).map(|content| FileMetadata {
            path: file_path.to_string(),
            size: content.len() as u64,
            created: None,
            modified: Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
        }))
    }

    async fn teardown(&mut self) -> Result<()> {
        Ok(())
    }
}

mock! {
    pub Session {}

    #[async_trait]
    impl ProtocolSession for Session {
        async fn dir_exists(&mut self, path: &str) -> Result<bool>;
        async fn make_dir(&mut self, path: &str) -> Result<()>;
        async fn list_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>>;
        async fn file_exists(&mut self, path: &str) -> Result<bool>;
        async fn remove_file(&mut self, path: &str) -> Result<()>;
        fn can_rename(&self, from: &str, to: &str) -> bool;
        async fn rename(&mut self, from: &str, to: &str) -> Result<()>;
        async fn open_reader(&mut self, path: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>>;
        async fn store_stream<'a>(
            &mut self,
            path: &str,
            source: &'a mut (dyn AsyncRead + Send + Unpin + 'a),
        ) -> Result<()>;
        async fn store_local(&mut self, path: &str, local: &Path) -> Result<()>;
        async fn stat(&mut self, path: &str) -> Result<Option<FileMetadata>>;
        async fn teardown(&mut self) -> Result<()>;
    }
}
