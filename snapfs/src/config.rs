use crate::fs::FsError;

use std::path::PathBuf;

/// Snapshot file name used when no explicit path is configured. It is
/// resolved against the working directory at the time of each load or save.
pub const DEFAULT_SNAPSHOT_NAME: &str = "fs.snapfs";

/// Capacity of the inode table and block store. The snapshot size is a pure
/// function of these two numbers, so a snapshot can only be loaded with the
/// geometry it was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub inode_count: usize,
    pub block_count: usize,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            inode_count: 500,
            block_count: 500,
        }
    }
}

impl Geometry {
    pub fn validate(&self) -> Result<(), FsError> {
        if self.inode_count == 0 || self.block_count == 0 {
            return Err(FsError::BadArgument(format!(
                "geometry needs at least one inode and one block, got {:?}",
                self
            )));
        }
        if u32::try_from(self.inode_count).is_err() || u32::try_from(self.block_count).is_err() {
            return Err(FsError::BadArgument(format!(
                "geometry {:?} exceeds 32-bit indices",
                self
            )));
        }
        Ok(())
    }
}

/// Mount options for a [`SnapFs`](crate::SnapFs) session.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub(crate) geometry: Geometry,
    snapshot_path: Option<PathBuf>,
    pub(crate) uid: u32,
    pub(crate) gid: u32,
}

impl Config {
    pub fn with_inode_count(mut self, count: usize) -> Self {
        self.geometry.inode_count = count;
        self
    }

    pub fn with_block_count(mut self, count: usize) -> Self {
        self.geometry.block_count = count;
        self
    }

    /// Stores snapshots at `path` instead of `./fs.snapfs`.
    pub fn with_snapshot_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Owner recorded on every inode created during the session.
    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// The configured snapshot path, or the default name under the current
    /// working directory.
    pub fn snapshot_path(&self) -> Result<PathBuf, FsError> {
        match &self.snapshot_path {
            Some(path) => Ok(path.clone()),
            None => Ok(std::env::current_dir()?.join(DEFAULT_SNAPSHOT_NAME)),
        }
    }
}
