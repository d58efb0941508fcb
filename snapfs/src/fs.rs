use crate::config::Config;
use crate::image::Image;
use crate::node::FileKind;

use log::{debug, info};
use parking_lot::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("out of memory: no free {0}")]
    OutOfMemory(&'static str),
    #[error("directory not empty")]
    NotEmpty,
    #[error("block {index} is out of range, only {allocated} allocated")]
    OutOfRange { index: usize, allocated: usize },
    #[error("invalid argument: {0}")]
    BadArgument(String),
    #[error("file exists")]
    AlreadyExists,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("snapshot is {found} bytes, expected {expected}")]
    InvalidSnapshot { expected: u64, found: u64 },
    #[error("snapshot i/o failed")]
    Io(#[from] std::io::Error),
}

/// Attributes of one inode, in the shape a `stat` call reports them.
#[derive(Debug, Clone, PartialEq)]
pub struct FileAttr {
    pub ino: u32,
    pub kind: FileKind,
    /// Permission bits only.
    pub perm: u16,
    /// Type and permission bits.
    pub mode: u32,
    /// Bytes for a regular file, number of entries for a directory.
    pub size: u64,
    /// Data blocks owned by the inode.
    pub blocks: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntryInfo {
    pub name: String,
    pub ino: u32,
    pub kind: FileKind,
}

/// Capacity and usage counters, as reported by `statfs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub block_size: usize,
    pub blocks: usize,
    pub free_blocks: usize,
    pub inodes: usize,
    pub free_inodes: usize,
    pub max_name_len: usize,
}

/// An open file or directory: an inode number plus the generation of the
/// inode that held the slot when the handle was issued. Operations on a handle
/// whose inode has since been released fail with `NotFound`, even after the
/// slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle {
    ino: u32,
    generation: u32,
}

impl FileHandle {
    pub(crate) fn new(ino: u32, generation: u32) -> Self {
        Self { ino, generation }
    }

    pub fn ino(&self) -> u32 {
        self.ino
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// A mounted filesystem image.
///
/// All state lives in one in-memory image behind a single lock. Every operation,
/// snapshotting included, holds the lock for its whole duration, so a session
/// can be shared between threads through an `Arc`.
pub struct SnapFs {
    image: Mutex<Image>,
    config: Config,
}

impl std::fmt::Debug for SnapFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = f.debug_struct("SnapFs");
        out.field("config", &self.config);
        match self.image.try_lock() {
            Some(image) => out.field("stats", &image.stats()),
            None => out.field("stats", &"<locked>"),
        };
        out.finish()
    }
}

impl SnapFs {
    /// Mounts the snapshot named by `config`, or a fresh image with just a root
    /// directory if no snapshot exists yet.
    pub fn init(config: Config) -> Result<Self, FsError> {
        let path = config.snapshot_path()?;
        let image = match Image::load(&path, &config.geometry, config.uid, config.gid)? {
            Some(image) => image,
            None => {
                info!("no snapshot at {}, formatting a new image", path.display());
                Image::format(&config.geometry, config.uid, config.gid)?
            }
        };
        Ok(Self {
            image: Mutex::new(image),
            config,
        })
    }

    /// Mounts a fresh image, ignoring any existing snapshot. The snapshot is
    /// replaced on the next flush or shutdown.
    pub fn format(config: Config) -> Result<Self, FsError> {
        let image = Image::format(&config.geometry, config.uid, config.gid)?;
        info!("formatted new image with geometry {:?}", config.geometry);
        Ok(Self {
            image: Mutex::new(image),
            config,
        })
    }

    /// Writes the snapshot and unmounts.
    pub fn shutdown(self) -> Result<(), FsError> {
        self.flush()
    }

    /// Rewrites the snapshot in full while staying mounted.
    pub fn flush(&self) -> Result<(), FsError> {
        let image = self.lock();
        image.save(self.config.snapshot_path()?)
    }

    fn lock(&self) -> MutexGuard<'_, Image> {
        self.image.lock()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn get_attributes(&self, path: &str) -> Result<FileAttr, FsError> {
        debug!("get_attributes({})", path);
        let image = self.lock();
        image.attributes(image.resolve(path)?)
    }

    pub fn list_directory(&self, path: &str) -> Result<Vec<DirEntryInfo>, FsError> {
        debug!("list_directory({})", path);
        let image = self.lock();
        image.list_directory(image.resolve(path)?)
    }

    pub fn open(&self, path: &str) -> Result<FileHandle, FsError> {
        debug!("open({})", path);
        let image = self.lock();
        image.handle(image.resolve(path)?)
    }

    /// Reads up to `size` bytes at `offset`; fewer are returned at end of file.
    pub fn read(&self, handle: FileHandle, offset: u64, size: usize) -> Result<Vec<u8>, FsError> {
        debug!("read(ino {}, offset {}, size {})", handle.ino, offset, size);
        let mut image = self.lock();
        let inum = image.check_handle(handle)?;
        image.read(inum, offset, size)
    }

    pub fn write(&self, handle: FileHandle, offset: u64, data: &[u8]) -> Result<usize, FsError> {
        debug!("write(ino {}, offset {}, size {})", handle.ino, offset, data.len());
        let mut image = self.lock();
        let inum = image.check_handle(handle)?;
        image.write(inum, offset, data)
    }

    pub fn make_directory(&self, path: &str, mode: u32) -> Result<FileAttr, FsError> {
        debug!("make_directory({}, {:o})", path, mode);
        let mut image = self.lock();
        let inum = image.make_directory(path, mode)?;
        image.attributes(inum)
    }

    /// Creates an empty regular file and returns a handle to it.
    pub fn create_file(&self, path: &str, mode: u32) -> Result<FileHandle, FsError> {
        debug!("create_file({}, {:o})", path, mode);
        let mut image = self.lock();
        let inum = image.create_file(path, mode)?;
        image.handle(inum)
    }

    pub fn unlink(&self, path: &str) -> Result<(), FsError> {
        debug!("unlink({})", path);
        self.lock().unlink(path)
    }

    pub fn rmdir(&self, path: &str) -> Result<(), FsError> {
        debug!("rmdir({})", path);
        self.lock().rmdir(path)
    }

    pub fn link(&self, old_path: &str, new_path: &str) -> Result<(), FsError> {
        debug!("link({}, {})", old_path, new_path);
        self.lock().link(old_path, new_path)
    }

    /// Sets access and modification times, in seconds since the epoch.
    pub fn update_times(&self, path: &str, atime: i64, mtime: i64) -> Result<(), FsError> {
        debug!("update_times({}, {}, {})", path, atime, mtime);
        let mut image = self.lock();
        let inum = image.resolve(path)?;
        image.set_times(inum, atime, mtime)
    }

    pub fn stats(&self) -> FsStats {
        self.lock().stats()
    }
}
