//! An in-memory filesystem engine backed by fixed-size inode and block arrays
//! and persisted as a single snapshot file.
//!
//! [`SnapFs`] is the mount session: it exposes one method per filesystem call
//! (`get_attributes`, `read`, `make_directory`, `link`, ...) and is meant to
//! sit behind a user-space filesystem bridge that translates kernel requests
//! and maps [`FsError`] to errno values.
//!
//! ```no_run
//! use snapfs::{Config, SnapFs};
//!
//! let fs = SnapFs::init(Config::default()).unwrap();
//! fs.make_directory("/a", 0o755).unwrap();
//! let handle = fs.create_file("/a/b.txt", 0o644).unwrap();
//! fs.write(handle, 0, b"hello").unwrap();
//! assert_eq!(fs.read(handle, 0, 5).unwrap(), b"hello");
//! fs.shutdown().unwrap();
//! ```
mod alloc;
mod config;
mod dir;
mod file;
mod fs;
mod image;
mod io;
mod node;
mod path;

pub use crate::alloc::{Bitmap, State};
pub use crate::config::{Config, Geometry, DEFAULT_SNAPSHOT_NAME};
pub use crate::dir::{MAX_DIR_ENTRIES, MAX_NAME_LEN};
pub use crate::fs::{DirEntryInfo, FileAttr, FileHandle, FsError, FsStats, SnapFs};
pub use crate::io::{snapshot_len, BLOCK_SIZE};
pub use crate::node::{FileKind, BLOCKS_PER_INODE, ROOT_INODE};
pub use crate::path::MAX_PATH_LEN;
