use crate::config::Geometry;
use crate::dir;
use crate::fs::{DirEntryInfo, FileAttr, FileHandle, FsError, FsStats};
use crate::io::{Block, BlockStore, BLOCK_SIZE};
use crate::node::{self, Inode, InodeTable, PERM_MASK, ROOT_INODE, S_IFDIR, S_IFREG};

use log::debug;

/// The complete state of one mounted filesystem: the inode table, the block
/// store and the bitmaps embedded in each.
///
/// Every index stored anywhere in the image (directory entries, inode block
/// lists) refers into these two arrays, so the image is self-contained and can
/// be dumped and restored as raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub(crate) inodes: InodeTable,
    pub(crate) blocks: BlockStore,
    /// Owner stamped on inodes created in this session.
    uid: u32,
    gid: u32,
}

impl Image {
    /// An image with nothing allocated, not even the root. Used as the target
    /// of a snapshot load.
    pub(crate) fn blank(geometry: &Geometry, uid: u32, gid: u32) -> Self {
        Self {
            inodes: InodeTable::new(geometry.inode_count),
            blocks: BlockStore::new(geometry.block_count),
            uid,
            gid,
        }
    }

    /// A fresh image holding only the root directory, whose `.` and `..` both
    /// point at itself.
    pub(crate) fn format(geometry: &Geometry, uid: u32, gid: u32) -> Result<Self, FsError> {
        geometry.validate()?;
        let mut image = Self::blank(geometry, uid, gid);
        let (root, block) = image.allocate_node(S_IFDIR | 0o755)?;
        debug_assert_eq!(root, ROOT_INODE);
        let len = dir::init(image.blocks.get_mut(block)?, root, root);
        image.inodes.get_mut(root)?.len = len as u64;
        Ok(image)
    }

    fn directory(&self, inum: u32) -> Result<(&Block, usize), FsError> {
        let node = self.inodes.get(inum)?;
        if !node.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok((self.blocks.get(node.blocks[0])?, node.len as usize))
    }

    /// Looks `name` up among the live entries of directory `dir_inode`.
    pub(crate) fn lookup(&self, dir_inode: u32, name: &str) -> Result<u32, FsError> {
        let (block, len) = self.directory(dir_inode)?;
        dir::lookup(block, len, name).ok_or(FsError::NotFound)
    }

    /// Fails unless `parent` is a directory with a free slot and no entry
    /// called `name`. Runs before any allocation so nothing needs undoing.
    fn check_insert(&self, parent: u32, name: &str) -> Result<(), FsError> {
        let (block, len) = self.directory(parent)?;
        if dir::position(block, len, name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        if len >= dir::MAX_DIR_ENTRIES {
            return Err(FsError::OutOfMemory("directory entries"));
        }
        Ok(())
    }

    fn add_dir_entry(&mut self, parent: u32, name: &str, inum: u32) -> Result<(), FsError> {
        let dir_node = self.inodes.get_mut(parent)?;
        let len = dir_node.len as usize;
        let block = self.blocks.get_mut(dir_node.blocks[0])?;
        dir::append(block, len, name, inum)?;
        dir_node.len += 1;
        dir_node.update_modified_at();
        Ok(())
    }

    /// Allocates a block plus an inode owning it. If no inode is free the
    /// block is released again.
    fn allocate_node(&mut self, mode: u32) -> Result<(u32, u32), FsError> {
        let block = self.blocks.allocate(1)?;
        match self
            .inodes
            .allocate_inode(Inode::new(mode, self.uid, self.gid, block))
        {
            Ok(inum) => Ok((inum, block)),
            Err(err) => {
                self.blocks.release(block, 1);
                Err(err)
            }
        }
    }

    /// A handle to the current occupant of inode slot `inum`.
    pub(crate) fn handle(&self, inum: u32) -> Result<FileHandle, FsError> {
        let node = self.inodes.get(inum)?;
        Ok(FileHandle::new(inum, node.generation))
    }

    /// The inode a handle refers to, provided the slot has not been freed or
    /// handed to a different inode since the handle was issued.
    pub(crate) fn check_handle(&self, handle: FileHandle) -> Result<u32, FsError> {
        let node = self.inodes.get(handle.ino())?;
        if node.generation != handle.generation() {
            debug!("stale handle for inode {}", handle.ino());
            return Err(FsError::NotFound);
        }
        Ok(handle.ino())
    }

    pub(crate) fn make_directory(&mut self, path: &str, mode: u32) -> Result<u32, FsError> {
        let (parent, name) = self.resolve_parent(path)?;
        self.check_insert(parent, name)?;

        let (inum, block) = self.allocate_node(S_IFDIR | (mode & PERM_MASK))?;
        let len = dir::init(self.blocks.get_mut(block)?, inum, parent);
        self.inodes.get_mut(inum)?.len = len as u64;
        self.add_dir_entry(parent, name, inum)?;

        debug!("created directory {} as inode {}", path, inum);
        Ok(inum)
    }

    pub(crate) fn create_file(&mut self, path: &str, mode: u32) -> Result<u32, FsError> {
        let (parent, name) = self.resolve_parent(path)?;
        self.check_insert(parent, name)?;

        let (inum, _) = self.allocate_node(S_IFREG | (mode & PERM_MASK))?;
        self.add_dir_entry(parent, name, inum)?;

        debug!("created file {} as inode {}", path, inum);
        Ok(inum)
    }

    /// Adds a second entry for the inode at `old_path`. Both names then share
    /// the same inode and data.
    pub(crate) fn link(&mut self, old_path: &str, new_path: &str) -> Result<(), FsError> {
        let inum = self.resolve(old_path)?;
        if self.inodes.get(inum)?.is_dir() {
            return Err(FsError::IsADirectory);
        }
        let (parent, name) = self.resolve_parent(new_path)?;
        self.check_insert(parent, name)?;

        self.add_dir_entry(parent, name, inum)?;
        let node = self.inodes.get_mut(inum)?;
        node.links_count += 1;
        node.update_changed_at();
        Ok(())
    }

    pub(crate) fn unlink(&mut self, path: &str) -> Result<(), FsError> {
        let (parent, name) = self.resolve_parent(path)?;
        if self.inodes.get(self.lookup(parent, name)?)?.is_dir() {
            return Err(FsError::IsADirectory);
        }
        self.remove_directory_entry(name, parent)
    }

    pub(crate) fn rmdir(&mut self, path: &str) -> Result<(), FsError> {
        let (parent, name) = self.resolve_parent(path)?;
        if !self.inodes.get(self.lookup(parent, name)?)?.is_dir() {
            return Err(FsError::NotADirectory);
        }
        self.remove_directory_entry(name, parent)
    }

    /// Drops the entry `name` from `parent`. The target inode is released (or
    /// loses a link) first; the entry is only compacted away if that succeeds.
    fn remove_directory_entry(&mut self, name: &str, parent: u32) -> Result<(), FsError> {
        let (block, len) = self.directory(parent)?;
        let slot = dir::position(block, len, name).ok_or(FsError::NotFound)?;
        let target = dir::entries(block, len)[slot].inode();

        self.remove_inode(target)?;

        let dir_node = self.inodes.get_mut(parent)?;
        dir::remove_at(self.blocks.get_mut(dir_node.blocks[0])?, len, slot);
        dir_node.len -= 1;
        dir_node.update_modified_at();
        debug!("removed entry {} (inode {}) from inode {}", name, target, parent);
        Ok(())
    }

    /// Releases `inum` and its blocks unless something still references it: a
    /// directory with entries besides `.` and `..` is refused, a file with
    /// other hard links just loses one.
    fn remove_inode(&mut self, inum: u32) -> Result<(), FsError> {
        let node = self.inodes.get_mut(inum)?;
        if node.is_dir() {
            if node.len > 2 {
                return Err(FsError::NotEmpty);
            }
        } else if node.links_count > 1 {
            node.links_count -= 1;
            node.update_changed_at();
            return Ok(());
        }

        let owned = node.data_blocks().to_vec();
        owned
            .into_iter()
            .for_each(|block| self.blocks.release(block, 1));
        self.inodes.free_inode(inum);
        debug!("released inode {}", inum);
        Ok(())
    }

    pub(crate) fn list_directory(&self, inum: u32) -> Result<Vec<DirEntryInfo>, FsError> {
        let (block, len) = self.directory(inum)?;
        dir::entries(block, len)
            .iter()
            .map(|entry| {
                Ok(DirEntryInfo {
                    name: String::from_utf8_lossy(entry.name()).into_owned(),
                    ino: entry.inode(),
                    kind: self.inodes.get(entry.inode())?.kind(),
                })
            })
            .collect()
    }

    pub(crate) fn attributes(&self, inum: u32) -> Result<FileAttr, FsError> {
        let node = self.inodes.get(inum)?;
        Ok(FileAttr {
            ino: inum,
            kind: node.kind(),
            perm: (node.mode & PERM_MASK) as u16,
            mode: node.mode,
            size: node.len,
            blocks: node.blocks_in_use,
            nlink: node.links_count,
            uid: node.uid,
            gid: node.gid,
            atime: node.access_time,
            mtime: node.modify_time,
            ctime: node.change_time,
        })
    }

    pub(crate) fn set_times(&mut self, inum: u32, atime: i64, mtime: i64) -> Result<(), FsError> {
        let node = self.inodes.get_mut(inum)?;
        node.access_time = atime;
        node.modify_time = mtime;
        node.change_time = node::now();
        Ok(())
    }

    pub(crate) fn stats(&self) -> FsStats {
        FsStats {
            block_size: BLOCK_SIZE,
            blocks: self.blocks.capacity(),
            free_blocks: self.blocks.allocations().free_count(),
            inodes: self.inodes.capacity(),
            free_inodes: self.inodes.allocations().free_count(),
            max_name_len: dir::MAX_NAME_LEN,
        }
    }
}
