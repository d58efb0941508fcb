use crate::alloc::{Bitmap, State};
use crate::fs::FsError;

use std::time::{SystemTime, UNIX_EPOCH};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Maximum number of directly addressed blocks per inode. There are no
/// indirect blocks, so this also caps the size of a file.
pub const BLOCKS_PER_INODE: usize = 10;

pub const S_IFMT: u32 = 0o170_000;
pub const S_IFDIR: u32 = 0o040_000;
pub const S_IFREG: u32 = 0o100_000;
/// Permission, setuid, setgid and sticky bits.
pub const PERM_MASK: u32 = 0o7777;

/// Inode index of the root directory.
pub const ROOT_INODE: u32 = 0;

/// The type of file object described by an inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// A regular file.
    RegularFile,
    /// A directory tree containing entries for files or directories.
    Directory,
}

#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Debug, Clone, Copy, PartialEq)]
/// This structure is dumped verbatim into snapshots and must stay 96 bytes
/// with no implicit padding.
pub struct Inode {
    /// File type and permission bits (e.g. `S_IFDIR | 0o755`).
    pub(crate) mode: u32,
    /// The id of the owning user.
    pub(crate) uid: u32,
    /// The id of the owning group.
    pub(crate) gid: u32,
    /// The number of directory entries referencing this inode.
    pub(crate) links_count: u32,
    /// How many entries of `blocks` are in use.
    pub(crate) blocks_in_use: u32,
    /// Bumped each time the slot is handed out, so handles to an earlier
    /// occupant of the slot can be told apart.
    pub(crate) generation: u32,
    /// Logical length: bytes for a regular file, entries for a directory.
    pub(crate) len: u64,
    /// Seconds since epoch of the last data read.
    pub(crate) access_time: i64,
    /// Seconds since epoch of the last data write.
    pub(crate) modify_time: i64,
    /// Seconds since epoch of the last metadata change.
    pub(crate) change_time: i64,
    /// Block store indices of the file data, in file order.
    pub(crate) blocks: [u32; BLOCKS_PER_INODE],
}

pub(crate) fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

impl Inode {
    /// A fresh inode owning the single block `block`.
    pub fn new(mode: u32, uid: u32, gid: u32, block: u32) -> Self {
        let now = now();
        let mut blocks = [0; BLOCKS_PER_INODE];
        blocks[0] = block;
        Self {
            mode,
            uid,
            gid,
            links_count: 1,
            blocks_in_use: 1,
            generation: 0,
            len: 0,
            access_time: now,
            modify_time: now,
            change_time: now,
            blocks,
        }
    }

    pub fn kind(&self) -> FileKind {
        if self.mode & S_IFMT == S_IFDIR {
            FileKind::Directory
        } else {
            FileKind::RegularFile
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == FileKind::Directory
    }

    /// Block indices currently owned by this inode.
    pub fn data_blocks(&self) -> &[u32] {
        let in_use = (self.blocks_in_use as usize).min(BLOCKS_PER_INODE);
        &self.blocks[..in_use]
    }

    pub fn update_accessed_at(&mut self) {
        self.access_time = now();
    }

    pub fn update_modified_at(&mut self) {
        let now = now();
        self.modify_time = now;
        self.change_time = now;
    }

    pub fn update_changed_at(&mut self) {
        self.change_time = now();
    }
}

/// Fixed-capacity array of inode records. The index of a record is its inode
/// number.
#[derive(Debug, Clone, PartialEq)]
pub struct InodeTable {
    nodes: Vec<Inode>,
    alloc_tracker: Bitmap,
}

impl InodeTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            nodes: vec![Inode::new_zeroed(); capacity],
            alloc_tracker: Bitmap::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    pub fn allocations(&self) -> &Bitmap {
        &self.alloc_tracker
    }

    pub(crate) fn allocations_mut(&mut self) -> &mut Bitmap {
        &mut self.alloc_tracker
    }

    /// Raw bytes of every record, allocated or not.
    pub fn serialize(&self) -> &[u8] {
        self.nodes.as_slice().as_bytes()
    }

    pub(crate) fn serialize_mut(&mut self) -> &mut [u8] {
        self.nodes.as_mut_slice().as_bytes_mut()
    }

    /// Reserves the lowest free inode slot and stores `node` in it, one
    /// generation past the slot's previous occupant.
    pub fn allocate_inode(&mut self, node: Inode) -> Result<u32, FsError> {
        let inum = self.alloc_tracker.allocate(1).ok_or_else(|| {
            log::warn!("inode table exhausted ({} slots)", self.capacity());
            FsError::OutOfMemory("inodes")
        })?;
        let slot = &mut self.nodes[inum];
        let generation = slot.generation.wrapping_add(1);
        *slot = Inode { generation, ..node };
        Ok(inum as u32)
    }

    /// Returns the slot to the free pool and clears the record. Only the
    /// generation survives.
    pub fn free_inode(&mut self, inum: u32) {
        if let Some(node) = self.nodes.get_mut(inum as usize) {
            *node = Inode {
                generation: node.generation,
                ..Inode::new_zeroed()
            };
        }
        self.alloc_tracker.release(inum as usize, 1);
    }

    pub fn get(&self, inum: u32) -> Result<&Inode, FsError> {
        let pos = inum as usize;
        match (self.alloc_tracker.get(pos), self.nodes.get(pos)) {
            (State::Used, Some(node)) => Ok(node),
            _ => Err(FsError::NotFound),
        }
    }

    pub fn get_mut(&mut self, inum: u32) -> Result<&mut Inode, FsError> {
        let pos = inum as usize;
        match (self.alloc_tracker.get(pos), self.nodes.get_mut(pos)) {
            (State::Used, Some(node)) => Ok(node),
            _ => Err(FsError::NotFound),
        }
    }

    pub fn total_nodes(&self) -> usize {
        self.capacity() - self.alloc_tracker.free_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inode_record_has_fixed_layout() {
        assert_eq!(std::mem::size_of::<Inode>(), 96);
        assert_eq!(Inode::new_zeroed().as_bytes(), &[0_u8; 96][..]);
    }

    #[test]
    fn kind_is_derived_from_mode() {
        assert_eq!(Inode::new(S_IFDIR | 0o755, 0, 0, 3).kind(), FileKind::Directory);
        assert_eq!(Inode::new(S_IFREG | 0o644, 0, 0, 3).kind(), FileKind::RegularFile);
    }

    #[test]
    fn new_inode_owns_one_block() {
        let node = Inode::new(S_IFREG | 0o644, 1000, 100, 7);
        assert_eq!(node.data_blocks(), &[7]);
        assert_eq!(node.links_count, 1);
        assert_eq!(node.len, 0);
        assert_eq!((node.uid, node.gid), (1000, 100));
    }

    #[test]
    fn allocates_lowest_free_slot() {
        let mut table = InodeTable::new(4);
        let node = Inode::new(S_IFREG, 0, 0, 0);

        assert_eq!(table.allocate_inode(node).unwrap(), 0);
        assert_eq!(table.allocate_inode(node).unwrap(), 1);
        table.free_inode(0);
        assert_eq!(table.allocate_inode(node).unwrap(), 0);
        assert_eq!(table.total_nodes(), 2);
    }

    #[test]
    fn exhausted_table_reports_out_of_memory() {
        let mut table = InodeTable::new(1);
        let node = Inode::new(S_IFREG, 0, 0, 0);
        table.allocate_inode(node).unwrap();

        match table.allocate_inode(node) {
            Err(FsError::OutOfMemory(_)) => (),
            other => panic!("expected out of memory, got {:?}", other),
        }
    }

    #[test]
    fn freed_slots_are_not_readable() {
        let mut table = InodeTable::new(2);
        let inum = table.allocate_inode(Inode::new(S_IFREG, 0, 0, 0)).unwrap();
        table.free_inode(inum);

        assert!(matches!(table.get(inum), Err(FsError::NotFound)));
        assert!(matches!(table.get(99), Err(FsError::NotFound)));
    }

    #[test]
    fn reused_slots_get_a_new_generation() {
        let mut table = InodeTable::new(2);
        let node = Inode::new(S_IFREG, 0, 0, 0);
        let inum = table.allocate_inode(node).unwrap();
        let first = table.get(inum).unwrap().generation;
        table.free_inode(inum);

        assert_eq!(table.allocate_inode(node).unwrap(), inum);
        assert_eq!(table.get(inum).unwrap().generation, first + 1);
    }
}
