//! Fixed-size directory entries stored inside a directory's single block.
//!
//! A directory's live entries occupy the first `len` slots of its block, where
//! `len` is kept in the directory inode. Slots 0 and 1 always hold `.` and
//! `..`. Removal moves the last live entry into the freed slot, so entry order
//! is insertion order only until the first removal.

use crate::fs::FsError;
use crate::io::Block;

use zerocopy::byteorder::{NativeEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Longest entry name, in bytes. Shorter names are NUL padded.
pub const MAX_NAME_LEN: usize = 60;
pub const DIR_ENTRY_SIZE: usize = 64;
/// Number of entries that fit in one directory block.
pub const MAX_DIR_ENTRIES: usize = 64;

#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Debug, Clone, Copy, PartialEq)]
pub struct DirEntry {
    name: [u8; MAX_NAME_LEN],
    /// Host byte order like every other snapshot record, but alignment 1 so
    /// entries can be viewed in place over a block's bytes.
    inode: U32<NativeEndian>,
}

impl DirEntry {
    fn new(name: &str, inode: u32) -> Self {
        let mut entry = Self::new_zeroed();
        entry.name[..name.len()].copy_from_slice(name.as_bytes());
        entry.inode = U32::new(inode);
        entry
    }

    /// The entry name without its NUL padding.
    pub fn name(&self) -> &[u8] {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_NAME_LEN);
        &self.name[..end]
    }

    pub fn inode(&self) -> u32 {
        self.inode.get()
    }
}

/// Rejects names that cannot be stored in an entry or that would be ambiguous
/// during path resolution.
pub fn validate_name(name: &str) -> Result<(), FsError> {
    if name.is_empty() {
        return Err(FsError::BadArgument("empty file name".to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(FsError::BadArgument(format!(
            "name \"{}\" exceeds {} bytes",
            name, MAX_NAME_LEN
        )));
    }
    if name.contains('\0') || name.contains('/') {
        return Err(FsError::BadArgument(format!(
            "name \"{}\" contains a reserved character",
            name.escape_default()
        )));
    }
    Ok(())
}

fn slots(block: &Block) -> &[DirEntry] {
    DirEntry::slice_from(&block.data[..]).unwrap_or(&[])
}

fn slots_mut(block: &mut Block) -> &mut [DirEntry] {
    DirEntry::mut_slice_from(&mut block.data[..]).unwrap_or(&mut [])
}

/// The first `len` entries of a directory block.
pub fn entries(block: &Block, len: usize) -> &[DirEntry] {
    let slots = slots(block);
    &slots[..len.min(slots.len())]
}

/// Linear scan for `name` among the live entries.
pub fn position(block: &Block, len: usize, name: &str) -> Option<usize> {
    entries(block, len)
        .iter()
        .position(|entry| entry.name() == name.as_bytes())
}

pub fn lookup(block: &Block, len: usize, name: &str) -> Option<u32> {
    position(block, len, name).map(|slot| entries(block, len)[slot].inode())
}

/// Writes the `.` and `..` entries of a new directory. Returns the new entry
/// count.
pub fn init(block: &mut Block, this: u32, parent: u32) -> usize {
    let slots = slots_mut(block);
    slots[0] = DirEntry::new(".", this);
    slots[1] = DirEntry::new("..", parent);
    2
}

/// Stores a new entry in slot `len`. The caller bumps the directory length.
///
/// # Errors
///
/// `OutOfMemory` if the block already holds `MAX_DIR_ENTRIES` entries.
pub fn append(block: &mut Block, len: usize, name: &str, inode: u32) -> Result<(), FsError> {
    validate_name(name)?;
    match slots_mut(block).get_mut(len) {
        Some(slot) => {
            *slot = DirEntry::new(name, inode);
            Ok(())
        }
        None => Err(FsError::OutOfMemory("directory entries")),
    }
}

/// Removes the entry at `slot` by moving the last live entry over it and
/// zeroing the vacated last slot. The caller decrements the directory length.
pub fn remove_at(block: &mut Block, len: usize, slot: usize) {
    let slots = slots_mut(block);
    let last = len.min(slots.len()) - 1;
    slots[slot] = slots[last];
    slots[last] = DirEntry::new_zeroed();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(block: &Block, len: usize) -> Vec<String> {
        entries(block, len)
            .iter()
            .map(|entry| String::from_utf8_lossy(entry.name()).into_owned())
            .collect()
    }

    #[test]
    fn entry_record_is_sixty_four_bytes() {
        assert_eq!(std::mem::size_of::<DirEntry>(), DIR_ENTRY_SIZE);
        assert_eq!(std::mem::align_of::<DirEntry>(), 1);
    }

    #[test]
    fn inode_index_is_stored_in_host_order() {
        let mut block = Block::new_zeroed();
        init(&mut block, 0x0102_0304, 0);

        let index = &block.data[MAX_NAME_LEN..DIR_ENTRY_SIZE];
        assert_eq!(index, &0x0102_0304_u32.to_ne_bytes()[..]);
    }

    #[test]
    fn new_directory_has_self_and_parent() {
        let mut block = Block::new_zeroed();
        let len = init(&mut block, 4, 0);

        assert_eq!(len, 2);
        assert_eq!(names(&block, len), vec![".", ".."]);
        assert_eq!(lookup(&block, len, "."), Some(4));
        assert_eq!(lookup(&block, len, ".."), Some(0));
    }

    #[test]
    fn lookup_only_sees_live_entries() {
        let mut block = Block::new_zeroed();
        let len = init(&mut block, 1, 0);
        append(&mut block, len, "a.txt", 7).unwrap();

        assert_eq!(lookup(&block, len, "a.txt"), None);
        assert_eq!(lookup(&block, len + 1, "a.txt"), Some(7));
        assert_eq!(lookup(&block, len + 1, "a.tx"), None);
    }

    #[test]
    fn names_may_use_every_byte() {
        let name = "x".repeat(MAX_NAME_LEN);
        let mut block = Block::new_zeroed();
        append(&mut block, 0, &name, 3).unwrap();

        assert_eq!(entries(&block, 1)[0].name(), name.as_bytes());
        assert_eq!(lookup(&block, 1, &name), Some(3));
    }

    #[test]
    fn rejects_unstorable_names() {
        let mut block = Block::new_zeroed();
        let long = "x".repeat(MAX_NAME_LEN + 1);
        for name in &["", "a/b", "nul\0byte", long.as_str()] {
            assert!(matches!(
                append(&mut block, 0, name, 1),
                Err(FsError::BadArgument(_))
            ));
        }
    }

    #[test]
    fn full_block_rejects_new_entries() {
        let mut block = Block::new_zeroed();
        for i in 0..MAX_DIR_ENTRIES {
            append(&mut block, i, &format!("f{}", i), i as u32).unwrap();
        }
        assert!(matches!(
            append(&mut block, MAX_DIR_ENTRIES, "one-more", 1),
            Err(FsError::OutOfMemory(_))
        ));
    }

    #[test]
    fn removal_moves_last_entry_into_gap() {
        let mut block = Block::new_zeroed();
        let mut len = init(&mut block, 1, 0);
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            append(&mut block, len, name, 10 + i as u32).unwrap();
            len += 1;
        }

        let slot = position(&block, len, "a").unwrap();
        remove_at(&mut block, len, slot);
        len -= 1;

        assert_eq!(names(&block, len), vec![".", "..", "c", "b"]);
        assert_eq!(lookup(&block, len, "c"), Some(12));
        // The vacated slot is cleared.
        assert_eq!(slots(&block)[len], DirEntry::new_zeroed());
    }

    #[test]
    fn removing_last_entry_just_clears_it() {
        let mut block = Block::new_zeroed();
        let len = init(&mut block, 1, 0);
        append(&mut block, len, "only", 9).unwrap();

        remove_at(&mut block, len + 1, 2);
        assert_eq!(names(&block, len), vec![".", ".."]);
        assert_eq!(slots(&block)[2], DirEntry::new_zeroed());
    }
}
