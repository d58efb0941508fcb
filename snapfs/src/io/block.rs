use crate::alloc::Bitmap;
use crate::dir::{DIR_ENTRY_SIZE, MAX_DIR_ENTRIES};
use crate::fs::FsError;

use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Every block is exactly large enough to hold a full directory.
pub const BLOCK_SIZE: usize = DIR_ENTRY_SIZE * MAX_DIR_ENTRIES;

/// The block number to access ranging from 0 (the first block) to n - 1 (the last
/// block) where n is number of blocks available.
pub type BlockNumber = u32;

/// A fixed-size unit of storage. Directories interpret their block as an array
/// of entries, regular files as raw bytes.
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Debug, Clone, Copy, PartialEq)]
pub struct Block {
    pub(crate) data: [u8; BLOCK_SIZE],
}

/// Fixed array of blocks plus the bitmap tracking which of them are owned by
/// an inode.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockStore {
    blocks: Vec<Block>,
    data_map: Bitmap,
}

impl BlockStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: vec![Block::new_zeroed(); capacity],
            data_map: Bitmap::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.blocks.len()
    }

    pub fn allocations(&self) -> &Bitmap {
        &self.data_map
    }

    pub(crate) fn allocations_mut(&mut self) -> &mut Bitmap {
        &mut self.data_map
    }

    pub fn serialize(&self) -> &[u8] {
        self.blocks.as_slice().as_bytes()
    }

    pub(crate) fn serialize_mut(&mut self) -> &mut [u8] {
        self.blocks.as_mut_slice().as_bytes_mut()
    }

    /// Reserves `count` contiguous blocks and returns the first block number.
    /// The blocks are zeroed so a previous owner's data never leaks.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` when no free run of `count` blocks exists. Nothing
    /// is reserved in that case.
    pub fn allocate(&mut self, count: usize) -> Result<BlockNumber, FsError> {
        let start = self.data_map.allocate(count).ok_or_else(|| {
            log::warn!(
                "no run of {} free blocks ({} free in total)",
                count,
                self.data_map.free_count()
            );
            FsError::OutOfMemory("blocks")
        })?;
        self.blocks[start..start + count]
            .iter_mut()
            .for_each(|block| *block = Block::new_zeroed());
        Ok(start as BlockNumber)
    }

    pub fn release(&mut self, start: BlockNumber, count: usize) {
        self.data_map.release(start as usize, count);
    }

    /// # Errors
    ///
    /// Accessing a block outside the store returns `OutOfRange`.
    pub fn get(&self, blocknr: BlockNumber) -> Result<&Block, FsError> {
        self.blocks
            .get(blocknr as usize)
            .ok_or(FsError::OutOfRange {
                index: blocknr as usize,
                allocated: self.capacity(),
            })
    }

    pub fn get_mut(&mut self, blocknr: BlockNumber) -> Result<&mut Block, FsError> {
        let allocated = self.capacity();
        self.blocks
            .get_mut(blocknr as usize)
            .ok_or(FsError::OutOfRange {
                index: blocknr as usize,
                allocated,
            })
    }
}
