//! Byte-level reads and writes over an inode's direct blocks.
//!
//! A logical offset maps to block `offset / BLOCK_SIZE` of the inode's block
//! list at byte `offset % BLOCK_SIZE`. Writes that run past the last allocated
//! block grow the file by one contiguous run of blocks.

use crate::fs::FsError;
use crate::image::Image;
use crate::io::{BlockStore, BLOCK_SIZE};
use crate::node::{Inode, BLOCKS_PER_INODE};

use log::debug;

/// Copies `data` into the blocks of `node` starting at logical byte `pos`.
/// Every touched block must already be allocated.
fn copy_in(store: &mut BlockStore, node: &Inode, mut pos: usize, mut data: &[u8]) -> Result<(), FsError> {
    while !data.is_empty() {
        let blocknr = node.blocks[pos / BLOCK_SIZE];
        let within = pos % BLOCK_SIZE;
        let n = data.len().min(BLOCK_SIZE - within);
        store.get_mut(blocknr)?.data[within..within + n].copy_from_slice(&data[..n]);
        data = &data[n..];
        pos += n;
    }
    Ok(())
}

fn copy_out(store: &BlockStore, node: &Inode, mut pos: usize, len: usize) -> Result<Vec<u8>, FsError> {
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        let blocknr = node.blocks[pos / BLOCK_SIZE];
        let within = pos % BLOCK_SIZE;
        let n = (len - out.len()).min(BLOCK_SIZE - within);
        out.extend_from_slice(&store.get(blocknr)?.data[within..within + n]);
        pos += n;
    }
    Ok(out)
}

/// Index of the block holding `offset`, refusing offsets that start beyond
/// the inode's allocated blocks.
fn start_block(inum: u32, node: &Inode, offset: usize) -> Result<usize, FsError> {
    let index = offset / BLOCK_SIZE;
    let allocated = node.blocks_in_use as usize;
    if index > allocated {
        log::error!(
            "inode {} accessed at block {} but owns only {} blocks",
            inum,
            index,
            allocated
        );
        return Err(FsError::OutOfRange { index, allocated });
    }
    Ok(index)
}

fn to_offset(offset: u64) -> Result<usize, FsError> {
    usize::try_from(offset).map_err(|_| FsError::BadArgument(format!("offset {} too large", offset)))
}

impl Image {
    /// Reads up to `size` bytes at `offset`. The read is clamped at the logical
    /// end of the file, so it may return fewer bytes (or none).
    pub(crate) fn read(&mut self, inum: u32, offset: u64, size: usize) -> Result<Vec<u8>, FsError> {
        let node = *self.inodes.get(inum)?;
        if node.is_dir() {
            return Err(FsError::IsADirectory);
        }
        let offset = to_offset(offset)?;
        start_block(inum, &node, offset)?;

        let end = (node.len as usize).min(node.data_blocks().len() * BLOCK_SIZE);
        let size = size.min(end.saturating_sub(offset));
        let data = copy_out(&self.blocks, &node, offset, size)?;

        self.inodes.get_mut(inum)?.update_accessed_at();
        debug!("read {} bytes at {} from inode {}", data.len(), offset, inum);
        Ok(data)
    }

    /// Writes `data` at `offset` and returns the number of bytes written.
    ///
    /// Bytes landing in already allocated blocks are copied first. The rest
    /// needs one contiguous run of new blocks; if that run cannot be allocated,
    /// or would push the inode past `BLOCKS_PER_INODE`, the write fails with
    /// `OutOfMemory` and the bytes already copied stay in place.
    pub(crate) fn write(&mut self, inum: u32, offset: u64, data: &[u8]) -> Result<usize, FsError> {
        let node = *self.inodes.get(inum)?;
        if node.is_dir() {
            return Err(FsError::IsADirectory);
        }
        let offset = to_offset(offset)?;
        start_block(inum, &node, offset)?;
        if data.is_empty() {
            return Ok(0);
        }
        let end = offset
            .checked_add(data.len())
            .ok_or_else(|| FsError::BadArgument("write extends past the end of the address space".to_string()))?;

        let in_use = node.data_blocks().len();
        let allocated_end = in_use * BLOCK_SIZE;
        let in_place = allocated_end.saturating_sub(offset).min(data.len());
        copy_in(&mut self.blocks, &node, offset, &data[..in_place])?;

        let mut node = node;
        if end > allocated_end {
            let needed = (end - allocated_end + BLOCK_SIZE - 1) / BLOCK_SIZE;
            if in_use + needed > BLOCKS_PER_INODE {
                log::warn!(
                    "inode {} would need {} blocks, limit is {}",
                    inum,
                    in_use + needed,
                    BLOCKS_PER_INODE
                );
                return Err(FsError::OutOfMemory("direct block slots"));
            }
            let first = self.blocks.allocate(needed)?;
            for (slot, blocknr) in (in_use..in_use + needed).zip(first..) {
                node.blocks[slot] = blocknr;
            }
            node.blocks_in_use = (in_use + needed) as u32;
            copy_in(
                &mut self.blocks,
                &node,
                offset.max(allocated_end),
                &data[in_place..],
            )?;
        }

        node.len = node.len.max(end as u64);
        node.update_modified_at();
        *self.inodes.get_mut(inum)? = node;
        debug!("wrote {} bytes at {} to inode {}", data.len(), offset, inum);
        Ok(data.len())
    }
}
