mod block;
mod snapshot;

pub use block::{Block, BlockStore, BLOCK_SIZE};
pub use snapshot::snapshot_len;
