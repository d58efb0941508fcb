use zerocopy::AsBytes;

/// Number of slots tracked by a single bitmap word.
const WORD_BITS: usize = 32;

#[derive(Debug, PartialEq)]
pub enum State {
    Free,
    Used,
}

/// Tracks which slots of a fixed-size pool (inodes or data blocks) are in use.
///
/// Bit `i` is set if and only if slot `i` is allocated. Bits are packed into
/// 32-bit words, least significant bit first, so the in-memory words are also
/// the persisted form of the map.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    words: Vec<u32>,
    /// Logical number of slots. The last word may carry unused trailing bits.
    size: usize,
}

impl Bitmap {
    pub fn new(size: usize) -> Self {
        Self {
            words: vec![0; Self::words_for(size)],
            size,
        }
    }

    /// Number of 32-bit words needed to track `size` slots.
    pub fn words_for(size: usize) -> usize {
        (size + WORD_BITS - 1) / WORD_BITS
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn serialize(&self) -> &[u8] {
        self.words.as_slice().as_bytes()
    }

    /// Raw word storage, for restoring a map from a snapshot in place.
    pub(crate) fn serialize_mut(&mut self) -> &mut [u8] {
        self.words.as_mut_slice().as_bytes_mut()
    }

    /// Positions outside the map report `Used` so they are never handed out.
    pub fn get(&self, pos: usize) -> State {
        if pos >= self.size {
            return State::Used;
        }
        let mask = 1_u32 << (pos % WORD_BITS);
        match self.words[pos / WORD_BITS] & mask {
            0 => State::Free,
            _ => State::Used,
        }
    }

    pub fn set_reserved(&mut self, pos: usize) {
        if let Some(word) = self.words.get_mut(pos / WORD_BITS) {
            *word |= 1_u32 << (pos % WORD_BITS);
        }
    }

    pub fn set_free(&mut self, pos: usize) {
        if let Some(word) = self.words.get_mut(pos / WORD_BITS) {
            *word &= !(1_u32 << (pos % WORD_BITS));
        }
    }

    /// First-fit run allocation. Scans from slot 0 for the first `count`
    /// consecutive free slots, marks them used and returns the start of the run.
    ///
    /// Free space is never compacted, so this can return `None` even though
    /// `count` slots are free in total.
    pub fn allocate(&mut self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }

        let mut run = 0;
        for i in 0..self.size {
            match self.get(i) {
                State::Free => {
                    run += 1;
                    if run == count {
                        let start = i + 1 - count;
                        (start..=i).for_each(|pos| self.set_reserved(pos));
                        return Some(start);
                    }
                }
                State::Used => run = 0,
            }
        }
        None
    }

    /// Clears `[start, start + count)`. Callers release runs they allocated;
    /// double frees are not detected.
    pub fn release(&mut self, start: usize, count: usize) {
        (start..start + count).for_each(|pos| self.set_free(pos));
    }

    pub fn free_count(&self) -> usize {
        (0..self.size)
            .filter(|&pos| self.get(pos) == State::Free)
            .count()
    }
}
