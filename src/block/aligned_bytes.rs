//! Memory-aligned byte buffers
//!
//! ```text
//! buf:  [ skipped | block 0 | block 1 | ... | slack ]
//!       ^         ^
//!       heap ptr  ptr % block_size == 0 (offset)
//! ```
//!
//! The backing `Vec` is over-allocated by one block so that some prefix can
//! be skipped to reach an aligned address. The `Vec` is never grown in
//! place, otherwise the computed offset would no longer hold.

use std::fmt;

use super::BlockSize;

/// A byte buffer whose start address and capacity are block aligned
pub struct AlignedBytes {
    buf: Vec<u8>,
    offset: usize,
    len: usize,
    block_size: BlockSize,
}

impl AlignedBytes {
    /// Allocates `size` zeroed bytes
    pub fn new(size: usize, block_size: BlockSize) -> Self {
        let (buf, offset) = Self::allocate(size, block_size);
        AlignedBytes {
            buf,
            offset,
            len: size,
            block_size,
        }
    }

    /// Copies `bytes` into a fresh aligned buffer of the same length
    pub fn from_bytes(bytes: &[u8], block_size: BlockSize) -> Self {
        let mut aligned = AlignedBytes::new(bytes.len(), block_size);
        aligned.as_bytes_mut().copy_from_slice(bytes);
        aligned
    }

    fn allocate(size: usize, block_size: BlockSize) -> (Vec<u8>, usize) {
        let block = block_size.as_usize();
        let capacity = block_size.ceil_align(size as u64) as usize + block;
        let buf = vec![0; capacity];
        let misalignment = buf.as_ptr() as usize % block;
        let offset = (block - misalignment) % block;
        (buf, offset)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[self.offset..self.offset + self.len]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.offset..self.offset + self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    /// Usable bytes before a reallocation is needed
    pub fn capacity(&self) -> usize {
        self.block_size
            .floor_align((self.buf.len() - self.offset) as u64) as usize
    }

    /// Rounds the length up to the next block boundary
    pub fn align(&mut self) {
        self.len = self.block_size.ceil_align(self.len as u64) as usize;
    }

    /// Changes the length, keeping the current contents
    ///
    /// Bytes exposed by growing within the existing allocation keep whatever
    /// they held before; bytes from a fresh allocation are zero.
    pub fn resize(&mut self, new_len: usize) {
        if new_len > self.capacity() {
            let (mut buf, offset) = Self::allocate(new_len, self.block_size);
            buf[offset..offset + self.len].copy_from_slice(self.as_bytes());
            self.buf = buf;
            self.offset = offset;
        }
        self.len = new_len;
    }

    /// `resize` followed by `align`
    pub fn align_resize(&mut self, new_len: usize) {
        self.resize(new_len);
        self.align();
    }

    /// Shortens the buffer; no-op when `len` is not smaller
    pub fn truncate(&mut self, len: usize) {
        if len < self.len {
            self.len = len;
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl Clone for AlignedBytes {
    // A derived clone would copy the Vec to a new address and break alignment.
    fn clone(&self) -> Self {
        AlignedBytes::from_bytes(self.as_bytes(), self.block_size)
    }
}

impl AsRef<[u8]> for AlignedBytes {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsMut<[u8]> for AlignedBytes {
    fn as_mut(&mut self) -> &mut [u8] {
        self.as_bytes_mut()
    }
}

impl PartialEq for AlignedBytes {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for AlignedBytes {}

impl fmt::Debug for AlignedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedBytes")
            .field("len", &self.len)
            .field("block_size", &self.block_size)
            .finish()
    }
}
