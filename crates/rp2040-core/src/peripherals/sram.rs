//! Contiguous SRAM backing store covering all six banks.

use crate::fault::AllocationError;
use crate::memory::allocate_zeroed;

/// Byte-addressed SRAM; offsets are relative to [`crate::SRAM_BASE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sram {
    data: Box<[u8]>,
}

impl Sram {
    /// Allocates `size` zeroed bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::OutOfMemory`] when the allocator refuses.
    pub fn new(size: u32) -> Result<Self, AllocationError> {
        let bytes = usize::try_from(size).map_err(|_| AllocationError::OutOfMemory {
            what: "sram",
            bytes: usize::MAX,
        })?;
        Ok(Self {
            data: allocate_zeroed("sram", bytes)?,
        })
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` for a zero-sized store.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrows the whole store.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Copies `bytes` to `offset`. Returns `false` without writing when the
    /// span does not fit.
    pub fn load(&mut self, offset: usize, bytes: &[u8]) -> bool {
        let Some(end) = offset.checked_add(bytes.len()) else {
            return false;
        };
        match self.data.get_mut(offset..end) {
            Some(dst) => {
                dst.copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }

    /// Zeroes the store.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Reads `N` little-endian bytes at `offset`.
    #[must_use]
    pub fn read<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        let end = offset.checked_add(N)?;
        self.data.get(offset..end)?.try_into().ok()
    }

    /// Writes `N` bytes at `offset`. Returns `false` when out of range.
    pub fn write<const N: usize>(&mut self, offset: usize, bytes: [u8; N]) -> bool {
        self.load(offset, &bytes)
    }
}
