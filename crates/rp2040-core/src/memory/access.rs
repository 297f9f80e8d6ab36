//! Access-width, alignment and region-permission checks shared by the bus and loaders.

use std::fmt;

use crate::fault::BusFault;
use crate::memory::map::{decode_memory_region, SRAM_BASE};

/// Width of a single bus transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AccessWidth {
    /// 8-bit transfer.
    Byte,
    /// 16-bit transfer.
    Halfword,
    /// 32-bit transfer.
    #[default]
    Word,
}

impl AccessWidth {
    /// Transfer size in bytes.
    #[must_use]
    pub const fn bytes(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::Halfword => 2,
            Self::Word => 4,
        }
    }
}

impl fmt::Display for AccessWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Byte => "byte",
            Self::Halfword => "halfword",
            Self::Word => "word",
        })
    }
}

/// Purpose of a bus transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AccessKind {
    /// Data read.
    Read,
    /// Data write.
    Write,
    /// Instruction fetch.
    Fetch,
}

/// Validates natural alignment for `width` at `addr`.
///
/// # Errors
///
/// Returns [`BusFault::Misaligned`] when `addr` is not a multiple of the width.
pub const fn validate_alignment(addr: u32, width: AccessWidth) -> Result<(), BusFault> {
    if addr % width.bytes() == 0 {
        Ok(())
    } else {
        Err(BusFault::Misaligned { addr, width })
    }
}

/// Validates region permissions for an access of `kind` at `addr`.
///
/// Only decodes the fixed region table; whether a peripheral register
/// actually exists is decided by the bus.
///
/// # Errors
///
/// Returns [`BusFault::Unmapped`] outside every region,
/// [`BusFault::ReadOnly`] for writes to non-writable regions and
/// [`BusFault::NotExecutable`] for fetches from register space.
pub const fn validate_region_access(addr: u32, kind: AccessKind) -> Result<(), BusFault> {
    let Some(region) = decode_memory_region(addr) else {
        return Err(BusFault::Unmapped { addr });
    };
    let access = region.access();
    match kind {
        AccessKind::Read => Ok(()),
        AccessKind::Write if access.writable() => Ok(()),
        AccessKind::Write => Err(BusFault::ReadOnly { addr }),
        AccessKind::Fetch if access.executable() => Ok(()),
        AccessKind::Fetch => Err(BusFault::NotExecutable { addr }),
    }
}

/// Returns the byte offset into an SRAM of `sram_size` bytes when the span
/// `addr..addr + len` lies entirely inside it.
///
/// Arithmetic is carried out in 64 bits so spans that would wrap the 32-bit
/// address space are rejected rather than aliased.
#[must_use]
pub fn sram_offset(addr: u32, len: usize, sram_size: u32) -> Option<usize> {
    let start = u64::from(addr);
    let base = u64::from(SRAM_BASE);
    let end = start.checked_add(u64::try_from(len).ok()?)?;
    if start < base || end > base + u64::from(sram_size) {
        return None;
    }
    usize::try_from(start - base).ok()
}
