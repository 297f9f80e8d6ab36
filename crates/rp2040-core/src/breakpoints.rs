//! Fixed-capacity breakpoint set consulted before every fetch.

use crate::fault::BreakpointError;

/// Number of breakpoint addresses a system can hold.
pub const BREAKPOINT_CAPACITY: usize = 32;

/// Unordered set of breakpoint addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BreakpointSet {
    addrs: [u32; BREAKPOINT_CAPACITY],
    len: usize,
}

impl Default for BreakpointSet {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakpointSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            addrs: [0; BREAKPOINT_CAPACITY],
            len: 0,
        }
    }

    /// Adds `addr`. Adding an address already present is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BreakpointError::Full`] when the set is at capacity.
    pub fn add(&mut self, addr: u32) -> Result<(), BreakpointError> {
        if self.contains(addr) {
            return Ok(());
        }
        if self.is_full() {
            return Err(BreakpointError::Full {
                capacity: BREAKPOINT_CAPACITY,
            });
        }
        self.addrs[self.len] = addr;
        self.len += 1;
        Ok(())
    }

    /// Removes `addr`, moving the last entry into its slot. Returns whether
    /// it was present.
    pub fn remove(&mut self, addr: u32) -> bool {
        let Some(index) = self.as_slice().iter().position(|&bp| bp == addr) else {
            return false;
        };
        self.len -= 1;
        self.addrs.swap(index, self.len);
        true
    }

    /// Removes every breakpoint.
    pub const fn clear(&mut self) {
        self.len = 0;
    }

    /// Returns `true` when `addr` is a breakpoint.
    #[must_use]
    pub fn contains(&self, addr: u32) -> bool {
        self.as_slice().contains(&addr)
    }

    /// Number of breakpoints.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when no breakpoint is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` when no more breakpoints fit.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.len == BREAKPOINT_CAPACITY
    }

    /// Active breakpoint addresses, in no particular order.
    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.addrs[..self.len]
    }
}
