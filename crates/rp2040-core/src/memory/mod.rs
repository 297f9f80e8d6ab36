//! Memory model: RP2040 map, access validation and the routed system bus.

/// Access width, alignment and permission checks.
pub mod access;
/// Routed system bus over SRAM and peripherals.
pub mod bus;
/// Fixed memory-region map and address decoder.
pub mod map;

pub use access::{
    sram_offset, validate_alignment, validate_region_access, AccessKind, AccessWidth,
};
pub use bus::{SystemBus, UART_COUNT};
pub use map::{
    decode_memory_region, sram_bank, MemoryRegion, RegionAccess, RegionDescriptor, AHB_BASE,
    APB0_BASE, APB1_BASE, BOOTROM_BASE, BOOTROM_SIZE, CLOCK_HZ, FIXED_MEMORY_REGIONS, GPIO_PINS,
    NUM_CORES, PERIPHERAL_BLOCK_SIZE, SIO_BASE, SRAM_BANK_BASES, SRAM_BASE, SRAM_SIZE, UART0_BASE,
    UART1_BASE, XIP_BASE, XIP_SIZE,
};

use crate::fault::AllocationError;

/// Allocates a zeroed backing store, reporting allocator refusal instead of aborting.
///
/// # Errors
///
/// Returns [`AllocationError::OutOfMemory`] when the reservation fails.
pub fn allocate_zeroed(what: &'static str, bytes: usize) -> Result<Box<[u8]>, AllocationError> {
    let mut store = Vec::new();
    store
        .try_reserve_exact(bytes)
        .map_err(|_| AllocationError::OutOfMemory { what, bytes })?;
    store.resize(bytes, 0);
    Ok(store.into_boxed_slice())
}
