//! RP2040 memory map constants, region descriptors and address decoding.

/// Base address of the mask ROM.
pub const BOOTROM_BASE: u32 = 0x0000_0000;
/// Size in bytes of the mask ROM window.
pub const BOOTROM_SIZE: u32 = 0x4000;
/// Base address of the execute-in-place flash window.
pub const XIP_BASE: u32 = 0x1000_0000;
/// Size in bytes of the execute-in-place flash window.
pub const XIP_SIZE: u32 = 0x0100_0000;
/// Base address of striped SRAM.
pub const SRAM_BASE: u32 = 0x2000_0000;
/// Size in bytes of the emulated SRAM window; bank 5 absorbs the tail.
pub const SRAM_SIZE: u32 = 0x42800;
/// Base address of the APB peripheral segment.
pub const APB0_BASE: u32 = 0x4000_0000;
/// Base address of the AHB-lite peripheral segment.
pub const APB1_BASE: u32 = 0x5000_0000;
/// Base address of the high-speed AHB peripheral segment (PIO).
pub const AHB_BASE: u32 = 0x5040_0000;
/// Base address of the single-cycle IO block.
pub const SIO_BASE: u32 = 0xD000_0000;

/// SRAM bank base addresses, `SRAM0..=SRAM5`.
pub const SRAM_BANK_BASES: [u32; 6] = [
    0x2000_0000,
    0x2001_0000,
    0x2002_0000,
    0x2003_0000,
    0x2004_0000,
    0x2004_1000,
];

/// Base address of UART0 on the APB segment.
pub const UART0_BASE: u32 = 0x4003_4000;
/// Base address of UART1 on the APB segment.
pub const UART1_BASE: u32 = 0x4003_8000;
/// Size of one APB peripheral register block.
pub const PERIPHERAL_BLOCK_SIZE: u32 = 0x1000;

/// Number of user GPIO pins in bank 0.
pub const GPIO_PINS: u8 = 30;
/// Number of processor cores on the chip.
pub const NUM_CORES: usize = 2;
/// Nominal system clock in hertz.
pub const CLOCK_HZ: u64 = 133_000_000;

/// Access rights a region grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RegionAccess {
    /// Readable and executable, never writable.
    ReadExecute,
    /// Readable, writable and executable.
    ReadWriteExecute,
    /// Readable and writable register space.
    ReadWrite,
}

impl RegionAccess {
    /// Returns `true` when data writes are legal.
    #[must_use]
    pub const fn writable(self) -> bool {
        matches!(self, Self::ReadWriteExecute | Self::ReadWrite)
    }

    /// Returns `true` when instruction fetches are legal.
    #[must_use]
    pub const fn executable(self) -> bool {
        matches!(self, Self::ReadExecute | Self::ReadWriteExecute)
    }
}

/// Canonical fixed-region descriptor for the memory map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionDescriptor {
    /// Region classification.
    pub region: MemoryRegion,
    /// Human-readable region name.
    pub name: &'static str,
    /// Inclusive start address.
    pub start: u32,
    /// Inclusive end address.
    pub end: u32,
    /// Access rights.
    pub access: RegionAccess,
}

/// Region classification for 32-bit bus addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum MemoryRegion {
    /// Mask ROM.
    BootRom,
    /// Execute-in-place flash window.
    Xip,
    /// Striped SRAM.
    Sram,
    /// APB peripherals (UART, SPI, I2C, timers).
    Apb0,
    /// AHB-lite peripherals (DMA, USB).
    Apb1,
    /// High-speed AHB peripherals (PIO).
    Ahb,
    /// Single-cycle IO (GPIO, FIFOs, spinlocks).
    Sio,
}

impl MemoryRegion {
    /// Returns the inclusive bounds for this region.
    #[must_use]
    pub const fn bounds(self) -> (u32, u32) {
        match self {
            Self::BootRom => (BOOTROM_BASE, BOOTROM_BASE + BOOTROM_SIZE - 1),
            Self::Xip => (XIP_BASE, XIP_BASE + XIP_SIZE - 1),
            Self::Sram => (SRAM_BASE, SRAM_BASE + SRAM_SIZE - 1),
            Self::Apb0 => (APB0_BASE, APB1_BASE - 1),
            Self::Apb1 => (APB1_BASE, AHB_BASE - 1),
            Self::Ahb => (AHB_BASE, 0x5FFF_FFFF),
            Self::Sio => (SIO_BASE, 0xDFFF_FFFF),
        }
    }

    /// Returns the access rights of this region.
    #[must_use]
    pub const fn access(self) -> RegionAccess {
        match self {
            Self::BootRom | Self::Xip => RegionAccess::ReadExecute,
            Self::Sram => RegionAccess::ReadWriteExecute,
            Self::Apb0 | Self::Apb1 | Self::Ahb | Self::Sio => RegionAccess::ReadWrite,
        }
    }

    /// Returns the region name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BootRom => "bootrom",
            Self::Xip => "xip",
            Self::Sram => "sram",
            Self::Apb0 => "apb",
            Self::Apb1 => "ahb-lite",
            Self::Ahb => "ahb",
            Self::Sio => "sio",
        }
    }

    /// Returns `true` when `addr` belongs to this region.
    #[must_use]
    pub const fn contains(self, addr: u32) -> bool {
        let (start, end) = self.bounds();
        addr >= start && addr <= end
    }

    /// Returns the canonical descriptor for this region.
    #[must_use]
    pub const fn descriptor(self) -> RegionDescriptor {
        let (start, end) = self.bounds();
        RegionDescriptor {
            region: self,
            name: self.name(),
            start,
            end,
            access: self.access(),
        }
    }
}

/// Fixed region layout in ascending address order.
pub const FIXED_MEMORY_REGIONS: [RegionDescriptor; 7] = [
    MemoryRegion::BootRom.descriptor(),
    MemoryRegion::Xip.descriptor(),
    MemoryRegion::Sram.descriptor(),
    MemoryRegion::Apb0.descriptor(),
    MemoryRegion::Apb1.descriptor(),
    MemoryRegion::Ahb.descriptor(),
    MemoryRegion::Sio.descriptor(),
];

const _: () = assert_fixed_region_layout();

const fn assert_fixed_region_layout() {
    let mut index = 0;
    while index < FIXED_MEMORY_REGIONS.len() {
        let descriptor = FIXED_MEMORY_REGIONS[index];
        assert!(
            descriptor.start <= descriptor.end,
            "region start cannot be greater than end"
        );

        if index > 0 {
            let previous = FIXED_MEMORY_REGIONS[index - 1];
            assert!(
                previous.end < descriptor.start,
                "fixed regions must be ascending and disjoint"
            );
        }

        index += 1;
    }

    assert!(
        SRAM_BANK_BASES[0] == SRAM_BASE,
        "first sram bank must start at the sram base"
    );
    assert!(
        UART0_BASE >= APB0_BASE && UART1_BASE + PERIPHERAL_BLOCK_SIZE <= APB1_BASE,
        "uart blocks must sit on the apb segment"
    );
}

/// Decodes a bus address into its fixed memory region, if any.
#[must_use]
pub const fn decode_memory_region(addr: u32) -> Option<MemoryRegion> {
    let mut index = 0;
    while index < FIXED_MEMORY_REGIONS.len() {
        let descriptor = FIXED_MEMORY_REGIONS[index];
        if addr >= descriptor.start && addr <= descriptor.end {
            return Some(descriptor.region);
        }
        index += 1;
    }
    None
}

/// Returns the SRAM bank index (`0..=5`) holding `addr`, if it is in SRAM.
#[must_use]
pub const fn sram_bank(addr: u32) -> Option<usize> {
    if !MemoryRegion::Sram.contains(addr) {
        return None;
    }
    let mut bank = SRAM_BANK_BASES.len();
    while bank > 0 {
        bank -= 1;
        if addr >= SRAM_BANK_BASES[bank] {
            return Some(bank);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{
        decode_memory_region, sram_bank, MemoryRegion, RegionAccess, FIXED_MEMORY_REGIONS,
        SIO_BASE, SRAM_BASE, SRAM_SIZE, UART0_BASE, UART1_BASE, XIP_BASE,
    };

    #[test]
    fn region_decode_is_correct_at_boundaries() {
        assert_eq!(decode_memory_region(0), Some(MemoryRegion::BootRom));
        assert_eq!(decode_memory_region(0x3FFF), Some(MemoryRegion::BootRom));
        assert_eq!(decode_memory_region(0x4000), None);

        assert_eq!(decode_memory_region(XIP_BASE), Some(MemoryRegion::Xip));
        assert_eq!(decode_memory_region(SRAM_BASE), Some(MemoryRegion::Sram));
        assert_eq!(
            decode_memory_region(SRAM_BASE + SRAM_SIZE - 1),
            Some(MemoryRegion::Sram)
        );
        assert_eq!(decode_memory_region(SRAM_BASE + SRAM_SIZE), None);

        assert_eq!(decode_memory_region(UART0_BASE), Some(MemoryRegion::Apb0));
        assert_eq!(decode_memory_region(UART1_BASE), Some(MemoryRegion::Apb0));
        assert_eq!(decode_memory_region(0x5040_0000), Some(MemoryRegion::Ahb));
        assert_eq!(decode_memory_region(SIO_BASE), Some(MemoryRegion::Sio));
        assert_eq!(decode_memory_region(0xE000_ED00), None);
        assert_eq!(decode_memory_region(u32::MAX), None);
    }

    #[test]
    fn contains_matches_decoder_on_region_edges() {
        for descriptor in FIXED_MEMORY_REGIONS {
            for addr in [descriptor.start, descriptor.end] {
                assert_eq!(decode_memory_region(addr), Some(descriptor.region));
                assert!(descriptor.region.contains(addr));
            }
            if descriptor.start > 0 {
                assert!(!descriptor.region.contains(descriptor.start - 1));
            }
            assert!(!descriptor.region.contains(descriptor.end.wrapping_add(1)));
        }
    }

    #[test]
    fn only_memory_regions_are_executable() {
        assert!(MemoryRegion::Sram.access().executable());
        assert!(MemoryRegion::Xip.access().executable());
        assert!(!MemoryRegion::Sio.access().executable());
        assert!(!MemoryRegion::BootRom.access().writable());
        assert_eq!(MemoryRegion::Apb0.access(), RegionAccess::ReadWrite);
    }

    #[test]
    fn sram_banks_resolve_by_base() {
        assert_eq!(sram_bank(SRAM_BASE), Some(0));
        assert_eq!(sram_bank(0x2001_0000), Some(1));
        assert_eq!(sram_bank(0x2003_FFFF), Some(3));
        assert_eq!(sram_bank(0x2004_0FFF), Some(4));
        assert_eq!(sram_bank(0x2004_1000), Some(5));
        assert_eq!(sram_bank(SRAM_BASE + SRAM_SIZE - 1), Some(5));
        assert_eq!(sram_bank(SRAM_BASE + SRAM_SIZE), None);
        assert_eq!(sram_bank(XIP_BASE), None);
    }
}
