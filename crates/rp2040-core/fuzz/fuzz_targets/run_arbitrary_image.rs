#![no_main]

use libfuzzer_sys::fuzz_target;
use rp2040_core::{Decoder, FaultPolicy, System, SystemConfig, SRAM_BASE};

const FUZZ_SRAM: u32 = 0x1000;

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    let low = u32::from(u16::from_le_bytes([data[0], data[1]]));
    let high = u32::from(u16::from_le_bytes([data[2], data[3]]));
    let _ = Decoder::decode(low, 2);
    let _ = Decoder::decode((high << 16) | low, 4);

    let Ok(mut system) = System::new(SystemConfig {
        sram_size: FUZZ_SRAM,
        fault_policy: FaultPolicy::ParkCore,
        secondary_cores_dormant: false,
        ..SystemConfig::default()
    }) else {
        return;
    };
    let image = &data[..data.len().min(FUZZ_SRAM as usize)];
    if system.load_binary(SRAM_BASE, image).is_err() {
        return;
    }
    for core in 0..system.core_count() {
        let _ = system.set_register(core, 15, SRAM_BASE);
    }
    let _ = system.run_cycles(512);
    let _ = system.disassemble(SRAM_BASE, 16);
});
