//! Short Thumb programs executed through the full fetch/decode/execute path.

#![allow(clippy::pedantic, clippy::nursery)]

use log as _;
use proptest as _;
#[cfg(feature = "serde")]
use serde as _;
use tempfile as _;
use thiserror as _;

use rp2040_core::{StopReason, System, SystemConfig, PSR_C, PSR_N, PSR_Z, SRAM_BASE};
use rstest::rstest;

fn run(code: &[u16], steps: u64) -> System {
    let mut system = System::new(SystemConfig {
        sram_size: 0x1000,
        ..SystemConfig::single_core()
    })
    .expect("system");
    let bytes: Vec<u8> = code.iter().flat_map(|hw| hw.to_le_bytes()).collect();
    system.load_binary(SRAM_BASE, &bytes).expect("load");
    system.set_register(0, 15, SRAM_BASE).expect("pc");
    let outcome = system.run_cycles(steps).expect("program runs without fault");
    assert_eq!(outcome.reason, StopReason::CycleBudget);
    system
}

#[rstest]
#[case::adds_register(&[0x2005, 0x2107, 0x1842], 3, 2, 12)]
#[case::subs_imm3(&[0x2005, 0x1EC1], 2, 1, 2)]
#[case::lsls_imm(&[0x2001, 0x0100], 2, 0, 16)]
#[case::lsrs_imm(&[0x2080, 0x08C1], 2, 1, 16)]
#[case::asrs_keeps_sign(&[0x2000, 0x3801, 0x1100], 3, 0, 0xFFFF_FFFF)]
#[case::ands(&[0x20F0, 0x213C, 0x4008], 3, 0, 0x30)]
#[case::eors(&[0x20FF, 0x210F, 0x4048], 3, 0, 0xF0)]
#[case::orrs(&[0x20F0, 0x210F, 0x4308], 3, 0, 0xFF)]
#[case::lsls_register(&[0x2001, 0x211F, 0x4088], 3, 0, 0x8000_0000)]
#[case::rors_register(&[0x2001, 0x2101, 0x41C8], 3, 0, 0x8000_0000)]
#[case::mov_high_register(&[0x2009, 0x4680], 2, 8, 9)]
#[case::add_high_register(&[0x2003, 0x4681, 0x4448], 3, 0, 6)]
#[case::mov_wide_replicated_immediate(&[0xF04F, 0x20FF], 1, 0, 0xFF00_FF00)]
#[case::adr_aligns_pc(&[0xA001], 1, 0, SRAM_BASE + 8)]
#[case::str_ldr_sp_relative(&[0x202A, 0xB082, 0x9001, 0x9901], 4, 1, 42)]
#[case::strb_ldrsb_sign_extends(&[0x2080, 0xB082, 0x4669, 0x2200, 0x5488, 0x568B], 6, 3, 0xFFFF_FF80)]
#[case::strh_ldrh(&[0x20FF, 0x0200, 0xB082, 0x4669, 0x8048, 0x884A], 6, 2, 0xFF00)]
#[case::ldr_wide_imm12(&[0xB082, 0x204D, 0x9000, 0xF8DD, 0x1000], 4, 1, 77)]
#[case::push_pop_restores(&[0x240B, 0x2516, 0xB430, 0x2400, 0x2500, 0xBC30], 6, 5, 22)]
#[case::stm_ldm_round_trip(&[0xB084, 0x466B, 0x2001, 0x2102, 0xC303, 0x466B, 0xCB60], 7, 6, 2)]
#[case::bl_skips_to_target(&[0xF000, 0xF801, 0x2001, 0x2002], 2, 0, 2)]
#[case::bl_links_with_thumb_bit(&[0xF000, 0xF801, 0x2001, 0x2002], 1, 14, SRAM_BASE + 5)]
#[case::countdown_loop(&[0x2003, 0x3801, 0xD1FD], 7, 0, 0)]
#[case::msr_mrs_primask(&[0x2001, 0xF380, 0x8810, 0xF3EF, 0x8110], 3, 1, 1)]
#[case::cpsid_masks(&[0xB672, 0xF3EF, 0x8210], 2, 2, 1)]
fn programs_leave_the_expected_register_value(
    #[case] code: &[u16],
    #[case] steps: u64,
    #[case] register: u8,
    #[case] expected: u32,
) {
    let system = run(code, steps);
    assert_eq!(system.get_register(0, register), Ok(expected));
}

#[test]
fn countdown_loop_exits_with_zero_flag_set() {
    // movs r0, #3; loop: subs r0, #1; bne loop; nop
    let system = run(&[0x2003, 0x3801, 0xD1FD, 0xBF00], 7);
    let core = system.core_state(0).expect("core").as_arm().expect("arm");
    assert!(core.flag(PSR_Z));
    assert!(core.flag(PSR_C));
    assert!(!core.flag(PSR_N));
    assert_eq!(core.pc(), SRAM_BASE + 6);
}

#[test]
fn compare_sets_borrow_flags() {
    // movs r0, #3; cmp r0, #5
    let system = run(&[0x2003, 0x2805], 2);
    let core = system.core_state(0).expect("core").as_arm().expect("arm");
    assert!(core.flag(PSR_N));
    assert!(!core.flag(PSR_Z));
    assert!(!core.flag(PSR_C));
    assert_eq!(system.get_register(0, 0), Ok(3));
}
