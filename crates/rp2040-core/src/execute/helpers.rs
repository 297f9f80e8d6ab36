//! ALU helpers shared by the instruction handlers.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use crate::encoding::ShiftType;

/// Applies `shift` by `amount` and returns the result with the shifter
/// carry-out. A zero amount passes `value` and `carry_in` through.
#[must_use]
pub const fn shift_with_carry(
    value: u32,
    shift: ShiftType,
    amount: u32,
    carry_in: bool,
) -> (u32, bool) {
    if amount == 0 {
        return (value, carry_in);
    }
    match shift {
        ShiftType::Lsl => match amount {
            1..=31 => (value << amount, (value >> (32 - amount)) & 1 == 1),
            32 => (0, value & 1 == 1),
            _ => (0, false),
        },
        ShiftType::Lsr => match amount {
            1..=31 => (value >> amount, (value >> (amount - 1)) & 1 == 1),
            32 => (0, value >> 31 == 1),
            _ => (0, false),
        },
        ShiftType::Asr => {
            if amount < 32 {
                (
                    ((value as i32) >> amount) as u32,
                    (value >> (amount - 1)) & 1 == 1,
                )
            } else {
                let negative = value >> 31 == 1;
                (if negative { u32::MAX } else { 0 }, negative)
            }
        }
        ShiftType::Ror => {
            let result = value.rotate_right(amount % 32);
            (result, result >> 31 == 1)
        }
    }
}

/// `a + b + carry_in`, returning `(result, carry, overflow)`.
#[must_use]
pub const fn add_with_carry(a: u32, b: u32, carry_in: bool) -> (u32, bool, bool) {
    let unsigned = a as u64 + b as u64 + carry_in as u64;
    let signed = a as i32 as i64 + b as i32 as i64 + carry_in as i64;
    let result = unsigned as u32;
    (
        result,
        unsigned > u32::MAX as u64,
        result as i32 as i64 != signed,
    )
}

/// Rounds `value` down to a multiple of `alignment` (a power of two).
#[must_use]
pub const fn align(value: u32, alignment: u32) -> u32 {
    value & !(alignment - 1)
}

/// Sign-extends a loaded byte or halfword.
#[must_use]
pub const fn sign_extend_load(value: u32, bytes: u32) -> u32 {
    match bytes {
        1 => value as u8 as i8 as i32 as u32,
        2 => value as u16 as i16 as i32 as u32,
        _ => value,
    }
}
