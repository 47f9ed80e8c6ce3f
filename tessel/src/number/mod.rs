//! Number to string conversion and back.
//!
//! Formatting uses exact big-integer arithmetic so the produced digits are
//! the shortest that read back as the same double.
mod bignum;
mod dtoa;
mod parse;

pub use bignum::BigUint;
pub use dtoa::{number_to_string, shortest_digits, to_base_string};
pub use parse::{parse_radix_integer, string_to_number};

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub(crate) fn digit_char(digit: u32) -> char {
    DIGITS[digit as usize] as char
}

/// `ToString` with an explicit radix, as `Number.prototype.toString` does.
pub fn to_string_radix(value: f64, radix: u32) -> String {
    if radix == 10 {
        number_to_string(value)
    } else {
        to_base_string(value, radix)
    }
}
