use super::bignum::BigUint;

fn is_space(c: char) -> bool {
    c.is_whitespace() || c == '\u{feff}'
}

fn is_decimal_literal(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;
    let digits = |i: &mut usize| {
        let start = *i;
        while *i < bytes.len() && bytes[*i].is_ascii_digit() {
            *i += 1;
        }
        *i - start
    };

    let mut seen = digits(&mut i);
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        seen += digits(&mut i);
    }
    if seen == 0 {
        return false;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        if digits(&mut i) == 0 {
            return false;
        }
    }
    i == bytes.len()
}

/// `ToNumber` applied to a string: surrounding whitespace is ignored, the
/// empty string is zero, `0x` prefixes select hexadecimal, and anything
/// unparseable is NaN.
pub fn string_to_number(text: &str) -> f64 {
    let text = text.trim_matches(is_space);
    if text.is_empty() {
        return 0.0;
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return parse_radix_integer(hex, 16).unwrap_or(f64::NAN);
    }
    let (sign, body) = match text.as_bytes()[0] {
        b'-' => (-1.0, &text[1..]),
        b'+' => (1.0, &text[1..]),
        _ => (1.0, text),
    };
    if body == "Infinity" {
        return sign * f64::INFINITY;
    }
    if !is_decimal_literal(body) {
        return f64::NAN;
    }
    body.parse::<f64>().map_or(f64::NAN, |v| sign * v)
}

/// Parse unsigned digits in `base` (2..=36), rounding to the nearest
/// double. `None` when `text` is empty or holds a non-digit.
pub fn parse_radix_integer(text: &str, base: u32) -> Option<f64> {
    if text.is_empty() {
        return None;
    }
    let mut acc = BigUint::zero();
    for c in text.chars() {
        let digit = c.to_digit(base)?;
        acc.mul_small(base as u64);
        acc.add_small(digit as u64);
    }
    Some(acc.to_f64())
}
