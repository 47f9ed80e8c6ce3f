//! Shortest round-trip digit generation.
//!
//! [`to_base_string`] renders any radix by exact base conversion of the
//! integer part and a bounded expansion of the fraction. [`shortest_digits`]
//! is the free-format generator used for the decimal layout of
//! [`number_to_string`].
use std::cmp::Ordering;

use super::bignum::BigUint;
use super::digit_char;

const HIDDEN_BIT: u64 = 1 << 52;
const FRACTION_MASK: u64 = HIDDEN_BIT - 1;
/// Exponent bias plus significand width: `value = mantissa * 2^(biased - 1075)`.
const EXP_OFFSET: i32 = 1075;
const MIN_EXP: i32 = 1 - EXP_OFFSET;

fn biased_exponent(bits: u64) -> i32 {
    ((bits >> 52) & 0x7ff) as i32
}

/// Split a finite positive double into `mantissa * 2^exp`.
fn decompose(value: f64) -> (u64, i32) {
    let bits = value.to_bits();
    let biased = biased_exponent(bits);
    let fraction = bits & FRACTION_MASK;
    if biased == 0 {
        (fraction, MIN_EXP)
    } else {
        (fraction | HIDDEN_BIT, biased - EXP_OFFSET)
    }
}

/// Like [`decompose`] with the mantissa reduced to an odd number.
fn decompose_odd(value: f64) -> (u64, i32) {
    let (mantissa, exp) = decompose(value);
    let tz = mantissa.trailing_zeros();
    (mantissa >> tz, exp + tz as i32)
}

fn special_literal(value: f64) -> Option<&'static str> {
    if value.is_nan() {
        Some("NaN")
    } else if value == f64::INFINITY {
        Some("Infinity")
    } else if value == f64::NEG_INFINITY {
        Some("-Infinity")
    } else if value == 0.0 {
        Some("0")
    } else {
        None
    }
}

/// Render `value` in `base` (2..=36) with the fewest fraction digits that
/// still identify the double.
pub fn to_base_string(value: f64, base: u32) -> String {
    debug_assert!((2..=36).contains(&base), "radix {base} out of range");
    if let Some(literal) = special_literal(value) {
        return literal.to_string();
    }
    if value < 0.0 {
        return format!("-{}", to_base_string(-value, base));
    }

    let floor = value.floor();
    let mut out = if floor < 9_223_372_036_854_775_808.0 {
        BigUint::from_u64(floor as u64).to_radix_string(base)
    } else {
        let (mantissa, exp) = decompose(floor);
        let mut int = BigUint::from_u64(mantissa);
        int.shl(exp as usize);
        int.to_radix_string(base)
    };
    if value == floor {
        return out;
    }
    out.push('.');

    let bits = value.to_bits();
    let biased = biased_exponent(bits);
    let (mantissa, exp) = decompose_odd(value - floor);

    // 1/2^s2 is half the distance to the next double.
    let mut s2 = if biased == 0 { -1 } else { -biased };
    s2 += EXP_OFFSET + 1;
    let mut mlo = BigUint::from_u64(1);
    let mut mhi = None;
    if bits & FRACTION_MASK == 0 && biased > 1 {
        // On a power of two the gap below is half the gap above.
        s2 += 1;
        mhi = Some(BigUint::from_u64(2));
    }

    let mut b = BigUint::from_u64(mantissa);
    b.shl((exp + s2) as usize);
    let mut s = BigUint::from_u64(1);
    s.shl(s2 as usize);
    let even = bits & 1 == 0;

    loop {
        b.mul_small(base as u64);
        let mut digit = b.quo_rem(&s);
        mlo.mul_small(base as u64);
        if let Some(hi) = mhi.as_mut() {
            hi.mul_small(base as u64);
        }
        let hi = mhi.as_ref().unwrap_or(&mlo);
        let j = b.cmp(&mlo);
        let j1 = if s <= *hi {
            Ordering::Greater
        } else {
            let mut delta = s.clone();
            delta.sub_assign(hi);
            b.cmp(&delta)
        };

        let done = if j1 == Ordering::Equal && even {
            if j == Ordering::Greater {
                digit += 1;
            }
            true
        } else if j == Ordering::Less || (j == Ordering::Equal && even) {
            if j1 == Ordering::Greater {
                // Either digit works; take the one closer to the value.
                b.shl(1);
                if b > s {
                    digit += 1;
                }
            }
            true
        } else if j1 == Ordering::Greater {
            digit += 1;
            true
        } else {
            false
        };
        out.push(digit_char(digit));
        if done {
            return out;
        }
    }
}

/// Shortest digits of a finite positive `value` in `base`, together with
/// the exponent `k` such that `value = 0.d1d2d3... * base^k`.
///
/// Among equally short candidates the one closest to `value` is chosen.
/// Zero yields `("0", 1)`.
pub fn shortest_digits(value: f64, base: u32) -> (String, i32) {
    debug_assert!(value.is_finite() && value >= 0.0);
    if value == 0.0 {
        return ("0".to_string(), 1);
    }
    let (f, e) = decompose(value);
    // Round-half-even: boundaries are acceptable when the mantissa is even.
    let even = f & 1 == 0;

    let (mut r, mut s, mut m_plus, mut m_minus);
    if e >= 0 {
        let unit = BigUint::pow(2, e as u32);
        if f != HIDDEN_BIT {
            r = BigUint::from_u64(f);
            r.shl(e as usize + 1);
            s = BigUint::from_u64(2);
            m_plus = unit.clone();
            m_minus = unit;
        } else {
            r = BigUint::from_u64(f);
            r.shl(e as usize + 2);
            s = BigUint::from_u64(4);
            m_plus = unit.clone();
            m_plus.shl(1);
            m_minus = unit;
        }
    } else if e == MIN_EXP || f != HIDDEN_BIT {
        r = BigUint::from_u64(f);
        r.shl(1);
        s = BigUint::from_u64(1);
        s.shl((1 - e) as usize);
        m_plus = BigUint::from_u64(1);
        m_minus = BigUint::from_u64(1);
    } else {
        r = BigUint::from_u64(f);
        r.shl(2);
        s = BigUint::from_u64(1);
        s.shl((2 - e) as usize);
        m_plus = BigUint::from_u64(2);
        m_minus = BigUint::from_u64(1);
    }

    // Estimate is exact or one too small; the check below fixes it up.
    let log2 = (e + 63 - f.leading_zeros() as i32) as f64;
    let mut k = (log2 * std::f64::consts::LN_2 / (base as f64).ln() - 1e-10).ceil() as i32;
    if k >= 0 {
        s = s.mul(&BigUint::pow(base as u64, k as u32));
    } else {
        let scale = BigUint::pow(base as u64, (-k) as u32);
        r = r.mul(&scale);
        m_plus = m_plus.mul(&scale);
        m_minus = m_minus.mul(&scale);
    }
    let high = r.add(&m_plus);
    if (even && high >= s) || (!even && high > s) {
        s.mul_small(base as u64);
        k += 1;
    }

    let mut digits = String::new();
    loop {
        r.mul_small(base as u64);
        m_plus.mul_small(base as u64);
        m_minus.mul_small(base as u64);
        let mut digit = r.quo_rem(&s);
        let low = if even { r <= m_minus } else { r < m_minus };
        let high = {
            let upper = r.add(&m_plus);
            if even { upper >= s } else { upper > s }
        };
        match (low, high) {
            (false, false) => {
                digits.push(digit_char(digit));
                continue;
            }
            (true, false) => {}
            (false, true) => digit += 1,
            (true, true) => {
                let mut twice = r.clone();
                twice.shl(1);
                if twice >= s {
                    digit += 1;
                }
            }
        }
        digits.push(digit_char(digit));
        return (digits, k);
    }
}

/// `Number::toString` for radix 10: shortest digits laid out in plain
/// notation for `1e-7 <= |value| < 1e21`, exponent notation otherwise.
pub fn number_to_string(value: f64) -> String {
    if let Some(literal) = special_literal(value) {
        return literal.to_string();
    }
    if value < 0.0 {
        return format!("-{}", number_to_string(-value));
    }

    let (digits, n) = shortest_digits(value, 10);
    let k = digits.len() as i32;
    if k <= n && n <= 21 {
        let mut out = digits;
        out.extend(std::iter::repeat_n('0', (n - k) as usize));
        out
    } else if 0 < n && n <= 21 {
        let (int, frac) = digits.split_at(n as usize);
        format!("{int}.{frac}")
    } else if -6 < n && n <= 0 {
        format!("0.{}{digits}", "0".repeat((-n) as usize))
    } else {
        let exp = n - 1;
        let sign = if exp < 0 { '-' } else { '+' };
        let (lead, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{lead}e{sign}{}", exp.abs())
        } else {
            format!("{lead}.{rest}e{sign}{}", exp.abs())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<f64> {
        let mut out = vec![
            0.1,
            0.1 + 0.2,
            1.0 / 3.0,
            2.0 / 3.0,
            std::f64::consts::PI,
            std::f64::consts::E,
            1e23,
            5e-324,
            2.2250738585072014e-308,
            2.225073858507201e-308,
            f64::MAX,
            f64::EPSILON,
            9007199254740992.0,
            9007199254740991.0,
            123.456,
            1e21,
            1e-7,
            0.5,
            1024.0,
            2f64.powi(-1022),
            2f64.powi(60),
            1.7976931348623155e308,
        ];
        // Deterministic spread over the whole exponent range.
        let mut state = 0x2545_f491_4f6c_dd1du64;
        while out.len() < 600 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let v = f64::from_bits(state >> 1);
            if v.is_finite() && v != 0.0 {
                out.push(v);
            }
        }
        out
    }

    #[test]
    fn decimal_layout() {
        assert_eq!(number_to_string(0.1), "0.1");
        assert_eq!(number_to_string(1.0), "1");
        assert_eq!(number_to_string(100.0), "100");
        assert_eq!(number_to_string(-1.5), "-1.5");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.000001), "0.000001");
        assert_eq!(number_to_string(1e-7), "1e-7");
        assert_eq!(number_to_string(1.23e-18), "1.23e-18");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(123456789012345680000.0), "123456789012345680000");
        assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(number_to_string(5e-324), "5e-324");
        assert_eq!(number_to_string(f64::MAX), "1.7976931348623157e+308");
        assert_eq!(number_to_string(1e23), "1e+23");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn decimal_round_trips() {
        for v in samples() {
            let text = number_to_string(v);
            assert_eq!(text.parse::<f64>().unwrap(), v, "{text}");
            let neg = number_to_string(-v);
            assert_eq!(neg.parse::<f64>().unwrap(), -v, "{neg}");
        }
    }

    #[test]
    fn digits_are_shortest() {
        // The standard library's exponent formatting also emits the
        // shortest round-trip digits, closest candidate first.
        for v in samples() {
            let (digits, k) = shortest_digits(v, 10);
            let reference = format!("{v:e}");
            let (mantissa, exp) = reference.split_once('e').unwrap();
            let expected: String = mantissa.chars().filter(|c| *c != '.').collect();
            assert_eq!(digits, expected, "{v:e}");
            assert_eq!(k - 1, exp.parse::<i32>().unwrap(), "{v:e}");
        }
    }

    #[test]
    fn power_of_two_boundaries() {
        for exp in [-1022, -100, -1, 0, 1, 52, 53, 100, 1023] {
            let v = 2f64.powi(exp);
            let text = number_to_string(v);
            assert_eq!(text.parse::<f64>().unwrap(), v, "{text}");
        }
    }

    #[test]
    fn other_radices() {
        assert_eq!(to_base_string(255.0, 16), "ff");
        assert_eq!(to_base_string(-255.0, 2), "-11111111");
        assert_eq!(to_base_string(35.0, 36), "z");
        assert_eq!(to_base_string(0.5, 2), "0.1");
        assert_eq!(to_base_string(0.5, 16), "0.8");
        assert_eq!(to_base_string(-10.25, 2), "-1010.01");
        assert_eq!(to_base_string(2f64.powi(70), 16), "400000000000000000");
        assert_eq!(
            to_base_string(0.1, 2),
            "0.0001100110011001100110011001100110011001100110011001101"
        );
        assert_eq!(to_base_string(f64::NAN, 7), "NaN");
        assert_eq!(to_base_string(-0.0, 7), "0");
    }

    #[test]
    fn binary_fractions_are_exact() {
        for v in [0.75, 0.1, 1.0 / 3.0, 1e-300, 123.456] {
            let text = to_base_string(v, 2);
            let (int, frac) = text.split_once('.').unwrap();
            let mut value = u64::from_str_radix(int, 2).unwrap() as f64;
            let mut scale = 0.5;
            for c in frac.chars() {
                if c == '1' {
                    value += scale;
                }
                scale /= 2.0;
            }
            assert_eq!(value, v, "{text}");
        }
    }

    /// Whether the base-`base` fraction digits lie within half an ulp of
    /// the fractional part of `v`, compared exactly.
    fn fraction_identifies(v: f64, frac_digits: &str, base: u32) -> bool {
        let mut digits = BigUint::zero();
        for c in frac_digits.chars() {
            digits.mul_small(base as u64);
            digits.add_small(c.to_digit(base).unwrap() as u64);
        }
        let (_, exp) = decompose(v);
        let (mf, ef) = decompose(v - v.floor());
        let shift = [0, -ef, 1 - exp].into_iter().max().unwrap();

        let scale = BigUint::pow(base as u64, frac_digits.len() as u32);
        let mut actual = digits;
        actual.shl(shift as usize);
        let mut expected = BigUint::from_u64(mf).mul(&scale);
        expected.shl((ef + shift) as usize);
        let mut half_ulp = scale;
        half_ulp.shl((exp - 1 + shift) as usize);

        let diff = if actual >= expected {
            actual.sub_assign(&expected);
            actual
        } else {
            expected.sub_assign(&actual);
            expected
        };
        diff < half_ulp || (diff == half_ulp && v.to_bits() & 1 == 0)
    }

    #[test]
    fn every_radix_identifies_the_double() {
        let mut state = 0x9e37_79b9_7f4a_7c15u64;
        let mut checked = 0;
        while checked < 150 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            // Powers of two have an asymmetric gap; skip them here.
            if state & FRACTION_MASK == 0 {
                continue;
            }
            let biased = 1023 - 40 + (state >> 52) % 80;
            let v = f64::from_bits(biased << 52 | (state & FRACTION_MASK));
            for base in 2..=36 {
                let text = to_base_string(v, base);
                let (int, frac) = text.split_once('.').unwrap_or((text.as_str(), ""));
                let int = u64::from_str_radix(int, base).unwrap();
                assert_eq!(int as f64, v.floor(), "{v:e} in base {base}: {text}");
                if v != v.floor() {
                    assert!(
                        fraction_identifies(v, frac, base),
                        "{v:e} in base {base}: {text}"
                    );
                }
            }
            checked += 1;
        }
    }
}
