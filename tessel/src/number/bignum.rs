//! Unsigned arbitrary-precision integers for exact number formatting.
//!
//! Only the handful of operations the digit generators need: scaling by
//! small factors and powers, shifts, comparison, subtraction and small
//! quotients.
use std::cmp::Ordering;

/// Little-endian 64-bit limbs with no trailing zero limbs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BigUint {
    limbs: Vec<u64>,
}

fn normalize_len(limbs: &[u64]) -> usize {
    let mut idx = limbs.len();
    while idx > 0 && limbs[idx - 1] == 0 {
        idx -= 1;
    }
    idx
}

impl BigUint {
    pub fn zero() -> Self {
        Self { limbs: Vec::new() }
    }

    pub fn from_u64(value: u64) -> Self {
        let mut out = Self { limbs: vec![value] };
        out.normalize();
        out
    }

    /// `base ^ exp`
    pub fn pow(base: u64, exp: u32) -> Self {
        let mut out = Self::from_u64(1);
        let mut factor = Self::from_u64(base);
        let mut exp = exp;
        while exp > 0 {
            if exp & 1 == 1 {
                out = out.mul(&factor);
            }
            exp >>= 1;
            if exp > 0 {
                factor = factor.mul(&factor);
            }
        }
        out
    }

    fn normalize(&mut self) {
        let len = normalize_len(&self.limbs);
        self.limbs.truncate(len);
    }

    pub fn is_zero(&self) -> bool {
        self.limbs.is_empty()
    }

    pub fn bit_len(&self) -> usize {
        match self.limbs.last() {
            Some(top) => self.limbs.len() * 64 - top.leading_zeros() as usize,
            None => 0,
        }
    }

    /// Multiply in place by `2^bits`.
    pub fn shl(&mut self, bits: usize) {
        if self.is_zero() || bits == 0 {
            return;
        }
        let limb_shift = bits / 64;
        let bit_shift = (bits % 64) as u32;
        if bit_shift != 0 {
            let mut carry = 0u64;
            for limb in self.limbs.iter_mut() {
                let next = (*limb << bit_shift) | carry;
                carry = *limb >> (64 - bit_shift);
                *limb = next;
            }
            if carry != 0 {
                self.limbs.push(carry);
            }
        }
        if limb_shift > 0 {
            self.limbs.splice(0..0, std::iter::repeat_n(0, limb_shift));
        }
    }

    /// Divide in place by `2^bits`, discarding the remainder.
    pub fn shr(&mut self, bits: usize) {
        let limb_shift = bits / 64;
        if limb_shift >= self.limbs.len() {
            self.limbs.clear();
            return;
        }
        self.limbs.drain(0..limb_shift);
        let bit_shift = (bits % 64) as u32;
        if bit_shift != 0 {
            let mut carry = 0u64;
            for limb in self.limbs.iter_mut().rev() {
                let next = (*limb >> bit_shift) | carry;
                carry = *limb << (64 - bit_shift);
                *limb = next;
            }
        }
        self.normalize();
    }

    /// Whether any of the low `bits` bits is set.
    fn has_low_bits(&self, bits: usize) -> bool {
        let full = bits / 64;
        if self.limbs.iter().take(full).any(|&l| l != 0) {
            return true;
        }
        let rest = (bits % 64) as u32;
        rest != 0
            && self
                .limbs
                .get(full)
                .is_some_and(|&l| l & ((1u64 << rest) - 1) != 0)
    }

    pub fn mul_small(&mut self, factor: u64) {
        let mut carry = 0u128;
        for limb in self.limbs.iter_mut() {
            let acc = (*limb as u128) * (factor as u128) + carry;
            *limb = acc as u64;
            carry = acc >> 64;
        }
        if carry != 0 {
            self.limbs.push(carry as u64);
        }
        self.normalize();
    }

    pub fn add_small(&mut self, value: u64) {
        let mut carry = value as u128;
        for limb in self.limbs.iter_mut() {
            if carry == 0 {
                break;
            }
            let acc = *limb as u128 + carry;
            *limb = acc as u64;
            carry = acc >> 64;
        }
        if carry != 0 {
            self.limbs.push(carry as u64);
        }
    }

    pub fn add(&self, other: &Self) -> Self {
        let len = self.limbs.len().max(other.limbs.len());
        let mut out = Vec::with_capacity(len + 1);
        let mut carry = 0u128;
        for i in 0..len {
            let a = self.limbs.get(i).copied().unwrap_or(0) as u128;
            let b = other.limbs.get(i).copied().unwrap_or(0) as u128;
            let sum = a + b + carry;
            out.push(sum as u64);
            carry = sum >> 64;
        }
        if carry != 0 {
            out.push(carry as u64);
        }
        Self { limbs: out }
    }

    /// `self -= other`. `other` must not exceed `self`.
    pub fn sub_assign(&mut self, other: &Self) {
        debug_assert!(*self >= *other, "bignum subtraction underflow");
        let mut borrow = 0u64;
        for i in 0..self.limbs.len() {
            let b = other.limbs.get(i).copied().unwrap_or(0);
            let (r1, o1) = self.limbs[i].overflowing_sub(b);
            let (r2, o2) = r1.overflowing_sub(borrow);
            self.limbs[i] = r2;
            borrow = (o1 | o2) as u64;
        }
        self.normalize();
    }

    pub fn mul(&self, other: &Self) -> Self {
        if self.is_zero() || other.is_zero() {
            return Self::zero();
        }
        let mut out = vec![0u64; self.limbs.len() + other.limbs.len()];
        for (i, &a) in self.limbs.iter().enumerate() {
            let mut carry = 0u128;
            for (j, &b) in other.limbs.iter().enumerate() {
                let acc = out[i + j] as u128 + (a as u128) * (b as u128) + carry;
                out[i + j] = acc as u64;
                carry = acc >> 64;
            }
            out[i + other.limbs.len()] = carry as u64;
        }
        let mut out = Self { limbs: out };
        out.normalize();
        out
    }

    /// Divide in place by a small divisor, returning the remainder.
    pub fn div_rem_small(&mut self, divisor: u64) -> u64 {
        let mut rem = 0u128;
        for limb in self.limbs.iter_mut().rev() {
            let num = (rem << 64) | (*limb as u128);
            *limb = (num / divisor as u128) as u64;
            rem = num % divisor as u128;
        }
        self.normalize();
        rem as u64
    }

    /// Replace `self` with `self mod divisor` and return the quotient.
    ///
    /// The quotient must be small; the digit generators only call this when
    /// it is below the output base.
    pub fn quo_rem(&mut self, divisor: &Self) -> u32 {
        let mut quotient = 0;
        while *self >= *divisor {
            self.sub_assign(divisor);
            quotient += 1;
        }
        quotient
    }

    /// Nearest double, ties to even.
    pub fn to_f64(&self) -> f64 {
        let bits = self.bit_len();
        if bits <= 64 {
            return self.limbs.first().copied().unwrap_or(0) as f64;
        }
        let shift = bits - 64;
        let sticky = self.has_low_bits(shift);
        let mut top = self.clone();
        top.shr(shift);
        let mut head = top.limbs.first().copied().unwrap_or(0);
        if sticky {
            head |= 1;
        }
        if shift > 1023 {
            return f64::INFINITY;
        }
        (head as f64) * f64::from_bits(((shift as u64) + 1023) << 52)
    }

    /// Render in `base` (2..=36), most significant digit first.
    pub fn to_radix_string(&self, base: u32) -> String {
        if self.is_zero() {
            return "0".to_string();
        }
        let mut digits = Vec::new();
        let mut rest = self.clone();
        while !rest.is_zero() {
            let d = rest.div_rem_small(base as u64) as u32;
            digits.push(super::digit_char(d));
        }
        digits.iter().rev().collect()
    }
}

impl PartialOrd for BigUint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BigUint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.limbs
            .len()
            .cmp(&other.limbs.len())
            .then_with(|| self.limbs.iter().rev().cmp(other.limbs.iter().rev()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifts_cross_limb_boundaries() {
        let mut n = BigUint::from_u64(3);
        n.shl(130);
        assert_eq!(n.bit_len(), 132);
        n.shr(129);
        assert_eq!(n, BigUint::from_u64(6));
    }

    #[test]
    fn pow_and_radix_string() {
        let n = BigUint::pow(10, 25);
        assert_eq!(n.to_radix_string(10), "10000000000000000000000000");
        assert_eq!(BigUint::from_u64(255).to_radix_string(16), "ff");
        assert_eq!(BigUint::zero().to_radix_string(2), "0");
    }

    #[test]
    fn subtraction_borrows() {
        let mut a = BigUint::pow(2, 64);
        a.sub_assign(&BigUint::from_u64(1));
        assert_eq!(a, BigUint::from_u64(u64::MAX));
    }

    #[test]
    fn quotient_and_remainder() {
        let mut a = BigUint::from_u64(100);
        let q = a.quo_rem(&BigUint::from_u64(30));
        assert_eq!(q, 3);
        assert_eq!(a, BigUint::from_u64(10));
    }

    #[test]
    fn ordering_ignores_leading_zero_limbs() {
        let mut a = BigUint::pow(2, 70);
        a.shr(70);
        assert_eq!(a.cmp(&BigUint::from_u64(1)), Ordering::Equal);
        assert!(BigUint::pow(2, 64) > BigUint::from_u64(u64::MAX));
    }

    #[test]
    fn converts_to_nearest_double() {
        assert_eq!(BigUint::pow(2, 80).to_f64(), 2f64.powi(80));
        // 2^53 + 1 is a tie and rounds to the even neighbour.
        let mut n = BigUint::pow(2, 53);
        n.add_small(1);
        n.shl(20);
        assert_eq!(n.to_f64(), 2f64.powi(73));
        let mut n = BigUint::pow(2, 53);
        n.add_small(3);
        n.shl(20);
        assert_eq!(n.to_f64(), (2f64.powi(53) + 4.0) * 2f64.powi(20));
    }
}
