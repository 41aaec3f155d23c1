//! Fixed-point numeric substrate: Q16.16 (`Q16`) and Q48.16 (`Q48`).
//!
//! All simulation math runs through these two types. Multiply rounds to
//! nearest, ties up (`+1<<15` before the shift); divide truncates. Add and
//! sub saturate at the representable range instead of wrapping, since a
//! silently-wrapped store amount would violate the `amount in
//! [0, capacity]` invariant every resolver depends on.

use std::fmt;

/// Signed Q16.16: 16 integer/sign bits, 16 fractional bits, backed by `i32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Q16(pub i32);

/// Signed Q48.16: 48 integer/sign bits, 16 fractional bits, backed by `i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Q48(pub i64);

/// Sentinel used across every subsystem's sample structs for "unknown".
pub const Q16_UNKNOWN: Q16 = Q16(i32::MIN);

pub const Q16_ONE: Q16 = Q16(0x0001_0000);
pub const Q48_ONE: Q48 = Q48(0x0001_0000);

const FRAC_BITS: u32 = 16;

impl Q16 {
    pub const ZERO: Q16 = Q16(0);
    pub const ONE: Q16 = Q16_ONE;

    pub fn from_int(n: i32) -> Self {
        Q16(n.saturating_mul(1 << FRAC_BITS))
    }

    pub fn to_int(self) -> i32 {
        self.0 >> FRAC_BITS
    }

    pub fn from_raw(raw: i32) -> Self {
        Q16(raw)
    }

    pub fn raw(self) -> i32 {
        self.0
    }

    pub fn is_unknown(self) -> bool {
        self.0 == Q16_UNKNOWN.0
    }

    pub fn add(self, other: Q16) -> Q16 {
        Q16(self.0.saturating_add(other.0))
    }

    pub fn sub(self, other: Q16) -> Q16 {
        Q16(self.0.saturating_sub(other.0))
    }

    /// Round-to-nearest-ties-up multiply via a 64-bit intermediate product.
    pub fn mul(self, other: Q16) -> Q16 {
        let product = (self.0 as i64) * (other.0 as i64);
        let rounded = product + (1i64 << (FRAC_BITS - 1));
        Q16((rounded >> FRAC_BITS) as i32)
    }

    /// Truncating divide: numerator shifted left before the division.
    pub fn div(self, other: Q16) -> Q16 {
        if other.0 == 0 {
            return Q16::ZERO;
        }
        let numerator = (self.0 as i64) << FRAC_BITS;
        Q16((numerator / other.0 as i64) as i32)
    }

    pub fn clamp(self, lo: Q16, hi: Q16) -> Q16 {
        Q16(self.0.clamp(lo.0, hi.0))
    }

    pub fn min(self, other: Q16) -> Q16 {
        Q16(self.0.min(other.0))
    }

    pub fn max(self, other: Q16) -> Q16 {
        Q16(self.0.max(other.0))
    }

    /// Clamp into `[0, 1]`, used wherever a ratio-shaped value is needed
    /// (efficiency, failure_chance, leakage_rate, contamination,
    /// release_ratio).
    pub fn clamp_ratio(self) -> Q16 {
        self.clamp(Q16::ZERO, Q16::ONE)
    }

    /// Authoring/fixture ingest only. MUST NOT appear on the simulation path.
    pub fn from_f64(v: f64) -> Self {
        Q16((v * (1i64 << FRAC_BITS) as f64).round() as i32)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / (1i64 << FRAC_BITS) as f64
    }

    pub fn to_q48(self) -> Q48 {
        Q48(self.0 as i64)
    }
}

impl Q48 {
    pub const ZERO: Q48 = Q48(0);
    pub const ONE: Q48 = Q48_ONE;

    pub fn from_int(n: i64) -> Self {
        Q48(n.saturating_mul(1 << FRAC_BITS))
    }

    pub fn to_int(self) -> i64 {
        self.0 >> FRAC_BITS
    }

    pub fn from_raw(raw: i64) -> Self {
        Q48(raw)
    }

    pub fn raw(self) -> i64 {
        self.0
    }

    pub fn add(self, other: Q48) -> Q48 {
        Q48(self.0.saturating_add(other.0))
    }

    pub fn sub(self, other: Q48) -> Q48 {
        Q48(self.0.saturating_sub(other.0))
    }

    /// Round-to-nearest-ties-up multiply. Rust's native `i128` makes the
    /// 128-bit intermediate direct, with no high/low-half emulation
    /// needed.
    pub fn mul(self, other: Q48) -> Q48 {
        let product = (self.0 as i128) * (other.0 as i128);
        let rounded = product + (1i128 << (FRAC_BITS - 1));
        Q48((rounded >> FRAC_BITS) as i64)
    }

    pub fn div(self, other: Q48) -> Q48 {
        if other.0 == 0 {
            return Q48::ZERO;
        }
        let numerator = (self.0 as i128) << FRAC_BITS;
        Q48((numerator / other.0 as i128) as i64)
    }

    /// Multiply by a Q16 ratio (efficiency, leakage_rate, ...).
    pub fn mul_ratio(self, ratio: Q16) -> Q48 {
        self.mul(ratio.to_q48())
    }

    pub fn clamp(self, lo: Q48, hi: Q48) -> Q48 {
        Q48(self.0.clamp(lo.0, hi.0))
    }

    pub fn min(self, other: Q48) -> Q48 {
        Q48(self.0.min(other.0))
    }

    pub fn max(self, other: Q48) -> Q48 {
        Q48(self.0.max(other.0))
    }

    pub fn from_f64(v: f64) -> Self {
        Q48((v * (1i64 << FRAC_BITS) as f64).round() as i64)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / (1i64 << FRAC_BITS) as f64
    }

    /// Saturating narrow to Q16 (used when a Q48 store amount needs
    /// reporting as a ratio-shaped Q16 quantity).
    pub fn to_q16_saturating(self) -> Q16 {
        Q16(self.0.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
    }
}

impl fmt::Display for Q16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.to_f64())
    }
}

impl fmt::Display for Q48 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.to_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_int_to_int_roundtrips() {
        for n in [-32768, -1, 0, 1, 12345, 32767] {
            assert_eq!(Q16::from_int(n).to_int(), n);
        }
    }

    #[test]
    fn mul_rounds_half_up() {
        let half = Q16::from_raw(0x8000); // 0.5
        let three = Q16::from_int(3);
        // 3 * 0.5 = 1.5, representable exactly, no rounding needed
        assert_eq!(three.mul(half).raw(), 0x0001_8000);
    }

    #[test]
    fn div_truncates() {
        let one = Q16::from_int(1);
        let three = Q16::from_int(3);
        // 1/3 truncated in Q16.16
        let got = one.div(three);
        assert_eq!(got.raw(), 0x0000_5555);
    }

    #[test]
    fn add_sub_saturate() {
        let max = Q16(i32::MAX);
        assert_eq!(max.add(Q16::ONE).0, i32::MAX);
        let min = Q16(i32::MIN);
        assert_eq!(min.sub(Q16::ONE).0, i32::MIN);
    }

    #[test]
    fn q48_mul_matches_f64_within_rounding() {
        let a = Q48::from_int(100);
        let b = Q48::from_f64(0.5);
        assert_eq!(a.mul(b).to_int(), 50);
    }

    #[test]
    fn unknown_sentinel_is_distinguishable() {
        assert!(Q16_UNKNOWN.is_unknown());
        assert!(!Q16::ZERO.is_unknown());
    }

    #[test]
    fn clamp_ratio_bounds() {
        assert_eq!(Q16::from_int(2).clamp_ratio(), Q16::ONE);
        assert_eq!(Q16::from_int(-1).clamp_ratio(), Q16::ZERO);
    }
}
