//! Fixed-point domain
//!
//! Every value the driver stores or returns is an unsigned 32-bit integer
//! holding `real * 2^14`. That gives a range of 0.000 to just over 262143.999.

use core::fmt;

/// Fractional bits of every stored/returned value
pub const FX_SCALE: u32 = 14;

/// Extra coefficient scaling used by the EMA update
pub const FX_SHIFT: u32 = FX_SCALE + 10;

/// 1.0 in the fixed-point domain
pub const FX_ONE: u32 = 1 << FX_SCALE;

/// Largest integer count representable without saturation (exclusive)
pub const MAX_COUNT: u32 = 1 << (u32::BITS - FX_SCALE);

/// Unsigned fixed-point value, scale 14
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Fixed32(u32);

impl Fixed32 {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(u32::MAX);

    /// Raw bits as published on the device.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn to_bits(self) -> u32 {
        self.0
    }

    /// Scale an integer count into the fixed-point domain.
    ///
    /// Counts of `2^18` or more saturate to [`Fixed32::MAX`].
    pub const fn from_count(count: u32) -> Self {
        if count >= MAX_COUNT {
            Self::MAX
        } else {
            Self(count << FX_SCALE)
        }
    }

    /// Integer part
    pub const fn whole(self) -> u32 {
        self.0 >> FX_SCALE
    }

    /// Fractional part, in units of `2^-14`
    pub const fn frac_bits(self) -> u32 {
        self.0 & (FX_ONE - 1)
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn to_ne_bytes(self) -> [u8; 4] {
        self.0.to_ne_bytes()
    }
}

impl From<u32> for Fixed32 {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl From<Fixed32> for u32 {
    fn from(value: Fixed32) -> Self {
        value.0
    }
}

impl fmt::Display for Fixed32 {
    /// Three decimals, truncated: `1.500`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = (u64::from(self.frac_bits()) * 1000) >> FX_SCALE;
        write!(f, "{}.{:03}", self.whole(), millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn test_scale_constants() {
        assert_eq!(FX_SCALE, 14);
        assert_eq!(FX_SHIFT, 24);
        assert_eq!(FX_ONE, 16384);
        assert_eq!(MAX_COUNT, 262_144);
    }

    #[test]
    fn test_from_count_has_no_fraction() {
        let v = Fixed32::from_count(7);
        assert_eq!(v.to_bits(), 7 << 14);
        assert_eq!(v.whole(), 7);
        assert_eq!(v.frac_bits(), 0);
    }

    #[test]
    fn test_from_count_saturates() {
        assert_eq!(Fixed32::from_count(MAX_COUNT - 1).whole(), MAX_COUNT - 1);
        assert_eq!(Fixed32::from_count(MAX_COUNT), Fixed32::MAX);
        assert_eq!(Fixed32::from_count(u32::MAX), Fixed32::MAX);
    }

    #[test]
    fn test_display() {
        assert_eq!(Fixed32::from_bits(FX_ONE + FX_ONE / 2).to_string(), "1.500");
        assert_eq!(Fixed32::ZERO.to_string(), "0.000");
        assert_eq!(Fixed32::MAX.to_string(), "262143.999");
    }
}
