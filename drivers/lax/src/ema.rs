//! EMA (Exponential Moving Average) engine
//!
//! Each horizon `T` blends the previous average with the new sample:
//!
//! ```text
//! new = (old * old_weight + sample * new_weight) >> FX_SHIFT
//! old_weight ≈ 2^FX_SHIFT / e^(1/T)
//! new_weight ≈ 2^FX_SHIFT - old_weight
//! ```
//!
//! The weights are the published driver constants and must stay bit-exact;
//! the final shift truncates.

use crate::fixed::{Fixed32, FX_SHIFT};

/// Old/new weight pair for one decay horizon, scaled by `2^FX_SHIFT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecayCoefficients {
    pub old_weight: u32,
    pub new_weight: u32,
}

/// 1/exp(1s/60s) * 2^24
pub const DECAY_1MIN: DecayCoefficients = DecayCoefficients {
    old_weight: 16_499_913,
    new_weight: 277_303,
};

/// 1/exp(1s/300s) * 2^24
pub const DECAY_5MIN: DecayCoefficients = DecayCoefficients {
    old_weight: 16_721_385,
    new_weight: 55_831,
};

/// 1/exp(1s/900s) * 2^24
pub const DECAY_15MIN: DecayCoefficients = DecayCoefficients {
    old_weight: 16_758_585,
    new_weight: 18_631,
};

/// Decay horizon of an average
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Horizon {
    OneMinute = 0,
    FiveMinutes = 1,
    FifteenMinutes = 2,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [
        Horizon::OneMinute,
        Horizon::FiveMinutes,
        Horizon::FifteenMinutes,
    ];

    /// Time constant in seconds (one tick per second)
    pub const fn seconds(self) -> u32 {
        match self {
            Horizon::OneMinute => 60,
            Horizon::FiveMinutes => 300,
            Horizon::FifteenMinutes => 900,
        }
    }

    pub const fn coefficients(self) -> DecayCoefficients {
        match self {
            Horizon::OneMinute => DECAY_1MIN,
            Horizon::FiveMinutes => DECAY_5MIN,
            Horizon::FifteenMinutes => DECAY_15MIN,
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Fold one sample into an average.
#[inline]
pub const fn update(old: Fixed32, sample: Fixed32, coeffs: DecayCoefficients) -> Fixed32 {
    // u32 * ~2^24 needs 56 bits; the sum stays below 2^57.
    let blended = old.to_bits() as u64 * coeffs.old_weight as u64
        + sample.to_bits() as u64 * coeffs.new_weight as u64;
    Fixed32::from_bits((blended >> FX_SHIFT) as u32)
}
