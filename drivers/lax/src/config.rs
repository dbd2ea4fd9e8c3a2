//! Driver configuration

use crate::error::{LaxError, LaxResult};

/// Hard ceiling on units per driver
pub const MAX_UNITS: usize = 64;

/// One tick per second; the decay weights assume it
pub const DEFAULT_TICK_INTERVAL_NS: u64 = 1_000_000_000;

/// LAX driver configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaxConfig {
    /// Delay between periodic ticks
    pub tick_interval_ns: u64,
    /// Units the driver will create
    pub max_units: usize,
    /// Device name prefix (`LAX` gives `LAX0`)
    pub device_prefix: &'static str,
}

impl LaxConfig {
    pub const fn new() -> Self {
        Self {
            tick_interval_ns: DEFAULT_TICK_INTERVAL_NS,
            max_units: 1,
            device_prefix: "LAX",
        }
    }

    pub fn with_tick_interval_ns(mut self, tick_interval_ns: u64) -> Self {
        self.tick_interval_ns = tick_interval_ns;
        self
    }

    pub fn with_max_units(mut self, max_units: usize) -> Self {
        self.max_units = max_units;
        self
    }

    pub fn with_device_prefix(mut self, device_prefix: &'static str) -> Self {
        self.device_prefix = device_prefix;
        self
    }

    pub fn validate(&self) -> LaxResult<()> {
        if self.tick_interval_ns == 0 {
            return Err(LaxError::InvalidConfig("tick interval must be nonzero"));
        }
        if self.max_units == 0 || self.max_units > MAX_UNITS {
            return Err(LaxError::InvalidConfig("max_units out of range"));
        }
        if self.device_prefix.is_empty()
            || !self.device_prefix.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(LaxError::InvalidConfig("device prefix must be ASCII alphanumeric"));
        }
        Ok(())
    }
}

impl Default for LaxConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LaxConfig::default();
        assert_eq!(config.tick_interval_ns, 1_000_000_000);
        assert_eq!(config.max_units, 1);
        assert_eq!(config.device_prefix, "LAX");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = LaxConfig::new()
            .with_tick_interval_ns(10)
            .with_max_units(MAX_UNITS)
            .with_device_prefix("LAB");
        assert_eq!(config.tick_interval_ns, 10);
        assert_eq!(config.max_units, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let base = LaxConfig::new();
        assert!(base.with_tick_interval_ns(0).validate().is_err());
        assert!(base.with_max_units(0).validate().is_err());
        assert!(base.with_max_units(MAX_UNITS + 1).validate().is_err());
        assert!(base.with_device_prefix("").validate().is_err());
        assert!(matches!(
            base.with_device_prefix("LA:").validate(),
            Err(LaxError::InvalidConfig(_))
        ));
    }
}
