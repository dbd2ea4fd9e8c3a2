//! # Pilote LAX
//!
//! Objet pilote, registre des unités et cycle de vie de la tâche périodique.
//!
//! Lock order: unit registry, then a unit's store lock, then the timer queue.
//! The periodic task only ever takes the store lock; the timer queue runs it
//! with its own lock released.

use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use crate::config::LaxConfig;
use crate::error::{LaxError, LaxResult};
use crate::io::{self, ControlRequest, Credentials, IoBuffer};
use crate::snapshot::{DevChar, DevChar2, DeviceClass, SnapshotProvider};
use crate::stats::StatsSnapshot;
use crate::store::{Averages, ControlEffect, ControlState};
use crate::timer::{TimerAction, TimerId, TimerQueue};
use crate::unit::{LaxUnit, TaskPhase, TickOutcome, UnitHandle};

/// Static driver description, as loaded into the driver tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverInfo {
    pub name: &'static str,
    pub device_prefix: &'static str,
    pub class: DeviceClass,
    pub characteristics: DevChar,
    pub characteristics2: DevChar2,
    pub default_buffer_size: usize,
    pub default_units: usize,
    pub max_units: usize,
}

pub const DRIVER_INFO: DriverInfo = DriverInfo {
    name: "LAXDRIVER",
    device_prefix: "LAX",
    class: DeviceClass::Misc,
    characteristics: DevChar::REC
        .union(DevChar::AVL)
        .union(DevChar::IDV)
        .union(DevChar::SHR),
    characteristics2: DevChar2::NNM,
    default_buffer_size: Averages::BYTES,
    default_units: 1,
    max_units: 1,
};

struct Slot {
    generation: u32,
    unit: Option<Arc<LaxUnit>>,
}

/// Load average driver
pub struct LaxDriver {
    config: LaxConfig,
    provider: Arc<dyn SnapshotProvider>,
    timers: Arc<TimerQueue>,
    slots: Mutex<Vec<Slot>>,
}

impl LaxDriver {
    pub fn new(
        config: LaxConfig,
        provider: Arc<dyn SnapshotProvider>,
        timers: Arc<TimerQueue>,
    ) -> LaxResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            provider,
            timers,
            slots: Mutex::new(Vec::new()),
        })
    }

    pub fn info(&self) -> &'static DriverInfo {
        &DRIVER_INFO
    }

    pub fn config(&self) -> &LaxConfig {
        &self.config
    }

    pub fn timers(&self) -> &Arc<TimerQueue> {
        &self.timers
    }

    // ═══════════════════════════════════════════════════════════════
    // Unit lifecycle
    // ═══════════════════════════════════════════════════════════════

    /// Bring up a unit: zeroed averages, sampling running, first tick one
    /// interval from now.
    pub fn create_unit(&self) -> LaxResult<UnitHandle> {
        let mut slots = self.slots.lock();
        let index = match slots.iter().position(|s| s.unit.is_none()) {
            Some(index) => index,
            None if slots.len() < self.config.max_units => {
                slots.push(Slot {
                    generation: 0,
                    unit: None,
                });
                slots.len() - 1
            }
            None => {
                return Err(LaxError::UnitLimit {
                    max: self.config.max_units,
                })
            }
        };

        let slot = &mut slots[index];
        let handle = UnitHandle::with_generation(index as u32, slot.generation);
        let unit = Arc::new(LaxUnit::new(handle));
        {
            let mut state = unit.lock_state();
            state.task = Some(self.arm(&unit));
        }
        slot.unit = Some(unit);

        log::info!(
            "{}{}: load average sampling active",
            self.config.device_prefix,
            handle.index()
        );
        Ok(handle)
    }

    /// Cancel the unit's periodic task and free its slot.
    pub fn remove_unit(&self, handle: UnitHandle) -> LaxResult<()> {
        let unit = {
            let mut slots = self.slots.lock();
            let slot = slots
                .get_mut(handle.index() as usize)
                .filter(|s| s.generation == handle.generation() && s.unit.is_some())
                .ok_or(LaxError::NoSuchUnit(handle))?;
            slot.generation = slot.generation.wrapping_add(1);
            slot.unit.take().ok_or(LaxError::NoSuchUnit(handle))?
        };

        let mut state = unit.lock_state();
        if let Some(id) = unit.retire(&mut state) {
            self.timers.cancel_timer(id);
        }
        drop(state);

        log::info!("{}{}: removed", self.config.device_prefix, handle.index());
        Ok(())
    }

    /// Live units, in slot order
    pub fn units(&self) -> Vec<UnitHandle> {
        self.slots
            .lock()
            .iter()
            .filter_map(|s| s.unit.as_ref().map(|u| u.handle()))
            .collect()
    }

    fn unit(&self, handle: UnitHandle) -> LaxResult<Arc<LaxUnit>> {
        self.slots
            .lock()
            .get(handle.index() as usize)
            .and_then(|s| s.unit.as_ref())
            .filter(|u| u.handle() == handle)
            .cloned()
            .ok_or(LaxError::NoSuchUnit(handle))
    }

    /// Arm the periodic task of `unit`. The caller holds its store lock and
    /// records the returned id.
    fn arm(&self, unit: &Arc<LaxUnit>) -> TimerId {
        let task_unit = Arc::clone(unit);
        let provider = Arc::clone(&self.provider);
        let interval = self.config.tick_interval_ns;

        unit.stats().record_arm();
        self.timers
            .set_timer_once(interval, move || match task_unit.run_tick(&*provider) {
                TickOutcome::Updated => TimerAction::Rearm(interval),
                TickOutcome::Halted => TimerAction::Finish,
            })
    }

    // ═══════════════════════════════════════════════════════════════
    // I/O
    // ═══════════════════════════════════════════════════════════════

    /// Copy up to 36 bytes of averages into the caller's buffer.
    pub fn read<B: IoBuffer + ?Sized>(&self, handle: UnitHandle, buf: &mut B) -> LaxResult<usize> {
        let unit = self.unit(handle)?;
        let dst = io::prepare_read(buf).map_err(|err| {
            unit.stats().record_rejected();
            err
        })?;
        let len = unit.read_into(dst);
        unit.stats().record_read();
        Ok(len)
    }

    /// Stop (first byte nonzero) or resume (zero) sampling. Requires CMKRNL.
    pub fn write<B: IoBuffer + ?Sized>(
        &self,
        handle: UnitHandle,
        caller: &Credentials,
        buf: &B,
    ) -> LaxResult<ControlEffect> {
        let unit = self.unit(handle)?;
        let request = io::prepare_write(caller, buf).map_err(|err| {
            unit.stats().record_rejected();
            err
        })?;

        let effect = {
            let mut state = unit.lock_state();
            if unit.is_retired() {
                return Err(LaxError::NoSuchUnit(handle));
            }
            match request {
                ControlRequest::Stop => state.control.request_stop(),
                ControlRequest::Resume => {
                    let effect = state.control.request_resume();
                    if effect.needs_rearm() {
                        state.task = Some(self.arm(&unit));
                    }
                    effect
                }
            }
        };
        unit.stats().record_write();

        let name = self.config.device_prefix;
        match effect {
            ControlEffect::StopRequested => {
                log::info!("{}{}: stop requested", name, handle.index())
            }
            ControlEffect::Resumed => log::info!("{}{}: sampling resumed", name, handle.index()),
            other => log::debug!("{}{}: control write ignored ({:?})", name, handle.index(), other),
        }
        Ok(effect)
    }

    // ═══════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════

    pub fn averages(&self, handle: UnitHandle) -> LaxResult<Averages> {
        Ok(self.unit(handle)?.averages())
    }

    pub fn control_state(&self, handle: UnitHandle) -> LaxResult<ControlState> {
        Ok(self.unit(handle)?.control_state())
    }

    pub fn task_phase(&self, handle: UnitHandle) -> LaxResult<TaskPhase> {
        Ok(self.unit(handle)?.task_phase(&self.timers))
    }

    pub fn stats(&self, handle: UnitHandle) -> LaxResult<StatsSnapshot> {
        Ok(self.unit(handle)?.stats().snapshot())
    }

    /// Device name without the colon, e.g. `LAX0`
    pub fn device_name(&self, handle: UnitHandle) -> LaxResult<String> {
        let unit = self.unit(handle)?;
        Ok(format!("{}{}", self.config.device_prefix, unit.handle().index()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Privileges;
    use crate::sim::SimulatedSystem;

    const SECOND: u64 = 1_000_000_000;

    fn driver(config: LaxConfig) -> (LaxDriver, Arc<SimulatedSystem>, Arc<TimerQueue>) {
        let sim = Arc::new(SimulatedSystem::new());
        let timers = Arc::new(TimerQueue::new());
        let drv = LaxDriver::new(config, sim.clone(), timers.clone()).unwrap();
        (drv, sim, timers)
    }

    #[test]
    fn test_driver_info() {
        assert_eq!(DRIVER_INFO.name, "LAXDRIVER");
        assert_eq!(DRIVER_INFO.default_buffer_size, 36);
        assert!(DRIVER_INFO.characteristics.contains(DevChar::REC | DevChar::SHR));
        assert!(!DRIVER_INFO.characteristics.contains(DevChar::MNT));
        assert_eq!(DRIVER_INFO.class, DeviceClass::Misc);
    }

    #[test]
    fn test_accessors() {
        let config = LaxConfig::new().with_tick_interval_ns(5);
        let (drv, _sim, timers) = driver(config);
        assert_eq!(drv.info(), &DRIVER_INFO);
        assert_eq!(drv.config(), &config);
        assert!(Arc::ptr_eq(drv.timers(), &timers));

        drv.create_unit().unwrap();
        assert_eq!(drv.timers().pending(), 1);
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let sim = Arc::new(SimulatedSystem::new());
        let timers = Arc::new(TimerQueue::new());
        let result = LaxDriver::new(LaxConfig::new().with_max_units(0), sim, timers);
        assert!(matches!(result, Err(LaxError::InvalidConfig(_))));
    }

    #[test]
    fn test_create_arms_first_tick() {
        let (drv, _sim, timers) = driver(LaxConfig::default());
        let unit = drv.create_unit().unwrap();
        assert_eq!(drv.device_name(unit).unwrap(), "LAX0");
        assert_eq!(drv.task_phase(unit).unwrap(), TaskPhase::Armed);
        assert_eq!(drv.control_state(unit).unwrap(), ControlState::Running);
        assert!(drv.averages(unit).unwrap().is_zero());
        assert_eq!(drv.stats(unit).unwrap().arms, 1);

        assert_eq!(timers.tick(SECOND - 1), 0);
        assert_eq!(timers.tick(SECOND), 1);
        assert_eq!(drv.stats(unit).unwrap().ticks, 1);
    }

    #[test]
    fn test_unit_limit_and_slot_reuse() {
        let (drv, _sim, timers) = driver(LaxConfig::default());
        let first = drv.create_unit().unwrap();
        assert_eq!(drv.create_unit(), Err(LaxError::UnitLimit { max: 1 }));

        drv.remove_unit(first).unwrap();
        assert_eq!(timers.pending(), 0);
        assert_eq!(drv.averages(first), Err(LaxError::NoSuchUnit(first)));
        assert_eq!(drv.remove_unit(first), Err(LaxError::NoSuchUnit(first)));

        let second = drv.create_unit().unwrap();
        assert_eq!(second.index(), first.index());
        assert_ne!(second, first);
        assert_eq!(drv.units(), [second]);
        assert!(drv.read(first, &mut [0u8; 36][..]).is_err());
    }

    #[test]
    fn test_stop_then_resume_rearms() {
        let (drv, _sim, timers) = driver(LaxConfig::default());
        let unit = drv.create_unit().unwrap();
        let kernel = Credentials::new(Privileges::CMKRNL);

        assert_eq!(
            drv.write(unit, &kernel, &[1u8][..]),
            Ok(ControlEffect::StopRequested)
        );
        timers.tick(SECOND);
        assert_eq!(drv.control_state(unit).unwrap(), ControlState::Stopped);
        assert_eq!(drv.task_phase(unit).unwrap(), TaskPhase::Dormant);

        assert_eq!(drv.write(unit, &kernel, &[0u8][..]), Ok(ControlEffect::Resumed));
        assert_eq!(drv.task_phase(unit).unwrap(), TaskPhase::Armed);
        assert_eq!(drv.stats(unit).unwrap().arms, 2);
        assert_eq!(timers.tick(2 * SECOND), 1);
    }

    #[test]
    fn test_rejected_requests_are_counted() {
        let (drv, _sim, _timers) = driver(LaxConfig::default());
        let unit = drv.create_unit().unwrap();
        assert!(drv.read(unit, &mut [0u8; 2][..]).is_err());
        assert!(drv.write(unit, &Credentials::unprivileged(), &[1u8][..]).is_err());
        let stats = drv.stats(unit).unwrap();
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.reads, 0);
        assert_eq!(stats.writes, 0);
    }

    #[test]
    fn test_custom_prefix_and_interval() {
        let config = LaxConfig::new()
            .with_device_prefix("LAB")
            .with_tick_interval_ns(10)
            .with_max_units(2);
        let (drv, _sim, timers) = driver(config);
        let a = drv.create_unit().unwrap();
        let b = drv.create_unit().unwrap();
        assert_eq!(drv.device_name(b).unwrap(), "LAB1");
        assert_eq!(timers.tick(10), 2);
        assert_eq!(timers.tick(20), 2);
        assert_eq!(drv.stats(a).unwrap().ticks, 2);
    }
}
