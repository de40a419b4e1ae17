//! Performance-level governor.
//!
//! Pins the resolved device to a deterministic clock mode for the lifetime
//! of a benchmark run and restores the previous mode afterwards. Clock
//! control is best-effort: inability to read or set the level degrades
//! measurement variance, not correctness, so those failures are logged and
//! execution continues. Everything before that point (loading the
//! management library, resolving the device) is fatal.

use crate::error::Result;
use crate::hip::Device;
use crate::identity;
use crate::telemetry::{PerfControl, PerfLevel, Telemetry, TelemetryControl};

/// The level the governor pins: deterministic, non-boosting high clocks.
/// "Determinism" mode doesn't always work, so use stable peak instead.
pub const PINNED_LEVEL: PerfLevel = PerfLevel::StablePeak;

/// Pins a device's performance level on construction and restores the
/// original level on drop.
///
/// Only one governor may operate per physical device at a time; the
/// telemetry lifecycle guard enforces this within a process. Concurrent
/// governors in separate processes race on save/restore.
pub struct Governor<C: PerfControl> {
    control: C,
    /// Level read before pinning; `None` when the read failed, which turns
    /// the restore on drop into a no-op.
    original: Option<PerfLevel>,
}

impl Governor<TelemetryControl> {
    /// Resolves `device` in the management API and pins its clocks.
    ///
    /// Takes ownership of the telemetry session; it is released when the
    /// governor drops.
    pub fn pin(telemetry: Telemetry, device: &Device) -> Result<Self> {
        let index = identity::resolve(
            &telemetry,
            device.ordinal(),
            device.properties().pci_address,
        )?;
        log::debug!(
            "device {} resolved to {} index {index}",
            device.ordinal(),
            telemetry.backend_name(),
        );
        Ok(Self::with_control(telemetry.into_control(index)))
    }
}

impl<C: PerfControl> Governor<C> {
    /// Pins through an already-resolved control.
    pub fn with_control(mut control: C) -> Self {
        let original = match control.perf_level() {
            Ok(level) => Some(level),
            Err(e) => {
                log::warn!("failed to query current perf level: {e}");
                None
            }
        };

        if original == Some(PINNED_LEVEL) {
            log::debug!("perf level already {PINNED_LEVEL}, not setting");
        } else if let Err(e) = control.set_perf_level(PINNED_LEVEL) {
            log::warn!("could not set perf level to {PINNED_LEVEL}: {e}");
        }

        Governor { control, original }
    }

    /// The level in effect before pinning, if it could be read.
    pub fn original_level(&self) -> Option<PerfLevel> {
        self.original
    }
}

impl<C: PerfControl> Drop for Governor<C> {
    fn drop(&mut self) {
        let Some(original) = self.original else {
            return;
        };
        match self.control.perf_level() {
            Ok(current) if current != original => {
                if let Err(e) = self.control.set_perf_level(original) {
                    log::warn!("failed to restore perf level to {original}: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => log::warn!("failed to re-query perf level before restore: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Calls {
        gets: usize,
        sets: Vec<PerfLevel>,
    }

    /// Scripted perf control: serves `levels` in order on reads (repeating
    /// the last), optionally failing reads or writes.
    struct FakeControl {
        levels: Vec<PerfLevel>,
        fail_get: bool,
        fail_set: bool,
        calls: Rc<RefCell<Calls>>,
    }

    impl FakeControl {
        fn new(levels: Vec<PerfLevel>) -> (Self, Rc<RefCell<Calls>>) {
            let calls = Rc::new(RefCell::new(Calls::default()));
            (
                Self {
                    levels,
                    fail_get: false,
                    fail_set: false,
                    calls: calls.clone(),
                },
                calls,
            )
        }

        fn error() -> Error {
            Error::Telemetry {
                backend: "test",
                code: 1,
                msg: "scripted failure".to_string(),
            }
        }
    }

    impl PerfControl for FakeControl {
        fn perf_level(&self) -> Result<PerfLevel> {
            let mut calls = self.calls.borrow_mut();
            calls.gets += 1;
            if self.fail_get {
                return Err(Self::error());
            }
            let index = (calls.gets - 1).min(self.levels.len() - 1);
            Ok(self.levels[index])
        }

        fn set_perf_level(&mut self, level: PerfLevel) -> Result<()> {
            self.calls.borrow_mut().sets.push(level);
            if self.fail_set {
                return Err(Self::error());
            }
            Ok(())
        }
    }

    #[test]
    fn pins_and_restores() {
        // Reads Auto, pins StablePeak; re-reads StablePeak on drop and
        // restores Auto.
        let (control, calls) = FakeControl::new(vec![PerfLevel::Auto, PerfLevel::StablePeak]);
        let governor = Governor::with_control(control);
        assert_eq!(governor.original_level(), Some(PerfLevel::Auto));
        drop(governor);

        let calls = calls.borrow();
        assert_eq!(calls.sets, vec![PerfLevel::StablePeak, PerfLevel::Auto]);
    }

    #[test]
    fn already_pinned_makes_no_set_calls() {
        let (control, calls) = FakeControl::new(vec![PerfLevel::StablePeak]);
        let governor = Governor::with_control(control);
        assert_eq!(governor.original_level(), Some(PerfLevel::StablePeak));
        drop(governor);

        // Construction saw the target level and skipped the pin; drop
        // re-read an unchanged level and skipped the restore.
        assert!(calls.borrow().sets.is_empty());
    }

    #[test]
    fn externally_restored_level_skips_the_restore() {
        // Something else put the level back to Auto mid-run.
        let (control, calls) = FakeControl::new(vec![PerfLevel::Auto, PerfLevel::Auto]);
        drop(Governor::with_control(control));

        assert_eq!(calls.borrow().sets, vec![PerfLevel::StablePeak]);
    }

    #[test]
    fn unreadable_level_still_pins_but_never_restores() {
        let (mut control, calls) = FakeControl::new(vec![PerfLevel::Auto]);
        control.fail_get = true;
        let governor = Governor::with_control(control);
        assert_eq!(governor.original_level(), None);
        drop(governor);

        let calls = calls.borrow();
        // One failed read at construction, none at drop.
        assert_eq!(calls.gets, 1);
        assert_eq!(calls.sets, vec![PerfLevel::StablePeak]);
    }

    #[test]
    fn set_failure_is_not_fatal() {
        let (mut control, calls) = FakeControl::new(vec![PerfLevel::Auto, PerfLevel::Auto]);
        control.fail_set = true;
        let governor = Governor::with_control(control);
        assert_eq!(governor.original_level(), Some(PerfLevel::Auto));
        drop(governor);

        // The pin attempt failed and was logged; drop re-read Auto ==
        // original, so no restore was attempted.
        assert_eq!(calls.borrow().sets, vec![PerfLevel::StablePeak]);
    }
}
