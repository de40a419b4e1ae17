//! SMI management libraries: device enumeration and performance levels.
//!
//! Two interchangeable backends cover the installed-stack spread: AMD SMI
//! (preferred) and ROCm SMI (fallback). Both expose a process-wide
//! library lifecycle whose init and shutdown calls must be paired exactly
//! once, so a single live [`Telemetry`] instance owns that lifecycle and a
//! second concurrent instance is refused outright.

pub mod amdsmi;
pub mod rsmi;

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::pci::PciAddress;

/// Vendor-defined clock/power operating point.
///
/// Shared code space across both backends. `StablePeak` is the
/// deterministic non-boosting high-clock mode the governor pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PerfLevel {
    Auto = 0,
    Low = 1,
    High = 2,
    Manual = 3,
    StableStd = 4,
    StablePeak = 5,
    StableMinMclk = 6,
    StableMinSclk = 7,
    Determinism = 8,
    Unknown = 0x100,
}

impl PerfLevel {
    pub fn from_raw(raw: u32) -> PerfLevel {
        match raw {
            0 => Self::Auto,
            1 => Self::Low,
            2 => Self::High,
            3 => Self::Manual,
            4 => Self::StableStd,
            5 => Self::StablePeak,
            6 => Self::StableMinMclk,
            7 => Self::StableMinSclk,
            8 => Self::Determinism,
            _ => Self::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Low => "low",
            Self::High => "high",
            Self::Manual => "manual",
            Self::StableStd => "stable_std",
            Self::StablePeak => "stable_peak",
            Self::StableMinMclk => "stable_min_mclk",
            Self::StableMinSclk => "stable_min_sclk",
            Self::Determinism => "determinism",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PerfLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An ordered enumeration of management-API devices that can be probed for
/// bus-address equality. Seam for the identity resolver.
pub trait DeviceEnumeration {
    fn device_count(&self) -> Result<usize>;

    /// Whether the device at `index` sits at `target`.
    fn address_matches(&self, index: usize, target: PciAddress) -> Result<bool>;
}

/// Get/set access to one device's performance level. Seam for the
/// governor.
pub trait PerfControl {
    fn perf_level(&self) -> Result<PerfLevel>;
    fn set_perf_level(&mut self, level: PerfLevel) -> Result<()>;
}

enum Backend {
    AmdSmi(amdsmi::AmdSmi),
    Rsmi(rsmi::Rsmi),
}

/// One live Telemetry instance owns the process-wide library lifecycle.
static TELEMETRY_LIVE: AtomicBool = AtomicBool::new(false);

/// Owning handle to the management library.
///
/// Initializes the backend on construction, shuts it down on drop.
pub struct Telemetry {
    backend: Backend,
}

impl Telemetry {
    /// Initializes the first available backend, AMD SMI before ROCm SMI.
    ///
    /// Fails if another `Telemetry` is live in this process: the vendor
    /// libraries keep process-wide state and their init/shutdown pairs do
    /// not nest.
    pub fn init() -> Result<Telemetry> {
        if TELEMETRY_LIVE.swap(true, Ordering::SeqCst) {
            return Err(Error::Telemetry {
                backend: "smi",
                code: -1,
                msg: "another Telemetry instance is live in this process".to_string(),
            });
        }

        let backend = match amdsmi::AmdSmi::init() {
            Ok(backend) => Backend::AmdSmi(backend),
            Err(amdsmi_err) => {
                log::debug!("AMD SMI unavailable ({amdsmi_err}), trying ROCm SMI");
                match rsmi::Rsmi::init() {
                    Ok(backend) => Backend::Rsmi(backend),
                    Err(rsmi_err) => {
                        TELEMETRY_LIVE.store(false, Ordering::SeqCst);
                        return Err(rsmi_err);
                    }
                }
            }
        };

        log::debug!("telemetry backend: {}", backend_name(&backend));
        Ok(Telemetry { backend })
    }

    pub fn backend_name(&self) -> &'static str {
        backend_name(&self.backend)
    }

    /// Consumes this instance into a perf-level control for one resolved
    /// device. The library stays initialized until the control is dropped.
    pub fn into_control(self, index: usize) -> TelemetryControl {
        TelemetryControl {
            telemetry: self,
            index,
        }
    }
}

fn backend_name(backend: &Backend) -> &'static str {
    match backend {
        Backend::AmdSmi(_) => amdsmi::BACKEND_NAME,
        Backend::Rsmi(_) => rsmi::BACKEND_NAME,
    }
}

impl DeviceEnumeration for Telemetry {
    fn device_count(&self) -> Result<usize> {
        Ok(match &self.backend {
            Backend::AmdSmi(b) => b.device_count(),
            Backend::Rsmi(b) => b.device_count(),
        })
    }

    fn address_matches(&self, index: usize, target: PciAddress) -> Result<bool> {
        match &self.backend {
            // AMD SMI reports a structured BDF.
            Backend::AmdSmi(b) => Ok(b.bus_address(index)? == target),
            // ROCm SMI reports the packed integer form.
            Backend::Rsmi(b) => Ok(b.pci_id(index)? == target.packed()),
        }
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        let result = match &self.backend {
            Backend::AmdSmi(b) => b.shutdown(),
            Backend::Rsmi(b) => b.shutdown(),
        };
        if let Err(e) = result {
            log::warn!("telemetry shutdown failed: {e}");
        }
        TELEMETRY_LIVE.store(false, Ordering::SeqCst);
    }
}

/// Perf-level access to one resolved device, keeping the management
/// library alive for as long as the control exists.
pub struct TelemetryControl {
    telemetry: Telemetry,
    index: usize,
}

impl TelemetryControl {
    pub fn backend_name(&self) -> &'static str {
        self.telemetry.backend_name()
    }

    /// Index of the resolved device within the backend's enumeration.
    pub fn device_index(&self) -> usize {
        self.index
    }
}

impl PerfControl for TelemetryControl {
    fn perf_level(&self) -> Result<PerfLevel> {
        match &self.telemetry.backend {
            Backend::AmdSmi(b) => b.perf_level(self.index),
            Backend::Rsmi(b) => b.perf_level(self.index),
        }
    }

    fn set_perf_level(&mut self, level: PerfLevel) -> Result<()> {
        match &self.telemetry.backend {
            Backend::AmdSmi(b) => b.set_perf_level(self.index, level),
            Backend::Rsmi(b) => b.set_perf_level(self.index, level),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perf_level_round_trips_raw_codes() {
        for raw in 0..=8 {
            let level = PerfLevel::from_raw(raw);
            assert_eq!(level as u32, raw);
        }
        assert_eq!(PerfLevel::from_raw(0x100), PerfLevel::Unknown);
        assert_eq!(PerfLevel::from_raw(99), PerfLevel::Unknown);
    }

    #[test]
    fn perf_level_names() {
        assert_eq!(PerfLevel::StablePeak.to_string(), "stable_peak");
        assert_eq!(PerfLevel::Auto.to_string(), "auto");
    }
}
