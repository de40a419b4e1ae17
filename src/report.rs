//! Per-configuration reporting and throughput math.

use std::time::Duration;

use serde::Serialize;

use crate::hip::Device;
use crate::stats::Stats;

/// An element count with byte conversion and SI scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    count: usize,
}

impl Size {
    pub const fn new(count: usize) -> Size {
        Size { count }
    }

    pub const fn count(self) -> usize {
        self.count
    }

    /// The same count measured in bytes of `T`.
    pub const fn to_bytes<T>(self) -> Size {
        Size {
            count: self.count * std::mem::size_of::<T>(),
        }
    }

    pub fn giga(self) -> f64 {
        self.count as f64 / 1e9
    }

    pub fn tera(self) -> f64 {
        self.count as f64 / 1e12
    }
}

/// Items per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    rate: f64,
}

impl Throughput {
    pub fn new(size: Size, time: Duration) -> Throughput {
        Throughput {
            rate: size.count as f64 / time.as_secs_f64(),
        }
    }

    pub fn per_sec(self) -> f64 {
        self.rate
    }

    pub fn giga(self) -> f64 {
        self.rate / 1e9
    }

    pub fn tera(self) -> f64 {
        self.rate / 1e12
    }
}

/// Result of one benchmarked configuration.
#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub device: String,
    pub bus_address: String,
    pub workload: String,
    /// Items processed per launch.
    pub items: usize,
    /// Bytes moved per launch.
    pub bytes: usize,
    pub average_ns: f64,
    pub stddev_ns: f64,
    pub fastest_ns: f64,
    pub slowest_ns: f64,
    pub items_per_sec: f64,
    pub bytes_per_sec: f64,
}

impl BenchReport {
    pub fn new(
        device: &Device,
        workload: &str,
        items: Size,
        bytes: Size,
        stats: &Stats<Duration>,
    ) -> BenchReport {
        let props = device.properties();
        BenchReport {
            device: props.name.clone(),
            bus_address: props.pci_address.to_string(),
            workload: workload.to_string(),
            items: items.count(),
            bytes: bytes.count(),
            average_ns: stats.average.as_secs_f64() * 1e9,
            stddev_ns: stats.stddev.as_secs_f64() * 1e9,
            fastest_ns: stats.fastest.as_secs_f64() * 1e9,
            slowest_ns: stats.slowest.as_secs_f64() * 1e9,
            items_per_sec: Throughput::new(items, stats.average).per_sec(),
            bytes_per_sec: Throughput::new(bytes, stats.average).per_sec(),
        }
    }

    /// Writes the human-readable block for this configuration to stdout.
    pub fn print(&self) {
        println!("== {} ==", self.workload);
        println!("  device:     {} ({})", self.device, self.bus_address);
        println!("  buffer:     {} bytes", self.bytes);
        println!(
            "  latency:    {} ± {}  (fastest {}, slowest {})",
            format_ns(self.average_ns),
            format_ns(self.stddev_ns),
            format_ns(self.fastest_ns),
            format_ns(self.slowest_ns),
        );
        println!(
            "  throughput: {:.2} Gitems/s, {:.2} GB/s",
            self.items_per_sec / 1e9,
            self.bytes_per_sec / 1e9,
        );
    }
}

/// Serializes a run's reports for offline comparison.
pub fn to_json(reports: &[BenchReport]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(reports)
}

fn format_ns(ns: f64) -> String {
    if ns < 1e3 {
        format!("{ns:.1} ns")
    } else if ns < 1e6 {
        format!("{:.1} us", ns / 1e3)
    } else if ns < 1e9 {
        format!("{:.2} ms", ns / 1e6)
    } else {
        format!("{:.3} s", ns / 1e9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_scaling() {
        let size = Size::new(2_000_000_000);
        assert_eq!(size.giga(), 2.0);
        assert_eq!(size.tera(), 0.002);
        assert_eq!(Size::new(3).to_bytes::<f32>(), Size::new(12));
    }

    #[test]
    fn throughput_from_size_and_time() {
        let tp = Throughput::new(Size::new(1_000_000), Duration::from_millis(1));
        assert_eq!(tp.per_sec(), 1e9);
        assert_eq!(tp.giga(), 1.0);
        assert_eq!(tp.tera(), 0.001);
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_ns(512.3), "512.3 ns");
        assert_eq!(format_ns(81_234.0), "81.2 us");
        assert_eq!(format_ns(3_400_000.0), "3.40 ms");
        assert_eq!(format_ns(2_100_000_000.0), "2.100 s");
    }
}
