//! Benchmark executor.
//!
//! Owns one device, its command stream, the cache-flush buffer, and the
//! clock governor, and drives the flush/warmup/measure protocol around
//! caller-supplied workloads.

use std::time::Duration;

use crate::error::Result;
use crate::governor::Governor;
use crate::hip::{Device, DeviceBuffer, Event, Stream, StreamFlags};
use crate::stats::Stats;
use crate::telemetry::{Telemetry, TelemetryControl};

pub const DEFAULT_WARMUPS: usize = 10;
pub const DEFAULT_ITERATIONS: usize = 50;

/// Orchestrates reproducible timed trials on one physical device.
///
/// A workload is any callable that, handed the executor's stream,
/// asynchronously enqueues work on it. Workloads must not synchronize
/// themselves; the executor owns all blocking points. A workload that
/// never completes blocks the process indefinitely.
pub struct Executor {
    device: Device,
    stream: Stream,
    flush_buffer: DeviceBuffer<u8>,
    governor: Governor<TelemetryControl>,
}

impl Executor {
    /// Sets up the stream, flush buffer, and clock governor for `device`.
    ///
    /// Identity resolution failure and telemetry library failure are
    /// fatal; an unpinnable clock level is only a warning (see
    /// [`Governor`]).
    pub fn new(device: Device) -> Result<Executor> {
        let stream = device.create_stream(StreamFlags::NonBlocking)?;
        let flush_buffer = device.alloc::<u8>(device.largest_cache_size())?;

        let telemetry = Telemetry::init()?;
        let governor = Governor::pin(telemetry, &device)?;

        log::info!(
            "benchmarking on device '{}' ({})",
            device.properties().name,
            device.properties().pci_address,
        );

        Ok(Executor {
            device,
            stream,
            flush_buffer,
            governor,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn governor(&self) -> &Governor<TelemetryControl> {
        &self.governor
    }

    /// Runs the full protocol and aggregates the measured trials.
    pub fn bench<F>(
        &mut self,
        workload: F,
        warmups: usize,
        iterations: usize,
    ) -> Result<Stats<Duration>>
    where
        F: FnMut(&Stream) -> Result<()>,
    {
        let samples = self.bench_samples(workload, warmups, iterations)?;
        Ok(Stats::from_samples(&samples))
    }

    /// Runs the full protocol and returns the raw measured trials, one
    /// duration per iteration, in trial order.
    ///
    /// Each trial: fill the flush buffer to evict residual cache state,
    /// synchronize, record the start event, let the workload enqueue,
    /// record the stop event, synchronize, read back the elapsed time.
    /// Warmup trials run the same protocol and are discarded; they
    /// stabilize clocks and caches and absorb lazy driver initialization.
    /// Any runtime error aborts the whole call; no partial results.
    pub fn bench_samples<F>(
        &mut self,
        mut workload: F,
        warmups: usize,
        iterations: usize,
    ) -> Result<Vec<Duration>>
    where
        F: FnMut(&Stream) -> Result<()>,
    {
        let mut events = Vec::with_capacity(iterations);
        for _ in 0..iterations {
            events.push((Event::new()?, Event::new()?));
        }

        for _ in 0..warmups {
            self.flush_cache()?;
            self.device.sync()?;
            workload(&self.stream)?;
            self.device.sync()?;
        }

        for (start, stop) in &events {
            self.flush_cache()?;
            self.device.sync()?;
            self.stream.record(start)?;
            workload(&self.stream)?;
            self.stream.record(stop)?;
            self.device.sync()?;
        }

        // Start precedes stop in submission order, so elapsed times are
        // non-negative.
        let mut samples = Vec::with_capacity(iterations);
        for (start, stop) in &events {
            samples.push(Event::elapsed(start, stop)?);
        }
        Ok(samples)
    }

    /// Enqueues a fill of the flush buffer, evicting residual cache state
    /// left by the previous trial.
    fn flush_cache(&mut self) -> Result<()> {
        self.stream.memset_async(&mut self.flush_buffer, 0x00)
    }
}
