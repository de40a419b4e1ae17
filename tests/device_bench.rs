//! End-to-end tests against real hardware.
//!
//! These exercise the full flush/warmup/measure protocol and are skipped
//! on machines without a HIP runtime.

use std::time::Duration;

use hipbench::{is_hip_available, workloads, Device, Executor};

fn executor_or_skip() -> Option<Executor> {
    if !is_hip_available() {
        eprintln!("skipping: HIP runtime not available");
        return None;
    }
    match Device::count() {
        Ok(n) if n > 0 => {}
        _ => {
            eprintln!("skipping: no HIP devices visible");
            return None;
        }
    }
    let device = Device::default_device().expect("device 0");
    Some(Executor::new(device).expect("executor setup"))
}

#[test]
fn noop_workload_yields_one_sample_per_iteration() {
    let Some(mut executor) = executor_or_skip() else {
        return;
    };

    let samples = executor
        .bench_samples(|_stream| Ok(()), 10, 50)
        .expect("bench");

    // Exactly the measured trials land in the result; the 10 warmups are
    // discarded.
    assert_eq!(samples.len(), 50);
    for sample in &samples {
        assert!(*sample >= Duration::ZERO);
    }
}

#[test]
fn fill_workload_reports_positive_latency() {
    let Some(mut executor) = executor_or_skip() else {
        return;
    };

    let mut buffer = executor.device().alloc::<u8>(16 << 20).expect("alloc");
    let stats = executor
        .bench(workloads::fill(&mut buffer), 3, 10)
        .expect("bench");

    assert!(stats.average > Duration::ZERO);
    assert!(stats.fastest <= stats.average);
    assert!(stats.average <= stats.slowest);
}

#[test]
fn device_reports_classifiable_properties() {
    if !is_hip_available() {
        eprintln!("skipping: HIP runtime not available");
        return;
    }
    if !matches!(Device::count(), Ok(n) if n > 0) {
        eprintln!("skipping: no HIP devices visible");
        return;
    }

    let device = Device::default_device().expect("device 0");
    let props = device.properties();
    assert!(!props.name.is_empty());
    assert!(props.warp_size == 32 || props.warp_size == 64);
    assert!(props.total_memory > 0);
    // The codename should classify on any supported part; an unclassified
    // device is still usable, so only log it.
    if device.family().is_empty() {
        eprintln!("note: unclassified codename '{}'", props.gcn_arch_name);
    }
}
