//! Memory-bandwidth sweep on device 0.
//!
//! Runs the fill and device-to-device copy probes across a range of buffer
//! sizes and prints one report block per configuration. Set
//! `HIPBENCH_JSON=<path>` to also dump the results as JSON.

use anyhow::Context;

use hipbench::{
    report, workloads, BenchReport, Device, Executor, Size, DEFAULT_ITERATIONS, DEFAULT_WARMUPS,
};

const SWEEP_MIB: &[usize] = &[16, 64, 256, 1024];

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        eprintln!("{}", err.backtrace());
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let count = Device::count().context("querying device count")?;
    anyhow::ensure!(count > 0, "no HIP devices visible");

    let device = Device::default_device().context("opening device 0")?;
    let props = device.properties();
    println!(
        "device 0: {} ({}), {} [{:?}], {} CUs, wavefront {}, {} MiB",
        props.name,
        props.pci_address,
        props.gcn_arch_name,
        device.family(),
        props.compute_units,
        props.warp_size,
        props.total_memory >> 20,
    );

    let mut executor = Executor::new(device).context("setting up executor")?;
    let mut reports = Vec::new();

    for &mib in SWEEP_MIB {
        let bytes = mib << 20;

        let mut buffer = executor.device().alloc::<u8>(bytes)?;
        let stats = executor.bench(
            workloads::fill(&mut buffer),
            DEFAULT_WARMUPS,
            DEFAULT_ITERATIONS,
        )?;
        let fill = BenchReport::new(
            executor.device(),
            &format!("fill {mib} MiB"),
            Size::new(bytes),
            Size::new(bytes),
            &stats,
        );
        fill.print();
        reports.push(fill);
        drop(buffer);

        let src = executor.device().alloc::<u8>(bytes)?;
        let mut dst = executor.device().alloc::<u8>(bytes)?;
        let stats = executor.bench(
            workloads::copy(&mut dst, &src),
            DEFAULT_WARMUPS,
            DEFAULT_ITERATIONS,
        )?;
        // A copy moves each byte twice: one read, one write.
        let copy = BenchReport::new(
            executor.device(),
            &format!("copy {mib} MiB"),
            Size::new(bytes),
            Size::new(2 * bytes),
            &stats,
        );
        copy.print();
        reports.push(copy);
    }

    if let Ok(path) = std::env::var("HIPBENCH_JSON") {
        let json = report::to_json(&reports).context("serializing results")?;
        std::fs::write(&path, json).with_context(|| format!("writing {path}"))?;
        println!("results written to {path}");
    }

    Ok(())
}
