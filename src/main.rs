//! herakles-sampler - version 0.1.0
//!
//! Runs the sampling engine in a loop and logs a host summary plus the top
//! processes of every pass through tracing.

mod cli;
mod config;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Level};

use cli::{Args, LogLevel};
use config::{resolve_config, show_config, validate_effective_config, SamplerConfig};
use herakles_sampler::platform::linux::{is_proc_mounted, LinuxPlatform};
use herakles_sampler::platform::Platform;
use herakles_sampler::{ProcessRecord, Sampler, SortKey};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(level: LogLevel) {
    let max_level = match level {
        LogLevel::Off => None,
        LogLevel::Error => Some(Level::ERROR),
        LogLevel::Warn => Some(Level::WARN),
        LogLevel::Info => Some(Level::INFO),
        LogLevel::Debug => Some(Level::DEBUG),
        LogLevel::Trace => Some(Level::TRACE),
    };
    let Some(max_level) = max_level else {
        return;
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("tracing subscriber already installed");
    }

    info!("Logging initialized with level: {:?}", level);
}

fn log_host_summary(sampler: &Sampler<LinuxPlatform>) {
    let g = sampler.global();
    let page_size = sampler.platform().page_size();

    info!(
        seq = g.seq,
        processes = g.processes,
        threads = g.threads,
        running = g.running_threads,
        load = format!("{:.2} {:.2} {:.2}", g.load.one_min, g.load.five_min, g.load.fifteen_min),
        cpu = format!(
            "{}% user, {}% sys, {}% idle",
            g.cpu_percent.user, g.cpu_percent.system, g.cpu_percent.idle
        ),
        "host"
    );

    if let Some(vm) = &g.vm {
        let mb = |pages: u64| pages * page_size / (1024 * 1024);
        info!(
            wired_mb = mb(vm.now.wired),
            active_mb = mb(vm.now.active),
            inactive_mb = mb(vm.now.inactive),
            free_mb = mb(vm.now.free),
            pageins = vm.now.pageins.saturating_sub(vm.previous.pageins),
            pageouts = vm.now.pageouts.saturating_sub(vm.previous.pageouts),
            "memory"
        );
    }

    if let (Some(net), Some(disk)) = (&g.net, &g.disk) {
        info!(
            net_bytes_in = net.now.bytes_in.saturating_sub(net.previous.bytes_in),
            net_bytes_out = net.now.bytes_out.saturating_sub(net.previous.bytes_out),
            disk_bytes_read = disk.now.bytes_read.saturating_sub(disk.previous.bytes_read),
            disk_bytes_written = disk.now.bytes_written.saturating_sub(disk.previous.bytes_written),
            "io"
        );
    }

    if let Some(fw) = &g.framework {
        info!(
            code = fw.resident_code,
            data = fw.resident_data,
            linkedit = fw.resident_linkedit,
            regions = fw.regions,
            "shared frameworks"
        );
    }
}

fn log_process(record: &ProcessRecord) {
    let memory = &record.memory.now;
    info!(
        pid = record.pid,
        command = %record.command,
        state = %record.run_state,
        cpu_ms = record.cpu_delta().as_millis() as u64,
        time_s = record.cpu_total().as_secs(),
        threads = record.threads.now,
        rsize_kb = memory.resident / 1024,
        rprvt_kb = memory.private_resident / 1024,
        rshrd_kb = memory.shared_resident / 1024,
        vsize_mb = memory.virtual_size / (1024 * 1024),
        faults = record.counters.faults.delta(),
        csw = record.counters.context_switches.delta(),
        "process"
    );
}

fn run(cfg: &SamplerConfig) -> anyhow::Result<()> {
    let proc_root = cfg
        .proc_root
        .clone()
        .unwrap_or_else(|| config::DEFAULT_PROC_ROOT.into());
    if !is_proc_mounted(&proc_root) {
        bail!("{} does not look like a mounted proc filesystem", proc_root.display());
    }

    let sort_key: SortKey = cfg.sort_key().map_err(|e| anyhow!(e))?;
    let collect_regions = cfg.collect_regions.unwrap_or(false);
    let collect_frameworks = cfg.collect_frameworks.unwrap_or(false);
    let interval = Duration::from_millis(cfg.interval_ms.unwrap_or(config::DEFAULT_INTERVAL_MS));
    let iterations = cfg.iterations.unwrap_or(0);
    let top_n = cfg.top_n.unwrap_or(config::DEFAULT_TOP_N);

    let mut sampler = Sampler::new(LinuxPlatform::with_roots(&proc_root, "/sys"));
    if let Some(n) = cfg.framework_interval {
        sampler.set_framework_interval(n);
    }

    info!(
        proc_root = %proc_root.display(),
        interval_ms = interval.as_millis() as u64,
        sort = %format!("{} {}", sort_key.primary, sort_key.secondary),
        "sampler started"
    );

    let mut done = 0u64;
    loop {
        let started = Instant::now();

        match sampler.sample(collect_regions, collect_frameworks) {
            Ok(()) => {
                sampler.sort(&sort_key);
                log_host_summary(&sampler);
                for record in sampler.iter().take(top_n) {
                    log_process(record);
                }
            }
            Err(e) => warn!("Sample {} incomplete: {}", sampler.pass(), e),
        }

        done += 1;
        if iterations != 0 && done >= iterations {
            break;
        }

        let elapsed = started.elapsed();
        debug!(elapsed_ms = elapsed.as_millis() as u64, "pass finished");
        thread::sleep(interval.saturating_sub(elapsed));
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = resolve_config(&args)
        .map_err(|e| anyhow!("{e}"))
        .context("failed to load configuration")?;

    // Early exit for show/check modes
    if args.check_config {
        if let Err(e) = validate_effective_config(&config) {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }
        println!("✅ Configuration is valid");
        return Ok(());
    }

    if args.show_config {
        return show_config(&config, args.config_format).map_err(|e| anyhow!("{e}"));
    }

    setup_logging(config.log_level().unwrap_or(LogLevel::Info));

    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    run(&config)
}
