//! pair-soak - Drive two synthetic decoder threads through one pair session
//!
//! Each thread walks its own timestamp sequence with random gaps and jitter,
//! occasionally injects a flush, and reports end-of-stream at the end. The
//! per-side outcome counters are printed as JSON.
//!
//! ## Usage
//!
//! ```text
//! pair-soak [CONFIG.yaml] [FRAMES]
//! ```
//!
//! Set RUST_LOG=debug for per-frame gate traces.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam::channel;
use rand::Rng;
use serde::Serialize;

use stereo_sync::config::{default_config_path, load_config};
use stereo_sync::{
    Outcome, PairId, PairRegistry, Role, SessionHandle, SessionState, SideStatsSnapshot, SyncConfig,
};

const DEFAULT_FRAMES: u32 = 500;
/// Nominal frame duration (≈24 fps)
const FRAME_MS: u64 = 41;
/// Probability that a side skips one timestamp
const GAP_PROBABILITY: f64 = 0.05;
/// Probability that a side injects a flush before a frame
const FLUSH_PROBABILITY: f64 = 0.01;

#[derive(Debug, Serialize)]
struct SideReport {
    role: Role,
    frames: u32,
    forwarded_in: u32,
    forwarded_out: u32,
    flushes: u32,
    stats: SideStatsSnapshot,
}

#[derive(Debug, Serialize)]
struct SoakReport {
    config: SyncConfig,
    elapsed_ms: u128,
    /// Session state once both sides reported, before teardown
    end_state: Option<SessionState>,
    sides: Vec<SideReport>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .get(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let frames: u32 = match args.get(2) {
        Some(arg) => arg
            .parse()
            .with_context(|| format!("Invalid frame count: {}", arg))?,
        None => DEFAULT_FRAMES,
    };

    let config: SyncConfig = load_config(&config_path);
    log::info!("pair-soak: {} frames per side, config {:?}", frames, config);

    let registry = PairRegistry::new(config.clone());
    let pair = PairId(1);
    let (report_tx, report_rx) = channel::bounded(2);
    let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
    let started = Instant::now();

    let mut workers = Vec::new();
    for role in Role::ALL {
        let handle = registry
            .register(pair, role)
            .with_context(|| format!("Failed to register {} side", role))?;
        let report_tx = report_tx.clone();
        let shutdown_rx = shutdown_rx.clone();

        let worker = thread::Builder::new()
            .name(format!("soak-{}", role.name()))
            .spawn(move || {
                let report = run_side(&handle, frames);
                let _ = report_tx.send(report);
                // Keep the session alive until both sides have reported.
                let _ = shutdown_rx.recv();
                handle.finalize();
            })
            .context("Failed to spawn soak thread")?;
        workers.push(worker);
    }
    drop(report_tx);

    let mut sides: Vec<SideReport> = report_rx.iter().collect();
    sides.sort_by_key(|side| side.role.index());
    let end_state = registry.session_state(pair);
    drop(shutdown_tx);

    for worker in workers {
        if worker.join().is_err() {
            log::error!("pair-soak: worker thread panicked");
        }
    }

    let report = SoakReport {
        config,
        elapsed_ms: started.elapsed().as_millis(),
        end_state,
        sides,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize report")?
    );
    Ok(())
}

/// One synthetic decoder loop
fn run_side(handle: &SessionHandle, frames: u32) -> SideReport {
    let mut rng = rand::thread_rng();
    let mut report = SideReport {
        role: handle.role(),
        frames,
        forwarded_in: 0,
        forwarded_out: 0,
        flushes: 0,
        stats: SideStatsSnapshot::default(),
    };

    let mut frame_index = 0u64;
    for _ in 0..frames {
        frame_index += if rng.gen_bool(GAP_PROBABILITY) { 2 } else { 1 };
        let ts = Some(Duration::from_millis(frame_index * FRAME_MS));
        thread::sleep(Duration::from_micros(rng.gen_range(0..3_000)));

        if rng.gen_bool(FLUSH_PROBABILITY) && flush(handle, &mut rng) {
            report.flushes += 1;
        }

        if handle.publish_input(ts).is_err() {
            break;
        }
        match handle.wait_input() {
            Outcome::Matched | Outcome::Unpaired => report.forwarded_in += 1,
            Outcome::MustAdvance | Outcome::Aborted | Outcome::TimedOut => continue,
        }

        if handle.publish_output(ts).is_err() {
            break;
        }
        if handle.wait_output().should_forward() {
            report.forwarded_out += 1;
        }
    }

    if let Err(e) = handle.notify_eos() {
        log::warn!("pair-soak: {} EOS not delivered: {}", handle.role(), e);
    }
    report.stats = handle.stats();
    report
}

fn flush(handle: &SessionHandle, rng: &mut impl Rng) -> bool {
    if handle.notify_flush_start().is_err() {
        return false;
    }
    thread::sleep(Duration::from_millis(rng.gen_range(0..10)));
    handle.notify_flush_stop().is_ok()
}
