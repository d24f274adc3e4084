use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

mod fusion;
mod nmea;
mod odometry;
mod sensors;
mod status;
mod types;

use fusion::{FusionCore, SentenceOutcome};
use odometry::{EmitOutcome, JsonEncoder};
use status::FusionSnapshot;
use types::{AttitudeSample, FusionConfig, MonotonicMs};

#[derive(Parser, Debug)]
#[command(name = "odometry_bridge")]
#[command(about = "GNSS/AHRS fusion bridge - gated odometry telemetry emitter", long_about = None)]
struct Args {
    /// Duration in seconds (0 = continuous)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// Emit interval in milliseconds
    #[arg(long, default_value = "100")]
    emit_interval_ms: u64,

    /// Odometry output file (newline-delimited JSON records)
    #[arg(long, default_value = "odometry_out.jsonl")]
    output: String,

    /// Directory for the live status file
    #[arg(long, default_value = "odometry_status")]
    status_dir: String,

    /// Generate mock receiver sentences instead of reading stdin
    #[arg(long)]
    mock: bool,

    /// Per-sentence debug tracing in the fusion core
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!("[{}] Odometry Bridge Starting", ts_now());
    println!("  Duration: {} seconds (0=continuous)", args.duration);
    println!("  Emit interval: {} ms", args.emit_interval_ms);
    println!("  Output: {}", args.output);
    println!("  NMEA source: {}", if args.mock { "mock" } else { "stdin" });

    std::fs::create_dir_all(&args.status_dir)?;

    let config = FusionConfig { debug: args.debug, ..FusionConfig::default() };
    let mut core = FusionCore::new(config);
    let mut encoder = JsonEncoder;
    let out_file = File::create(&args.output)
        .with_context(|| format!("creating output file {}", args.output))?;
    let mut out = BufWriter::new(out_file);

    // Channels for sensor data
    let (nmea_tx, mut nmea_rx) = mpsc::channel::<String>(500);
    let (attitude_tx, mut attitude_rx) = mpsc::channel::<AttitudeSample>(500);

    // Spawn ingestion tasks (hold handles to keep tasks alive)
    let _nmea_handle = tokio::spawn(sensors::nmea_loop(nmea_tx.clone(), args.mock));
    let _attitude_handle = tokio::spawn(sensors::attitude_loop(attitude_tx.clone()));
    drop(nmea_tx);
    drop(attitude_tx);

    let mut sentence_count = 0u64;
    let mut skipped_count = 0u64;
    let mut attitude_count = 0u64;
    let mut emit_errors = 0u64;

    let clock_start = Instant::now();
    let start = Utc::now();
    let mut last_emit = Utc::now();
    let mut last_status_update = Utc::now();

    println!("[{}] Bridging...", ts_now());

    loop {
        if args.duration > 0 {
            let elapsed = Utc::now().signed_duration_since(start);
            if elapsed.num_seconds() as u64 >= args.duration {
                println!("[{}] Duration reached, stopping...", ts_now());
                break;
            }
        }

        let now = MonotonicMs(clock_start.elapsed().as_millis() as u64);

        // Drain receiver sentences
        while let Ok(line) = nmea_rx.try_recv() {
            match core.ingest_sentence(&line, now) {
                SentenceOutcome::Skipped => skipped_count += 1,
                _ => sentence_count += 1,
            }
        }

        // Drain attitude samples
        while let Ok(sample) = attitude_rx.try_recv() {
            core.ingest_attitude(sample, now);
            attitude_count += 1;
        }

        // Periodic emit attempt; gating failures are normal, write
        // failures are counted and logged
        let wall = Utc::now();
        if wall.signed_duration_since(last_emit).num_milliseconds() as u64 >= args.emit_interval_ms
        {
            // try_emit flushes the writer itself, so a dead channel shows
            // up here and in the snapshot's emit_failures counter
            match core.try_emit(&mut encoder, &mut out, now) {
                Ok(EmitOutcome::Sent { .. }) => {}
                Ok(EmitOutcome::NotReady) => {}
                Err(e) => {
                    emit_errors += 1;
                    log::warn!("emit failed: {}", e);
                }
            }
            last_emit = wall;
        }

        // Live status file + console line every 2 seconds
        if wall.signed_duration_since(last_status_update).num_seconds() >= 2 {
            let snapshot = FusionSnapshot::capture(&mut core, now);
            let status_path = format!("{}/live_status.json", args.status_dir);
            if let Err(e) = snapshot.save(&status_path) {
                log::warn!("live status save failed: {}", e);
            }
            println!(
                "[{}] {} | sentences {} (skipped {}) | attitude {}",
                ts_now(),
                snapshot.diagnose(),
                sentence_count,
                skipped_count,
                attitude_count
            );
            last_status_update = wall;
        }

        sleep(Duration::from_millis(1)).await;
    }

    // Final status
    let now = MonotonicMs(clock_start.elapsed().as_millis() as u64);
    let snapshot = FusionSnapshot::capture(&mut core, now);
    let status_path = format!("{}/live_status_final.json", args.status_dir);
    let _ = snapshot.save(&status_path);
    out.flush()?;

    println!("\n{}", snapshot.render());
    println!("\n=== Final Stats ===");
    println!("Sentences applied: {} (skipped {})", sentence_count, skipped_count);
    println!("Attitude samples: {}", attitude_count);
    println!("Fusion cycles: {}", snapshot.fusion_cycles);
    println!("Records emitted: {}", snapshot.records_emitted);
    println!("Emit failures: {} ({} logged here)", snapshot.emit_failures, emit_errors);

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
