//! Async ingestion loops feeding the fusion task over mpsc channels.
//!
//! Receiver text arrives as lines on stdin (a serial bridge like `socat` or
//! `gpspipe -r` upstream); the attitude stream has no portable host-side
//! source, so a mock generator stands in for the device. Both fall back to
//! mock data so the binary runs end-to-end on any machine.

use std::f64::consts::PI;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::Sender;
use tokio::time::{interval, Duration};

use crate::types::{AttitudeSample, DeviceTicks};

/// Read receiver sentences from stdin, one per line. With `mock` set,
/// synthesize a GGA/RMC pair every cycle instead.
pub async fn nmea_loop(tx: Sender<String>, mock: bool) {
    let mut sentence_count = 0u64;

    if mock {
        let mut interval = interval(Duration::from_millis(500)); // ~2 Hz receiver
        loop {
            interval.tick().await;
            for line in mock_sentence_pair() {
                match tx.try_send(line) {
                    Ok(_) => {
                        sentence_count += 1;
                        if sentence_count % 50 == 0 {
                            eprintln!("[nmea] {} sentences (mock)", sentence_count);
                        }
                    }
                    Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
                        eprintln!("[nmea] Channel closed after {} sentences", sentence_count);
                        return;
                    }
                    Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
                        // Channel full, drop this sentence
                    }
                }
            }
        }
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match tx.try_send(line) {
                Ok(_) => {
                    sentence_count += 1;
                    if sentence_count % 100 == 0 {
                        eprintln!("[nmea] {} sentences", sentence_count);
                    }
                }
                Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
                    eprintln!("[nmea] Channel closed after {} sentences", sentence_count);
                    break;
                }
                Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
                    // Channel full, drop this sentence
                }
            },
            Ok(None) => {
                eprintln!("[nmea] stdin closed after {} sentences", sentence_count);
                break;
            }
            Err(e) => {
                eprintln!("[nmea] read error: {}", e);
                break;
            }
        }
    }
}

/// Mock attitude stream at ~50 Hz, standing in for the fused-AHRS device.
pub async fn attitude_loop(tx: Sender<AttitudeSample>) {
    let mut interval = interval(Duration::from_millis(20));
    let mut sample_count = 0u64;

    loop {
        interval.tick().await;

        match tx.try_send(mock_attitude_sample()) {
            Ok(_) => {
                sample_count += 1;
                if sample_count % 250 == 0 {
                    eprintln!("[attitude] {} samples", sample_count);
                }
            }
            Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
                eprintln!("[attitude] Channel closed after {} samples", sample_count);
                break;
            }
            Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
                // Channel full, drop this sample
            }
        }
    }
}

fn mock_sentence_pair() -> [String; 2] {
    static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let seq = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed) as f64;

    // Slow drift north-east from a fixed start, RTK-fixed quality
    let lat_min = 7.038 + seq * 0.001;
    let lon_min = 31.000 + seq * 0.001;
    let gga = format!(
        "$GPGGA,123519,48{:06.3},N,011{:06.3},E,2,08,0.9,545.4,M,46.9,M,,",
        lat_min, lon_min
    );

    let speed_kn = 10.0 + (seq * 0.1).sin() * 3.0;
    let course = (45.0 + seq) % 360.0;
    let rmc = format!(
        "$GPRMC,123519,A,48{:06.3},N,011{:06.3},E,{:05.1},{:05.1},230394,003.1,W",
        lat_min, lon_min, speed_kn, course
    );

    [gga, rmc]
}

fn mock_attitude_sample() -> AttitudeSample {
    static COUNTER: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);
    let seq = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    let t = f64::from(seq) * 0.02;

    // Gentle yaw oscillation around level flight
    let half_yaw = (t * 0.2 * PI).sin() * 0.1;
    AttitudeSample {
        quaternion: [half_yaw.cos() as f32, 0.0, 0.0, half_yaw.sin() as f32],
        angular_rate: [
            ((t * 0.5).sin() * 0.05) as f32,
            ((t * 0.3).cos() * 0.03) as f32,
            ((t * 1.0).sin() * 0.1) as f32,
        ],
        acceleration: [0.0, 0.0, 9.81],
        orientation: [0.0, 0.0, (half_yaw * 2.0) as f32],
        // device counts 100 us ticks; 20 ms cadence = 200 ticks per sample
        device_ts: DeviceTicks(seq.wrapping_mul(200)),
        valid: false, // ingest marks it valid
    }
}
