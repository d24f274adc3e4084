//! Fusion core: owns the GNSS fix, the attitude sample, and the freshness
//! gate that decides whether the two are mutually usable.
//!
//! Everything here is independent of the async runtime and the transport.
//! Callers push sentences and attitude samples at their own rates, passing
//! the current monotonic time explicitly; a periodic caller invokes
//! [`FusionCore::try_emit`]. Explicit timestamps keep the whole core
//! replayable and unit-testable with simulated time.
//!
//! Single-threaded by construction: one `FusionCore` instance owns all of
//! its state exclusively. A multi-threaded host must serialize access
//! externally (a mutex around the instance, or one draining task).

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::io;

use crate::nmea::{self, Sentence};
use crate::odometry::{
    EmitOutcome, OdometryEncoder, OdometryError, OdometryRecord, COV_LEN, COV_SLOT_X, COV_SLOT_Y,
    COV_SLOT_Z, DEVICE_TICKS_TO_USEC, ESTIMATOR_TYPE_GPS, FRAME_GLOBAL, FRAME_LOCAL_NED,
};
use crate::types::{AttitudeSample, FusionConfig, GnssFix, MonotonicMs};

/// Derived gate state and cumulative counters. Recomputed on every data
/// arrival and before every query; never mutated independently.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FusionStatus {
    pub gnss_fresh: bool,
    pub attitude_fresh: bool,
    /// Both sources fresh simultaneously — the only condition under which
    /// telemetry is emitted.
    pub fusion_active: bool,
    pub last_gnss_update: MonotonicMs,
    pub last_attitude_update: MonotonicMs,
    pub last_emit: MonotonicMs,
    /// Mirror of the receiver quality code, for external reporting.
    pub gnss_quality: i32,
    /// Fusion cycles that passed the gate.
    pub fusion_cycles: u64,
    /// Records successfully handed to the output channel.
    pub records_emitted: u64,
    /// Encode/write failures after the gate passed.
    pub emit_failures: u64,
}

/// What one sentence ingest did to the fix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SentenceOutcome {
    /// GGA applied: position, altitude, quality, validity, timestamps.
    PositionApplied,
    /// RMC applied: speed, course, velocity components.
    VelocityApplied,
    /// Unrecognized or malformed; nothing written.
    Skipped,
}

pub struct FusionCore {
    config: FusionConfig,
    fix: GnssFix,
    attitude: AttitudeSample,
    status: FusionStatus,
}

impl FusionCore {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            fix: GnssFix::default(),
            attitude: AttitudeSample::default(),
            status: FusionStatus::default(),
        }
    }

    // ── Sentence ingest ──────────────────────────────────────────────────

    /// Feed one line of receiver text. Malformed or unrecognized lines are
    /// dropped silently; the gate is recomputed either way.
    pub fn ingest_sentence(&mut self, line: &str, now: MonotonicMs) -> SentenceOutcome {
        let outcome = match nmea::parse(line) {
            Some(Sentence::Gga { latitude, longitude, quality, altitude }) => {
                self.fix.latitude = latitude;
                self.fix.longitude = longitude;
                self.fix.altitude = altitude;
                self.fix.quality = quality;
                self.fix.valid = quality > 0;
                self.fix.timestamp = now;
                self.status.last_gnss_update = now;
                if self.config.debug {
                    log::debug!(
                        "gnss position: lat={:.6} lon={:.6} alt={:.1} q={}",
                        latitude, longitude, altitude, quality
                    );
                }
                SentenceOutcome::PositionApplied
            }
            Some(Sentence::Rmc { speed_ms, course_deg }) => {
                let course_rad = course_deg.to_radians();
                let vel = Vector3::new(
                    speed_ms * course_rad.cos(),
                    speed_ms * course_rad.sin(),
                    0.0,
                );
                self.fix.speed = speed_ms;
                self.fix.course = course_deg;
                self.fix.velocity_north = vel.x;
                self.fix.velocity_east = vel.y;
                self.fix.velocity_down = vel.z;
                if self.config.debug {
                    log::debug!(
                        "gnss velocity: speed={:.3} course={:.1} vn={:.3} ve={:.3}",
                        speed_ms, course_deg, vel.x, vel.y
                    );
                }
                SentenceOutcome::VelocityApplied
            }
            None => SentenceOutcome::Skipped,
        };
        self.refresh(now);
        outcome
    }

    // ── Attitude ingest ──────────────────────────────────────────────────

    /// Copy an externally-fused attitude sample. The upstream device is
    /// trusted: no normalization check, validity set unconditionally.
    pub fn ingest_attitude(&mut self, sample: AttitudeSample, now: MonotonicMs) {
        self.attitude = AttitudeSample { valid: true, ..sample };
        self.status.last_attitude_update = now;
        if self.config.debug {
            let q = &self.attitude.quaternion;
            log::debug!("attitude: q=[{:.3} {:.3} {:.3} {:.3}]", q[0], q[1], q[2], q[3]);
        }
        self.refresh(now);
    }

    // ── Freshness gate ───────────────────────────────────────────────────

    /// Recompute per-source freshness and the fusion-active flag. Pure
    /// function of stored state and `now`; idempotent, no hysteresis.
    pub fn refresh(&mut self, now: MonotonicMs) {
        let window = self.config.freshness_window_ms;
        self.status.gnss_fresh =
            self.fix.valid && now.since(self.status.last_gnss_update) < window;
        self.status.attitude_fresh =
            self.attitude.valid && now.since(self.status.last_attitude_update) < window;
        self.status.fusion_active = self.status.gnss_fresh && self.status.attitude_fresh;
        self.status.gnss_quality = self.fix.quality;
    }

    pub fn fusion_active(&self) -> bool {
        self.status.fusion_active
    }

    // ── Odometry mapping ─────────────────────────────────────────────────

    /// Map the current fix + attitude into a telemetry record. Callers are
    /// expected to check the gate first; `try_emit` does.
    pub fn build_record(&self) -> OdometryRecord {
        let pos_variance = if self.fix.quality == self.config.rtk_quality {
            self.config.pos_variance_rtk
        } else {
            self.config.pos_variance_standard
        };

        let mut pose_covariance = [0.0_f32; COV_LEN];
        pose_covariance[COV_SLOT_X] = pos_variance;
        pose_covariance[COV_SLOT_Y] = pos_variance;
        pose_covariance[COV_SLOT_Z] = pos_variance;

        let mut velocity_covariance = [0.0_f32; COV_LEN];
        velocity_covariance[COV_SLOT_X] = self.config.vel_variance;
        velocity_covariance[COV_SLOT_Y] = self.config.vel_variance;
        velocity_covariance[COV_SLOT_Z] = self.config.vel_variance;

        OdometryRecord {
            time_usec: u64::from(self.attitude.device_ts.0) * DEVICE_TICKS_TO_USEC,
            frame_id: FRAME_GLOBAL,
            child_frame_id: FRAME_LOCAL_NED,
            x: self.fix.latitude as f32,
            y: self.fix.longitude as f32,
            z: (-self.fix.altitude) as f32,
            vx: self.fix.velocity_north as f32,
            vy: self.fix.velocity_east as f32,
            vz: self.fix.velocity_down as f32,
            q: self.attitude.quaternion,
            rollspeed: self.attitude.angular_rate[0],
            pitchspeed: self.attitude.angular_rate[1],
            yawspeed: self.attitude.angular_rate[2],
            pose_covariance,
            velocity_covariance,
            reset_counter: 0,
            estimator_type: ESTIMATOR_TYPE_GPS,
        }
    }

    /// One fuse-and-emit attempt.
    ///
    /// Gate inactive: `Ok(NotReady)`, no counters move. Gate active: the
    /// cycle counter increments, the record is encoded, written, and
    /// flushed; on success the emitted counter and last-emit timestamp
    /// advance, on encode/write/flush failure the failure counter advances
    /// and the error is returned. The flush happens here so that buffered
    /// writers surface channel failures inside the emit accounting rather
    /// than on some later call. At most one attempt per call, no retry.
    pub fn try_emit<E, W>(
        &mut self,
        encoder: &mut E,
        out: &mut W,
        now: MonotonicMs,
    ) -> Result<EmitOutcome, OdometryError>
    where
        E: OdometryEncoder,
        W: io::Write,
    {
        self.refresh(now);
        if !self.status.fusion_active {
            if self.config.debug {
                log::debug!("emit skipped: fusion inactive");
            }
            return Ok(EmitOutcome::NotReady);
        }

        self.status.fusion_cycles += 1;

        let record = self.build_record();
        let bytes = match encoder.encode(&record) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.status.emit_failures += 1;
                return Err(e);
            }
        };
        if let Err(e) = out.write_all(&bytes).and_then(|_| out.flush()) {
            self.status.emit_failures += 1;
            return Err(e.into());
        }

        self.status.records_emitted += 1;
        self.status.last_emit = now;
        if self.config.debug {
            log::debug!(
                "odometry sent #{} ({} bytes)",
                self.status.records_emitted,
                bytes.len()
            );
        }
        Ok(EmitOutcome::Sent { bytes: bytes.len() })
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn fix(&self) -> &GnssFix {
        &self.fix
    }

    pub fn attitude(&self) -> &AttitudeSample {
        &self.attitude
    }

    pub fn status(&self) -> &FusionStatus {
        &self.status
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceTicks;
    use approx::assert_relative_eq;

    const GGA_Q1: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,";
    const GGA_Q2: &str = "$GPGGA,123519,4807.038,N,01131.000,E,2,08,0.9,545.4,M,46.9,M,,";
    const GGA_Q0: &str = "$GPGGA,123519,4807.038,N,01131.000,E,0,03,2.5,545.4,M,46.9,M,,";
    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W";

    fn attitude() -> AttitudeSample {
        AttitudeSample {
            quaternion: [0.9, 0.1, 0.2, 0.3],
            angular_rate: [0.01, 0.02, 0.03],
            acceleration: [0.0, 0.0, 9.81],
            orientation: [0.1, 0.2, 0.3],
            device_ts: DeviceTicks(12345),
            valid: false, // ingest must override this
        }
    }

    #[test]
    fn test_gga_updates_fix_and_freshness() {
        let mut core = FusionCore::new(FusionConfig::default());
        let outcome = core.ingest_sentence(GGA_Q1, MonotonicMs(1000));
        assert_eq!(outcome, SentenceOutcome::PositionApplied);

        let fix = core.fix();
        assert_relative_eq!(fix.latitude, 48.0 + 7.038 / 60.0, epsilon = 1e-9);
        assert_relative_eq!(fix.longitude, 11.0 + 31.0 / 60.0, epsilon = 1e-9);
        assert!(fix.valid);
        assert_eq!(fix.timestamp, MonotonicMs(1000));
        assert_eq!(core.status().last_gnss_update, MonotonicMs(1000));
        assert!(core.status().gnss_fresh);
        // attitude never arrived
        assert!(!core.fusion_active());
    }

    #[test]
    fn test_quality_zero_invalidates_source() {
        let mut core = FusionCore::new(FusionConfig::default());
        core.ingest_sentence(GGA_Q0, MonotonicMs(1000));
        assert!(!core.fix().valid);
        assert!(!core.status().gnss_fresh);

        // data fields are still overwritten
        assert_relative_eq!(core.fix().latitude, 48.0 + 7.038 / 60.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rmc_velocity_decomposition() {
        let mut core = FusionCore::new(FusionConfig::default());
        let outcome = core.ingest_sentence(RMC, MonotonicMs(1000));
        assert_eq!(outcome, SentenceOutcome::VelocityApplied);

        let speed = 22.4 * crate::nmea::KNOTS_TO_MS;
        let course = 84.4_f64.to_radians();
        assert_relative_eq!(core.fix().speed, speed, epsilon = 1e-9);
        assert_relative_eq!(core.fix().velocity_north, speed * course.cos(), epsilon = 1e-9);
        assert_relative_eq!(core.fix().velocity_east, speed * course.sin(), epsilon = 1e-9);
        assert_eq!(core.fix().velocity_down, 0.0);

        // RMC alone does not make the positioning source fresh
        assert!(!core.status().gnss_fresh);
    }

    #[test]
    fn test_garbage_is_skipped_without_writes() {
        let mut core = FusionCore::new(FusionConfig::default());
        let outcome = core.ingest_sentence("$GPGSV,3,1,11,03,03,111,00", MonotonicMs(1000));
        assert_eq!(outcome, SentenceOutcome::Skipped);
        assert_eq!(core.fix().latitude, 0.0);
        assert_eq!(core.status().last_gnss_update, MonotonicMs(0));
    }

    #[test]
    fn test_gate_requires_both_sources() {
        let mut core = FusionCore::new(FusionConfig::default());

        core.ingest_sentence(GGA_Q1, MonotonicMs(1000));
        assert!(!core.fusion_active());

        core.ingest_attitude(attitude(), MonotonicMs(1100));
        assert!(core.fusion_active());
        assert!(core.status().gnss_fresh);
        assert!(core.status().attitude_fresh);
    }

    #[test]
    fn test_staleness_flips_gate_at_window_boundary() {
        let mut core = FusionCore::new(FusionConfig::default());
        core.ingest_sentence(GGA_Q1, MonotonicMs(1000));
        core.ingest_attitude(attitude(), MonotonicMs(1000));

        core.refresh(MonotonicMs(2999));
        assert!(core.fusion_active());

        core.refresh(MonotonicMs(3000));
        assert!(!core.status().gnss_fresh);
        assert!(!core.status().attitude_fresh);
        assert!(!core.fusion_active());

        // stored data values are untouched by staleness
        assert_relative_eq!(core.fix().latitude, 48.0 + 7.038 / 60.0, epsilon = 1e-9);
        assert!(core.fix().valid);
        assert!(core.attitude().valid);
    }

    #[test]
    fn test_one_stale_source_deactivates_fusion() {
        let mut core = FusionCore::new(FusionConfig::default());
        core.ingest_sentence(GGA_Q1, MonotonicMs(1000));
        core.ingest_attitude(attitude(), MonotonicMs(4000));

        // gnss is 3000 ms old at the attitude ingest
        assert!(!core.status().gnss_fresh);
        assert!(core.status().attitude_fresh);
        assert!(!core.fusion_active());
    }

    #[test]
    fn test_emit_gated_leaves_counters_unchanged() {
        let mut core = FusionCore::new(FusionConfig::default());
        let mut encoder = crate::odometry::JsonEncoder;
        let mut out = Vec::new();

        let outcome = core.try_emit(&mut encoder, &mut out, MonotonicMs(1000)).unwrap();
        assert_eq!(outcome, EmitOutcome::NotReady);
        assert_eq!(core.status().fusion_cycles, 0);
        assert_eq!(core.status().records_emitted, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_successful_emit_increments_both_counters() {
        let mut core = FusionCore::new(FusionConfig::default());
        core.ingest_sentence(GGA_Q1, MonotonicMs(1000));
        core.ingest_attitude(attitude(), MonotonicMs(1050));

        let mut encoder = crate::odometry::JsonEncoder;
        let mut out = Vec::new();
        let outcome = core.try_emit(&mut encoder, &mut out, MonotonicMs(1100)).unwrap();

        assert!(matches!(outcome, EmitOutcome::Sent { bytes } if bytes == out.len()));
        assert_eq!(core.status().fusion_cycles, 1);
        assert_eq!(core.status().records_emitted, 1);
        assert_eq!(core.status().emit_failures, 0);
        assert_eq!(core.status().last_emit, MonotonicMs(1100));
    }

    struct FailingWriter;

    impl io::Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "channel down"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_is_observable() {
        let mut core = FusionCore::new(FusionConfig::default());
        core.ingest_sentence(GGA_Q1, MonotonicMs(1000));
        core.ingest_attitude(attitude(), MonotonicMs(1050));

        let mut encoder = crate::odometry::JsonEncoder;
        let result = core.try_emit(&mut encoder, &mut FailingWriter, MonotonicMs(1100));

        assert!(matches!(result, Err(OdometryError::Io(_))));
        // the cycle ran, but nothing was emitted
        assert_eq!(core.status().fusion_cycles, 1);
        assert_eq!(core.status().records_emitted, 0);
        assert_eq!(core.status().emit_failures, 1);
        assert_eq!(core.status().last_emit, MonotonicMs(0));
    }

    #[test]
    fn test_buffered_write_failure_counted() {
        let mut core = FusionCore::new(FusionConfig::default());
        core.ingest_sentence(GGA_Q1, MonotonicMs(1000));
        core.ingest_attitude(attitude(), MonotonicMs(1050));

        // BufWriter defers the real channel I/O until flush; the emit path
        // must still see the failure and account for it
        let mut encoder = crate::odometry::JsonEncoder;
        let mut out = io::BufWriter::new(FailingWriter);
        let result = core.try_emit(&mut encoder, &mut out, MonotonicMs(1100));

        assert!(matches!(result, Err(OdometryError::Io(_))));
        assert_eq!(core.status().fusion_cycles, 1);
        assert_eq!(core.status().records_emitted, 0);
        assert_eq!(core.status().emit_failures, 1);
    }

    #[test]
    fn test_record_round_trip_matches_stored_state() {
        let mut core = FusionCore::new(FusionConfig::default());
        core.ingest_sentence(GGA_Q2, MonotonicMs(1000));
        core.ingest_sentence(RMC, MonotonicMs(1010));
        core.ingest_attitude(attitude(), MonotonicMs(1020));
        assert!(core.fusion_active());

        let record = core.build_record();
        assert_eq!(record.time_usec, 12345 * 100);
        assert_eq!(record.frame_id, FRAME_GLOBAL);
        assert_eq!(record.child_frame_id, FRAME_LOCAL_NED);
        assert_relative_eq!(record.x, core.fix().latitude as f32);
        assert_relative_eq!(record.y, core.fix().longitude as f32);
        assert_relative_eq!(record.z, -core.fix().altitude as f32);
        assert_relative_eq!(record.vx, core.fix().velocity_north as f32);
        assert_relative_eq!(record.vy, core.fix().velocity_east as f32);
        assert_eq!(record.vz, 0.0);
        assert_eq!(record.q, [0.9, 0.1, 0.2, 0.3]);
        assert_eq!(record.rollspeed, 0.01);
        assert_eq!(record.pitchspeed, 0.02);
        assert_eq!(record.yawspeed, 0.03);
        assert_eq!(record.estimator_type, ESTIMATOR_TYPE_GPS);
        assert_eq!(record.reset_counter, 0);
    }

    #[test]
    fn test_position_variance_tracks_quality_tier() {
        let mut core = FusionCore::new(FusionConfig::default());
        core.ingest_attitude(attitude(), MonotonicMs(1000));

        core.ingest_sentence(GGA_Q2, MonotonicMs(1000));
        let rtk = core.build_record();
        assert_eq!(rtk.pose_covariance[COV_SLOT_X], 1.0);
        assert_eq!(rtk.pose_covariance[COV_SLOT_Y], 1.0);
        assert_eq!(rtk.pose_covariance[COV_SLOT_Z], 1.0);

        core.ingest_sentence(GGA_Q1, MonotonicMs(1001));
        let standard = core.build_record();
        assert_eq!(standard.pose_covariance[COV_SLOT_X], 5.0);

        // velocity variance is quality-independent; cross terms stay zero
        assert_eq!(rtk.velocity_covariance[COV_SLOT_X], 0.1);
        assert_eq!(standard.velocity_covariance[COV_SLOT_X], 0.1);
        assert_eq!(rtk.pose_covariance[1], 0.0);
        assert_eq!(rtk.velocity_covariance[1], 0.0);
    }

    #[test]
    fn test_altitude_negated_for_ned() {
        let mut core = FusionCore::new(FusionConfig::default());
        core.ingest_sentence(GGA_Q1, MonotonicMs(1000));
        let record = core.build_record();
        assert_relative_eq!(record.z, -545.4_f32, epsilon = 1e-3);
    }
}
