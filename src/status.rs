//! Read-only status and diagnostics over the fusion core.
//!
//! A snapshot is a plain serializable value: the binary saves it as a JSON
//! live-status file for external dashboards and renders it as sectioned text
//! for the console. Capturing a snapshot recomputes the gate but changes no
//! stored data and no counters.

use serde::{Deserialize, Serialize};
use std::fs;

use crate::fusion::FusionCore;
use crate::types::MonotonicMs;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusionSnapshot {
    /// Monotonic time the snapshot was taken.
    pub timestamp_ms: u64,

    // Gate
    pub fusion_active: bool,
    pub gnss_fresh: bool,
    pub attitude_fresh: bool,

    // GNSS detail
    pub gnss_valid: bool,
    pub gnss_age_ms: u64,
    pub gnss_quality: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f64,
    pub course: f64,
    pub velocity_north: f64,
    pub velocity_east: f64,
    pub velocity_down: f64,

    // Attitude detail
    pub attitude_valid: bool,
    pub attitude_age_ms: u64,
    pub quaternion: [f32; 4],
    pub angular_rate: [f32; 3],
    pub attitude_device_ts: u32,

    // Counters
    pub fusion_cycles: u64,
    pub records_emitted: u64,
    pub emit_failures: u64,
    pub last_emit_ms: u64,
}

impl FusionSnapshot {
    /// Recompute the gate and capture the full state at `now`.
    pub fn capture(core: &mut FusionCore, now: MonotonicMs) -> Self {
        core.refresh(now);
        let fix = core.fix().clone();
        let attitude = core.attitude().clone();
        let status = core.status().clone();

        Self {
            timestamp_ms: now.0,
            fusion_active: status.fusion_active,
            gnss_fresh: status.gnss_fresh,
            attitude_fresh: status.attitude_fresh,
            gnss_valid: fix.valid,
            gnss_age_ms: now.since(status.last_gnss_update),
            gnss_quality: status.gnss_quality,
            latitude: fix.latitude,
            longitude: fix.longitude,
            altitude: fix.altitude,
            speed: fix.speed,
            course: fix.course,
            velocity_north: fix.velocity_north,
            velocity_east: fix.velocity_east,
            velocity_down: fix.velocity_down,
            attitude_valid: attitude.valid,
            attitude_age_ms: now.since(status.last_attitude_update),
            quaternion: attitude.quaternion,
            angular_rate: attitude.angular_rate,
            attitude_device_ts: attitude.device_ts.0,
            fusion_cycles: status.fusion_cycles,
            records_emitted: status.records_emitted,
            emit_failures: status.emit_failures,
            last_emit_ms: status.last_emit.0,
        }
    }

    /// Sectioned human-readable view.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("=============== FUSION STATUS ===============\n");
        out.push_str(&format!(
            "[FUSION] Active: {} | Cycles: {} | Emitted: {} | Failures: {}\n",
            if self.fusion_active { "YES" } else { "NO" },
            self.fusion_cycles,
            self.records_emitted,
            self.emit_failures,
        ));
        out.push_str(&format!(
            "[GNSS] Valid: {} | Quality: {} | Age: {}ms\n",
            if self.gnss_fresh { "YES" } else { "NO" },
            self.gnss_quality,
            self.gnss_age_ms,
        ));
        out.push_str(&format!(
            "[GNSS] Lat: {:.6} Lon: {:.6} Alt: {:.1} Speed: {:.3} m/s\n",
            self.latitude, self.longitude, self.altitude, self.speed,
        ));
        out.push_str(&format!(
            "[ATTITUDE] Valid: {} | Age: {}ms\n",
            if self.attitude_fresh { "YES" } else { "NO" },
            self.attitude_age_ms,
        ));
        out.push_str(&format!(
            "[ATTITUDE] Q: [{:.3} {:.3} {:.3} {:.3}]\n",
            self.quaternion[0], self.quaternion[1], self.quaternion[2], self.quaternion[3],
        ));
        out.push_str("=============================================");
        out
    }

    /// Explain why fusion is inactive. Purely descriptive; no corrective
    /// action is taken anywhere in this module. Derived from the two
    /// per-source flags alone, so it cannot disagree with itself even on a
    /// hand-built or deserialized snapshot.
    pub fn diagnose(&self) -> String {
        match (self.gnss_fresh, self.attitude_fresh) {
            (true, true) => "all sources fresh, fusion active".to_string(),
            (false, false) => format!(
                "fusion inactive: gnss stale or invalid (age {}ms), attitude stale or invalid (age {}ms)",
                self.gnss_age_ms, self.attitude_age_ms
            ),
            (false, true) => format!(
                "fusion inactive: gnss stale or invalid (age {}ms, quality {})",
                self.gnss_age_ms, self.gnss_quality
            ),
            (true, false) => format!(
                "fusion inactive: attitude stale or invalid (age {}ms)",
                self.attitude_age_ms
            ),
        }
    }

    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
