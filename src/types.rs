use serde::{Deserialize, Serialize};

/// Milliseconds on the host's shared monotonic clock.
///
/// This is the time base used for freshness gating. It is NOT the attitude
/// device's clock — see [`DeviceTicks`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonotonicMs(pub u64);

impl MonotonicMs {
    /// Elapsed milliseconds since `earlier`, saturating at zero.
    pub fn since(self, earlier: MonotonicMs) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Timestamp from the attitude device, in its native tick units.
///
/// A different epoch and scale than [`MonotonicMs`]; the two are never
/// compared directly. The odometry mapper scales this into the telemetry
/// microsecond convention (see `odometry::DEVICE_TICKS_TO_USEC`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTicks(pub u32);

/// Latest resolved GNSS state, accumulated sentence-by-sentence.
///
/// Position fields come from GGA sentences, velocity fields from RMC, so the
/// two groups can be stale relative to each other when only one sentence kind
/// arrives.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GnssFix {
    /// Latitude in signed decimal degrees (WGS84).
    pub latitude: f64,
    /// Longitude in signed decimal degrees (WGS84).
    pub longitude: f64,
    /// Altitude in meters above mean sea level.
    pub altitude: f64,
    /// North velocity component in m/s.
    pub velocity_north: f64,
    /// East velocity component in m/s.
    pub velocity_east: f64,
    /// Down velocity component in m/s (always 0.0 — no vertical velocity
    /// source in RMC).
    pub velocity_down: f64,
    /// Course over ground in degrees.
    pub course: f64,
    /// Ground speed in m/s.
    pub speed: f64,
    /// Receiver quality code: 0 = no fix, higher values are vendor fix/RTK
    /// tiers.
    pub quality: i32,
    /// True iff the last parsed quality code was > 0.
    pub valid: bool,
    /// Monotonic time of the last position update.
    pub timestamp: MonotonicMs,
}

impl Default for GnssFix {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            velocity_north: 0.0,
            velocity_east: 0.0,
            velocity_down: 0.0,
            course: 0.0,
            speed: 0.0,
            quality: 0,
            valid: false,
            timestamp: MonotonicMs(0),
        }
    }
}

/// One externally-fused attitude sample, replaced wholesale on every ingest.
///
/// The upstream device has already run its own estimation; the quaternion is
/// trusted to be unit-norm and is not re-normalized here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttitudeSample {
    /// Unit quaternion, scalar-first `[w, x, y, z]`.
    pub quaternion: [f32; 4],
    /// Body angular rate `[x, y, z]`, device-native units (rad/s).
    pub angular_rate: [f32; 3],
    /// Linear acceleration `[x, y, z]`.
    pub acceleration: [f32; 3],
    /// Euler orientation `[roll, pitch, yaw]`.
    pub orientation: [f32; 3],
    /// Device-clock timestamp.
    pub device_ts: DeviceTicks,
    /// Set true on every ingest; false only before the first sample.
    pub valid: bool,
}

impl Default for AttitudeSample {
    fn default() -> Self {
        Self {
            quaternion: [1.0, 0.0, 0.0, 0.0],
            angular_rate: [0.0; 3],
            acceleration: [0.0; 3],
            orientation: [0.0; 3],
            device_ts: DeviceTicks(0),
            valid: false,
        }
    }
}

/// Tunables for the fusion core. `Default` supplies the production values.
#[derive(Clone, Debug)]
pub struct FusionConfig {
    /// A source older than this (ms on the monotonic clock) is stale.
    pub freshness_window_ms: u64,
    /// Quality code treated as the high-precision (RTK fixed) tier.
    pub rtk_quality: i32,
    /// Position variance when quality == rtk_quality.
    pub pos_variance_rtk: f32,
    /// Position variance for every other fix tier.
    pub pos_variance_standard: f32,
    /// Velocity variance, independent of quality.
    pub vel_variance: f32,
    /// Attitude variance constant. Defined to match the upstream record
    /// layout but never placed into the covariance arrays (the attitude
    /// block stays zero, as upstream consumers expect).
    pub att_variance: f32,
    /// Per-sentence debug tracing.
    pub debug: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            freshness_window_ms: 2000,
            rtk_quality: 2,
            pos_variance_rtk: 1.0,
            pos_variance_standard: 5.0,
            vel_variance: 0.1,
            att_variance: 0.01,
            debug: false,
        }
    }
}
