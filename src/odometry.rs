//! Odometry telemetry record and the encoder/output seam.
//!
//! The record mirrors the MAVLink ODOMETRY message layout field-for-field so
//! that an external codec can serialize it without remapping. Byte-level
//! framing is deliberately outside this crate: [`OdometryEncoder`] is the
//! boundary, and [`JsonEncoder`] is a stand-in codec for testing and the demo
//! binary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// MAV_FRAME_GLOBAL — parent frame of the emitted pose.
pub const FRAME_GLOBAL: u8 = 0;
/// MAV_FRAME_LOCAL_NED — child frame.
pub const FRAME_LOCAL_NED: u8 = 1;
/// MAV_ESTIMATOR_TYPE_GPS — the positioning receiver is the estimator origin.
pub const ESTIMATOR_TYPE_GPS: u8 = 4;

/// Attitude device ticks to telemetry microseconds.
///
/// Compatibility artifact: the device clock is scaled straight into the
/// telemetry time field without reconciling it against the GNSS clock. The
/// attitude timestamp is treated as authoritative for the fused output.
pub const DEVICE_TICKS_TO_USEC: u64 = 100;

/// Length of each packed covariance array.
pub const COV_LEN: usize = 21;

/// Covariance slots written by the upstream system. For an upper-triangular
/// 6x6 packing the true diagonal would be 0/6/11/15/18/20; upstream writes
/// 0/7/14 and its consumers read those slots, so the layout is preserved.
pub const COV_SLOT_X: usize = 0;
pub const COV_SLOT_Y: usize = 7;
pub const COV_SLOT_Z: usize = 14;

/// One fused odometry instant, shaped like MAVLink ODOMETRY.
///
/// `x`/`y` carry latitude/longitude in **degrees**, passed through
/// unconverted from the receiver even though the frame tags describe a
/// position field. This is the contract the upstream system ships and its
/// consumers compensate for; it is pinned by test rather than silently
/// "fixed".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OdometryRecord {
    /// Attitude device timestamp scaled into microseconds.
    pub time_usec: u64,
    pub frame_id: u8,
    pub child_frame_id: u8,
    /// Latitude, degrees (see struct docs).
    pub x: f32,
    /// Longitude, degrees (see struct docs).
    pub y: f32,
    /// Negated altitude, meters (NED down-positive).
    pub z: f32,
    /// North velocity, m/s.
    pub vx: f32,
    /// East velocity, m/s.
    pub vy: f32,
    /// Down velocity, m/s.
    pub vz: f32,
    /// Orientation quaternion, scalar-first.
    pub q: [f32; 4],
    pub rollspeed: f32,
    pub pitchspeed: f32,
    pub yawspeed: f32,
    /// Pose covariance; only the three position slots are populated.
    pub pose_covariance: [f32; COV_LEN],
    /// Velocity covariance; only the three linear slots are populated.
    pub velocity_covariance: [f32; COV_LEN],
    pub reset_counter: u8,
    pub estimator_type: u8,
}

/// Outcome of one emit attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmitOutcome {
    /// Fusion gate was inactive; nothing was built or written.
    NotReady,
    /// Record encoded and handed to the output channel.
    Sent { bytes: usize },
}

/// Failures on the encode/write path. Gating is not an error — see
/// [`EmitOutcome::NotReady`].
#[derive(Error, Debug)]
pub enum OdometryError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("output write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// External codec boundary: turn a populated record into wire bytes.
pub trait OdometryEncoder {
    fn encode(&mut self, record: &OdometryRecord) -> Result<Vec<u8>, OdometryError>;
}

/// Newline-delimited JSON codec. Not a telemetry wire format — a readable
/// stand-in for the real encoder in tests and the demo binary.
#[derive(Clone, Debug, Default)]
pub struct JsonEncoder;

impl OdometryEncoder for JsonEncoder {
    fn encode(&mut self, record: &OdometryRecord) -> Result<Vec<u8>, OdometryError> {
        let mut buf = serde_json::to_vec(record)
            .map_err(|e| OdometryError::Encode(e.to_string()))?;
        buf.push(b'\n');
        Ok(buf)
    }
}
