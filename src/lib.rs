//! GNSS/AHRS fusion bridge.
//!
//! Fuses two independently-clocked sensor streams — GNSS receiver text
//! sentences and an externally-fused attitude stream — into a freshness-gated
//! pose-and-velocity estimate, emitted as a fixed-shape odometry telemetry
//! record.
//!
//! The core ([`fusion::FusionCore`]) is pure and transport-free: callers push
//! data with explicit monotonic timestamps, so everything is replayable and
//! testable with simulated time. Transports, byte-level telemetry framing,
//! and output sinks live outside; [`odometry::OdometryEncoder`] is the codec
//! seam.

pub mod fusion;
pub mod nmea;
pub mod odometry;
pub mod sensors;
pub mod status;
pub mod types;

pub use fusion::{FusionCore, FusionStatus, SentenceOutcome};
pub use nmea::Sentence;
pub use odometry::{EmitOutcome, JsonEncoder, OdometryEncoder, OdometryError, OdometryRecord};
pub use status::FusionSnapshot;
pub use types::{AttitudeSample, DeviceTicks, FusionConfig, GnssFix, MonotonicMs};
