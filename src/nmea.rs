//! GNSS sentence parser.
//!
//! Decodes the two sentence kinds the receiver actually feeds us — GGA
//! (position + quality) and RMC (speed + course) — into structured values.
//! Everything else, including malformed lines, is ignored without error:
//! upstream serial text is noisy and partial sentences are routine.
//!
//! A sentence parses fully or not at all; callers only ever see a committed
//! [`Sentence`] value, never a half-written field group.

/// Knots to m/s.
pub const KNOTS_TO_MS: f64 = 0.514444;

/// Shortest line worth looking at.
const MIN_SENTENCE_LEN: usize = 10;

/// GGA carries 14 comma-delimited fields; RMC carries 12.
const GGA_MAX_FIELDS: usize = 16;
const RMC_MAX_FIELDS: usize = 13;

const GGA_MIN_FIELDS: usize = 11;
const RMC_MIN_FIELDS: usize = 9;

/// A fully parsed sentence, ready to be applied to the fix.
#[derive(Clone, Debug, PartialEq)]
pub enum Sentence {
    /// Position fix: `$GPGGA` / `$GNGGA`.
    Gga {
        /// Signed decimal degrees.
        latitude: f64,
        /// Signed decimal degrees.
        longitude: f64,
        /// Receiver quality code (0 = no fix).
        quality: i32,
        /// Meters above mean sea level.
        altitude: f64,
    },
    /// Course and speed over ground: `$GPRMC` / `$GNRMC`.
    Rmc {
        /// Ground speed in m/s (converted from knots).
        speed_ms: f64,
        /// Course over ground in degrees.
        course_deg: f64,
    },
}

/// Parse one line of receiver text.
///
/// Returns `None` for unrecognized tags, short lines, insufficient fields,
/// or values that fail their sanity checks.
pub fn parse(line: &str) -> Option<Sentence> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.len() < MIN_SENTENCE_LEN {
        return None;
    }

    if line.starts_with("$GPGGA") || line.starts_with("$GNGGA") {
        parse_gga(line)
    } else if line.starts_with("$GPRMC") || line.starts_with("$GNRMC") {
        parse_rmc(line)
    } else {
        None
    }
}

/// `$GPGGA,time,ddmm.mmmm,N,dddmm.mmmm,E,quality,sats,hdop,alt,M,...`
fn parse_gga(line: &str) -> Option<Sentence> {
    let fields: Vec<&str> = line.splitn(GGA_MAX_FIELDS, ',').collect();
    if fields.len() < GGA_MIN_FIELDS {
        return None;
    }

    let lat_str = fields[2];
    let lat_hemi = fields[3];
    let lon_str = fields[4];
    let lon_hemi = fields[5];

    let mut latitude = ddmm_to_degrees(lat_str, 2)?;
    if lat_hemi == "S" {
        latitude = -latitude;
    }
    let mut longitude = ddmm_to_degrees(lon_str, 3)?;
    if lon_hemi == "W" {
        longitude = -longitude;
    }

    // Receiver firmware emits empty or garbage quality/altitude fields during
    // acquisition; both decay to zero rather than killing the sentence.
    let quality: i32 = fields[6].trim().parse().unwrap_or(0);
    let altitude: f64 = fields[9].trim().parse().unwrap_or(0.0);

    Some(Sentence::Gga { latitude, longitude, quality, altitude })
}

/// `$GPRMC,time,status,ddmm.mmmm,N,dddmm.mmmm,E,speed_kn,course,...`
fn parse_rmc(line: &str) -> Option<Sentence> {
    let fields: Vec<&str> = line.splitn(RMC_MAX_FIELDS, ',').collect();
    if fields.len() < RMC_MIN_FIELDS {
        return None;
    }

    let speed_str = fields[7];
    let course_str = fields[8];
    if speed_str.is_empty() || course_str.is_empty() {
        return None;
    }

    let speed_kn: f64 = speed_str.trim().parse().ok()?;
    let course_deg: f64 = course_str.trim().parse().ok()?;

    Some(Sentence::Rmc { speed_ms: speed_kn * KNOTS_TO_MS, course_deg })
}

/// Convert a `d..dmm.mmmm` string to decimal degrees.
///
/// `deg_width` is 2 for latitude, 3 for longitude. The string must carry at
/// least the degree digits plus two minute digits, matching the receiver's
/// fixed-width encoding; anything shorter skips the whole update.
fn ddmm_to_degrees(s: &str, deg_width: usize) -> Option<f64> {
    if s.len() <= deg_width + 2 {
        return None;
    }
    let deg: f64 = s.get(..deg_width)?.parse().ok()?;
    let min: f64 = s.get(deg_width..)?.parse().ok()?;
    Some(deg + min / 60.0)
}
