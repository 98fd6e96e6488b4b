//! Time representation for presentation timestamps.
//! Unit timestamps and the playback clock are both plain seconds (f64), which is
//! what the scheduler compares against `Instant::elapsed`.

use std::time::Duration;

/// Seconds since the start of the container
pub type Seconds = f64;

/// Time zero constant
pub const ZERO: Seconds = 0.0;

/// Convert a stream timestamp expressed in a rational time base to seconds.
/// FFmpeg uses `timestamp * (num / den) = seconds`.
#[inline]
pub fn from_rational(pts: i64, num: i32, den: i32) -> Seconds {
    if den == 0 {
        return ZERO;
    }
    // i128 so that large pts values with large numerators cannot overflow
    let scaled = pts as i128 * num as i128;
    scaled as f64 / den as f64
}

/// Convert a wall-clock duration to seconds
#[inline]
pub fn from_duration(duration: Duration) -> Seconds {
    duration.as_secs_f64()
}

/// Format time as HH:MM:SS.mmm
pub fn format_time(seconds: Seconds) -> String {
    let total_millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis / 60_000) % 60;
    let secs = (total_millis / 1000) % 60;
    let millis = total_millis % 1000;

    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
}
