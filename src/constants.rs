//! Numeric constants shared by the averaging engine
//!
//! The sentinel marks "no valid measurement" in every channel. It is
//! compared exactly, never with a tolerance.

/// Reserved value for a cell without a valid measurement.
/// Used by velocity, amplitude, correlation and bottom-track arrays alike.
pub const BAD_VELOCITY: f32 = 88.888;

/// Window size substituted when a window of zero samples is requested.
pub const DEFAULT_WINDOW_SIZE: usize = 2;

/// Number of components in a reference-layer vector (east, north, vertical).
pub const REFERENCE_COMPONENTS: usize = 3;

/// Number of per-beam fields in a bottom-track record.
pub const BOTTOM_TRACK_FIELD_COUNT: usize = 7;

/// Returns true when `value` is the sentinel.
#[inline]
pub fn is_bad(value: f32) -> bool {
    value == BAD_VELOCITY
}
