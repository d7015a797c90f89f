use rolling_stats::Stats;
use serde::Serialize;

use crate::constants::is_bad;
use crate::ensemble::{BinBeam, Ensemble};

/// Error of a measured earth-velocity profile against the true one
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ProfileError {
    /// Valid horizontal components compared
    pub count: usize,
    /// Horizontal components that were bad
    pub missing: usize,
    pub mean_abs: f32,
    pub rms: f32,
    pub max_abs: f32,
}

impl ProfileError {
    /// Fraction of compared components that carried data
    pub fn coverage(&self) -> f32 {
        let total = self.count + self.missing;
        if total == 0 {
            0.0
        } else {
            self.count as f32 / total as f32
        }
    }
}

/// Compare east and north earth velocity of `ensemble` with `truth`
///
/// Bins deeper than `truth` are ignored.
pub fn profile_error(ensemble: &Ensemble, truth: &BinBeam) -> ProfileError {
    let Some(velocity) = ensemble.earth_velocity.as_ref() else {
        return ProfileError::default();
    };

    let mut abs_stats: Stats<f32> = Stats::new();
    let mut squared_stats: Stats<f32> = Stats::new();
    let mut missing = 0;

    for (measured, expected) in velocity.iter().zip(truth) {
        for (&m, &e) in measured.iter().zip(expected).take(2) {
            if is_bad(m) {
                missing += 1;
                continue;
            }
            let err = (m - e).abs();
            abs_stats.update(err);
            squared_stats.update(err * err);
        }
    }

    if abs_stats.count == 0 {
        return ProfileError {
            missing,
            ..ProfileError::default()
        };
    }

    ProfileError {
        count: abs_stats.count,
        missing,
        mean_abs: abs_stats.mean,
        rms: squared_stats.mean.sqrt(),
        max_abs: abs_stats.max,
    }
}
