//! Reference-layer averaging of earth velocity
//!
//! Each ensemble's mean velocity over a trusted band of bins (the
//! reference layer) is subtracted before averaging and the averaged
//! reference is added back afterwards. This removes the common-mode
//! platform motion that otherwise dominates the bin-to-bin variance.
//!
//! Residuals are averaged with an independent contribution count per
//! cell, so a bin missing from some ensembles still gets a value from the
//! ensembles that did reach it.

use super::normalize_window_size;
use super::queue::SampleQueue;
use crate::constants::{BAD_VELOCITY, REFERENCE_COMPONENTS, is_bad};
use crate::ensemble::{BinBeam, ChannelKind, Ensemble};
use crate::error::{AverageError, Result};

/// East, north and vertical reference velocity
pub type ReferenceVector = [f32; REFERENCE_COMPONENTS];

/// Mean velocity of each component over `[min_bin, max_bin]`
///
/// The range is clipped to the bins present. Sentinel cells do not
/// contribute; a component with no valid cell yields 0.0.
pub fn reference_vector(velocity: &[Vec<f32>], min_bin: usize, max_bin: usize) -> ReferenceVector {
    let mut reference = [0.0; REFERENCE_COMPONENTS];
    let Some(last_bin) = velocity.len().checked_sub(1) else {
        return reference;
    };
    let first = min_bin.min(last_bin);
    let last = max_bin.min(last_bin).max(first);

    for (component, value) in reference.iter_mut().enumerate() {
        let (sum, count) = velocity[first..=last]
            .iter()
            .filter_map(|row| row.get(component).copied())
            .filter(|v| !is_bad(*v))
            .fold((0.0_f32, 0_u32), |(sum, count), v| (sum + v, count + 1));

        if count > 0 {
            *value = sum / count as f32;
        }
    }

    reference
}

/// Shift every valid cell of the reference components by `sign * reference`
fn shift_by_reference(velocity: &mut BinBeam, reference: &ReferenceVector, sign: f32) {
    for row in velocity.iter_mut() {
        for (value, r) in row.iter_mut().zip(reference) {
            if !is_bad(*value) {
                *value += sign * r;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReferenceLayerAverager {
    residuals: SampleQueue<BinBeam>,
    references: SampleQueue<ReferenceVector>,
    window_size: usize,
    running_average: bool,
    min_bin: usize,
    max_bin: usize,
}

impl ReferenceLayerAverager {
    /// # Arguments
    /// * `window_size` - Samples per average (0 falls back to the default)
    /// * `running_average` - Slide the window instead of clearing it
    /// * `min_bin`, `max_bin` - Inclusive reference layer, a lower `max_bin` is raised to `min_bin`
    pub fn new(
        window_size: usize,
        running_average: bool,
        min_bin: usize,
        max_bin: usize,
    ) -> Self {
        Self {
            residuals: SampleQueue::new(),
            references: SampleQueue::new(),
            window_size: normalize_window_size(window_size),
            running_average,
            min_bin,
            max_bin: max_bin.max(min_bin),
        }
    }

    /// Subtract this ensemble's reference layer and queue the residual
    ///
    /// Needs earth velocity and ensemble info; returns false otherwise.
    pub fn add_sample(&mut self, ensemble: &Ensemble) -> bool {
        if ensemble.info.is_none() {
            return false;
        }
        let Some(velocity) = ensemble.earth_velocity.as_ref() else {
            return false;
        };

        let reference = reference_vector(velocity, self.min_bin, self.max_bin);
        let mut residual = velocity.clone();
        shift_by_reference(&mut residual, &reference, -1.0);

        self.residuals.push(residual);
        self.references.push(reference);
        log::trace!(
            "reference layer: queued residual, reference {:?}, window {}",
            reference,
            self.residuals.len()
        );

        if self.residuals.len() > self.window_size {
            if self.running_average {
                self.evict_oldest();
            } else {
                self.clear();
            }
        }

        true
    }

    /// Average the queued residuals and restore the averaged reference
    ///
    /// The output takes the shape of the newest residual. The reference is
    /// averaged over the configured window size, not the queue length, so a
    /// partly filled window yields a damped correction.
    ///
    /// Residuals may reach fewer or more bins than the newest one, but a bin
    /// with a different beam count is a `ShapeMismatch`.
    pub fn average(&self) -> Result<Option<BinBeam>> {
        let Some(newest) = self.residuals.newest() else {
            return Ok(None);
        };

        let mut sum: Vec<Vec<f32>> = newest.iter().map(|row| vec![0.0; row.len()]).collect();
        let mut count: Vec<Vec<u32>> = newest.iter().map(|row| vec![0; row.len()]).collect();

        for residual in self.residuals.iter() {
            for ((sums, counts), row) in sum.iter_mut().zip(count.iter_mut()).zip(residual) {
                if row.len() != sums.len() {
                    return Err(AverageError::ShapeMismatch {
                        channel: ChannelKind::EarthVelocity,
                        expected_bins: newest.len(),
                        expected_beams: sums.len(),
                        found_bins: residual.len(),
                        found_beams: row.len(),
                    });
                }
                for ((s, c), &value) in sums.iter_mut().zip(counts.iter_mut()).zip(row) {
                    if !is_bad(value) {
                        *s += value;
                        *c += 1;
                    }
                }
            }
        }

        let mut avg: BinBeam = sum
            .iter()
            .zip(&count)
            .map(|(sums, counts)| {
                sums.iter()
                    .zip(counts)
                    .map(|(&s, &c)| if c > 0 { s / c as f32 } else { BAD_VELOCITY })
                    .collect()
            })
            .collect();

        let reference = self.average_reference();
        shift_by_reference(&mut avg, &reference, 1.0);

        Ok(Some(avg))
    }

    /// Component-wise mean of the queued reference vectors over the window size
    pub fn average_reference(&self) -> ReferenceVector {
        let mut reference = [0.0; REFERENCE_COMPONENTS];
        for r in self.references.iter() {
            for (acc, value) in reference.iter_mut().zip(r) {
                *acc += value;
            }
        }
        for value in reference.iter_mut() {
            *value /= self.window_size as f32;
        }
        reference
    }

    /// Overwrite the earth velocity of `target` with the scaled average
    ///
    /// # Returns
    /// true if the target had earth velocity and the window was not empty
    pub fn apply_average(&self, target: &mut Ensemble, scale: f32) -> Result<bool> {
        let Some(slot) = target.earth_velocity.as_mut() else {
            return Ok(false);
        };
        let Some(mut avg) = self.average()? else {
            return Ok(false);
        };

        for value in avg.iter_mut().flatten() {
            if !is_bad(*value) {
                *value *= scale;
            }
        }
        *slot = avg;
        Ok(true)
    }

    /// Drop the oldest residual and its reference once the window has filled
    pub fn evict_oldest(&mut self) -> bool {
        if self.residuals.len() >= self.window_size {
            self.residuals.pop_oldest();
            self.references.pop_oldest();
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.residuals.clear();
        self.references.clear();
    }

    /// Apply the eviction policy after a publish
    pub fn advance(&mut self) {
        if self.running_average {
            self.evict_oldest();
        } else {
            self.clear();
        }
    }

    /// Move the reference layer. Queued residuals were computed against the
    /// old layer, so they are discarded.
    pub fn set_reference_range(&mut self, min_bin: usize, max_bin: usize) {
        self.min_bin = min_bin;
        self.max_bin = max_bin.max(min_bin);
        self.clear();
    }

    pub fn reference_range(&self) -> (usize, usize) {
        (self.min_bin, self.max_bin)
    }

    pub fn len(&self) -> usize {
        self.residuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residuals.is_empty()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Residuals beyond the new size are dropped, oldest first
    pub fn set_window_size(&mut self, window_size: usize) {
        self.window_size = normalize_window_size(window_size);
        while self.residuals.len() > self.window_size {
            self.residuals.pop_oldest();
            self.references.pop_oldest();
        }
    }

    pub fn running_average(&self) -> bool {
        self.running_average
    }

    pub fn set_running_average(&mut self, running_average: bool) {
        self.running_average = running_average;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::EnsembleInfo;
    use approx::assert_abs_diff_eq;

    fn velocity_ensemble(velocity: BinBeam) -> Ensemble {
        let bins = velocity.len();
        Ensemble::new(EnsembleInfo::new(1, bins, 4))
            .with_channel(ChannelKind::EarthVelocity, velocity)
    }

    #[test]
    fn test_reference_vector_skips_sentinel() {
        let velocity = vec![
            vec![9.0, 9.0, 9.0, 0.0],
            vec![1.0, 2.0, BAD_VELOCITY, 0.0],
            vec![3.0, 4.0, BAD_VELOCITY, 0.0],
            vec![9.0, 9.0, 9.0, 0.0],
        ];
        let reference = reference_vector(&velocity, 1, 2);
        assert_abs_diff_eq!(reference[0], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(reference[1], 3.0, epsilon = 1e-6);
        assert_eq!(reference[2], 0.0);
    }

    #[test]
    fn test_reference_vector_clips_range() {
        let velocity = vec![vec![1.0, 1.0, 1.0], vec![5.0, 6.0, 7.0]];
        let reference = reference_vector(&velocity, 1, 40);
        assert_eq!(reference, [5.0, 6.0, 7.0]);

        let beyond = reference_vector(&velocity, 10, 20);
        assert_eq!(beyond, [5.0, 6.0, 7.0]);

        assert_eq!(reference_vector(&[], 0, 3), [0.0; 3]);
    }

    #[test]
    fn test_requires_info_and_earth_velocity() {
        let mut avg = ReferenceLayerAverager::new(2, false, 0, 1);
        let mut no_info = velocity_ensemble(vec![vec![1.0; 4]]);
        no_info.info = None;
        assert!(!avg.add_sample(&no_info));

        let no_velocity = Ensemble::new(EnsembleInfo::new(1, 1, 4));
        assert!(!avg.add_sample(&no_velocity));
        assert!(avg.is_empty());
        assert!(avg.average().unwrap().is_none());
    }

    #[test]
    fn test_inverted_range_is_raised() {
        let mut avg = ReferenceLayerAverager::new(2, false, 5, 2);
        assert_eq!(avg.reference_range(), (5, 5));
        avg.set_reference_range(3, 1);
        assert_eq!(avg.reference_range(), (3, 3));
    }

    #[test]
    fn test_sentinel_cells_are_not_shifted() {
        let mut avg = ReferenceLayerAverager::new(1, false, 0, 0);
        avg.add_sample(&velocity_ensemble(vec![
            vec![1.0, 1.0, 1.0, 0.5],
            vec![BAD_VELOCITY, 3.0, BAD_VELOCITY, 0.5],
        ]));

        let result = avg.average().unwrap().unwrap();
        assert_eq!(result[1][0], BAD_VELOCITY);
        assert_eq!(result[1][2], BAD_VELOCITY);
        assert_abs_diff_eq!(result[1][1], 3.0, epsilon = 1e-6);
        // Fourth component is not part of the reference layer
        assert_abs_diff_eq!(result[1][3], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_common_motion_is_removed_then_restored() {
        // Same profile, shifted by platform motion of +1 and -1
        let mut avg = ReferenceLayerAverager::new(2, false, 0, 1);
        let profile = |shift: f32| -> BinBeam {
            (0..4)
                .map(|bin| {
                    let v = bin as f32 * 0.1 + shift;
                    vec![v, v, v, 0.0]
                })
                .collect()
        };
        avg.add_sample(&velocity_ensemble(profile(1.0)));
        avg.add_sample(&velocity_ensemble(profile(-1.0)));

        let result = avg.average().unwrap().unwrap();
        for (bin, row) in result.iter().enumerate() {
            assert_abs_diff_eq!(row[0], bin as f32 * 0.1, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_partial_window_damps_reference() {
        let mut avg = ReferenceLayerAverager::new(4, false, 0, 0);
        avg.add_sample(&velocity_ensemble(vec![vec![2.0, 2.0, 2.0, 0.0]]));

        assert_abs_diff_eq!(avg.average_reference()[0], 0.5, epsilon = 1e-6);
        let result = avg.average().unwrap().unwrap();
        assert_abs_diff_eq!(result[0][0], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_overflow_follows_policy() {
        let sample = velocity_ensemble(vec![vec![1.0; 4]]);

        let mut running = ReferenceLayerAverager::new(2, true, 0, 0);
        let mut block = ReferenceLayerAverager::new(2, false, 0, 0);
        for _ in 0..3 {
            running.add_sample(&sample);
            block.add_sample(&sample);
        }

        assert_eq!(running.len(), 2);
        assert_eq!(block.len(), 0);
    }

    #[test]
    fn test_set_reference_range_clears_state() {
        let mut avg = ReferenceLayerAverager::new(2, true, 0, 0);
        avg.add_sample(&velocity_ensemble(vec![vec![1.0; 4]]));
        avg.set_reference_range(0, 2);
        assert!(avg.is_empty());
        assert_eq!(avg.average_reference(), [0.0; 3]);
    }

    #[test]
    fn test_apply_average_scales_valid_cells() {
        let mut avg = ReferenceLayerAverager::new(1, false, 0, 0);
        avg.add_sample(&velocity_ensemble(vec![vec![2.0, 4.0, BAD_VELOCITY, 1.0]]));

        let mut target = velocity_ensemble(vec![vec![0.0; 4]]);
        assert!(avg.apply_average(&mut target, 0.5).unwrap());
        assert_eq!(
            target.earth_velocity,
            Some(vec![vec![1.0, 2.0, BAD_VELOCITY, 0.5]])
        );

        let mut amplitude_only = Ensemble::new(EnsembleInfo::new(2, 1, 4))
            .with_channel(ChannelKind::Amplitude, vec![vec![0.0; 4]]);
        assert!(!avg.apply_average(&mut amplitude_only, 1.0).unwrap());
        assert!(amplitude_only.earth_velocity.is_none());
    }

    #[test]
    fn test_beam_count_mismatch_is_error() {
        let mut avg = ReferenceLayerAverager::new(2, false, 0, 0);
        avg.add_sample(&velocity_ensemble(vec![vec![1.0; 4]; 2]));
        avg.add_sample(&velocity_ensemble(vec![vec![1.0; 3]; 2]));

        match avg.average() {
            Err(AverageError::ShapeMismatch {
                channel,
                expected_beams,
                found_beams,
                ..
            }) => {
                assert_eq!(channel, ChannelKind::EarthVelocity);
                assert_eq!(expected_beams, 3);
                assert_eq!(found_beams, 4);
            }
            other => panic!("expected shape mismatch, got {:?}", other),
        }

        let mut target = velocity_ensemble(vec![vec![0.0; 3]; 2]);
        assert!(avg.apply_average(&mut target, 1.0).is_err());
        assert_eq!(target.earth_velocity, Some(vec![vec![0.0; 3]; 2]));
    }

    #[test]
    fn test_differing_bin_extent_is_not_error() {
        let mut avg = ReferenceLayerAverager::new(2, false, 0, 0);
        avg.add_sample(&velocity_ensemble(vec![vec![1.0; 4]; 5]));
        avg.add_sample(&velocity_ensemble(vec![vec![1.0; 4]; 3]));

        let result = avg.average().unwrap().unwrap();
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_shrinking_window_drops_oldest_pairs() {
        let mut avg = ReferenceLayerAverager::new(4, true, 0, 0);
        for v in [1.0, 2.0, 3.0, 4.0] {
            avg.add_sample(&velocity_ensemble(vec![vec![v, v, v, 0.0]]));
        }
        avg.set_window_size(2);

        assert_eq!(avg.len(), 2);
        assert_abs_diff_eq!(avg.average_reference()[0], 3.5, epsilon = 1e-6);
    }
}
