use crate::constants::{BAD_VELOCITY, is_bad};
use crate::ensemble::{BinBeam, ChannelKind};
use crate::error::{AverageError, Result};

/// Sentinel-aware running sum over same-shaped bin/beam arrays
///
/// Every cell keeps its own sum and count of valid contributions, so a
/// sentinel in one sample never drags the average toward zero. The first
/// sample after a reset fixes the shape; later samples must match it.
#[derive(Debug, Clone)]
pub struct BinBeamAccumulator {
    channel: ChannelKind,
    sum: Vec<Vec<f32>>,
    count: Vec<Vec<u32>>,
    samples: usize,
}

impl BinBeamAccumulator {
    /// Create an empty accumulator
    ///
    /// # Arguments
    /// * `channel` - Channel the samples belong to, reported on shape errors
    pub fn new(channel: ChannelKind) -> Self {
        Self {
            channel,
            sum: Vec::new(),
            count: Vec::new(),
            samples: 0,
        }
    }

    pub fn reset(&mut self) {
        self.sum.clear();
        self.count.clear();
        self.samples = 0;
    }

    /// Add one sample, skipping sentinel cells
    ///
    /// Returns [`AverageError::ShapeMismatch`] when the sample's shape differs
    /// from the first accumulated sample, or when its rows are ragged. The
    /// accumulator is left unchanged on error.
    pub fn accumulate(&mut self, sample: &[Vec<f32>]) -> Result<()> {
        let found_beams = sample.first().map_or(0, Vec::len);
        let (expected_bins, expected_beams) = if self.samples == 0 {
            (sample.len(), found_beams)
        } else {
            (self.num_bins(), self.num_beams())
        };

        if sample.len() != expected_bins {
            return Err(self.mismatch((expected_bins, expected_beams), (sample.len(), found_beams)));
        }
        if let Some(row) = sample.iter().find(|row| row.len() != expected_beams) {
            return Err(self.mismatch((expected_bins, expected_beams), (sample.len(), row.len())));
        }

        if self.samples == 0 {
            self.sum = vec![vec![0.0; expected_beams]; expected_bins];
            self.count = vec![vec![0; expected_beams]; expected_bins];
        }

        for (bin, row) in sample.iter().enumerate() {
            for (beam, &value) in row.iter().enumerate() {
                if !is_bad(value) {
                    self.sum[bin][beam] += value;
                    self.count[bin][beam] += 1;
                }
            }
        }
        self.samples += 1;

        Ok(())
    }

    fn mismatch(&self, expected: (usize, usize), found: (usize, usize)) -> AverageError {
        AverageError::ShapeMismatch {
            channel: self.channel,
            expected_bins: expected.0,
            expected_beams: expected.1,
            found_bins: found.0,
            found_beams: found.1,
        }
    }

    /// Render the average of everything accumulated so far
    ///
    /// # Returns
    /// `None` if nothing was accumulated, otherwise `(sum / count) * scale`
    /// per cell and [`BAD_VELOCITY`] for cells without a valid contribution.
    pub fn average(&self, scale: f32) -> Option<BinBeam> {
        if self.samples == 0 {
            return None;
        }

        let avg = self
            .sum
            .iter()
            .zip(&self.count)
            .map(|(sums, counts)| {
                sums.iter()
                    .zip(counts)
                    .map(|(&sum, &count)| {
                        if count > 0 {
                            (sum / count as f32) * scale
                        } else {
                            BAD_VELOCITY
                        }
                    })
                    .collect()
            })
            .collect();

        Some(avg)
    }

    /// Average a whole collection in one pass
    pub fn average_all<'a, I>(
        channel: ChannelKind,
        samples: I,
        scale: f32,
    ) -> Result<Option<BinBeam>>
    where
        I: IntoIterator<Item = &'a BinBeam>,
    {
        let mut acc = Self::new(channel);
        for sample in samples {
            acc.accumulate(sample)?;
        }
        Ok(acc.average(scale))
    }

    /// Number of valid contributions at a cell
    pub fn count(&self, bin: usize, beam: usize) -> u32 {
        self.count
            .get(bin)
            .and_then(|row| row.get(beam))
            .copied()
            .unwrap_or(0)
    }

    /// Number of samples accumulated since the last reset
    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn num_bins(&self) -> usize {
        self.sum.len()
    }

    pub fn num_beams(&self) -> usize {
        self.sum.first().map_or(0, Vec::len)
    }
}
