use super::accumulator::BinBeamAccumulator;
use super::normalize_window_size;
use super::queue::SampleQueue;
use crate::ensemble::{BinBeam, ChannelKind, Ensemble};
use crate::error::Result;

/// Temporal averager for one channel of the ensemble
///
/// Keeps a window of raw samples and averages them on demand. Whether the
/// window slides or restarts after a publish is decided by
/// `running_average` through [`ChannelAverager::advance`].
#[derive(Debug, Clone)]
pub struct ChannelAverager {
    kind: ChannelKind,
    window: SampleQueue<BinBeam>,
    accumulator: BinBeamAccumulator,
    window_size: usize,
    running_average: bool,
}

impl ChannelAverager {
    /// # Arguments
    /// * `kind` - Channel read from and written to each ensemble
    /// * `window_size` - Samples per average (0 falls back to the default)
    /// * `running_average` - Slide the window instead of clearing it after a publish
    pub fn new(kind: ChannelKind, window_size: usize, running_average: bool) -> Self {
        let window_size = normalize_window_size(window_size);
        Self {
            kind,
            window: SampleQueue::with_capacity(window_size + 1),
            accumulator: BinBeamAccumulator::new(kind),
            window_size,
            running_average,
        }
    }

    /// Queue this channel's data from `ensemble`.
    /// Returns false and does nothing when the ensemble lacks the channel.
    pub fn add_sample(&mut self, ensemble: &Ensemble) -> bool {
        match self.kind.sample(ensemble) {
            Some(data) => {
                self.window.push(data);
                log::trace!("{}: queued sample, window {}", self.kind, self.window.len());
                true
            }
            None => false,
        }
    }

    /// Average the current window, `None` when it is empty
    pub fn average(&mut self, scale: f32) -> Result<Option<BinBeam>> {
        self.accumulator.reset();
        for sample in self.window.iter() {
            self.accumulator.accumulate(sample)?;
        }
        Ok(self.accumulator.average(scale))
    }

    /// Write the average into `target`
    ///
    /// # Returns
    /// true if the target carried this channel and a non-empty average was written
    pub fn apply_average(&mut self, target: &mut Ensemble, scale: f32) -> Result<bool> {
        if !target.has(self.kind) {
            return Ok(false);
        }
        match self.average(scale)? {
            Some(avg) => Ok(self.kind.overwrite(target, avg)),
            None => Ok(false),
        }
    }

    /// Drop the oldest sample once the window has filled
    pub fn evict_oldest(&mut self) -> bool {
        if self.window.len() >= self.window_size {
            self.window.pop_oldest();
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }

    /// Apply the eviction policy after a publish
    pub fn advance(&mut self) {
        if self.running_average {
            self.evict_oldest();
        } else {
            self.clear();
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Samples beyond the new size are dropped, oldest first
    pub fn set_window_size(&mut self, window_size: usize) {
        self.window_size = normalize_window_size(window_size);
        while self.window.len() > self.window_size {
            self.window.pop_oldest();
        }
    }

    pub fn running_average(&self) -> bool {
        self.running_average
    }

    pub fn set_running_average(&mut self, running_average: bool) {
        self.running_average = running_average;
    }
}
