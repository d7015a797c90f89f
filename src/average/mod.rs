pub mod accumulator;
pub mod channel;
pub mod manager;
pub mod queue;
pub mod reference_layer;

pub use accumulator::BinBeamAccumulator;
pub use channel::ChannelAverager;
pub use manager::{AverageManager, Subscriber, SubscriptionId};
pub use queue::SampleQueue;
pub use reference_layer::{ReferenceLayerAverager, ReferenceVector, reference_vector};

use crate::constants::DEFAULT_WINDOW_SIZE;

/// Window of zero samples falls back to [`DEFAULT_WINDOW_SIZE`]
pub(crate) fn normalize_window_size(window_size: usize) -> usize {
    if window_size == 0 {
        DEFAULT_WINDOW_SIZE
    } else {
        window_size
    }
}
