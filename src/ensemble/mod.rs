pub mod frame;
pub mod source;

pub use frame::{BinBeam, BottomTrack, ChannelKind, Ensemble, EnsembleInfo};
pub use source::{ChainedSource, EnsembleSource, JsonLinesSource, MemorySource};
