use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{BAD_VELOCITY, BOTTOM_TRACK_FIELD_COUNT};

/// Per-bin, per-beam array, indexed `[bin][beam]`
pub type BinBeam = Vec<Vec<f32>>;

/// Scalar metadata carried by every ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleInfo {
    /// Sequence number assigned by the instrument
    pub ensemble_number: u32,
    /// Number of depth bins
    pub num_bins: usize,
    /// Number of beams
    pub num_beams: usize,
    /// Pings the instrument was asked to average
    pub desired_ping_count: u32,
    /// Pings actually averaged
    pub actual_ping_count: u32,
    /// Time of the first ping in seconds
    pub first_ping_time: f32,
    /// Time of the last ping in seconds
    pub last_ping_time: f32,
    /// Number of ensembles folded into this one (0 for a raw ensemble)
    #[serde(default)]
    pub averaged_count: u32,
    /// Wall-clock time the average was published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub averaged_at: Option<DateTime<Utc>>,
}

impl EnsembleInfo {
    pub fn new(ensemble_number: u32, num_bins: usize, num_beams: usize) -> Self {
        Self {
            ensemble_number,
            num_bins,
            num_beams,
            desired_ping_count: 1,
            actual_ping_count: 1,
            first_ping_time: 0.0,
            last_ping_time: 0.0,
            averaged_count: 0,
            averaged_at: None,
        }
    }
}

/// Bottom-track record: one value per beam for each field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BottomTrack {
    pub range: Vec<f32>,
    pub snr: Vec<f32>,
    pub amplitude: Vec<f32>,
    pub correlation: Vec<f32>,
    pub beam_velocity: Vec<f32>,
    pub instrument_velocity: Vec<f32>,
    pub earth_velocity: Vec<f32>,
}

impl BottomTrack {
    /// Bottom track with every field set to the sentinel
    pub fn bad(num_beams: usize) -> Self {
        let row = vec![BAD_VELOCITY; num_beams];
        Self {
            range: row.clone(),
            snr: row.clone(),
            amplitude: row.clone(),
            correlation: row.clone(),
            beam_velocity: row.clone(),
            instrument_velocity: row.clone(),
            earth_velocity: row,
        }
    }

    /// Flatten into a `[field][beam]` array so it averages like any other channel
    pub fn to_rows(&self) -> BinBeam {
        vec![
            self.range.clone(),
            self.snr.clone(),
            self.amplitude.clone(),
            self.correlation.clone(),
            self.beam_velocity.clone(),
            self.instrument_velocity.clone(),
            self.earth_velocity.clone(),
        ]
    }

    /// Inverse of [`BottomTrack::to_rows`]. Extra rows are ignored, missing rows change nothing.
    pub fn set_rows(&mut self, rows: BinBeam) {
        let fields = [
            &mut self.range,
            &mut self.snr,
            &mut self.amplitude,
            &mut self.correlation,
            &mut self.beam_velocity,
            &mut self.instrument_velocity,
            &mut self.earth_velocity,
        ];
        debug_assert_eq!(fields.len(), BOTTOM_TRACK_FIELD_COUNT);
        for (field, row) in fields.into_iter().zip(rows) {
            *field = row;
        }
    }

    pub fn num_beams(&self) -> usize {
        self.range.len()
    }
}

/// One measurement record from the instrument
///
/// Every channel is optional; an absent channel is skipped by the
/// averagers. `Clone` copies every array, so a cloned ensemble never
/// shares storage with the original.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ensemble {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<EnsembleInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amplitude: Option<BinBeam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<BinBeam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beam_velocity: Option<BinBeam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_velocity: Option<BinBeam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earth_velocity: Option<BinBeam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom_track: Option<BottomTrack>,
}

impl Ensemble {
    pub fn new(info: EnsembleInfo) -> Self {
        Self {
            info: Some(info),
            ..Self::default()
        }
    }

    pub fn with_channel(mut self, kind: ChannelKind, data: BinBeam) -> Self {
        kind.store(&mut self, data);
        self
    }

    pub fn with_bottom_track(mut self, bottom_track: BottomTrack) -> Self {
        self.bottom_track = Some(bottom_track);
        self
    }

    pub fn ensemble_number(&self) -> Option<u32> {
        self.info.as_ref().map(|i| i.ensemble_number)
    }

    pub fn first_ping_time(&self) -> Option<f32> {
        self.info.as_ref().map(|i| i.first_ping_time)
    }

    pub fn has(&self, kind: ChannelKind) -> bool {
        match kind {
            ChannelKind::BottomTrack => self.bottom_track.is_some(),
            _ => kind.slot(self).is_some(),
        }
    }
}

/// The averaged physical quantities of an ensemble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Amplitude,
    Correlation,
    BeamVelocity,
    InstrumentVelocity,
    EarthVelocity,
    BottomTrack,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 6] = [
        ChannelKind::Amplitude,
        ChannelKind::Correlation,
        ChannelKind::BeamVelocity,
        ChannelKind::InstrumentVelocity,
        ChannelKind::EarthVelocity,
        ChannelKind::BottomTrack,
    ];

    fn slot(self, ensemble: &Ensemble) -> Option<&BinBeam> {
        match self {
            Self::Amplitude => ensemble.amplitude.as_ref(),
            Self::Correlation => ensemble.correlation.as_ref(),
            Self::BeamVelocity => ensemble.beam_velocity.as_ref(),
            Self::InstrumentVelocity => ensemble.instrument_velocity.as_ref(),
            Self::EarthVelocity => ensemble.earth_velocity.as_ref(),
            Self::BottomTrack => None,
        }
    }

    fn slot_mut(self, ensemble: &mut Ensemble) -> Option<&mut Option<BinBeam>> {
        match self {
            Self::Amplitude => Some(&mut ensemble.amplitude),
            Self::Correlation => Some(&mut ensemble.correlation),
            Self::BeamVelocity => Some(&mut ensemble.beam_velocity),
            Self::InstrumentVelocity => Some(&mut ensemble.instrument_velocity),
            Self::EarthVelocity => Some(&mut ensemble.earth_velocity),
            Self::BottomTrack => None,
        }
    }

    /// Copy of this channel's array, `None` when the ensemble lacks it
    pub fn sample(self, ensemble: &Ensemble) -> Option<BinBeam> {
        match self {
            Self::BottomTrack => ensemble.bottom_track.as_ref().map(BottomTrack::to_rows),
            _ => self.slot(ensemble).cloned(),
        }
    }

    /// Overwrite this channel in `ensemble` if it is present.
    /// Returns false when the ensemble has no such channel.
    pub fn overwrite(self, ensemble: &mut Ensemble, data: BinBeam) -> bool {
        if self == Self::BottomTrack {
            return match ensemble.bottom_track.as_mut() {
                Some(bt) => {
                    bt.set_rows(data);
                    true
                }
                None => false,
            };
        }
        match self.slot_mut(ensemble).and_then(Option::as_mut) {
            Some(slot) => {
                *slot = data;
                true
            }
            None => false,
        }
    }

    /// Replace every cell of this channel with the sentinel, keeping its shape
    pub fn fill_bad(self, ensemble: &mut Ensemble) -> bool {
        match self.sample(ensemble) {
            Some(current) => {
                let bad = current
                    .iter()
                    .map(|row| vec![BAD_VELOCITY; row.len()])
                    .collect();
                self.overwrite(ensemble, bad)
            }
            None => false,
        }
    }

    /// Set this channel regardless of whether it was present
    pub fn store(self, ensemble: &mut Ensemble, data: BinBeam) {
        match self {
            Self::BottomTrack => {
                let num_beams = data.first().map_or(0, Vec::len);
                ensemble
                    .bottom_track
                    .get_or_insert_with(|| BottomTrack::bad(num_beams))
                    .set_rows(data);
            }
            _ => {
                if let Some(slot) = self.slot_mut(ensemble) {
                    *slot = Some(data);
                }
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Amplitude => "amplitude",
            Self::Correlation => "correlation",
            Self::BeamVelocity => "beam velocity",
            Self::InstrumentVelocity => "instrument velocity",
            Self::EarthVelocity => "earth velocity",
            Self::BottomTrack => "bottom track",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
