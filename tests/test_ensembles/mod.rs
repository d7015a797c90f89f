#![allow(dead_code)]

use adcp_average::Ensemble;
use adcp_average::constants::BAD_VELOCITY;
use adcp_average::ensemble::{BinBeam, ChannelKind, EnsembleInfo};

/// Ensemble with one channel and ping timing set
pub fn ensemble(number: u32, kind: ChannelKind, data: BinBeam, ping_time: f32) -> Ensemble {
    let num_bins = data.len();
    let num_beams = data.first().map_or(0, |row| row.len());
    let mut info = EnsembleInfo::new(number, num_bins, num_beams);
    info.first_ping_time = ping_time;
    info.last_ping_time = ping_time;
    Ensemble::new(info).with_channel(kind, data)
}

/// Single bin carrying `values` across the beams
pub fn single_bin(values: &[f32]) -> BinBeam {
    vec![values.to_vec()]
}

/// `num_bins` bins of earth velocity, valid up to `valid_bins` and sentinel beyond
pub fn earth_profile(
    num_bins: usize,
    valid_bins: usize,
    value: impl Fn(usize) -> [f32; 4],
) -> BinBeam {
    (0..num_bins)
        .map(|bin| {
            if bin < valid_bins {
                value(bin).to_vec()
            } else {
                vec![BAD_VELOCITY; 4]
            }
        })
        .collect()
}
