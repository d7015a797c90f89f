use rand::RngExt;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;

use crate::constants::BAD_VELOCITY;
use crate::ensemble::{BinBeam, BottomTrack, ChannelKind, Ensemble, EnsembleInfo, EnsembleSource};
use crate::error::{AverageError, Result};

/// Janus beam angle from vertical
const BEAM_ANGLE_DEGREES: f32 = 20.0;

/// Synthetic current profile and instrument behaviour
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub num_bins: usize,
    pub num_beams: usize,
    /// Bin size in metres, used for bottom-track range
    pub bin_size_m: f32,
    /// East and north current at the first bin in m/s
    pub surface_current: [f32; 2],
    /// Change of the current per bin in m/s
    pub shear_per_bin: [f32; 2],
    /// Standard deviation of the per-ensemble platform motion step in m/s
    pub platform_drift_std: f32,
    /// Standard deviation of the per-cell measurement noise in m/s
    pub noise_std: f32,
    /// Chance that any one cell is dropped (sentinel)
    pub dropout_probability: f32,
    /// Fewest bins with valid data; each ensemble reaches a random depth at or beyond this
    pub min_valid_bins: usize,
    /// Seconds between ensembles
    pub ensemble_interval_s: f32,
    pub pings_per_ensemble: u32,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_bins: 30,
            num_beams: 4,
            bin_size_m: 1.0,
            surface_current: [0.5, 0.2],
            shear_per_bin: [-0.01, 0.005],
            platform_drift_std: 0.05,
            noise_std: 0.1,
            dropout_probability: 0.02,
            min_valid_bins: 20,
            ensemble_interval_s: 1.0,
            pings_per_ensemble: 1,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_noise(mut self, noise_std: f32) -> Self {
        self.noise_std = noise_std;
        self
    }

    pub fn with_platform_drift(mut self, platform_drift_std: f32) -> Self {
        self.platform_drift_std = platform_drift_std;
        self
    }

    pub fn with_dropouts(mut self, dropout_probability: f32) -> Self {
        self.dropout_probability = dropout_probability;
        self
    }
}

/// Earth velocity without noise or platform motion: east, north, vertical, error
pub fn true_profile(config: &SimulationConfig) -> BinBeam {
    (0..config.num_bins)
        .map(|bin| {
            let b = bin as f32;
            vec![
                config.surface_current[0] + config.shear_per_bin[0] * b,
                config.surface_current[1] + config.shear_per_bin[1] * b,
                0.0,
                0.0,
            ]
        })
        .collect()
}

fn create_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => rand::make_rng(),
    }
}

fn normal(std_dev: f32, what: &str) -> Result<Normal<f64>> {
    Normal::new(0.0, std_dev as f64)
        .map_err(|e| AverageError::Config(format!("invalid {} {}: {}", what, std_dev, e)))
}

/// Produces ensembles measuring a fixed current profile from a drifting platform
pub struct EnsembleGenerator {
    config: SimulationConfig,
    truth: BinBeam,
    rng: ChaCha8Rng,
    noise: Normal<f64>,
    drift_step: Normal<f64>,
    drift: [f32; 3],
    number: u32,
    remaining: Option<usize>,
}

impl EnsembleGenerator {
    pub fn new(config: &SimulationConfig) -> Result<Self> {
        if config.num_beams == 0 || config.num_bins == 0 {
            return Err(AverageError::Config(
                "simulation needs at least one bin and one beam".to_string(),
            ));
        }
        Ok(Self {
            truth: true_profile(config),
            rng: create_rng(config.seed),
            noise: normal(config.noise_std, "noise std")?,
            drift_step: normal(config.platform_drift_std, "platform drift std")?,
            drift: [0.0; 3],
            number: 0,
            remaining: None,
            config: config.clone(),
        })
    }

    /// Stop after `count` ensembles when used as an [`EnsembleSource`]
    pub fn limit(mut self, count: usize) -> Self {
        self.remaining = Some(count);
        self
    }

    pub fn truth(&self) -> &BinBeam {
        &self.truth
    }

    pub fn generate(&mut self) -> Ensemble {
        self.number += 1;
        for d in self.drift.iter_mut() {
            *d = 0.9 * *d + self.drift_step.sample(&mut self.rng) as f32;
        }

        let cfg = &self.config;
        let beams = cfg.num_beams;
        let valid_bins = if cfg.min_valid_bins >= cfg.num_bins {
            cfg.num_bins
        } else {
            let extra = cfg.num_bins - cfg.min_valid_bins;
            let reach = (self.rng.random::<f32>() * (extra + 1) as f32) as usize;
            cfg.min_valid_bins + reach.min(extra)
        };

        let (sin_a, cos_a) = BEAM_ANGLE_DEGREES.to_radians().sin_cos();
        let mut earth = vec![vec![BAD_VELOCITY; beams]; cfg.num_bins];
        let mut beam_vel = earth.clone();
        let mut amplitude = earth.clone();
        let mut correlation = earth.clone();

        for bin in 0..valid_bins {
            if self.rng.random::<f32>() < cfg.dropout_probability {
                continue;
            }
            let truth = &self.truth[bin];
            let measured: Vec<f32> = (0..4)
                .map(|c| {
                    let platform = if c < 3 { self.drift[c] } else { 0.0 };
                    truth[c] + platform + self.noise.sample(&mut self.rng) as f32
                })
                .collect();
            let [east, north, up, error] = [measured[0], measured[1], measured[2], measured[3]];
            let along = [
                east * sin_a + up * cos_a,
                -east * sin_a + up * cos_a,
                north * sin_a + up * cos_a,
                -north * sin_a + up * cos_a,
            ];

            for beam in 0..beams {
                earth[bin][beam] = [east, north, up, error].get(beam).copied().unwrap_or(0.0);
                beam_vel[bin][beam] = along[beam % 4];
                amplitude[bin][beam] = 80.0 - 1.5 * bin as f32 + self.rng.random::<f32>();
                correlation[bin][beam] = (0.95 - 0.01 * bin as f32).max(0.1);
            }
        }

        let depth = cfg.num_bins as f32 * cfg.bin_size_m;
        let mut bottom_track = BottomTrack::bad(beams);
        bottom_track.range = (0..beams)
            .map(|_| depth + self.noise.sample(&mut self.rng) as f32)
            .collect();
        bottom_track.snr = vec![30.0; beams];
        bottom_track.amplitude = vec![90.0; beams];
        bottom_track.correlation = vec![0.98; beams];
        bottom_track.earth_velocity = (0..beams)
            .map(|beam| if beam < 3 { -self.drift[beam] } else { 0.0 })
            .collect();
        bottom_track.instrument_velocity = bottom_track.earth_velocity.clone();

        let start = (self.number - 1) as f32 * cfg.ensemble_interval_s;
        let mut info = EnsembleInfo::new(self.number, cfg.num_bins, beams);
        info.desired_ping_count = cfg.pings_per_ensemble;
        info.actual_ping_count = cfg.pings_per_ensemble;
        info.first_ping_time = start;
        info.last_ping_time = start + cfg.ensemble_interval_s * 0.9;

        Ensemble::new(info)
            .with_channel(ChannelKind::Amplitude, amplitude)
            .with_channel(ChannelKind::Correlation, correlation)
            .with_channel(ChannelKind::BeamVelocity, beam_vel)
            .with_channel(ChannelKind::InstrumentVelocity, earth.clone())
            .with_channel(ChannelKind::EarthVelocity, earth)
            .with_bottom_track(bottom_track)
    }
}

impl EnsembleSource for EnsembleGenerator {
    fn next_ensemble(&mut self) -> Result<Option<Ensemble>> {
        match self.remaining.as_mut() {
            Some(0) => Ok(None),
            Some(n) => {
                *n -= 1;
                Ok(Some(self.generate()))
            }
            None => Ok(Some(self.generate())),
        }
    }
}

pub fn generate_ensembles(config: &SimulationConfig, count: usize) -> Result<Vec<Ensemble>> {
    let mut generator = EnsembleGenerator::new(config)?;
    Ok((0..count).map(|_| generator.generate()).collect())
}
