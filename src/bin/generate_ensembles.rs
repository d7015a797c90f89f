use anyhow::{Context, Result};
use clap::Parser;
use adcp_average::simulation::{EnsembleGenerator, SimulationConfig};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "generate_ensembles")]
#[command(about = "Generate synthetic ADCP ensembles as JSON lines")]
struct Args {
    /// TOML simulation configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of ensembles
    #[arg(short = 'n', long, default_value_t = 100)]
    count: usize,

    /// Seed for reproducibility
    #[arg(short, long)]
    seed: Option<u64>,

    /// Measurement noise std in m/s (CLI override)
    #[arg(long)]
    noise: Option<f32>,

    /// Platform drift step std in m/s (CLI override)
    #[arg(long)]
    drift: Option<f32>,

    /// Number of depth bins (CLI override)
    #[arg(long)]
    bins: Option<usize>,
}

fn load_config(args: &Args) -> Result<SimulationConfig> {
    let mut config = match args.config {
        Some(ref path) => {
            let content = fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        }
        None => SimulationConfig::default(),
    };

    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(noise) = args.noise {
        config.noise_std = noise;
    }
    if let Some(drift) = args.drift {
        config.platform_drift_std = drift;
    }
    if let Some(bins) = args.bins {
        config.num_bins = bins;
        config.min_valid_bins = config.min_valid_bins.min(bins);
    }
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::init();

    let config = load_config(&args)?;
    let mut generator = EnsembleGenerator::new(&config)?;

    let mut out: Box<dyn Write> = match args.output {
        Some(ref path) => Box::new(BufWriter::new(
            File::create(path).context("Failed to create output file")?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    for _ in 0..args.count {
        let ensemble = generator.generate();
        let line = serde_json::to_string(&ensemble).context("Failed to serialize ensemble")?;
        writeln!(out, "{}", line).context("Failed to write ensemble")?;
    }
    out.flush().context("Failed to flush output")?;

    if let Some(ref path) = args.output {
        eprintln!("Generated {} ensembles in {}", args.count, path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "generate_ensembles",
            "--seed",
            "9",
            "--bins",
            "8",
            "--noise",
            "0.3",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.num_bins, 8);
        assert_eq!(config.min_valid_bins, 8);
        assert_eq!(config.noise_std, 0.3);
    }
}
