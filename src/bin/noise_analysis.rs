use adcp_average::config::AverageConfig;
use adcp_average::simulation::{SimulationConfig, generate_ensembles, profile_error, true_profile};
use adcp_average::{AverageManager, Ensemble};
use anyhow::Result;
use clap::{Parser, ValueEnum};
use rolling_stats::Stats;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "noise_analysis")]
#[command(about = "Compare averaging methods against a known current profile")]
struct Args {
    /// Largest window size in the sweep
    #[arg(short, long, default_value_t = 20)]
    max_window: usize,

    /// Ensembles simulated per window size
    #[arg(short = 'n', long, default_value_t = 400)]
    ensembles: usize,

    /// Measurement noise std in m/s
    #[arg(long, default_value_t = 0.1)]
    noise: f32,

    /// Platform drift step std in m/s
    #[arg(long, default_value_t = 0.05)]
    drift: f32,

    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Output format
    #[arg(short, long, value_enum, default_value = "csv")]
    format: ReportFormat,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, Serialize)]
enum Method {
    Raw,
    Plain,
    ReferenceLayer,
}

#[derive(Debug, Clone, Serialize)]
struct StatsSummary {
    count: usize,
    mean: f32,
    std_dev: f32,
    min: f32,
    max: f32,
}

impl StatsSummary {
    fn from_stats(stats: &Stats<f32>) -> Option<Self> {
        if stats.count == 0 {
            return None;
        }
        Some(Self {
            count: stats.count,
            mean: stats.mean,
            std_dev: stats.std_dev,
            min: stats.min,
            max: stats.max,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct SweepRow {
    window: usize,
    method: Method,
    rms: Option<StatsSummary>,
    coverage: Option<StatsSummary>,
}

fn summarize(
    window: usize,
    method: Method,
    ensembles: &[Ensemble],
    sim: &SimulationConfig,
) -> SweepRow {
    let truth = true_profile(sim);
    let mut rms: Stats<f32> = Stats::new();
    let mut coverage: Stats<f32> = Stats::new();

    for ensemble in ensembles {
        let err = profile_error(ensemble, &truth);
        if err.count > 0 {
            rms.update(err.rms);
        }
        coverage.update(err.coverage());
    }

    SweepRow {
        window,
        method,
        rms: StatsSummary::from_stats(&rms),
        coverage: StatsSummary::from_stats(&coverage),
    }
}

fn average_all(config: &AverageConfig, input: &[Ensemble]) -> Vec<Ensemble> {
    let mut manager = AverageManager::new(config);
    let mut out = Vec::new();
    for ensemble in input {
        match manager.add_ensemble(ensemble.clone()) {
            Ok(Some(avg)) => out.push(avg),
            Ok(None) => {}
            Err(e) => log::warn!("ensemble {:?}: {}", ensemble.ensemble_number(), e),
        }
    }
    out
}

fn run_sweep(args: &Args) -> Result<Vec<SweepRow>> {
    let sim = SimulationConfig::default()
        .with_seed(args.seed)
        .with_noise(args.noise)
        .with_platform_drift(args.drift);
    let input = generate_ensembles(&sim, args.ensembles)?;

    let mut rows = vec![summarize(1, Method::Raw, &input, &sim)];

    for window in 2..=args.max_window.max(2) {
        let mut config = AverageConfig {
            window_size: window,
            ..AverageConfig::default()
        };
        rows.push(summarize(window, Method::Plain, &average_all(&config, &input), &sim));

        config.reference_layer.enabled = true;
        rows.push(summarize(
            window,
            Method::ReferenceLayer,
            &average_all(&config, &input),
            &sim,
        ));
        log::debug!("window {} done", window);
    }

    Ok(rows)
}

fn print_rows(rows: &[SweepRow], format: ReportFormat) -> Result<()> {
    match format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(rows)?),
        ReportFormat::Csv => {
            println!("window,method,averages,rms_mean,rms_max,coverage_mean");
            for row in rows {
                let (count, rms_mean, rms_max) = row
                    .rms
                    .as_ref()
                    .map_or((0, f32::NAN, f32::NAN), |s| (s.count, s.mean, s.max));
                let coverage = row.coverage.as_ref().map_or(f32::NAN, |s| s.mean);
                println!(
                    "{},{:?},{},{:.4},{:.4},{:.3}",
                    row.window, row.method, count, rms_mean, rms_max, coverage
                );
            }
        }
        ReportFormat::Text => {
            for row in rows {
                match row.rms {
                    Some(ref rms) => println!(
                        "window {:>3} {:<15} rms {:.4} +/- {:.4} m/s over {} averages",
                        row.window,
                        format!("{:?}", row.method),
                        rms.mean,
                        rms.std_dev,
                        rms.count
                    ),
                    None => println!(
                        "window {:>3} {:<15} no valid averages",
                        row.window,
                        format!("{:?}", row.method)
                    ),
                }
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let rows = run_sweep(&args)?;
    print_rows(&rows, args.format)
}
