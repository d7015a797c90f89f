use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use adcp_average::AverageManager;
use adcp_average::config::{AverageConfig, TriggerMode};
use adcp_average::ensemble::{ChainedSource, ChannelKind, EnsembleSource, JsonLinesSource};
use adcp_average::output::{OutputFormat, create_formatter};
use adcp_average::processing::{run_averaging, spawn_reader, ticker};

#[derive(Parser, Debug)]
#[command(name = "adcp-average")]
#[command(about = "Average ADCP ensembles read as JSON lines")]
struct Args {
    /// Input files, one JSON ensemble per line (stdin when none given)
    files: Vec<PathBuf>,

    /// TOML averaging configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ensembles per average
    #[arg(short, long)]
    window: Option<usize>,

    /// Slide the window by one ensemble after each average
    #[arg(short, long)]
    running: bool,

    /// Publish trigger
    #[arg(short, long, value_enum)]
    trigger: Option<TriggerMode>,

    /// Timer period in milliseconds
    #[arg(long)]
    timer_ms: Option<u64>,

    /// Average earth velocity against a reference layer
    #[arg(long)]
    reference_layer: bool,

    /// First reference layer bin
    #[arg(long)]
    ref_min: Option<usize>,

    /// Last reference layer bin
    #[arg(long)]
    ref_max: Option<usize>,

    /// Channels to leave out of the average
    #[arg(long, value_enum, value_delimiter = ',')]
    disable: Vec<ChannelKind>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn build_config(args: &Args) -> Result<AverageConfig> {
    let mut config = match args.config {
        Some(ref path) => AverageConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AverageConfig::default(),
    };

    if let Some(window) = args.window {
        config.window_size = window;
    }
    if args.running {
        config.running_average = true;
    }
    if let Some(trigger) = args.trigger {
        config.trigger = trigger;
    }
    if let Some(ms) = args.timer_ms {
        config.timer_interval_ms = ms;
    }
    if args.reference_layer {
        config.reference_layer.enabled = true;
    }
    if let Some(min) = args.ref_min {
        config.reference_layer.min_bin = min;
    }
    if let Some(max) = args.ref_max {
        config.reference_layer.max_bin = max;
    }
    for &kind in &args.disable {
        config.channels.get_mut(kind).enabled = false;
    }

    Ok(config.normalized())
}

fn open_sources(files: &[PathBuf]) -> Result<Box<dyn EnsembleSource>> {
    if files.is_empty() {
        return Ok(Box::new(JsonLinesSource::new(BufReader::new(io::stdin()))));
    }

    let mut sources: Vec<Box<dyn EnsembleSource>> = Vec::with_capacity(files.len());
    for path in files {
        let source = JsonLinesSource::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        sources.push(Box::new(source));
    }
    Ok(Box::new(ChainedSource::new(sources)))
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

    let config = build_config(&args)?;
    log::info!(
        "window {} ({}), trigger {:?}, reference layer {}",
        config.window_size,
        if config.running_average { "running" } else { "block" },
        config.trigger,
        if config.reference_layer.enabled {
            format!(
                "bins {}..={}",
                config.reference_layer.min_bin, config.reference_layer.max_bin
            )
        } else {
            "off".to_string()
        }
    );

    let formatter = create_formatter(args.format, args.verbose > 0);
    if let Some(header) = formatter.header() {
        println!("{}", header);
    }

    let mut manager = AverageManager::new(&config);
    let mut stdout = io::stdout();
    manager.subscribe(move |ensemble| {
        if let Err(e) = writeln!(stdout, "{}", formatter.format(ensemble)) {
            log::error!("Failed to write average: {}", e);
        }
    });

    let (ensembles, reader) = spawn_reader(open_sources(&args.files)?);
    let summary = run_averaging(&mut manager, &ensembles, &ticker(&config));

    let read = reader
        .join()
        .map_err(|_| anyhow::anyhow!("Reader thread panicked"))?
        .context("Failed to read ensembles")?;

    eprintln!(
        "Read {} ensembles, published {} averages ({} failed)",
        read, summary.published, summary.failed
    );
    Ok(())
}
