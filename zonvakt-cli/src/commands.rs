use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use zonvakt_config::ZonvaktConfig;
use zonvakt_core::event::AlarmStatus;
use zonvakt_relay::history::{read_alarm_log, read_climate_log};
use zonvakt_relay::ReplayBatches;
use zonvakt_telemetry::{EventLogger, LogFormat};

use crate::simulate;

#[derive(Parser, Debug)]
#[command(name = "zonvakt", version, about)]
pub struct Cli {
    /// Configuration file; defaults to config/zonvakt.yaml and the
    /// environment
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load and validate the configuration, then print it
    CheckConfig,
    /// Summarise persisted climate and alarm logs
    InspectLogs(InspectArgs),
    /// Run a simulated zone against an in-memory central service
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    #[arg(long)]
    pub climate: PathBuf,
    #[arg(long)]
    pub alarms: PathBuf,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SimulateArgs {
    #[arg(long)]
    pub seed: Option<u64>,
    /// Simulated run time in seconds
    #[arg(long)]
    pub seconds: Option<u64>,
    /// Probability that a remote call is lost
    #[arg(long)]
    pub loss: Option<f64>,
    /// Start a link outage this many seconds into the run
    #[arg(long)]
    pub outage_at: Option<u64>,
    /// Outage length in seconds
    #[arg(long, requires = "outage_at")]
    pub outage_for: Option<u64>,
    /// The central service forgets every zone during the outage
    #[arg(long, requires = "outage_at")]
    pub restart_central: bool,
    /// Write climate and alarm logs in this directory and replay from them
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl SimulateArgs {
    fn apply(&self, config: &mut ZonvaktConfig) {
        let simulator = &mut config.simulator;
        if let Some(seed) = self.seed {
            simulator.seed = seed;
        }
        if let Some(seconds) = self.seconds {
            simulator.duration_secs = seconds;
        }
        if let Some(loss) = self.loss {
            simulator.loss_probability = loss;
        }
        if self.outage_at.is_some() {
            simulator.outage_at_secs = self.outage_at;
        }
        if let Some(length) = self.outage_for {
            simulator.outage_secs = length;
        }
        simulator.restart_central |= self.restart_central;

        if let Some(dir) = &self.log_dir {
            let name = config.zone.name.clone();
            config.relay.climate_log = Some(dir.join(format!("{name}.climate")));
            config.relay.alarm_log = Some(dir.join(format!("{name}.alarms")));
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ZonvaktConfig> {
    let config = match path {
        Some(path) => ZonvaktConfig::load_from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ZonvaktConfig::load().context("loading configuration")?,
    };
    Ok(config)
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config(cli.config.as_deref())?;

    let format = if config.telemetry.json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    EventLogger::init(&config.telemetry.log_filter, format)
        .context("installing log subscriber")?;

    match cli.command {
        Commands::CheckConfig => check_config(&config),
        Commands::InspectLogs(args) => inspect_logs(&args),
        Commands::Simulate(args) => {
            args.apply(&mut config);
            simulate::run(&config).await.map(|report| report.print())
        }
    }
}

fn check_config(config: &ZonvaktConfig) -> anyhow::Result<()> {
    println!("zone: {}", config.zone.key());
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ReasonTally {
    on: usize,
    off: usize,
}

fn inspect_logs(args: &InspectArgs) -> anyhow::Result<()> {
    let climates = read_climate_log(&args.climate)?;
    let alarms = read_alarm_log(&args.alarms)?;

    println!("climate samples: {}", climates.len());
    if let (Some(first), Some(last)) = (climates.first(), climates.last()) {
        println!("  from {} to {}", first.time.to_rfc3339(), last.time.to_rfc3339());
        let mean = climates.iter().map(|c| f64::from(c.humidity)).sum::<f64>() / climates.len() as f64;
        println!("  mean humidity {:.2}%", mean);
    }

    println!("alarm events: {}", alarms.len());
    for (reason, tally) in tally_reasons(&alarms) {
        println!("  {reason}: {} on / {} off", tally.on, tally.off);
    }

    let zone = alarms.first().map(|a| a.zone.as_str()).unwrap_or("");
    println!(
        "replay would send {} batch(es)",
        ReplayBatches::new(zone, &climates, &alarms).count()
    );
    Ok(())
}

fn tally_reasons(alarms: &[zonvakt_core::event::AlarmEvent]) -> BTreeMap<String, ReasonTally> {
    let mut tallies: BTreeMap<String, ReasonTally> = BTreeMap::new();
    for event in alarms {
        let tally = tallies.entry(event.reason()).or_default();
        match event.status {
            AlarmStatus::On => tally.on += 1,
            AlarmStatus::Off => tally.off += 1,
        }
    }
    tallies
}
