//! End-to-end run of one simulated zone.
//!
//! ```text
//! ZoneSimulator ─alarms─▶ AlarmEngine ─events─┬─▶ alarm log
//!       │                                     └─▶ TelemetryRelay ─▶ ZoneRegistry
//!       ├──climate──────────────┬─▶ climate log        ▲
//!       │                       └─────────────────────▶│
//!       └──state──────────────────────────────────────▶┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};
use zonvakt_alarm::AlarmEngine;
use zonvakt_config::ZonvaktConfig;
use zonvakt_core::event::AlarmEvent;
use zonvakt_core::report::ClimateReport;
use zonvakt_core::zone::ZoneRegistration;
use zonvakt_relay::{
    relay_channels, AlarmLogWriter, ClimateLogWriter, FileHistory, HistorySource, NoHistory,
    RelayState, TelemetryRelay,
};
use zonvakt_simulator::{
    NoLinkFailure, OutageSwitch, ProbabilisticLinkFailure, ProducerSummary, RegisteredZone,
    SimulatedConnector, ZoneRegistry, ZoneSimulator,
};
use zonvakt_telemetry::MetricsRecorder;

#[derive(Debug)]
pub struct SimulationReport {
    pub producer: ProducerSummary,
    /// The zone as the central service last saw it.
    pub zone: Option<RegisteredZone>,
    pub relay_state: RelayState,
    pub metrics: String,
}

impl SimulationReport {
    pub fn print(&self) {
        println!(
            "ticks: {}  faults: {}  alarms raised: {}  climate samples: {}  states: {}",
            self.producer.ticks,
            self.producer.faults_started,
            self.producer.alarms_raised,
            self.producer.climates,
            self.producer.states
        );
        println!("relay: {:?}", self.relay_state);
        match self
            .zone
            .as_ref()
            .map(serde_json::to_string_pretty)
            .transpose()
        {
            Ok(Some(zone)) => println!("{zone}"),
            Ok(None) => println!("zone not registered at the central service"),
            Err(err) => warn!(error = %err, "could not render zone"),
        }
        print!("{}", self.metrics);
    }
}

/// Runs `persist` on the blocking pool for every item sent to the returned
/// channel, one item at a time and in order.
fn log_writer<T, F>(capacity: usize, persist: F) -> (mpsc::Sender<T>, JoinHandle<()>)
where
    T: Send + 'static,
    F: FnMut(&T) + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<T>(capacity);
    let task = tokio::spawn(async move {
        let mut persist = persist;
        while let Some(item) = rx.recv().await {
            let write = tokio::task::spawn_blocking(move || {
                persist(&item);
                persist
            });
            match write.await {
                Ok(writer) => persist = writer,
                Err(err) => {
                    error!(error = %err, "log writer failed, history no longer persisted");
                    break;
                }
            }
        }
    });
    (tx, task)
}

/// Channel stage that hands each item to a log writer before passing it on.
fn tee<T>(
    mut input: mpsc::Receiver<T>,
    output: mpsc::Sender<T>,
    mut log: Option<mpsc::Sender<T>>,
) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(item) = input.recv().await {
            if let Some(writer) = &log {
                if writer.send(item.clone()).await.is_err() {
                    warn!("log writer stopped, history no longer persisted");
                    log = None;
                }
            }
            if output.send(item).await.is_err() {
                break;
            }
        }
    })
}

fn schedule_outage(config: &ZonvaktConfig, outage: OutageSwitch, registry: ZoneRegistry) {
    let Some(start) = config.simulator.outage_at_secs else {
        return;
    };
    let length = Duration::from_secs(config.simulator.outage_secs);
    let restart = config.simulator.restart_central;

    tokio::spawn(async move {
        sleep(Duration::from_secs(start)).await;
        info!(seconds = length.as_secs(), "link outage starts");
        outage.set_down(true);
        if restart {
            registry.clear();
        }
        sleep(length).await;
        outage.set_down(false);
        info!("link outage ends");
    });
}

pub async fn run(config: &ZonvaktConfig) -> anyhow::Result<SimulationReport> {
    let metrics = MetricsRecorder::new()?;
    let key = config.zone.key();
    let zone = key.full_name();
    let sim = &config.simulator;

    let registry = ZoneRegistry::new();
    let outage = OutageSwitch::default();
    let connector = SimulatedConnector::new(registry.clone()).with_outage(outage.clone());
    let connector = if sim.loss_probability > 0.0 {
        connector.with_failures(ProbabilisticLinkFailure::new(sim.loss_probability, sim.seed))
    } else {
        connector.with_failures(NoLinkFailure)
    };

    let (climate_log, alarm_log, history) =
        match (&config.relay.climate_log, &config.relay.alarm_log) {
            (Some(climate_path), Some(alarm_path)) => {
                let climate = ClimateLogWriter::create(climate_path, Utc::now())?;
                let alarms = AlarmLogWriter::create(alarm_path)?;
                info!(
                    climate = %climate.path().display(),
                    alarms = %alarms.path().display(),
                    "writing zone history"
                );
                let history = FileHistory::new(climate.path(), alarms.path());
                (Some(climate), Some(alarms), Arc::new(history) as Arc<dyn HistorySource>)
            }
            _ => (None, None, Arc::new(NoHistory) as Arc<dyn HistorySource>),
        };

    let relay = TelemetryRelay::connect(
        &config.relay,
        ZoneRegistration::new(key.clone(), config.zone.bounds()),
        connector,
        history,
        metrics.clone(),
    )
    .await
    .context("starting relay")?;

    let (alarm_tx, engine_events, engine) = AlarmEngine::spawn(zone.clone(), &config.alarm, metrics.clone());
    let (inputs, streams) = relay_channels(config.relay.input_capacity);
    let relay = relay.spawn(streams);

    let capacity = config.relay.input_capacity;
    let mut writers = Vec::new();
    let alarm_writer = alarm_log.map(|mut log| {
        let (tx, task) = log_writer(capacity, move |event: &AlarmEvent| {
            if let Err(err) = log.append(event) {
                warn!(error = %err, "alarm log write failed");
            }
        });
        writers.push(task);
        tx
    });
    let climate_writer = climate_log.map(|mut log| {
        let (tx, task) = log_writer(capacity, move |report: &ClimateReport| {
            if let Err(err) = log.append(report) {
                warn!(error = %err, "climate log write failed");
            }
        });
        writers.push(task);
        tx
    });

    let (climate_tx, climate_rx) = mpsc::channel(capacity);
    let alarm_tee = tee(engine_events, inputs.alarms.clone(), alarm_writer);
    let climate_tee = tee(climate_rx, inputs.climate.clone(), climate_writer);

    schedule_outage(config, outage, registry.clone());

    let producer = ZoneSimulator::new(&key, sim.seed);
    let summary = producer
        .run(
            Duration::from_secs(sim.duration_secs),
            alarm_tx,
            climate_tx,
            inputs.state.clone(),
        )
        .await;
    drop(inputs);

    engine.join().await?;
    alarm_tee.await?;
    climate_tee.await?;
    for writer in writers {
        writer.await?;
    }

    let mut state = relay.subscribe();
    relay.join().await?;
    let relay_state = *state.borrow_and_update();
    let zone_snapshot = registry.last_seen(&key);

    Ok(SimulationReport {
        producer: summary,
        zone: zone_snapshot,
        relay_state,
        metrics: metrics.gather_metrics()?,
    })
}
