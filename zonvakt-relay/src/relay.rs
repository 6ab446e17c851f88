//! The reconnecting telemetry relay.
//!
//! A relay owns at most one connection to the central service. Reports are
//! forwarded as they arrive while connected. A transport failure drops the
//! connection and arms a single-shot reconnection timer; reports arriving
//! before the link is back are consumed and dropped. Reconnecting checks
//! whether the service still knows the zone and, if it does not, registers
//! it again, replays the persisted history and resends the latest state.
//! After `max_attempts` consecutive failed reconnections the relay gives up
//! and stays disabled.
//!
//! ```text
//!   Connected ──transport error──▶ AwaitingReconnect ──timer──▶ reconnect
//!       ▲                                ▲                        │
//!       └──────────────ok────────────────┼────────────────────────┤
//!                                        └──failed, budget left───┤
//!                                  Disabled ◀──budget exhausted───┘
//! ```
//!
//! Closing all three inputs moves any state to `Closed`, unregistering the
//! zone first if a connection is up.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn, Instrument};
use zonvakt_config::RelayConfig;
use zonvakt_core::event::AlarmEvent;
use zonvakt_core::report::{ClimateReport, NamedClimateReport, StateReport};
use zonvakt_core::zone::{ZoneKey, ZoneRegistration};
use zonvakt_telemetry::{EventLogger, MetricsRecorder};

use crate::error::{CallError, RelayError};
use crate::history::HistorySource;
use crate::replay::replay;
use crate::service::{CentralService, Connector};

const STREAM_CLIMATE: &str = "climate";
const STREAM_ALARM: &str = "alarm";
const STREAM_STATE: &str = "state";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Connected,
    /// Waiting for the reconnection timer. `attempt` failed reconnections
    /// have happened so far.
    AwaitingReconnect { attempt: u32 },
    /// Reconnection budget exhausted; reports are dropped for good.
    Disabled,
    Closed,
}

/// Producer side of a relay's inputs.
#[derive(Debug, Clone)]
pub struct RelayInputs {
    pub alarms: mpsc::Sender<AlarmEvent>,
    pub climate: mpsc::Sender<ClimateReport>,
    pub state: mpsc::Sender<StateReport>,
}

/// Consumer side of a relay's inputs. `alarms` is typically the event
/// channel of the zone's escalation engine.
#[derive(Debug)]
pub struct RelayStreams {
    pub alarms: mpsc::Receiver<AlarmEvent>,
    pub climate: mpsc::Receiver<ClimateReport>,
    pub state: mpsc::Receiver<StateReport>,
}

pub fn relay_channels(capacity: usize) -> (RelayInputs, RelayStreams) {
    let (alarm_tx, alarm_rx) = mpsc::channel(capacity);
    let (climate_tx, climate_rx) = mpsc::channel(capacity);
    let (state_tx, state_rx) = mpsc::channel(capacity);
    (
        RelayInputs {
            alarms: alarm_tx,
            climate: climate_tx,
            state: state_tx,
        },
        RelayStreams {
            alarms: alarm_rx,
            climate: climate_rx,
            state: state_rx,
        },
    )
}

pub struct RelayHandle {
    state: watch::Receiver<RelayState>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    pub fn state(&self) -> RelayState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RelayState> {
        self.state.clone()
    }

    /// Waits for the relay to close. It closes once all its inputs are.
    pub async fn join(self) -> Result<(), JoinError> {
        self.task.await
    }
}

/// A registered relay, ready to be spawned.
pub struct TelemetryRelay<C: Connector> {
    zone: String,
    key: ZoneKey,
    registration: ZoneRegistration,
    connector: C,
    history: Arc<dyn HistorySource>,
    connection: Option<C::Connection>,
    attempts: u32,
    max_attempts: u32,
    window: Duration,
    reconnect_at: Option<Instant>,
    last_state: Option<StateReport>,
    status: watch::Sender<RelayState>,
    metrics: MetricsRecorder,
}

impl<C: Connector> TelemetryRelay<C> {
    /// Opens the first connection and registers the zone. This is the only
    /// step of a relay's life that can fail.
    pub async fn connect(
        config: &RelayConfig,
        registration: ZoneRegistration,
        connector: C,
        history: Arc<dyn HistorySource>,
        metrics: MetricsRecorder,
    ) -> Result<Self, RelayError> {
        let zone = registration.full_name();
        let mut connection = connector.connect().await.map_err(RelayError::Connect)?;

        let initial = ZoneRegistration {
            will_log: false,
            ..registration.clone()
        };
        connection
            .register_zone(&initial)
            .await
            .map_err(|source| RelayError::Register {
                zone: zone.clone(),
                source,
            })?;
        info!(zone = %zone, address = %config.address, "zone registered");

        let (status, _) = watch::channel(RelayState::Connected);
        Ok(Self {
            key: registration.key(),
            zone,
            registration,
            connector,
            history,
            connection: Some(connection),
            attempts: 0,
            max_attempts: config.max_attempts,
            window: config.reconnection_window(),
            reconnect_at: None,
            last_state: None,
            status,
            metrics,
        })
    }

    /// Starts forwarding `streams` on the current runtime.
    pub fn spawn(self, streams: RelayStreams) -> RelayHandle
    where
        C::Connection: Sync,
    {
        let state = self.status.subscribe();
        let span = EventLogger::zone_span("relay", &self.zone);
        let task = tokio::spawn(self.run(streams).instrument(span));
        RelayHandle { state, task }
    }

    async fn run(mut self, mut streams: RelayStreams) {
        let mut alarms_open = true;
        let mut climate_open = true;
        let mut state_open = true;
        info!("relay started");

        while alarms_open || climate_open || state_open {
            let reconnect_at = self.reconnect_at;

            tokio::select! {
                received = streams.alarms.recv(), if alarms_open => match received {
                    Some(event) => self.forward_alarm(event).await,
                    None => alarms_open = false,
                },
                received = streams.climate.recv(), if climate_open => match received {
                    Some(report) => self.forward_climate(report).await,
                    None => climate_open = false,
                },
                received = streams.state.recv(), if state_open => match received {
                    Some(report) => self.forward_state(report).await,
                    None => state_open = false,
                },
                _ = reconnect_timer(reconnect_at) => {
                    self.reconnect_at = None;
                    self.reconnect().await;
                }
            }
        }

        self.close().await;
    }

    async fn forward_alarm(&mut self, event: AlarmEvent) {
        let result = match self.connection.as_mut() {
            Some(connection) => connection.report_alarm(&event).await,
            None => return self.drop_report(STREAM_ALARM),
        };
        self.settle(STREAM_ALARM, result);
    }

    async fn forward_climate(&mut self, report: ClimateReport) {
        let named = NamedClimateReport::new(self.zone.clone(), report);
        let result = match self.connection.as_mut() {
            Some(connection) => connection.report_climate(&named).await,
            None => return self.drop_report(STREAM_CLIMATE),
        };
        self.settle(STREAM_CLIMATE, result);
    }

    async fn forward_state(&mut self, report: StateReport) {
        let result = match self.connection.as_mut() {
            Some(connection) => connection.report_state(&report).await,
            None => {
                self.last_state = Some(report);
                return self.drop_report(STREAM_STATE);
            }
        };
        self.last_state = Some(report);
        self.settle(STREAM_STATE, result);
    }

    fn drop_report(&self, stream: &'static str) {
        self.metrics.inc_reports_dropped(&self.zone, stream);
        debug!(stream, "not connected, report dropped");
    }

    fn settle(&mut self, stream: &'static str, result: Result<(), CallError>) {
        match result {
            Ok(()) => self.metrics.inc_reports_forwarded(&self.zone, stream),
            Err(err) => {
                self.metrics.inc_call_errors(&self.zone, err.kind());
                match err {
                    CallError::Application(message) => {
                        warn!(stream, error = %message, "report rejected by central service");
                    }
                    CallError::Transport(message) => {
                        warn!(stream, error = %message, "link to central service lost");
                        self.connection = None;
                        self.schedule_reconnect();
                    }
                }
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.attempts < self.max_attempts {
            self.reconnect_at = Some(Instant::now() + self.window);
            self.set_state(RelayState::AwaitingReconnect {
                attempt: self.attempts,
            });
        } else {
            error!(
                attempts = self.attempts,
                "reconnection budget exhausted, live reporting disabled"
            );
            self.set_state(RelayState::Disabled);
        }
    }

    async fn reconnect(&mut self) {
        self.attempts += 1;
        self.metrics.inc_reconnect_attempts(&self.zone);
        info!(attempt = self.attempts, "reconnecting to central service");

        match self.restore().await {
            Ok(connection) => {
                info!(attempt = self.attempts, "link to central service restored");
                self.connection = Some(connection);
                self.attempts = 0;
                self.set_state(RelayState::Connected);
            }
            Err(err) => {
                self.metrics.inc_call_errors(&self.zone, err.kind());
                warn!(attempt = self.attempts, error = %err, "reconnection failed");
                self.schedule_reconnect();
            }
        }
    }

    /// Opens a new connection and brings the service back in sync with the
    /// zone.
    async fn restore(&mut self) -> Result<C::Connection, CallError> {
        let mut connection = self.connector.connect().await?;

        if connection.zone_is_registered(&self.key).await? {
            debug!("zone still registered");
            return Ok(connection);
        }

        let history = self.read_history().await;
        let registration = ZoneRegistration {
            will_log: history.is_some(),
            ..self.registration.clone()
        };
        connection.register_zone(&registration).await?;
        info!(will_log = registration.will_log, "zone registered again");

        if let Some((climates, alarms)) = history {
            let delivered = replay(&mut connection, &self.zone, &climates, &alarms, &self.metrics).await;
            info!(
                climates = climates.len(),
                alarms = alarms.len(),
                batches = delivered,
                "history replayed"
            );
        }

        if let Some(state) = &self.last_state {
            match connection.report_state(state).await {
                Ok(()) => self.metrics.inc_reports_forwarded(&self.zone, STREAM_STATE),
                Err(CallError::Application(message)) => {
                    self.metrics.inc_call_errors(&self.zone, "application");
                    warn!(error = %message, "last state rejected by central service");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(connection)
    }

    /// Reads both logs on the blocking pool.
    async fn read_history(&self) -> Option<(Vec<ClimateReport>, Vec<AlarmEvent>)> {
        let history = Arc::clone(&self.history);
        let read =
            tokio::task::spawn_blocking(move || (history.read_climates(), history.read_alarms()));
        match read.await {
            Ok((Ok(climates), Ok(alarms))) => Some((climates, alarms)),
            Ok((Err(err), _) | (_, Err(err))) => {
                warn!(error = %err, "history unreadable, registering without log");
                None
            }
            Err(err) => {
                error!(error = %err, "history reader failed, registering without log");
                None
            }
        }
    }

    async fn close(&mut self) {
        self.reconnect_at = None;
        if let Some(mut connection) = self.connection.take() {
            match connection.unregister_zone(&self.key).await {
                Ok(()) => info!("zone unregistered"),
                Err(err) => {
                    self.metrics.inc_call_errors(&self.zone, err.kind());
                    warn!(error = %err, "could not unregister zone");
                }
            }
        }
        self.set_state(RelayState::Closed);
        info!("relay closed");
    }

    fn set_state(&self, state: RelayState) {
        self.status.send_replace(state);
    }
}

async fn reconnect_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}
