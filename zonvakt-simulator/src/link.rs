//! # Simulated link to the central service
//!
//! Connections go straight to a [`ZoneRegistry`], optionally failing calls
//! with transport errors.
//!
//! ## Failure sources:
//! - `LinkFailureModel`: decides per call whether it is lost
//! - `OutageSwitch`: while down, connecting and every call fail

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use zonvakt_core::event::AlarmEvent;
use zonvakt_core::report::{BatchReport, NamedClimateReport, StateReport};
use zonvakt_core::zone::{ZoneKey, ZoneRegistration};
use zonvakt_relay::{CallError, CentralService, Connector};

use crate::registry::ZoneRegistry;

/// Decides whether a single remote call is lost.
pub trait LinkFailureModel: Send + Sync {
    fn should_fail(&self) -> bool;
}

/// A perfect link.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLinkFailure;

impl LinkFailureModel for NoLinkFailure {
    #[inline]
    fn should_fail(&self) -> bool {
        false
    }
}

/// Loses each call independently with a fixed probability. Seeded, so a run
/// is reproducible.
#[derive(Debug)]
pub struct ProbabilisticLinkFailure {
    probability: f64,
    rng: Mutex<SmallRng>,
}

impl ProbabilisticLinkFailure {
    /// `probability` is clamped to `0.0..=1.0`.
    pub fn new(probability: f64, seed: u64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }
}

impl LinkFailureModel for ProbabilisticLinkFailure {
    #[inline]
    fn should_fail(&self) -> bool {
        self.rng.lock().random_bool(self.probability)
    }
}

/// Shared on/off switch for a full outage.
#[derive(Debug, Clone, Default)]
pub struct OutageSwitch(Arc<AtomicBool>);

impl OutageSwitch {
    pub fn set_down(&self, down: bool) {
        self.0.store(down, Ordering::SeqCst);
    }

    pub fn is_down(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct SimulatedConnector {
    registry: ZoneRegistry,
    failures: Arc<dyn LinkFailureModel>,
    outage: OutageSwitch,
}

impl SimulatedConnector {
    pub fn new(registry: ZoneRegistry) -> Self {
        Self {
            registry,
            failures: Arc::new(NoLinkFailure),
            outage: OutageSwitch::default(),
        }
    }

    pub fn with_failures(mut self, model: impl LinkFailureModel + 'static) -> Self {
        self.failures = Arc::new(model);
        self
    }

    pub fn with_outage(mut self, outage: OutageSwitch) -> Self {
        self.outage = outage;
        self
    }

    pub fn outage(&self) -> &OutageSwitch {
        &self.outage
    }
}

#[async_trait]
impl Connector for SimulatedConnector {
    type Connection = SimulatedConnection;

    async fn connect(&self) -> Result<SimulatedConnection, CallError> {
        if self.outage.is_down() {
            return Err(CallError::Transport("central service unreachable".into()));
        }
        Ok(SimulatedConnection {
            registry: self.registry.clone(),
            failures: self.failures.clone(),
            outage: self.outage.clone(),
        })
    }
}

pub struct SimulatedConnection {
    registry: ZoneRegistry,
    failures: Arc<dyn LinkFailureModel>,
    outage: OutageSwitch,
}

impl SimulatedConnection {
    fn link(&self) -> Result<&ZoneRegistry, CallError> {
        if self.outage.is_down() {
            Err(CallError::Transport("connection reset".into()))
        } else if self.failures.should_fail() {
            Err(CallError::Transport("call lost".into()))
        } else {
            Ok(&self.registry)
        }
    }
}

#[async_trait]
impl CentralService for SimulatedConnection {
    async fn register_zone(&mut self, registration: &ZoneRegistration) -> Result<(), CallError> {
        self.link()?.register(registration);
        Ok(())
    }

    async fn zone_is_registered(&mut self, key: &ZoneKey) -> Result<bool, CallError> {
        Ok(self.link()?.is_registered(key))
    }

    async fn unregister_zone(&mut self, key: &ZoneKey) -> Result<(), CallError> {
        self.link()?.unregister(key)
    }

    async fn report_climate(&mut self, report: &NamedClimateReport) -> Result<(), CallError> {
        self.link()?.report_climate(report)
    }

    async fn report_alarm(&mut self, event: &AlarmEvent) -> Result<(), CallError> {
        self.link()?.report_alarm(event)
    }

    async fn report_state(&mut self, report: &StateReport) -> Result<(), CallError> {
        self.link()?.report_state(report)
    }

    async fn batch_report(&mut self, batch: &BatchReport) -> Result<(), CallError> {
        self.link()?.batch_report(batch)
    }
}
