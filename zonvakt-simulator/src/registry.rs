//! In-memory central service.
//!
//! Keeps one entry per registered zone with its latest climate, its alarm
//! table and what it received through history replay. Calls about a zone
//! that is not registered fail with an application error.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};
use zonvakt_core::event::{AlarmEvent, AlarmStatus};
use zonvakt_core::report::{BatchReport, ClimateReport, NamedClimateReport, StateReport};
use zonvakt_core::zone::{ClimateBounds, ZoneKey, ZoneRegistration};
use zonvakt_relay::CallError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisteredAlarm {
    pub reason: String,
    pub level: u8,
    pub on: bool,
    /// Number of off→on transitions seen.
    pub triggers: u32,
    pub last_change: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisteredZone {
    pub key: ZoneKey,
    pub bounds: ClimateBounds,
    pub will_log: bool,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub climate_samples: usize,
    pub alarms: Vec<RegisteredAlarm>,
    pub last_state: Option<StateReport>,
    pub batches: usize,
    pub replayed_climates: usize,
    pub replayed_alarms: usize,
}

impl RegisteredZone {
    fn new(registration: &ZoneRegistration) -> Self {
        Self {
            key: registration.key(),
            bounds: registration.bounds,
            will_log: registration.will_log,
            temperature: None,
            humidity: None,
            climate_samples: 0,
            alarms: Vec::new(),
            last_state: None,
            batches: 0,
            replayed_climates: 0,
            replayed_alarms: 0,
        }
    }

    pub fn alarm(&self, reason: &str) -> Option<&RegisteredAlarm> {
        self.alarms.iter().find(|a| a.reason == reason)
    }

    fn record_climate(&mut self, report: &ClimateReport) {
        self.temperature = Some(report.reference_temperature());
        self.humidity = Some(report.humidity);
        self.climate_samples += 1;
    }

    fn record_alarm(&mut self, event: &AlarmEvent) {
        let reason = event.reason();
        let Some(entry) = self.alarms.iter_mut().find(|a| a.reason == reason) else {
            // First sighting of a reason only registers it; its status is
            // not applied until the next event.
            self.alarms.push(RegisteredAlarm {
                reason,
                level: event.priority().level(),
                on: false,
                triggers: 0,
                last_change: event.time,
            });
            return;
        };

        match event.status {
            AlarmStatus::On => {
                if !entry.on {
                    entry.triggers += 1;
                }
                entry.on = true;
            }
            AlarmStatus::Off => entry.on = false,
        }
        entry.last_change = event.time;
    }
}

#[derive(Debug, Default)]
struct Zones {
    registered: BTreeMap<String, RegisteredZone>,
    /// Final view of zones that unregistered.
    departed: BTreeMap<String, RegisteredZone>,
}

/// Shared handle on the registry. Clones see the same zones.
#[derive(Debug, Clone, Default)]
pub struct ZoneRegistry {
    zones: Arc<RwLock<Zones>>,
}

fn not_found(zone: &str) -> CallError {
    CallError::Application(format!("zone {zone} is not registered"))
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a zone. An existing entry for the same zone is discarded.
    pub fn register(&self, registration: &ZoneRegistration) {
        let name = registration.full_name();
        let mut zones = self.zones.write();
        if zones.registered.remove(&name).is_some() {
            debug!(zone = %name, "replacing registered zone");
        }
        info!(zone = %name, will_log = registration.will_log, "registering zone");
        zones.departed.remove(&name);
        zones.registered.insert(name, RegisteredZone::new(registration));
    }

    pub fn is_registered(&self, key: &ZoneKey) -> bool {
        self.zones.read().registered.contains_key(&key.full_name())
    }

    pub fn unregister(&self, key: &ZoneKey) -> Result<(), CallError> {
        let name = key.full_name();
        let mut zones = self.zones.write();
        match zones.registered.remove(&name) {
            Some(zone) => {
                info!(zone = %name, "unregistering zone");
                zones.departed.insert(name, zone);
                Ok(())
            }
            None => Err(not_found(&name)),
        }
    }

    pub fn report_climate(&self, report: &NamedClimateReport) -> Result<(), CallError> {
        self.with_zone(&report.zone, |zone| zone.record_climate(&report.report))
    }

    pub fn report_alarm(&self, event: &AlarmEvent) -> Result<(), CallError> {
        self.with_zone(&event.zone, |zone| zone.record_alarm(event))
    }

    pub fn report_state(&self, report: &StateReport) -> Result<(), CallError> {
        self.with_zone(&report.zone, |zone| zone.last_state = Some(report.clone()))
    }

    pub fn batch_report(&self, batch: &BatchReport) -> Result<(), CallError> {
        self.with_zone(&batch.zone, |zone| {
            for climate in &batch.climates {
                zone.record_climate(climate);
            }
            for event in &batch.alarms {
                zone.record_alarm(event);
            }
            zone.batches += 1;
            zone.replayed_climates += batch.climates.len();
            zone.replayed_alarms += batch.alarms.len();
        })
    }

    /// Snapshot of one zone.
    pub fn zone(&self, key: &ZoneKey) -> Result<RegisteredZone, CallError> {
        let name = key.full_name();
        self.zones
            .read()
            .registered
            .get(&name)
            .cloned()
            .ok_or_else(|| not_found(&name))
    }

    /// The zone as currently registered, or as it was when it unregistered.
    pub fn last_seen(&self, key: &ZoneKey) -> Option<RegisteredZone> {
        let name = key.full_name();
        let zones = self.zones.read();
        zones
            .registered
            .get(&name)
            .or_else(|| zones.departed.get(&name))
            .cloned()
    }

    pub fn zones(&self) -> Vec<RegisteredZone> {
        self.zones.read().registered.values().cloned().collect()
    }

    /// Forgets every zone, as a restarted service would.
    pub fn clear(&self) {
        let mut zones = self.zones.write();
        info!(zones = zones.registered.len(), "registry cleared");
        zones.registered.clear();
        zones.departed.clear();
    }

    fn with_zone<F>(&self, zone: &str, apply: F) -> Result<(), CallError>
    where
        F: FnOnce(&mut RegisteredZone),
    {
        let mut zones = self.zones.write();
        let entry = zones
            .registered
            .get_mut(zone)
            .ok_or_else(|| not_found(zone))?;
        apply(entry);
        Ok(())
    }
}
