//! Persisted zone history.
//!
//! Two append-only logs per zone, written while the zone runs and read back
//! in full when the relay has to catch the central service up:
//!
//! - climate log: text. A `# Starting date <RFC3339>` header, a column
//!   comment, then one `<ms since start> <humidity> <t0> <t1> <t2> <t3>`
//!   line per sample.
//! - alarm log: one JSON encoded [`AlarmEvent`] per line.
//!
//! Writers never overwrite an existing file; they move on to the next free
//! `name.N.ext`.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use zonvakt_core::event::AlarmEvent;
use zonvakt_core::report::{ClimateReport, TEMPERATURE_PROBES};

use crate::error::HistoryError;

const START_HEADER: &str = "# Starting date ";
const COLUMNS_HEADER: &str = "# ms humidity t0 t1 t2 t3";

/// Source of persisted history for replay.
pub trait HistorySource: Send + Sync {
    fn read_climates(&self) -> Result<Vec<ClimateReport>, HistoryError>;
    fn read_alarms(&self) -> Result<Vec<AlarmEvent>, HistoryError>;
}

/// A zone that keeps no local history.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl HistorySource for NoHistory {
    fn read_climates(&self) -> Result<Vec<ClimateReport>, HistoryError> {
        Err(HistoryError::Unavailable("no climate log configured".into()))
    }

    fn read_alarms(&self) -> Result<Vec<AlarmEvent>, HistoryError> {
        Err(HistoryError::Unavailable("no alarm log configured".into()))
    }
}

/// History kept in a climate log file and an alarm log file.
#[derive(Debug, Clone)]
pub struct FileHistory {
    climate_path: PathBuf,
    alarm_path: PathBuf,
}

impl FileHistory {
    pub fn new(climate_path: impl Into<PathBuf>, alarm_path: impl Into<PathBuf>) -> Self {
        Self {
            climate_path: climate_path.into(),
            alarm_path: alarm_path.into(),
        }
    }
}

impl HistorySource for FileHistory {
    fn read_climates(&self) -> Result<Vec<ClimateReport>, HistoryError> {
        read_climate_log(&self.climate_path)
    }

    fn read_alarms(&self) -> Result<Vec<AlarmEvent>, HistoryError> {
        read_alarm_log(&self.alarm_path)
    }
}

pub fn read_climate_log(path: &Path) -> Result<Vec<ClimateReport>, HistoryError> {
    let file = File::open(path).map_err(|e| HistoryError::io(path, e))?;
    let mut start: Option<DateTime<Utc>> = None;
    let mut reports = Vec::new();

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let number = index + 1;
        let line = line.map_err(|e| HistoryError::io(path, e))?;
        let line = line.trim();

        if let Some(date) = line.strip_prefix(START_HEADER) {
            let date = DateTime::parse_from_rfc3339(date.trim())
                .map_err(|e| HistoryError::parse(path, number, format!("bad start date: {e}")))?;
            start = Some(date.with_timezone(&Utc));
            continue;
        }
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let start =
            start.ok_or_else(|| HistoryError::parse(path, number, "sample before start date header"))?;
        reports.push(parse_climate_line(line, start).map_err(|m| HistoryError::parse(path, number, m))?);
    }

    Ok(reports)
}

fn parse_climate_line(line: &str, start: DateTime<Utc>) -> Result<ClimateReport, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 2 + TEMPERATURE_PROBES {
        return Err(format!(
            "expected {} columns, found {}",
            2 + TEMPERATURE_PROBES,
            fields.len()
        ));
    }

    let offset: i64 = fields[0]
        .parse()
        .map_err(|_| format!("bad time offset {:?}", fields[0]))?;
    let humidity = parse_value(fields[1])?;
    let mut temperatures = [0.0; TEMPERATURE_PROBES];
    for (slot, field) in temperatures.iter_mut().zip(&fields[2..]) {
        *slot = parse_value(field)?;
    }

    Ok(ClimateReport::new(
        start + Duration::milliseconds(offset),
        humidity,
        temperatures,
    ))
}

fn parse_value(field: &str) -> Result<f32, String> {
    field.parse().map_err(|_| format!("bad value {:?}", field))
}

pub fn read_alarm_log(path: &Path) -> Result<Vec<AlarmEvent>, HistoryError> {
    let file = File::open(path).map_err(|e| HistoryError::io(path, e))?;
    let mut events = Vec::new();

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| HistoryError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line)
            .map_err(|e| HistoryError::parse(path, index + 1, e.to_string()))?;
        events.push(event);
    }

    Ok(events)
}

/// First of `path`, `name.1.ext`, `name.2.ext`, ... that does not exist yet.
pub fn available_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    (1u32..)
        .map(|n| {
            let name = match &extension {
                Some(ext) => format!("{stem}.{n}.{ext}"),
                None => format!("{stem}.{n}"),
            };
            path.with_file_name(name)
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

fn create_new(path: &Path) -> Result<(PathBuf, BufWriter<File>), HistoryError> {
    let path = available_path(path);
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| HistoryError::io(&path, e))?;
    Ok((path, BufWriter::new(file)))
}

/// Appends climate samples to a new climate log.
#[derive(Debug)]
pub struct ClimateLogWriter {
    path: PathBuf,
    start: DateTime<Utc>,
    out: BufWriter<File>,
}

impl ClimateLogWriter {
    /// Creates the log at `path` (or the next free name) with offsets counted
    /// from `start`.
    pub fn create(path: impl AsRef<Path>, start: DateTime<Utc>) -> Result<Self, HistoryError> {
        let (path, mut out) = create_new(path.as_ref())?;
        writeln!(out, "{}{}", START_HEADER, start.to_rfc3339())
            .and_then(|_| writeln!(out, "{}", COLUMNS_HEADER))
            .and_then(|_| out.flush())
            .map_err(|e| HistoryError::io(&path, e))?;
        Ok(Self { path, start, out })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, report: &ClimateReport) -> Result<(), HistoryError> {
        let offset = (report.time - self.start).num_milliseconds();
        let [t0, t1, t2, t3] = report.temperatures;
        writeln!(
            self.out,
            "{} {:.2} {:.2} {:.2} {:.2} {:.2}",
            offset, report.humidity, t0, t1, t2, t3
        )
        .and_then(|_| self.out.flush())
        .map_err(|e| HistoryError::io(&self.path, e))
    }
}

/// Appends alarm events to a new JSON lines log.
#[derive(Debug)]
pub struct AlarmLogWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl AlarmLogWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let (path, out) = create_new(path.as_ref())?;
        Ok(Self { path, out })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, event: &AlarmEvent) -> Result<(), HistoryError> {
        let line = serde_json::to_string(event)
            .map_err(|e| HistoryError::parse(&self.path, 0, e.to_string()))?;
        writeln!(self.out, "{line}")
            .and_then(|_| self.out.flush())
            .map_err(|e| HistoryError::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use zonvakt_core::alarm::{Alarm, DescribedFault, FanStatus};
    use zonvakt_core::event::AlarmStatus;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn climate_log_reads_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("box.climate");
        let mut writer = ClimateLogWriter::create(&path, start()).unwrap();

        let samples: Vec<ClimateReport> = (0..3)
            .map(|i| {
                ClimateReport::new(
                    start() + Duration::milliseconds(1500 * i),
                    60.5 + i as f32,
                    [21.25, 21.5, 22.0, 20.75],
                )
            })
            .collect();
        for sample in &samples {
            writer.append(sample).unwrap();
        }

        let read = read_climate_log(&path).unwrap();
        assert_eq!(read, samples);
    }

    #[test]
    fn alarm_log_reads_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("box.alarms");
        let mut writer = AlarmLogWriter::create(&path).unwrap();

        let events = vec![
            AlarmEvent::new(
                "h/zone/box",
                Alarm::described(DescribedFault::WaterLevelWarning),
                AlarmStatus::On,
                start(),
            ),
            AlarmEvent::new(
                "h/zone/box",
                Alarm::fan("intake", FanStatus::Stalled),
                AlarmStatus::Off,
                start() + Duration::seconds(3),
            ),
        ];
        for event in &events {
            writer.append(event).unwrap();
        }

        let history = FileHistory::new(dir.path().join("missing"), &path);
        assert_eq!(history.read_alarms().unwrap(), events);
        assert!(matches!(history.read_climates(), Err(HistoryError::Io { .. })));
    }

    #[test]
    fn writers_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("box.climate");

        let first = ClimateLogWriter::create(&path, start()).unwrap();
        let second = ClimateLogWriter::create(&path, start()).unwrap();
        let third = AlarmLogWriter::create(&path).unwrap();

        assert_eq!(first.path(), path);
        assert_eq!(second.path(), dir.path().join("box.1.climate"));
        assert_eq!(third.path(), dir.path().join("box.2.climate"));
    }

    #[test]
    fn malformed_lines_report_their_number() {
        let dir = tempfile::tempdir().unwrap();
        let climate = dir.path().join("bad.climate");
        std::fs::write(
            &climate,
            "# Starting date 2024-03-01T08:00:00+00:00\n# ms humidity t0 t1 t2 t3\n0 60.00 21.00 21.00 21.00 21.00\n10 oops 21.00 21.00 21.00 21.00\n",
        )
        .unwrap();
        match read_climate_log(&climate) {
            Err(HistoryError::Parse { line, .. }) => assert_eq!(line, 4),
            other => panic!("unexpected: {other:?}"),
        }

        let alarms = dir.path().join("bad.alarms");
        std::fs::write(&alarms, "\n{not json}\n").unwrap();
        match read_alarm_log(&alarms) {
            Err(HistoryError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn samples_need_a_start_date() {
        let dir = tempfile::tempdir().unwrap();
        let climate = dir.path().join("headless.climate");
        std::fs::write(&climate, "0 60.00 21.00 21.00 21.00 21.00\n").unwrap();
        assert!(matches!(
            read_climate_log(&climate),
            Err(HistoryError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn no_history_is_unavailable() {
        assert!(matches!(NoHistory.read_climates(), Err(HistoryError::Unavailable(_))));
        assert!(matches!(NoHistory.read_alarms(), Err(HistoryError::Unavailable(_))));
    }
}
