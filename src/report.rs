//! Session report and export functionality

use crate::audit::AuditRecord;
use crate::device::EventClass;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Complete session report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Report metadata
    pub metadata: ReportMetadata,
    /// Total events emitted (or attempted)
    pub total_events: u64,
    /// Delay statistics per event class
    pub key: DelayStats,
    pub movement: DelayStats,
    pub other: DelayStats,
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Session start timestamp
    pub started_at: String,
    /// Report generation timestamp
    pub generated_at: String,
    /// Application version
    pub version: String,
    /// Session duration in seconds
    pub duration_secs: f64,
}

/// Applied delays for one event class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DelayStats {
    pub count: u64,
    pub min_delay_ms: Option<u32>,
    pub max_delay_ms: Option<u32>,
    pub mean_delay_ms: Option<f64>,
    #[serde(skip)]
    total_ms: u64,
}

impl DelayStats {
    /// Add one applied delay
    pub fn record(&mut self, delay_ms: u32) {
        self.count += 1;
        self.total_ms += u64::from(delay_ms);
        self.min_delay_ms = Some(self.min_delay_ms.map_or(delay_ms, |m| m.min(delay_ms)));
        self.max_delay_ms = Some(self.max_delay_ms.map_or(delay_ms, |m| m.max(delay_ms)));
        self.mean_delay_ms = Some(self.total_ms as f64 / self.count as f64);
    }
}

impl fmt::Display for DelayStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min_delay_ms, self.max_delay_ms, self.mean_delay_ms) {
            (Some(min), Some(max), Some(mean)) => write!(
                f,
                "{} events, delay {}-{} ms (avg {:.1} ms)",
                self.count, min, max, mean
            ),
            _ => write!(f, "no events"),
        }
    }
}

impl SessionReport {
    /// Build a report from the audit records of a session
    pub fn new(started_at: DateTime<Utc>, records: &[AuditRecord]) -> Self {
        let now: DateTime<Utc> = Utc::now();
        let duration_secs = (now - started_at).num_milliseconds().max(0) as f64 / 1000.0;

        let mut key = DelayStats::default();
        let mut movement = DelayStats::default();
        let mut other = DelayStats::default();
        for record in records {
            let stats = match record.class {
                EventClass::Key => &mut key,
                EventClass::Move => &mut movement,
                EventClass::Other => &mut other,
            };
            stats.record(record.delay_ms);
        }

        Self {
            metadata: ReportMetadata {
                started_at: started_at.to_rfc3339(),
                generated_at: now.to_rfc3339(),
                version: crate::VERSION.to_string(),
                duration_secs,
            },
            total_events: records.len() as u64,
            key,
            movement,
            other,
        }
    }

    /// Log a short summary
    pub fn log_summary(&self) {
        log::info!(
            "Session of {:.1}s: {} events emitted",
            self.metadata.duration_secs,
            self.total_events
        );
        log::info!("  keys:     {}", self.key);
        log::info!("  movement: {}", self.movement);
        if self.other.count > 0 {
            log::info!("  other:    {}", self.other);
        }
    }

    /// Export report to JSON file
    pub fn export_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Export report to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{RawInputEvent, EV_MSC};
    use chrono::Duration;

    fn records() -> Vec<AuditRecord> {
        vec![
            AuditRecord::new(&RawInputEvent::key(30, 1, 0), 40),
            AuditRecord::new(&RawInputEvent::key(30, 0, 1), 60),
            AuditRecord::new(&RawInputEvent::movement(0, 3, 2), 0),
            AuditRecord::new(&RawInputEvent::new(EV_MSC, 4, 30, 3), 50),
        ]
    }

    #[test]
    fn stats_per_class() {
        let report = SessionReport::new(Utc::now() - Duration::seconds(2), &records());

        assert_eq!(report.total_events, 4);
        assert_eq!(report.key.count, 2);
        assert_eq!(report.key.min_delay_ms, Some(40));
        assert_eq!(report.key.max_delay_ms, Some(60));
        assert_eq!(report.key.mean_delay_ms, Some(50.0));
        assert_eq!(report.movement.count, 1);
        assert_eq!(report.movement.max_delay_ms, Some(0));
        assert_eq!(report.other.count, 1);
        assert!(report.metadata.duration_secs >= 2.0);
    }

    #[test]
    fn empty_session_has_no_stats() {
        let report = SessionReport::new(Utc::now(), &[]);
        assert_eq!(report.total_events, 0);
        assert_eq!(report.key, DelayStats::default());
        assert_eq!(report.key.to_string(), "no events");
    }

    #[test]
    fn stats_display() {
        let mut stats = DelayStats::default();
        stats.record(10);
        stats.record(21);
        assert_eq!(stats.to_string(), "2 events, delay 10-21 ms (avg 15.5 ms)");
    }

    #[test]
    fn json_export_contains_metadata_and_classes() {
        let report = SessionReport::new(Utc::now(), &records());
        let json = report.to_json().expect("Failed to serialize");

        assert!(json.contains("\"version\""));
        assert!(json.contains("\"movement\""));
        assert!(json.contains("\"mean_delay_ms\": 50.0"));
        assert!(!json.contains("total_ms"));

        let path = std::env::temp_dir().join(format!(
            "delay-daemon-report-{}.json",
            std::process::id()
        ));
        report.export_json(&path).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["key"]["count"], 2);
        let _ = std::fs::remove_file(&path);
    }
}
