// Message types: drive commands in, telemetry and health out

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// Command from teleop/scripts -> runtime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriveCommand {
    /// Forward output, percent in [-1, 1]
    pub speed: f64,
    /// Turn output, percent in [-1, 1] (positive = right)
    pub turn: f64,
}

/// One named numeric value for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEntry {
    pub key: String,
    pub value: f64,
}

impl TelemetryEntry {
    pub fn new(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Anything that accepts named values (dashboard, log, network publisher)
pub trait TelemetrySink {
    fn put_number(&mut self, key: &str, value: f64);

    fn put_all(&mut self, entries: &[TelemetryEntry]) {
        for entry in entries {
            self.put_number(&entry.key, entry.value);
        }
    }
}

/// Latest value per key, kept in memory
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dashboard {
    values: BTreeMap<String, f64>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Current values as entries, sorted by key
    pub fn entries(&self) -> Vec<TelemetryEntry> {
        self.values
            .iter()
            .map(|(key, &value)| TelemetryEntry::new(key.clone(), value))
            .collect()
    }
}

impl TelemetrySink for Dashboard {
    fn put_number(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_string(), value);
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    DeviceFault,
}
