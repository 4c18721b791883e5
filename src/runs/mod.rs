pub mod file_repository;
pub mod repository;
pub mod service;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Phase names offered by clients. Free text is still accepted; this list is
/// advertised, not enforced.
pub const PHASE_VOCABULARY: [&str; 5] =
    ["Seedling", "Vegetative", "Flowering", "Drying", "Curing"];

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Active,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Temperature,
    Humidity,
    SoilMoisture,
    Conductivity,
    Light,
    Energy,
    Water,
    Camera,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    pub name: String,
    pub start_time: DateTime<Utc>,
    /// None while this is the current phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Weak reference to an external sensor entity. Validity of `sensor_id` is
/// not checked at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub metric_type: MetricType,
    pub sensor_id: String,
}

/// Cultivar metadata attached to a run by value; copying a snapshot between
/// runs creates independent copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CultivarSnapshot {
    pub name: String,
    pub breeder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flower_window_days: Option<u32>,
}

/// A grow run: the aggregate root. Phases and notes are kept in insertion
/// order, which is chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub friendly_name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default = "default_status")]
    pub status: RunStatus,
    #[serde(default)]
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub bindings: Vec<Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cultivar: Option<CultivarSnapshot>,
}

fn default_status() -> RunStatus {
    RunStatus::Active
}

impl RunRecord {
    pub fn new(friendly_name: String, start_time: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            friendly_name,
            start_time,
            end_time: None,
            status: RunStatus::Active,
            phases: Vec::new(),
            notes: Vec::new(),
            bindings: Vec::new(),
            cultivar: None,
        }
    }

    /// Close the current open phase at `now` and append a new one.
    ///
    /// "Harvest" (any case) also ends the run; any other phase name reopens
    /// a previously harvested run. At most one phase is ever open.
    pub fn add_phase(&mut self, name: &str, now: DateTime<Utc>) {
        if let Some(open) = self.phases.iter_mut().find(|p| p.end_time.is_none()) {
            open.end_time = Some(now);
        }

        self.phases.push(Phase {
            id: new_id(),
            name: name.to_string(),
            start_time: now,
            end_time: None,
        });

        if name.eq_ignore_ascii_case("harvest") {
            self.end_time = Some(now);
            self.status = RunStatus::Ended;
        } else {
            self.end_time = None;
            self.status = RunStatus::Active;
        }
    }

    pub fn add_note(&mut self, text: String, now: DateTime<Utc>) {
        self.notes.push(Note {
            id: new_id(),
            text,
            timestamp: now,
        });
    }

    /// Bindings are unique per metric type; re-binding a metric replaces the
    /// previous entry.
    pub fn set_binding(&mut self, metric_type: MetricType, sensor_id: String) {
        self.bindings.retain(|b| b.metric_type != metric_type);
        self.bindings.push(Binding {
            metric_type,
            sensor_id,
        });
    }

    pub fn end(&mut self, end_time: DateTime<Utc>) {
        self.status = RunStatus::Ended;
        self.end_time = Some(end_time);
        if let Some(open) = self.phases.iter_mut().find(|p| p.end_time.is_none()) {
            open.end_time = Some(end_time);
        }
    }

    /// Latest phase by insertion order, open or not. A harvested run reports
    /// "Harvest" here.
    pub fn active_phase_name(&self) -> Option<&str> {
        self.phases.last().map(|p| p.name.as_str())
    }

    pub fn open_phase(&self) -> Option<&Phase> {
        self.phases.iter().find(|p| p.end_time.is_none())
    }
}

/// Read-only projection served by list endpoints; recomputed from the run
/// list on demand.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub id: String,
    pub friendly_name: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cultivar: Option<String>,
    pub bindings: usize,
}

impl RunSummary {
    pub fn project(run: &RunRecord) -> Self {
        Self {
            id: run.id.clone(),
            friendly_name: run.friendly_name.clone(),
            status: run.status,
            start_time: run.start_time,
            end_time: run.end_time,
            active_phase: run.active_phase_name().map(String::from),
            cultivar: run.cultivar.as_ref().map(|c| c.name.clone()),
            bindings: run.bindings.len(),
        }
    }
}
