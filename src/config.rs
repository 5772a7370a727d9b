//! TOML-based scenario configuration: reservoir and contract rule files.
//!
//! Every policy constant the engines reference is an explicit field here,
//! so a rule file that omits a required attribute fails at parse time,
//! before any simulation state exists. Optional pieces (San Joaquin
//! restoration, delta requirements) are `Option`/defaulted; everything
//! physical is required.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::water_year::{ByWyt, WaterYearType};

/// Top-level scenario configuration parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulation identity and toggles.
    pub simulation: SimulationConfig,
    /// Reservoir rule file.
    pub reservoir: ReservoirRules,
    /// Contract rule files, one per `[[contract]]` table.
    #[serde(rename = "contract")]
    pub contracts: Vec<ContractRules>,
    /// Historical regime: per-year types and delta requirements.
    pub history: HistoryConfig,
}

/// Simulation identity and global toggles.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Reservoir key; selects `<KEY>_<field>` hydrology columns.
    pub key: String,
    /// San Joaquin restoration releases in effect.
    #[serde(default)]
    pub sjrr: bool,
    /// First water year of the built-in synthetic record (used when no
    /// hydrology CSV is supplied).
    #[serde(default = "default_start_year")]
    pub start_year: i32,
    /// Length of the built-in synthetic record in water years.
    #[serde(default = "default_years")]
    pub years: usize,
}

fn default_start_year() -> i32 {
    2000
}

fn default_years() -> usize {
    8
}

/// Static rule file for one reservoir.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReservoirRules {
    /// Gross pool capacity (taf).
    pub capacity: f64,
    /// Minimum storage below which no release is possible (taf).
    pub dead_pool: f64,
    /// Maximum controlled outflow (cfs).
    pub max_outflow: f64,
    /// End-of-September carryover storage target by water-year type (taf).
    pub carryover_target: ByWyt<f64>,
    /// Fraction of storage above the carryover target that raises the
    /// effective end-of-year target (0..=1).
    pub carryover_excess_use: f64,
    /// Calendar month snowmelt inflow begins (1..=4).
    pub melt_start: u32,
    /// Environmental minimum flow by water-year type and calendar month (cfs).
    pub env_min_flow: ByWyt<[f64; 12]>,
    /// Downstream temperature/fish target releases by type and month (cfs).
    pub temp_releases: ByWyt<[f64; 12]>,
    /// North-of-delta consumptive demand schedule by calendar month (taf/day).
    pub nodd: [f64; 12],
    /// Whether north-of-delta deliveries count toward the environmental
    /// minimum (true) or stack on top of it (false).
    pub nodd_meets_envmin: bool,
    /// Whether a downstream monitoring point carries its own target flow.
    pub has_downstream_target_flow: bool,
    /// Share of delta outflow requirements assigned to this reservoir (0..=1).
    pub delta_outflow_pct: f64,
    /// Flood-control top-of-conservation-storage surface.
    pub tocs: TocsRule,
    /// San Joaquin restoration release schedule (Millerton only).
    #[serde(default)]
    pub sj_restoration: Option<SjRestorationRule>,
}

/// Piecewise flood-control storage surface over (day-of-water-year,
/// flood-control index).
///
/// `index` is sorted descending (wettest first); row `i` of `dowy`/`storage`
/// is the curve in effect at `index[i]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TocsRule {
    pub index: Vec<f64>,
    pub dowy: Vec<Vec<f64>>,
    pub storage: Vec<Vec<f64>>,
}

/// San Joaquin River restoration release schedule: per dowy-threshold row,
/// a release curve indexed by the combined full-natural-flow forecast.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SjRestorationRule {
    pub dowy: Vec<f64>,
    pub index: Vec<f64>,
    /// Release schedule rows (cfs), one per `dowy` threshold.
    pub release: Vec<Vec<f64>>,
}

/// Static rule file for one delivery contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContractRules {
    /// Contract key used in export column names.
    pub key: String,
    /// Nominal maximum allocation (taf/year).
    pub total: f64,
    /// Shares the priority allocation pool.
    pub allocation_priority: bool,
    /// Shares the priority storage pool.
    pub storage_priority: bool,
    /// Allocation throttle by water-year type (fraction of `total`).
    pub reduction: ByWyt<f64>,
    /// Ceiling applied to the carried-over allocation forecast (taf).
    pub max_forecast_value: f64,
    /// Delivery request schedule by calendar month (taf/day); composition
    /// glue for routing, not part of the allocation rules.
    #[serde(default)]
    pub monthly_demand: [f64; 12],
}

/// Historical regime inputs for the obligation replay.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    /// Water-year type of each historical water year, in order.
    pub water_year_types: Vec<WaterYearType>,
    /// Delta outflow requirement by type and calendar month (cfs).
    #[serde(default)]
    pub delta_req: Option<ByWyt<[f64; 12]>>,
    /// Delta depletions by calendar month (taf/day).
    #[serde(default)]
    pub depletions: [f64; 12],
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"reservoir.capacity"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {} — {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl ScenarioConfig {
    /// Built-in demo scenario: one foothill reservoir with a priority and a
    /// secondary contract, runnable against the synthetic hydrology record.
    pub fn demo() -> Self {
        let toml = include_str!("demo_scenario.toml");
        Self::from_toml_str(toml).expect("built-in demo scenario parses")
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["demo"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "demo" => Ok(Self::demo()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read, the TOML is
    /// invalid, or a required rule attribute is missing.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "scenario".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let push = |errors: &mut Vec<ConfigError>, field: &str, message: String| {
            errors.push(ConfigError {
                field: field.to_string(),
                message,
            });
        };

        let r = &self.reservoir;
        if r.capacity <= 0.0 {
            push(&mut errors, "reservoir.capacity", "must be > 0".into());
        }
        if r.dead_pool < 0.0 || r.dead_pool >= r.capacity {
            push(
                &mut errors,
                "reservoir.dead_pool",
                "must be in [0, capacity)".into(),
            );
        }
        if r.max_outflow <= 0.0 {
            push(&mut errors, "reservoir.max_outflow", "must be > 0".into());
        }
        if !(0.0..=1.0).contains(&r.carryover_excess_use) {
            push(
                &mut errors,
                "reservoir.carryover_excess_use",
                "must be in [0.0, 1.0]".into(),
            );
        }
        if !(1..=4).contains(&r.melt_start) {
            push(
                &mut errors,
                "reservoir.melt_start",
                format!("must be a month in 1..=4, got {}", r.melt_start),
            );
        }
        if !(0.0..=1.0).contains(&r.delta_outflow_pct) {
            push(
                &mut errors,
                "reservoir.delta_outflow_pct",
                "must be in [0.0, 1.0]".into(),
            );
        }

        let t = &r.tocs;
        if t.index.is_empty() {
            push(&mut errors, "reservoir.tocs.index", "must not be empty".into());
        }
        if t.index.windows(2).any(|w| w[0] <= w[1]) {
            push(
                &mut errors,
                "reservoir.tocs.index",
                "must be sorted descending (wettest first)".into(),
            );
        }
        if t.dowy.len() != t.index.len() || t.storage.len() != t.index.len() {
            push(
                &mut errors,
                "reservoir.tocs",
                "dowy and storage need one row per index entry".into(),
            );
        } else {
            for (i, (d, s)) in t.dowy.iter().zip(&t.storage).enumerate() {
                if d.len() != s.len() || d.len() < 2 {
                    push(
                        &mut errors,
                        "reservoir.tocs",
                        format!("row {i}: dowy/storage lengths must match and be >= 2"),
                    );
                }
                if d.windows(2).any(|w| w[0] > w[1]) {
                    push(
                        &mut errors,
                        "reservoir.tocs.dowy",
                        format!("row {i}: must be sorted ascending"),
                    );
                }
            }
        }

        if self.contracts.is_empty() {
            push(&mut errors, "contract", "at least one contract required".into());
        }
        for (i, c) in self.contracts.iter().enumerate() {
            if c.total <= 0.0 {
                push(&mut errors, &format!("contract[{i}].total"), "must be > 0".into());
            }
            if c.max_forecast_value <= 0.0 {
                push(
                    &mut errors,
                    &format!("contract[{i}].max_forecast_value"),
                    "must be > 0".into(),
                );
            }
            for wyt in WaterYearType::ALL {
                let red = *c.reduction.get(wyt);
                if !(0.0..=1.0).contains(&red) {
                    push(
                        &mut errors,
                        &format!("contract[{i}].reduction.{}", wyt.as_str()),
                        "must be in [0.0, 1.0]".into(),
                    );
                }
            }
        }
        if !self.contracts.iter().any(|c| c.allocation_priority) {
            push(
                &mut errors,
                "contract",
                "at least one contract must hold allocation priority".into(),
            );
        }

        if self.history.water_year_types.is_empty() {
            push(
                &mut errors,
                "history.water_year_types",
                "must list one type per historical water year".into(),
            );
        }

        errors
    }
}
