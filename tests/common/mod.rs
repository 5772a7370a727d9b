//! Shared fixtures for integration tests.
#![allow(dead_code)]

use resop_sim::config::{ContractRules, ReservoirRules, ScenarioConfig, TocsRule};
use resop_sim::hydrology::HydrologyRecord;
use resop_sim::water_year::ByWyt;

/// Flood-control surface pinned at one level for every day and index.
pub fn flat_tocs(level: f64) -> TocsRule {
    TocsRule {
        index: vec![10.0, 0.0],
        dowy: vec![vec![0.0, 364.0], vec![0.0, 364.0]],
        storage: vec![vec![level, level], vec![level, level]],
    }
}

/// Minimal reservoir rules: no environmental requirements, flood pool at
/// capacity, so only the physical clamps act.
pub fn simple_rules(capacity: f64, dead_pool: f64) -> ReservoirRules {
    ReservoirRules {
        capacity,
        dead_pool,
        max_outflow: 500_000.0,
        carryover_target: ByWyt::uniform(0.0),
        carryover_excess_use: 1.0,
        melt_start: 4,
        env_min_flow: ByWyt::uniform([0.0; 12]),
        temp_releases: ByWyt::uniform([0.0; 12]),
        nodd: [0.0; 12],
        nodd_meets_envmin: true,
        has_downstream_target_flow: false,
        delta_outflow_pct: 0.0,
        tocs: flat_tocs(capacity),
        sj_restoration: None,
    }
}

/// One-year record with constant inflow and no losses.
pub fn constant_record(inflow_taf: f64, storage0: f64) -> HydrologyRecord {
    let mut rec = HydrologyRecord::synthetic("TST", 2000, 1);
    for t in 0..rec.len() {
        rec.inflow[t] = inflow_taf;
        rec.evaporation[t] = 0.0;
        rec.gains[t] = 0.0;
        rec.flood_index[t] = 5.0;
        rec.snowpack[t] = 0.0;
        rec.fnf[t] = 0.0;
    }
    rec.storage[0] = storage0;
    rec
}

/// Contract rules with a uniform reduction policy.
pub fn contract_rules(key: &str, total: f64, priority: bool) -> ContractRules {
    ContractRules {
        key: key.to_string(),
        total,
        allocation_priority: priority,
        storage_priority: priority,
        reduction: ByWyt::uniform(1.0),
        max_forecast_value: total,
        monthly_demand: [0.0; 12],
    }
}

/// Demo scenario trimmed to `years` water years, with a matching synthetic
/// record.
pub fn demo_scenario(years: usize) -> (ScenarioConfig, HydrologyRecord) {
    let mut cfg = ScenarioConfig::demo();
    cfg.history.water_year_types.truncate(years);
    let record = HydrologyRecord::synthetic(&cfg.simulation.key, cfg.simulation.start_year, years);
    (cfg, record)
}
