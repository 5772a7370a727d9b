//! Daily composition loop for one reservoir and its contracts.
//!
//! Sequences the engines in the fixed per-day order: availability
//! forecast, allocation, storage pools, release determination and mass
//! balance, then delivery accounting. The allocation split and the
//! delivery routing here are deliberately thin stand-ins for the external
//! priority and routing processes; the engines themselves carry all the
//! policy logic.

use chrono::NaiveDate;
use log::info;

use crate::config::ScenarioConfig;
use crate::error::SimError;
use crate::hydrology::HydrologyRecord;
use crate::sim::clock::Clock;
use crate::sim::contract::Contract;
use crate::sim::kpi::RunSummary;
use crate::sim::reservoir::Reservoir;
use crate::sim::types::{DayContext, ReleaseMode};
use crate::water_year::{ByWyt, DAYS_IN_MONTH, WaterYearType};

/// Completed run: the engines with their full per-day series, plus the
/// post-hoc summary.
pub struct RunResult {
    pub dates: Vec<NaiveDate>,
    pub reservoir: Reservoir,
    pub contracts: Vec<Contract>,
    pub summary: RunSummary,
}

/// Runs the full historical record for the configured reservoir and
/// contracts. Deterministic: identical inputs give identical series.
///
/// # Errors
///
/// Returns `MissingConfiguration` when the historical water-year-type list
/// does not cover the record, or when the reservoir rules are unusable.
pub fn run_scenario(cfg: &ScenarioConfig, record: &HydrologyRecord) -> Result<RunResult, SimError> {
    let history = &cfg.history.water_year_types;
    if history.len() < record.num_water_years() {
        return Err(SimError::MissingConfiguration(format!(
            "history.water_year_types lists {} years but the record spans {}",
            history.len(),
            record.num_water_years()
        )));
    }

    let mut reservoir = Reservoir::new(cfg.reservoir.clone(), record)?;
    reservoir.calc_expected_min_release(
        record,
        history,
        cfg.history.delta_req.as_ref(),
        &cfg.history.depletions,
        cfg.simulation.sjrr,
    );

    let mut contracts: Vec<Contract> = cfg
        .contracts
        .iter()
        .map(|rules| Contract::new(rules.clone(), record))
        .collect();

    let priority_total: f64 = contracts
        .iter()
        .filter(|c| c.is_allocation_priority())
        .map(|c| c.total())
        .sum();
    let secondary_total: f64 = contracts
        .iter()
        .filter(|c| !c.is_allocation_priority())
        .map(|c| c.total())
        .sum();
    let all_total = priority_total + secondary_total;

    // Aggregate contract demand into the reservoir's monthly consumptive
    // schedule (taf per month) for demand-mode fill projections.
    let monthly = |wyt: WaterYearType| -> [f64; 12] {
        let mut table = [0.0; 12];
        for c in &cfg.contracts {
            for (m, entry) in table.iter_mut().enumerate() {
                *entry += c.monthly_demand[m] * DAYS_IN_MONTH[m] * c.reduction.get(wyt);
            }
        }
        table
    };
    reservoir.monthly_demand = ByWyt {
        wet: monthly(WaterYearType::Wet),
        above_normal: monthly(WaterYearType::AboveNormal),
        below_normal: monthly(WaterYearType::BelowNormal),
        dry: monthly(WaterYearType::Dry),
        critical: monthly(WaterYearType::Critical),
        extreme_critical: None,
    };

    info!(
        "{}: running {} days, {} contracts",
        record.key,
        record.len(),
        contracts.len()
    );

    let start_wy = record.start_water_year();
    let mut clock = Clock::new(record.dates[0], record.len());
    // Deliveries made so far this water year; counts toward the water that
    // has "arrived" for storage-pool partitioning.
    let mut year_deliveries = 0.0;

    while let Some((t, date)) = clock.tick() {
        let day = DayContext::new(t, date, start_wy);
        let wyt = history[day.water_year_index];
        reservoir.forecast_wyt = wyt;
        if day.dowy == 0 {
            year_deliveries = 0.0;
        }
        reservoir.sjrr_release = if cfg.simulation.sjrr {
            reservoir.sj_restoration_release(t, day.dowy)
        } else {
            0.0
        };

        // (1) Availability forecast, plus the flood projection that tells
        // us whether uncontrolled water is coming.
        reservoir.find_available_storage(&day);
        reservoir.find_flow_pumping(&day, wyt, ReleaseMode::Environmental);

        // (2) Allocations against the shared forecast.
        let forecast_available = reservoir.available_storage[t].max(0.0);
        for c in contracts.iter_mut() {
            c.calc_allocation(
                t,
                day.dowy,
                forecast_available,
                priority_total,
                secondary_total,
                wyt,
            );
        }

        // (3) Storage pools from what has physically arrived.
        let priority_storage: f64 = contracts
            .iter()
            .filter(|c| c.is_storage_priority())
            .map(|c| c.allocation[t] + c.tot_carryover)
            .sum();
        let total_water = reservoir.storage[t] + year_deliveries;
        for c in contracts.iter_mut() {
            c.find_storage_pool(t, total_water, reservoir.storage[t], priority_storage);
        }

        // Delivery routing: request the monthly schedule, capped by the
        // water each contract can physically reach today and by what is
        // left of its storage pool this year.
        let mut deliveries = vec![0.0; contracts.len()];
        let mut sodd = 0.0;
        for (i, c) in contracts.iter().enumerate() {
            let pool_remaining =
                (c.storage_pool[t] - c.annual_deliveries[day.water_year_index]).max(0.0);
            let delivered = c
                .requested_delivery(day.month)
                .min(c.available_water[t].max(0.0))
                .min(pool_remaining);
            deliveries[i] = delivered;
            sodd += delivered;
        }

        // (4) Release determination and the mass-balance step.
        reservoir.sodd = sodd;
        reservoir.release_environmental(&day, wyt);
        reservoir.step(t);
        year_deliveries += sodd;

        // (5) Delivery accounting. Uncontrolled flood water is routed to
        // contracts by nominal share; carryover is drawn down first.
        let flood_rate = reservoir.min_daily_uncontrolled;
        for (i, c) in contracts.iter_mut().enumerate() {
            let carry_used = deliveries[i].min(c.tot_carryover);
            c.tot_carryover -= carry_used;
            let flood_share = if all_total > 0.0 {
                flood_rate * c.total() / all_total
            } else {
                0.0
            };
            c.accounting(
                t,
                day.day,
                day.month,
                day.water_year_index,
                deliveries[i],
                carry_used,
                0.0,
                flood_share,
            );
            c.adjust_accounts(deliveries[i], false, day.water_year_index);
            if flood_share > 0.0 {
                c.adjust_accounts(flood_share, true, day.water_year_index);
            }
        }
        if day.is_water_year_end() {
            for c in contracts.iter_mut() {
                // Unused allocation stays in storage as carryover.
                c.projected_carryover =
                    (c.allocation[t] - c.annual_deliveries[day.water_year_index]).max(0.0);
                c.tot_carryover = c.projected_carryover;
            }
        }
    }

    let summary = RunSummary::from_run(&reservoir, &contracts);
    info!("{}: done, end storage {:.1} taf", record.key, summary.end_storage);
    Ok(RunResult {
        dates: record.dates.clone(),
        reservoir,
        contracts,
        summary,
    })
}
