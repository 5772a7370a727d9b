//! Contract engine: allocation, storage pools, and delivery accounting.
//!
//! One `Contract` tracks a single delivery contract against one reservoir's
//! available water. Allocation and storage-pool inputs come from the
//! priority process sequencing all contracts on the reservoir; delivery
//! figures come from the routing process. Both mutate the contract once per
//! day, plus an annual roll-up on the last day of each water year.

use log::debug;

use crate::config::ContractRules;
use crate::hydrology::HydrologyRecord;
use crate::water_year::WaterYearType;

/// The four delivery source tiers, stacked for area-chart reporting.
///
/// Each tier's recorded value includes all lower tiers' volumes, so within
/// any day `contract <= carryover <= turnback <= flood` by construction.
#[derive(Debug, Clone)]
pub struct SupplyStack {
    pub contract: Vec<f64>,
    pub carryover: Vec<f64>,
    pub turnback: Vec<f64>,
    pub flood: Vec<f64>,
}

impl SupplyStack {
    fn zeros(len: usize) -> Self {
        Self {
            contract: vec![0.0; len],
            carryover: vec![0.0; len],
            turnback: vec![0.0; len],
            flood: vec![0.0; len],
        }
    }

    /// `(tier, values)` pairs in stacking order.
    pub fn series(&self) -> [(&'static str, &[f64]); 4] {
        [
            ("contract", &self.contract),
            ("carryover", &self.carryover),
            ("turnback", &self.turnback),
            ("flood", &self.flood),
        ]
    }
}

/// A delivery contract drawing on one reservoir.
pub struct Contract {
    pub key: String,
    rules: ContractRules,

    /// Allocation announced each day (taf).
    pub allocation: Vec<f64>,
    /// Share of reservoir storage currently accessible (taf).
    pub storage_pool: Vec<f64>,
    /// Water physically available for delivery today (taf).
    pub available_water: Vec<f64>,

    /// Contract deliveries per water year (taf).
    pub annual_deliveries: Vec<f64>,
    /// Flood-water deliveries per water year (taf).
    pub flood_deliveries: Vec<f64>,
    /// Running total of deliveries made (taf).
    pub daily_deliveries: f64,

    /// Carryover balance held in reservoir storage (taf).
    pub tot_carryover: f64,
    /// Carryover converted to next year's allocation instead (taf).
    pub tot_new_alloc: f64,
    /// Projected carryover into next year (taf).
    pub projected_carryover: f64,
    /// Prior year's allocation forecast, the baseline ceiling for the next
    /// year's early-season allocation.
    pub last_year_forecast: f64,
    max_allocation: f64,

    /// Per-day stacked delivery sources.
    pub daily_supplies: SupplyStack,
    /// Per-water-year delivery sources (unstacked components).
    pub annual_supplies: SupplyStack,
}

impl Contract {
    /// Builds the contract with state arrays sized to the record.
    pub fn new(rules: ContractRules, record: &HydrologyRecord) -> Self {
        let t_len = record.len();
        let num_wy = record.num_water_years();
        Self {
            key: rules.key.clone(),
            max_allocation: rules.total,
            last_year_forecast: rules.max_forecast_value,
            rules,
            allocation: vec![0.0; t_len],
            storage_pool: vec![0.0; t_len],
            available_water: vec![0.0; t_len],
            annual_deliveries: vec![0.0; num_wy],
            flood_deliveries: vec![0.0; num_wy],
            daily_deliveries: 0.0,
            tot_carryover: 0.0,
            tot_new_alloc: 0.0,
            projected_carryover: 0.0,
            daily_supplies: SupplyStack::zeros(t_len),
            annual_supplies: SupplyStack::zeros(num_wy),
        }
    }

    /// Nominal maximum allocation (taf).
    pub fn total(&self) -> f64 {
        self.rules.total
    }

    /// Whether this contract shares the priority allocation pool.
    pub fn is_allocation_priority(&self) -> bool {
        self.rules.allocation_priority
    }

    /// Whether this contract shares the priority storage pool.
    pub fn is_storage_priority(&self) -> bool {
        self.rules.storage_priority
    }

    /// Delivery request for calendar month `month` (taf/day).
    pub fn requested_delivery(&self, month: u32) -> f64 {
        self.rules.monthly_demand[month as usize - 1]
    }

    /// Computes today's allocation from the shared availability forecast.
    ///
    /// Priority contracts scale their share of the forecast by nominal size
    /// within the priority pool; secondary contracts only see what remains
    /// once the whole priority pool is covered. Near the end of the water
    /// year (dowy 360) the raw forecast is taken as-is and recorded as next
    /// year's baseline. The result is capped by the nominal maximum and by
    /// the water-year-type reduction policy.
    pub fn calc_allocation(
        &mut self,
        t: usize,
        dowy: usize,
        forecast_available: f64,
        priority_allocation: f64,
        secondary_allocation: f64,
        wyt: WaterYearType,
    ) {
        let mut forecast_used = if self.rules.allocation_priority {
            forecast_available * self.rules.total / priority_allocation
        } else {
            (forecast_available - priority_allocation) * self.rules.total / secondary_allocation
        };

        if dowy == 360 {
            forecast_used = forecast_available;
            self.last_year_forecast = forecast_available;
        }
        if forecast_used > self.max_allocation {
            forecast_used = self.max_allocation;
        }
        self.allocation[t] = forecast_used.min(self.rules.total * self.rules.reduction.get(wyt));
        debug!("{} t={t} allocation={:.1}", self.key, self.allocation[t]);
    }

    /// Partitions the reservoir's arrived water into this contract's
    /// storage pool.
    ///
    /// `total_water` is what has physically arrived at the reservoir this
    /// year (storage plus deliveries already made); `priority_storage` is
    /// the combined requirement of all priority contracts. Priority
    /// contracts share `total_water` proportionally; secondary contracts
    /// wait until the full priority requirement has arrived and then access
    /// the remainder.
    pub fn find_storage_pool(
        &mut self,
        t: usize,
        total_water: f64,
        reservoir_storage: f64,
        priority_storage: f64,
    ) {
        let entitlement = self.allocation[t] + self.tot_carryover;
        if self.rules.storage_priority {
            if priority_storage > 0.0 {
                self.storage_pool[t] = (total_water / priority_storage).min(1.0) * entitlement;
                self.available_water[t] = reservoir_storage * entitlement / priority_storage;
            } else {
                self.storage_pool[t] = entitlement;
                self.available_water[t] = reservoir_storage.min(entitlement);
            }
        } else {
            self.storage_pool[t] = entitlement.min((total_water - priority_storage).max(0.0));
            self.available_water[t] = (total_water - priority_storage)
                .min(entitlement)
                .min(reservoir_storage);
        }
    }

    /// Tallies a delivery into the annual ledgers. Flood-sourced water is
    /// tracked separately from contract water.
    pub fn adjust_accounts(&mut self, contract_deliveries: f64, is_flood: bool, wateryear: usize) {
        if is_flood {
            self.flood_deliveries[wateryear] += contract_deliveries;
        } else {
            self.annual_deliveries[wateryear] += contract_deliveries;
            self.daily_deliveries += contract_deliveries;
        }
    }

    /// Decomposes today's deliveries by source and records them as stacked
    /// cumulative tiers; on Sep 30 the same decomposition rolls into the
    /// annual totals.
    #[allow(clippy::too_many_arguments)]
    pub fn accounting(
        &mut self,
        t: usize,
        day: u32,
        month: u32,
        wateryear: usize,
        deliveries: f64,
        carryover: f64,
        turnback: f64,
        flood: f64,
    ) {
        let contract_del = (deliveries - carryover.max(0.0) - turnback.max(0.0)).max(0.0);
        let carryover_del = carryover.min(deliveries).max(0.0);
        let turnback_del = turnback.min(deliveries - carryover).max(0.0);
        let flood_del = flood;

        self.daily_supplies.contract[t] += contract_del;
        self.daily_supplies.carryover[t] += carryover_del + contract_del;
        self.daily_supplies.turnback[t] += turnback_del + carryover_del + contract_del;
        self.daily_supplies.flood[t] += flood_del + turnback_del + carryover_del + contract_del;

        if month == 9 && day == 30 {
            self.annual_supplies.contract[wateryear] += contract_del;
            self.annual_supplies.carryover[wateryear] += carryover_del;
            self.annual_supplies.turnback[wateryear] += turnback_del;
            self.annual_supplies.flood[wateryear] += flood_del;
        }
    }
}
