//! Reservoir engine: forecasting, release determination, and mass balance.
//!
//! One `Reservoir` owns its per-day state arrays exclusively and is mutated
//! once per simulated day, in strict time order, by three calls:
//! `find_available_storage`, `release_environmental`, then `step`. The
//! regression preprocessor runs once at construction; the environmental
//! obligation tables are built once by `calc_expected_min_release` before
//! the daily loop.

use log::{debug, info};

use crate::config::ReservoirRules;
use crate::error::SimError;
use crate::forecast::{FlowForecasts, FlowShape};
use crate::hydrology::HydrologyRecord;
use crate::sim::types::{DayContext, ReleaseMode};
use crate::water_year::{
    ByWyt, CFS_TAFD, DAYS_IN_MONTH, EXCEEDANCE_Z, FIRST_OF_MONTH_DOY, WaterYearType,
    day_of_water_year, dowy_month_end, dowy_month_start, doy_for_dowy, interp, month_for_dowy,
};

/// Day-of-water-year one past the end of the snowmelt season (Jul 31).
const SNOW_SEASON_END: usize = 304;

/// Day-of-water-year one past the Oct–Nov window.
const OCT_NOV_END: usize = 61;

/// Sentinel for "no fill projected within the horizon".
const NO_FILLUP: f64 = 999.99;

/// A water-supply reservoir simulated over the historical record.
pub struct Reservoir {
    pub key: String,
    rules: ReservoirRules,

    // Input series (taf/day unless noted), owned copies from the record.
    inflow: Vec<f64>,
    evaporation: Vec<f64>,
    flood_index: Vec<f64>,
    gains: Vec<f64>,

    forecasts: FlowForecasts,
    flow_shape: FlowShape,

    /// Storage at the start of each day (taf); length T + 1.
    pub storage: Vec<f64>,
    /// Total release each day (taf/day).
    pub release: Vec<f64>,
    /// Top-of-conservation storage each day (taf).
    pub tocs: Vec<f64>,
    /// Storage available for export each day (taf).
    pub available_storage: Vec<f64>,
    /// Pre-clip release target each day (taf/day).
    pub release_target: Vec<f64>,
    /// Release net of basin use and consumed water rights (taf/day).
    pub release_to_delta: Vec<f64>,

    /// Confidence-adjusted rain-season forecast per day (taf).
    pub rainflood_forecast: Vec<f64>,
    /// Confidence-adjusted snowmelt-season forecast per day (taf).
    pub snowflood_forecast: Vec<f64>,
    /// Confidence-adjusted baseline-season forecast per day (taf).
    pub baseline_forecast: Vec<f64>,

    // Seasonal observed-flow accumulators, reset each Oct 1.
    rainflood_flows: f64,
    snowflood_flows: f64,
    baseline_flows: f64,
    exceedance_level: usize,
    evap_forecast: f64,
    eos_day: usize,
    /// Effective end-of-September storage target (taf).
    pub eos_target: f64,
    last_year_eos_target: f64,
    last_year_rainflood: f64,

    /// Water-year-type forecast driving the rule tables.
    pub forecast_wyt: WaterYearType,
    /// Environmental release decided for the current day (taf/day).
    pub envmin: f64,
    /// Contract-driven storage withdrawal for delivery (taf/day).
    pub sodd: f64,
    /// Exchange inflow obligation (taf/day).
    pub din: f64,
    /// Exchange outflow obligation (taf/day).
    pub dout: f64,
    basinuse: f64,
    consumed_releases: f64,
    /// Running downstream gains credited toward the delta (taf).
    pub gains_to_delta: f64,
    /// San Joaquin restoration release in effect today (taf/day).
    pub sjrr_release: f64,
    /// Flood-control component of today's release (taf/day).
    pub flood_control_release: f64,

    // Remaining environmental obligation tables, indexed [wyt][dowy];
    // 366 slots so a block end of 365 is addressable.
    cum_min_release: [Vec<f64>; 6],
    aug_sept_min_release: [Vec<f64>; 6],
    oct_nov_min_release: [Vec<f64>; 6],

    /// Monthly consumptive demand by type and calendar month (taf), set by
    /// the caller before demand-mode fill projections.
    pub monthly_demand: ByWyt<[f64; 12]>,
    /// Demand that must be met from storage regardless of inflow (taf).
    pub monthly_demand_must_fill: ByWyt<[f64; 12]>,
    /// Minimum daily release rate to avoid overtopping (taf/day).
    pub min_daily_uncontrolled: f64,
    /// Volume currently above the flood pool with no release (taf).
    pub uncontrolled_available: f64,
    /// Projected days until the flood pool is reached, per release mode.
    pub numdays_fillup: [f64; 2],
}

impl Reservoir {
    /// Builds the reservoir and runs the regression preprocessor.
    ///
    /// # Errors
    ///
    /// Returns `MissingConfiguration` when the rule file is structurally
    /// unusable (empty flood-control table, inconsistent rows).
    pub fn new(rules: ReservoirRules, record: &HydrologyRecord) -> Result<Self, SimError> {
        if rules.tocs.index.is_empty()
            || rules.tocs.dowy.len() != rules.tocs.index.len()
            || rules.tocs.storage.len() != rules.tocs.index.len()
        {
            return Err(SimError::MissingConfiguration(format!(
                "{}: flood-control rule needs one dowy/storage row per index entry",
                record.key
            )));
        }

        let t_len = record.len();
        info!("{}: fitting forecast regressions over {t_len} days", record.key);
        let forecasts = FlowForecasts::fit(record, rules.melt_start);
        let flow_shape = FlowShape::fit(record);

        let s0 = record.storage[0];
        let mut storage = vec![0.0; t_len + 1];
        storage[0] = s0;

        Ok(Self {
            key: record.key.clone(),
            rules,
            inflow: record.inflow.clone(),
            evaporation: record.evaporation.clone(),
            flood_index: record.flood_index.clone(),
            gains: record.gains.clone(),
            forecasts,
            flow_shape,
            storage,
            release: vec![0.0; t_len],
            tocs: vec![0.0; t_len],
            available_storage: vec![0.0; t_len],
            release_target: vec![0.0; t_len],
            release_to_delta: vec![0.0; t_len],
            rainflood_forecast: vec![0.0; t_len],
            snowflood_forecast: vec![0.0; t_len],
            baseline_forecast: vec![0.0; t_len],
            rainflood_flows: 0.0,
            snowflood_flows: 0.0,
            baseline_flows: 0.0,
            exceedance_level: 9,
            evap_forecast: 0.0,
            eos_day: 0,
            eos_target: s0,
            last_year_eos_target: s0,
            last_year_rainflood: 9999.9,
            forecast_wyt: WaterYearType::AboveNormal,
            envmin: 0.0,
            sodd: 0.0,
            din: 0.0,
            dout: 0.0,
            basinuse: 0.0,
            consumed_releases: 0.0,
            gains_to_delta: 0.0,
            sjrr_release: 0.0,
            flood_control_release: 0.0,
            cum_min_release: std::array::from_fn(|_| vec![0.0; 366]),
            aug_sept_min_release: std::array::from_fn(|_| vec![0.0; 366]),
            oct_nov_min_release: std::array::from_fn(|_| vec![0.0; 366]),
            monthly_demand: ByWyt::uniform([0.0; 12]),
            monthly_demand_must_fill: ByWyt::uniform([0.0; 12]),
            min_daily_uncontrolled: 0.0,
            uncontrolled_available: 0.0,
            numdays_fillup: [NO_FILLUP; 2],
        })
    }

    /// Number of simulated days.
    pub fn len(&self) -> usize {
        self.release.len()
    }

    /// True when the record is empty.
    pub fn is_empty(&self) -> bool {
        self.release.is_empty()
    }

    /// End-of-September target recomputation.
    ///
    /// Within a year the target never decreases once a higher value has
    /// been established; `carryover_excess_use` controls what fraction of
    /// storage above the minimum target raises the effective target.
    fn calc_eos_storage(&mut self, t: usize) {
        let floor = *self.rules.carryover_target.get(self.forecast_wyt);
        let starting = if t == 0 {
            self.storage[self.eos_day]
        } else {
            self.storage[self.eos_day].max(self.eos_target)
        };
        self.eos_target = ((starting - floor) * self.rules.carryover_excess_use + floor).max(floor);
    }

    /// Daily forecasting pass: updates the seasonal forecasts and the
    /// storage available for export. Must run before release determination.
    pub fn find_available_storage(&mut self, day: &DayContext) {
        let t = day.t;
        let wyt = self.forecast_wyt;
        let rain_end = dowy_month_start(self.rules.melt_start);

        if day.month == 10 && day.day == 1 {
            self.rainflood_flows = 0.0;
            self.snowflood_flows = 0.0;
            self.baseline_flows = 0.0;
            // Start the year conservative; the ramp below relaxes it.
            self.exceedance_level = 2;
            // Evaporation is treated as a perfect year-ahead forecast.
            let horizon = (t + 365).min(self.evaporation.len());
            self.evap_forecast = self.evaporation[t..horizon].iter().sum();
            self.eos_day = t;
        }
        if day.month == 8 && day.day == 1 {
            self.last_year_eos_target = self.eos_target;
            self.last_year_rainflood = self.forecasts.rainflood_inf[t];
        }

        self.calc_eos_storage(t);
        self.evap_forecast -= self.evaporation[t];

        // Lower level = more conservative forecast. Ramp toward the median
        // as the year progresses; Aug/Sep pin fully central.
        if day.month < 8 {
            self.exceedance_level = (day.month as usize + 2).min(7);
        } else if day.month == 8 || day.month == 9 {
            self.exceedance_level = 9;
        }

        if day.dowy < rain_end {
            self.rainflood_flows += self.inflow[t];
        } else if day.dowy < SNOW_SEASON_END {
            self.snowflood_flows += self.inflow[t];
        } else {
            self.baseline_flows += self.inflow[t];
        }

        // Seasonal forecasts: point estimate plus the residual band at the
        // current exceedance level, net of flow already observed. Completed
        // seasons forecast zero. The rainflood forecast is capped by last
        // year's value so one early storm cannot blow it up.
        let z = EXCEEDANCE_Z[self.exceedance_level];
        let (rain, snow, base);
        if day.dowy < rain_end {
            rain = (self
                .last_year_rainflood
                .min(self.forecasts.rainflood_inf[t] + self.forecasts.raininf_std[day.dowy] * z)
                - self.rainflood_flows)
                .max(0.0);
            snow = (self.forecasts.snowflood_inf[t] + self.forecasts.snowinf_std[day.dowy] * z)
                .max(0.0);
            base = (self.forecasts.baseline_inf[t] + self.forecasts.baseinf_std[day.dowy] * z)
                .max(0.0);
        } else if day.dowy < SNOW_SEASON_END {
            rain = 0.0;
            snow = (self.forecasts.snowflood_inf[t] + self.forecasts.snowinf_std[day.dowy] * z
                - self.snowflood_flows)
                .max(0.0);
            base = (self.forecasts.baseline_inf[t] + self.forecasts.baseinf_std[day.dowy] * z)
                .max(0.0);
        } else {
            rain = 0.0;
            snow = 0.0;
            base = (self.forecasts.baseline_inf[t] + self.forecasts.baseinf_std[day.dowy] * z
                - self.baseline_flows)
                .max(0.0);
        }
        self.rainflood_forecast[t] = rain;
        self.snowflood_forecast[t] = snow;
        self.baseline_forecast[t] = base;

        let aug_sept = self.aug_sept_min_release[wyt.index()][day.dowy];
        self.available_storage[t] = if self.storage[t] < self.eos_target && day.dowy > 274 {
            // Below the carryover target near year end: no exports.
            0.0
        } else if day.month == 8 || day.month == 9 {
            self.storage[t] - self.last_year_eos_target + rain + snow + base - aug_sept
        } else {
            self.storage[t] - self.eos_target + rain + snow + base
                - self.cum_min_release[wyt.index()][day.dowy]
                - self.evap_forecast
                - aug_sept
        };
        debug!(
            "{} t={t} dowy={} avail={:.1} eos_target={:.1}",
            self.key, day.dowy, self.available_storage[t], self.eos_target
        );
    }

    /// Determines today's environmental release: the largest of the
    /// reservoir minimum, the downstream target, the San Joaquin
    /// restoration release, and the flood-control release, capped so
    /// storage cannot drop below dead pool, then reduced by water already
    /// called out of the river by upstream rights holders.
    pub fn release_environmental(&mut self, day: &DayContext, basin_wyt: WaterYearType) {
        let t = day.t;
        let wyt = self.forecast_wyt;
        let m = day.month as usize - 1;

        self.basinuse = interp(day.doy, &FIRST_OF_MONTH_DOY, &self.rules.nodd);
        self.gains_to_delta += self.basinuse;

        let reservoir_target = if self.rules.nodd_meets_envmin {
            (self.rules.env_min_flow.get(wyt)[m] * CFS_TAFD - self.basinuse).max(0.0)
        } else {
            self.rules.env_min_flow.get(wyt)[m] * CFS_TAFD
        };
        // Requirement at the downstream monitoring point, net of gains.
        let downstream_target = self.rules.temp_releases.get(basin_wyt)[m] * CFS_TAFD - self.gains[t];

        self.tocs[t] = self.current_tocs(day.dowy as f64, self.flood_index[t]);
        let w = self.storage[t] + self.inflow[t];
        self.flood_control_release = (0.2 * (w - self.tocs[t])).max(0.0);

        self.envmin = reservoir_target
            .max(downstream_target)
            .max(self.sjrr_release)
            .max(self.flood_control_release);
        self.envmin = self.envmin.min(w - self.rules.dead_pool);
        self.envmin -= self.consumed_releases;
    }

    /// Executes the daily mass-balance step.
    ///
    /// Basin use and consumed water rights draw down storage without being
    /// delta-bound, so they re-enter the release total here; together with
    /// their subtraction in `release_environmental` the pair is net zero.
    pub fn step(&mut self, t: usize) {
        self.envmin += self.basinuse + self.consumed_releases;
        self.release_target[t] = self.envmin + self.sodd + self.din + self.dout;

        let w = self.storage[t] + self.inflow[t];
        let mut r = self
            .release_target[t]
            .min(w - self.rules.dead_pool)
            .max(0.0);
        r = r.min(self.rules.max_outflow * CFS_TAFD);
        r += (w - r - self.rules.capacity).max(0.0); // forced spill
        self.release[t] = r;
        self.storage[t + 1] = w - r - self.evaporation[t];
        self.release_to_delta[t] = (r - self.basinuse - self.consumed_releases).max(0.0);
    }

    /// Top-of-conservation storage at `dowy` under flood index `ix`.
    ///
    /// The rule rows are curves over dowy at decreasing index values; the
    /// surface interpolates within the two bracketing rows by dowy, then
    /// between them by index. Outside the tabulated index range the
    /// nearest row applies.
    pub fn current_tocs(&self, dowy: f64, ix: f64) -> f64 {
        let rule = &self.rules.tocs;
        let n = rule.index.len();
        if n == 1 || ix >= rule.index[0] {
            return interp(dowy, &rule.dowy[0], &rule.storage[0]);
        }
        if ix <= rule.index[n - 1] {
            return interp(dowy, &rule.dowy[n - 1], &rule.storage[n - 1]);
        }
        let mut i = n - 1;
        for (j, &v) in rule.index.iter().enumerate() {
            if ix > v {
                i = j;
                break;
            }
        }
        let above = interp(dowy, &rule.dowy[i - 1], &rule.storage[i - 1]);
        let below = interp(dowy, &rule.dowy[i], &rule.storage[i]);
        interp(
            ix,
            &[rule.index[i], rule.index[i - 1]],
            &[below, above],
        )
    }

    /// Records an upstream water-rights call against today's release.
    ///
    /// Negative `downstream_flow` means demand exceeds gains: the shortfall
    /// is water called out of the river before the delta. The plain call
    /// replaces today's running values; `additive` stacks a further call on
    /// top of them.
    pub fn rights_call(&mut self, downstream_flow: f64, additive: bool) {
        if additive {
            if downstream_flow < 0.0 {
                self.consumed_releases -= downstream_flow;
            } else {
                self.gains_to_delta += downstream_flow;
            }
        } else if downstream_flow < 0.0 {
            self.consumed_releases = -downstream_flow;
            self.gains_to_delta = 0.0;
        } else {
            self.consumed_releases = 0.0;
            self.gains_to_delta = downstream_flow;
        }
    }

    /// San Joaquin restoration release for day `t` (taf/day), interpolated
    /// on the combined full-natural-flow forecast. Zero for reservoirs
    /// without a restoration schedule.
    pub fn sj_restoration_release(&self, t: usize, dowy: usize) -> f64 {
        let Some(rule) = &self.rules.sj_restoration else {
            return 0.0;
        };
        let mut i = rule.dowy.len() - 1;
        for (j, &v) in rule.dowy.iter().enumerate() {
            if dowy as f64 > v {
                i = j;
                break;
            }
        }
        let ix = self.forecasts.rainflood_fnf[t] + self.forecasts.snowflood_fnf[t];
        interp(ix, &rule.index, &rule.release[i]) * CFS_TAFD
    }

    /// Builds the remaining environmental-obligation tables, once per
    /// simulation (or regulation-regime change).
    ///
    /// The downstream component replays the historical record: for each
    /// water year the observed monthly shortfall (requirement minus actual
    /// downstream flow) is accumulated, and the worst average daily
    /// shortfall seen for each type/month across all history is kept. The
    /// delta requirement share is folded in on top. The three tables then
    /// hold, per day of the water year, the obligation remaining in their
    /// window; outside its window a sub-window table carries the full
    /// window total.
    pub fn calc_expected_min_release(
        &mut self,
        record: &HydrologyRecord,
        history: &[WaterYearType],
        delta_req: Option<&ByWyt<[f64; 12]>>,
        depletions: &[f64; 12],
        sjrr_on: bool,
    ) {
        let mut downstream_release = [[0.0f64; 6]; 12]; // [month][wyt]

        if self.rules.has_downstream_target_flow {
            let mut current_obs = [0.0f64; 12];
            for t in 0..record.len() {
                let date = record.dates[t];
                let m = chrono::Datelike::month(&date) as usize - 1;
                let wy = record.water_year_index(t);
                let wyt = history
                    .get(wy)
                    .copied()
                    .unwrap_or(WaterYearType::AboveNormal);
                if m == 8 && chrono::Datelike::day(&date) == 30 {
                    for (mc, obs) in current_obs.iter_mut().enumerate() {
                        let daily_avg = *obs / DAYS_IN_MONTH[mc];
                        if daily_avg > downstream_release[mc][wyt.index()] {
                            downstream_release[mc][wyt.index()] = daily_avg;
                        }
                        *obs = 0.0;
                    }
                }
                let dowy = day_of_water_year(date);
                let mut downstream_req = self.rules.temp_releases.get(wyt)[m] * CFS_TAFD;
                if sjrr_on {
                    downstream_req = downstream_req.max(self.sj_restoration_release(t, dowy));
                }
                current_obs[m] += (downstream_req - record.gains[t]).max(0.0);
            }
            if let Some(delta_req) = delta_req {
                for m in 0..12 {
                    for wyt in WaterYearType::ALL {
                        let i = wyt.index();
                        let temp = self.rules.temp_releases.get(wyt)[m] * CFS_TAFD;
                        let scaled = (delta_req.get(wyt)[m] * CFS_TAFD - depletions[m])
                            * self.rules.delta_outflow_pct
                            + (downstream_release[m][i] - temp).max(0.0);
                        downstream_release[m][i] = scaled.max(downstream_release[m][i]);
                    }
                }
            }
        }

        for wyt in WaterYearType::ALL {
            let i = wyt.index();
            let daily_req = |dowy: usize| -> f64 {
                let m = month_for_dowy(dowy) as usize - 1;
                let reservoir_target = self.rules.env_min_flow.get(wyt)[m] * CFS_TAFD;
                let mut needs = downstream_release[m][i];
                if !self.rules.nodd_meets_envmin {
                    needs += interp(doy_for_dowy(dowy), &FIRST_OF_MONTH_DOY, &self.rules.nodd);
                }
                reservoir_target.max(needs)
            };

            let mut cum = vec![0.0; 366];
            let mut aug_sept = vec![0.0; 366];
            let mut oct_nov = vec![0.0; 366];
            // Full forward sum into the day-0 slots...
            for x in 0..365 {
                let req = daily_req(x);
                if x < SNOW_SEASON_END {
                    cum[0] += req;
                } else {
                    aug_sept[0] += req;
                }
                if x < OCT_NOV_END {
                    oct_nov[0] += req;
                }
            }
            // ...then unwind one day at a time to the remaining-obligation
            // curves.
            for x in 1..365 {
                let req = daily_req(x - 1);
                if x < SNOW_SEASON_END {
                    cum[x] = cum[x - 1] - req;
                    aug_sept[x] = aug_sept[0];
                } else if x == SNOW_SEASON_END {
                    aug_sept[x] = aug_sept[0];
                } else {
                    aug_sept[x] = aug_sept[x - 1] - req;
                }
                if x < OCT_NOV_END {
                    oct_nov[x] = oct_nov[x - 1] - req;
                } else {
                    oct_nov[x] = oct_nov[0];
                }
            }
            self.cum_min_release[i] = cum;
            self.aug_sept_min_release[i] = aug_sept;
            self.oct_nov_min_release[i] = oct_nov;
        }
    }

    /// Remaining Oct–Jul environmental obligation at `dowy` for `wyt` (taf).
    pub fn remaining_min_release(&self, wyt: WaterYearType, dowy: usize) -> f64 {
        self.cum_min_release[wyt.index()][dowy]
    }

    /// Remaining Oct–Nov obligation at `dowy` for `wyt` (taf).
    pub fn remaining_oct_nov_release(&self, wyt: WaterYearType, dowy: usize) -> f64 {
        self.oct_nov_min_release[wyt.index()][dowy]
    }

    /// Projects, month by month over the next year, whether inflow minus
    /// mandatory releases will push storage above the flood pool before the
    /// carryover date, and if so at what minimum daily release rate the
    /// overtop is avoided.
    ///
    /// The projection walks at most twelve months and stops once the
    /// projected end-of-month storage falls to the end-of-September target:
    /// at or below target there is no further flood risk. The crossover
    /// date inside the breaching month comes from a linear root-find of the
    /// storage trajectory against the moving flood-pool ceiling.
    pub fn find_flow_pumping(&mut self, day: &DayContext, wyt: WaterYearType, mode: ReleaseMode) {
        let t = day.t;
        let dowy = day.dowy;
        // Sample index of the first of the current month, where the season
        // point estimates were last refreshed for projection purposes.
        let t0 = t.saturating_sub(dowy - dowy_month_start(day.month));

        let mut running_storage = self.storage[t];
        self.min_daily_uncontrolled = 0.0;
        self.uncontrolled_available = 0.0;
        self.numdays_fillup[mode.index()] = NO_FILLUP;

        let mut this_month_flow = 0.0;
        let mut block_start = dowy as f64;
        let mut crossed_year = false;

        for month_counter in 0..12usize {
            let mut m0 = day.month as usize - 1 + month_counter; // 0-based calendar month
            if m0 > 11 {
                m0 -= 12;
            }
            let mut next_year = 0.0;
            if m0 == 9 && month_counter > 0 {
                // Looping into the next water year: restart the Oct–Mar count.
                next_year = 365.0;
                this_month_flow = 0.0;
                crossed_year = true;
            } else if m0 == 3 || m0 == 7 {
                // Season boundaries (Apr–Jul, Aug–Sep) restart the count.
                this_month_flow = 0.0;
            }

            // Remaining flow in the month's season: projection minus flow
            // already observed (current season only) minus the running
            // projected count.
            let observed = if crossed_year {
                0.0
            } else if m0 >= 9 || m0 < 3 {
                self.rainflood_flows
            } else if m0 < 7 {
                self.snowflood_flows
            } else {
                self.baseline_flows
            };
            let season_projection = if m0 >= 9 || m0 < 3 {
                self.forecasts.rainflood_inf[t0]
            } else if m0 < 7 {
                self.forecasts.snowflood_inf[t0]
            } else {
                self.forecasts.baseline_inf[t0]
            };
            let remaining_flow = (season_projection - observed - this_month_flow).max(0.0);

            let month = m0 as u32 + 1;
            let month_flow =
                self.flow_shape.fraction(month, remaining_flow) * remaining_flow;
            this_month_flow += month_flow;

            let start_of_month = dowy_month_start(month);
            let block_end = dowy_month_end(month);
            let mandatory = match mode {
                ReleaseMode::DownstreamDemand => {
                    self.monthly_demand.get(wyt)[m0] + self.monthly_demand_must_fill.get(wyt)[m0]
                }
                ReleaseMode::Environmental => {
                    let i = wyt.index();
                    self.cum_min_release[i][start_of_month] - self.cum_min_release[i][block_end]
                        + self.aug_sept_min_release[i][start_of_month]
                        - self.aug_sept_min_release[i][block_end]
                }
            };
            let change_rate = (month_flow - mandatory) / DAYS_IN_MONTH[m0];

            let cap_start = self.current_tocs(block_start, self.flood_index[t]);
            let cap_end = self.current_tocs(block_end as f64, self.flood_index[t]);
            let span = block_end as f64 - block_start + next_year;
            let mut eom_storage = running_storage;
            if span > 0.0 {
                eom_storage = running_storage + change_rate * span;
                if eom_storage > cap_end {
                    let wrap = if crossed_year { 365.0 } else { 0.0 };
                    let days_to_block_end = block_end as f64 + wrap - dowy as f64;
                    let month_min_release = (eom_storage - cap_end) / days_to_block_end;
                    let over_pool = eom_storage - cap_end;
                    let differential = change_rate - (cap_end - cap_start) / span;
                    let crossover_date = if differential.abs() > f64::EPSILON {
                        (cap_start - running_storage) / differential
                    } else {
                        0.0
                    };
                    let fillup_days = block_start + crossover_date + wrap - dowy as f64;

                    self.min_daily_uncontrolled =
                        self.min_daily_uncontrolled.max(month_min_release);
                    self.uncontrolled_available = self.uncontrolled_available.max(over_pool);
                    self.numdays_fillup[mode.index()] =
                        self.numdays_fillup[mode.index()].min(fillup_days);
                }
            }

            // Termination predicate: once projected storage sits at or
            // below the carryover target, no later month can pose flood
            // risk under monotone rule curves.
            if eom_storage < self.eos_target {
                break;
            }
            running_storage = eom_storage;
            block_start = block_end as f64;
        }
    }

    /// Per-day output series for export, `(metric, values)` pairs.
    pub fn accounting_series(&self) -> Vec<(&'static str, &[f64])> {
        vec![
            ("storage", &self.storage[..self.len()]),
            ("tocs", &self.tocs[..]),
            ("available_storage", &self.available_storage[..]),
            ("out", &self.release[..]),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TocsRule;
    use crate::water_year::ByWyt;
    use chrono::NaiveDate;

    fn flat_tocs(level: f64) -> TocsRule {
        TocsRule {
            index: vec![10.0, 0.0],
            dowy: vec![vec![0.0, 364.0], vec![0.0, 364.0]],
            storage: vec![vec![level, level], vec![level, level]],
        }
    }

    fn test_rules(capacity: f64, dead_pool: f64) -> ReservoirRules {
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

    fn constant_record(inflow_taf: f64, storage0: f64, days: usize) -> HydrologyRecord {
        let mut rec = HydrologyRecord::synthetic("TST", 2000, days.div_ceil(365).max(1));
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

    fn day0() -> DayContext {
        DayContext::new(0, NaiveDate::from_ymd_opt(2000, 10, 1).expect("date"), 2000)
    }

    #[test]
    fn step_fills_storage_with_no_required_release() {
        // Constant inflow 10 taf/day into a half-full reservoir: one step
        // adds the full inflow, no release.
        let record = constant_record(10.0, 50.0, 365);
        let mut res = Reservoir::new(test_rules(100.0, 0.0), &record).expect("reservoir");
        let day = day0();
        res.find_available_storage(&day);
        res.release_environmental(&day, WaterYearType::AboveNormal);
        // No flood pool pressure: flat tocs at capacity.
        res.envmin = 0.0;
        res.step(0);
        assert!((res.storage[1] - 60.0).abs() < 1e-9);
        assert_eq!(res.release[0], 0.0);
    }

    #[test]
    fn step_spills_above_capacity() {
        let record = constant_record(10.0, 95.0, 365);
        let mut res = Reservoir::new(test_rules(100.0, 0.0), &record).expect("reservoir");
        let day = day0();
        res.find_available_storage(&day);
        res.release_environmental(&day, WaterYearType::AboveNormal);
        res.envmin = 0.0;
        res.step(0);
        assert!((res.release[0] - 5.0).abs() < 1e-9);
        assert!((res.storage[1] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn release_capped_at_dead_pool() {
        let record = constant_record(0.0, 12.0, 365);
        let mut res = Reservoir::new(test_rules(100.0, 10.0), &record).expect("reservoir");
        let day = day0();
        res.find_available_storage(&day);
        res.release_environmental(&day, WaterYearType::AboveNormal);
        res.sodd = 50.0; // demand far beyond what is physically available
        res.step(0);
        assert!((res.release[0] - 2.0).abs() < 1e-9);
        assert!((res.storage[1] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn tocs_surface_interpolates_between_bracket_rows() {
        let record = constant_record(1.0, 50.0, 365);
        let mut rules = test_rules(100.0, 0.0);
        rules.tocs = TocsRule {
            index: vec![10.0, 0.0],
            dowy: vec![vec![0.0, 364.0], vec![0.0, 364.0]],
            storage: vec![vec![60.0, 60.0], vec![80.0, 80.0]],
        };
        let res = Reservoir::new(rules, &record).expect("reservoir");
        // Midpoint of the index brackets: linear average of the rows.
        assert!((res.current_tocs(100.0, 5.0) - 70.0).abs() < 1e-9);
        // Exactly at a breakpoint: that row's curve value.
        assert!((res.current_tocs(100.0, 10.0) - 60.0).abs() < 1e-9);
        assert!((res.current_tocs(100.0, 0.0) - 80.0).abs() < 1e-9);
        // Beyond the wet end: clamped to the wettest row.
        assert!((res.current_tocs(100.0, 25.0) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn flood_control_release_is_one_fifth_of_excess() {
        let record = constant_record(10.0, 80.0, 365);
        let mut rules = test_rules(200.0, 0.0);
        rules.tocs = flat_tocs(70.0);
        let mut res = Reservoir::new(rules, &record).expect("reservoir");
        let day = day0();
        res.find_available_storage(&day);
        res.release_environmental(&day, WaterYearType::AboveNormal);
        // W = 90, tocs = 70: release 20% of the 20 taf excess.
        res.step(0);
        assert!((res.release[0] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn eos_target_never_decreases_within_year() {
        let record = constant_record(5.0, 100.0, 365);
        let mut rules = test_rules(1000.0, 0.0);
        rules.carryover_target = ByWyt::uniform(50.0);
        rules.carryover_excess_use = 0.5;
        let mut res = Reservoir::new(rules, &record).expect("reservoir");
        let day = day0();
        res.find_available_storage(&day);
        let first = res.eos_target;
        // (100 - 50) * 0.5 + 50
        assert!((first - 75.0).abs() < 1e-9);
        res.step(0);
        res.find_available_storage(&DayContext::new(
            1,
            NaiveDate::from_ymd_opt(2000, 10, 2).expect("date"),
            2000,
        ));
        assert!(res.eos_target >= first);
    }

    #[test]
    fn consumed_releases_are_net_zero_across_the_two_calls() {
        // Water called by upstream rights holders is excluded from the
        // delta-bound release but leaves the total release untouched: the
        // subtraction in release_environmental and the re-addition in step
        // must cancel exactly.
        let record = constant_record(10.0, 500.0, 365);
        let mut res = Reservoir::new(test_rules(1000.0, 0.0), &record).expect("reservoir");
        let day = day0();
        res.find_available_storage(&day);
        res.rights_call(-3.0, false);
        res.sjrr_release = 5.0; // required environmental flow for the day
        res.release_environmental(&day, WaterYearType::AboveNormal);
        res.step(0);
        assert!((res.release[0] - 5.0).abs() < 1e-9);
        assert!((res.release_to_delta[0] - 2.0).abs() < 1e-9);
        // Mass balance still exact.
        assert!((res.storage[1] - (500.0 + 10.0 - 5.0)).abs() < 1e-9);
    }

    #[test]
    fn no_exports_below_target_late_in_year() {
        let record = constant_record(1.0, 40.0, 365);
        let mut rules = test_rules(1000.0, 0.0);
        rules.carryover_target = ByWyt::uniform(80.0);
        rules.carryover_excess_use = 0.0;
        let mut res = Reservoir::new(rules, &record).expect("reservoir");
        // Mid-July day: dowy 285.
        let date = NaiveDate::from_ymd_opt(2001, 7, 13).expect("date");
        let day = DayContext::new(285, date, 2000);
        res.find_available_storage(&day);
        assert_eq!(res.available_storage[285], 0.0);
    }

    #[test]
    fn fill_projection_flags_overtopping_reservoir() {
        // Storage already near a low flood pool with strong inflow: the
        // projection must demand a positive release rate and a finite
        // fill-up horizon.
        let record = constant_record(8.0, 60.0, 365);
        let mut rules = test_rules(1000.0, 0.0);
        rules.tocs = flat_tocs(70.0);
        rules.carryover_target = ByWyt::uniform(10.0);
        let mut res = Reservoir::new(rules, &record).expect("reservoir");
        let day = day0();
        res.find_available_storage(&day);
        res.find_flow_pumping(&day, WaterYearType::AboveNormal, ReleaseMode::Environmental);
        assert!(res.min_daily_uncontrolled > 0.0);
        assert!(res.uncontrolled_available > 0.0);
        assert!(res.numdays_fillup[ReleaseMode::Environmental.index()] < NO_FILLUP);
    }

    #[test]
    fn obligation_tables_unwind_to_zero() {
        let record = constant_record(5.0, 100.0, 365);
        let mut rules = test_rules(1000.0, 0.0);
        rules.env_min_flow = ByWyt::uniform([500.0; 12]);
        let mut res = Reservoir::new(rules, &record).expect("reservoir");
        res.calc_expected_min_release(&record, &[WaterYearType::Wet], None, &[0.0; 12], false);

        let wyt = WaterYearType::Wet;
        let full = res.remaining_min_release(wyt, 0);
        // 304 days at 500 cfs.
        assert!((full - 500.0 * CFS_TAFD * 304.0).abs() < 1e-6);
        // Monotone non-increasing through the Oct–Jul window, empty at Aug 1.
        for x in 1..SNOW_SEASON_END {
            assert!(res.remaining_min_release(wyt, x) <= res.remaining_min_release(wyt, x - 1));
        }
        assert!(res.remaining_min_release(wyt, SNOW_SEASON_END - 1) > 0.0);
        let last = res.remaining_min_release(wyt, SNOW_SEASON_END - 1);
        assert!((last - 500.0 * CFS_TAFD).abs() < 1e-6);
        // Aug–Sep window holds its full total until August starts.
        let aug_full = res.aug_sept_min_release[wyt.index()][0];
        assert!((aug_full - 500.0 * CFS_TAFD * 61.0).abs() < 1e-6);
        assert_eq!(res.aug_sept_min_release[wyt.index()][100], aug_full);
        // Oct–Nov window unwinds inside its 61 days.
        let on0 = res.remaining_oct_nov_release(wyt, 0);
        assert!((on0 - 500.0 * CFS_TAFD * 61.0).abs() < 1e-6);
        assert!(res.remaining_oct_nov_release(wyt, 60) < on0);
    }
}
