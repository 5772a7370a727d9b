//! Regression preprocessor for seasonal flow forecasting.
//!
//! One batch pass over the full historical record, run before the daily
//! simulation loop. For every day of the water year it fits linear
//! regressions predicting each season's eventual total flow from what is
//! observable on that day (year-to-date cumulative flow for the rain
//! season, same-day snowpack for the snowmelt and baseline seasons),
//! together with the residual standard deviation used as the forecast
//! uncertainty band. A second pass fits the within-season monthly flow
//! shape used by the fill-projection logic.
//!
//! Iteration is strictly ordered (year by year, day by day) because the
//! cumulative predictors build incrementally within each water year.

use chrono::Datelike;
use log::debug;

use crate::hydrology::HydrologyRecord;
use crate::water_year::{day_of_water_year, dowy_month_start};

/// Day-of-water-year one past the end of the snowmelt season (Jul 31).
const SNOW_SEASON_END: usize = 304;

/// A fitted line `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    /// Evaluates the fit at `x`.
    pub fn eval(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Least-squares fit of `ys` on `xs`.
///
/// Degenerate case: when the predictor has (near) zero variance the fit
/// collapses to the constant model (slope 0, intercept equal to the mean
/// of `ys`). This is a local recovery, not an error.
pub fn fit_line(xs: &[f64], ys: &[f64]) -> LinearFit {
    debug_assert_eq!(xs.len(), ys.len());
    let n = xs.len() as f64;
    if xs.is_empty() {
        return LinearFit::default();
    }
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        sxx += (x - mean_x) * (x - mean_x);
        sxy += (x - mean_x) * (y - mean_y);
    }
    if sxx < 1e-12 {
        return LinearFit {
            slope: 0.0,
            intercept: mean_y,
        };
    }
    let slope = sxy / sxx;
    LinearFit {
        slope,
        intercept: mean_y - slope * mean_x,
    }
}

/// Population standard deviation of the fit residuals.
fn residual_std(xs: &[f64], ys: &[f64], fit: LinearFit) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let n = xs.len() as f64;
    let mut ss = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        let dev = y - fit.eval(x);
        ss += dev * dev;
    }
    (ss / n).sqrt()
}

/// Per-day regression outputs consumed by the reservoir engine.
///
/// `*_std` vectors are indexed by day-of-water-year (365 entries); the
/// point-estimate vectors are indexed by simulation day and already
/// evaluated against that day's observed predictor.
#[derive(Debug, Clone)]
pub struct FlowForecasts {
    pub rainfnf_std: Vec<f64>,
    pub snowfnf_std: Vec<f64>,
    pub raininf_std: Vec<f64>,
    pub snowinf_std: Vec<f64>,
    pub baseinf_std: Vec<f64>,
    /// Rain-season full-natural-flow total estimate (maf).
    pub rainflood_fnf: Vec<f64>,
    /// Snow-season full-natural-flow total estimate (maf).
    pub snowflood_fnf: Vec<f64>,
    /// Rain-season reservoir-inflow total estimate (taf).
    pub rainflood_inf: Vec<f64>,
    /// Snow-season reservoir-inflow total estimate (taf).
    pub snowflood_inf: Vec<f64>,
    /// Aug–Sep baseline reservoir-inflow total estimate (taf).
    pub baseline_inf: Vec<f64>,
}

impl FlowForecasts {
    /// Fits all seasonal regressions over the record.
    ///
    /// `melt_start` is the calendar month snowmelt inflow begins at this
    /// reservoir (1..=4); it splits the inflow rain season from the
    /// snowmelt season. Full-natural-flow seasons are fixed at Oct–Mar and
    /// Apr–Jul. Only *complete* years, with continuous data through the
    /// end of July, enter the fits.
    pub fn fit(record: &HydrologyRecord, melt_start: u32) -> Self {
        let t_len = record.len();
        let num_wy = record.num_water_years();
        let rain_end_inf = dowy_month_start(melt_start);

        // Season totals per water year (regression dependent variables).
        let mut rainfnf = vec![0.0; num_wy];
        let mut snowfnf = vec![0.0; num_wy];
        let mut raininf = vec![0.0; num_wy];
        let mut snowinf = vec![0.0; num_wy];
        let mut baseinf = vec![0.0; num_wy];

        // Cumulative predictors per [dowy][year]; values freeze once the
        // season closes so late-season days still see the season total.
        let mut rainfnf_cum = vec![vec![0.0; num_wy]; 365];
        let mut raininf_cum = vec![vec![0.0; num_wy]; 365];
        let mut snow_pattern = vec![vec![0.0; num_wy]; 365];

        let mut complete_years = 0usize;
        let mut run_rainfnf = 0.0;
        let mut run_raininf = 0.0;
        for t in 0..t_len {
            let date = record.dates[t];
            let dowy = day_of_water_year(date);
            let y = record.water_year_index(t);
            if dowy == 0 {
                run_rainfnf = 0.0;
                run_raininf = 0.0;
            }
            if date.month() == 8 && date.day() == 1 {
                // Data through end of July makes this a complete year.
                complete_years = complete_years.max(y + 1);
            }

            if dowy < 182 {
                run_rainfnf += record.fnf[t];
            }
            if dowy < rain_end_inf {
                run_raininf += record.inflow[t];
            }
            rainfnf_cum[dowy][y] = run_rainfnf;
            raininf_cum[dowy][y] = run_raininf;
            snow_pattern[dowy][y] = record.snowpack[t];

            if dowy < 182 {
                rainfnf[y] += record.fnf[t];
            } else if dowy < SNOW_SEASON_END {
                snowfnf[y] += record.fnf[t];
            }
            if dowy < rain_end_inf {
                raininf[y] += record.inflow[t];
            } else if dowy < SNOW_SEASON_END {
                snowinf[y] += record.inflow[t];
            } else {
                baseinf[y] += record.inflow[t];
            }
        }
        debug!(
            "{}: fitting seasonal regressions over {complete_years} complete years",
            record.key
        );

        let cy = complete_years.min(num_wy);
        let mut rainfnf_fit = vec![LinearFit::default(); 365];
        let mut snowfnf_fit = vec![LinearFit::default(); 365];
        let mut raininf_fit = vec![LinearFit::default(); 365];
        let mut snowinf_fit = vec![LinearFit::default(); 365];
        let mut baseinf_fit = vec![LinearFit::default(); 365];
        let mut forecasts = Self {
            rainfnf_std: vec![0.0; 365],
            snowfnf_std: vec![0.0; 365],
            raininf_std: vec![0.0; 365],
            snowinf_std: vec![0.0; 365],
            baseinf_std: vec![0.0; 365],
            rainflood_fnf: vec![0.0; t_len],
            snowflood_fnf: vec![0.0; t_len],
            rainflood_inf: vec![0.0; t_len],
            snowflood_inf: vec![0.0; t_len],
            baseline_inf: vec![0.0; t_len],
        };

        for dowy in 0..365 {
            let flow = &rainfnf_cum[dowy][..cy];
            let snow = &snow_pattern[dowy][..cy];
            let inf = &raininf_cum[dowy][..cy];

            rainfnf_fit[dowy] = fit_line(flow, &rainfnf[..cy]);
            forecasts.rainfnf_std[dowy] = residual_std(flow, &rainfnf[..cy], rainfnf_fit[dowy]);

            snowfnf_fit[dowy] = fit_line(snow, &snowfnf[..cy]);
            forecasts.snowfnf_std[dowy] = residual_std(snow, &snowfnf[..cy], snowfnf_fit[dowy]);

            raininf_fit[dowy] = fit_line(inf, &raininf[..cy]);
            forecasts.raininf_std[dowy] = residual_std(inf, &raininf[..cy], raininf_fit[dowy]);

            snowinf_fit[dowy] = fit_line(snow, &snowinf[..cy]);
            forecasts.snowinf_std[dowy] = residual_std(snow, &snowinf[..cy], snowinf_fit[dowy]);

            baseinf_fit[dowy] = fit_line(snow, &baseinf[..cy]);
            forecasts.baseinf_std[dowy] = residual_std(snow, &baseinf[..cy], baseinf_fit[dowy]);
        }

        // Evaluate the point estimates at each simulation day's observed
        // predictor (this year's cumulative flow or today's snowpack).
        for t in 0..t_len {
            let dowy = day_of_water_year(record.dates[t]);
            let y = record.water_year_index(t);
            forecasts.rainflood_fnf[t] = rainfnf_fit[dowy].eval(rainfnf_cum[dowy][y]);
            forecasts.snowflood_fnf[t] = snowfnf_fit[dowy].eval(record.snowpack[t]);
            forecasts.rainflood_inf[t] = raininf_fit[dowy].eval(raininf_cum[dowy][y]);
            forecasts.snowflood_inf[t] = snowinf_fit[dowy].eval(record.snowpack[t]);
            forecasts.baseline_inf[t] = baseinf_fit[dowy].eval(record.snowpack[t]);
        }

        forecasts
    }
}

/// Within-season monthly flow-shape regressions.
///
/// For each calendar month, predicts the fraction of the season's
/// *remaining* flow that arrives in that month as a linear function of the
/// remaining flow at month start. Seasons are Oct–Mar, Apr–Jul, and
/// Aug–Sep, each with its own accumulator reset at the boundary month.
#[derive(Debug, Clone)]
pub struct FlowShape {
    /// Slope per calendar month (index 0 = January).
    pub slope: [f64; 12],
    /// Intercept per calendar month (index 0 = January).
    pub intercept: [f64; 12],
}

impl FlowShape {
    /// Fraction of the remaining seasonal flow expected in `month` (1..=12)
    /// given `remaining` flow still to come this season.
    pub fn fraction(&self, month: u32, remaining: f64) -> f64 {
        let i = month as usize - 1;
        self.slope[i] * remaining + self.intercept[i]
    }

    /// Fits the monthly shape regressions over all full water years of the
    /// record.
    pub fn fit(record: &HydrologyRecord) -> Self {
        let num_wy = record.num_water_years();
        let mut monthly_flow = vec![[0.0f64; 12]; num_wy];
        let mut rain_total = vec![0.0; num_wy];
        let mut snow_total = vec![0.0; num_wy];
        let mut base_total = vec![0.0; num_wy];
        let mut full_years = 0usize;

        for t in 0..record.len() {
            let date = record.dates[t];
            let y = record.water_year_index(t);
            let m = date.month() as usize;
            monthly_flow[y][m - 1] += record.inflow[t];
            if m >= 10 || m < 4 {
                rain_total[y] += record.inflow[t];
            } else if m < 8 {
                snow_total[y] += record.inflow[t];
            } else {
                base_total[y] += record.inflow[t];
            }
            if m == 9 && date.day() == 30 {
                full_years = full_years.max(y + 1);
            }
        }

        // Walk each year's months in water-year order, tracking the flow
        // remaining in the current season at each month start.
        let mut samples: [(Vec<f64>, Vec<f64>); 12] =
            std::array::from_fn(|_| (Vec::new(), Vec::new()));
        for y in 0..full_years.min(num_wy) {
            let mut remaining = 0.0;
            for counter in 0..12usize {
                let m0 = (counter + 9) % 12; // 0-based month, Oct first
                match m0 {
                    9 => remaining = rain_total[y],
                    3 => remaining = snow_total[y],
                    7 => remaining = base_total[y],
                    _ => {}
                }
                if remaining > 0.0 {
                    samples[m0].0.push(remaining);
                    samples[m0].1.push(monthly_flow[y][m0] / remaining);
                }
                remaining -= monthly_flow[y][m0];
            }
        }

        let mut shape = Self {
            slope: [0.0; 12],
            intercept: [0.0; 12],
        };
        for m0 in 0..12 {
            let fit = fit_line(&samples[m0].0, &samples[m0].1);
            shape.slope[m0] = fit.slope;
            shape.intercept[m0] = fit.intercept;
        }
        shape
    }
}
