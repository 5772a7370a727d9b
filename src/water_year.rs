//! Water-year calendar and unit utilities.
//!
//! The water year runs Oct 1 through Sep 30. Day-of-water-year (dowy) is
//! 0-based: Oct 1 = 0, Sep 30 = 364. Feb 29 folds onto Feb 28's slot so
//! every water year spans exactly 365 slots and the fixed-size rule tables
//! stay aligned across leap years.

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

/// One cfs sustained for a day, in thousand acre-feet (taf).
pub const CFS_TAFD: f64 = 86_400.0 / 43_560.0 / 1000.0;

/// Days in each calendar month (Jan..Dec, non-leap).
pub const DAYS_IN_MONTH: [f64; 12] = [
    31.0, 28.0, 31.0, 30.0, 31.0, 30.0, 31.0, 31.0, 30.0, 31.0, 30.0, 31.0,
];

/// Day-of-year of the first of each calendar month (Jan..Dec, non-leap).
/// Used to interpolate monthly schedules against a calendar day-of-year.
pub const FIRST_OF_MONTH_DOY: [f64; 12] = [
    1.0, 32.0, 60.0, 91.0, 121.0, 152.0, 182.0, 213.0, 244.0, 274.0, 305.0, 335.0,
];

/// Day-of-water-year of the first day of each calendar month (Jan..Dec).
const DOWY_MONTH_START: [usize; 12] = [92, 123, 151, 182, 212, 243, 273, 304, 335, 0, 31, 61];

/// Standard-normal z-scores indexed by exceedance level.
///
/// Level 0 is the most conservative forecast (~95% of historical years
/// exceed it); level 9 is the central estimate (50% exceedance).
pub const EXCEEDANCE_Z: [f64; 10] = [
    -1.645, -1.28, -1.035, -0.84, -0.675, -0.524, -0.385, -0.253, -0.126, 0.0,
];

/// Water year containing `date` (labeled by its starting calendar year:
/// Oct 1 2022 – Sep 30 2023 is water year 2022).
pub fn water_year(date: NaiveDate) -> i32 {
    if date.month() >= 10 {
        date.year()
    } else {
        date.year() - 1
    }
}

/// 0-based day-of-water-year for `date`. Feb 29 returns Feb 28's slot (151).
pub fn day_of_water_year(date: NaiveDate) -> usize {
    let m = date.month();
    let d = date.day();
    if m == 2 && d == 29 {
        return DOWY_MONTH_START[1] + 27;
    }
    DOWY_MONTH_START[m as usize - 1] + d as usize - 1
}

/// Day-of-water-year of the first day of calendar month `month` (1..=12).
pub fn dowy_month_start(month: u32) -> usize {
    DOWY_MONTH_START[month as usize - 1]
}

/// Day-of-water-year one past the last day of calendar month `month`
/// (365 for September).
pub fn dowy_month_end(month: u32) -> usize {
    if month == 9 {
        365
    } else {
        let next = if month == 12 { 1 } else { month + 1 };
        DOWY_MONTH_START[next as usize - 1]
    }
}

/// Calendar month (1..=12) containing day-of-water-year `dowy` (0..=364).
pub fn month_for_dowy(dowy: usize) -> u32 {
    debug_assert!(dowy < 365, "dowy {dowy} out of range");
    for month in 1..=12u32 {
        if dowy >= dowy_month_start(month) && dowy < dowy_month_end(month) {
            return month;
        }
    }
    unreachable!("dowy {dowy} not bucketed to a month")
}

/// Non-leap calendar day-of-year (1..=365) for day-of-water-year `dowy`.
pub fn doy_for_dowy(dowy: usize) -> f64 {
    if dowy < 92 {
        (dowy + 274) as f64
    } else {
        (dowy - 91) as f64
    }
}

/// Piecewise-linear interpolation of `x` over the sample points
/// `(xs[i], ys[i])`, clamped to the end values outside the range.
/// `xs` must be sorted ascending.
pub fn interp(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    debug_assert_eq!(xs.len(), ys.len());
    debug_assert!(!xs.is_empty());
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[xs.len() - 1] {
        return ys[ys.len() - 1];
    }
    for i in 1..xs.len() {
        if x <= xs[i] {
            let span = xs[i] - xs[i - 1];
            if span == 0.0 {
                return ys[i];
            }
            let frac = (x - xs[i - 1]) / span;
            return ys[i - 1] + frac * (ys[i] - ys[i - 1]);
        }
    }
    ys[ys.len() - 1]
}

/// Hydrologic water-year type classification.
///
/// `ExtremeCritical` exists only in the Yuba index; rule tables that do not
/// define it fall back to `Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaterYearType {
    Wet,
    AboveNormal,
    BelowNormal,
    Dry,
    Critical,
    ExtremeCritical,
}

impl WaterYearType {
    /// All classifications, wettest first.
    pub const ALL: [WaterYearType; 6] = [
        WaterYearType::Wet,
        WaterYearType::AboveNormal,
        WaterYearType::BelowNormal,
        WaterYearType::Dry,
        WaterYearType::Critical,
        WaterYearType::ExtremeCritical,
    ];

    /// Stable index for fixed-size per-type tables.
    pub fn index(self) -> usize {
        match self {
            WaterYearType::Wet => 0,
            WaterYearType::AboveNormal => 1,
            WaterYearType::BelowNormal => 2,
            WaterYearType::Dry => 3,
            WaterYearType::Critical => 4,
            WaterYearType::ExtremeCritical => 5,
        }
    }

    /// Short label used in config files and export headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            WaterYearType::Wet => "wet",
            WaterYearType::AboveNormal => "above_normal",
            WaterYearType::BelowNormal => "below_normal",
            WaterYearType::Dry => "dry",
            WaterYearType::Critical => "critical",
            WaterYearType::ExtremeCritical => "extreme_critical",
        }
    }
}

impl std::str::FromStr for WaterYearType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wet" | "W" => Ok(WaterYearType::Wet),
            "above_normal" | "AN" => Ok(WaterYearType::AboveNormal),
            "below_normal" | "BN" => Ok(WaterYearType::BelowNormal),
            "dry" | "D" => Ok(WaterYearType::Dry),
            "critical" | "C" => Ok(WaterYearType::Critical),
            "extreme_critical" | "EC" => Ok(WaterYearType::ExtremeCritical),
            other => Err(format!("unknown water year type \"{other}\"")),
        }
    }
}

/// A value per water-year type.
///
/// Replaces the original string-keyed rule dictionaries with a closed
/// structure; `extreme_critical` is optional and falls back to `critical`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ByWyt<T> {
    pub wet: T,
    pub above_normal: T,
    pub below_normal: T,
    pub dry: T,
    pub critical: T,
    #[serde(default)]
    pub extreme_critical: Option<T>,
}

impl<T> ByWyt<T> {
    /// Looks up the value for `wyt`.
    pub fn get(&self, wyt: WaterYearType) -> &T {
        match wyt {
            WaterYearType::Wet => &self.wet,
            WaterYearType::AboveNormal => &self.above_normal,
            WaterYearType::BelowNormal => &self.below_normal,
            WaterYearType::Dry => &self.dry,
            WaterYearType::Critical => &self.critical,
            WaterYearType::ExtremeCritical => self.extreme_critical.as_ref().unwrap_or(&self.critical),
        }
    }
}

impl<T: Clone> ByWyt<T> {
    /// Same value for every water-year type.
    pub fn uniform(value: T) -> Self {
        Self {
            wet: value.clone(),
            above_normal: value.clone(),
            below_normal: value.clone(),
            dry: value.clone(),
            critical: value,
            extreme_critical: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn water_year_boundaries() {
        assert_eq!(water_year(date(2022, 10, 1)), 2022);
        assert_eq!(water_year(date(2023, 9, 30)), 2022);
        assert_eq!(water_year(date(2023, 1, 1)), 2022);
        assert_eq!(water_year(date(2023, 10, 1)), 2023);
    }

    #[test]
    fn dowy_key_dates() {
        assert_eq!(day_of_water_year(date(2022, 10, 1)), 0);
        assert_eq!(day_of_water_year(date(2022, 11, 1)), 31);
        assert_eq!(day_of_water_year(date(2023, 1, 1)), 92);
        assert_eq!(day_of_water_year(date(2023, 4, 1)), 182);
        assert_eq!(day_of_water_year(date(2023, 8, 1)), 304);
        assert_eq!(day_of_water_year(date(2023, 9, 30)), 364);
    }

    #[test]
    fn dowy_leap_day_folds() {
        assert_eq!(day_of_water_year(date(2024, 2, 28)), 150);
        assert_eq!(day_of_water_year(date(2024, 2, 29)), 150);
        assert_eq!(day_of_water_year(date(2024, 3, 1)), 151);
    }

    #[test]
    fn month_bucketing_round_trips() {
        for dowy in 0..365 {
            let m = month_for_dowy(dowy);
            assert!(dowy >= dowy_month_start(m));
            assert!(dowy < dowy_month_end(m));
        }
        assert_eq!(month_for_dowy(0), 10);
        assert_eq!(month_for_dowy(364), 9);
        assert_eq!(dowy_month_end(9), 365);
    }

    #[test]
    fn doy_conversion() {
        assert_eq!(doy_for_dowy(0), 274.0); // Oct 1
        assert_eq!(doy_for_dowy(92), 1.0); // Jan 1
        assert_eq!(doy_for_dowy(364), 273.0); // Sep 30
    }

    #[test]
    fn interp_inside_and_clamped() {
        let xs = [0.0, 10.0, 20.0];
        let ys = [1.0, 3.0, 2.0];
        assert_eq!(interp(5.0, &xs, &ys), 2.0);
        assert_eq!(interp(15.0, &xs, &ys), 2.5);
        assert_eq!(interp(-4.0, &xs, &ys), 1.0);
        assert_eq!(interp(99.0, &xs, &ys), 2.0);
    }

    #[test]
    fn exceedance_table_ramps_to_median() {
        for w in EXCEEDANCE_Z.windows(2) {
            assert!(w[0] < w[1]);
        }
        assert_eq!(EXCEEDANCE_Z[9], 0.0);
    }

    #[test]
    fn by_wyt_extreme_critical_fallback() {
        let table = ByWyt {
            wet: 4.0,
            above_normal: 3.0,
            below_normal: 2.0,
            dry: 1.0,
            critical: 0.5,
            extreme_critical: None,
        };
        assert_eq!(*table.get(WaterYearType::ExtremeCritical), 0.5);
        assert_eq!(*table.get(WaterYearType::Wet), 4.0);

        let uniform = ByWyt::uniform(7.0);
        assert_eq!(*uniform.get(WaterYearType::Dry), 7.0);
    }

    #[test]
    fn cfs_conversion_constant() {
        // 1000 cfs for one day is just under 2 taf.
        assert!((1000.0 * CFS_TAFD - 1.9835).abs() < 1e-3);
    }
}
