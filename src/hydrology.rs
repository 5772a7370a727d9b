//! Daily hydrology inputs for one reservoir.
//!
//! Input tables follow the `<KEY>_<field>` column convention (e.g.
//! `ORO_inf`, `ORO_snow`). Flow-rate columns arrive in cfs and are
//! converted to thousand acre-feet per day at load; observed storage
//! arrives in acre-feet and full natural flow is scaled to millions of
//! acre-feet, matching the regression's working units.

use std::io::Read;
use std::path::Path;

use chrono::{Datelike, NaiveDate};

use crate::error::SimError;
use crate::water_year::{CFS_TAFD, water_year};

/// The per-key input fields, in `<KEY>_<field>` column order.
const FIELDS: [&str; 9] = [
    "inf", "evap", "fci", "snow", "storage", "precip", "gains", "fnf", "otf",
];

/// Complete daily input record for one reservoir key.
///
/// All series share the same date index; the record must begin on Oct 1 so
/// day-of-water-year offsets line up with the fixed-size rule tables.
#[derive(Debug, Clone)]
pub struct HydrologyRecord {
    pub key: String,
    pub dates: Vec<NaiveDate>,
    /// Reservoir inflow (taf/day).
    pub inflow: Vec<f64>,
    /// Evaporation loss (taf/day).
    pub evaporation: Vec<f64>,
    /// Flood-control index (dimensionless, wetness covariate).
    pub flood_index: Vec<f64>,
    /// Snow water equivalent (inches).
    pub snowpack: Vec<f64>,
    /// Observed historical storage (taf).
    pub storage: Vec<f64>,
    /// Basin precipitation (taf/day).
    pub precip: Vec<f64>,
    /// Downstream gains between reservoir and monitoring point (taf/day).
    pub gains: Vec<f64>,
    /// Full natural flow (millions of acre-feet).
    pub fnf: Vec<f64>,
    /// Observed historical releases (taf/day).
    pub releases: Vec<f64>,
}

impl HydrologyRecord {
    /// Number of daily observations.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// True when the record holds no observations.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Water year of the first observation.
    pub fn start_water_year(&self) -> i32 {
        water_year(self.dates[0])
    }

    /// Number of water years touched by the record.
    pub fn num_water_years(&self) -> usize {
        (water_year(self.dates[self.len() - 1]) - self.start_water_year()) as usize + 1
    }

    /// 0-based water-year index of observation `t`.
    pub fn water_year_index(&self, t: usize) -> usize {
        (water_year(self.dates[t]) - self.start_water_year()) as usize
    }

    /// Loads the record for `key` from a CSV file with a `date` column and
    /// `<KEY>_<field>` data columns.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a required column is
    /// missing, a value fails to parse, or the record does not start on
    /// Oct 1 in strictly increasing date order.
    pub fn from_csv(path: &Path, key: &str) -> Result<Self, SimError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, key)
    }

    /// Loads the record for `key` from any CSV reader.
    pub fn from_reader<R: Read>(reader: R, key: &str) -> Result<Self, SimError> {
        let mut rdr = csv::ReaderBuilder::new().from_reader(reader);
        let headers = rdr.headers()?.clone();

        let col = |name: &str| -> Result<usize, SimError> {
            let wanted = format!("{key}_{name}");
            headers
                .iter()
                .position(|h| h == wanted)
                .ok_or_else(|| SimError::Hydrology(format!("missing column \"{wanted}\"")))
        };
        let date_col = headers
            .iter()
            .position(|h| h == "date")
            .ok_or_else(|| SimError::Hydrology("missing column \"date\"".to_string()))?;
        let mut cols = [0usize; 9];
        for (i, field) in FIELDS.iter().enumerate() {
            cols[i] = col(field)?;
        }

        let mut record = Self::with_key(key);
        for (row_idx, row) in rdr.records().enumerate() {
            let row = row?;
            let date = NaiveDate::parse_from_str(&row[date_col], "%Y-%m-%d")
                .map_err(|e| SimError::Hydrology(format!("row {}: bad date: {e}", row_idx + 1)))?;
            let parse = |i: usize| -> Result<f64, SimError> {
                row[cols[i]].trim().parse::<f64>().map_err(|_| {
                    SimError::Hydrology(format!(
                        "row {}: bad value \"{}\" in {}_{}",
                        row_idx + 1,
                        &row[cols[i]],
                        key,
                        FIELDS[i]
                    ))
                })
            };
            record.dates.push(date);
            record.inflow.push(parse(0)? * CFS_TAFD);
            record.evaporation.push(parse(1)? * CFS_TAFD);
            record.flood_index.push(parse(2)?);
            record.snowpack.push(parse(3)?);
            record.storage.push(parse(4)? / 1000.0);
            record.precip.push(parse(5)? * CFS_TAFD);
            record.gains.push(parse(6)? * CFS_TAFD);
            record.fnf.push(parse(7)? / 1_000_000.0);
            record.releases.push(parse(8)? * CFS_TAFD);
        }

        record.validate()?;
        Ok(record)
    }

    /// Builds a deterministic synthetic record of `years` water years
    /// beginning Oct 1 of `start_year`, for the demo preset and tests.
    ///
    /// Wet and dry years alternate through a fixed factor cycle; within a
    /// year the inflow follows a rain-season pulse plus a snowmelt pulse
    /// driven by the accumulated snowpack. No randomness anywhere.
    pub fn synthetic(key: &str, start_year: i32, years: usize) -> Self {
        const YEAR_FACTORS: [f64; 8] = [1.0, 1.4, 0.65, 0.9, 1.25, 0.55, 1.1, 0.8];

        let mut record = Self::with_key(key);
        let start = NaiveDate::from_ymd_opt(start_year, 10, 1).expect("valid start date");
        let end = NaiveDate::from_ymd_opt(start_year + years as i32, 9, 30).expect("valid end");

        let mut date = start;
        while date <= end {
            let wy = water_year(date) - start_year;
            let factor = YEAR_FACTORS[wy as usize % YEAR_FACTORS.len()];
            let dowy = crate::water_year::day_of_water_year(date) as f64;

            // Rain pulse peaks around Jan 1, melt pulse around mid-May.
            let rain_shape = if dowy < 182.0 {
                (std::f64::consts::PI * dowy / 182.0).sin().max(0.0)
            } else {
                0.0
            };
            let melt_shape = if (182.0..304.0).contains(&dowy) {
                (std::f64::consts::PI * (dowy - 182.0) / 122.0).sin().max(0.0)
            } else {
                0.0
            };
            // Snowpack builds through March, ablates through July.
            let snow_shape = if dowy < 182.0 {
                dowy / 182.0
            } else if dowy < 304.0 {
                1.0 - (dowy - 182.0) / 122.0
            } else {
                0.0
            };
            let summer_shape = melt_shape;

            let inflow = factor * (0.8 + 6.0 * rain_shape + 9.0 * melt_shape);
            record.dates.push(date);
            record.inflow.push(inflow);
            record.evaporation.push(0.05 + 0.25 * summer_shape);
            record.flood_index.push(factor * (8.0 - 4.0 * dowy / 364.0));
            record.snowpack.push(factor * 28.0 * snow_shape);
            record.storage.push(1200.0);
            record.precip.push(factor * 2.0 * rain_shape);
            record.gains.push(0.5 * inflow);
            record.fnf.push(inflow * 1.1 / 1000.0);
            record.releases.push(inflow);

            date = date.succ_opt().expect("date in range");
        }
        record
    }

    fn with_key(key: &str) -> Self {
        Self {
            key: key.to_string(),
            dates: Vec::new(),
            inflow: Vec::new(),
            evaporation: Vec::new(),
            flood_index: Vec::new(),
            snowpack: Vec::new(),
            storage: Vec::new(),
            precip: Vec::new(),
            gains: Vec::new(),
            fnf: Vec::new(),
            releases: Vec::new(),
        }
    }

    fn validate(&self) -> Result<(), SimError> {
        if self.dates.is_empty() {
            return Err(SimError::Hydrology("empty record".to_string()));
        }
        let first = self.dates[0];
        if first.month() != 10 || first.day() != 1 {
            return Err(SimError::Hydrology(format!(
                "record must start on Oct 1, got {first}"
            )));
        }
        for w in self.dates.windows(2) {
            if w[1] != w[0].succ_opt().expect("date in range") {
                return Err(SimError::Hydrology(format!(
                    "dates not consecutive: {} then {}",
                    w[0], w[1]
                )));
            }
        }
        Ok(())
    }
}
