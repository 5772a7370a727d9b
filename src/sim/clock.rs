/// A simulation clock that walks a daily date range.
///
/// The `Clock` provides methods to advance one day at a time or run a
/// function for each remaining day until completion.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use resop_sim::sim::clock::Clock;
///
/// let start = NaiveDate::from_ymd_opt(2000, 10, 1).unwrap();
/// let mut clock = Clock::new(start, 3);
/// let mut days = Vec::new();
///
/// clock.run(|t, date| days.push((t, date)));
/// assert_eq!(days.len(), 3);
/// assert_eq!(days[2].0, 2);
/// ```
pub struct Clock {
    /// Current day index of the simulation.
    current: usize,
    /// Total days to run.
    total: usize,
    /// Date of the current day.
    date: chrono::NaiveDate,
}

impl Clock {
    /// Creates a new clock starting at `start` for `total` days.
    pub fn new(start: chrono::NaiveDate, total: usize) -> Self {
        Self {
            current: 0,
            total,
            date: start,
        }
    }

    /// Advances the clock by one day.
    ///
    /// # Returns
    ///
    /// * `Some((t, date))` - The day index and date before advancing
    /// * `None` - If the clock has reached its total days
    pub fn tick(&mut self) -> Option<(usize, chrono::NaiveDate)> {
        if self.current < self.total {
            let day = (self.current, self.date);
            self.current += 1;
            self.date = self.date.succ_opt().expect("date in range");
            Some(day)
        } else {
            None
        }
    }

    /// Runs a function for each remaining day in the clock.
    pub fn run(&mut self, mut f: impl FnMut(usize, chrono::NaiveDate)) {
        while let Some((t, date)) = self.tick() {
            f(t, date);
        }
    }
}
