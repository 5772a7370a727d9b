/// CSV export of completed simulation series.
pub mod export;
