/// Daily simulation clock.
pub mod clock;
/// Contract allocation, storage pools, and delivery accounting.
pub mod contract;
pub mod kpi;
/// Reservoir forecasting, release determination, and mass balance.
pub mod reservoir;
pub mod types;
