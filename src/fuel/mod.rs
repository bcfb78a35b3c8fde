// Fuel estimation: lap detection, consumption statistics and pit stop projections

pub mod estimator;
pub mod stats;

pub use estimator::{
    FuelEstimator, FuelProjection, FuelReport, LapOutcome, LapRecord, PitEntry, PitTransition,
    SampleCursor, TickOutcome, detect_lap_edge, detect_pit_edge, estimated_stops, fuel_to_add,
    recompute_projection,
};
pub use stats::filtered_mean;

use serde::{Deserialize, Serialize};

pub const DEFAULT_FUEL_MULTIPLIER: f64 = 1.0;

/// User adjustable settings, persisted between runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FuelSettings {
    /// Only record laps run in a race under green flag conditions
    #[serde(rename = "green_flag")]
    pub green_flag_only: bool,
    /// Laps added to the estimated race length
    pub lap_offset: i32,
    /// Multiplier applied to the average fuel per lap
    #[serde(rename = "fuel_mult")]
    pub fuel_multiplier: f64,
}

impl Default for FuelSettings {
    fn default() -> Self {
        Self {
            green_flag_only: false,
            lap_offset: 0,
            fuel_multiplier: DEFAULT_FUEL_MULTIPLIER,
        }
    }
}
