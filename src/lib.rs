// Library interface for fuelcalc
// This allows integration tests to access internal modules

pub mod errors;
pub mod fuel;
pub mod live;
pub mod telemetry;
pub mod writer;

// Re-export commonly used types
pub use errors::FuelCalcError;
pub use fuel::{FuelEstimator, FuelProjection, FuelReport, FuelSettings};
pub use telemetry::{SessionMetadata, TelemetryOutput, TelemetrySample};
