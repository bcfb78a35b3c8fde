// Error types for fuelcalc

use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum FuelCalcError {
    // Errors for the iRacing client
    #[snafu(display("Missing iRacing client, session not initialized"))]
    MissingIRacingSession,
    #[snafu(display("Live telemetry is only available on Windows"))]
    UnsupportedPlatform,

    // Errors while reading telemetry data
    #[snafu(display("Telemetry point producer error: {description}"))]
    TelemetryProducerError { description: String },
    #[snafu(display("No more recorded telemetry"))]
    EndOfTelemetry,

    // Session metadata errors
    #[snafu(display("Invalid session metadata: {field} = {value}"))]
    InvalidSessionMetadata { field: String, value: String },
    #[snafu(display("Session metadata not available yet"))]
    MissingSessionMetadata,

    // Errors talking back to the simulator
    #[snafu(display("Pit command failed: {description}"))]
    PitCommandError { description: String },

    // Errors for the telemetry writer
    #[snafu(display("Error writing telemetry file"))]
    WriterError { source: io::Error },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },

    #[snafu(display("Could not install the Ctrl-C handler"))]
    SignalHandlerError { source: ctrlc::Error },

    // Replay errors
    #[snafu(display("Invalid telemetry file: {path}"))]
    InvalidTelemetryFile { path: String },
    #[snafu(display("Error loading telemetry file"))]
    TelemetryLoaderError { source: io::Error },
}
