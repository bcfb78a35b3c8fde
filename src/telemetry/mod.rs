pub mod collector;
pub mod commands;
pub mod producer;

pub use collector::{CollectorChannels, UserCommand, run_fuel_calculator};
pub use commands::PitCommandSink;
pub use producer::TelemetryProducer;
use serde::{Deserialize, Serialize};

use crate::FuelCalcError;

/// Session state as reported by the iRacing `SessionState` variable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Invalid,
    GetInCar,
    Warmup,
    ParadeLaps,
    Racing,
    Checkered,
    CoolDown,
}

impl SessionState {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => Self::GetInCar,
            2 => Self::Warmup,
            3 => Self::ParadeLaps,
            4 => Self::Racing,
            5 => Self::Checkered,
            6 => Self::CoolDown,
            _ => Self::Invalid,
        }
    }
}

/// The iRacing `SessionFlags` bitfield.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionFlags(pub u32);

impl SessionFlags {
    pub const CHECKERED: u32 = 0x0000_0001;
    pub const WHITE: u32 = 0x0000_0002;
    pub const GREEN: u32 = 0x0000_0004;
    pub const YELLOW: u32 = 0x0000_0008;
    pub const RED: u32 = 0x0000_0010;
    pub const BLUE: u32 = 0x0000_0020;
    pub const DEBRIS: u32 = 0x0000_0040;
    pub const CROSSED: u32 = 0x0000_0080;
    pub const YELLOW_WAVING: u32 = 0x0000_0100;
    pub const ONE_LAP_TO_GREEN: u32 = 0x0000_0200;
    pub const GREEN_HELD: u32 = 0x0000_0400;
    pub const CAUTION: u32 = 0x0000_4000;
    pub const CAUTION_WAVING: u32 = 0x0000_8000;

    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub fn is_green(&self) -> bool {
        self.contains(Self::GREEN)
    }
}

/// One telemetry sample, the subset of the simulator state the fuel estimator consumes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub point_no: usize,
    /// Whether the car is between the pit lane cones
    pub on_pit_road: bool,
    pub session_state: SessionState,
    /// Laps completed by the player, 0 until the first line crossing
    pub lap_completed: i32,
    /// Seconds left in the session
    pub session_time_remaining_s: f64,
    /// Fuel in the tank, in liters
    pub fuel_level: f64,
    /// Players last lap time
    pub last_lap_time_s: f64,
    pub session_flags: SessionFlags,
}

#[cfg(windows)]
impl TelemetrySample {
    pub(crate) fn from_iracing_state(state: &simetry::iracing::SimState, point_no: usize) -> Self {
        Self {
            point_no,
            on_pit_road: state.read_name::<bool>("OnPitRoad").unwrap_or(false),
            session_state: SessionState::from_raw(
                state.read_name::<i32>("SessionState").unwrap_or(0),
            ),
            lap_completed: state.read_name::<i32>("LapCompleted").unwrap_or(0),
            session_time_remaining_s: state.read_name::<f64>("SessionTimeRemain").unwrap_or(0.),
            fuel_level: state.read_name::<f32>("FuelLevel").unwrap_or(0.) as f64,
            last_lap_time_s: state.read_name::<f32>("LapLastLapTime").unwrap_or(0.) as f64,
            session_flags: SessionFlags(state.read_name::<u32>("SessionFlags").unwrap_or(0)),
        }
    }
}

/// Car fuel information published with the session info.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Fuel tank size in liters
    pub tank_capacity: f64,
    /// Fraction of the tank the series allows, 0 to 1
    pub usable_fraction: f64,
}

impl SessionMetadata {
    /// Parses the raw session info strings, e.g. `"110.000"` or `"18.5 l"`.
    pub fn parse(raw_capacity: &str, raw_fraction: &str) -> Result<Self, FuelCalcError> {
        Ok(Self {
            tank_capacity: parse_number("DriverCarFuelMaxLtr", raw_capacity)?,
            usable_fraction: parse_number("DriverCarMaxFuelPct", raw_fraction)?,
        })
    }

    pub fn usable_capacity(&self) -> f64 {
        self.tank_capacity * self.usable_fraction
    }
}

fn parse_number(field: &str, raw: &str) -> Result<f64, FuelCalcError> {
    raw.split_whitespace()
        .next()
        .and_then(|token| token.parse::<f64>().ok())
        .ok_or_else(|| FuelCalcError::InvalidSessionMetadata {
            field: field.to_string(),
            value: raw.to_string(),
        })
}

/// Events produced by the telemetry source, also the on-disk recording format.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TelemetryOutput {
    DataPoint(Box<TelemetrySample>),
    SessionChange(SessionMetadata),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_from_raw() {
        assert_eq!(SessionState::from_raw(4), SessionState::Racing);
        assert_eq!(SessionState::from_raw(5), SessionState::Checkered);
        assert_eq!(SessionState::from_raw(0), SessionState::Invalid);
        assert_eq!(SessionState::from_raw(42), SessionState::Invalid);
    }

    #[test]
    fn test_session_flags_green() {
        let flags = SessionFlags(SessionFlags::GREEN | SessionFlags::BLUE);
        assert!(flags.is_green());
        assert!(flags.contains(SessionFlags::BLUE));
        assert!(!SessionFlags(SessionFlags::CAUTION_WAVING | SessionFlags::YELLOW).is_green());
        assert!(!SessionFlags::default().is_green());
    }

    #[test]
    fn test_session_metadata_parse() {
        let metadata = SessionMetadata::parse("40.000", "0.950").unwrap();
        assert!((metadata.usable_capacity() - 38.0).abs() < 1e-9);

        let with_unit = SessionMetadata::parse(" 18.5 l", "1.0").unwrap();
        assert!((with_unit.tank_capacity - 18.5).abs() < 1e-9);

        let err = SessionMetadata::parse("n/a", "1.0").unwrap_err();
        assert!(matches!(
            err,
            FuelCalcError::InvalidSessionMetadata { ref field, .. } if field == "DriverCarFuelMaxLtr"
        ));
        assert!(SessionMetadata::parse("40.0", "").is_err());
    }

    #[test]
    fn test_telemetry_output_serialization() {
        let output = TelemetryOutput::DataPoint(Box::new(TelemetrySample {
            point_no: 7,
            lap_completed: 3,
            fuel_level: 12.5,
            session_flags: SessionFlags(SessionFlags::GREEN),
            session_state: SessionState::Racing,
            ..Default::default()
        }));
        let json = serde_json::to_string(&output).unwrap();
        let parsed: TelemetryOutput = serde_json::from_str(&json).unwrap();
        match parsed {
            TelemetryOutput::DataPoint(sample) => {
                assert_eq!(sample.lap_completed, 3);
                assert!(sample.session_flags.is_green());
            }
            TelemetryOutput::SessionChange(_) => panic!("expected a data point"),
        }
    }
}
