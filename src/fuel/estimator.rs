use std::fmt;

use log::{debug, info};

use crate::FuelCalcError;
use crate::telemetry::{SessionMetadata, SessionState, TelemetrySample};

use super::FuelSettings;
use super::stats::{filtered_mean, mean};

/// Below this the tank capacity is considered unknown.
const UNKNOWN_CAPACITY_EPSILON: f64 = 0.01;

/// Last seen values of the telemetry stream, used to detect edges.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleCursor {
    pub on_pit_road: bool,
    pub last_lap_completed: i32,
    pub fuel_level: f64,
    pub session_time_remaining_s: f64,
}

impl Default for SampleCursor {
    fn default() -> Self {
        // the car is assumed to start in the pits, so the first edge seen is a pit exit
        Self {
            on_pit_road: true,
            last_lap_completed: 0,
            fuel_level: 0.,
            session_time_remaining_s: 0.,
        }
    }
}

/// A lap accepted into the consumption history.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LapRecord {
    lap_time_s: Option<f64>,
    fuel_used: f64,
}

impl LapRecord {
    /// Lap times that are not strictly positive (the out lap reports 0) are stored as
    /// missing and never count towards the average lap time.
    pub fn new(lap_time_s: f64, fuel_used: f64) -> Self {
        Self {
            lap_time_s: (lap_time_s.is_finite() && lap_time_s > 0.).then_some(lap_time_s),
            fuel_used,
        }
    }

    pub fn lap_time_s(&self) -> Option<f64> {
        self.lap_time_s
    }

    pub fn fuel_used(&self) -> f64 {
        self.fuel_used
    }
}

/// Values derived from the lap history at the last qualifying lap.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FuelProjection {
    pub avg_lap_time_s: f64,
    pub avg_fuel_per_lap: f64,
    pub laps_remaining: u32,
    pub total_fuel_required: f64,
    pub stops: u32,
    pub fuel_per_stop: f64,
    pub fuel_to_add: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PitTransition {
    Entering,
    Exiting,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LapOutcome {
    /// Appended to the history
    Recorded { lap: i32, fuel_used: f64 },
    /// Valid consumption, but not run under green flag racing conditions
    Filtered { lap: i32, fuel_used: f64 },
    /// Completed in the pits or after a refuel
    Excluded { lap: i32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PitEntry {
    /// `None` when there is not enough data to compute a fill
    pub fuel_this_stop: Option<i32>,
}

/// Side effects requested by a single telemetry tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickOutcome {
    pub request_session_refresh: bool,
    pub lap: Option<LapOutcome>,
    pub pit_entry: Option<PitEntry>,
    /// Fill to send to the simulator, only set with auto fuel enabled
    pub fuel_command: Option<u32>,
}

/// Snapshot of the values shown to the user.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FuelReport {
    pub fuel_last_lap: f64,
    pub laps_remaining: u32,
    pub stops: u32,
    pub capacity: f64,
    pub avg_fuel_per_lap: f64,
    pub total_fuel_required: f64,
    pub fuel_to_add: i32,
    pub laps_recorded: usize,
    pub auto_fuel: bool,
}

impl fmt::Display for FuelReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fuel last lap:       {:.2}", self.fuel_last_lap)?;
        writeln!(f, "Avg fuel per lap:    {:.2}", self.avg_fuel_per_lap)?;
        writeln!(f, "Laps remaining:      {}", self.laps_remaining)?;
        writeln!(f, "Total fuel required: {:.2}", self.total_fuel_required)?;
        writeln!(f, "Stops remaining:     {}", self.stops)?;
        writeln!(f, "Max fuel:            {:.2}", self.capacity)?;
        writeln!(f, "Fuel to add:         {}", self.fuel_to_add)?;
        write!(
            f,
            "Laps recorded: {} | AutoFuel {}",
            self.laps_recorded,
            if self.auto_fuel { "enabled" } else { "disabled" }
        )
    }
}

/// Returns the new lap id when the sample completes a lap the cursor has not seen.
pub fn detect_lap_edge(cursor: &SampleCursor, sample: &TelemetrySample) -> Option<i32> {
    (sample.lap_completed > 0 && sample.lap_completed != cursor.last_lap_completed)
        .then_some(sample.lap_completed)
}

pub fn detect_pit_edge(cursor: &SampleCursor, sample: &TelemetrySample) -> Option<PitTransition> {
    match (cursor.on_pit_road, sample.on_pit_road) {
        (false, true) => Some(PitTransition::Entering),
        (true, false) => Some(PitTransition::Exiting),
        _ => None,
    }
}

fn ceil_to_count(value: f64) -> u32 {
    if value.is_finite() && value > 0. {
        value.ceil() as u32
    } else {
        0
    }
}

pub fn estimated_laps(session_time_remaining_s: f64, avg_lap_time_s: f64) -> u32 {
    if avg_lap_time_s <= 0. {
        return 0;
    }
    ceil_to_count(session_time_remaining_s / avg_lap_time_s)
}

pub fn estimated_stops(total_fuel_required: f64, capacity: f64) -> u32 {
    if capacity <= 0. {
        return 0;
    }
    ceil_to_count(total_fuel_required / capacity)
}

/// Whole units to add so the tank holds `fuel_per_stop`. Negative when there is more
/// than enough fuel already.
pub fn fuel_to_add(fuel_per_stop: f64, fuel_level: f64) -> i32 {
    let to_add = (fuel_per_stop - fuel_level).ceil();
    if to_add.is_finite() { to_add as i32 } else { 0 }
}

pub fn recompute_projection(
    history: &[LapRecord],
    settings: &FuelSettings,
    capacity: f64,
    session_time_remaining_s: f64,
    fuel_level: f64,
) -> FuelProjection {
    let lap_times = history
        .iter()
        .filter_map(LapRecord::lap_time_s)
        .collect::<Vec<f64>>();
    let fuel_usages = history
        .iter()
        .map(LapRecord::fuel_used)
        .collect::<Vec<f64>>();

    let avg_lap_time_s = mean(&lap_times);
    let avg_fuel_per_lap = filtered_mean(&fuel_usages);
    let effective_fuel_per_lap = avg_fuel_per_lap * settings.fuel_multiplier;

    let laps_remaining = estimated_laps(session_time_remaining_s, avg_lap_time_s);
    let race_laps = (i64::from(laps_remaining) + i64::from(settings.lap_offset)) as f64;
    let total_fuel_required = (effective_fuel_per_lap * race_laps).max(0.);
    let stops = estimated_stops(total_fuel_required, capacity);
    let fuel_per_stop = if stops > 0 {
        total_fuel_required / f64::from(stops)
    } else {
        0.
    };

    FuelProjection {
        avg_lap_time_s,
        avg_fuel_per_lap,
        laps_remaining,
        total_fuel_required,
        stops,
        fuel_per_stop,
        fuel_to_add: fuel_to_add(fuel_per_stop, fuel_level),
    }
}

/// Tracks fuel consumption over a session and projects the fuel needed to finish it.
///
/// The estimator is driven by [`FuelEstimator::on_session_metadata`] and
/// [`FuelEstimator::on_telemetry_sample`]; it never talks to the simulator itself, the
/// returned [`TickOutcome`] describes what the caller should do.
#[derive(Debug)]
pub struct FuelEstimator {
    capacity: f64,
    cursor: SampleCursor,
    history: Vec<LapRecord>,
    fuel_last_lap: f64,
    projection: FuelProjection,
    settings: FuelSettings,
    auto_fuel: bool,
}

impl Default for FuelEstimator {
    fn default() -> Self {
        Self::new(FuelSettings::default())
    }
}

impl FuelEstimator {
    pub fn new(settings: FuelSettings) -> Self {
        Self {
            capacity: 0.,
            cursor: SampleCursor::default(),
            history: Vec::new(),
            fuel_last_lap: 0.,
            projection: FuelProjection::default(),
            settings,
            auto_fuel: false,
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn is_capacity_known(&self) -> bool {
        self.capacity.abs() > UNKNOWN_CAPACITY_EPSILON
    }

    pub fn cursor(&self) -> &SampleCursor {
        &self.cursor
    }

    pub fn history(&self) -> &[LapRecord] {
        &self.history
    }

    pub fn projection(&self) -> &FuelProjection {
        &self.projection
    }

    pub fn fuel_last_lap(&self) -> f64 {
        self.fuel_last_lap
    }

    pub fn settings(&self) -> &FuelSettings {
        &self.settings
    }

    /// Changes take effect from the next completed lap.
    pub fn settings_mut(&mut self) -> &mut FuelSettings {
        &mut self.settings
    }

    pub fn auto_fuel(&self) -> bool {
        self.auto_fuel
    }

    pub fn toggle_auto_fuel(&mut self) -> bool {
        self.auto_fuel = !self.auto_fuel;
        if self.auto_fuel {
            info!("AutoFuel enabled");
        } else {
            info!("AutoFuel disabled");
        }
        self.auto_fuel
    }

    /// Forget everything learned about the current session. Settings and the auto fuel
    /// mode are kept.
    pub fn reset_session(&mut self) {
        info!("Resetting fuel session");
        *self = Self {
            settings: self.settings.clone(),
            auto_fuel: self.auto_fuel,
            ..Self::default()
        };
    }

    /// Sets the usable tank capacity. Returns `Ok(false)` when the capacity was already known.
    pub fn on_session_metadata(
        &mut self,
        metadata: &SessionMetadata,
    ) -> Result<bool, FuelCalcError> {
        if self.is_capacity_known() {
            return Ok(false);
        }

        for (field, value) in [
            ("tank_capacity", metadata.tank_capacity),
            ("usable_fraction", metadata.usable_fraction),
        ] {
            if !value.is_finite() || value <= 0. {
                return Err(FuelCalcError::InvalidSessionMetadata {
                    field: field.to_string(),
                    value: value.to_string(),
                });
            }
        }

        self.capacity = metadata.usable_capacity();
        debug!("Max fuel tank found to be: {}", metadata.tank_capacity);
        debug!("Max fuel percent found to be: {}", metadata.usable_fraction);
        info!("Usable fuel capacity is {:.2}", self.capacity);
        Ok(true)
    }

    pub fn on_telemetry_sample(&mut self, sample: &TelemetrySample) -> TickOutcome {
        let mut outcome = TickOutcome {
            request_session_refresh: !self.is_capacity_known(),
            ..Default::default()
        };

        if let Some(lap) = detect_lap_edge(&self.cursor, sample) {
            outcome.lap = Some(self.on_lap_completed(lap, sample));
        }

        if let Some(transition) = detect_pit_edge(&self.cursor, sample) {
            self.cursor.on_pit_road = sample.on_pit_road;
            if transition == PitTransition::Entering {
                let entry = self.on_pit_entry(sample);
                if self.auto_fuel {
                    debug!("\t- AutoFuel enabled.");
                    // iRacing reads a zero fill as "keep the previous amount"
                    outcome.fuel_command = entry
                        .fuel_this_stop
                        .and_then(|fuel| u32::try_from(fuel).ok())
                        .filter(|fuel| *fuel > 0);
                } else {
                    debug!("\t- AutoFuel disabled.");
                }
                outcome.pit_entry = Some(entry);
            } else {
                debug!("Leaving pits");
            }
        }

        outcome
    }

    pub fn report(&self) -> FuelReport {
        FuelReport {
            fuel_last_lap: self.fuel_last_lap,
            laps_remaining: self.projection.laps_remaining,
            stops: self.projection.stops,
            capacity: self.capacity,
            avg_fuel_per_lap: self.projection.avg_fuel_per_lap,
            total_fuel_required: self.projection.total_fuel_required,
            fuel_to_add: self.projection.fuel_to_add,
            laps_recorded: self.history.len(),
            auto_fuel: self.auto_fuel,
        }
    }

    fn on_lap_completed(&mut self, lap: i32, sample: &TelemetrySample) -> LapOutcome {
        self.cursor.last_lap_completed = lap;
        self.cursor.session_time_remaining_s = sample.session_time_remaining_s;

        debug!("Lap Completed {lap}");
        debug!("\t- Time: {}", sample.last_lap_time_s);
        debug!("\t- Fuel Level: {}", sample.fuel_level);

        let outcome = if !sample.on_pit_road && self.cursor.fuel_level >= sample.fuel_level {
            let fuel_used = self.cursor.fuel_level - sample.fuel_level;
            let green_racing = sample.session_state == SessionState::Racing
                && sample.session_flags.is_green();

            let recorded = !self.settings.green_flag_only || green_racing;
            if recorded {
                self.history
                    .push(LapRecord::new(sample.last_lap_time_s, fuel_used));
            }

            self.fuel_last_lap = fuel_used;
            self.projection = recompute_projection(
                &self.history,
                &self.settings,
                self.capacity,
                self.cursor.session_time_remaining_s,
                sample.fuel_level,
            );

            debug!("\t- Fuel Delta: {fuel_used}");
            debug!("\t- Avg Laptime: {}", self.projection.avg_lap_time_s);
            debug!("\t- Avg Fuel Delta: {}", self.projection.avg_fuel_per_lap);
            debug!("\t- Laps Remaining: {}", self.projection.laps_remaining);
            debug!(
                "\t- Total Fuel Required: {}",
                self.projection.total_fuel_required
            );
            debug!("\t- Stops Remaining: {}", self.projection.stops);

            if recorded {
                LapOutcome::Recorded { lap, fuel_used }
            } else {
                debug!("\t- Not a green flag racing lap, not recorded");
                LapOutcome::Filtered { lap, fuel_used }
            }
        } else {
            debug!("\t- In pits or refuelled, consumption ignored");
            LapOutcome::Excluded { lap }
        };

        self.cursor.fuel_level = sample.fuel_level;
        outcome
    }

    fn on_pit_entry(&self, sample: &TelemetrySample) -> PitEntry {
        debug!("Entering Pits");

        let has_projection = self.cursor.session_time_remaining_s > 0.
            && self.projection.avg_lap_time_s > 0.
            && self.projection.avg_fuel_per_lap > 0.
            && self.projection.stops > 0
            && sample.session_state == SessionState::Racing;

        let fuel_this_stop =
            has_projection.then(|| fuel_to_add(self.projection.fuel_per_stop, sample.fuel_level));
        if let Some(fuel) = fuel_this_stop {
            debug!("\t- Adding {fuel} litres of fuel");
        }
        PitEntry { fuel_this_stop }
    }
}
