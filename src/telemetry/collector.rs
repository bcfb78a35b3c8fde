use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, Sender},
    },
    thread,
    time::Duration,
};

use log::{debug, error, info, warn};

use crate::FuelCalcError;
use crate::fuel::{FuelEstimator, FuelReport};

use super::{TelemetryOutput, commands::PitCommandSink, producer::TelemetryProducer};

pub const REFRESH_RATE_MS: u64 = 50;

/// Commands issued by the user while the calculator runs.
#[derive(Clone, Debug, PartialEq)]
pub enum UserCommand {
    ToggleAutoFuel,
    ToggleGreenFlagOnly,
    AdjustLapOffset(i32),
    SetFuelMultiplier(f64),
    ResetSession,
    Quit,
}

pub struct CollectorChannels {
    pub commands: Receiver<UserCommand>,
    pub reports: Option<Sender<FuelReport>>,
    pub telemetry_writer: Option<Sender<TelemetryOutput>>,
    /// Set once the producer is connected and commands are being processed
    pub collecting: Arc<AtomicBool>,
}

impl CollectorChannels {
    pub fn new(commands: Receiver<UserCommand>) -> Self {
        Self {
            commands,
            reports: None,
            telemetry_writer: None,
            collecting: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Feeds the producer's telemetry through the fuel estimator until the user quits or the
/// producer runs out of samples.
///
/// Telemetry samples and user commands are handled on the calling thread, one at a time.
/// Reports go to `channels.reports` whenever the projection may have changed.
pub fn run_fuel_calculator(
    mut producer: impl TelemetryProducer,
    sink: &mut impl PitCommandSink,
    estimator: &mut FuelEstimator,
    channels: &CollectorChannels,
    refresh_rate: Duration,
) -> Result<(), FuelCalcError> {
    producer.start()?;
    channels.collecting.store(true, Ordering::SeqCst);

    let mut telemetry_writer = channels.telemetry_writer.clone();
    let mut refresh_session = true;
    let mut metadata_error_logged = false;

    loop {
        let pending = channels.commands.try_iter().collect::<Vec<UserCommand>>();
        for command in pending {
            if !apply_command(estimator, command) {
                info!("Stopping fuel calculator");
                return Ok(());
            }
            publish_report(channels, estimator);
        }

        if !refresh_rate.is_zero() {
            thread::sleep(refresh_rate);
        }

        if refresh_session {
            match producer.session_metadata() {
                Ok(metadata) => match estimator.on_session_metadata(&metadata) {
                    Ok(true) => {
                        metadata_error_logged = false;
                        record(
                            &mut telemetry_writer,
                            TelemetryOutput::SessionChange(metadata),
                        );
                        publish_report(channels, estimator);
                    }
                    Ok(false) => {}
                    Err(e) => log_metadata_error(&mut metadata_error_logged, &e),
                },
                Err(e) => log_metadata_error(&mut metadata_error_logged, &e),
            }
        }

        let sample = match producer.telemetry() {
            Ok(sample) => sample,
            Err(FuelCalcError::EndOfTelemetry) => {
                info!("End of telemetry reached");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        record(
            &mut telemetry_writer,
            TelemetryOutput::DataPoint(Box::new(sample.clone())),
        );

        let outcome = estimator.on_telemetry_sample(&sample);
        refresh_session = outcome.request_session_refresh;

        if let Some(amount) = outcome.fuel_command {
            if let Err(e) = sink.set_pit_stop_fuel(amount) {
                error!("Could not set pit stop fuel to {amount}: {e}");
            }
        }

        if outcome.lap.is_some() || outcome.pit_entry.is_some() {
            publish_report(channels, estimator);
        }
    }
}

/// Recording stops for the rest of the session once the writer is gone.
fn record(writer: &mut Option<Sender<TelemetryOutput>>, output: TelemetryOutput) {
    if let Some(sender) = writer {
        if sender.send(output).is_err() {
            warn!("Telemetry writer stopped, the session is no longer recorded");
            *writer = None;
        }
    }
}

fn log_metadata_error(already_logged: &mut bool, e: &FuelCalcError) {
    if *already_logged {
        debug!("Session metadata still unavailable: {e}");
    } else {
        error!("Error reading session metadata: {e}");
        *already_logged = true;
    }
}

/// Returns false when the calculator should stop.
fn apply_command(estimator: &mut FuelEstimator, command: UserCommand) -> bool {
    match command {
        UserCommand::ToggleAutoFuel => {
            estimator.toggle_auto_fuel();
        }
        UserCommand::ToggleGreenFlagOnly => {
            let settings = estimator.settings_mut();
            settings.green_flag_only = !settings.green_flag_only;
            info!("Green flag laps only: {}", settings.green_flag_only);
        }
        UserCommand::AdjustLapOffset(delta) => {
            let settings = estimator.settings_mut();
            settings.lap_offset = settings.lap_offset.saturating_add(delta);
            info!("Lap offset: {}", settings.lap_offset);
        }
        UserCommand::SetFuelMultiplier(multiplier) => {
            if multiplier.is_finite() && multiplier > 0. {
                estimator.settings_mut().fuel_multiplier = multiplier;
                info!("Fuel multiplier: {multiplier}");
            } else {
                warn!("Ignoring invalid fuel multiplier {multiplier}");
            }
        }
        UserCommand::ResetSession => estimator.reset_session(),
        UserCommand::Quit => return false,
    }
    true
}

fn publish_report(channels: &CollectorChannels, estimator: &FuelEstimator) {
    if let Some(ref reports) = channels.reports {
        if reports.send(estimator.report()).is_err() {
            warn!("Fuel report receiver is gone");
        }
    }
}
