use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::Ordering,
        mpsc,
    },
    thread,
    time::Duration,
};

use clap::{Parser, Subcommand};
use log::{LevelFilter, error, info, warn};

use fuelcalc::{
    FuelCalcError, FuelEstimator, FuelSettings,
    live::{self, config},
    telemetry::{
        CollectorChannels, PitCommandSink, TelemetryProducer, UserCommand,
        commands::RecordingPitCommandSink, producer::MockTelemetryProducer, run_fuel_calculator,
    },
    writer,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Settings file, defaults to the user configuration directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log every lap and pit event
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to iRacing and estimate fuel live
    Live {
        /// Record the session to a JSON Lines file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Start with AutoFuel enabled
        #[arg(long)]
        auto_fuel: bool,
    },
    /// Run a recorded session through the fuel calculator
    Replay {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long)]
        auto_fuel: bool,
    },
}

fn run_session(
    producer: impl TelemetryProducer,
    sink: &mut impl PitCommandSink,
    estimator: &mut FuelEstimator,
    mut channels: CollectorChannels,
    output: Option<PathBuf>,
    refresh_rate: Duration,
    print_reports: bool,
) -> Result<(), FuelCalcError> {
    let (report_tx, printer) = if print_reports {
        let (report_tx, report_rx) = mpsc::channel();
        (Some(report_tx), Some(live::spawn_report_printer(report_rx)))
    } else {
        (None, None)
    };

    // if we need to write an output file the collector sends every event to the writer thread
    let (writer_tx, writer) = match output {
        Some(output_file) => {
            let (writer_tx, writer_rx) = mpsc::channel();
            let writer =
                thread::spawn(move || writer::write_telemetry(&output_file, writer_rx));
            (Some(writer_tx), Some(writer))
        }
        None => (None, None),
    };

    channels.reports = report_tx;
    channels.telemetry_writer = writer_tx;
    let result = run_fuel_calculator(producer, sink, estimator, &channels, refresh_rate);
    drop(channels);

    if let Some(printer) = printer {
        if printer.join().is_err() {
            warn!("Report printer stopped unexpectedly");
        }
    }
    if let Some(writer) = writer {
        match writer.join() {
            Ok(Ok(())) => info!("Telemetry recording saved"),
            Ok(Err(e)) => error!("Error while recording telemetry: {e}"),
            Err(_) => error!("Telemetry writer stopped unexpectedly"),
        }
    }
    result
}

#[cfg(windows)]
fn live(
    estimator: &mut FuelEstimator,
    command_tx: mpsc::Sender<UserCommand>,
    channels: CollectorChannels,
    output: Option<PathBuf>,
) -> Result<(), FuelCalcError> {
    use fuelcalc::telemetry::{
        collector::REFRESH_RATE_MS, commands::IRacingPitCommandSink,
        producer::IRacingTelemetryProducer,
    };

    let producer = IRacingTelemetryProducer::default();
    let mut sink = IRacingPitCommandSink::new()?;

    println!("{}", live::HELP);
    // blocks on stdin, left running until the process exits
    live::spawn_command_reader(command_tx);

    run_session(
        producer,
        &mut sink,
        estimator,
        channels,
        output,
        Duration::from_millis(REFRESH_RATE_MS),
        true,
    )
}

#[cfg(not(windows))]
fn live(
    _estimator: &mut FuelEstimator,
    _command_tx: mpsc::Sender<UserCommand>,
    _channels: CollectorChannels,
    _output: Option<PathBuf>,
) -> Result<(), FuelCalcError> {
    Err(FuelCalcError::UnsupportedPlatform)
}

fn replay(
    estimator: &mut FuelEstimator,
    channels: CollectorChannels,
    input: &Path,
) -> Result<(), FuelCalcError> {
    if !input.exists() {
        return Err(FuelCalcError::InvalidTelemetryFile {
            path: format!("{}", input.display()),
        });
    }

    let producer = MockTelemetryProducer::from_file(input)?;
    info!("Replaying {} telemetry points", producer.len());

    let mut sink = RecordingPitCommandSink::default();
    run_session(
        producer,
        &mut sink,
        estimator,
        channels,
        None,
        Duration::ZERO,
        false,
    )?;

    println!("{}", estimator.report());
    if !sink.commands.is_empty() {
        println!("Pit stop fuel commands: {:?}", sink.commands);
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let mut builder = colog::default_builder();
    builder.filter_level(if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
    builder.init();
}

fn main() {
    let cli = Args::parse();
    init_logging(cli.verbose);

    let config_path = match cli.config {
        Some(path) => Some(path),
        None => config::default_config_path()
            .map_err(|e| warn!("Settings will not be saved: {e}"))
            .ok(),
    };
    let settings = config_path
        .as_deref()
        .map(config::load_settings)
        .unwrap_or_else(FuelSettings::default);
    let mut estimator = FuelEstimator::new(settings);

    let (command_tx, command_rx) = mpsc::channel::<UserCommand>();
    let channels = CollectorChannels::new(command_rx);

    let quit_tx = command_tx.clone();
    let collecting = Arc::clone(&channels.collecting);
    let startup_settings = estimator.settings().clone();
    let startup_config_path = config_path.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("Exiting...");
        if !live::request_quit(&collecting, &quit_tx) {
            return;
        }
        // still connecting, no setting can have changed yet
        if !collecting.load(Ordering::SeqCst) {
            if let Some(ref path) = startup_config_path {
                if let Err(e) = config::save_settings(path, &startup_settings) {
                    error!("Error while saving config file: {e}");
                }
            }
        }
        std::process::exit(0);
    })
    .map_err(|e| FuelCalcError::SignalHandlerError { source: e })
    {
        warn!("{e}");
    }

    let result = match cli.command {
        Commands::Live { output, auto_fuel } => {
            if auto_fuel {
                estimator.toggle_auto_fuel();
            }
            live(&mut estimator, command_tx, channels, output)
        }
        Commands::Replay { input, auto_fuel } => {
            if auto_fuel {
                estimator.toggle_auto_fuel();
            }
            drop(command_tx);
            replay(&mut estimator, channels, &input)
        }
    };

    if let Some(path) = config_path {
        match config::save_settings(&path, estimator.settings()) {
            Ok(()) => info!("Settings saved to {}", path.display()),
            Err(e) => error!("Error while saving config file: {e}"),
        }
    }

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}
