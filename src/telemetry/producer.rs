#[cfg(windows)]
use std::time::Duration;

use log::{debug, error};

use crate::FuelCalcError;

use super::{SessionMetadata, TelemetryOutput, TelemetrySample};

#[cfg(windows)]
const CONN_RETRY_WAIT_MS: u64 = 200;

/// A source of telemetry samples and session metadata.
///
/// # Lifecycle
///
/// 1. Call `start()` to connect to the simulator or data source
/// 2. Call `telemetry()` repeatedly to get samples
/// 3. Call `session_metadata()` whenever the fuel estimator asks for a refresh
pub trait TelemetryProducer {
    /// Establish the connection to the data source.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    fn start(&mut self) -> Result<(), FuelCalcError>;

    /// Read the car fuel information from the current session info.
    ///
    /// # Errors
    ///
    /// Returns an error if the producer is not started, the session info is not available
    /// yet, or its fuel fields cannot be parsed.
    fn session_metadata(&mut self) -> Result<SessionMetadata, FuelCalcError>;

    /// Get the next telemetry sample.
    ///
    /// # Errors
    ///
    /// Returns an error if the producer is not started, the sample cannot be read, or
    /// the data source is exhausted (`FuelCalcError::EndOfTelemetry`).
    fn telemetry(&mut self) -> Result<TelemetrySample, FuelCalcError>;
}

impl<P: TelemetryProducer + ?Sized> TelemetryProducer for &mut P {
    fn start(&mut self) -> Result<(), FuelCalcError> {
        (**self).start()
    }

    fn session_metadata(&mut self) -> Result<SessionMetadata, FuelCalcError> {
        (**self).session_metadata()
    }

    fn telemetry(&mut self) -> Result<TelemetrySample, FuelCalcError> {
        (**self).telemetry()
    }
}

#[cfg(windows)]
pub struct IRacingTelemetryProducer {
    client: Option<simetry::iracing::Client>,
    runtime: Option<tokio::runtime::Runtime>,
    last_state: Option<simetry::iracing::SimState>,
    retry_wait_ms: u64,
    point_no: usize,
}

#[cfg(windows)]
impl Default for IRacingTelemetryProducer {
    fn default() -> Self {
        IRacingTelemetryProducer::new(CONN_RETRY_WAIT_MS)
    }
}

#[cfg(windows)]
impl IRacingTelemetryProducer {
    pub fn new(retry_wait_ms: u64) -> Self {
        Self {
            client: None,
            runtime: None,
            last_state: None,
            retry_wait_ms,
            point_no: 0,
        }
    }

    fn next_state(&mut self) -> Result<simetry::iracing::SimState, FuelCalcError> {
        let (Some(client), Some(runtime)) = (self.client.as_mut(), self.runtime.as_ref()) else {
            return Err(FuelCalcError::MissingIRacingSession);
        };
        runtime
            .block_on(client.next_sim_state())
            .ok_or(FuelCalcError::TelemetryProducerError {
                description: "Could not retrieve iRacing state".to_string(),
            })
    }
}

#[cfg(windows)]
impl TelemetryProducer for IRacingTelemetryProducer {
    fn start(&mut self) -> Result<(), FuelCalcError> {
        let retry_delay = Duration::from_millis(self.retry_wait_ms);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| FuelCalcError::TelemetryProducerError {
                description: format!("Could not start async runtime: {e}"),
            })?;

        log::info!("Waiting for an iRacing session...");
        let client = runtime.block_on(simetry::iracing::Client::connect(retry_delay));
        log::info!("Connected to iRacing");

        self.client = Some(client);
        self.runtime = Some(runtime);
        Ok(())
    }

    fn session_metadata(&mut self) -> Result<SessionMetadata, FuelCalcError> {
        let state = match self.last_state.take() {
            Some(state) => state,
            None => self.next_state()?,
        };

        let session_info = state.session_info();
        let driver_info = &session_info["DriverInfo"];
        // numbers come back as floats or strings depending on the session info formatting
        let field = |name: &str| {
            let value = &driver_info[name];
            value
                .as_f64()
                .map(|number| number.to_string())
                .or_else(|| value.as_str().map(str::to_string))
                .unwrap_or_default()
        };
        let raw_capacity = field("DriverCarFuelMaxLtr");
        let raw_fraction = field("DriverCarMaxFuelPct");
        let metadata = SessionMetadata::parse(&raw_capacity, &raw_fraction);

        self.last_state = Some(state);
        metadata
    }

    fn telemetry(&mut self) -> Result<TelemetrySample, FuelCalcError> {
        if self.point_no == usize::MAX {
            self.point_no = 0;
        }
        self.point_no += 1;

        let state = self.next_state()?;
        let sample = TelemetrySample::from_iracing_state(&state, self.point_no);
        self.last_state = Some(state);

        if self.point_no.is_multiple_of(600) {
            debug!("iRacing: retrieved telemetry point #{}", self.point_no);
        }
        Ok(sample)
    }
}

/// A telemetry producer replaying recorded or generated samples.
///
/// Used to replay sessions recorded with `fuelcalc live --output`, and to drive the fuel
/// estimator in tests without a running simulator.
#[derive(Default)]
pub struct MockTelemetryProducer {
    cur_tick: usize,
    points: Vec<TelemetrySample>,
    pub metadata: Option<SessionMetadata>,
    pub metadata_requests: usize,
}

impl MockTelemetryProducer {
    pub fn from_points(points: Vec<TelemetrySample>, metadata: Option<SessionMetadata>) -> Self {
        Self {
            cur_tick: 0,
            points,
            metadata,
            metadata_requests: 0,
        }
    }

    /// Load a session from a JSON Lines file of `TelemetryOutput` records.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or a line is not a valid
    /// `TelemetryOutput`.
    pub fn from_file(file: &std::path::Path) -> Result<Self, FuelCalcError> {
        let lines = serde_jsonlines::json_lines::<TelemetryOutput, _>(file)
            .map_err(|e| FuelCalcError::TelemetryLoaderError { source: e })?;

        let mut points = Vec::new();
        let mut metadata = None;
        for output in lines {
            let output = output.map_err(|e| {
                error!("Could not parse JSON line: {}", e);
                FuelCalcError::TelemetryProducerError {
                    description: format!("Could not parse JSON line: {}", e),
                }
            })?;

            match output {
                TelemetryOutput::DataPoint(sample) => points.push(*sample),
                TelemetryOutput::SessionChange(session) => metadata = Some(session),
            }
        }
        debug!(
            "Loaded {} telemetry points from {}",
            points.len(),
            file.display()
        );

        Ok(Self::from_points(points, metadata))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl TelemetryProducer for MockTelemetryProducer {
    fn start(&mut self) -> Result<(), FuelCalcError> {
        Ok(())
    }

    fn session_metadata(&mut self) -> Result<SessionMetadata, FuelCalcError> {
        self.metadata_requests += 1;
        self.metadata
            .clone()
            .ok_or(FuelCalcError::MissingSessionMetadata)
    }

    fn telemetry(&mut self) -> Result<TelemetrySample, FuelCalcError> {
        let point = self
            .points
            .get(self.cur_tick)
            .cloned()
            .ok_or(FuelCalcError::EndOfTelemetry)?;
        self.cur_tick += 1;
        Ok(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{SessionFlags, SessionState};
    use std::io::Write;

    #[test]
    fn test_mock_producer_replays_points() {
        let points = vec![
            TelemetrySample {
                point_no: 1,
                lap_completed: 1,
                fuel_level: 20.0,
                ..Default::default()
            },
            TelemetrySample {
                point_no: 2,
                lap_completed: 2,
                fuel_level: 18.0,
                ..Default::default()
            },
        ];
        let mut producer = MockTelemetryProducer::from_points(points, None);
        assert!(producer.start().is_ok());

        assert_eq!(producer.telemetry().unwrap().point_no, 1);
        assert_eq!(producer.telemetry().unwrap().point_no, 2);
        assert!(matches!(
            producer.telemetry(),
            Err(FuelCalcError::EndOfTelemetry)
        ));
    }

    #[test]
    fn test_mock_producer_metadata() {
        let mut producer = MockTelemetryProducer::default();
        assert!(matches!(
            producer.session_metadata(),
            Err(FuelCalcError::MissingSessionMetadata)
        ));

        producer.metadata = Some(SessionMetadata {
            tank_capacity: 110.0,
            usable_fraction: 1.0,
        });
        assert_eq!(producer.session_metadata().unwrap().tank_capacity, 110.0);
        assert_eq!(producer.metadata_requests, 2);
    }

    #[test]
    fn test_mock_producer_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let records = vec![
            TelemetryOutput::SessionChange(SessionMetadata {
                tank_capacity: 40.0,
                usable_fraction: 0.95,
            }),
            TelemetryOutput::DataPoint(Box::new(TelemetrySample {
                point_no: 1,
                session_state: SessionState::Racing,
                session_flags: SessionFlags(SessionFlags::GREEN),
                lap_completed: 3,
                fuel_level: 31.5,
                ..Default::default()
            })),
        ];
        for record in &records {
            writeln!(file, "{}", serde_json::to_string(record).unwrap()).unwrap();
        }
        file.flush().unwrap();

        let mut producer = MockTelemetryProducer::from_file(file.path()).unwrap();
        assert_eq!(producer.len(), 1);
        assert_eq!(producer.session_metadata().unwrap().usable_fraction, 0.95);
        let sample = producer.telemetry().unwrap();
        assert_eq!(sample.lap_completed, 3);
        assert_eq!(sample.session_state, SessionState::Racing);
    }

    #[test]
    fn test_mock_producer_from_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not telemetry").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            MockTelemetryProducer::from_file(file.path()),
            Err(FuelCalcError::TelemetryProducerError { .. })
        ));
        assert!(matches!(
            MockTelemetryProducer::from_file(std::path::Path::new("does/not/exist.jsonl")),
            Err(FuelCalcError::TelemetryLoaderError { .. })
        ));
    }
}
