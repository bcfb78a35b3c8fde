use std::{fs::File, io::BufWriter, path::Path, sync::mpsc::Receiver};

use log::error;
use serde_jsonlines::JsonLinesWriter;

use crate::{FuelCalcError, telemetry::TelemetryOutput};

/// Records every telemetry event to a JSON Lines file until the sending side hangs up.
/// Stops at the first write error.
pub fn write_telemetry(
    file: &Path,
    telemetry_receiver: Receiver<TelemetryOutput>,
) -> Result<(), FuelCalcError> {
    let telemetry_file = File::create(file).map_err(|e| FuelCalcError::WriterError { source: e })?;
    let mut telemetry_file_writer = JsonLinesWriter::new(BufWriter::new(telemetry_file));
    for point in &telemetry_receiver {
        if let Err(e) = telemetry_file_writer.write(&point) {
            error!("Error while writing telemetry point to output file: {}", e);
            return Err(FuelCalcError::WriterError { source: e });
        }
    }
    telemetry_file_writer
        .flush()
        .map_err(|e| FuelCalcError::WriterError { source: e })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::telemetry::{
        SessionMetadata, TelemetrySample,
        producer::{MockTelemetryProducer, TelemetryProducer},
    };

    #[test]
    fn test_recording_can_be_replayed() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("session.jsonl");

        let (tx, rx) = mpsc::channel();
        tx.send(TelemetryOutput::SessionChange(SessionMetadata {
            tank_capacity: 18.5,
            usable_fraction: 1.0,
        }))
        .unwrap();
        for lap in 1..=3 {
            tx.send(TelemetryOutput::DataPoint(Box::new(TelemetrySample {
                point_no: lap as usize,
                lap_completed: lap,
                fuel_level: 18.5 - f64::from(lap),
                ..Default::default()
            })))
            .unwrap();
        }
        drop(tx);

        write_telemetry(&path, rx).unwrap();

        let mut producer = MockTelemetryProducer::from_file(&path).unwrap();
        assert_eq!(producer.len(), 3);
        assert_eq!(producer.session_metadata().unwrap().tank_capacity, 18.5);
        assert_eq!(producer.telemetry().unwrap().lap_completed, 1);
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let (_tx, rx) = mpsc::channel();
        let result = write_telemetry(Path::new("/does/not/exist/session.jsonl"), rx);
        assert!(matches!(result, Err(FuelCalcError::WriterError { .. })));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_stops_at_first_write_error() {
        let (tx, rx) = mpsc::channel();
        for point_no in 0..500 {
            tx.send(TelemetryOutput::DataPoint(Box::new(TelemetrySample {
                point_no,
                ..Default::default()
            })))
            .unwrap();
        }

        // the sender is still alive, so only a write error ends the loop
        let result = write_telemetry(Path::new("/dev/full"), rx);
        assert!(matches!(result, Err(FuelCalcError::WriterError { .. })));
        assert!(
            tx.send(TelemetryOutput::DataPoint(Box::default()))
                .is_err()
        );
    }
}
