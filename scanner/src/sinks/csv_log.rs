use crate::location::Coordinates;
use log::warn;
use rfspikecore::{DetectionEvent, EventSink, SinkResult};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::encoding_error;

const BASE_HEADER: [&str; 3] = ["Timestamp", "Frequency_MHz", "Power_dB"];
const LOCATED_HEADER: [&str; 5] = [
    "Timestamp",
    "Latitude",
    "Longitude",
    "Frequency_MHz",
    "Power_dB",
];

/// Appends one row per detection to a CSV log. The header is written only
/// when the file is new or empty.
pub struct CsvLogSink {
    path: PathBuf,
    location: Option<Coordinates>,
    writer: Mutex<csv::Writer<File>>,
}

impl CsvLogSink {
    pub fn create<P: AsRef<Path>>(path: P, location: Option<Coordinates>) -> SinkResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let header: &[&str] = if location.is_some() {
            &LOCATED_HEADER
        } else {
            &BASE_HEADER
        };

        let existing = existing_header(&path)?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        match existing {
            None => {
                writer.write_record(header).map_err(encoding_error)?;
                writer.flush()?;
            }
            Some(found) if found != header.join(",") => {
                warn!(
                    "{} has header '{}', appending rows with layout '{}'",
                    path.display(),
                    found,
                    header.join(",")
                );
            }
            Some(_) => {}
        }

        Ok(Self {
            path,
            location,
            writer: Mutex::new(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn existing_header(path: &Path) -> SinkResult<Option<String>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line)?;
    let line = line.trim_end();
    Ok((!line.is_empty()).then(|| line.to_string()))
}

impl EventSink for CsvLogSink {
    fn name(&self) -> &str {
        "csv-log"
    }

    fn handle(&self, event: &DetectionEvent) -> SinkResult<()> {
        let detection = &event.detection;
        let mut record = vec![detection.rfc3339()];
        if let Some(coords) = self.location {
            record.push(coords.latitude.to_string());
            record.push(coords.longitude.to_string());
        }
        record.push(format!("{:.3}", detection.frequency_mhz));
        record.push(format!("{:.2}", detection.power_db));

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| encoding_error("csv writer lock poisoned"))?;
        writer.write_record(&record).map_err(encoding_error)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::marker::tests::event_at;

    #[test]
    fn writes_header_once_and_appends_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/detections.csv");

        let sink = CsvLogSink::create(&path, None).unwrap();
        sink.handle(&event_at(915.12345, -12.25)).unwrap();
        drop(sink);

        let sink = CsvLogSink::create(&path, None).unwrap();
        sink.handle(&event_at(433.9, 3.0)).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Timestamp,Frequency_MHz,Power_dB");
        assert_eq!(lines[1], "2024-05-01T12:30:05Z,915.123,-12.25");
        assert_eq!(lines[2], "2024-05-01T12:30:05Z,433.900,3.00");
    }

    #[test]
    fn located_rows_carry_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detections.csv");
        let sink = CsvLogSink::create(&path, Some(Coordinates::new(37.823, -122.441))).unwrap();
        sink.handle(&event_at(915.0, -20.0)).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "Timestamp,Latitude,Longitude,Frequency_MHz,Power_dB");
        assert_eq!(lines[1], "2024-05-01T12:30:05Z,37.823,-122.441,915.000,-20.00");
    }

    #[test]
    fn concurrent_writers_never_interleave_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detections.csv");
        let sink = std::sync::Arc::new(CsvLogSink::create(&path, None).unwrap());

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let sink = std::sync::Arc::clone(&sink);
                std::thread::spawn(move || {
                    for j in 0..25 {
                        sink.handle(&event_at(100.0 + i as f64, -(j as f32)))
                            .unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1 + 8 * 25);
        assert_eq!(lines[0], "Timestamp,Frequency_MHz,Power_dB");
        for line in &lines[1..] {
            let fields: Vec<&str> = line.split(',').collect();
            assert_eq!(fields.len(), 3, "malformed row {:?}", line);
            assert!(fields[1].parse::<f64>().is_ok());
            assert!(fields[2].parse::<f32>().is_ok());
        }
    }

    #[test]
    fn empty_file_gets_a_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detections.csv");
        File::create(&path).unwrap();
        let sink = CsvLogSink::create(&path, None).unwrap();
        sink.handle(&event_at(100.0, 0.0)).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("Timestamp,Frequency_MHz,Power_dB\n"));
        assert_eq!(sink.path(), path.as_path());
    }
}
