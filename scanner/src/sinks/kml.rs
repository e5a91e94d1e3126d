use super::marker::MarkerFields;
use super::{encoding_error, FileRelay};
use crate::location::Coordinates;
use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use rfspikecore::{DetectionEvent, EventSink, SinkError, SinkResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Renders a single-placemark KML document.
///
/// The name and description carry rounded values for display; the exact
/// frequency and power travel in `ExtendedData` so the marker can be read
/// back without loss.
pub fn render_kml(fields: &MarkerFields) -> String {
    let name = format!("RF Spike {:.2} MHz", fields.frequency_mhz);
    let description = format!("Detected power: {:.2} dB", fields.power_db);
    let when = fields
        .timestamp
        .to_rfc3339_opts(SecondsFormat::AutoSi, true);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Placemark>
    <name>{name}</name>
    <description>{description}</description>
    <Point>
      <coordinates>{lon},{lat},0</coordinates>
    </Point>
    <TimeStamp>
      <when>{when}</when>
    </TimeStamp>
    <ExtendedData>
      <Data name="frequency_mhz"><value>{freq}</value></Data>
      <Data name="power_db"><value>{power}</value></Data>
    </ExtendedData>
  </Placemark>
</kml>
"#,
        name = escape(name.as_str()),
        description = escape(description.as_str()),
        lon = fields.longitude,
        lat = fields.latitude,
        when = when,
        freq = fields.frequency_mhz,
        power = fields.power_db,
    )
}

/// Reads back a marker written by [`render_kml`].
pub fn parse_kml(document: &str) -> SinkResult<MarkerFields> {
    let mut reader = Reader::from_str(document);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut data_name: Option<String> = None;
    let mut coordinates = None;
    let mut when = None;
    let mut frequency = None;
    let mut power = None;

    loop {
        match reader.read_event().map_err(encoding_error)? {
            Event::Start(element) => {
                let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
                if name == "Data" {
                    data_name = element
                        .try_get_attribute("name")
                        .map_err(encoding_error)?
                        .map(|attr| attr.unescape_value().map(|v| v.into_owned()))
                        .transpose()
                        .map_err(encoding_error)?;
                }
                stack.push(name);
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(encoding_error)?.into_owned();
                match stack.last().map(String::as_str) {
                    Some("coordinates") => coordinates = Some(text),
                    Some("when") => when = Some(text),
                    Some("value") => match data_name.as_deref() {
                        Some("frequency_mhz") => frequency = Some(text),
                        Some("power_db") => power = Some(text),
                        _ => {}
                    },
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let coordinates = coordinates.ok_or_else(|| missing("coordinates"))?;
    let mut parts = coordinates.split(',').map(str::trim);
    let longitude = parse_number::<f64>(parts.next(), "longitude")?;
    let latitude = parse_number::<f64>(parts.next(), "latitude")?;

    Ok(MarkerFields {
        timestamp: parse_timestamp(when.as_deref(), "when")?,
        latitude,
        longitude,
        frequency_mhz: parse_number(frequency.as_deref(), "frequency_mhz")?,
        power_db: parse_number(power.as_deref(), "power_db")?,
    })
}

fn missing(field: &str) -> SinkError {
    SinkError::Encoding(format!("marker has no {field}"))
}

pub(crate) fn parse_number<T: std::str::FromStr>(
    value: Option<&str>,
    field: &str,
) -> SinkResult<T> {
    let value = value.ok_or_else(|| missing(field))?;
    value
        .parse()
        .map_err(|_| SinkError::Encoding(format!("{field} '{value}' is not a number")))
}

pub(crate) fn parse_timestamp(value: Option<&str>, field: &str) -> SinkResult<DateTime<Utc>> {
    let value = value.ok_or_else(|| missing(field))?;
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| SinkError::Encoding(format!("{field} '{value}': {err}")))
}

/// Writes one `rf_event_<stamp>.kml` per detection and optionally hands the
/// file to a relay once it is on disk.
pub struct KmlMarkerSink {
    dir: PathBuf,
    position: Coordinates,
    relay: Option<Arc<dyn FileRelay>>,
}

impl KmlMarkerSink {
    pub fn new<P: Into<PathBuf>>(dir: P, position: Coordinates) -> Self {
        Self {
            dir: dir.into(),
            position,
            relay: None,
        }
    }

    pub fn with_relay(mut self, relay: Arc<dyn FileRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn marker_path(&self, event: &DetectionEvent) -> PathBuf {
        self.dir
            .join(format!("rf_event_{}.kml", event.detection.file_stamp()))
    }

    fn write(&self, path: &Path, fields: &MarkerFields) -> SinkResult<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(path, render_kml(fields))?;
        debug!("marker written to {}", path.display());
        Ok(())
    }
}

impl EventSink for KmlMarkerSink {
    fn name(&self) -> &str {
        "kml-marker"
    }

    fn handle(&self, event: &DetectionEvent) -> SinkResult<()> {
        let fields = MarkerFields::from_detection(&event.detection, self.position);
        let path = self.marker_path(event);
        self.write(&path, &fields)?;
        if let Some(relay) = &self.relay {
            relay.transfer(&path)?;
        }
        Ok(())
    }
}
