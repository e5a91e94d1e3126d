use super::kml::{parse_number, parse_timestamp};
use super::marker::MarkerFields;
use super::encoding_error;
use crate::location::Coordinates;
use crate::workflow::config::CotConfig;
use chrono::{Duration, SecondsFormat};
use log::debug;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use rfspikecore::{DetectionEvent, EventSink, SinkError, SinkResult};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

pub const EVENT_TYPE: &str = "b-r-f";

/// Renders a Cursor-on-Target event for one marker.
pub fn render_cot(fields: &MarkerFields, uid: &str, stale: Duration) -> String {
    let time = fields.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true);
    let stale = (fields.timestamp + stale).to_rfc3339_opts(SecondsFormat::AutoSi, true);
    let callsign = fields.label();
    let remarks = format!(
        "RF detection at {:.2} MHz with strength {:.2} dB",
        fields.frequency_mhz, fields.power_db
    );
    format!(
        r#"<event version="2.0" uid="{uid}" type="{EVENT_TYPE}" how="m-g" time="{time}" start="{time}" stale="{stale}">
  <point lat="{lat}" lon="{lon}" hae="10.0" ce="50.0" le="9999.0"/>
  <detail>
    <contact callsign="{callsign}"/>
    <remarks>{remarks}</remarks>
    <rf_spike frequency_mhz="{freq}" power_db="{power}"/>
    <takv device="RF Scanner" version="1.0" platform="rfspike"/>
    <__group role="Team Member" name="RF Detection"/>
  </detail>
</event>"#,
        uid = escape(uid),
        lat = fields.latitude,
        lon = fields.longitude,
        callsign = escape(callsign.as_str()),
        remarks = escape(remarks.as_str()),
        freq = fields.frequency_mhz,
        power = fields.power_db,
    )
}

fn attribute(element: &BytesStart<'_>, name: &str) -> SinkResult<Option<String>> {
    element
        .try_get_attribute(name)
        .map_err(encoding_error)?
        .map(|attr| attr.unescape_value().map(|v| v.into_owned()))
        .transpose()
        .map_err(encoding_error)
}

/// Decoded CoT event: the marker plus the sender uid.
#[derive(Debug, Clone, PartialEq)]
pub struct CotEvent {
    pub uid: String,
    pub fields: MarkerFields,
}

pub fn parse_cot(document: &str) -> SinkResult<CotEvent> {
    let mut reader = Reader::from_str(document);
    reader.config_mut().trim_text(true);

    let mut uid = None;
    let mut time = None;
    let mut kind = None;
    let (mut lat, mut lon) = (None, None);
    let (mut freq, mut power) = (None, None);

    loop {
        match reader.read_event().map_err(encoding_error)? {
            Event::Start(element) | Event::Empty(element) => {
                match element.local_name().as_ref() {
                    b"event" => {
                        uid = attribute(&element, "uid")?;
                        time = attribute(&element, "time")?;
                        kind = attribute(&element, "type")?;
                    }
                    b"point" => {
                        lat = attribute(&element, "lat")?;
                        lon = attribute(&element, "lon")?;
                    }
                    b"rf_spike" => {
                        freq = attribute(&element, "frequency_mhz")?;
                        power = attribute(&element, "power_db")?;
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if kind.as_deref() != Some(EVENT_TYPE) {
        return Err(SinkError::Encoding(format!(
            "unexpected event type {:?}",
            kind
        )));
    }
    Ok(CotEvent {
        uid: uid.ok_or_else(|| SinkError::Encoding("event has no uid".into()))?,
        fields: MarkerFields {
            timestamp: parse_timestamp(time.as_deref(), "time")?,
            latitude: parse_number(lat.as_deref(), "lat")?,
            longitude: parse_number(lon.as_deref(), "lon")?,
            frequency_mhz: parse_number(freq.as_deref(), "frequency_mhz")?,
            power_db: parse_number(power.as_deref(), "power_db")?,
        },
    })
}

/// Sends each detection as one CoT datagram.
pub struct CotRelaySink {
    target: String,
    uid: String,
    stale: Duration,
    position: Coordinates,
}

impl CotRelaySink {
    pub fn new(config: &CotConfig, position: Coordinates) -> Self {
        Self {
            target: config.target.clone(),
            uid: config.uid.clone(),
            stale: Duration::seconds(config.stale_secs),
            position,
        }
    }

    fn resolve_target(&self) -> SinkResult<SocketAddr> {
        self.target
            .to_socket_addrs()
            .map_err(|err| SinkError::Network(format!("resolving {}: {err}", self.target)))?
            .next()
            .ok_or_else(|| SinkError::Network(format!("{} has no address", self.target)))
    }
}

impl EventSink for CotRelaySink {
    fn name(&self) -> &str {
        "cot-relay"
    }

    fn handle(&self, event: &DetectionEvent) -> SinkResult<()> {
        let fields = MarkerFields::from_detection(&event.detection, self.position);
        let payload = render_cot(&fields, &self.uid, self.stale);
        let target = self.resolve_target()?;
        let bind: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind)?;
        let sent = socket.send_to(payload.as_bytes(), target)?;
        if sent != payload.len() {
            return Err(SinkError::Network(format!(
                "short send to {target}: {sent} of {} bytes",
                payload.len()
            )));
        }
        debug!("CoT event sent to {}", target);
        Ok(())
    }
}
