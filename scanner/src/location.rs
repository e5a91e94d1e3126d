use crate::workflow::config::{LocationConfig, LocationMode};
use anyhow::{bail, Context};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::runtime::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Position attached to every detection, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedLocation {
    pub coordinates: Coordinates,
    /// Whether a provider was configured; controls the CSV location columns.
    pub configured: bool,
}

#[derive(Debug, Deserialize)]
struct GeoIpResponse {
    status: String,
    lat: Option<f64>,
    lon: Option<f64>,
    message: Option<String>,
}

fn parse_geoip(body: &str) -> anyhow::Result<Coordinates> {
    let response: GeoIpResponse = serde_json::from_str(body).context("decoding geo-IP reply")?;
    if response.status != "success" {
        bail!(
            "geo-IP lookup failed: {}",
            response.message.unwrap_or(response.status)
        );
    }
    match (response.lat, response.lon) {
        (Some(lat), Some(lon)) => Ok(Coordinates::new(lat, lon)),
        _ => bail!("geo-IP reply has no coordinates"),
    }
}

async fn lookup_geoip(url: &str, timeout: Duration) -> anyhow::Result<Coordinates> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .context("building HTTP client")?;
    let body = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("requesting {url}"))?
        .error_for_status()
        .with_context(|| format!("requesting {url}"))?
        .text()
        .await
        .context("reading geo-IP reply")?;
    parse_geoip(&body)
}

/// Resolves the scanner position. Never fails: lookups that go wrong fall
/// back to the configured fallback coordinate.
pub fn resolve(config: &LocationConfig, runtime: &Handle) -> ResolvedLocation {
    let fallback = Coordinates::new(config.fallback_latitude, config.fallback_longitude);
    let (coordinates, configured) = match config.mode {
        LocationMode::None => (fallback, false),
        LocationMode::Static => (Coordinates::new(config.latitude, config.longitude), true),
        LocationMode::Geoip => {
            let timeout = Duration::from_secs(config.timeout_secs.max(1));
            match runtime.block_on(lookup_geoip(&config.geoip_url, timeout)) {
                Ok(coordinates) => (coordinates, true),
                Err(err) => {
                    warn!("{:#}; using fallback location", err);
                    (fallback, true)
                }
            }
        }
    };
    info!(
        "scanner location {:.4}, {:.4} ({:?})",
        coordinates.latitude, coordinates.longitude, config.mode
    );
    ResolvedLocation {
        coordinates,
        configured,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::runtime::Runtime;

    #[test]
    fn parses_successful_reply() {
        let coords =
            parse_geoip(r#"{"status":"success","lat":38.9072,"lon":-77.0369,"city":"DC"}"#).unwrap();
        assert_eq!(coords, Coordinates::new(38.9072, -77.0369));
    }

    #[test]
    fn rejects_failed_reply() {
        let err = parse_geoip(r#"{"status":"fail","message":"private range"}"#).unwrap_err();
        assert!(err.to_string().contains("private range"));
        assert!(parse_geoip(r#"{"status":"success"}"#).is_err());
        assert!(parse_geoip("not json").is_err());
    }

    #[test]
    fn static_and_none_modes_skip_the_network() {
        let rt = Runtime::new().unwrap();
        let mut config = LocationConfig {
            mode: LocationMode::Static,
            latitude: 1.5,
            longitude: 2.5,
            ..Default::default()
        };
        let resolved = resolve(&config, rt.handle());
        assert!(resolved.configured);
        assert_eq!(resolved.coordinates, Coordinates::new(1.5, 2.5));

        config.mode = LocationMode::None;
        let resolved = resolve(&config, rt.handle());
        assert!(!resolved.configured);
        assert_eq!(resolved.coordinates, Coordinates::new(37.823, -122.441));
    }

    #[test]
    fn unreachable_geoip_falls_back() {
        let rt = Runtime::new().unwrap();
        let config = LocationConfig {
            mode: LocationMode::Geoip,
            geoip_url: "http://127.0.0.1:9/json/".into(),
            timeout_secs: 1,
            fallback_latitude: -33.0,
            fallback_longitude: 151.0,
            ..Default::default()
        };
        let resolved = resolve(&config, rt.handle());
        assert!(resolved.configured);
        assert_eq!(resolved.coordinates, Coordinates::new(-33.0, 151.0));
    }
}
