//! GNSS receiver behind an AT modem (`AT+CGNSSINFO`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::link_slot::{LinkSlot, reply_field};
use crate::error::SampleError;
use crate::link::{Connector, LineProtocol};
use crate::store::{GpsFix, Payload, SpeedUnit, Topic};
use crate::workers::{Sampler, WorkerCommand};

const KNOTS_TO_KMH: f64 = 1.852;
const KMH_PER_MPH: f64 = 1.609_344;

/// `(lat_min, lat_max, lon_min, lon_max)` of regions that sign speeds in mph.
const MPH_REGIONS: [(f64, f64, f64, f64); 4] = [
    (24.0, 49.0, -125.0, -66.0), // United States
    (49.0, 61.0, -8.0, 2.0),     // United Kingdom
    (4.0, 9.0, -12.0, -7.0),     // Liberia
    (9.0, 29.0, 92.0, 101.0),    // Myanmar
];

/// Polls position fixes; the speed unit follows the position unless forced.
pub struct GpsSampler {
    link: LinkSlot,
    requested: SpeedUnit,
    last_unit: SpeedUnit,
    enabled: bool,
}

impl GpsSampler {
    pub fn new<I, S>(connector: Arc<dyn Connector>, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            link: LinkSlot::new(connector, candidates, LineProtocol::AT),
            requested: SpeedUnit::Auto,
            last_unit: SpeedUnit::Kmh,
            enabled: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.link.set_timeout(timeout);
        self
    }

    pub fn with_speed_unit(mut self, unit: SpeedUnit) -> Self {
        self.requested = unit;
        self
    }
}

#[async_trait]
impl Sampler for GpsSampler {
    fn topic(&self) -> Topic {
        Topic::Gps
    }

    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    async fn connect(&mut self) -> Result<(), SampleError> {
        self.link.connect().await?;
        self.enabled = false;
        Ok(())
    }

    async fn sample(&mut self) -> Result<Payload, SampleError> {
        if !self.enabled {
            // Already-on receivers reject the command.
            self.link.send_optional("AT+CGPS=1").await?;
            self.enabled = true;
        }
        let lines = self.link.send("AT+CGNSSINFO").await?;
        let body = reply_field(&lines, "+CGNSSINFO:")
            .ok_or_else(|| SampleError::decode("missing +CGNSSINFO"))?;

        let Some(mut fix) = parse_cgnssinfo(body)? else {
            return Ok(Payload::Gps(GpsFix::no_fix(self.last_unit)));
        };
        let (lat, lon) = (fix.latitude.unwrap_or_default(), fix.longitude.unwrap_or_default());
        let unit = resolve_unit(self.requested, lat, lon);
        if unit == SpeedUnit::Mph {
            fix.speed = fix.speed.map(|kmh| kmh / KMH_PER_MPH);
        }
        fix.unit = unit;
        self.last_unit = unit;
        Ok(Payload::Gps(fix))
    }

    async fn apply(&mut self, command: &WorkerCommand) -> Result<(), SampleError> {
        match command {
            WorkerCommand::SetSpeedUnit(unit) => {
                debug!(?unit, "gps speed unit requested");
                self.requested = *unit;
                Ok(())
            }
            other => Err(SampleError::Unsupported(other.to_string())),
        }
    }

    async fn disconnect(&mut self) {
        self.link.disconnect().await;
        self.enabled = false;
    }
}

/// Parses the body of `+CGNSSINFO:`; `None` when the receiver has no fix.
/// A reply with only one of latitude and longitude is malformed.
///
/// Fields: mode, GPS/GLONASS/BeiDou satellites, lat, N/S, lon, E/W, date,
/// UTC time, altitude, speed (knots), course, PDOP, HDOP, VDOP. Speed comes
/// back in km/h with `unit = Kmh`.
fn parse_cgnssinfo(body: &str) -> Result<Option<GpsFix>, SampleError> {
    let f: Vec<&str> = body.split(',').map(str::trim).collect();
    if f.len() < 15 {
        return Err(SampleError::decode(format!(
            "+CGNSSINFO has {} fields, expected 15 or more",
            f.len()
        )));
    }
    match (f[4].is_empty(), f[6].is_empty()) {
        (true, true) => return Ok(None),
        (false, false) => {}
        _ => return Err(SampleError::decode("+CGNSSINFO has only half a position")),
    }

    let latitude = ddmm_to_degrees(f[4], f[5])?;
    let longitude = ddmm_to_degrees(f[6], f[7])?;
    let satellites = f[1..4]
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u32>())
        .sum::<Result<u32, _>>()
        .map_err(|_| SampleError::decode("bad satellite count"))?;

    Ok(Some(GpsFix {
        fix: true,
        latitude: Some(latitude),
        longitude: Some(longitude),
        altitude_m: optional_number(f[10], "altitude")?,
        speed: optional_number(f[11], "speed")?.map(|kn| kn * KNOTS_TO_KMH),
        unit: SpeedUnit::Kmh,
        heading: optional_number(f[12], "course")?,
        satellites: Some(satellites),
        hdop: optional_number(f[14], "hdop")?,
    }))
}

/// `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere to signed decimal degrees.
fn ddmm_to_degrees(value: &str, hemisphere: &str) -> Result<f64, SampleError> {
    let raw: f64 = value
        .parse()
        .map_err(|_| SampleError::decode(format!("bad coordinate {value:?}")))?;
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    if minutes >= 60.0 {
        return Err(SampleError::decode(format!("bad coordinate {value:?}")));
    }
    let decimal = degrees + minutes / 60.0;
    match hemisphere {
        "N" | "E" => Ok(decimal),
        "S" | "W" => Ok(-decimal),
        other => Err(SampleError::decode(format!("bad hemisphere {other:?}"))),
    }
}

fn optional_number(value: &str, what: &str) -> Result<Option<f64>, SampleError> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| SampleError::decode(format!("bad {what} {value:?}")))
}

fn resolve_unit(requested: SpeedUnit, lat: f64, lon: f64) -> SpeedUnit {
    match requested {
        SpeedUnit::Auto if uses_mph(lat, lon) => SpeedUnit::Mph,
        SpeedUnit::Auto => SpeedUnit::Kmh,
        forced => forced,
    }
}

fn uses_mph(lat: f64, lon: f64) -> bool {
    MPH_REGIONS.iter().any(|&(lat_min, lat_max, lon_min, lon_max)| {
        (lat_min..=lat_max).contains(&lat) && (lon_min..=lon_max).contains(&lon)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::testing::{ScriptedConnector, at_modem};

    const LONDON: &str = "2,09,05,00,5130.1234,N,00007.5678,W,150324,120000.0,45.5,10.0,90.0,0.8,1.2,0.9";

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn parses_a_fix() {
        let fix = parse_cgnssinfo(LONDON).unwrap().unwrap();
        assert!(fix.fix);
        assert!(close(fix.latitude.unwrap(), 51.502_057));
        assert!(close(fix.longitude.unwrap(), -0.126_13));
        assert!(close(fix.speed.unwrap(), 18.52));
        assert_eq!(fix.satellites, Some(14));
        assert_eq!(fix.altitude_m, Some(45.5));
        assert_eq!(fix.heading, Some(90.0));
        assert_eq!(fix.hdop, Some(1.2));
    }

    #[test]
    fn empty_fix_and_garbage() {
        assert_eq!(parse_cgnssinfo(",,,,,,,,,,,,,,,").unwrap(), None);
        assert!(parse_cgnssinfo("2,09,05").is_err());
        let garbled = LONDON.replace("5130.1234", "51x0.1234");
        assert!(parse_cgnssinfo(&garbled).is_err());
        let bad_hemisphere = LONDON.replace(",N,", ",Q,");
        assert!(parse_cgnssinfo(&bad_hemisphere).is_err());
    }

    #[test]
    fn half_a_position_is_a_decode_error() {
        let no_longitude = LONDON.replace("00007.5678", "");
        assert!(matches!(
            parse_cgnssinfo(&no_longitude),
            Err(SampleError::Decode(_))
        ));
        let no_latitude = LONDON.replace("5130.1234", "");
        assert!(matches!(
            parse_cgnssinfo(&no_latitude),
            Err(SampleError::Decode(_))
        ));
    }

    #[test]
    fn unit_follows_position_unless_forced() {
        assert_eq!(resolve_unit(SpeedUnit::Auto, 51.5, -0.12), SpeedUnit::Mph);
        assert_eq!(resolve_unit(SpeedUnit::Auto, 40.7, -74.0), SpeedUnit::Mph);
        assert_eq!(resolve_unit(SpeedUnit::Auto, 48.85, 2.35), SpeedUnit::Kmh);
        assert_eq!(resolve_unit(SpeedUnit::Kmh, 51.5, -0.12), SpeedUnit::Kmh);
    }

    #[tokio::test]
    async fn samples_and_honours_speed_unit_override() {
        let connector = Arc::new(ScriptedConnector::new().device("/dev/ttyUSB1", at_modem));
        let mut gps = GpsSampler::new(connector, ["/dev/ttyUSB1"]);
        gps.connect().await.unwrap();

        let Payload::Gps(fix) = gps.sample().await.unwrap() else {
            panic!("expected a gps payload");
        };
        assert_eq!(fix.unit, SpeedUnit::Mph);
        assert!(close(fix.speed.unwrap(), 18.52 / KMH_PER_MPH));

        gps.apply(&WorkerCommand::SetSpeedUnit(SpeedUnit::Kmh))
            .await
            .unwrap();
        let Payload::Gps(fix) = gps.sample().await.unwrap() else {
            panic!("expected a gps payload");
        };
        assert_eq!(fix.unit, SpeedUnit::Kmh);
        assert!(close(fix.speed.unwrap(), 18.52));

        assert!(matches!(
            gps.apply(&WorkerCommand::ClearDiagnostics).await,
            Err(SampleError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn no_fix_is_a_valid_sample() {
        let connector = Arc::new(ScriptedConnector::new().device("/dev/ttyUSB1", |cmd| match cmd {
            "AT+CGNSSINFO" => Some("\r\n+CGNSSINFO: ,,,,,,,,,,,,,,,\r\n\r\nOK\r\n".into()),
            other => at_modem(other),
        }));
        let mut gps = GpsSampler::new(connector, ["/dev/ttyUSB1"]);
        gps.connect().await.unwrap();
        let Payload::Gps(fix) = gps.sample().await.unwrap() else {
            panic!("expected a gps payload");
        };
        assert_eq!(fix, GpsFix::no_fix(SpeedUnit::Kmh));
    }
}
