//! Cellular modem over the AT command set.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::link_slot::{LinkSlot, reply_field};
use crate::error::SampleError;
use crate::link::{Connector, LineProtocol};
use crate::store::{ModemStatus, Payload, Registration, Topic};
use crate::workers::Sampler;

/// Samples signal, operator, registration and access technology.
pub struct ModemSampler {
    link: LinkSlot,
}

impl ModemSampler {
    pub fn new<I, S>(connector: Arc<dyn Connector>, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            link: LinkSlot::new(connector, candidates, LineProtocol::AT),
        }
    }

    /// Bound for each AT exchange.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.link.set_timeout(timeout);
        self
    }
}

#[async_trait]
impl Sampler for ModemSampler {
    fn topic(&self) -> Topic {
        Topic::Modem
    }

    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    async fn connect(&mut self) -> Result<(), SampleError> {
        self.link.connect().await?;
        self.link.send("ATE0").await?;
        Ok(())
    }

    async fn sample(&mut self) -> Result<Payload, SampleError> {
        let rssi_dbm = parse_csq(&self.link.send("AT+CSQ").await?)?;
        let operator = parse_cops(&self.link.send("AT+COPS?").await?)?;
        let registration = parse_creg(&self.link.send("AT+CREG?").await?)?;
        let network_mode = match self.link.send_optional("AT+CPSI?").await? {
            Some(lines) => parse_cpsi(&lines),
            None => None,
        };

        Ok(Payload::Modem(ModemStatus {
            port: self.link.address().map(str::to_owned),
            operator,
            registration,
            network_mode,
            rssi_dbm,
        }))
    }

    async fn disconnect(&mut self) {
        self.link.disconnect().await;
    }
}

/// `+CSQ: <rssi>,<ber>`: 0..=31 maps to -113..-51 dBm, 99 is unknown.
fn parse_csq(lines: &[String]) -> Result<Option<i32>, SampleError> {
    let body = reply_field(lines, "+CSQ:").ok_or_else(|| SampleError::decode("missing +CSQ"))?;
    let raw = body.split(',').next().unwrap_or_default().trim();
    let csq: i32 = raw
        .parse()
        .map_err(|_| SampleError::decode(format!("bad +CSQ value {raw:?}")))?;
    match csq {
        99 => Ok(None),
        0..=31 => Ok(Some(-113 + 2 * csq)),
        other => Err(SampleError::decode(format!("+CSQ out of range: {other}"))),
    }
}

/// `+COPS: <mode>[,<format>,"<name>"[,<act>]]`; some modems repeat the name.
fn parse_cops(lines: &[String]) -> Result<Option<String>, SampleError> {
    let body = reply_field(lines, "+COPS:").ok_or_else(|| SampleError::decode("missing +COPS"))?;
    let Some(start) = body.find('"') else {
        return Ok(None);
    };
    let rest = &body[start + 1..];
    let end = rest
        .find('"')
        .ok_or_else(|| SampleError::decode("unterminated +COPS operator"))?;
    let name = rest[..end].trim();

    let words: Vec<&str> = name.split_whitespace().collect();
    let name = match words.as_slice() {
        [a, b] if a == b => (*a).to_string(),
        _ => name.to_string(),
    };
    Ok((!name.is_empty()).then_some(name))
}

/// `+CREG: <n>,<stat>[,...]`.
fn parse_creg(lines: &[String]) -> Result<Registration, SampleError> {
    let body = reply_field(lines, "+CREG:").ok_or_else(|| SampleError::decode("missing +CREG"))?;
    let stat = body
        .split(',')
        .nth(1)
        .map(str::trim)
        .ok_or_else(|| SampleError::decode(format!("short +CREG reply {body:?}")))?;
    let code: u8 = stat
        .parse()
        .map_err(|_| SampleError::decode(format!("bad +CREG stat {stat:?}")))?;
    Ok(Registration::from_code(code))
}

/// `+CPSI: <system mode>,...` reduced to a generation label.
fn parse_cpsi(lines: &[String]) -> Option<String> {
    let mode = reply_field(lines, "+CPSI:")?.split(',').next()?.trim();
    let label = if mode.contains("LTE") {
        "4G"
    } else if mode.contains("NR") || mode.contains("5G") {
        "5G"
    } else if mode.contains("WCDMA") {
        "3G"
    } else if mode.contains("GSM") {
        "2G"
    } else {
        return None;
    };
    Some(label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::testing::{ScriptedConnector, at_modem};

    fn lines(s: &[&str]) -> Vec<String> {
        s.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn csq_maps_to_dbm() {
        assert_eq!(parse_csq(&lines(&["+CSQ: 20,99"])).unwrap(), Some(-73));
        assert_eq!(parse_csq(&lines(&["+CSQ: 99,99"])).unwrap(), None);
        assert!(parse_csq(&lines(&["+CSQ: 45,0"])).is_err());
        assert!(parse_csq(&lines(&["+CSQ: ,"])).is_err());
        assert!(parse_csq(&lines(&[])).is_err());
    }

    #[test]
    fn operator_is_unquoted_and_deduplicated() {
        assert_eq!(
            parse_cops(&lines(&["+COPS: 0,0,\"LycaMobile LycaMobile\",7"])).unwrap(),
            Some("LycaMobile".into())
        );
        assert_eq!(
            parse_cops(&lines(&["+COPS: 0,0,\"Vodafone UK\",7"])).unwrap(),
            Some("Vodafone UK".into())
        );
        assert_eq!(parse_cops(&lines(&["+COPS: 0"])).unwrap(), None);
    }

    #[test]
    fn registration_and_generation() {
        assert_eq!(parse_creg(&lines(&["+CREG: 0,5"])).unwrap(), Registration::Roaming);
        assert!(parse_creg(&lines(&["+CREG: 0"])).is_err());
        assert_eq!(parse_cpsi(&lines(&["+CPSI: WCDMA,Online"])), Some("3G".into()));
        assert_eq!(parse_cpsi(&lines(&["+CPSI: NO SERVICE,Online"])), None);
    }

    #[tokio::test(start_paused = true)]
    async fn samples_a_scripted_modem() {
        let connector = Arc::new(
            ScriptedConnector::new()
                .silent("/dev/ttyUSB1")
                .device("/dev/ttyUSB2", at_modem),
        );
        let mut modem = ModemSampler::new(connector.clone(), ["/dev/ttyUSB1", "/dev/ttyUSB2"])
            .with_timeout(Duration::from_millis(500));

        assert!(!modem.is_connected());
        modem.connect().await.unwrap();
        let Payload::Modem(status) = modem.sample().await.unwrap() else {
            panic!("expected a modem payload");
        };
        assert_eq!(
            status,
            ModemStatus {
                port: Some("/dev/ttyUSB2".into()),
                operator: Some("EE".into()),
                registration: Registration::Home,
                network_mode: Some("4G".into()),
                rssi_dbm: Some(-73),
            }
        );

        modem.disconnect().await;
        assert!(!modem.is_connected());
    }

    #[tokio::test]
    async fn rejected_access_technology_is_unknown() {
        let connector = Arc::new(ScriptedConnector::new().device("/dev/ttyUSB2", |cmd| match cmd {
            "AT+CPSI?" => Some("\r\nERROR\r\n".into()),
            other => at_modem(other),
        }));
        let mut modem = ModemSampler::new(connector, ["/dev/ttyUSB2"]);
        modem.connect().await.unwrap();
        let Payload::Modem(status) = modem.sample().await.unwrap() else {
            panic!("expected a modem payload");
        };
        assert_eq!(status.network_mode, None);
        assert!(modem.is_connected());
    }
}
