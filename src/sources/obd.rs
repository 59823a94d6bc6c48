//! Vehicle diagnostics through an ELM327 adapter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::link_slot::LinkSlot;
use crate::error::SampleError;
use crate::link::{Connector, LineProtocol};
use crate::store::{ObdSnapshot, Payload, Topic};
use crate::workers::{Sampler, WorkerCommand};

/// Reset, echo off, linefeeds off, automatic protocol.
const INIT: [&str; 4] = ["ATZ", "ATE0", "ATL0", "ATSP0"];

const PID_RPM: &str = "010C";
const PID_SPEED: &str = "010D";
const PID_COOLANT: &str = "0105";
const READ_DTC: &str = "03";
const CLEAR_DTC: &str = "04";

/// Trouble codes change rarely; re-read them every this many samples.
const DTC_EVERY: u32 = 10;

/// Samples engine rpm, vehicle speed, coolant temperature and stored
/// trouble codes.
///
/// A PID the vehicle does not answer reads as `None`; a PID that answers
/// with garbage fails the whole sample. Trouble codes are read on the first
/// sample after connecting, every [`DTC_EVERY`] samples, and right after
/// they are cleared.
pub struct ObdSampler {
    link: LinkSlot,
    dtc: Vec<String>,
    /// Samples until the next mode 03 read; zero means due.
    dtc_countdown: u32,
}

impl ObdSampler {
    pub fn new<I, S>(connector: Arc<dyn Connector>, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut link = LinkSlot::new(connector, candidates, LineProtocol::ELM327);
        // ECUs are slow to answer the first query after ATSP0.
        link.set_timeout(Duration::from_secs(5));
        Self {
            link,
            dtc: Vec::new(),
            dtc_countdown: 0,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.link.set_timeout(timeout);
        self
    }

    /// Data bytes of a mode 01 reply, or `None` when the vehicle is silent.
    async fn query(&mut self, pid: &str) -> Result<Option<Vec<u8>>, SampleError> {
        match self.link.send_optional(pid).await? {
            Some(lines) => decode_pid_reply(pid, &lines).map(Some),
            None => Ok(None),
        }
    }

    /// Reads stored trouble codes; a silent vehicle has none.
    async fn read_dtcs(&mut self) -> Result<Vec<String>, SampleError> {
        match self.link.send_optional(READ_DTC).await? {
            Some(lines) => decode_dtc_reply(&lines),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl Sampler for ObdSampler {
    fn topic(&self) -> Topic {
        Topic::Obd
    }

    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    async fn connect(&mut self) -> Result<(), SampleError> {
        self.link.connect().await?;
        for cmd in INIT {
            self.link.send(cmd).await?;
        }
        self.dtc_countdown = 0;
        Ok(())
    }

    async fn sample(&mut self) -> Result<Payload, SampleError> {
        let rpm = match self.query(PID_RPM).await? {
            Some(d) => {
                let [a, b] = take::<2>(&d, PID_RPM)?;
                Some(f64::from(u16::from(a) * 256 + u16::from(b)) / 4.0)
            }
            None => None,
        };
        let speed_kmh = match self.query(PID_SPEED).await? {
            Some(d) => Some(u32::from(take::<1>(&d, PID_SPEED)?[0])),
            None => None,
        };
        let coolant_c = match self.query(PID_COOLANT).await? {
            Some(d) => Some(i32::from(take::<1>(&d, PID_COOLANT)?[0]) - 40),
            None => None,
        };
        if self.dtc_countdown == 0 {
            self.dtc = self.read_dtcs().await?;
            self.dtc_countdown = DTC_EVERY;
        }
        self.dtc_countdown -= 1;

        Ok(Payload::Obd(ObdSnapshot {
            port: self.link.address().map(str::to_owned),
            rpm,
            speed_kmh,
            coolant_c,
            dtc: self.dtc.clone(),
        }))
    }

    async fn apply(&mut self, command: &WorkerCommand) -> Result<(), SampleError> {
        match command {
            WorkerCommand::ClearDiagnostics => {
                if !self.link.is_connected() {
                    self.connect().await?;
                }
                self.link.send(CLEAR_DTC).await?;
                self.dtc = self.read_dtcs().await?;
                self.dtc_countdown = DTC_EVERY;
                info!(remaining = self.dtc.len(), "diagnostic trouble codes cleared");
                Ok(())
            }
            other => Err(SampleError::Unsupported(other.to_string())),
        }
    }

    async fn disconnect(&mut self) {
        self.link.disconnect().await;
    }
}

/// Finds the `41 <pid>` line and returns the data bytes after it.
///
/// Accepts replies with or without spaces and skips chatter such as
/// `SEARCHING...`.
fn decode_pid_reply(pid: &str, lines: &[String]) -> Result<Vec<u8>, SampleError> {
    let header = format!("41{}", &pid[2..]);
    for line in lines {
        let hex: String = line.chars().filter(|c| !c.is_whitespace()).collect();
        let Some(data) = hex.strip_prefix(header.as_str()) else {
            continue;
        };
        if data.len() % 2 != 0 {
            return Err(SampleError::decode(format!("odd-length reply to {pid}: {line:?}")));
        }
        return (0..data.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&data[i..i + 2], 16))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|_| SampleError::decode(format!("non-hex reply to {pid}: {line:?}")));
    }
    Err(SampleError::decode(format!("no reply to {pid} in {lines:?}")))
}

/// Decodes every `43 ...` line of a mode 03 reply into codes like `P0133`.
///
/// Each code is two bytes: the top two bits pick the system (P, C, B, U),
/// the rest are four hex digits. `00 00` pairs are padding.
fn decode_dtc_reply(lines: &[String]) -> Result<Vec<String>, SampleError> {
    let mut codes = Vec::new();
    for line in lines {
        let hex: String = line.chars().filter(|c| !c.is_whitespace()).collect();
        let Some(data) = hex.strip_prefix("43") else {
            continue;
        };
        if data.len() % 2 != 0 {
            return Err(SampleError::decode(format!("odd-length reply to 03: {line:?}")));
        }
        let bytes = (0..data.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&data[i..i + 2], 16))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|_| SampleError::decode(format!("non-hex reply to 03: {line:?}")))?;
        for pair in bytes.chunks_exact(2) {
            let (a, b) = (pair[0], pair[1]);
            if a == 0 && b == 0 {
                continue;
            }
            let system = ['P', 'C', 'B', 'U'][usize::from(a >> 6)];
            codes.push(format!("{system}{:02X}{b:02X}", a & 0x3F));
        }
    }
    Ok(codes)
}

/// First `N` data bytes of a reply.
fn take<const N: usize>(data: &[u8], pid: &str) -> Result<[u8; N], SampleError> {
    data.get(..N)
        .and_then(|d| <[u8; N]>::try_from(d).ok())
        .ok_or_else(|| {
            SampleError::decode(format!("{pid} returned {} bytes, expected {N}", data.len()))
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::link::testing::ScriptedConnector;

    fn elm(cmd: &str) -> Option<String> {
        let body = match cmd {
            "ATZ" => "\r\rELM327 v1.5\r\r",
            "ATI" => "ELM327 v1.5\r\r",
            "ATE0" | "ATL0" | "ATSP0" => "OK\r\r",
            "010C" => "SEARCHING...\r41 0C 1A F8\r\r",
            "010D" => "41 0D 3C\r\r",
            "0105" => "NO DATA\r\r",
            "03" => "NO DATA\r\r",
            "04" => "44\r\r",
            _ => "?\r\r",
        };
        Some(format!("{body}>"))
    }

    #[test]
    fn pid_replies_decode_with_or_without_spaces() {
        let lines = vec!["SEARCHING...".to_string(), "41 0C 1A F8".to_string()];
        assert_eq!(decode_pid_reply("010C", &lines).unwrap(), vec![0x1A, 0xF8]);
        assert_eq!(
            decode_pid_reply("010D", &["410D3C".to_string()]).unwrap(),
            vec![0x3C]
        );
        assert!(decode_pid_reply("010D", &["41 0D 3".to_string()]).is_err());
        assert!(decode_pid_reply("010D", &["41 0D ZZ".to_string()]).is_err());
        assert!(decode_pid_reply("010D", &["41 0C 1A F8".to_string()]).is_err());
    }

    #[tokio::test]
    async fn silent_pid_reads_as_none() {
        let connector = Arc::new(ScriptedConnector::new().device("/dev/rfcomm0", elm));
        let mut obd = ObdSampler::new(connector, ["/dev/rfcomm0"]);
        obd.connect().await.unwrap();

        let Payload::Obd(snap) = obd.sample().await.unwrap() else {
            panic!("expected an obd payload");
        };
        assert_eq!(
            snap,
            ObdSnapshot {
                port: Some("/dev/rfcomm0".into()),
                rpm: Some(1726.0),
                speed_kmh: Some(60),
                coolant_c: None,
                dtc: Vec::new(),
            }
        );
    }

    #[test]
    fn trouble_codes_decode_by_system() {
        let lines = vec!["43 01 33 C1 00 00 00".to_string(), "4382 17".to_string()];
        assert_eq!(decode_dtc_reply(&lines).unwrap(), vec!["P0133", "U0100", "B0217"]);
        assert!(decode_dtc_reply(&["SEARCHING...".to_string()]).unwrap().is_empty());
        assert!(decode_dtc_reply(&["43 01 3".to_string()]).is_err());
        assert!(decode_dtc_reply(&["43 0G 33".to_string()]).is_err());
    }

    #[tokio::test]
    async fn cleared_codes_disappear_from_the_next_snapshot() {
        let cleared = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cleared);
        let connector = Arc::new(ScriptedConnector::new().device("/dev/rfcomm0", move |cmd| {
            match cmd {
                "03" if !flag.load(Ordering::SeqCst) => Some("43 01 33 01 71\r\r>".into()),
                "04" => {
                    flag.store(true, Ordering::SeqCst);
                    elm(cmd)
                }
                other => elm(other),
            }
        }));
        let mut obd = ObdSampler::new(connector, ["/dev/rfcomm0"]);
        obd.connect().await.unwrap();

        let Payload::Obd(before) = obd.sample().await.unwrap() else {
            panic!("expected an obd payload");
        };
        assert_eq!(before.dtc, vec!["P0133", "P0171"]);

        obd.apply(&WorkerCommand::ClearDiagnostics).await.unwrap();
        let Payload::Obd(after) = obd.sample().await.unwrap() else {
            panic!("expected an obd payload");
        };
        assert!(after.dtc.is_empty());
    }

    #[tokio::test]
    async fn clear_diagnostics_sends_mode_04() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&sent);
        let connector = Arc::new(ScriptedConnector::new().device("/dev/rfcomm0", move |cmd| {
            log.lock().unwrap().push(cmd.to_string());
            elm(cmd)
        }));
        let mut obd = ObdSampler::new(connector, ["/dev/rfcomm0"]);

        obd.apply(&WorkerCommand::ClearDiagnostics).await.unwrap();
        let sent = sent.lock().unwrap().clone();
        assert_eq!(&sent[sent.len() - 2..], ["04", "03"]);
        assert!(matches!(
            obd.apply(&WorkerCommand::SetPower(true)).await,
            Err(SampleError::Unsupported(_))
        ));
    }
}
