//! Scripted in-memory devices for link and sampler tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use super::connector::{Connector, LinkStream};
use crate::error::LinkError;

pub(crate) type Responder = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Host end of a pipe whose device end answers each CR-terminated command
/// with `respond(cmd)`; `None` stays silent. Replies are written in small
/// pieces so the host sees partial reads.
pub(crate) fn scripted<F>(respond: F) -> DuplexStream
where
    F: FnMut(&str) -> Option<String> + Send + 'static,
{
    scripted_with_hangup(respond, None)
}

fn scripted_with_hangup<F>(mut respond: F, hangups: Option<Arc<AtomicUsize>>) -> DuplexStream
where
    F: FnMut(&str) -> Option<String> + Send + 'static,
{
    let (host, mut device) = tokio::io::duplex(4096);
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 128];
        'outer: loop {
            let n = match device.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);
            while let Some(pos) = buf.iter().position(|b| *b == b'\r') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                let cmd = String::from_utf8_lossy(&line[..line.len() - 1])
                    .trim()
                    .to_string();
                let Some(reply) = respond(&cmd) else { continue };
                for piece in reply.as_bytes().chunks(8) {
                    if device.write_all(piece).await.is_err() {
                        break 'outer;
                    }
                    tokio::task::yield_now().await;
                }
            }
        }
        if let Some(h) = hangups {
            h.fetch_add(1, Ordering::SeqCst);
        }
    });
    host
}

/// A SIM7600-like modem with GNSS.
pub(crate) fn at_modem(cmd: &str) -> Option<String> {
    let body = match cmd {
        "AT" | "ATE0" | "AT+CGPS=1" => "",
        "AT+CSQ" => "+CSQ: 20,99\r\n",
        "AT+COPS?" => "+COPS: 0,0,\"EE EE\",7\r\n",
        "AT+CREG?" => "+CREG: 0,1\r\n",
        "AT+CPSI?" => "+CPSI: LTE,Online,234-30,0x1234,12345678,123,EUTRAN-BAND3,1617,5,5,-94,-1020,-710,15\r\n",
        "AT+CGNSSINFO" => {
            "+CGNSSINFO: 2,09,05,00,5130.1234,N,00007.5678,W,150324,120000.0,45.5,10.0,90.0,0.8,1.2,0.9\r\n"
        }
        _ => return Some(format!("{cmd}\r\r\nERROR\r\n")),
    };
    Some(format!("{cmd}\r\r\n{body}\r\nOK\r\n"))
}

/// Connector backed by scripted devices keyed by address.
pub(crate) struct ScriptedConnector {
    devices: Mutex<HashMap<String, Responder>>,
    opened: Mutex<Vec<String>>,
    hangups: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub(crate) fn new() -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            opened: Mutex::new(Vec::new()),
            hangups: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn device<F>(self, address: &str, respond: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.devices
            .lock()
            .unwrap()
            .insert(address.to_string(), Arc::new(respond));
        self
    }

    /// Opens fine but never answers.
    pub(crate) fn silent(self, address: &str) -> Self {
        self.device(address, |_| None)
    }

    pub(crate) fn unplug(&self, address: &str) {
        self.devices.lock().unwrap().remove(address);
    }

    /// Addresses successfully opened, in order.
    pub(crate) fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    /// How many opened streams have been released by the host.
    pub(crate) fn hangups(&self) -> usize {
        self.hangups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self, address: &str) -> Result<Box<dyn LinkStream>, LinkError> {
        let responder = self.devices.lock().unwrap().get(address).cloned();
        let Some(responder) = responder else {
            return Err(LinkError::Unavailable {
                address: address.to_string(),
                reason: "no such device".into(),
            });
        };
        self.opened.lock().unwrap().push(address.to_string());
        let stream = scripted_with_hangup(
            move |cmd| responder(cmd),
            Some(Arc::clone(&self.hangups)),
        );
        Ok(Box::new(stream))
    }
}
