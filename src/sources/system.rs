//! Host health: CPU temperature and load, memory, root filesystem, uptime.

use std::ffi::CString;
use std::io;
use std::mem::MaybeUninit;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::sysfs::{read_optional, read_required};
use crate::error::{LinkError, SampleError};
use crate::store::{Payload, SpaceUsage, SystemStatus, Topic};
use crate::workers::Sampler;

const THERMAL_ZONE: &str = "sys/class/thermal/thermal_zone0/temp";
const LOADAVG: &str = "proc/loadavg";
const MEMINFO: &str = "proc/meminfo";
const UPTIME: &str = "proc/uptime";

const MIB: u64 = 1024 * 1024;

/// Samples `/proc`, the first thermal zone and `statvfs` of one mount point.
pub struct SystemSampler {
    root: PathBuf,
    disk: PathBuf,
    cores: usize,
}

impl SystemSampler {
    /// Reports the filesystem mounted at `/`.
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/"),
            disk: PathBuf::from("/"),
            cores: std::thread::available_parallelism().map_or(1, usize::from),
        }
    }

    /// Reads `proc/` and `sys/` under `root` instead of `/`.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Reports the filesystem holding `path`.
    pub fn with_disk(mut self, path: impl Into<PathBuf>) -> Self {
        self.disk = path.into();
        self
    }

    async fn cpu_temp(&self) -> Result<Option<f64>, SampleError> {
        let Some(raw) = read_optional(&self.root.join(THERMAL_ZONE)).await? else {
            return Ok(None);
        };
        let milli: i64 = raw
            .parse()
            .map_err(|_| SampleError::decode(format!("bad thermal zone reading {raw:?}")))?;
        Ok(Some(round1(milli as f64 / 1000.0)))
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sampler for SystemSampler {
    fn topic(&self) -> Topic {
        Topic::System
    }

    async fn sample(&mut self) -> Result<Payload, SampleError> {
        let load_average = parse_loadavg(&read_required(&self.root.join(LOADAVG)).await?)?;
        let memory = parse_meminfo(&read_required(&self.root.join(MEMINFO)).await?)?;
        let uptime_s = parse_uptime(&read_required(&self.root.join(UPTIME)).await?)?;
        let cpu_temp_c = self.cpu_temp().await?;
        let disk = disk_usage(&self.disk)?;

        Ok(Payload::System(SystemStatus {
            cpu_temp_c,
            cpu_load_percent: round1(load_average[0] / self.cores.max(1) as f64 * 100.0),
            load_average,
            memory,
            disk,
            uptime_s,
        }))
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// First three fields of `/proc/loadavg`.
fn parse_loadavg(raw: &str) -> Result<[f64; 3], SampleError> {
    let mut fields = raw.split_whitespace().map(str::parse::<f64>);
    let mut load = [0.0; 3];
    for slot in &mut load {
        *slot = match fields.next() {
            Some(Ok(v)) => v,
            _ => return Err(SampleError::decode(format!("bad loadavg {raw:?}"))),
        };
    }
    Ok(load)
}

/// `MemTotal` and `MemAvailable` of `/proc/meminfo`.
fn parse_meminfo(raw: &str) -> Result<SpaceUsage, SampleError> {
    let field = |key: &str| -> Result<u64, SampleError> {
        raw.lines()
            .find_map(|l| l.strip_prefix(key)?.strip_prefix(':'))
            .and_then(|rest| rest.split_whitespace().next()?.parse::<u64>().ok())
            .ok_or_else(|| SampleError::decode(format!("meminfo lacks {key}")))
    };
    let total_kb = field("MemTotal")?;
    let available_kb = field("MemAvailable")?;
    Ok(SpaceUsage::from_total_free(total_kb / 1024, available_kb / 1024))
}

/// Whole seconds from the first field of `/proc/uptime`.
fn parse_uptime(raw: &str) -> Result<u64, SampleError> {
    raw.split_whitespace()
        .next()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|s| *s >= 0.0)
        .map(|s| s as u64)
        .ok_or_else(|| SampleError::decode(format!("bad uptime {raw:?}")))
}

fn disk_usage(path: &Path) -> Result<SpaceUsage, SampleError> {
    let unavailable = |reason: String| LinkError::Unavailable {
        address: path.display().to_string(),
        reason,
    };
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| unavailable("path contains a NUL byte".into()))?;

    let mut st = MaybeUninit::<libc::statvfs>::uninit();
    // SAFETY: `c_path` is NUL-terminated and `st` is a valid out pointer.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), st.as_mut_ptr()) };
    if rc != 0 {
        return Err(unavailable(io::Error::last_os_error().to_string()).into());
    }
    // SAFETY: statvfs returned 0, so it filled `st`.
    let st = unsafe { st.assume_init() };

    let frsize = st.f_frsize as u64;
    let total = st.f_blocks as u64 * frsize / MIB;
    let free = st.f_bavail as u64 * frsize / MIB;
    Ok(SpaceUsage::from_total_free(total, free))
}
