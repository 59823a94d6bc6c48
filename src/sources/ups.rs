//! Battery backup read from the kernel power-supply class.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::sysfs::{read_optional, read_required};
use crate::error::SampleError;
use crate::store::{Payload, Topic, UpsStatus};
use crate::workers::Sampler;

/// Samples `capacity`, `voltage_now` and `status` of one battery directory,
/// e.g. `/sys/class/power_supply/BAT0`.
pub struct UpsSampler {
    dir: PathBuf,
}

impl UpsSampler {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, SampleError> {
        read_optional(&self.dir.join(name)).await
    }

    async fn required(&self, name: &str) -> Result<String, SampleError> {
        read_required(&self.dir.join(name)).await
    }
}

#[async_trait]
impl Sampler for UpsSampler {
    fn topic(&self) -> Topic {
        Topic::Ups
    }

    async fn sample(&mut self) -> Result<Payload, SampleError> {
        let capacity = self.required("capacity").await?;
        let percent: u8 = capacity
            .parse()
            .map_err(|_| SampleError::decode(format!("bad capacity {capacity:?}")))?;
        if percent > 100 {
            return Err(SampleError::decode(format!("capacity out of range: {percent}")));
        }

        // Microvolts.
        let voltage = match self.attribute("voltage_now").await? {
            Some(raw) => Some(
                raw.parse::<f64>()
                    .map_err(|_| SampleError::decode(format!("bad voltage_now {raw:?}")))?
                    / 1_000_000.0,
            ),
            None => None,
        };

        let state = self.required("status").await?;
        Ok(Payload::Ups(UpsStatus {
            percent,
            voltage,
            charging: state == "Charging",
            on_battery: state == "Discharging",
            state,
        }))
    }
}
