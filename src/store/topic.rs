//! # Topic identifiers.
//!
//! A [`Topic`] names one telemetry source. The set is closed: workers are
//! registered under one of these variants and the router keys subscriptions
//! by them, so a misspelled topic is a compile error rather than a silent
//! empty stream.
//!
//! ```rust
//! use telehub::Topic;
//!
//! let t: Topic = "modem".parse().unwrap();
//! assert_eq!(t, Topic::Modem);
//! assert_eq!(t.to_string(), "modem");
//! assert!("fan".parse::<Topic>().is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable identifier of one telemetry source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Gps,
    Modem,
    Obd,
    Ups,
    Network,
    Bluetooth,
    System,
}

impl Topic {
    /// Every topic, in display order.
    pub const ALL: [Topic; 7] = [
        Topic::Gps,
        Topic::Modem,
        Topic::Obd,
        Topic::Ups,
        Topic::Network,
        Topic::Bluetooth,
        Topic::System,
    ];

    /// Lowercase wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Topic::Gps => "gps",
            Topic::Modem => "modem",
            Topic::Obd => "obd",
            Topic::Ups => "ups",
            Topic::Network => "network",
            Topic::Bluetooth => "bluetooth",
            Topic::System => "system",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a name that is not a known topic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown topic '{0}'")]
pub struct ParseTopicError(pub String);

impl FromStr for Topic {
    type Err = ParseTopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseTopicError(s.to_string()))
    }
}
