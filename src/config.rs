use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RaftError, Result};

/// Inclusive bounds for a randomized timeout class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutRange {
    #[serde(with = "duration_input")]
    pub min: Duration,
    #[serde(with = "duration_input")]
    pub max: Duration,
}

impl TimeoutRange {
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub const fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min: Duration::from_millis(min_ms),
            max: Duration::from_millis(max_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Stable node identity. Defaults to a generated UUID v4.
    pub name: String,
    /// Election timeout bounds (follower watchdog promotion, candidate re-election).
    pub election: TimeoutRange,
    /// Heartbeat timeout bounds (leader cadence, follower watchdog).
    pub heartbeat: TimeoutRange,
    /// Proximity threshold in [0, 1], reserved for RTT warnings.
    pub threshold: f64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: Uuid::new_v4().to_string(),
            election: TimeoutRange::from_millis(150, 300),
            heartbeat: TimeoutRange::from_millis(50, 70),
            threshold: 0.8,
        }
    }
}

impl NodeConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_election(mut self, min: Duration, max: Duration) -> Self {
        self.election = TimeoutRange::new(min, max);
        self
    }

    pub fn with_heartbeat(mut self, min: Duration, max: Duration) -> Self {
        self.heartbeat = TimeoutRange::new(min, max);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(RaftError::InvalidConfig("node name is empty".into()));
        }
        for (label, range) in [("election", &self.election), ("heartbeat", &self.heartbeat)] {
            if range.min.is_zero() {
                return Err(RaftError::InvalidConfig(format!(
                    "{label} minimum timeout is zero"
                )));
            }
            if range.min > range.max {
                return Err(RaftError::InvalidConfig(format!(
                    "{label} timeout bounds are inverted ({:?} > {:?})",
                    range.min, range.max
                )));
            }
        }
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(RaftError::InvalidConfig(format!(
                "threshold {} is outside [0, 1]",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// Parse a duration given either as bare integer milliseconds ("150") or as a
/// human-readable string ("150 ms", "2s"). Negative values are rejected.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(RaftError::InvalidDuration("empty input".into()));
    }
    if let Ok(ms) = trimmed.parse::<i64>() {
        let ms = u64::try_from(ms)
            .map_err(|_| RaftError::InvalidDuration(format!("{trimmed} is negative")))?;
        return Ok(Duration::from_millis(ms));
    }
    // humantime wants "150ms"; accept "150 ms" as well.
    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    humantime::parse_duration(&compact)
        .map_err(|e| RaftError::InvalidDuration(format!("{trimmed}: {e}")))
}

/// Serde helper accepting duration fields as integer milliseconds or as a
/// human-readable string.
mod duration_input {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
            Raw::Text(text) => super::parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }
}
