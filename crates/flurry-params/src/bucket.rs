//! UTC time buckets.
//!
//! Listeners in the same bucket derive the same seed. Buckets are formatted
//! so that lexicographic order equals chronological order.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ParamError, ParamResult};

/// Bucket width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketGranularity {
    /// `YYYY-MM-DDTHH`
    #[default]
    Hour,
    /// `YYYY-MM-DD`
    Day,
}

impl BucketGranularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketGranularity::Hour => "hour",
            BucketGranularity::Day => "day",
        }
    }
}

impl FromStr for BucketGranularity {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" => Ok(BucketGranularity::Hour),
            "day" => Ok(BucketGranularity::Day),
            other => Err(ParamError::InvalidGranularity(other.to_string())),
        }
    }
}

/// A UTC time window identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeBucket(String);

impl TimeBucket {
    /// Truncates `at` to the given granularity.
    pub fn from_datetime(at: DateTime<Utc>, granularity: BucketGranularity) -> Self {
        let formatted = match granularity {
            BucketGranularity::Hour => at.format("%Y-%m-%dT%H"),
            BucketGranularity::Day => at.format("%Y-%m-%d"),
        };
        Self(formatted.to_string())
    }

    /// The bucket containing the current wall-clock time.
    pub fn now(granularity: BucketGranularity) -> Self {
        Self::from_datetime(Utc::now(), granularity)
    }

    /// Parses a bucket string in either granularity.
    pub fn parse(s: &str) -> ParamResult<Self> {
        let s = s.trim();
        let invalid = |message: &str| ParamError::InvalidBucket {
            bucket: s.to_string(),
            message: message.to_string(),
        };
        if s.is_empty() {
            return Err(invalid("bucket must not be empty"));
        }

        let (date, hour) = match s.split_once('T') {
            Some((date, hour)) => (date, Some(hour)),
            None => (s, None),
        };
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| invalid("expected YYYY-MM-DD date"))?;
        if date.len() != 10 {
            return Err(invalid("expected zero-padded YYYY-MM-DD date"));
        }
        if let Some(hour) = hour {
            let valid = hour.len() == 2 && hour.parse::<u32>().map(|h| h < 24).unwrap_or(false);
            if !valid {
                return Err(invalid("expected two-digit hour 00-23"));
            }
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Granularity inferred from the bucket format.
    pub fn granularity(&self) -> BucketGranularity {
        if self.0.contains('T') {
            BucketGranularity::Hour
        } else {
            BucketGranularity::Day
        }
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TimeBucket {
    type Error = ParamError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TimeBucket> for String {
    fn from(bucket: TimeBucket) -> Self {
        bucket.0
    }
}
