//! Source-inventory records.
//!
//! The caller feeds flat per-device records in; conversion into [`Point`]
//! and [`Sample`] happens here, including the zone-aware timestamp parse.

use crate::model::{Point, Sample, TagValue};
use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A flat point record from the source inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePoint {
    /// Hierarchical name, `site/equipment/leaf`
    pub name: String,
    /// Source-side point type
    pub point_type: String,
    /// Boolean-presence tags
    #[serde(default)]
    pub marker_tags: Vec<String>,
    /// Valued tags
    #[serde(default)]
    pub kv_tags: BTreeMap<String, TagValue>,
}

impl From<SourcePoint> for Point {
    fn from(source: SourcePoint) -> Self {
        Point {
            dis: source.name.clone(),
            name: source.name,
            marker_tags: source.marker_tags.into_iter().collect::<BTreeSet<_>>(),
            kv_tags: source.kv_tags,
            id: None,
        }
    }
}

/// A flat sample record from the source inventory.
///
/// `time` is an RFC 3339 instant and must carry a UTC offset; `tz` names
/// the IANA zone the store should record the sample in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSample {
    /// Name of the point this sample belongs to
    pub name: String,
    /// RFC 3339 timestamp, offset required
    pub time: String,
    /// Observed value
    pub value: f64,
    /// IANA zone name, defaults to UTC
    #[serde(default)]
    pub tz: Option<String>,
}

impl SourceSample {
    /// Parse the record's timestamp into the requested zone.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::NaiveTimestamp`] when `time` carries no UTC
    /// offset, or [`SampleError::UnknownZone`] when `tz` is not an IANA
    /// zone name.
    pub fn zoned_time(&self) -> Result<DateTime<Tz>, SampleError> {
        let parsed =
            DateTime::parse_from_rfc3339(&self.time).map_err(|_| SampleError::NaiveTimestamp {
                name: self.name.clone(),
                time: self.time.clone(),
            })?;

        let zone_name = self.tz.as_deref().unwrap_or("UTC");
        let zone: Tz = zone_name.parse().map_err(|_| SampleError::UnknownZone {
            name: self.name.clone(),
            zone: zone_name.to_string(),
        })?;

        Ok(parsed.with_timezone(&zone))
    }

    /// Bind this sample to its point's remote entity id.
    ///
    /// # Errors
    ///
    /// Propagates timestamp parsing failures from [`Self::zoned_time`].
    pub fn bind(&self, entity_id: &str) -> Result<Sample, SampleError> {
        Ok(Sample {
            id: entity_id.to_string(),
            ref_name: self.name.clone(),
            time: self.zoned_time()?,
            value: self.value,
        })
    }
}

/// Errors from source-sample conversion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SampleError {
    /// The timestamp carries no UTC offset or is not RFC 3339
    #[error("sample for {name:?} has a non-RFC 3339 or naive timestamp: {time:?}")]
    NaiveTimestamp {
        /// Point name the sample belongs to
        name: String,
        /// The offending timestamp text
        time: String,
    },
    /// The zone name is not a known IANA zone
    #[error("sample for {name:?} names unknown time zone {zone:?}")]
    UnknownZone {
        /// Point name the sample belongs to
        name: String,
        /// The offending zone name
        zone: String,
    },
}
