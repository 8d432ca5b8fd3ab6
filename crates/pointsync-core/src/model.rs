//! Entity types exchanged with the remote store.
//!
//! `Point` is the only long-lived carrier of resolved identity: sites and
//! equipment are transient value objects decoded from commit responses and
//! discarded once their ids have been copied into point tag maps.

use crate::path::{PathError, PointPath};
use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Tag key holding a point's site reference.
pub const SITE_REF_TAG: &str = "haystack_siteRef";
/// Tag key holding a point's equipment reference.
pub const EQUIP_REF_TAG: &str = "haystack_equipRef";
/// Tag key holding a point's own entity reference.
pub const ENTITY_REF_TAG: &str = "haystack_entityRef";

/// A typed tag value.
///
/// Most tags are plain scalars; references decoded from the store keep
/// their target id and optional display string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    /// Boolean scalar
    Bool(bool),
    /// Numeric scalar
    Num(f64),
    /// String scalar (reference ids read back from the store land here as
    /// their `r:`-prefixed form)
    Str(String),
    /// Typed reference with an optional display string
    Ref {
        /// Target identifier, usually `r:`-prefixed
        val: String,
        /// Display string, if the store sent one
        dis: Option<String>,
    },
}

impl TagValue {
    /// The reference identifier carried by this value, if it is one.
    ///
    /// Both the string form (`"r:abc"`) and the structured form are
    /// accepted; scalar non-string values are not references.
    #[must_use]
    pub fn ref_id(&self) -> Option<&str> {
        match self {
            TagValue::Str(s) => Some(s.as_str()),
            TagValue::Ref { val, .. } => Some(val.as_str()),
            _ => None,
        }
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Str(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Str(value)
    }
}

/// A time-series point identified by a hierarchical `site/equipment/leaf`
/// name.
///
/// Constructed from source-inventory data or decoded from store rows. The
/// resolver copies discovered reference ids into `kv_tags` under
/// [`SITE_REF_TAG`], [`EQUIP_REF_TAG`] and [`ENTITY_REF_TAG`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Hierarchical name, `site/equipment/leaf`
    pub name: String,
    /// Display string
    pub dis: String,
    /// Boolean-presence tags
    pub marker_tags: BTreeSet<String>,
    /// Valued tags, keyed by tag name
    pub kv_tags: BTreeMap<String, TagValue>,
    /// Remote entity id, once known
    pub id: Option<String>,
}

impl Point {
    /// Parse the hierarchical path out of the point name.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::Malformed`] if the name does not split into
    /// three non-empty segments.
    pub fn path(&self) -> Result<PointPath, PathError> {
        PointPath::parse(&self.name)
    }

    /// The resolved site reference id, if present.
    #[must_use]
    pub fn site_ref(&self) -> Option<&str> {
        self.kv_tags.get(SITE_REF_TAG).and_then(TagValue::ref_id)
    }

    /// The resolved equipment reference id, if present.
    #[must_use]
    pub fn equip_ref(&self) -> Option<&str> {
        self.kv_tags.get(EQUIP_REF_TAG).and_then(TagValue::ref_id)
    }

    /// The resolved entity reference id, if present.
    #[must_use]
    pub fn entity_ref(&self) -> Option<&str> {
        self.kv_tags.get(ENTITY_REF_TAG).and_then(TagValue::ref_id)
    }
}

/// A site entity as decoded from a commit or read response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    /// Display string
    pub dis: String,
    /// Reference name, equal to the display name submitted at creation
    pub ref_name: String,
    /// Remote entity id
    pub id: String,
}

/// An equipment entity as decoded from a commit or read response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    /// Display string
    pub dis: String,
    /// Owning site reference id
    pub site_ref: String,
    /// Reference name, the equipment segment of owning point names
    pub ref_name: String,
    /// Remote entity id
    pub id: String,
}

/// Identity of an equipment record to be created.
///
/// Candidate equipment dedups structurally over display name, site
/// reference and reference name across the whole batch; the `Ord` derive
/// keeps submitted row order deterministic within one run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EquipmentSeed {
    /// Display string, the equipment path segment
    pub dis: String,
    /// Owning site reference id
    pub site_ref: String,
    /// Reference name, equal to the display string
    pub ref_name: String,
}

/// A single timestamped observation bound to a point's remote entity.
///
/// The timestamp is zone-aware by construction: building a `Sample` from
/// source data requires an RFC 3339 instant and an IANA zone, so a naive
/// time cannot reach the history writer.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Entity reference id of the point written to
    pub id: String,
    /// Full hierarchical point name
    pub ref_name: String,
    /// Observation instant, in the zone the store should record
    pub time: DateTime<Tz>,
    /// Observed value
    pub value: f64,
}
