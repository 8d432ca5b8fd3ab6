//! Hierarchical point-path parsing.
//!
//! Point names encode their placement in the store hierarchy as
//! `site/equipment/leaf`. The leaf may itself contain `/`; only the first
//! two separators are structural.

use serde::{Deserialize, Serialize};

/// The three structural segments of a point name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointPath {
    /// First segment: the site name
    pub site: String,
    /// Second segment: the equipment name
    pub equipment: String,
    /// Remainder: the point's own leaf name
    pub leaf: String,
}

impl PointPath {
    /// Split a point name into its structural segments.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::Malformed`] if the name has fewer than three
    /// segments or any structural segment is empty.
    pub fn parse(name: &str) -> Result<Self, PathError> {
        let mut parts = name.splitn(3, '/');
        let site = parts.next().unwrap_or_default();
        let equipment = parts.next().unwrap_or_default();
        let leaf = parts.next().unwrap_or_default();

        if site.is_empty() || equipment.is_empty() || leaf.is_empty() {
            return Err(PathError::Malformed {
                name: name.to_string(),
            });
        }

        Ok(Self {
            site: site.to_string(),
            equipment: equipment.to_string(),
            leaf: leaf.to_string(),
        })
    }

    /// The `site/equipment` prefix identifying the owning equipment.
    #[must_use]
    pub fn equipment_prefix(&self) -> String {
        format!("{}/{}", self.site, self.equipment)
    }
}

/// Errors from point-path parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// The name does not carry three non-empty segments
    #[error("malformed point name (want site/equipment/leaf): {name:?}")]
    Malformed {
        /// The offending point name
        name: String,
    },
}
