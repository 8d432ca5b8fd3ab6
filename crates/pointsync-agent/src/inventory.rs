//! JSON inventory loading.
//!
//! The inventory file carries the flat source records the run works from:
//!
//! ```json
//! {
//!   "points": [
//!     {"name": "A/B/p1", "point_type": "analog",
//!      "marker_tags": ["his"], "kv_tags": {"unit": "kWh"}}
//!   ],
//!   "samples": [
//!     {"name": "A/B/p1", "time": "2024-01-01T00:00:00+00:00",
//!      "value": 21.5, "tz": "America/New_York"}
//!   ]
//! }
//! ```

use anyhow::{Context, Result};
use pointsync_core::{SourcePoint, SourceSample};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// The source inventory for one synchronization run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Inventory {
    /// Points to resolve into the hierarchy
    #[serde(default)]
    pub points: Vec<SourcePoint>,

    /// Samples to write against resolved points
    #[serde(default)]
    pub samples: Vec<SourceSample>,
}

/// Load an inventory file.
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid inventory
/// JSON.
pub fn load(path: &Path) -> Result<Inventory> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read inventory file {}", path.display()))?;
    let inventory: Inventory = serde_json::from_str(&text)
        .with_context(|| format!("Invalid inventory JSON in {}", path.display()))?;

    tracing::debug!(
        points = inventory.points.len(),
        samples = inventory.samples.len(),
        path = %path.display(),
        "inventory loaded"
    );
    Ok(inventory)
}
