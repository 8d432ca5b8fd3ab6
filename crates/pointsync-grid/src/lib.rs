//! # pointsync grid codec
//!
//! The grid text serialization exchanged with the remote store, both ways:
//!
//! - Encoding: typed [`Grid`]/[`Cell`] rows rendered to zinc text, one
//!   builder per commit kind plus the history-write expression grid
//! - Decoding: the JSON response envelope (`{"rows": [...]}`) reconstructed
//!   into [`pointsync_core`] entities under the per-cell tag rules
//!
//! Encoding is strict (a malformed row is a caller defect and errors);
//! decoding of remote responses is the lenient half of the contract and is
//! driven by the client layer.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decode;
pub mod encode;

pub use decode::{equip_from_row, parse_envelope, point_from_row, site_from_row, tags_from_row, Row};
pub use encode::{
    equips_add, his_write, his_write_expr, points_add, render_timestamp, sites_add,
    strip_ref_prefix, zone_short_name, Cell, Grid,
};

/// Errors from grid encoding and decoding.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    /// Response body was not the expected JSON envelope
    #[error("response body is not a JSON row envelope: {0}")]
    Json(String),
    /// A decoded row is missing a field its entity requires
    #[error("{entity} row is missing required field {field:?}")]
    MissingField {
        /// Entity kind being decoded
        entity: &'static str,
        /// Name of the absent field
        field: &'static str,
    },
    /// A point reached an encode operation without a reference it needs
    #[error("point {name:?} lacks resolved reference tag {tag:?}")]
    UnresolvedReference {
        /// Point name
        name: String,
        /// The absent tag key
        tag: &'static str,
    },
}
