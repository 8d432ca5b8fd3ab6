//! # pointsync core
//!
//! Domain model for synchronizing per-device time-series points into a
//! tag-based remote store organized as site → equipment → point.
//!
//! This crate provides:
//! - Entity types (`Point`, `Site`, `Equipment`, `Sample`) materialized from
//!   decoded store responses
//! - Source-inventory records (`SourcePoint`, `SourceSample`) as caller input
//! - Hierarchical point-path parsing (`PointPath`)
//!
//! No I/O happens here; the wire format and the HTTP integration live in
//! their own crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod model;
pub mod path;
pub mod source;

pub use model::{Equipment, EquipmentSeed, Point, Sample, Site, TagValue};
pub use model::{ENTITY_REF_TAG, EQUIP_REF_TAG, SITE_REF_TAG};
pub use path::{PathError, PointPath};
pub use source::{SampleError, SourcePoint, SourceSample};
