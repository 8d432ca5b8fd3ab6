//! JSON response-envelope decoding.
//!
//! Commit and read responses arrive as `{"rows": [...]}` where each row is
//! a tag map in the store's JSON encoding. Cell rules:
//!
//! - scalar, non-empty, not the `"m:"` token → key-value tag
//! - the `"m:"` token, or an object tagged `_kind: "marker"` → marker tag
//! - an object tagged `_kind: "ref"` → reference value kept under its key
//! - anything else is dropped
//!
//! A missing `rows` field decodes to an empty row set; an unparsable body
//! is an error for the caller to soften (the client layer logs it and
//! treats the response as "nothing found").

use crate::GridError;
use pointsync_core::{Equipment, Point, Site, TagValue};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// One decoded response row: a tag map in store JSON encoding.
pub type Row = serde_json::Map<String, Value>;

/// The marker token used by the store's JSON encoding.
const MARKER_TOKEN: &str = "m:";

/// Parse a response body into its rows.
///
/// # Errors
///
/// Returns [`GridError::Json`] when the body is not JSON, the envelope is
/// not an object, or `rows` is present but not an array of objects.
pub fn parse_envelope(body: &str) -> Result<Vec<Row>, GridError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| GridError::Json(e.to_string()))?;

    let Value::Object(envelope) = value else {
        return Err(GridError::Json("envelope is not an object".to_string()));
    };

    let Some(rows) = envelope.get("rows") else {
        return Ok(Vec::new());
    };

    let Value::Array(rows) = rows else {
        return Err(GridError::Json("rows is not an array".to_string()));
    };

    rows.iter()
        .map(|row| match row {
            Value::Object(map) => Ok(map.clone()),
            other => Err(GridError::Json(format!("row is not an object: {other}"))),
        })
        .collect()
}

/// Split a row into marker tags and key-value tags under the cell rules.
///
/// Keys listed in `skip` (already consumed by the caller, e.g. `id`) are
/// not revisited.
#[must_use]
pub fn tags_from_row(row: &Row, skip: &[&str]) -> (BTreeSet<String>, BTreeMap<String, TagValue>) {
    let mut markers = BTreeSet::new();
    let mut kv_tags = BTreeMap::new();

    for (key, value) in row {
        if skip.contains(&key.as_str()) {
            continue;
        }
        match value {
            Value::String(s) if s == MARKER_TOKEN => {
                markers.insert(key.clone());
            }
            Value::String(s) if !s.is_empty() => {
                kv_tags.insert(key.clone(), TagValue::Str(s.clone()));
            }
            Value::Bool(b) => {
                kv_tags.insert(key.clone(), TagValue::Bool(*b));
            }
            Value::Number(n) => {
                if let Some(n) = n.as_f64() {
                    kv_tags.insert(key.clone(), TagValue::Num(n));
                }
            }
            Value::Object(cell) => match cell.get("_kind").and_then(Value::as_str) {
                Some("marker") => {
                    markers.insert(key.clone());
                }
                Some("ref") => {
                    if let Some(val) = cell.get("val").and_then(Value::as_str) {
                        kv_tags.insert(
                            key.clone(),
                            TagValue::Ref {
                                val: val.to_string(),
                                dis: cell
                                    .get("dis")
                                    .and_then(Value::as_str)
                                    .map(str::to_string),
                            },
                        );
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    (markers, kv_tags)
}

/// Read a reference cell: either the structured `{"_kind":"ref",...}` form
/// or a bare string id.
fn ref_cell(row: &Row, key: &str) -> Option<(String, Option<String>)> {
    match row.get(key)? {
        Value::String(s) if !s.is_empty() => Some((s.clone(), None)),
        Value::Object(cell) => {
            let val = cell.get("val").and_then(Value::as_str)?;
            let dis = cell.get("dis").and_then(Value::as_str).map(str::to_string);
            Some((val.to_string(), dis))
        }
        _ => None,
    }
}

fn str_cell(row: &Row, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Decode a site row.
///
/// The reference name falls back to the display string, which equals the
/// ref name submitted at creation.
///
/// # Errors
///
/// Returns [`GridError::MissingField`] when `dis` or `id` is absent.
pub fn site_from_row(row: &Row) -> Result<Site, GridError> {
    let dis = str_cell(row, "dis").ok_or(GridError::MissingField {
        entity: "site",
        field: "dis",
    })?;
    let (id, _) = ref_cell(row, "id").ok_or(GridError::MissingField {
        entity: "site",
        field: "id",
    })?;
    let ref_name = str_cell(row, "refName").unwrap_or_else(|| dis.clone());

    Ok(Site { dis, ref_name, id })
}

/// Decode an equipment row.
///
/// # Errors
///
/// Returns [`GridError::MissingField`] when any of `dis`, `siteRef`,
/// `refName` or `id` is absent.
pub fn equip_from_row(row: &Row) -> Result<Equipment, GridError> {
    let dis = str_cell(row, "dis").ok_or(GridError::MissingField {
        entity: "equipment",
        field: "dis",
    })?;
    let (site_ref, _) = ref_cell(row, "siteRef").ok_or(GridError::MissingField {
        entity: "equipment",
        field: "siteRef",
    })?;
    let ref_name = str_cell(row, "refName").ok_or(GridError::MissingField {
        entity: "equipment",
        field: "refName",
    })?;
    let (id, _) = ref_cell(row, "id").ok_or(GridError::MissingField {
        entity: "equipment",
        field: "id",
    })?;

    Ok(Equipment {
        dis,
        site_ref,
        ref_name,
        id,
    })
}

/// Decode a point row.
///
/// The point name is the echoed `refName` (the full hierarchical name
/// submitted at creation), falling back to the display string. Remaining
/// cells land in the tag maps under the cell rules, so `siteRef` and
/// `equipRef` survive as keyed reference values.
///
/// # Errors
///
/// Returns [`GridError::MissingField`] when `id` is absent.
pub fn point_from_row(row: &Row) -> Result<Point, GridError> {
    let (id, id_dis) = ref_cell(row, "id").ok_or(GridError::MissingField {
        entity: "point",
        field: "id",
    })?;
    let dis = str_cell(row, "dis").or(id_dis).unwrap_or_default();
    let name = str_cell(row, "refName").unwrap_or_else(|| dis.clone());

    let (marker_tags, kv_tags) = tags_from_row(row, &["id", "dis", "refName"]);

    Ok(Point {
        name,
        dis,
        marker_tags,
        kv_tags,
        id: Some(id),
    })
}
