//! Hierarchy resolution pipeline.
//!
//! Three sequential stages — sites, equipment, points — each idempotent
//! and skipped outright when every point already carries the stage's
//! reference tag. A stage never overwrites an existing tag: identifiers
//! already present win over anything newly created.
//!
//! Stages take a point slice and return a fresh vector plus the delta of
//! identifiers they discovered, so a failed stage leaves the caller's
//! batch untouched.

use crate::client::HaystackClient;
use crate::transport::{HttpTransport, TransportError};
use pointsync_core::{
    Equipment, EquipmentSeed, PathError, Point, PointPath, TagValue, ENTITY_REF_TAG,
    EQUIP_REF_TAG, SITE_REF_TAG,
};
use pointsync_grid::{
    equip_from_row, equips_add, point_from_row, points_add, site_from_row, sites_add,
    strip_ref_prefix, GridError, Row,
};
use std::collections::{BTreeMap, BTreeSet};

/// The resolution stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Site creation and back-fill
    Sites,
    /// Equipment creation and back-fill
    Equipment,
    /// Point entity creation and back-fill
    Points,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Sites => write!(f, "site"),
            Stage::Equipment => write!(f, "equipment"),
            Stage::Points => write!(f, "point"),
        }
    }
}

/// Errors from the resolution pipeline, always naming the stage.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    /// HTTP failure while submitting the stage's commit
    #[error("{stage} stage: {source}")]
    Transport {
        /// Stage the failure occurred in
        stage: Stage,
        /// The underlying transport failure
        #[source]
        source: TransportError,
    },
    /// A point name does not parse as `site/equipment/leaf`
    #[error("{stage} stage: {source}")]
    MalformedPoint {
        /// Stage the point was first needed in
        stage: Stage,
        /// The path parse failure
        #[source]
        source: PathError,
    },
    /// A stage's commit could not be rendered because an earlier
    /// reference is missing
    #[error("{stage} stage: {source}")]
    Encode {
        /// Stage whose grid failed to render
        stage: Stage,
        /// The rendering failure, naming point and tag
        #[source]
        source: GridError,
    },
}

/// Result of one stage: the updated batch plus what the stage discovered.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    /// The batch with this stage's references filled in
    pub points: Vec<Point>,
    /// Identifiers discovered by this stage, keyed by derived name
    /// (site name, `site/equipment` prefix, or full point name)
    pub discovered: BTreeMap<String, String>,
    /// Rows submitted in this stage's commit; zero when skipped
    pub submitted: usize,
}

impl StageOutcome {
    fn skipped(points: Vec<Point>) -> Self {
        Self {
            points,
            discovered: BTreeMap::new(),
            submitted: 0,
        }
    }
}

/// Result of the full pipeline.
#[derive(Debug, Clone)]
pub struct ResolvedBatch {
    /// The fully resolved batch
    pub points: Vec<Point>,
    /// Site ids discovered, keyed by site name
    pub sites: BTreeMap<String, String>,
    /// Equipment ids discovered, keyed by `site/equipment` prefix
    pub equipment: BTreeMap<String, String>,
    /// Point entity ids discovered, keyed by full point name
    pub entities: BTreeMap<String, String>,
}

/// Drives the three resolution stages against one authenticated client.
pub struct HierarchyResolver<'a, T: HttpTransport> {
    client: &'a HaystackClient<T>,
}

impl<'a, T: HttpTransport> HierarchyResolver<'a, T> {
    /// Create a resolver over an authenticated client.
    #[must_use]
    pub fn new(client: &'a HaystackClient<T>) -> Self {
        Self { client }
    }

    /// Run all three stages in order.
    ///
    /// # Errors
    ///
    /// Returns the first stage error; earlier stages' results are
    /// discarded with it, leaving the caller's input untouched.
    pub fn resolve(&self, points: &[Point]) -> Result<ResolvedBatch, SyncError> {
        let sites = self.resolve_sites(points)?;
        let equipment = self.resolve_equipment(&sites.points)?;
        let entities = self.resolve_entities(&equipment.points)?;

        tracing::info!(
            sites_created = sites.discovered.len(),
            equipment_created = equipment.discovered.len(),
            points_created = entities.discovered.len(),
            "hierarchy resolved"
        );

        Ok(ResolvedBatch {
            points: entities.points,
            sites: sites.discovered,
            equipment: equipment.discovered,
            entities: entities.discovered,
        })
    }

    /// Stage 1: ensure a site exists for every point's first path segment.
    ///
    /// # Errors
    ///
    /// See [`SyncError`]; transport failures carry [`Stage::Sites`].
    pub fn resolve_sites(&self, points: &[Point]) -> Result<StageOutcome, SyncError> {
        let stage = Stage::Sites;
        let mut points = points.to_vec();
        let paths = parse_paths(stage, &points)?;

        // Siblings of an already-tagged point inherit its reference
        let mut known: BTreeMap<String, TagValue> = BTreeMap::new();
        for (point, path) in points.iter().zip(&paths) {
            if let Some(tag) = point.kv_tags.get(SITE_REF_TAG) {
                known.entry(path.site.clone()).or_insert_with(|| tag.clone());
            }
        }
        for (point, path) in points.iter_mut().zip(&paths) {
            if !point.kv_tags.contains_key(SITE_REF_TAG) {
                if let Some(tag) = known.get(&path.site) {
                    point.kv_tags.insert(SITE_REF_TAG.to_string(), tag.clone());
                }
            }
        }

        // One creation request per distinct derived name
        let candidates: BTreeSet<String> = points
            .iter()
            .zip(&paths)
            .filter(|(point, _)| !point.kv_tags.contains_key(SITE_REF_TAG))
            .map(|(_, path)| path.site.clone())
            .collect();

        if candidates.is_empty() {
            tracing::debug!(%stage, "every point carries a site reference; skipping");
            return Ok(StageOutcome::skipped(points));
        }

        let grid = sites_add(candidates.iter().map(String::as_str));
        let submitted = grid.row_count();
        tracing::info!(%stage, count = submitted, "creating missing sites");
        let rows = self
            .client
            .commit("sites-add", &grid)
            .map_err(|source| SyncError::Transport { stage, source })?;
        let sites = decode_stage_rows(stage, &rows, site_from_row);

        let mut discovered = BTreeMap::new();
        for site in sites {
            discovered.insert(site.ref_name, site.id);
        }

        for (point, path) in points.iter_mut().zip(&paths) {
            if point.kv_tags.contains_key(SITE_REF_TAG) {
                continue;
            }
            if let Some(id) = discovered.get(&path.site) {
                point
                    .kv_tags
                    .insert(SITE_REF_TAG.to_string(), TagValue::Str(id.clone()));
            } else {
                tracing::warn!(%stage, point = %point.name, site = %path.site, "no id returned for derived site");
            }
        }

        Ok(StageOutcome {
            points,
            discovered,
            submitted,
        })
    }

    /// Stage 2: ensure equipment exists one path segment deeper.
    ///
    /// Candidate equipment dedups structurally over (display name, site
    /// reference, reference name) across the whole batch; back-fill is
    /// scoped per site.
    ///
    /// # Errors
    ///
    /// See [`SyncError`]; a point lacking its site reference here is an
    /// [`SyncError::Encode`] naming the missing tag.
    pub fn resolve_equipment(&self, points: &[Point]) -> Result<StageOutcome, SyncError> {
        let stage = Stage::Equipment;
        let mut points = points.to_vec();
        let paths = parse_paths(stage, &points)?;

        let mut known: BTreeMap<String, TagValue> = BTreeMap::new();
        for (point, path) in points.iter().zip(&paths) {
            if let Some(tag) = point.kv_tags.get(EQUIP_REF_TAG) {
                known
                    .entry(path.equipment_prefix())
                    .or_insert_with(|| tag.clone());
            }
        }
        for (point, path) in points.iter_mut().zip(&paths) {
            if !point.kv_tags.contains_key(EQUIP_REF_TAG) {
                if let Some(tag) = known.get(&path.equipment_prefix()) {
                    point.kv_tags.insert(EQUIP_REF_TAG.to_string(), tag.clone());
                }
            }
        }

        let mut candidates: BTreeSet<EquipmentSeed> = BTreeSet::new();
        for (point, path) in points.iter().zip(&paths) {
            if point.kv_tags.contains_key(EQUIP_REF_TAG) {
                continue;
            }
            let site_ref = point.site_ref().ok_or_else(|| SyncError::Encode {
                stage,
                source: GridError::UnresolvedReference {
                    name: point.name.clone(),
                    tag: SITE_REF_TAG,
                },
            })?;
            candidates.insert(EquipmentSeed {
                dis: path.equipment.clone(),
                site_ref: site_ref.to_string(),
                ref_name: path.equipment.clone(),
            });
        }

        if candidates.is_empty() {
            tracing::debug!(%stage, "every point carries an equipment reference; skipping");
            return Ok(StageOutcome::skipped(points));
        }

        let grid = equips_add(candidates.iter());
        let submitted = grid.row_count();
        tracing::info!(%stage, count = submitted, "creating missing equipment");
        let rows = self
            .client
            .commit("equips-add", &grid)
            .map_err(|source| SyncError::Transport { stage, source })?;
        let equipment = decode_stage_rows(stage, &rows, equip_from_row);

        // Response rows map back by (site, reference name); reference ids
        // are compared with the `r:` prefix stripped on both sides
        let by_site_and_name: BTreeMap<(String, String), &Equipment> = equipment
            .iter()
            .map(|equip| {
                (
                    (
                        strip_ref_prefix(&equip.site_ref).to_string(),
                        equip.ref_name.clone(),
                    ),
                    equip,
                )
            })
            .collect();

        let mut discovered = BTreeMap::new();
        for (point, path) in points.iter_mut().zip(&paths) {
            if point.kv_tags.contains_key(EQUIP_REF_TAG) {
                continue;
            }
            let Some(site_ref) = point.site_ref() else {
                continue;
            };
            let key = (
                strip_ref_prefix(site_ref).to_string(),
                path.equipment.clone(),
            );
            if let Some(equip) = by_site_and_name.get(&key) {
                discovered.insert(path.equipment_prefix(), equip.id.clone());
                point
                    .kv_tags
                    .insert(EQUIP_REF_TAG.to_string(), TagValue::Str(equip.id.clone()));
            } else {
                tracing::warn!(%stage, point = %point.name, equipment = %path.equipment, "no id returned for derived equipment");
            }
        }

        Ok(StageOutcome {
            points,
            discovered,
            submitted,
        })
    }

    /// Stage 3: ensure a point entity exists for every point, mapped back
    /// by full hierarchical name.
    ///
    /// # Errors
    ///
    /// See [`SyncError`]; points missing site or equipment references are
    /// an [`SyncError::Encode`].
    pub fn resolve_entities(&self, points: &[Point]) -> Result<StageOutcome, SyncError> {
        let stage = Stage::Points;
        let mut points = points.to_vec();

        let candidates: Vec<Point> = points
            .iter()
            .filter(|point| !point.kv_tags.contains_key(ENTITY_REF_TAG))
            .cloned()
            .collect();

        if candidates.is_empty() {
            tracing::debug!(%stage, "every point carries an entity reference; skipping");
            return Ok(StageOutcome::skipped(points));
        }

        let grid = points_add(candidates.iter())
            .map_err(|source| SyncError::Encode { stage, source })?;
        let submitted = grid.row_count();
        tracing::info!(%stage, count = submitted, "creating missing point entities");
        let rows = self
            .client
            .commit("points-add", &grid)
            .map_err(|source| SyncError::Transport { stage, source })?;
        let remote = decode_stage_rows(stage, &rows, point_from_row);

        let mut discovered = BTreeMap::new();
        for remote_point in remote {
            if let Some(id) = remote_point.id {
                discovered.insert(remote_point.name, id);
            }
        }

        for point in &mut points {
            if point.kv_tags.contains_key(ENTITY_REF_TAG) {
                continue;
            }
            if let Some(id) = discovered.get(&point.name) {
                point
                    .kv_tags
                    .insert(ENTITY_REF_TAG.to_string(), TagValue::Str(id.clone()));
                point.id = Some(id.clone());
            } else {
                tracing::warn!(%stage, point = %point.name, "no id returned for point entity");
            }
        }

        Ok(StageOutcome {
            points,
            discovered,
            submitted,
        })
    }
}

fn parse_paths(stage: Stage, points: &[Point]) -> Result<Vec<PointPath>, SyncError> {
    points
        .iter()
        .map(|point| {
            point
                .path()
                .map_err(|source| SyncError::MalformedPoint { stage, source })
        })
        .collect()
}

fn decode_stage_rows<E>(
    stage: Stage,
    rows: &[Row],
    decode: impl Fn(&Row) -> Result<E, GridError>,
) -> Vec<E> {
    rows.iter()
        .filter_map(|row| match decode(row) {
            Ok(decoded) => Some(decoded),
            Err(error) => {
                tracing::warn!(%stage, error = %error, "skipping undecodable row");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{HaystackClient, HaystackClientConfig};
    use crate::testing::ScriptedTransport;
    use crate::transport::HttpResponse;

    fn point(name: &str) -> Point {
        Point {
            name: name.to_string(),
            dis: name.to_string(),
            marker_tags: BTreeSet::new(),
            kv_tags: BTreeMap::new(),
            id: None,
        }
    }

    fn tagged(name: &str, tag: &str, id: &str) -> Point {
        let mut p = point(name);
        p.kv_tags.insert(tag.to_string(), TagValue::from(id));
        p
    }

    fn client(transport: ScriptedTransport) -> HaystackClient<ScriptedTransport> {
        HaystackClient::with_token(transport, HaystackClientConfig::default(), "tok-abc")
    }

    fn rows_response(rows: &str) -> HttpResponse {
        HttpResponse::new(200, vec![], format!("{{\"rows\": {rows}}}"))
    }

    #[test]
    fn end_to_end_builds_full_hierarchy() {
        let transport = ScriptedTransport::new();
        transport.push(rows_response(
            r#"[{"dis": "A", "refName": "A", "id": {"_kind": "ref", "val": "r:site-A"}}]"#,
        ));
        transport.push(rows_response(
            r#"[
                {"dis": "B", "siteRef": {"_kind": "ref", "val": "r:site-A"}, "refName": "B",
                 "id": {"_kind": "ref", "val": "r:equip-B"}},
                {"dis": "C", "siteRef": {"_kind": "ref", "val": "r:site-A"}, "refName": "C",
                 "id": {"_kind": "ref", "val": "r:equip-C"}}
            ]"#,
        ));
        transport.push(rows_response(
            r#"[
                {"refName": "A/B/p1", "id": {"_kind": "ref", "val": "r:ent-1"}},
                {"refName": "A/B/p2", "id": {"_kind": "ref", "val": "r:ent-2"}},
                {"refName": "A/C/p3", "id": {"_kind": "ref", "val": "r:ent-3"}}
            ]"#,
        ));
        let client = client(transport);
        let resolver = HierarchyResolver::new(&client);

        let batch = resolver
            .resolve(&[point("A/B/p1"), point("A/B/p2"), point("A/C/p3")])
            .unwrap();

        assert_eq!(batch.sites.len(), 1);
        assert_eq!(batch.sites.get("A").map(String::as_str), Some("r:site-A"));
        assert_eq!(batch.equipment.len(), 2);
        assert_eq!(batch.entities.len(), 3);

        for (p, expected_entity) in batch.points.iter().zip(["r:ent-1", "r:ent-2", "r:ent-3"]) {
            assert_eq!(p.site_ref(), Some("r:site-A"));
            assert_eq!(p.entity_ref(), Some(expected_entity));
        }
        assert_eq!(batch.points[0].equip_ref(), Some("r:equip-B"));
        assert_eq!(batch.points[2].equip_ref(), Some("r:equip-C"));

        // Exactly one commit per stage
        assert_eq!(client.transport.request_count(), 3);
        let bodies = client.transport.bodies();
        assert_eq!(bodies[0].matches("\n").count(), 3); // header + columns + 1 site
        assert_eq!(bodies[1].matches("\n").count(), 4); // header + columns + 2 equips
        assert_eq!(bodies[2].matches("\n").count(), 5); // header + columns + 3 points

        // A second run over the resolved batch is a pure no-op
        let second = resolver.resolve(&batch.points).unwrap();
        assert_eq!(client.transport.request_count(), 3);
        assert_eq!(second.points, batch.points);
    }

    #[test]
    fn fully_tagged_batch_issues_no_commits() {
        let transport = ScriptedTransport::new();
        let client = client(transport);
        let resolver = HierarchyResolver::new(&client);

        let mut p = point("A/B/p1");
        p.kv_tags
            .insert(SITE_REF_TAG.to_string(), TagValue::from("r:site-A"));
        p.kv_tags
            .insert(EQUIP_REF_TAG.to_string(), TagValue::from("r:equip-B"));
        p.kv_tags
            .insert(ENTITY_REF_TAG.to_string(), TagValue::from("r:ent-1"));

        let batch = resolver.resolve(&[p.clone()]).unwrap();
        assert_eq!(client.transport.request_count(), 0);
        assert_eq!(batch.points, vec![p]);
        assert!(batch.sites.is_empty());
        assert!(batch.equipment.is_empty());
        assert!(batch.entities.is_empty());
    }

    #[test]
    fn sibling_tags_backfill_before_the_network() {
        let transport = ScriptedTransport::new();
        // Site "A" comes from a sibling's tag; only "Z" goes to the store
        transport.push(rows_response(
            r#"[{"dis": "Z", "refName": "Z", "id": {"_kind": "ref", "val": "r:site-Z"}}]"#,
        ));
        let client = client(transport);
        let resolver = HierarchyResolver::new(&client);

        let points = [
            tagged("A/B/p1", SITE_REF_TAG, "r:site-A"),
            point("A/B/p2"),
            point("Z/Y/p3"),
        ];
        let outcome = resolver.resolve_sites(&points).unwrap();

        // The sibling inherited the existing tag, so only one site row
        // was submitted
        assert_eq!(outcome.submitted, 1);
        assert!(client.transport.bodies()[0].contains("\"Z\""));
        assert_eq!(outcome.points[1].site_ref(), Some("r:site-A"));
        assert_eq!(outcome.points[2].site_ref(), Some("r:site-Z"));
    }

    #[test]
    fn existing_tags_are_never_overwritten() {
        let transport = ScriptedTransport::new();
        transport.push(rows_response(
            r#"[{"dis": "A", "refName": "A", "id": {"_kind": "ref", "val": "r:site-A-new"}}]"#,
        ));
        let client = client(transport);
        let resolver = HierarchyResolver::new(&client);

        // The tagged point shares its site with an untagged one; the
        // sibling backfill wins before any response mapping happens
        let points = [tagged("A/B/p1", SITE_REF_TAG, "r:site-A-old"), point("A/C/p2")];
        let outcome = resolver.resolve_sites(&points).unwrap();
        assert_eq!(outcome.points[0].site_ref(), Some("r:site-A-old"));
        assert_eq!(outcome.points[1].site_ref(), Some("r:site-A-old"));
        assert_eq!(outcome.submitted, 0);
    }

    #[test]
    fn equipment_dedups_across_batch_but_not_across_sites() {
        let transport = ScriptedTransport::new();
        transport.push(rows_response(
            r#"[
                {"dis": "B", "siteRef": {"_kind": "ref", "val": "r:site-1"}, "refName": "B",
                 "id": {"_kind": "ref", "val": "r:equip-1B"}},
                {"dis": "B", "siteRef": {"_kind": "ref", "val": "r:site-2"}, "refName": "B",
                 "id": {"_kind": "ref", "val": "r:equip-2B"}}
            ]"#,
        ));
        let client = client(transport);
        let resolver = HierarchyResolver::new(&client);

        let points = [
            tagged("S1/B/p1", SITE_REF_TAG, "r:site-1"),
            tagged("S1/B/p2", SITE_REF_TAG, "r:site-1"),
            tagged("S2/B/p3", SITE_REF_TAG, "r:site-2"),
        ];
        let outcome = resolver.resolve_equipment(&points).unwrap();

        // Two rows: same equipment name under two sites
        assert_eq!(outcome.submitted, 2);
        assert_eq!(outcome.points[0].equip_ref(), Some("r:equip-1B"));
        assert_eq!(outcome.points[1].equip_ref(), Some("r:equip-1B"));
        assert_eq!(outcome.points[2].equip_ref(), Some("r:equip-2B"));
    }

    #[test]
    fn equipment_stage_requires_site_references() {
        let transport = ScriptedTransport::new();
        let client = client(transport);
        let resolver = HierarchyResolver::new(&client);

        let err = resolver.resolve_equipment(&[point("A/B/p1")]).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Encode {
                stage: Stage::Equipment,
                ..
            }
        ));
        assert_eq!(client.transport.request_count(), 0);
    }

    #[test]
    fn malformed_point_name_aborts_the_stage() {
        let transport = ScriptedTransport::new();
        let client = client(transport);
        let resolver = HierarchyResolver::new(&client);

        let err = resolver.resolve(&[point("not-hierarchical")]).unwrap_err();
        assert!(matches!(
            err,
            SyncError::MalformedPoint {
                stage: Stage::Sites,
                ..
            }
        ));
        assert_eq!(client.transport.request_count(), 0);
    }

    #[test]
    fn empty_commit_response_leaves_points_unresolved() {
        let transport = ScriptedTransport::new();
        transport.push(HttpResponse::new(500, vec![], "boom".to_string()));
        let client = client(transport);
        let resolver = HierarchyResolver::new(&client);

        let outcome = resolver.resolve_sites(&[point("A/B/p1")]).unwrap();
        assert_eq!(outcome.submitted, 1);
        assert!(outcome.discovered.is_empty());
        assert_eq!(outcome.points[0].site_ref(), None);
    }

    #[test]
    fn transport_failure_names_the_stage() {
        let transport = ScriptedTransport::new();
        let client = client(transport);
        let resolver = HierarchyResolver::new(&client);

        let err = resolver.resolve_sites(&[point("A/B/p1")]).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Transport {
                stage: Stage::Sites,
                ..
            }
        ));
    }
}
