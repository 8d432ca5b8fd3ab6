//! Zinc text rendering.
//!
//! A [`Grid`] is a typed header line (`ver:"3.0"`, plus `commit:"add"` for
//! write commands), a column line, and typed cell rows. The four encode
//! operations build grids for the commit kinds the synchronization pipeline
//! submits; the history writer renders expression grids.

use crate::GridError;
use chrono::{DateTime, SecondsFormat};
use chrono_tz::Tz;
use pointsync_core::{EquipmentSeed, Point, Sample, EQUIP_REF_TAG, SITE_REF_TAG};

/// A typed grid cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Quoted string
    Str(String),
    /// Bare numeral
    Num(f64),
    /// Bare boolean
    Bool(bool),
    /// Present-marker token `M`
    Marker,
    /// `@`-prefixed reference (the `r:` typed prefix is stripped on render)
    Ref(String),
    /// Empty cell
    Null,
}

impl Cell {
    fn render(&self) -> String {
        match self {
            Cell::Str(s) => format!("\"{}\"", escape_str(s)),
            Cell::Num(n) => format!("{n}"),
            Cell::Bool(b) => format!("{b}"),
            Cell::Marker => "M".to_string(),
            Cell::Ref(id) => format!("@{}", strip_ref_prefix(id)),
            Cell::Null => String::new(),
        }
    }
}

/// A grid ready to render: header, columns, rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    commit_add: bool,
    columns: Vec<&'static str>,
    rows: Vec<Vec<Cell>>,
}

impl Grid {
    /// A data grid with no commit verb.
    #[must_use]
    pub fn new(columns: Vec<&'static str>) -> Self {
        Self {
            commit_add: false,
            columns,
            rows: Vec::new(),
        }
    }

    /// A write-command grid carrying `commit:"add"`.
    #[must_use]
    pub fn commit_add(columns: Vec<&'static str>) -> Self {
        Self {
            commit_add: true,
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row. Row length is the caller's contract; short rows render
    /// as trailing empties on the wire.
    pub fn push_row(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    /// Number of data rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Render the zinc text body.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.commit_add {
            out.push_str("ver:\"3.0\" commit:\"add\"\n");
        } else {
            out.push_str("ver:\"3.0\"\n");
        }
        out.push_str(&self.columns.join(","));
        out.push('\n');
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(Cell::render).collect();
            out.push_str(&cells.join(","));
            out.push('\n');
        }
        out
    }
}

/// Escape a string for a quoted zinc cell.
///
/// Un-escaped quotes in source data would corrupt the whole grid body, so
/// both the quote and the escape character are handled here rather than
/// upstream.
fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

/// Strip the `r:` typed-reference prefix, if present.
#[must_use]
pub fn strip_ref_prefix(id: &str) -> &str {
    id.strip_prefix("r:").unwrap_or(id)
}

/// Render a zone-aware timestamp at whole-second precision.
///
/// Sub-second precision is truncated to match the remote parser's
/// `YYYY-MM-DDThh:mm:ssz` pattern.
#[must_use]
pub fn render_timestamp(time: &DateTime<Tz>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Short display name of a zone: the last segment of the IANA name.
///
/// The remote store names zones without their area prefix
/// (`America/New_York` → `New_York`), which holds for everything except
/// the fixed `GMT+n` zones.
#[must_use]
pub fn zone_short_name(tz: Tz) -> &'static str {
    let name = tz.name();
    name.rsplit('/').next().unwrap_or(name)
}

/// Build a `sites-add` commit grid from derived site names.
///
/// Callers pass a deduplicated, deterministically ordered name sequence;
/// the reference name submitted equals the display name.
pub fn sites_add<'a, I>(names: I) -> Grid
where
    I: IntoIterator<Item = &'a str>,
{
    let mut grid = Grid::commit_add(vec!["dis", "tz", "refName", "site"]);
    for name in names {
        grid.push_row(vec![
            Cell::Str(name.to_string()),
            Cell::Str("UTC".to_string()),
            Cell::Str(name.to_string()),
            Cell::Marker,
        ]);
    }
    grid
}

/// Build an `equips-add` commit grid from equipment seeds.
pub fn equips_add<'a, I>(seeds: I) -> Grid
where
    I: IntoIterator<Item = &'a EquipmentSeed>,
{
    let mut grid = Grid::commit_add(vec!["dis", "siteRef", "tz", "refName", "equip"]);
    for seed in seeds {
        grid.push_row(vec![
            Cell::Str(seed.dis.clone()),
            Cell::Ref(seed.site_ref.clone()),
            Cell::Str("UTC".to_string()),
            Cell::Str(seed.ref_name.clone()),
            Cell::Marker,
        ]);
    }
    grid
}

/// Build a `points-add` commit grid.
///
/// Every point must already carry site and equipment references; the
/// submitted reference name is the full hierarchical point name, which the
/// response echoes back for correlation.
///
/// # Errors
///
/// Returns [`GridError::UnresolvedReference`] naming the first point that
/// lacks a site or equipment reference tag.
pub fn points_add<'a, I>(points: I) -> Result<Grid, GridError>
where
    I: IntoIterator<Item = &'a Point>,
{
    let mut grid = Grid::commit_add(vec![
        "dis", "equipRef", "siteRef", "tz", "kind", "refName", "cur", "his", "point",
    ]);
    for point in points {
        let equip_ref = point
            .equip_ref()
            .ok_or_else(|| GridError::UnresolvedReference {
                name: point.name.clone(),
                tag: EQUIP_REF_TAG,
            })?;
        let site_ref = point
            .site_ref()
            .ok_or_else(|| GridError::UnresolvedReference {
                name: point.name.clone(),
                tag: SITE_REF_TAG,
            })?;
        grid.push_row(vec![
            Cell::Str(point.name.clone()),
            Cell::Ref(equip_ref.to_string()),
            Cell::Ref(site_ref.to_string()),
            Cell::Str("UTC".to_string()),
            Cell::Str("Number".to_string()),
            Cell::Str(point.name.clone()),
            Cell::Marker,
            Cell::Marker,
            Cell::Marker,
        ]);
    }
    Ok(grid)
}

/// Render one history-write expression for a sample.
///
/// The embedded timestamp is whole-second, offset-qualified, and named by
/// its short zone; the target is the sample's entity reference.
#[must_use]
pub fn his_write_expr(sample: &Sample) -> String {
    let ts = render_timestamp(&sample.time);
    let zone = zone_short_name(sample.time.timezone());
    format!(
        "hisWrite({{ts: parseDateTime(\"{ts}\", \"YYYY-MM-DDThh:mm:ssz\", \"{zone}\"), val: {}}}, @{})",
        sample.value,
        strip_ref_prefix(&sample.id),
    )
}

/// Build a history-write expression grid, one quoted expression per sample.
///
/// Expression grids are evaluated rather than committed, so the header
/// carries no commit verb.
pub fn his_write<'a, I>(samples: I) -> Grid
where
    I: IntoIterator<Item = &'a Sample>,
{
    let mut grid = Grid::new(vec!["expr"]);
    for sample in samples {
        grid.push_row(vec![Cell::Str(his_write_expr(sample))]);
    }
    grid
}
