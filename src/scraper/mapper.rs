//! Table rows → typed `PlayerStatRecord`s, driven by a per-site `StatTableSpec`.

use regex::Regex;
use tracing::{debug, trace};

use super::cleaner::{coerce, normalize_ws};
use super::table::{Cell, HeaderRow, RawTable, TableLocator};
use crate::models::{PlayerStatRecord, Sport};

/// Where a value lives in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    /// Disambiguated header label (`Att.1` is the second `Att` column)
    Header(&'static str),
    Position(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMap {
    pub field: &'static str,
    pub column: Column,
}

pub const fn field(field: &'static str, label: &'static str) -> FieldMap {
    FieldMap { field, column: Column::Header(label) }
}

pub const fn field_at(field: &'static str, index: usize) -> FieldMap {
    FieldMap { field, column: Column::Position(index) }
}

/// Which team a stat line belongs to.
#[derive(Debug, Clone)]
pub enum TeamSource {
    /// First capture group of the table id: `box-(LAL)-game-basic`
    IdCapture(Regex),
    /// A per-row column ("Tm", "School"); falls back to the caption
    Column(Column),
}

/// Everything the generic mapper needs to know about one kind of stats table.
#[derive(Debug, Clone)]
pub struct StatTableSpec {
    pub locator: TableLocator,
    pub header: HeaderRow,
    pub name: Column,
    pub team: TeamSource,
    pub stat_type: Option<&'static str>,
    pub fields: Vec<FieldMap>,
    /// Substrings that mark a non-data row when found in any cell
    pub skip_markers: &'static [&'static str],
    /// Rows with fewer cells are layout rows
    pub min_cells: usize,
}

/// Map every data row of `table` to a stat record for `game_id`.
/// Filtered rows and unknown fields are dropped, never errors.
pub fn map_table(
    sport: Sport,
    spec: &StatTableSpec,
    table: &RawTable,
    game_id: &str,
) -> Vec<PlayerStatRecord> {
    let table_team = resolve_table_team(&spec.team, table);
    let name_label = match spec.name {
        Column::Header(label) => Some(label),
        Column::Position(_) => None,
    };

    let mut out = Vec::new();
    for row in &table.rows {
        if row.len() < spec.min_cells {
            trace!("short row ({} cells) skipped", row.len());
            continue;
        }

        let Some(name) = cell(table, row, spec.name).map(normalize_ws).filter(|n| !n.is_empty())
        else {
            continue;
        };

        // Repeated header mid-table
        if name_label == Some(name.as_str()) || table.headers.first() == Some(&name) {
            continue;
        }

        if let Some(marker) = find_marker(row, spec.skip_markers) {
            trace!("{}: skipped {:?} row", name, marker);
            continue;
        }

        let team = match &spec.team {
            TeamSource::Column(col) => cell(table, row, *col)
                .map(normalize_ws)
                .filter(|t| !t.is_empty())
                .or_else(|| table_team.clone()),
            _ => table_team.clone(),
        }
        .unwrap_or_else(|| "Unknown".to_string());

        let mut fields = Vec::with_capacity(spec.fields.len());
        for fm in &spec.fields {
            let Some(def) = sport.field_def(fm.field) else {
                debug!("{} has no stat field {:?}", sport, fm.field);
                continue;
            };
            fields.push((def.name, coerce(def.kind, cell(table, row, fm.column))));
        }

        out.push(PlayerStatRecord {
            game_id: game_id.to_string(),
            player_name: name,
            team,
            stat_type: spec.stat_type.map(str::to_string),
            fields,
        });
    }

    out
}

fn cell<'t>(table: &RawTable, row: &'t [Cell], column: Column) -> Option<&'t str> {
    let idx = match column {
        Column::Header(label) => table.column(label)?,
        Column::Position(i) => i,
    };
    row.get(idx).map(|c| c.text.as_str())
}

fn find_marker(row: &[Cell], markers: &[&'static str]) -> Option<&'static str> {
    markers
        .iter()
        .copied()
        .find(|m| row.iter().any(|c| c.text.contains(m)))
}

fn resolve_table_team(source: &TeamSource, table: &RawTable) -> Option<String> {
    match source {
        TeamSource::IdCapture(re) => table
            .id
            .as_deref()
            .and_then(|id| re.captures(id))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .or_else(|| table.caption.clone()),
        TeamSource::Column(_) => table.caption.clone(),
    }
}
