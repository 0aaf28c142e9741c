//! CSV export of stored player stat lines.

use crate::models::Sport;
use crate::storage::{Repository, StatRow};
use anyhow::{Context, Result};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use tracing::info;

const FIXED_COLUMNS: [&str; 4] = ["game_id", "player_name", "team", "stat_type"];

/// Header row for a sport: fixed columns, then the sport's stat fields.
pub fn headers(sport: Sport) -> Vec<&'static str> {
    FIXED_COLUMNS
        .into_iter()
        .chain(sport.stat_fields().iter().map(|f| f.name))
        .collect()
}

/// Write stat rows as CSV; absent values are empty cells.
pub fn write_stat_rows<W: Write>(sport: Sport, rows: &[StatRow], out: W) -> Result<usize> {
    let columns = headers(sport);
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(&columns)?;

    for row in rows {
        let record: Vec<String> = columns
            .iter()
            .map(|c| match row.get(*c) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            })
            .collect();
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(rows.len())
}

pub fn export_player_stats(repo: &Repository, sport: Sport, path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }
    let rows = repo.stat_rows(sport, None)?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("Could not create {:?}", path))?;
    let n = write_stat_rows(sport, &rows, file)?;
    info!("{}: {} stat rows written to {:?}", sport, n, path);
    Ok(n)
}
