//! sports-reference.com/cfb: one schedule page per season, filtered to a week.
//! The schedule row carries the whole game; the box score (when linked) only
//! adds player stats.

use chrono::NaiveDateTime;
use scraper::Html;
use tracing::debug;

use super::sports_reference::SKIP_MARKERS;
use super::{absolute_url, regex, wrong_window, GameTask, SiteAdapter};
use crate::models::{GameRecord, Sport, Window};
use crate::scraper::ScrapeError;
use crate::scraper::cleaner::{normalize_ws, parse_count, parse_date, slug};
use crate::scraper::mapper::{field, Column, FieldMap, StatTableSpec, TeamSource};
use crate::scraper::table::{locate, Cell, HeaderRow, RawTable, TableLocator};

pub struct CfbAdapter {
    base_url: String,
    tables: Vec<StatTableSpec>,
}

impl CfbAdapter {
    pub fn new(base_url: String) -> Result<Self, ScrapeError> {
        let spec = |pattern: &str, stat_type: &'static str, fields: Vec<FieldMap>| {
            Ok::<_, ScrapeError>(StatTableSpec {
                locator: TableLocator::IdPattern(regex(pattern)?),
                header: HeaderRow::Auto,
                name: Column::Header("Player"),
                team: TeamSource::Column(Column::Header("School")),
                stat_type: Some(stat_type),
                fields,
                skip_markers: SKIP_MARKERS,
                min_cells: 2,
            })
        };

        // Anchored: the `all_<id>` wrapper divs carry the same words.
        // "rushing_and_receiving" is read as rushing; its first Att/Yds/TD
        // group is the rushing one.
        let tables = vec![
            spec(
                "^passing$",
                "passing",
                vec![
                    field("pass_cmp", "Cmp"),
                    field("pass_att", "Att"),
                    field("pass_yds", "Yds"),
                    field("pass_td", "TD"),
                    field("pass_int", "Int"),
                ],
            )?,
            spec(
                "^rushing",
                "rushing",
                vec![field("rush_att", "Att"), field("rush_yds", "Yds"), field("rush_td", "TD")],
            )?,
            spec(
                "^receiving",
                "receiving",
                vec![
                    field("rec_tgt", "Tgt"),
                    field("rec_rec", "Rec"),
                    field("rec_yds", "Yds"),
                    field("rec_td", "TD"),
                ],
            )?,
            spec(
                "^defense$",
                "defense",
                vec![field("def_tackles", "Tkl"), field("def_sacks", "Sk"), field("def_int", "Int")],
            )?,
        ];

        Ok(Self { base_url, tables })
    }

    fn row_to_task(
        &self,
        table: &RawTable,
        row: &[Cell],
        year: i32,
        week: u32,
        now: NaiveDateTime,
    ) -> Option<GameTask> {
        let get = |labels: &[&str]| labels.iter().find_map(|l| table.column(l)).and_then(|i| row.get(i));

        let winner = get(&["Winner", "W"]).map(|c| strip_rank(&c.text)).filter(|s| !s.is_empty())?;
        let loser = get(&["Loser", "L"]).map(|c| strip_rank(&c.text)).filter(|s| !s.is_empty())?;
        let winner_pts = get(&["Pts", "PtsW"]).and_then(|c| parse_count(&c.text));
        let loser_pts = get(&["Pts.1", "PtsL"]).and_then(|c| parse_count(&c.text));

        let date_cell = get(&["Date"]);
        let date = date_cell
            .and_then(|c| parse_date(&c.text))
            .unwrap_or_else(|| now.date());
        let url = date_cell
            .and_then(|c| c.href.as_deref())
            .filter(|h| h.contains("/boxscores/"))
            .and_then(|h| absolute_url(&self.base_url, h));

        // Unlabelled "@" column: the winner played away
        let winner_away = row.iter().any(|c| c.text == "@")
            || get(&["Notes"]).is_some_and(|c| c.text.contains('@'));

        let (home_team, away_team, home_score, away_score) = if winner_away {
            (loser.clone(), winner.clone(), loser_pts, winner_pts)
        } else {
            (winner.clone(), loser.clone(), winner_pts, loser_pts)
        };

        let game_id = slug(&format!("{}_{}_{}_{}", year, week, winner, loser));
        let seed = GameRecord {
            game_id: game_id.clone(),
            date,
            home_team,
            away_team,
            home_score,
            away_score,
            winner: Some(winner),
            season: year.to_string(),
            week: i32::try_from(week).ok(),
            league: Some("NCAA".to_string()),
            scraped_at: now,
        };

        Some(GameTask { game_id, url, seed: Some(seed) })
    }
}

/// "(3) Georgia" → "Georgia"
fn strip_rank(s: &str) -> String {
    let s = normalize_ws(s);
    match s.strip_prefix('(').and_then(|rest| rest.split_once(')')) {
        Some((rank, name)) if rank.chars().all(|c| c.is_ascii_digit()) => name.trim().to_string(),
        _ => s,
    }
}

impl SiteAdapter for CfbAdapter {
    fn sport(&self) -> Sport {
        Sport::Cfb
    }

    fn hides_tables(&self) -> bool {
        true
    }

    fn index_url(&self, window: &Window) -> Result<String, ScrapeError> {
        match window {
            Window::Week { season, week } if *week >= 1 => {
                Ok(format!("{}/years/{}-schedule.html", self.base_url, season))
            }
            Window::Week { week, .. } => Err(ScrapeError::InvalidWindow(format!("week {}", week))),
            other => Err(wrong_window(Sport::Cfb, "year + week", other)),
        }
    }

    fn discover(
        &self,
        window: &Window,
        index_html: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<GameTask>, ScrapeError> {
        let Window::Week { season, week } = window else {
            return Err(wrong_window(Sport::Cfb, "year + week", window));
        };

        let doc = Html::parse_document(index_html);
        let Some(el) = locate(&doc, &TableLocator::Id("schedule")).into_iter().next() else {
            return Err(ScrapeError::Parse(format!("no schedule table for {}", season)));
        };
        let table = RawTable::from_element(el, HeaderRow::Auto);

        let week_col = table.column("Wk");
        if week_col.is_none() {
            debug!("schedule has no Wk column, taking every row");
        }

        let mut tasks: Vec<GameTask> = Vec::new();
        for row in &table.rows {
            if let Some(i) = week_col {
                let row_week = row.get(i).and_then(|c| parse_count(&c.text));
                if row_week != Some(i64::from(*week)) {
                    continue;
                }
            }
            let Some(task) = self.row_to_task(&table, row, *season, *week, now) else {
                continue;
            };
            if !tasks.iter().any(|t| t.game_id == task.game_id) {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    fn stat_tables(&self) -> &[StatTableSpec] {
        &self.tables
    }
}
