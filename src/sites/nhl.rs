//! hockey-reference.com: season game list filtered to a date range.

use chrono::NaiveDateTime;
use scraper::Html;

use super::sports_reference::parse_scorebox;
use super::{absolute_url, page_id, regex, wrong_window, GameTask, SiteAdapter};
use crate::models::{GameRecord, Sport, TeamRecord, Window};
use crate::scraper::ScrapeError;
use crate::scraper::cleaner::date_from_game_id;
use crate::scraper::mapper::{field, Column, StatTableSpec, TeamSource};
use crate::scraper::table::{selector, HeaderRow, TableLocator};

const SKATER_TABLE: &str = r"^(\w+)_skaters$";

// skater tables close with an upper-case "TOTAL" row
const SKATER_MARKERS: &[&str] = &["TOTAL", "Team Total", "Did Not Play"];

pub struct NhlAdapter {
    base_url: String,
    tables: Vec<StatTableSpec>,
}

impl NhlAdapter {
    pub fn new(base_url: String) -> Result<Self, ScrapeError> {
        let skaters = StatTableSpec {
            locator: TableLocator::IdPattern(regex(SKATER_TABLE)?),
            header: HeaderRow::Auto,
            name: Column::Header("Player"),
            team: TeamSource::IdCapture(regex(SKATER_TABLE)?),
            stat_type: None,
            fields: vec![
                field("position", "Pos"),
                field("goals", "G"),
                field("assists", "A"),
                field("points", "PTS"),
                field("plus_minus", "+/-"),
                field("pim", "PIM"),
                field("shots", "S"),
                field("time_on_ice", "TOI"),
            ],
            skip_markers: SKATER_MARKERS,
            min_cells: 2,
        };
        Ok(Self { base_url, tables: vec![skaters] })
    }
}

impl SiteAdapter for NhlAdapter {
    fn sport(&self) -> Sport {
        Sport::Nhl
    }

    fn hides_tables(&self) -> bool {
        true
    }

    fn index_url(&self, window: &Window) -> Result<String, ScrapeError> {
        match window {
            Window::DateRange { from, to, .. } if from > to => Err(ScrapeError::InvalidWindow(
                format!("empty date range {}..{}", from, to),
            )),
            Window::DateRange { season, .. } => {
                Ok(format!("{}/leagues/NHL_{}_games.html", self.base_url, season))
            }
            other => Err(wrong_window(Sport::Nhl, "season + date range", other)),
        }
    }

    fn discover(
        &self,
        window: &Window,
        index_html: &str,
        _now: NaiveDateTime,
    ) -> Result<Vec<GameTask>, ScrapeError> {
        let Window::DateRange { from, to, .. } = window else {
            return Err(wrong_window(Sport::Nhl, "season + date range", window));
        };

        let doc = Html::parse_document(index_html);
        let sel = selector(r#"table#games a[href*="/boxscores/"]"#)
            .ok_or_else(|| ScrapeError::Parse("games selector".into()))?;

        let mut tasks: Vec<GameTask> = Vec::new();
        for a in doc.select(&sel) {
            let Some(href) = a.value().attr("href") else { continue };
            let (Some(game_id), Some(url)) = (page_id(href), absolute_url(&self.base_url, href))
            else {
                continue;
            };
            let Some(date) = date_from_game_id(&game_id) else { continue };
            if date < *from || date > *to || tasks.iter().any(|t| t.game_id == game_id) {
                continue;
            }
            tasks.push(GameTask { game_id, url: Some(url), seed: None });
        }
        Ok(tasks)
    }

    fn parse_game(
        &self,
        task: &GameTask,
        doc: &Html,
        window: &Window,
        now: NaiveDateTime,
    ) -> Result<(GameRecord, Vec<TeamRecord>), ScrapeError> {
        let sb = parse_scorebox(doc)?;
        if sb.home_score.is_none() || sb.away_score.is_none() {
            return Err(ScrapeError::Parse(format!("{}: no final score yet", task.game_id)));
        }
        let date = date_from_game_id(&task.game_id)
            .or(sb.date)
            .ok_or_else(|| ScrapeError::Parse(format!("{}: no game date", task.game_id)))?;

        let mut game = GameRecord {
            game_id: task.game_id.clone(),
            date,
            home_team: sb.home.name.clone(),
            away_team: sb.away.name.clone(),
            home_score: sb.home_score,
            away_score: sb.away_score,
            winner: None,
            season: window.season_tag(),
            week: None,
            league: Some("NHL".to_string()),
            scraped_at: now,
        };
        game.winner = game.winner_by_score();

        Ok((game, vec![sb.home, sb.away]))
    }

    fn stat_tables(&self) -> &[StatTableSpec] {
        &self.tables
    }
}
