//! pro-football-reference.com: week page → box scores, `player_offense` table.

use chrono::NaiveDateTime;
use scraper::Html;

use super::sports_reference::{parse_scorebox, SKIP_MARKERS};
use super::{absolute_url, page_id, wrong_window, GameTask, SiteAdapter};
use crate::models::{GameRecord, Sport, TeamRecord, Window};
use crate::scraper::ScrapeError;
use crate::scraper::cleaner::date_from_game_id;
use crate::scraper::mapper::{field, Column, StatTableSpec, TeamSource};
use crate::scraper::table::{selector, HeaderRow, TableLocator};

pub struct NflAdapter {
    base_url: String,
    tables: Vec<StatTableSpec>,
}

impl NflAdapter {
    pub fn new(base_url: String) -> Result<Self, ScrapeError> {
        // Passing | Rushing | Receiving groups repeat Att / Yds / TD, so the
        // later groups are addressed by their pandas-style suffix.
        // Cmp Att Yds TD Int Sk Yds.1 Lng Rate | Att.1 Yds.2 TD.1 Lng.1 | Tgt Rec Yds.3 TD.2 Lng.2
        let offense = StatTableSpec {
            locator: TableLocator::Id("player_offense"),
            header: HeaderRow::Auto,
            name: Column::Header("Player"),
            team: TeamSource::Column(Column::Header("Tm")),
            stat_type: None,
            fields: vec![
                field("pass_completions", "Cmp"),
                field("pass_attempts", "Att"),
                field("pass_yards", "Yds"),
                field("pass_touchdowns", "TD"),
                field("interceptions", "Int"),
                field("rush_attempts", "Att.1"),
                field("rush_yards", "Yds.2"),
                field("rush_touchdowns", "TD.1"),
                field("targets", "Tgt"),
                field("receptions", "Rec"),
                field("receiving_yards", "Yds.3"),
                field("receiving_touchdowns", "TD.2"),
            ],
            skip_markers: SKIP_MARKERS,
            min_cells: 2,
        };
        Ok(Self { base_url, tables: vec![offense] })
    }
}

impl SiteAdapter for NflAdapter {
    fn sport(&self) -> Sport {
        Sport::Nfl
    }

    fn hides_tables(&self) -> bool {
        true
    }

    fn index_url(&self, window: &Window) -> Result<String, ScrapeError> {
        match window {
            Window::Week { season, week } if *week >= 1 => {
                Ok(format!("{}/years/{}/week_{}.htm", self.base_url, season, week))
            }
            Window::Week { week, .. } => Err(ScrapeError::InvalidWindow(format!("week {}", week))),
            other => Err(wrong_window(Sport::Nfl, "season + week", other)),
        }
    }

    fn discover(
        &self,
        _window: &Window,
        index_html: &str,
        _now: NaiveDateTime,
    ) -> Result<Vec<GameTask>, ScrapeError> {
        let doc = Html::parse_document(index_html);
        let sel = selector("td.gamelink a[href]")
            .ok_or_else(|| ScrapeError::Parse("gamelink selector".into()))?;

        let mut tasks: Vec<GameTask> = Vec::new();
        for a in doc.select(&sel) {
            let Some(href) = a.value().attr("href") else { continue };
            if !href.contains("/boxscores/") {
                continue;
            }
            let (Some(game_id), Some(url)) = (page_id(href), absolute_url(&self.base_url, href))
            else {
                continue;
            };
            if !tasks.iter().any(|t| t.game_id == game_id) {
                tasks.push(GameTask { game_id, url: Some(url), seed: None });
            }
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
        let week = match window {
            Window::Week { week, .. } => i32::try_from(*week).ok(),
            _ => None,
        };

        let mut game = GameRecord {
            game_id: task.game_id.clone(),
            date,
            home_team: sb.home.name.clone(),
            away_team: sb.away.name.clone(),
            home_score: sb.home_score,
            away_score: sb.away_score,
            winner: None,
            season: window.season_tag(),
            week,
            league: Some("NFL".to_string()),
            scraped_at: now,
        };
        game.winner = game.winner_by_score();

        Ok((game, vec![sb.home, sb.away]))
    }

    fn stat_tables(&self) -> &[StatTableSpec] {
        &self.tables
    }
}
