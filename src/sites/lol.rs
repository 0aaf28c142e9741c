//! gol.gg: tournament match list → per-game stats pages.

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use scraper::Html;

use super::{regex, wrong_window, GameTask, SiteAdapter};
use crate::models::{GameRecord, Sport, TeamRecord, Window};
use crate::scraper::ScrapeError;
use crate::scraper::cleaner::{normalize_ws, parse_count};
use crate::scraper::mapper::{field_at, Column, StatTableSpec, TeamSource};
use crate::scraper::table::{element_text, locate, selector, HeaderRow, TableLocator};

/// Tournaments scraped when none is named.
pub const DEFAULT_TOURNAMENTS: &[&str] = &["LCS", "LEC", "LCK", "LPL"];
pub const DEFAULT_SEASON: &str = "2026-spring";

pub struct LolAdapter {
    base_url: String,
    game_link: Regex,
    title_split: Regex,
    tables: Vec<StatTableSpec>,
}

impl LolAdapter {
    pub fn new(base_url: String) -> Result<Self, ScrapeError> {
        // team | player | champion | K D A | CS gold damage | ...
        let players = StatTableSpec {
            locator: TableLocator::Class("playersInfosLine"),
            header: HeaderRow::None,
            name: Column::Position(1),
            team: TeamSource::Column(Column::Position(0)),
            stat_type: None,
            fields: vec![
                field_at("champion", 2),
                field_at("kills", 3),
                field_at("deaths", 4),
                field_at("assists", 5),
                field_at("cs", 6),
                field_at("gold", 7),
                field_at("damage", 8),
            ],
            skip_markers: &[],
            min_cells: 10,
        };

        Ok(Self {
            base_url,
            game_link: regex(r"/game/stats/(\d+)/")?,
            title_split: regex(r"(?i)\s+vs\.?\s+")?,
            tables: vec![players],
        })
    }

    pub fn game_url(&self, game_id: &str) -> String {
        format!("{}/game/stats/{}/page-game/", self.base_url, game_id)
    }

    fn first_text(doc: &Html, css: &str) -> Option<String> {
        selector(css)
            .and_then(|sel| doc.select(&sel).next())
            .map(|el| element_text(&el))
            .filter(|t| !t.is_empty())
    }
}

impl SiteAdapter for LolAdapter {
    fn sport(&self) -> Sport {
        Sport::Lol
    }

    fn index_url(&self, window: &Window) -> Result<String, ScrapeError> {
        match window {
            Window::Tournament { id, .. } if !id.trim().is_empty() => Ok(format!(
                "{}/tournament/tournament-matchlist/{}/",
                self.base_url,
                id.trim()
            )),
            Window::Tournament { .. } => Err(ScrapeError::InvalidWindow("empty tournament id".into())),
            other => Err(wrong_window(Sport::Lol, "tournament + season", other)),
        }
    }

    fn discover(
        &self,
        window: &Window,
        index_html: &str,
        _now: NaiveDateTime,
    ) -> Result<Vec<GameTask>, ScrapeError> {
        let doc = Html::parse_document(index_html);
        let Some(list) = locate(&doc, &TableLocator::Class("table_list")).into_iter().next() else {
            return Err(ScrapeError::Parse(format!("no match list for {}", window)));
        };
        let a_sel = selector("a[href]").ok_or_else(|| ScrapeError::Parse("link selector".into()))?;

        let mut tasks: Vec<GameTask> = Vec::new();
        for a in list.select(&a_sel) {
            let Some(game_id) = a
                .value()
                .attr("href")
                .and_then(|href| self.game_link.captures(href))
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
            else {
                continue;
            };
            if tasks.iter().any(|t| t.game_id == game_id) {
                continue;
            }
            let url = Some(self.game_url(&game_id));
            tasks.push(GameTask { game_id, url, seed: None });
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
        let title = Self::first_text(doc, "h1")
            .ok_or_else(|| ScrapeError::Parse(format!("{}: no title", task.game_id)))?;
        let mut sides = self.title_split.splitn(&title, 2).map(normalize_ws);
        let (Some(team_a), Some(team_b)) = (sides.next(), sides.next()) else {
            return Err(ScrapeError::Parse(format!("{}: no teams in {:?}", task.game_id, title)));
        };

        let scores: Vec<Option<i64>> = selector("div.score")
            .map(|sel| doc.select(&sel).map(|el| parse_count(&element_text(&el))).collect())
            .unwrap_or_default();
        let (score_a, score_b) = match scores.as_slice() {
            [a, b, ..] => (*a, *b),
            _ => (None, None),
        };

        // Capture date when the page carries none
        let date = Self::first_text(doc, "div.game-date")
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok())
            .unwrap_or_else(|| now.date());

        let league = match window {
            Window::Tournament { id, .. } => Some(id.clone()),
            _ => None,
        };

        let mut game = GameRecord {
            game_id: task.game_id.clone(),
            date,
            home_team: team_a.clone(),
            away_team: team_b.clone(),
            home_score: score_a,
            away_score: score_b,
            winner: None,
            season: window.season_tag(),
            week: None,
            league,
            scraped_at: now,
        };
        game.winner = game.winner_by_score();

        let teams = vec![
            TeamRecord { name: team_a, abbreviation: None },
            TeamRecord { name: team_b, abbreviation: None },
        ];
        Ok((game, teams))
    }

    fn stat_tables(&self) -> &[StatTableSpec] {
        &self.tables
    }
}
