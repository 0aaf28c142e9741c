//! basketball-reference.com: month schedule → box score pages.

use chrono::NaiveDateTime;
use scraper::Html;

use super::sports_reference::{parse_scorebox, SKIP_MARKERS};
use super::{absolute_url, page_id, regex, wrong_window, GameTask, SiteAdapter};
use crate::models::{month_slug, GameRecord, Sport, TeamRecord, Window};
use crate::scraper::ScrapeError;
use crate::scraper::cleaner::date_from_game_id;
use crate::scraper::mapper::{field, Column, StatTableSpec, TeamSource};
use crate::scraper::table::{selector, HeaderRow, TableLocator};

const BOX_TABLE: &str = r"^box-(\w+)-game-basic$";

pub struct NbaAdapter {
    base_url: String,
    tables: Vec<StatTableSpec>,
}

impl NbaAdapter {
    pub fn new(base_url: String) -> Result<Self, ScrapeError> {
        let basic = StatTableSpec {
            locator: TableLocator::IdPattern(regex(BOX_TABLE)?),
            header: HeaderRow::Auto,
            // header cell reads "Starters", not "Player"
            name: Column::Position(0),
            team: TeamSource::IdCapture(regex(BOX_TABLE)?),
            stat_type: None,
            fields: vec![
                field("minutes", "MP"),
                field("points", "PTS"),
                field("rebounds", "TRB"),
                field("assists", "AST"),
                field("steals", "STL"),
                field("blocks", "BLK"),
                field("turnovers", "TOV"),
                field("fg_made", "FG"),
                field("fg_attempted", "FGA"),
                field("three_made", "3P"),
                field("three_attempted", "3PA"),
                field("ft_made", "FT"),
                field("ft_attempted", "FTA"),
            ],
            skip_markers: SKIP_MARKERS,
            min_cells: 2,
        };
        Ok(Self { base_url, tables: vec![basic] })
    }

    pub fn month_url(&self, season: i32, month: u32) -> Option<String> {
        let slug = month_slug(month)?;
        Some(format!("{}/leagues/NBA_{}_games-{}.html", self.base_url, season, slug))
    }
}

impl SiteAdapter for NbaAdapter {
    fn sport(&self) -> Sport {
        Sport::Nba
    }

    fn hides_tables(&self) -> bool {
        true
    }

    fn index_url(&self, window: &Window) -> Result<String, ScrapeError> {
        match window {
            Window::Month { season, month } => self
                .month_url(*season, *month)
                .ok_or_else(|| ScrapeError::InvalidWindow(format!("month {} out of range", month))),
            other => Err(wrong_window(Sport::Nba, "season + month", other)),
        }
    }

    fn discover(
        &self,
        _window: &Window,
        index_html: &str,
        _now: NaiveDateTime,
    ) -> Result<Vec<GameTask>, ScrapeError> {
        let doc = Html::parse_document(index_html);
        let sel = selector(r#"td[data-stat="box_score_text"] a[href]"#)
            .ok_or_else(|| ScrapeError::Parse("box score selector".into()))?;

        let mut tasks: Vec<GameTask> = Vec::new();
        for a in doc.select(&sel) {
            let Some(href) = a.value().attr("href") else { continue };
            let (Some(game_id), Some(url)) = (page_id(href), absolute_url(&self.base_url, href))
            else {
                continue;
            };
            if tasks.iter().any(|t| t.game_id == game_id) {
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
            league: Some("NBA".to_string()),
            scraped_at: now,
        };
        game.winner = game.winner_by_score();

        Ok((game, vec![sb.home, sb.away]))
    }

    fn stat_tables(&self) -> &[StatTableSpec] {
        &self.tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sites::scrape_page;
    use crate::sites::sports_reference::fixtures::nba_box_score;
    use chrono::{NaiveDate, Utc};

    const BASE: &str = "https://www.basketball-reference.com";

    fn adapter() -> NbaAdapter {
        NbaAdapter::new(BASE.to_string()).unwrap()
    }

    #[test]
    fn test_index_url() {
        let a = adapter();
        let w = Window::Month { season: 2025, month: 1 };
        assert_eq!(
            a.index_url(&w).unwrap(),
            "https://www.basketball-reference.com/leagues/NBA_2025_games-january.html"
        );
        let bad = Window::Week { season: 2025, week: 3 };
        assert!(matches!(a.index_url(&bad), Err(ScrapeError::InvalidWindow(_))));
    }

    #[test]
    fn test_discover_box_score_links() {
        let html = r#"<table id="schedule"><tbody>
          <tr><th>Wed, Jan 15, 2025</th><td data-stat="box_score_text"><a href="/boxscores/202501150LAL.html">Box Score</a></td></tr>
          <tr><th>Wed, Jan 15, 2025</th><td data-stat="box_score_text"><a href="/boxscores/202501150NYK.html">Box Score</a></td></tr>
          <tr><th>Thu, Jan 16, 2025</th><td data-stat="box_score_text"></td></tr>
        </tbody></table>"#;
        let w = Window::Month { season: 2025, month: 1 };
        let tasks = adapter().discover(&w, html, Utc::now().naive_utc()).unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].game_id, "202501150LAL");
        assert_eq!(
            tasks[0].url.as_deref(),
            Some("https://www.basketball-reference.com/boxscores/202501150LAL.html")
        );
    }

    #[test]
    fn test_scrape_box_score_page() {
        let a = adapter();
        let task = GameTask {
            game_id: "202501150LAL".into(),
            url: Some(format!("{}/boxscores/202501150LAL.html", BASE)),
            seed: None,
        };
        let w = Window::Month { season: 2025, month: 1 };
        let page = scrape_page(&a, &task, &nba_box_score(true), &w, Utc::now().naive_utc()).unwrap();

        assert_eq!(page.game.date, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        assert_eq!(page.game.home_team, "Los Angeles Lakers");
        assert_eq!(page.game.winner.as_deref(), Some("Los Angeles Lakers"));
        assert_eq!(page.game.season, "2025");
        assert_eq!(page.stats.len(), 2);
        assert!(page.stats.iter().all(|s| s.team == "LAL"));
        assert_eq!(page.stats[0].count("points"), Some(30));
        // columns absent from the table stay unknown
        assert_eq!(page.stats[0].count("steals"), None);
        assert_eq!(page.teams.len(), 2);
    }
}
