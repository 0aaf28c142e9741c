//! Per-site adapters for the generic pipeline.
//!
//! An adapter only knows *where* things are on its site: how to build the
//! index URL for a window, how to turn the index page into game tasks, how to
//! read game metadata, and which stat tables to map. Fetching, pacing,
//! unmasking, row mapping and persistence are shared.

pub mod cfb;
pub mod lol;
pub mod nba;
pub mod nfl;
pub mod nhl;
pub mod sports_reference;

use chrono::NaiveDateTime;
use regex::Regex;
use scraper::Html;
use tracing::debug;

use crate::config::SitesConfig;
use crate::models::{GameRecord, PlayerStatRecord, ScrapedGame, Sport, TeamRecord, Window};
use crate::scraper::ScrapeError;
use crate::scraper::mapper::{map_table, StatTableSpec};
use crate::scraper::table::{locate, RawTable};
use crate::scraper::unmask::unmask_comments;

/// One game to scrape, discovered from an index page.
#[derive(Debug, Clone, PartialEq)]
pub struct GameTask {
    /// Natural key, known before the game page is fetched
    pub game_id: String,
    /// Game page; `None` when the index row already holds everything
    pub url: Option<String>,
    /// Game row read straight from the index (CFB schedule)
    pub seed: Option<GameRecord>,
}

pub trait SiteAdapter: Send + Sync {
    fn sport(&self) -> Sport;

    /// Sites that park tables inside HTML comments.
    fn hides_tables(&self) -> bool {
        false
    }

    /// Index/schedule page for the window; rejects windows the site can't serve.
    fn index_url(&self, window: &Window) -> Result<String, ScrapeError>;

    fn discover(
        &self,
        window: &Window,
        index_html: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<GameTask>, ScrapeError>;

    /// Game row + participating teams from a game page.
    fn parse_game(
        &self,
        task: &GameTask,
        _doc: &Html,
        _window: &Window,
        _now: NaiveDateTime,
    ) -> Result<(GameRecord, Vec<TeamRecord>), ScrapeError> {
        seeded(task)
    }

    fn stat_tables(&self) -> &[StatTableSpec];
}

pub fn adapter_for(sport: Sport, sites: &SitesConfig) -> Result<Box<dyn SiteAdapter>, ScrapeError> {
    let base = sites.for_sport(sport).base_url.trim_end_matches('/').to_string();
    Ok(match sport {
        Sport::Nba => Box::new(nba::NbaAdapter::new(base)?),
        Sport::Nfl => Box::new(nfl::NflAdapter::new(base)?),
        Sport::Nhl => Box::new(nhl::NhlAdapter::new(base)?),
        Sport::Cfb => Box::new(cfb::CfbAdapter::new(base)?),
        Sport::Lol => Box::new(lol::LolAdapter::new(base)?),
    })
}

/// Parse a game page into everything that gets committed for it.
pub fn scrape_page(
    adapter: &dyn SiteAdapter,
    task: &GameTask,
    html: &str,
    window: &Window,
    now: NaiveDateTime,
) -> Result<ScrapedGame, ScrapeError> {
    let html = if adapter.hides_tables() {
        unmask_comments(html)
    } else {
        html.into()
    };
    let doc = Html::parse_document(&html);

    let (game, teams) = adapter.parse_game(task, &doc, window, now)?;
    let stats = extract_stats(adapter.sport(), adapter.stat_tables(), &doc, &game.game_id);

    Ok(ScrapedGame { game, teams, stats })
}

/// Every stat line of every table the `StatTableSpec`s locate. A missing table is not an error.
pub fn extract_stats(
    sport: Sport,
    specs: &[StatTableSpec],
    doc: &Html,
    game_id: &str,
) -> Vec<PlayerStatRecord> {
    let mut stats = Vec::new();
    for spec in specs {
        let tables = locate(doc, &spec.locator);
        if tables.is_empty() {
            debug!("{}: no {:?} table", game_id, spec.locator);
        }
        for el in tables {
            let raw = RawTable::from_element(el, spec.header);
            stats.extend(map_table(sport, spec, &raw, game_id));
        }
    }
    stats
}

fn seeded(task: &GameTask) -> Result<(GameRecord, Vec<TeamRecord>), ScrapeError> {
    let game = task
        .seed
        .clone()
        .ok_or_else(|| ScrapeError::Parse(format!("no game metadata for {}", task.game_id)))?;
    let teams = vec![
        TeamRecord { name: game.home_team.clone(), abbreviation: None },
        TeamRecord { name: game.away_team.clone(), abbreviation: None },
    ];
    Ok((game, teams))
}

// ── Shared helpers ────────────────────────────────────────────────────────────

pub(crate) fn regex(pattern: &str) -> Result<Regex, ScrapeError> {
    Regex::new(pattern).map_err(|e| ScrapeError::Parse(format!("regex {:?}: {}", pattern, e)))
}

/// Resolve a possibly-relative link against the site base.
pub(crate) fn absolute_url(base: &str, href: &str) -> Option<String> {
    let base = url::Url::parse(&format!("{}/", base.trim_end_matches('/'))).ok()?;
    base.join(href).ok().map(String::from)
}

/// Last path segment without its extension: ".../202501150LAL.html" → "202501150LAL".
pub(crate) fn page_id(href: &str) -> Option<String> {
    let seg = href.trim_end_matches('/').rsplit('/').next()?;
    let id = seg.split('.').next()?.trim();
    (!id.is_empty()).then(|| id.to_string())
}

pub(crate) fn wrong_window(sport: Sport, expected: &str, window: &Window) -> ScrapeError {
    ScrapeError::InvalidWindow(format!("{} expects {}, got {}", sport, expected, window))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_url() {
        assert_eq!(
            absolute_url("https://www.basketball-reference.com", "/boxscores/202501150LAL.html")
                .as_deref(),
            Some("https://www.basketball-reference.com/boxscores/202501150LAL.html")
        );
        assert_eq!(
            absolute_url("https://www.sports-reference.com/cfb", "/cfb/boxscores/x.html").as_deref(),
            Some("https://www.sports-reference.com/cfb/boxscores/x.html")
        );
        assert_eq!(
            absolute_url("https://gol.gg", "../game/stats/123/page-game/").as_deref(),
            Some("https://gol.gg/game/stats/123/page-game/")
        );
    }

    #[test]
    fn test_page_id() {
        assert_eq!(page_id("/boxscores/202501150LAL.html").as_deref(), Some("202501150LAL"));
        assert_eq!(page_id("/boxscores/202409050kan.htm").as_deref(), Some("202409050kan"));
        assert_eq!(page_id("/"), None);
    }

    #[test]
    fn test_seed_required_by_default() {
        let task = GameTask { game_id: "x".into(), url: None, seed: None };
        assert!(matches!(seeded(&task), Err(ScrapeError::Parse(_))));
    }
}
