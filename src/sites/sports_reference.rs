//! Markup shared by the sports-reference family (basketball-, pro-football-,
//! hockey-reference): the `div.scorebox` header of every box score page.

use chrono::NaiveDate;
use scraper::{ElementRef, Html};

use crate::models::TeamRecord;
use crate::scraper::ScrapeError;
use crate::scraper::cleaner::{parse_count, parse_date};
use crate::scraper::table::{element_text, locate, selector, TableLocator};

/// Row names that are never players on these sites.
pub const SKIP_MARKERS: &[&str] = &[
    "Reserves",
    "Did Not Play",
    "Did Not Dress",
    "Not With Team",
    "Player Suspended",
    "Team Total",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Scorebox {
    pub away: TeamRecord,
    pub home: TeamRecord,
    pub away_score: Option<i64>,
    pub home_score: Option<i64>,
    pub date: Option<NaiveDate>,
}

/// Away team first, home team second, as the sites lay them out.
pub fn parse_scorebox(doc: &Html) -> Result<Scorebox, ScrapeError> {
    let scorebox = locate(doc, &TableLocator::Selector("div.scorebox"))
        .into_iter()
        .next()
        .ok_or_else(|| ScrapeError::Parse("no scorebox".into()))?;

    let team_divs: Vec<ElementRef<'_>> = scorebox
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "div")
        .filter(|el| !el.value().classes().any(|c| c == "scorebox_meta"))
        .collect();

    let [away_div, home_div, ..] = team_divs.as_slice() else {
        return Err(ScrapeError::Parse(format!(
            "scorebox has {} team blocks, expected 2",
            team_divs.len()
        )));
    };

    let (away, away_score) = parse_team_block(away_div)?;
    let (home, home_score) = parse_team_block(home_div)?;

    let date = selector("div.scorebox_meta div")
        .and_then(|sel| scorebox.select(&sel).next())
        .and_then(|el| parse_date(&element_text(&el)));

    Ok(Scorebox { away, home, away_score, home_score, date })
}

fn parse_team_block(block: &ElementRef<'_>) -> Result<(TeamRecord, Option<i64>), ScrapeError> {
    let link = ["strong a", "a[itemprop=name]", "a"]
        .iter()
        .filter_map(|css| selector(css))
        .find_map(|sel| block.select(&sel).next());

    let name = link
        .map(|a| element_text(&a))
        .filter(|n| !n.is_empty())
        .or_else(|| {
            selector("strong")
                .and_then(|sel| block.select(&sel).next())
                .map(|s| element_text(&s))
        })
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ScrapeError::Parse("team block without a name".into()))?;

    let abbreviation = link
        .and_then(|a| a.value().attr("href"))
        .and_then(team_abbr_from_href);

    let score = selector("div.score")
        .and_then(|sel| block.select(&sel).next())
        .and_then(|el| parse_count(&element_text(&el)));

    Ok((TeamRecord { name, abbreviation }, score))
}

/// "/teams/BOS/2025.html" → "BOS", "/teams/kan/2024.htm" → "KAN"
pub fn team_abbr_from_href(href: &str) -> Option<String> {
    let rest = href.split("/teams/").nth(1)?;
    let abbr = rest.split('/').next()?.trim();
    (!abbr.is_empty() && abbr.chars().all(|c| c.is_ascii_alphanumeric()))
        .then(|| abbr.to_uppercase())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scorebox() {
        let html = crate::scraper::unmask::unmask_comments(&fixtures::nba_box_score(false)).into_owned();
        let doc = Html::parse_document(&html);
        let sb = parse_scorebox(&doc).unwrap();

        assert_eq!(sb.away.name, "Boston Celtics");
        assert_eq!(sb.away.abbreviation.as_deref(), Some("BOS"));
        assert_eq!(sb.home.name, "Los Angeles Lakers");
        assert_eq!(sb.away_score, Some(108));
        assert_eq!(sb.home_score, Some(112));
        assert_eq!(sb.date, NaiveDate::from_ymd_opt(2025, 1, 15));
    }

    #[test]
    fn test_missing_scorebox_is_parse_error() {
        let doc = Html::parse_document("<html><body><h1>Page Not Found (404 error)</h1></body></html>");
        assert!(matches!(parse_scorebox(&doc), Err(ScrapeError::Parse(_))));
    }

    #[test]
    fn test_one_team_block_is_parse_error() {
        let doc = Html::parse_document(
            r#"<div class="scorebox"><div><strong>Only Team</strong></div></div>"#,
        );
        assert!(matches!(parse_scorebox(&doc), Err(ScrapeError::Parse(_))));
    }

    #[test]
    fn test_team_abbr_from_href() {
        assert_eq!(team_abbr_from_href("/teams/BOS/2025.html").as_deref(), Some("BOS"));
        assert_eq!(team_abbr_from_href("/teams/kan/2024.htm").as_deref(), Some("KAN"));
        assert_eq!(team_abbr_from_href("/players/j/jamesle01.html"), None);
    }
}
