use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Sport ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Nba,
    Nfl,
    Nhl,
    Cfb,
    Lol,
}

impl Sport {
    pub const ALL: [Sport; 5] = [Sport::Nba, Sport::Nfl, Sport::Nhl, Sport::Cfb, Sport::Lol];

    /// Table name prefix, e.g. `nba` → `nba_games`, `nba_player_stats`.
    pub fn table_prefix(&self) -> &'static str {
        match self {
            Sport::Nba => "nba",
            Sport::Nfl => "nfl",
            Sport::Nhl => "nhl",
            Sport::Cfb => "cfb",
            Sport::Lol => "lol",
        }
    }

    pub fn games_table(&self) -> String {
        format!("{}_games", self.table_prefix())
    }

    pub fn teams_table(&self) -> String {
        format!("{}_teams", self.table_prefix())
    }

    pub fn players_table(&self) -> String {
        format!("{}_players", self.table_prefix())
    }

    pub fn stats_table(&self) -> String {
        format!("{}_player_stats", self.table_prefix())
    }

    /// Ordered stat columns of the sport's player-stats table.
    pub fn stat_fields(&self) -> &'static [FieldDef] {
        match self {
            Sport::Nba => NBA_FIELDS,
            Sport::Nfl => NFL_FIELDS,
            Sport::Nhl => NHL_FIELDS,
            Sport::Cfb => CFB_FIELDS,
            Sport::Lol => LOL_FIELDS,
        }
    }

    pub fn field_def(&self, name: &str) -> Option<&'static FieldDef> {
        self.stat_fields().iter().find(|f| f.name == name)
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_prefix())
    }
}

// ── Stat fields ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Integer counting stat (points, yards, kills…)
    Count,
    /// Fractional stat (sacks can be split: 0.5)
    Decimal,
    /// Free text kept verbatim (minutes "34:12", champion name…)
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn count(name: &'static str) -> FieldDef {
    FieldDef { name, kind: FieldKind::Count }
}

const fn decimal(name: &'static str) -> FieldDef {
    FieldDef { name, kind: FieldKind::Decimal }
}

const fn text(name: &'static str) -> FieldDef {
    FieldDef { name, kind: FieldKind::Text }
}

const NBA_FIELDS: &[FieldDef] = &[
    text("minutes"),
    count("points"),
    count("rebounds"),
    count("assists"),
    count("steals"),
    count("blocks"),
    count("turnovers"),
    count("fg_made"),
    count("fg_attempted"),
    count("three_made"),
    count("three_attempted"),
    count("ft_made"),
    count("ft_attempted"),
];

const NFL_FIELDS: &[FieldDef] = &[
    count("pass_completions"),
    count("pass_attempts"),
    count("pass_yards"),
    count("pass_touchdowns"),
    count("interceptions"),
    count("rush_attempts"),
    count("rush_yards"),
    count("rush_touchdowns"),
    count("targets"),
    count("receptions"),
    count("receiving_yards"),
    count("receiving_touchdowns"),
];

const NHL_FIELDS: &[FieldDef] = &[
    text("position"),
    count("goals"),
    count("assists"),
    count("points"),
    count("plus_minus"),
    count("pim"),
    count("shots"),
    text("time_on_ice"),
];

const CFB_FIELDS: &[FieldDef] = &[
    count("pass_cmp"),
    count("pass_att"),
    count("pass_yds"),
    count("pass_td"),
    count("pass_int"),
    count("rush_att"),
    count("rush_yds"),
    count("rush_td"),
    count("rec_tgt"),
    count("rec_rec"),
    count("rec_yds"),
    count("rec_td"),
    count("def_tackles"),
    decimal("def_sacks"),
    count("def_int"),
];

const LOL_FIELDS: &[FieldDef] = &[
    text("champion"),
    count("kills"),
    count("deaths"),
    count("assists"),
    count("cs"),
    count("gold"),
    count("damage"),
];

/// A mapped stat value. `None` is the absence marker: the source cell was
/// empty, a placeholder, or not a number.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Count(Option<i64>),
    Decimal(Option<f64>),
    Text(Option<String>),
}

// ── Scrape window ─────────────────────────────────────────────────────────────

/// Which slice of a season an invocation covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Window {
    /// Season label + calendar month (1-12), e.g. NBA_2025 / march.
    Month { season: i32, month: u32 },
    Week { season: i32, week: u32 },
    Tournament { id: String, season: String },
    /// Inclusive date range inside a season.
    DateRange { season: i32, from: NaiveDate, to: NaiveDate },
}

impl Window {
    pub fn season_tag(&self) -> String {
        match self {
            Window::Month { season, .. }
            | Window::Week { season, .. }
            | Window::DateRange { season, .. } => season.to_string(),
            Window::Tournament { season, .. } => season.clone(),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::Month { season, month } => {
                write!(f, "{} {}", season, month_slug(*month).unwrap_or("?"))
            }
            Window::Week { season, week } => write!(f, "{} week {}", season, week),
            Window::Tournament { id, season } => write!(f, "{} {}", id, season),
            Window::DateRange { season, from, to } => write!(f, "{} {}..{}", season, from, to),
        }
    }
}

/// Lower-case month name used in URL slugs: 3 → "march".
pub fn month_slug(month: u32) -> Option<&'static str> {
    const SLUGS: [&str; 12] = [
        "january", "february", "march", "april", "may", "june",
        "july", "august", "september", "october", "november", "december",
    ];
    SLUGS.get(month.checked_sub(1)? as usize).copied()
}

/// Accepts "march", "Mar" or "3".
pub fn parse_month(s: &str) -> Option<u32> {
    let s = s.trim();
    if let Ok(n) = s.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    s.parse::<chrono::Month>().ok().map(|m| m.number_from_month())
}

// ── Records ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameRecord {
    pub game_id: String,
    pub date: NaiveDate,
    /// For esports the first-listed team takes the home slot.
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub winner: Option<String>,
    pub season: String,
    pub week: Option<i32>,
    pub league: Option<String>,
    pub scraped_at: NaiveDateTime,
}

impl GameRecord {
    /// Winner by score; `None` on a tie or missing score.
    pub fn winner_by_score(&self) -> Option<String> {
        match (self.home_score, self.away_score) {
            (Some(h), Some(a)) if h > a => Some(self.home_team.clone()),
            (Some(h), Some(a)) if a > h => Some(self.away_team.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamRecord {
    pub name: String,
    pub abbreviation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerRecord {
    pub name: String,
    pub team: String,
    pub position: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStatRecord {
    pub game_id: String,
    pub player_name: String,
    pub team: String,
    /// CFB splits a player's line into passing / rushing / receiving / defense.
    pub stat_type: Option<String>,
    pub fields: Vec<(&'static str, FieldValue)>,
}

impl PlayerStatRecord {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    #[cfg(test)]
    pub fn count(&self, name: &str) -> Option<i64> {
        match self.field(name) {
            Some(FieldValue::Count(v)) => *v,
            _ => None,
        }
    }
}

/// Everything one game page yields, staged and committed together.
#[derive(Debug, Clone)]
pub struct ScrapedGame {
    pub game: GameRecord,
    pub teams: Vec<TeamRecord>,
    pub stats: Vec<PlayerStatRecord>,
}

impl ScrapedGame {
    /// Players seen in the stat lines, one per (name, team).
    pub fn players(&self) -> Vec<PlayerRecord> {
        let mut out: Vec<PlayerRecord> = Vec::new();
        for s in &self.stats {
            if out.iter().any(|p| p.name == s.player_name && p.team == s.team) {
                continue;
            }
            let position = match s.field("position") {
                Some(FieldValue::Text(p)) => p.clone(),
                _ => None,
            };
            out.push(PlayerRecord {
                name: s.player_name.clone(),
                team: s.team.clone(),
                position,
            });
        }
        out
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PageFailure {
    pub game_id: String,
    pub url: Option<String>,
    pub error: String,
}

/// Outcome of one `(sport, window)` scrape, as returned to callers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapeReport {
    pub status: Status,
    pub message: String,
    pub sport: Option<Sport>,
    pub window: String,
    pub games_found: usize,
    pub games_inserted: usize,
    pub games_skipped: usize,
    pub stats_inserted: usize,
    pub pages_failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<PageFailure>,
}

impl ScrapeReport {
    pub fn error(sport: Sport, window: &Window, message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
            sport: Some(sport),
            window: window.to_string(),
            ..Default::default()
        }
    }

    /// Fold several reports (e.g. one per tournament) into one.
    pub fn merge(reports: Vec<ScrapeReport>) -> ScrapeReport {
        let mut out = ScrapeReport::default();
        let mut windows = Vec::new();
        for r in reports {
            if r.status == Status::Error {
                out.status = Status::Error;
            }
            out.sport = out.sport.or(r.sport);
            windows.push(r.window);
            out.games_found += r.games_found;
            out.games_inserted += r.games_inserted;
            out.games_skipped += r.games_skipped;
            out.stats_inserted += r.stats_inserted;
            out.pages_failed += r.pages_failed;
            out.failures.extend(r.failures);
        }
        out.window = windows.join(", ");
        out.message = out.summary();
        out
    }

    pub fn summary(&self) -> String {
        format!(
            "{} games found, {} inserted, {} skipped, {} stat rows, {} pages failed",
            self.games_found,
            self.games_inserted,
            self.games_skipped,
            self.stats_inserted,
            self.pages_failed
        )
    }
}

/// Envelope for read commands: `{status, count, data}` or `{status, message}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<T>>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: Vec<T>) -> Self {
        Self {
            status: Status::Success,
            message: None,
            count: Some(data.len()),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: Some(message.into()),
            count: None,
            data: None,
        }
    }
}
