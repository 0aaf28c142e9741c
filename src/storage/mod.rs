use crate::models::{
    FieldKind, FieldValue, GameRecord, PlayerStatRecord, ScrapeReport, ScrapedGame, Sport, Status,
    Window,
};
use crate::scraper::ScrapeError;
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use duckdb::types::Value;
use duckdb::{params, params_from_iter, Connection, Row, Transaction};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::path::Path;
use tracing::{debug, info};

// ── Schema ────────────────────────────────────────────────────────────────────

const SCHEMA_VERSION: i32 = 1;

const SHARED_DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS scrape_runs_id_seq START 1;

CREATE TABLE IF NOT EXISTS scrape_runs (
    id              BIGINT PRIMARY KEY DEFAULT nextval('scrape_runs_id_seq'),
    sport           VARCHAR NOT NULL,
    scrape_window   VARCHAR NOT NULL,
    started_at      TIMESTAMP NOT NULL,
    finished_at     TIMESTAMP,
    status          VARCHAR NOT NULL DEFAULT 'running',
    games_found     INTEGER DEFAULT 0,
    games_inserted  INTEGER DEFAULT 0,
    games_skipped   INTEGER DEFAULT 0,
    stats_inserted  INTEGER DEFAULT 0,
    pages_failed    INTEGER DEFAULT 0,
    error_msg       VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

fn sql_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Count => "BIGINT",
        FieldKind::Decimal => "DOUBLE",
        FieldKind::Text => "VARCHAR",
    }
}

/// Tables, sequences and indexes of one sport. Stat columns come from the
/// sport's field list.
fn sport_ddl(sport: Sport) -> String {
    let p = sport.table_prefix();
    let stat_columns: String = sport
        .stat_fields()
        .iter()
        .map(|f| format!(",\n    {:<20} {}", f.name, sql_type(f.kind)))
        .collect();

    format!(
        r#"
CREATE SEQUENCE IF NOT EXISTS {p}_teams_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS {p}_players_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS {p}_player_stats_id_seq START 1;

CREATE TABLE IF NOT EXISTS {p}_games (
    game_id     VARCHAR PRIMARY KEY,
    date        DATE NOT NULL,
    home_team   VARCHAR NOT NULL,
    away_team   VARCHAR NOT NULL,
    home_score  INTEGER,
    away_score  INTEGER,
    winner      VARCHAR,
    season      VARCHAR NOT NULL,
    week        INTEGER,
    league      VARCHAR,
    scraped_at  TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS {p}_teams (
    id           INTEGER PRIMARY KEY DEFAULT nextval('{p}_teams_id_seq'),
    name         VARCHAR NOT NULL UNIQUE,
    abbreviation VARCHAR,
    created_at   TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS {p}_players (
    id          INTEGER PRIMARY KEY DEFAULT nextval('{p}_players_id_seq'),
    name        VARCHAR NOT NULL,
    team        VARCHAR NOT NULL,
    position    VARCHAR,
    created_at  TIMESTAMP NOT NULL,
    UNIQUE (name, team)
);

CREATE TABLE IF NOT EXISTS {p}_player_stats (
    id          BIGINT PRIMARY KEY DEFAULT nextval('{p}_player_stats_id_seq'),
    game_id     VARCHAR NOT NULL REFERENCES {p}_games (game_id),
    player_name VARCHAR NOT NULL,
    team        VARCHAR NOT NULL,
    stat_type   VARCHAR{stat_columns}
);

CREATE INDEX IF NOT EXISTS idx_{p}_games_date  ON {p}_games (date);
CREATE INDEX IF NOT EXISTS idx_{p}_stats_game  ON {p}_player_stats (game_id);
CREATE INDEX IF NOT EXISTS idx_{p}_stats_name  ON {p}_player_stats (player_name);
"#
    )
}

// ── Result types ──────────────────────────────────────────────────────────────

/// What committing one scraped page did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted { stats: usize, teams: usize, players: usize },
    /// The game key was already stored; nothing was written.
    Duplicate,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamRow {
    pub id: i64,
    pub name: String,
    pub abbreviation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerRow {
    pub id: i64,
    pub name: String,
    pub team: String,
    pub position: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub games: i64,
    pub teams: i64,
    pub players: i64,
    pub player_stats: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SportSummary {
    pub sport: Sport,
    #[serde(flatten)]
    pub counts: TableCounts,
    pub first_game: Option<NaiveDate>,
    pub last_game: Option<NaiveDate>,
}

/// One stat line as a JSON object: fixed columns first, then the sport's fields.
pub type StatRow = Map<String, JsonValue>;

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    /// Create every table if missing. Safe to run on each start.
    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(SHARED_DDL).context("shared DDL failed")?;
        for sport in Sport::ALL {
            self.conn
                .execute_batch(&sport_ddl(sport))
                .with_context(|| format!("{} DDL failed", sport))?;
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?, ?)",
            params![SCHEMA_VERSION, Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Games ─────────────────────────────────────────────────────────────────

    /// Cheap pre-check so already stored games are not fetched again.
    /// Uniqueness itself is enforced by `persist_game`.
    pub fn game_exists(&self, sport: Sport, game_id: &str) -> Result<bool, ScrapeError> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE game_id = ?", sport.games_table());
        let n: i64 = self.conn.query_row(&sql, params![game_id], |r| r.get(0))?;
        Ok(n > 0)
    }

    /// Commit one page: game, teams, players and stat lines in a single
    /// transaction. The game insert is `ON CONFLICT DO NOTHING`; zero affected
    /// rows means the key is already stored and the page is a duplicate.
    /// Any failure rolls the whole page back.
    pub fn persist_game(&self, sport: Sport, page: &ScrapedGame) -> Result<UpsertOutcome, ScrapeError> {
        let tx = self.conn.unchecked_transaction()?;
        let g = &page.game;

        let inserted = tx.execute(
            &format!(
                r#"INSERT INTO {} (game_id, date, home_team, away_team, home_score, away_score,
                                   winner, season, week, league, scraped_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT DO NOTHING"#,
                sport.games_table()
            ),
            params![
                g.game_id, g.date, g.home_team, g.away_team,
                g.home_score, g.away_score, g.winner,
                g.season, g.week, g.league, g.scraped_at,
            ],
        )?;
        if inserted == 0 {
            debug!("{} {}: already stored", sport, g.game_id);
            return Ok(UpsertOutcome::Duplicate);
        }

        let now = Utc::now().naive_utc();
        let mut teams = 0usize;
        for t in &page.teams {
            teams += tx.execute(
                &format!(
                    "INSERT INTO {} (name, abbreviation, created_at) VALUES (?, ?, ?) ON CONFLICT DO NOTHING",
                    sport.teams_table()
                ),
                params![t.name, t.abbreviation, now],
            )?;
        }

        let mut players = 0usize;
        for p in page.players() {
            players += tx.execute(
                &format!(
                    "INSERT INTO {} (name, team, position, created_at) VALUES (?, ?, ?, ?) ON CONFLICT DO NOTHING",
                    sport.players_table()
                ),
                params![p.name, p.team, p.position, now],
            )?;
        }

        let stats = insert_stats(&tx, sport, &page.stats)?;

        tx.commit()?;
        Ok(UpsertOutcome::Inserted { stats, teams, players })
    }

    pub fn list_games(&self, sport: Sport, limit: usize) -> Result<Vec<GameRecord>> {
        let sql = format!(
            r#"SELECT game_id, date, home_team, away_team, home_score, away_score,
                      winner, season, week, league, scraped_at
               FROM {} ORDER BY date DESC, game_id LIMIT ?"#,
            sport.games_table()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let games = stmt
            .query_map(params![limit as i64], |r| {
                Ok(GameRecord {
                    game_id: r.get(0)?,
                    date: r.get(1)?,
                    home_team: r.get(2)?,
                    away_team: r.get(3)?,
                    home_score: r.get(4)?,
                    away_score: r.get(5)?,
                    winner: r.get(6)?,
                    season: r.get(7)?,
                    week: r.get(8)?,
                    league: r.get(9)?,
                    scraped_at: r.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(games)
    }

    // ── Teams / players ───────────────────────────────────────────────────────

    pub fn list_teams(&self, sport: Sport) -> Result<Vec<TeamRow>> {
        let sql = format!("SELECT id, name, abbreviation FROM {} ORDER BY name", sport.teams_table());
        let mut stmt = self.conn.prepare(&sql)?;
        let teams = stmt
            .query_map([], |r| {
                Ok(TeamRow { id: r.get(0)?, name: r.get(1)?, abbreviation: r.get(2)? })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(teams)
    }

    pub fn list_players(&self, sport: Sport, team: Option<&str>, limit: usize) -> Result<Vec<PlayerRow>> {
        let filter = if team.is_some() { "WHERE team = ?" } else { "" };
        let sql = format!(
            "SELECT id, name, team, position FROM {} {} ORDER BY name LIMIT {}",
            sport.players_table(),
            filter,
            limit
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let players = stmt
            .query_map(params_from_iter(team), |r| {
                Ok(PlayerRow {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    team: r.get(2)?,
                    position: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(players)
    }

    // ── Stat lines ────────────────────────────────────────────────────────────

    /// Stat lines of one game, or of the whole sport when `game_id` is None.
    pub fn stat_rows(&self, sport: Sport, game_id: Option<&str>) -> Result<Vec<StatRow>> {
        let fields = sport.stat_fields();
        let field_list: String = fields.iter().map(|f| format!(", {}", f.name)).collect();
        let filter = if game_id.is_some() { "WHERE game_id = ?" } else { "" };
        let sql = format!(
            "SELECT game_id, player_name, team, stat_type{} FROM {} {} ORDER BY game_id, id",
            field_list,
            sport.stats_table(),
            filter
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(game_id), |r| stat_row(r, sport))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Summary ───────────────────────────────────────────────────────────────

    pub fn counts(&self, sport: Sport) -> Result<TableCounts> {
        let count = |table: String| -> Result<i64> {
            let mut s = self.conn.prepare(&format!("SELECT COUNT(*) FROM {}", table))?;
            Ok(s.query_row([], |r| r.get(0))?)
        };
        Ok(TableCounts {
            games: count(sport.games_table())?,
            teams: count(sport.teams_table())?,
            players: count(sport.players_table())?,
            player_stats: count(sport.stats_table())?,
        })
    }

    pub fn summary(&self) -> Result<Vec<SportSummary>> {
        Sport::ALL
            .into_iter()
            .map(|sport| -> Result<SportSummary> {
                let counts = self.counts(sport)?;
                let mut s = self
                    .conn
                    .prepare(&format!("SELECT MIN(date), MAX(date) FROM {}", sport.games_table()))?;
                let (first_game, last_game) = s.query_row([], |r| Ok((r.get(0)?, r.get(1)?)))?;
                Ok(SportSummary { sport, counts, first_game, last_game })
            })
            .collect()
    }

    // ── Scrape run log ────────────────────────────────────────────────────────

    pub fn begin_scrape_run(&self, sport: Sport, window: &Window) -> Result<i64> {
        let id: i64 = self.conn.query_row(
            r#"INSERT INTO scrape_runs (sport, scrape_window, started_at, status)
               VALUES (?, ?, ?, 'running') RETURNING id"#,
            params![sport.to_string(), window.to_string(), Utc::now().naive_utc()],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn finish_scrape_run(&self, run_id: i64, report: &ScrapeReport) -> Result<()> {
        let (status, error) = match report.status {
            Status::Success => ("success", None),
            Status::Error => ("error", Some(report.message.as_str())),
        };
        self.conn.execute(
            r#"UPDATE scrape_runs SET
               finished_at = ?, status = ?,
               games_found = ?, games_inserted = ?, games_skipped = ?,
               stats_inserted = ?, pages_failed = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                status,
                report.games_found as i64,
                report.games_inserted as i64,
                report.games_skipped as i64,
                report.stats_inserted as i64,
                report.pages_failed as i64,
                error,
                run_id,
            ],
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub fn scrape_run_status(&self, run_id: i64) -> Result<Option<String>> {
        use duckdb::OptionalExt;
        let mut s = self.conn.prepare("SELECT status FROM scrape_runs WHERE id = ?")?;
        Ok(s.query_row(params![run_id], |r| r.get(0)).optional()?)
    }
}

fn insert_stats(tx: &Transaction<'_>, sport: Sport, stats: &[PlayerStatRecord]) -> Result<usize, ScrapeError> {
    if stats.is_empty() {
        return Ok(0);
    }
    let fields = sport.stat_fields();
    let columns: String = fields.iter().map(|f| format!(", {}", f.name)).collect();
    let placeholders: String = fields.iter().map(|_| ", ?").collect();
    let sql = format!(
        "INSERT INTO {} (game_id, player_name, team, stat_type{}) VALUES (?, ?, ?, ?{})",
        sport.stats_table(),
        columns,
        placeholders
    );

    let mut stmt = tx.prepare(&sql)?;
    let mut n = 0;
    for s in stats {
        let mut values: Vec<Value> = Vec::with_capacity(4 + fields.len());
        values.push(Value::Text(s.game_id.clone()));
        values.push(Value::Text(s.player_name.clone()));
        values.push(Value::Text(s.team.clone()));
        values.push(s.stat_type.clone().map_or(Value::Null, Value::Text));
        for f in fields {
            values.push(s.field(f.name).map_or(Value::Null, to_sql_value));
        }
        n += stmt.execute(params_from_iter(values))?;
    }
    Ok(n)
}

fn to_sql_value(v: &FieldValue) -> Value {
    match v {
        FieldValue::Count(Some(n)) => Value::BigInt(*n),
        FieldValue::Decimal(Some(f)) => Value::Double(*f),
        FieldValue::Text(Some(s)) => Value::Text(s.clone()),
        _ => Value::Null,
    }
}

fn stat_row(r: &Row<'_>, sport: Sport) -> duckdb::Result<StatRow> {
    let mut row = Map::new();
    row.insert("game_id".into(), JsonValue::from(r.get::<_, String>(0)?));
    row.insert("player_name".into(), JsonValue::from(r.get::<_, String>(1)?));
    row.insert("team".into(), JsonValue::from(r.get::<_, String>(2)?));
    row.insert("stat_type".into(), JsonValue::from(r.get::<_, Option<String>>(3)?));
    for (i, f) in sport.stat_fields().iter().enumerate() {
        let idx = 4 + i;
        let value = match f.kind {
            FieldKind::Count => JsonValue::from(r.get::<_, Option<i64>>(idx)?),
            FieldKind::Decimal => JsonValue::from(r.get::<_, Option<f64>>(idx)?),
            FieldKind::Text => JsonValue::from(r.get::<_, Option<String>>(idx)?),
        };
        row.insert(f.name.into(), value);
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PlayerStatRecord, TeamRecord};
    use chrono::NaiveDate;

    fn repo() -> Repository {
        let r = Repository::open_in_memory().unwrap();
        r.run_migrations().unwrap();
        r
    }

    fn stat(game_id: &str, name: &str, points: Option<i64>) -> PlayerStatRecord {
        PlayerStatRecord {
            game_id: game_id.into(),
            player_name: name.into(),
            team: "LAL".into(),
            stat_type: None,
            fields: vec![
                ("minutes", FieldValue::Text(Some("36:00".into()))),
                ("points", FieldValue::Count(points)),
            ],
        }
    }

    fn page(game_id: &str, stats: Vec<PlayerStatRecord>) -> ScrapedGame {
        ScrapedGame {
            game: GameRecord {
                game_id: game_id.into(),
                date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
                home_team: "Los Angeles Lakers".into(),
                away_team: "Boston Celtics".into(),
                home_score: Some(112),
                away_score: Some(108),
                winner: Some("Los Angeles Lakers".into()),
                season: "2025".into(),
                week: None,
                league: Some("NBA".into()),
                scraped_at: Utc::now().naive_utc(),
            },
            teams: vec![
                TeamRecord { name: "Los Angeles Lakers".into(), abbreviation: Some("LAL".into()) },
                TeamRecord { name: "Boston Celtics".into(), abbreviation: Some("BOS".into()) },
            ],
            stats,
        }
    }

    #[test]
    fn test_migrations_idempotent() {
        let r = repo();
        r.run_migrations().unwrap();
        assert_eq!(r.counts(Sport::Nfl).unwrap(), TableCounts::default());
        assert_eq!(r.summary().unwrap().len(), Sport::ALL.len());
    }

    #[test]
    fn test_persist_then_duplicate() {
        let r = repo();
        let p = page("202501150LAL", vec![stat("202501150LAL", "LeBron James", Some(30)), stat("202501150LAL", "Anthony Davis", None)]);

        let first = r.persist_game(Sport::Nba, &p).unwrap();
        assert_eq!(first, UpsertOutcome::Inserted { stats: 2, teams: 2, players: 2 });
        assert!(r.game_exists(Sport::Nba, "202501150LAL").unwrap());

        let second = r.persist_game(Sport::Nba, &p).unwrap();
        assert_eq!(second, UpsertOutcome::Duplicate);

        let counts = r.counts(Sport::Nba).unwrap();
        assert_eq!(counts, TableCounts { games: 1, teams: 2, players: 2, player_stats: 2 });
    }

    #[test]
    fn test_failed_page_rolls_back() {
        let r = repo();
        // second stat line points at a game that doesn't exist → FK violation
        let p = page("202501150LAL", vec![stat("202501150LAL", "LeBron James", Some(30)), stat("nope", "Anthony Davis", Some(25))]);

        let err = r.persist_game(Sport::Nba, &p).unwrap_err();
        assert!(matches!(err, ScrapeError::Persistence(_)));
        assert!(!r.game_exists(Sport::Nba, "202501150LAL").unwrap());
        assert_eq!(r.counts(Sport::Nba).unwrap(), TableCounts::default());
    }

    #[test]
    fn test_stat_rows_keep_absence_and_kinds() {
        let r = repo();
        let p = page("202501150LAL", vec![stat("202501150LAL", "LeBron James", Some(30)), stat("202501150LAL", "Anthony Davis", None)]);
        r.persist_game(Sport::Nba, &p).unwrap();

        let rows = r.stat_rows(Sport::Nba, Some("202501150LAL")).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["points"], JsonValue::from(30));
        assert_eq!(rows[0]["minutes"], JsonValue::from("36:00"));
        assert_eq!(rows[1]["points"], JsonValue::Null);
        assert_eq!(rows[1]["steals"], JsonValue::Null);
        assert!(r.stat_rows(Sport::Nba, Some("other")).unwrap().is_empty());
    }

    #[test]
    fn test_list_queries() {
        let r = repo();
        r.persist_game(Sport::Nba, &page("202501150LAL", vec![stat("202501150LAL", "LeBron James", Some(30))]))
            .unwrap();

        let games = r.list_games(Sport::Nba, 10).unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].home_score, Some(112));
        assert_eq!(r.list_teams(Sport::Nba).unwrap()[0].name, "Boston Celtics");
        assert_eq!(r.list_players(Sport::Nba, Some("LAL"), 10).unwrap().len(), 1);
        assert!(r.list_players(Sport::Nba, Some("BOS"), 10).unwrap().is_empty());
    }

    #[test]
    fn test_scrape_run_log() {
        let r = repo();
        let w = Window::Month { season: 2025, month: 1 };
        let id = r.begin_scrape_run(Sport::Nba, &w).unwrap();
        assert_eq!(r.scrape_run_status(id).unwrap().as_deref(), Some("running"));

        let report = ScrapeReport::error(Sport::Nba, &w, "index failed");
        r.finish_scrape_run(id, &report).unwrap();
        assert_eq!(r.scrape_run_status(id).unwrap().as_deref(), Some("error"));
    }
}
