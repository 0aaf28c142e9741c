//! Pipeline orchestrator: ties fetcher → site adapter → storage together.
//!
//! ## Run shape
//!
//! `scrape(sport, window)`:
//!   1. Build the index URL for the window and fetch it
//!   2. Discover the games it lists
//!   3. For each game, strictly one at a time: skip if stored, fetch (throttled),
//!      parse, commit in one transaction
//!   A failing page is logged and counted; the run carries on.
//!   Idempotent: re-running a window inserts nothing new.
//!
//! `scrape_recent_nba`, `scrape_current_cfb_week` and
//! `scrape_default_tournaments` are convenience windows on top of `scrape`.

use crate::config::{AppConfig, ScraperConfig};
use crate::models::{PageFailure, ScrapeReport, Sport, Status, Window};
use crate::scraper::{Fetcher, ScrapeError};
use crate::sites::lol::{DEFAULT_SEASON, DEFAULT_TOURNAMENTS};
use crate::sites::{adapter_for, scrape_page, GameTask, SiteAdapter};
use crate::storage::{Repository, UpsertOutcome};
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Utc};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;
use tracing::{debug, error, info, warn};

// ── Throttle ──────────────────────────────────────────────────────────────────

/// Minimum spacing between requests to one site, plus random jitter.
struct Throttle {
    delay: Duration,
    jitter_ms: u64,
    last: Option<Instant>,
}

impl Throttle {
    fn new(delay_ms: u64, jitter_ms: u64) -> Self {
        Self { delay: Duration::from_millis(delay_ms), jitter_ms, last: None }
    }

    async fn wait(&mut self) {
        if let Some(last) = self.last {
            let jitter = match self.jitter_ms {
                0 => 0,
                j => rand::random::<u64>() % (j + 1),
            };
            let target = self.delay + Duration::from_millis(jitter);
            let elapsed = last.elapsed();
            if elapsed < target {
                sleep(target - elapsed).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct Pipeline<'a> {
    config: AppConfig,
    fetcher: &'a dyn Fetcher,
    repo: &'a Repository,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: AppConfig, fetcher: &'a dyn Fetcher, repo: &'a Repository) -> Self {
        Self { config, fetcher, repo }
    }

    /// Scrape one window of one sport. Never fails: index and window errors
    /// come back as an error report, page errors as `pages_failed`.
    pub async fn scrape(&self, sport: Sport, window: &Window) -> ScrapeReport {
        info!("=== Scraping {} {} ===", sport, window);

        let run_id = self
            .repo
            .begin_scrape_run(sport, window)
            .map_err(|e| warn!("Could not log scrape run: {:#}", e))
            .ok();

        let report = match self.run(sport, window).await {
            Ok(report) => report,
            Err(e) => {
                error!("{} {}: {}", sport, window, e);
                ScrapeReport::error(sport, window, e.to_string())
            }
        };

        if let Some(id) = run_id {
            if let Err(e) = self.repo.finish_scrape_run(id, &report) {
                warn!("Could not close scrape run {}: {:#}", id, e);
            }
        }

        info!("=== Done: {} {}: {} ===", sport, window, report.summary());
        report
    }

    async fn run(&self, sport: Sport, window: &Window) -> Result<ScrapeReport, ScrapeError> {
        let adapter = adapter_for(sport, &self.config.sites)?;
        let index_url = adapter.index_url(window)?;

        let site = self.config.sites.for_sport(sport);
        let mut throttle = Throttle::new(site.request_delay_ms, self.config.scraper.jitter_ms);

        info!("Fetching {}", index_url);
        let index = self.fetch(&mut throttle, &index_url).await?;
        let tasks = adapter.discover(window, &index, Utc::now().naive_utc())?;
        info!("{} games listed for {} {}", tasks.len(), sport, window);

        let mut report = ScrapeReport {
            status: Status::Success,
            sport: Some(sport),
            window: window.to_string(),
            games_found: tasks.len(),
            ..Default::default()
        };

        for task in &tasks {
            match self.process(adapter.as_ref(), &mut throttle, task, window).await {
                Ok(UpsertOutcome::Inserted { stats, teams, players }) => {
                    info!(
                        "{}: {} stat rows, {} new teams, {} new players",
                        task.game_id, stats, teams, players
                    );
                    report.games_inserted += 1;
                    report.stats_inserted += stats;
                }
                Ok(UpsertOutcome::Duplicate) => {
                    debug!("{}: already stored, skipping", task.game_id);
                    report.games_skipped += 1;
                }
                Err(e) => {
                    warn!("{}: {}", task.game_id, e);
                    report.pages_failed += 1;
                    report.failures.push(PageFailure {
                        game_id: task.game_id.clone(),
                        url: task.url.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report.message = report.summary();
        Ok(report)
    }

    /// One game: pre-check, fetch, parse, commit.
    async fn process(
        &self,
        adapter: &dyn SiteAdapter,
        throttle: &mut Throttle,
        task: &GameTask,
        window: &Window,
    ) -> Result<UpsertOutcome, ScrapeError> {
        let sport = adapter.sport();
        if self.repo.game_exists(sport, &task.game_id)? {
            return Ok(UpsertOutcome::Duplicate);
        }

        // Games read whole from the index have no page to fetch
        let html = match &task.url {
            Some(url) => self.fetch(throttle, url).await?,
            None => String::new(),
        };

        let page = scrape_page(adapter, task, &html, window, Utc::now().naive_utc())?;
        self.repo.persist_game(sport, &page)
    }

    /// Throttled GET; transport errors, 429 and 5xx are retried with
    /// exponential backoff starting at `retry_backoff_ms`.
    async fn fetch(&self, throttle: &mut Throttle, url: &str) -> Result<String, ScrapeError> {
        throttle.wait().await;

        RetryIf::start(
            backoff(&self.config.scraper),
            || self.fetcher.get_text(url),
            |e: &ScrapeError| {
                let retry = e.is_retryable();
                if retry {
                    warn!("{} (retrying)", e);
                }
                retry
            },
        )
        .await
    }

    // ── Convenience windows ───────────────────────────────────────────────────

    /// Every NBA month touched by the last `days` days.
    pub async fn scrape_recent_nba(&self, days: i64) -> ScrapeReport {
        let today = Utc::now().date_naive();
        let mut reports = Vec::new();
        for window in recent_nba_windows(today, days) {
            reports.push(self.scrape(Sport::Nba, &window).await);
        }
        ScrapeReport::merge(reports)
    }

    pub async fn scrape_current_cfb_week(&self) -> ScrapeReport {
        let window = current_cfb_week(Utc::now().date_naive());
        self.scrape(Sport::Cfb, &window).await
    }

    /// The major leagues, one after another with a pause in between.
    pub async fn scrape_default_tournaments(&self, season: Option<&str>) -> ScrapeReport {
        let season = season.unwrap_or(DEFAULT_SEASON);
        let pause = Duration::from_millis(self.config.sites.tournament_pause_ms);

        let mut reports = Vec::new();
        for (i, id) in DEFAULT_TOURNAMENTS.iter().enumerate() {
            if i > 0 {
                sleep(pause).await;
            }
            let window = Window::Tournament { id: id.to_string(), season: season.to_string() };
            reports.push(self.scrape(Sport::Lol, &window).await);
        }
        ScrapeReport::merge(reports)
    }
}

/// Retry delays: `retry_backoff_ms`, then doubling, capped at a minute.
fn backoff(cfg: &ScraperConfig) -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor(cfg.retry_backoff_ms.max(2).div_ceil(2))
        .max_delay(Duration::from_secs(60))
        .take(cfg.max_retries)
}

/// NBA season label of a date: October 2024 is in NBA_2025.
pub fn nba_season(date: NaiveDate) -> i32 {
    if date.month() >= 7 { date.year() + 1 } else { date.year() }
}

/// Month windows covering `today - days ..= today`, oldest first, no repeats.
pub fn recent_nba_windows(today: NaiveDate, days: i64) -> Vec<Window> {
    let mut windows: Vec<Window> = Vec::new();
    let mut day = today - ChronoDuration::days(days.max(0));
    while day <= today {
        let w = Window::Month { season: nba_season(day), month: day.month() };
        if !windows.contains(&w) {
            windows.push(w);
        }
        day += ChronoDuration::days(1);
    }
    windows
}

/// Rough CFB week: weeks since September 1st from August on, bowl week (15)
/// of the previous season otherwise.
pub fn current_cfb_week(today: NaiveDate) -> Window {
    if today.month() >= 8 {
        let week = NaiveDate::from_ymd_opt(today.year(), 9, 1)
            .map(|sep1| (today - sep1).num_days() / 7)
            .unwrap_or(1)
            .max(1);
        Window::Week { season: today.year(), week: week as u32 }
    } else {
        Window::Week { season: today.year() - 1, week: 15 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::testing::FakeFetcher;
    use crate::sites::sports_reference::fixtures::nba_box_score;

    const NBA: &str = "https://www.basketball-reference.com";

    fn repo() -> Repository {
        let r = Repository::open_in_memory().unwrap();
        r.run_migrations().unwrap();
        r
    }

    fn january() -> Window {
        Window::Month { season: 2025, month: 1 }
    }

    fn index_url() -> String {
        format!("{}/leagues/NBA_2025_games-january.html", NBA)
    }

    fn box_url(id: &str) -> String {
        format!("{}/boxscores/{}.html", NBA, id)
    }

    fn schedule(ids: &[&str]) -> String {
        let rows: String = ids
            .iter()
            .map(|id| {
                format!(
                    r#"<tr><th>Wed, Jan 15, 2025</th><td data-stat="box_score_text"><a href="/boxscores/{}.html">Box Score</a></td></tr>"#,
                    id
                )
            })
            .collect();
        format!(r#"<table id="schedule"><tbody>{}</tbody></table>"#, rows)
    }

    #[tokio::test]
    async fn test_single_game_end_to_end() {
        let repo = repo();
        let fetcher = FakeFetcher::new()
            .page(&index_url(), &schedule(&["202501150LAL"]))
            .page(&box_url("202501150LAL"), &nba_box_score(true));
        let pipeline = Pipeline::new(AppConfig::for_tests(), &fetcher, &repo);

        let report = pipeline.scrape(Sport::Nba, &january()).await;

        assert_eq!(report.status, Status::Success);
        assert_eq!(report.games_found, 1);
        assert_eq!(report.games_inserted, 1);
        assert_eq!(report.stats_inserted, 2);

        let games = repo.list_games(Sport::Nba, 10).unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].game_id, "202501150LAL");
        let stats = repo.stat_rows(Sport::Nba, Some("202501150LAL")).unwrap();
        assert_eq!(stats.len(), 2);
        assert!(stats.iter().all(|s| s["player_name"] != "Team Totals"));
    }

    #[tokio::test]
    async fn test_failed_page_does_not_stop_run() {
        let repo = repo();
        let ids = ["202501150LAL", "202501150NYK", "202501150MIA"];
        let fetcher = FakeFetcher::new()
            .page(&index_url(), &schedule(&ids))
            .page(&box_url(ids[0]), &nba_box_score(false))
            .status(&box_url(ids[1]), 500)
            .page(&box_url(ids[2]), &nba_box_score(false));
        let pipeline = Pipeline::new(AppConfig::for_tests(), &fetcher, &repo);

        let report = pipeline.scrape(Sport::Nba, &january()).await;

        assert_eq!(report.status, Status::Success);
        assert_eq!(report.games_inserted, 2);
        assert_eq!(report.pages_failed, 1);
        assert_eq!(report.failures[0].game_id, ids[1]);
        assert_eq!(repo.counts(Sport::Nba).unwrap().games, 2);
        assert!(!repo.game_exists(Sport::Nba, ids[1]).unwrap());
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let repo = repo();
        let ids = ["202501150LAL", "202501160LAL"];
        let fetcher = FakeFetcher::new()
            .page(&index_url(), &schedule(&ids))
            .page(&box_url(ids[0]), &nba_box_score(true))
            .page(&box_url(ids[1]), &nba_box_score(true));
        let pipeline = Pipeline::new(AppConfig::for_tests(), &fetcher, &repo);

        let first = pipeline.scrape(Sport::Nba, &january()).await;
        let after_first = repo.counts(Sport::Nba).unwrap();
        let second = pipeline.scrape(Sport::Nba, &january()).await;

        assert_eq!(first.games_inserted, 2);
        assert_eq!(second.games_inserted, 0);
        assert_eq!(second.games_skipped, 2);
        assert_eq!(repo.counts(Sport::Nba).unwrap(), after_first);

        // stored games are not fetched again
        let box_hits = fetcher.hits().iter().filter(|u| u.contains("/boxscores/")).count();
        assert_eq!(box_hits, 2);
    }

    #[tokio::test]
    async fn test_index_failure_is_error_report() {
        let repo = repo();
        let fetcher = FakeFetcher::new();
        let pipeline = Pipeline::new(AppConfig::for_tests(), &fetcher, &repo);

        let report = pipeline.scrape(Sport::Nba, &january()).await;
        assert_eq!(report.status, Status::Error);
        assert!(report.message.contains("404"));

        let bad = Window::Month { season: 2025, month: 13 };
        let report = pipeline.scrape(Sport::Nba, &bad).await;
        assert_eq!(report.status, Status::Error);
        // invalid windows never reach the network
        assert_eq!(fetcher.hits().len(), 1);
    }

    #[tokio::test]
    async fn test_schedule_only_games_need_no_fetch() {
        let repo = repo();
        let cfg = AppConfig::for_tests();
        let index = format!("{}/years/2024-schedule.html", cfg.sites.cfb.base_url);
        let html = r#"<table id="schedule"><thead>
<tr><th>Rk</th><th>Wk</th><th>Date</th><th>Winner</th><th>Pts</th><th></th><th>Loser</th><th>Pts</th></tr>
</thead><tbody>
<tr><th>1</th><td>1</td><td>Aug 31, 2024</td><td>Ohio State</td><td>52</td><td></td><td>Akron</td><td>6</td></tr>
</tbody></table>"#;
        let fetcher = FakeFetcher::new().page(&index, html);
        let pipeline = Pipeline::new(cfg, &fetcher, &repo);

        let report = pipeline.scrape(Sport::Cfb, &Window::Week { season: 2024, week: 1 }).await;

        assert_eq!(report.games_inserted, 1);
        assert_eq!(report.stats_inserted, 0);
        assert_eq!(fetcher.hits(), vec![index]);
        let games = repo.list_games(Sport::Cfb, 10).unwrap();
        assert_eq!(games[0].winner.as_deref(), Some("Ohio State"));
        assert_eq!(games[0].week, Some(1));
    }

    fn retrying_config() -> AppConfig {
        let mut cfg = AppConfig::for_tests();
        cfg.scraper.max_retries = 2;
        cfg.scraper.retry_backoff_ms = 1000;
        cfg
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let repo = repo();
        let ids = ["202501150LAL", "202501150NYK", "202501150MIA"];
        let fetcher = FakeFetcher::new()
            .page(&index_url(), &schedule(&ids))
            .page(&box_url(ids[0]), &nba_box_score(false))
            .flaky(&box_url(ids[0]), 1)
            .status(&box_url(ids[1]), 503);
        let pipeline = Pipeline::new(retrying_config(), &fetcher, &repo);

        let report = pipeline.scrape(Sport::Nba, &january()).await;

        assert_eq!(report.games_inserted, 1);
        assert_eq!(report.pages_failed, 2);
        assert!(repo.game_exists(Sport::Nba, ids[0]).unwrap());
        // timeout then success
        assert_eq!(fetcher.hits_for(&box_url(ids[0])), 2);
        // 503 on every attempt
        assert_eq!(fetcher.hits_for(&box_url(ids[1])), 3);
        // 404 is final
        assert_eq!(fetcher.hits_for(&box_url(ids[2])), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_back_off() {
        let repo = repo();
        let fetcher = FakeFetcher::new()
            .page(&index_url(), &schedule(&[]))
            .flaky(&index_url(), 2);
        let pipeline = Pipeline::new(retrying_config(), &fetcher, &repo);

        let start = Instant::now();
        let report = pipeline.scrape(Sport::Nba, &january()).await;

        assert_eq!(report.status, Status::Success);
        assert_eq!(fetcher.hits_for(&index_url()), 3);
        assert!(start.elapsed() >= Duration::from_millis(1000 + 2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fail_the_index() {
        let repo = repo();
        let fetcher = FakeFetcher::new()
            .page(&index_url(), &schedule(&[]))
            .flaky(&index_url(), 3);
        let pipeline = Pipeline::new(retrying_config(), &fetcher, &repo);

        let report = pipeline.scrape(Sport::Nba, &january()).await;

        assert_eq!(report.status, Status::Error);
        assert_eq!(fetcher.hits_for(&index_url()), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_are_spaced_by_site_delay() {
        let repo = repo();
        let mut cfg = AppConfig::for_tests();
        cfg.sites.nba.request_delay_ms = 3000;
        let fetcher = FakeFetcher::new()
            .page(&index_url(), &schedule(&["202501150LAL"]))
            .page(&box_url("202501150LAL"), &nba_box_score(true));
        let pipeline = Pipeline::new(cfg, &fetcher, &repo);

        let start = Instant::now();
        let report = pipeline.scrape(Sport::Nba, &january()).await;

        assert_eq!(report.games_inserted, 1);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_delay_and_jitter() {
        let mut throttle = Throttle::new(2000, 500);

        let start = Instant::now();
        throttle.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        for _ in 0..5 {
            let before = Instant::now();
            throttle.wait().await;
            let gap = before.elapsed();
            assert!(gap >= Duration::from_millis(2000), "{:?}", gap);
            assert!(gap <= Duration::from_millis(2500), "{:?}", gap);
        }
    }

    #[test]
    fn test_backoff_schedule() {
        let mut cfg = AppConfig::for_tests().scraper;
        cfg.max_retries = 3;
        cfg.retry_backoff_ms = 1000;
        let delays: Vec<_> = backoff(&cfg).collect();
        assert_eq!(
            delays,
            vec![Duration::from_millis(1000), Duration::from_millis(2000), Duration::from_millis(4000)]
        );

        cfg.retry_backoff_ms = 1;
        assert!(backoff(&cfg).all(|d| d > Duration::ZERO));

        cfg.retry_backoff_ms = 50_000;
        assert_eq!(backoff(&cfg).last(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_recent_nba_windows() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        let ws = recent_nba_windows(today, 7);
        assert_eq!(
            ws,
            vec![
                Window::Month { season: 2025, month: 2 },
                Window::Month { season: 2025, month: 3 },
            ]
        );

        let autumn = NaiveDate::from_ymd_opt(2024, 11, 1).unwrap();
        assert_eq!(recent_nba_windows(autumn, 3), vec![
            Window::Month { season: 2025, month: 10 },
            Window::Month { season: 2025, month: 11 },
        ]);
        assert_eq!(recent_nba_windows(autumn, 0).len(), 1);
    }

    #[test]
    fn test_current_cfb_week() {
        let d = |m, day| NaiveDate::from_ymd_opt(2025, m, day).unwrap();
        assert_eq!(current_cfb_week(d(8, 20)), Window::Week { season: 2025, week: 1 });
        assert_eq!(current_cfb_week(d(9, 29)), Window::Week { season: 2025, week: 4 });
        assert_eq!(current_cfb_week(d(1, 5)), Window::Week { season: 2024, week: 15 });
    }
}
