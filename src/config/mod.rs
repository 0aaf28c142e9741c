use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::Sport;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub sites: SitesConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// HTTP fetch + politeness settings shared by every site
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Random extra delay (0..=jitter_ms) added to each site's fixed delay.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Extra attempts after the first for transport errors, 429 and 5xx.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Per-site base URLs and inter-request delays
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SitesConfig {
    #[serde(default = "default_nba")]
    pub nba: SiteConfig,
    #[serde(default = "default_nfl")]
    pub nfl: SiteConfig,
    #[serde(default = "default_nhl")]
    pub nhl: SiteConfig,
    #[serde(default = "default_cfb")]
    pub cfb: SiteConfig,
    #[serde(default = "default_lol")]
    pub lol: SiteConfig,

    /// Pause between tournaments when scraping the default LoL set.
    #[serde(default = "default_tournament_pause_ms")]
    pub tournament_pause_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    /// Empty means the sport's public site
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_timeout_secs() -> u64 {
    10
}
fn default_jitter_ms() -> u64 {
    250
}
fn default_max_retries() -> usize {
    2
}
fn default_retry_backoff_ms() -> u64 {
    1000
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36"
        .to_string()
}
fn default_request_delay_ms() -> u64 {
    3000
}
fn site(base_url: &str, request_delay_ms: u64) -> SiteConfig {
    SiteConfig {
        base_url: base_url.to_string(),
        request_delay_ms,
    }
}
fn default_site(sport: Sport) -> SiteConfig {
    match sport {
        Sport::Nba => site("https://www.basketball-reference.com", 3000),
        Sport::Nfl => site("https://www.pro-football-reference.com", 3000),
        Sport::Nhl => site("https://www.hockey-reference.com", 3000),
        Sport::Cfb => site("https://www.sports-reference.com/cfb", 3000),
        Sport::Lol => site("https://gol.gg", 2000),
    }
}
fn default_nba() -> SiteConfig {
    default_site(Sport::Nba)
}
fn default_nfl() -> SiteConfig {
    default_site(Sport::Nfl)
}
fn default_nhl() -> SiteConfig {
    default_site(Sport::Nhl)
}
fn default_cfb() -> SiteConfig {
    default_site(Sport::Cfb)
}
fn default_lol() -> SiteConfig {
    default_site(Sport::Lol)
}
fn default_tournament_pause_ms() -> u64 {
    5000
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/sports.duckdb")
}
fn default_true() -> bool {
    true
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            jitter_ms: default_jitter_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for SitesConfig {
    fn default() -> Self {
        Self {
            nba: default_nba(),
            nfl: default_nfl(),
            nhl: default_nhl(),
            cfb: default_cfb(),
            lol: default_lol(),
            tournament_pause_ms: default_tournament_pause_ms(),
        }
    }
}

impl SitesConfig {
    pub fn for_sport(&self, sport: Sport) -> &SiteConfig {
        match sport {
            Sport::Nba => &self.nba,
            Sport::Nfl => &self.nfl,
            Sport::Nhl => &self.nhl,
            Sport::Cfb => &self.cfb,
            Sport::Lol => &self.lol,
        }
    }

    fn site_mut(&mut self, sport: Sport) -> &mut SiteConfig {
        match sport {
            Sport::Nba => &mut self.nba,
            Sport::Nfl => &mut self.nfl,
            Sport::Nhl => &mut self.nhl,
            Sport::Cfb => &mut self.cfb,
            Sport::Lol => &mut self.lol,
        }
    }

    /// A site section that only overrides the delay keeps the default URL.
    fn fill_base_urls(&mut self) {
        for sport in Sport::ALL {
            let site = self.site_mut(sport);
            if site.base_url.trim().is_empty() {
                site.base_url = default_site(sport).base_url;
            }
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            run_migrations: true,
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("SPORTS").separator("__"))
            .build()
            .context("Failed to read configuration sources")?;

        Self::from_config(cfg)
            .context("Invalid configuration (check config/*.toml and SPORTS__* variables)")
    }

    fn from_config(cfg: config::Config) -> Result<Self> {
        let mut app: AppConfig = cfg.try_deserialize()?;
        app.sites.fill_base_urls();
        Ok(app)
    }

    /// Zero delays, no retries and an in-memory-friendly setup for tests.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        let mut cfg = AppConfig::default();
        cfg.scraper.jitter_ms = 0;
        cfg.scraper.max_retries = 0;
        cfg.scraper.retry_backoff_ms = 0;
        for sport in Sport::ALL {
            cfg.sites.site_mut(sport).request_delay_ms = 0;
        }
        cfg.sites.tournament_pause_ms = 0;
        cfg
    }
}
