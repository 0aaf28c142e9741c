mod config;
mod export;
mod models;
mod pipeline;
mod scraper;
mod sites;
mod storage;
mod utils;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppConfig;
use crate::models::{ApiResponse, ScrapeReport, Sport, Status, Window};
use crate::pipeline::Pipeline;
use crate::scraper::HttpClient;
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "sports-etl", about = "Sports & esports box score ETL", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Apply schema migrations without scraping
    Migrate,

    /// Scrape one window of one sport
    Scrape {
        #[command(subcommand)]
        target: ScrapeTarget,
    },

    /// Scrape the NBA months covering the last N days
    RecentNba {
        #[arg(short, long, default_value_t = 3)]
        days: i64,
    },

    /// List stored games, newest first
    Games {
        #[arg(short, long, value_enum)]
        sport: Sport,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// List stored teams
    Teams {
        #[arg(short, long, value_enum)]
        sport: Sport,
    },

    /// List stored players
    Players {
        #[arg(short, long, value_enum)]
        sport: Sport,
        #[arg(short, long)]
        team: Option<String>,
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
    },

    /// Stat lines of one game
    Stats {
        #[arg(short, long, value_enum)]
        sport: Sport,
        #[arg(short, long)]
        game_id: String,
    },

    /// Row counts and date coverage per sport
    Summary {
        /// Print a plain table instead of JSON
        #[arg(long)]
        table: bool,
    },

    /// Write every stat line of a sport to CSV
    Export {
        #[arg(short, long, value_enum)]
        sport: Sport,
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum ScrapeTarget {
    /// basketball-reference, one month of a season (season = year it ends)
    Nba {
        #[arg(long)]
        season: i32,
        #[arg(long, value_parser = utils::parse_cli_month)]
        month: u32,
    },
    /// pro-football-reference, one week
    Nfl {
        #[arg(long)]
        season: i32,
        #[arg(long)]
        week: u32,
    },
    /// hockey-reference, games between two dates (inclusive)
    Nhl {
        #[arg(long)]
        season: i32,
        #[arg(long, value_parser = utils::parse_cli_date)]
        from: NaiveDate,
        #[arg(long, value_parser = utils::parse_cli_date)]
        to: NaiveDate,
    },
    /// sports-reference/cfb, one week; the current week when omitted
    Cfb {
        #[arg(long, requires = "week")]
        year: Option<i32>,
        #[arg(long, requires = "year")]
        week: Option<u32>,
    },
    /// gol.gg, one tournament; LCS, LEC, LCK and LPL when omitted
    Lol {
        #[arg(long)]
        tournament: Option<String>,
        #[arg(long)]
        season: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "sports_etl=info,warn",
        1 => "sports_etl=debug,info",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // stdout carries the JSON results
    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(cli.command).await {
        Ok(Status::Success) => ExitCode::SUCCESS,
        Ok(Status::Error) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            print_json(&ApiResponse::<()>::error(format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<Status> {
    let config = AppConfig::load()?;

    match command {
        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            info!("Migrations applied to {:?}", config.storage.db_path);
        }

        Command::Scrape { target } => {
            let _t = utils::Timer::start("Scrape");
            let repo = open_repo(&config)?;
            let client = HttpClient::new(&config.scraper)?;
            let pipeline = Pipeline::new(config, &client, &repo);

            let report = match target {
                ScrapeTarget::Nba { season, month } => {
                    pipeline.scrape(Sport::Nba, &Window::Month { season, month }).await
                }
                ScrapeTarget::Nfl { season, week } => {
                    pipeline.scrape(Sport::Nfl, &Window::Week { season, week }).await
                }
                ScrapeTarget::Nhl { season, from, to } => {
                    pipeline.scrape(Sport::Nhl, &Window::DateRange { season, from, to }).await
                }
                ScrapeTarget::Cfb { year: Some(season), week: Some(week) } => {
                    pipeline.scrape(Sport::Cfb, &Window::Week { season, week }).await
                }
                ScrapeTarget::Cfb { .. } => pipeline.scrape_current_cfb_week().await,
                ScrapeTarget::Lol { tournament: Some(id), season } => {
                    let season = season.unwrap_or_else(|| sites::lol::DEFAULT_SEASON.to_string());
                    pipeline.scrape(Sport::Lol, &Window::Tournament { id, season }).await
                }
                ScrapeTarget::Lol { tournament: None, season } => {
                    pipeline.scrape_default_tournaments(season.as_deref()).await
                }
            };
            return Ok(print_report(&report));
        }

        Command::RecentNba { days } => {
            let _t = utils::Timer::start(format!("NBA, last {} days", days));
            let repo = open_repo(&config)?;
            let client = HttpClient::new(&config.scraper)?;
            let report = Pipeline::new(config, &client, &repo).scrape_recent_nba(days).await;
            return Ok(print_report(&report));
        }

        Command::Games { sport, limit } => {
            let games = open_repo(&config)?.list_games(sport, limit)?;
            print_json(&ApiResponse::success(games));
        }

        Command::Teams { sport } => {
            let teams = open_repo(&config)?.list_teams(sport)?;
            print_json(&ApiResponse::success(teams));
        }

        Command::Players { sport, team, limit } => {
            let players = open_repo(&config)?.list_players(sport, team.as_deref(), limit)?;
            print_json(&ApiResponse::success(players));
        }

        Command::Stats { sport, game_id } => {
            let rows = open_repo(&config)?.stat_rows(sport, Some(&game_id))?;
            if rows.is_empty() {
                print_json(&ApiResponse::<()>::error(format!("no stat lines for {} game {}", sport, game_id)));
                return Ok(Status::Error);
            }
            print_json(&ApiResponse::success(rows));
        }

        Command::Summary { table } => {
            let summary = open_repo(&config)?.summary()?;
            if !table {
                print_json(&ApiResponse::success(summary));
                return Ok(Status::Success);
            }
            println!("──────────────────────────────────────────────────────────────────");
            println!("  {:<5} {:>9} {:>7} {:>9} {:>11}  {:<10} {:<10}", "sport", "games", "teams", "players", "stat rows", "from", "to");
            println!("──────────────────────────────────────────────────────────────────");
            for s in &summary {
                println!(
                    "  {:<5} {:>9} {:>7} {:>9} {:>11}  {:<10} {:<10}",
                    s.sport,
                    utils::fmt_number(s.counts.games),
                    utils::fmt_number(s.counts.teams),
                    utils::fmt_number(s.counts.players),
                    utils::fmt_number(s.counts.player_stats),
                    s.first_game.map(|d| d.to_string()).unwrap_or_else(|| "—".into()),
                    s.last_game.map(|d| d.to_string()).unwrap_or_else(|| "—".into()),
                );
            }
            println!("──────────────────────────────────────────────────────────────────");
        }

        Command::Export { sport, out } => {
            let repo = open_repo(&config)?;
            let n = export::export_player_stats(&repo, sport, &out)
                .with_context(|| format!("export {} to {:?}", sport, out))?;
            print_json(&serde_json::json!({
                "status": Status::Success,
                "count": n,
                "path": out,
            }));
        }
    }

    Ok(Status::Success)
}

fn open_repo(config: &AppConfig) -> Result<Repository> {
    let repo = Repository::open(&config.storage.db_path)?;
    if config.storage.run_migrations {
        repo.run_migrations()?;
    }
    Ok(repo)
}

fn print_report(report: &ScrapeReport) -> Status {
    print_json(report);
    report.status
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => error!("Could not serialise output: {}", e),
    }
}
