use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pit_strategist::leaderboard::{Leaderboard, LeaderboardEntry};
use pit_strategist::server::{self, FeedState};
use pit_strategist::session::{run_session, SessionOutcome};
use pit_strategist::{GeneticOptimizer, SimConfig, TireCatalog, WeatherSequence};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pit_strategist", about = "Pit-stop strategy search and race playback")]
struct Cli {
    /// Race/optimizer configuration (JSON); defaults are used when missing.
    #[arg(long, env = "RACE_CONFIG", default_value = "config/race.json")]
    config: PathBuf,

    /// Overrides the seed from the config file.
    #[arg(long, env = "RACE_SEED")]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search a strategy for a single car and print the generation log.
    Optimize {
        #[arg(long, default_value = "Agent-1")]
        car: String,
    },
    /// Plan every car, run the race and print the standings.
    Race {
        #[arg(long, env = "LEADERBOARD_PATH", default_value = "leaderboard.json")]
        leaderboard: PathBuf,
        #[arg(long)]
        no_leaderboard: bool,
    },
    /// Run a race and serve its history to a visualizer.
    Serve {
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
        #[arg(long, default_value_t = 500)]
        lap_interval_ms: u64,
    },
}

fn load_config(path: &Path) -> Result<SimConfig> {
    if !path.exists() {
        tracing::warn!("{} not found, using built-in defaults", path.display());
        return Ok(SimConfig::default());
    }
    SimConfig::load(path).with_context(|| format!("failed to load {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;
    let seed = cli.seed.or(cfg.seed).unwrap_or_else(rand::random);
    tracing::info!("seed {seed}");

    match cli.command {
        Command::Optimize { car } => optimize(&cfg, &car, seed),
        Command::Race {
            leaderboard,
            no_leaderboard,
        } => {
            let outcome = run_session(&cfg, seed)?;
            print_standings(&outcome);
            if !no_leaderboard {
                update_leaderboard(&outcome, leaderboard)?;
            }
            Ok(())
        }
        Command::Serve {
            port,
            lap_interval_ms,
        } => {
            let outcome = tokio::task::spawn_blocking(move || run_session(&cfg, seed)).await??;
            print_standings(&outcome);
            let state = FeedState::new(outcome.race, Duration::from_millis(lap_interval_ms));
            server::serve(state, port).await
        }
    }
}

fn optimize(cfg: &SimConfig, car: &str, seed: u64) -> Result<()> {
    let tires = TireCatalog::STANDARD;
    let weather = WeatherSequence::generate(
        cfg.race.total_laps,
        cfg.race.min_rain_duration,
        cfg.race.max_rain_duration,
        seed,
    );
    let outcome = GeneticOptimizer::new(&cfg.race, &cfg.optimizer, &tires, &weather, seed)?.run();

    println!("{:>4} {:>6} {:>14} {:>14}", "gen", "nevals", "min", "avg");
    for g in &outcome.log {
        println!(
            "{:>4} {:>6} {:>14.2} {:>14.2}",
            g.generation, g.evaluations, g.min_fitness, g.mean_fitness
        );
    }
    let best = &outcome.best.strategy;
    println!(
        "\n✅ {car}: pit on laps {best}, stints {:?}, time {:.2}s",
        best.stint_lengths(cfg.race.total_laps),
        outcome.best.fitness.unwrap_or(f64::NAN)
    );
    Ok(())
}

fn print_standings(outcome: &SessionOutcome) {
    for plan in &outcome.plans {
        println!("✅ {}: strategy {}", plan.car, plan.strategy);
    }
    println!("\n🏁 Final standings:");
    for car in outcome.race.standings() {
        match car.retired_at_lap {
            Some(lap) if car.is_retired => {
                println!("P{:<2} {:<10} DNF on lap {}", car.position, car.name, lap)
            }
            _ => println!(
                "P{:<2} {:<10} {:.2}s ({} stops)",
                car.position, car.name, car.total_time_s, car.pit_stop_count
            ),
        }
    }
}

fn update_leaderboard(outcome: &SessionOutcome, path: PathBuf) -> Result<()> {
    let Some(report) = outcome.winner_report() else {
        tracing::info!("leader did not finish; leaderboard unchanged");
        return Ok(());
    };
    let mut board = Leaderboard::load(path)?;
    board.record(LeaderboardEntry::from_report(&report));
    board.save()?;

    println!("\n🏆 Hall of fame ({}):", board.path().display());
    for (i, entry) in board.entries().iter().enumerate() {
        let best = entry
            .best_lap_time_s
            .map(|t| format!("{t:.2}s"))
            .unwrap_or_else(|| "N/A".to_string());
        println!(
            "{:>2}. {:<10} total {:.2}s  best lap {}  laps {}  strategy {}",
            i + 1,
            entry.winner,
            entry.total_time_s,
            best,
            entry.total_laps,
            entry.strategy
        );
    }
    Ok(())
}
