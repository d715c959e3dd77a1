//! Pit-stop strategy search and race playback under changing weather.
//!
//! A seeded weather process feeds two consumers that share one per-lap
//! simulation core ([`model::advance_lap`]): the genetic optimizer, which
//! scores candidate pit laps with a headless single-car run, and the race
//! engine, which replays every car's chosen plan over the same weather.

pub mod config;
pub mod engine;
pub mod error;
pub mod leaderboard;
pub mod model;
pub mod optimizer;
pub mod server;
pub mod session;
pub mod tires;
pub mod types;
pub mod weather;

pub use config::{OptimizerConfig, RaceConfig, SimConfig};
pub use engine::{RaceEngine, RaceResult, WinnerReport};
pub use error::ConfigError;
pub use model::{SimulationResult, StrategySimulator};
pub use optimizer::{GeneticOptimizer, OptimizationOutcome};
pub use tires::TireCatalog;
pub use types::{CarState, LapRecord, Strategy, TireCompound, WeatherState};
pub use weather::WeatherSequence;
