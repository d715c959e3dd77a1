use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Race parameters shared by the simulator, optimizer and engine.
///
/// Inconsistent stint constraints are accepted here and clamped by the
/// consumers; only values that cannot describe a race at all are rejected.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RaceConfig {
    pub total_laps: u32,
    pub base_lap_time: f64,
    /// Width of the uniform base lap time draw above `base_lap_time`.
    pub lap_time_jitter: f64,
    pub time_penalty_per_percent_wear: f64,
    pub pit_stop_extra_time_avg: f64,
    pub required_pit_stops: u32,
    pub min_stint_length: u32,
    pub min_rain_duration: u32,
    pub max_rain_duration: u32,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            total_laps: 50,
            base_lap_time: 90.0,
            lap_time_jitter: 9.0,
            time_penalty_per_percent_wear: 0.05,
            pit_stop_extra_time_avg: 22.0,
            required_pit_stops: 2,
            min_stint_length: 10,
            min_rain_duration: 3,
            max_rain_duration: 8,
        }
    }
}

impl RaceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_laps == 0 {
            return Err(ConfigError::invalid("race.total_laps", "must be > 0"));
        }
        if !(self.base_lap_time.is_finite() && self.base_lap_time > 0.0) {
            return Err(ConfigError::invalid("race.base_lap_time", "must be a positive number"));
        }
        if !(self.lap_time_jitter.is_finite() && self.lap_time_jitter >= 0.0) {
            return Err(ConfigError::invalid("race.lap_time_jitter", "must be >= 0"));
        }
        if !self.time_penalty_per_percent_wear.is_finite()
            || !self.pit_stop_extra_time_avg.is_finite()
        {
            return Err(ConfigError::invalid("race", "time penalties must be finite"));
        }
        Ok(())
    }
}

/// Genetic search settings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    pub population_size: usize,
    pub p_crossover: f64,
    pub p_mutation: f64,
    pub max_generations: u32,
    pub hall_of_fame_size: usize,
    pub tournament_size: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            population_size: 500,
            p_crossover: 0.9,
            p_mutation: 0.2,
            max_generations: 80,
            hall_of_fame_size: 3,
            tournament_size: 3,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::invalid("optimizer.population_size", "must be > 0"));
        }
        if self.tournament_size == 0 {
            return Err(ConfigError::invalid("optimizer.tournament_size", "must be > 0"));
        }
        if self.hall_of_fame_size == 0 {
            return Err(ConfigError::invalid(
                "optimizer.hall_of_fame_size",
                "must be > 0 so the best strategy survives each generation",
            ));
        }
        if self.hall_of_fame_size > self.population_size {
            return Err(ConfigError::invalid(
                "optimizer.hall_of_fame_size",
                format!("{} exceeds population size {}", self.hall_of_fame_size, self.population_size),
            ));
        }
        for (field, p) in [
            ("optimizer.p_crossover", self.p_crossover),
            ("optimizer.p_mutation", self.p_mutation),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::invalid(field, format!("{p} is not a probability")));
            }
        }
        Ok(())
    }
}

/// Whole run configuration as stored on disk.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    pub seed: Option<u64>,
    pub grid: Vec<String>,
    pub race: RaceConfig,
    pub optimizer: OptimizerConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: None,
            grid: (1..=10).map(|i| format!("Agent-{i}")).collect(),
            race: RaceConfig::default(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: SimConfig = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid.is_empty() {
            return Err(ConfigError::invalid("grid", "needs at least one car"));
        }
        self.race.validate()?;
        self.optimizer.validate()
    }
}
