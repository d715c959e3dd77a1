use crate::config::SimConfig;
use crate::engine::{RaceEngine, RaceResult, WinnerReport};
use crate::error::ConfigError;
use crate::optimizer::{GenerationStats, GeneticOptimizer};
use crate::tires::TireCatalog;
use crate::types::Strategy;
use crate::weather::WeatherSequence;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
pub struct CarPlan {
    pub car: String,
    pub strategy: Strategy,
    pub fitness: f64,
    pub log: Vec<GenerationStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub seed: u64,
    pub plans: Vec<CarPlan>,
    pub race: RaceResult,
}

impl SessionOutcome {
    pub fn strategies(&self) -> HashMap<String, Strategy> {
        self.plans
            .iter()
            .map(|p| (p.car.clone(), p.strategy.clone()))
            .collect()
    }

    pub fn winner_report(&self) -> Option<WinnerReport> {
        self.race.winner_report(&self.strategies())
    }
}

/// Runs one search per car, in parallel, each on its own seed.
pub fn plan_strategies(
    cfg: &SimConfig,
    tires: &TireCatalog,
    weather: &WeatherSequence,
    seed: u64,
) -> Result<Vec<CarPlan>, ConfigError> {
    let mut master = StdRng::seed_from_u64(seed);
    let jobs: Vec<(&String, u64)> = cfg.grid.iter().map(|car| (car, master.random())).collect();

    jobs.par_iter()
        .map(|&(car, car_seed)| {
            let outcome =
                GeneticOptimizer::new(&cfg.race, &cfg.optimizer, tires, weather, car_seed)?.run();
            tracing::info!(
                "{car}: strategy {} stints {:?}",
                outcome.best.strategy,
                outcome.best.strategy.stint_lengths(cfg.race.total_laps)
            );
            Ok(CarPlan {
                car: car.clone(),
                fitness: outcome.best.fitness.unwrap_or(f64::INFINITY),
                strategy: outcome.best.strategy,
                log: outcome.log,
            })
        })
        .collect()
}

/// Weather, one plan per car, then the race itself, all from one seed.
pub fn run_session(cfg: &SimConfig, seed: u64) -> Result<SessionOutcome, ConfigError> {
    cfg.validate()?;
    let tires = TireCatalog::STANDARD;
    let mut master = StdRng::seed_from_u64(seed);
    let weather_seed: u64 = master.random();
    let plan_seed: u64 = master.random();
    let race_seed: u64 = master.random();

    let weather = WeatherSequence::generate(
        cfg.race.total_laps,
        cfg.race.min_rain_duration,
        cfg.race.max_rain_duration,
        weather_seed,
    );
    tracing::info!("weather: {} of {} laps wet", weather.rain_laps(), weather.len());

    let plans = plan_strategies(cfg, &tires, &weather, plan_seed)?;

    let mut engine = RaceEngine::new(
        cfg.grid.iter().cloned(),
        cfg.race.clone(),
        tires,
        weather,
        race_seed,
    );
    for plan in &plans {
        engine.set_strategy(&plan.car, plan.strategy.clone());
    }
    let race = engine.run();

    Ok(SessionOutcome { seed, plans, race })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OptimizerConfig, RaceConfig};

    fn small() -> SimConfig {
        SimConfig {
            seed: None,
            grid: vec!["A".into(), "B".into(), "C".into()],
            race: RaceConfig { total_laps: 40, ..RaceConfig::default() },
            optimizer: OptimizerConfig {
                population_size: 30,
                max_generations: 8,
                ..OptimizerConfig::default()
            },
        }
    }

    #[test]
    fn every_car_gets_a_plan_and_races_it() {
        let cfg = small();
        let outcome = run_session(&cfg, 2024).unwrap();
        assert_eq!(outcome.plans.len(), 3);
        assert_eq!(outcome.race.cars.len(), 3);
        assert_eq!(outcome.race.history.len(), 40);
        for plan in &outcome.plans {
            assert_eq!(plan.strategy.len(), 2);
            assert_eq!(plan.log.len(), 9);
        }
    }

    #[test]
    fn session_is_reproducible() {
        let cfg = small();
        let a = run_session(&cfg, 7).unwrap();
        let b = run_session(&cfg, 7).unwrap();
        assert_eq!(a.strategies(), b.strategies());
        assert_eq!(a.race.weather, b.race.weather);
        let times = |o: &SessionOutcome| o.race.cars.iter().map(|c| c.total_time_s).collect::<Vec<_>>();
        assert_eq!(times(&a), times(&b));
    }

    #[test]
    fn empty_grid_is_rejected() {
        let cfg = SimConfig { grid: Vec::new(), ..small() };
        assert!(run_session(&cfg, 1).is_err());
    }
}
