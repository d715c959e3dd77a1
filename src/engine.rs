use crate::config::RaceConfig;
use crate::model::{advance_lap, dnf_penalty, LapOutcome};
use crate::tires::TireCatalog;
use crate::types::{CarState, LapRecord, LapStatus, Strategy, WeatherState};
use crate::weather::WeatherSequence;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------- Output types ----------

#[derive(Debug, Clone, Serialize)]
pub struct RaceLapEntry {
    pub car: String,
    /// Rank after every car finished this lap.
    pub position: u32,
    pub record: LapRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct RaceLap {
    pub lap: u32,
    pub weather: WeatherState,
    /// One entry per car, in grid order.
    pub entries: Vec<RaceLapEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RaceResult {
    pub weather: WeatherSequence,
    /// Terminal state of every car, in grid order.
    pub cars: Vec<CarState>,
    pub history: Vec<RaceLap>,
}

/// What the ranked winner storage needs to know about a race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinnerReport {
    pub winner: String,
    pub total_time_s: f64,
    pub best_lap_time_s: Option<f64>,
    pub laps_completed: u32,
    pub strategy: Strategy,
}

impl RaceResult {
    pub fn standings(&self) -> Vec<&CarState> {
        let mut cars: Vec<&CarState> = self.cars.iter().collect();
        cars.sort_by_key(|c| c.position);
        cars
    }

    /// Entries for a 1-based lap number.
    pub fn lap(&self, lap: u32) -> Option<&RaceLap> {
        let idx = (lap as usize).checked_sub(1)?;
        self.history.get(idx)
    }

    /// Fastest lap (pit time included) the car completed without retiring.
    pub fn best_lap_s(&self, car: &str) -> Option<f64> {
        self.history
            .iter()
            .flat_map(|lap| lap.entries.iter())
            .filter(|e| e.car == car && !e.record.is_dnf)
            .map(|e| e.record.elapsed_s())
            .min_by(|a, b| a.total_cmp(b))
    }

    /// `None` when the leading car did not finish.
    pub fn winner_report(&self, strategies: &HashMap<String, Strategy>) -> Option<WinnerReport> {
        let leader = self.standings().into_iter().next()?;
        if leader.is_retired {
            return None;
        }
        Some(WinnerReport {
            winner: leader.name.clone(),
            total_time_s: leader.total_time_s,
            best_lap_time_s: self.best_lap_s(&leader.name),
            laps_completed: leader.lap_index,
            strategy: strategies.get(&leader.name).cloned().unwrap_or_default(),
        })
    }
}

// ---------- Engine ----------

struct Entrant {
    car: CarState,
    strategy: Strategy,
    rng: StdRng,
}

impl Entrant {
    fn run_lap(
        &mut self,
        lap_index: usize,
        weather: &WeatherSequence,
        race: &RaceConfig,
        tires: &TireCatalog,
    ) -> LapRecord {
        let lap = lap_index as u32 + 1;
        if self.car.is_retired {
            return LapRecord::retired(&self.car, lap, weather[lap_index], LapStatus::Retired);
        }

        match advance_lap(&mut self.car, lap_index, &self.strategy, weather, race, tires, &mut self.rng) {
            LapOutcome::Completed(record) => {
                if record.status == LapStatus::EmergencyPit {
                    tracing::debug!("{} emergency stop on lap {}", self.car.name, lap);
                }
                record
            }
            LapOutcome::Retired(cause) => {
                self.car.total_time_s += dnf_penalty(self.car.lap_index);
                tracing::debug!("{} retired on lap {} ({:?})", self.car.name, lap, cause);
                LapRecord::retired(&self.car, lap, weather[lap_index], cause.into())
            }
        }
    }
}

/// Plays back a whole field over one shared weather sequence.
///
/// Every car keeps its own state and random stream, so the per-lap updates
/// run in parallel; ranking after each lap is the only point where cars meet.
pub struct RaceEngine {
    race: RaceConfig,
    tires: TireCatalog,
    weather: WeatherSequence,
    entrants: Vec<Entrant>,
}

impl RaceEngine {
    pub fn new<I, S>(
        car_names: I,
        race: RaceConfig,
        tires: TireCatalog,
        weather: WeatherSequence,
        seed: u64,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut master = StdRng::seed_from_u64(seed);
        let entrants = car_names
            .into_iter()
            .map(|name| Entrant {
                car: CarState::new(name),
                strategy: Strategy::default(),
                rng: StdRng::seed_from_u64(master.random()),
            })
            .collect();
        Self {
            race,
            tires,
            weather,
            entrants,
        }
    }

    /// Assigns a car's pit plan. Unknown names are ignored; a car left without
    /// a plan only ever stops in an emergency.
    pub fn set_strategy(&mut self, car: &str, strategy: Strategy) -> bool {
        match self.entrants.iter_mut().find(|e| e.car.name == car) {
            Some(entrant) => {
                entrant.strategy = strategy;
                true
            }
            None => {
                tracing::warn!("no car named {car} on the grid");
                false
            }
        }
    }

    pub fn set_strategies(&mut self, strategies: &HashMap<String, Strategy>) {
        for (car, strategy) in strategies {
            self.set_strategy(car, strategy.clone());
        }
    }

    pub fn weather(&self) -> &WeatherSequence {
        &self.weather
    }

    pub fn run(mut self) -> RaceResult {
        let lap_count = (self.race.total_laps as usize).min(self.weather.len());
        let mut history = Vec::with_capacity(lap_count);

        for lap_index in 0..lap_count {
            let (weather, race, tires) = (&self.weather, &self.race, &self.tires);
            let records: Vec<LapRecord> = self
                .entrants
                .par_iter_mut()
                .map(|entrant| entrant.run_lap(lap_index, weather, race, tires))
                .collect();

            self.rank();

            let entries = self
                .entrants
                .iter()
                .zip(records)
                .map(|(entrant, record)| RaceLapEntry {
                    car: entrant.car.name.clone(),
                    position: entrant.car.position,
                    record,
                })
                .collect();
            history.push(RaceLap {
                lap: lap_index as u32 + 1,
                weather: self.weather[lap_index],
                entries,
            });
        }

        let retired = self.entrants.iter().filter(|e| e.car.is_retired).count();
        tracing::info!(
            "race finished: {} laps, {} cars, {} retired",
            lap_count,
            self.entrants.len(),
            retired
        );

        RaceResult {
            weather: self.weather,
            cars: self.entrants.into_iter().map(|e| e.car).collect(),
            history,
        }
    }

    /// Running cars by ascending time, then retired cars by their frozen time.
    fn rank(&mut self) {
        let mut order: Vec<usize> = (0..self.entrants.len()).collect();
        order.sort_by(|&a, &b| {
            let (ca, cb) = (&self.entrants[a].car, &self.entrants[b].car);
            ca.is_retired
                .cmp(&cb.is_retired)
                .then(ca.total_time_s.total_cmp(&cb.total_time_s))
        });
        for (rank, idx) in order.into_iter().enumerate() {
            self.entrants[idx].car.position = rank as u32 + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Vec<String> {
        (1..=4).map(|i| format!("Car-{i}")).collect()
    }

    #[test]
    fn history_has_every_car_every_lap() {
        let race = RaceConfig::default();
        let weather = WeatherSequence::generate(race.total_laps, 3, 8, 3);
        let mut engine = RaceEngine::new(grid(), race.clone(), TireCatalog::STANDARD, weather, 3);
        engine.set_strategy("Car-1", Strategy::from_laps(vec![15, 30]));

        let result = engine.run();
        assert_eq!(result.history.len(), 50);
        for (i, lap) in result.history.iter().enumerate() {
            assert_eq!(lap.lap, i as u32 + 1);
            assert_eq!(lap.entries.len(), 4);
            let mut positions: Vec<u32> = lap.entries.iter().map(|e| e.position).collect();
            positions.sort_unstable();
            assert_eq!(positions, vec![1, 2, 3, 4]);
        }
    }

    #[test]
    fn retired_car_ranks_behind_running_cars() {
        // a two-lap tire life forces a burst early on
        let race = RaceConfig { total_laps: 20, ..RaceConfig::default() };
        let weather = WeatherSequence::from_states(vec![WeatherState::Dry; 20]);
        let tires = TireCatalog::STANDARD.with_lifespan_factor(0.2);
        let mut engine = RaceEngine::new(["Fresh", "Worn"], race, tires, weather, 1);
        // Soft tires from lap 2 keep the first car inside its short life
        engine.set_strategy("Fresh", Strategy::from_laps(vec![2, 4, 6, 8, 10, 12, 14, 16, 18, 20]));

        let result = engine.run();
        let worn = result.cars.iter().find(|c| c.name == "Worn").unwrap();
        assert!(worn.is_retired);
        // Medium life is 0.2 * 100 / 6.5 ~ 3.1 laps, so lap 5 starts over age
        assert_eq!(worn.retired_at_lap, Some(5));
        assert_eq!(worn.position, 2);
        assert!(worn.total_time_s > 4_000_000.0);

        for lap in &result.history[4..] {
            let entry = lap.entries.iter().find(|e| e.car == "Worn").unwrap();
            assert!(entry.record.is_dnf);
            assert_eq!(entry.record.lap_time_s, 0.0);
            assert_eq!(entry.position, 2);
        }
        assert_eq!(result.history[4].entries[1].record.status, LapStatus::TireBurst);
        assert_eq!(result.history[5].entries[1].record.status, LapStatus::Retired);
    }

    #[test]
    fn winner_report_uses_fastest_clean_lap() {
        let race = RaceConfig { total_laps: 30, ..RaceConfig::default() };
        let weather = WeatherSequence::from_states(vec![WeatherState::Dry; 30]);
        let mut strategies = HashMap::new();
        strategies.insert("A".to_string(), Strategy::from_laps(vec![12, 20]));
        let mut engine = RaceEngine::new(["A"], race, TireCatalog::STANDARD, weather, 5);
        engine.set_strategies(&strategies);

        let result = engine.run();
        let report = result.winner_report(&strategies).unwrap();
        assert_eq!(report.winner, "A");
        assert_eq!(report.laps_completed, 30);
        assert_eq!(report.strategy.laps(), &[12, 20]);

        let fastest = result.history[0..30]
            .iter()
            .map(|l| l.entries[0].record.elapsed_s())
            .fold(f64::INFINITY, f64::min);
        assert_eq!(report.best_lap_time_s, Some(fastest));
    }

    #[test]
    fn no_winner_report_when_leader_retired() {
        // no plan over 80 laps: the emergency Hard set overheats on lap 55
        let race = RaceConfig { total_laps: 80, ..RaceConfig::default() };
        let weather = WeatherSequence::from_states(vec![WeatherState::Dry; 80]);
        let engine = RaceEngine::new(["Solo", "Other"], race, TireCatalog::STANDARD, weather, 6);

        let result = engine.run();
        assert!(result.cars.iter().all(|c| c.is_retired));
        assert!(result.standings()[0].is_retired);
        assert_eq!(result.winner_report(&HashMap::new()), None);
    }

    #[test]
    fn unknown_car_strategy_is_ignored() {
        let race = RaceConfig::default();
        let weather = WeatherSequence::generate(race.total_laps, 3, 8, 1);
        let mut engine = RaceEngine::new(["A"], race, TireCatalog::STANDARD, weather, 1);
        assert!(!engine.set_strategy("B", Strategy::from_laps(vec![20])));
        assert!(engine.set_strategy("A", Strategy::from_laps(vec![20])));
    }
}
