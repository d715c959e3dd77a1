use crate::config::RaceConfig;
use crate::tires::TireCatalog;
use crate::types::{CarState, LapRecord, LapStatus, RetirementCause, Strategy, TireCompound, WeatherState};
use crate::weather::WeatherSequence;
use rand::Rng;
use serde::Serialize;

/// Wear above which a car dives into the pits once per race.
pub const EMERGENCY_WEAR_PCT: f64 = 95.0;
pub const WEAR_LIMIT_PCT: f64 = 100.0;
pub const DNF_BASE_PENALTY_S: f64 = 5_000_000.0;
pub const DNF_PENALTY_PER_LAP_S: f64 = 10_000.0;
pub const STOP_DEVIATION_PENALTY_S: f64 = 15_000.0;

/// What happened to a car on one lap.
#[derive(Debug, Clone, PartialEq)]
pub enum LapOutcome {
    Completed(LapRecord),
    Retired(RetirementCause),
}

/// Advances `car` through lap `lap_index` (0-based).
///
/// This is the one per-lap transition used both for fitness scoring and for
/// multi-car playback. On retirement the car is marked retired and no time is
/// added for the lap; penalties are left to the caller.
pub fn advance_lap<R: Rng + ?Sized>(
    car: &mut CarState,
    lap_index: usize,
    strategy: &Strategy,
    weather: &WeatherSequence,
    race: &RaceConfig,
    tires: &TireCatalog,
    rng: &mut R,
) -> LapOutcome {
    let lap = lap_index as u32 + 1;
    let current_weather = weather[lap_index];
    let mut pit_time = 0.0;
    let mut status = LapStatus::Racing;

    if car.tire_wear_pct > EMERGENCY_WEAR_PCT && !car.emergency_pit_used {
        car.fit_tire(TireCompound::Hard);
        pit_time = race.pit_stop_extra_time_avg;
        car.pit_stop_count += 1;
        car.last_pit_lap = lap;
        car.emergency_pit_used = true;
        status = LapStatus::EmergencyPit;
    }

    if strategy.contains(lap) {
        let stint_end = strategy.next_stop_after(lap).unwrap_or(race.total_laps + 1);
        let compound = choose_compound(forecast(weather, lap, stint_end));
        car.fit_tire(compound);
        pit_time = race.pit_stop_extra_time_avg;
        car.pit_stop_count += 1;
        car.last_pit_lap = lap;
        status = LapStatus::PlannedPit;
    }

    if car.tire_age_laps as f64 > tires.lifespan_laps(car.current_tire) {
        retire(car, lap, RetirementCause::TireBurst);
        return LapOutcome::Retired(RetirementCause::TireBurst);
    }

    let mut lap_time = race.base_lap_time + rng.random::<f64>() * race.lap_time_jitter;
    lap_time += race.time_penalty_per_percent_wear * car.tire_wear_pct;
    lap_time += tires.mismatch_penalty(current_weather, car.current_tire);

    car.tire_wear_pct += tires.wear_rate(car.current_tire);
    car.tire_age_laps += 1;
    if car.tire_wear_pct >= WEAR_LIMIT_PCT {
        retire(car, lap, RetirementCause::Overheat);
        return LapOutcome::Retired(RetirementCause::Overheat);
    }

    car.total_time_s += lap_time + pit_time;
    car.lap_index = lap;

    LapOutcome::Completed(LapRecord {
        lap,
        weather: current_weather,
        tire: car.current_tire,
        tire_wear_pct: car.tire_wear_pct,
        tire_age_laps: car.tire_age_laps,
        lap_time_s: lap_time,
        pit_time_s: pit_time,
        total_time_s: car.total_time_s,
        pit_stop_count: car.pit_stop_count,
        status,
        is_dnf: false,
        retired_at_lap: None,
    })
}

fn retire(car: &mut CarState, lap: u32, cause: RetirementCause) {
    car.is_retired = true;
    car.retired_at_lap = Some(lap);
    car.retirement_cause = Some(cause);
}

/// Weather from `lap` up to (not including) `stint_end`, both 1-based.
fn forecast(weather: &WeatherSequence, lap: u32, stint_end: u32) -> &[WeatherState] {
    let states = weather.states();
    let start = (lap as usize - 1).min(states.len());
    let end = (stint_end as usize - 1).clamp(start, states.len());
    &states[start..end]
}

/// Compound for a stint that will see `window`.
pub fn choose_compound(window: &[WeatherState]) -> TireCompound {
    let has = |w: WeatherState| window.contains(&w);
    let heavy_or_medium = has(WeatherState::HeavyRain) || has(WeatherState::MediumRain);
    if has(WeatherState::Dry) {
        if heavy_or_medium {
            TireCompound::Wet
        } else if has(WeatherState::LightRain) {
            TireCompound::Intermediate
        } else {
            TireCompound::Soft
        }
    } else if has(WeatherState::LightRain) {
        TireCompound::Intermediate
    } else {
        TireCompound::Wet
    }
}

/// Time added to a retired car; earlier retirements cost more.
pub fn dnf_penalty(laps_completed: u32) -> f64 {
    (DNF_BASE_PENALTY_S - DNF_PENALTY_PER_LAP_S * laps_completed as f64).max(0.0)
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    /// Race time plus every penalty; this is the optimizer's fitness.
    pub total_time_s: f64,
    pub pit_stop_count: u32,
    pub is_dnf: bool,
    pub retired_at_lap: Option<u32>,
    pub retirement_cause: Option<RetirementCause>,
    pub laps: Vec<LapRecord>,
}

impl SimulationResult {
    pub fn laps_completed(&self) -> u32 {
        self.laps.len() as u32
    }

    pub fn best_lap_s(&self) -> Option<f64> {
        self.laps
            .iter()
            .map(LapRecord::elapsed_s)
            .min_by(|a, b| a.total_cmp(b))
    }
}

/// Single-car headless race used as the optimizer's fitness oracle.
pub struct StrategySimulator<'a> {
    race: &'a RaceConfig,
    tires: &'a TireCatalog,
    weather: &'a WeatherSequence,
}

impl<'a> StrategySimulator<'a> {
    pub fn new(race: &'a RaceConfig, tires: &'a TireCatalog, weather: &'a WeatherSequence) -> Self {
        Self { race, tires, weather }
    }

    /// Simulates one car from a fresh Medium set.
    ///
    /// Laps are bounded by both the configured race length and the weather
    /// sequence. After the loop a retired car pays [`dnf_penalty`], and any
    /// difference between the stops made and the target (required stops, one
    /// more if the emergency stop was used) costs
    /// [`STOP_DEVIATION_PENALTY_S`] per stop.
    pub fn simulate<R: Rng + ?Sized>(&self, strategy: &Strategy, rng: &mut R) -> SimulationResult {
        let mut car = CarState::new("sim");
        let lap_count = (self.race.total_laps as usize).min(self.weather.len());
        let mut laps = Vec::with_capacity(lap_count);

        for lap_index in 0..lap_count {
            match advance_lap(&mut car, lap_index, strategy, self.weather, self.race, self.tires, rng) {
                LapOutcome::Completed(record) => laps.push(record),
                LapOutcome::Retired(_) => break,
            }
        }

        let mut total_time = car.total_time_s;
        if car.is_retired {
            total_time += dnf_penalty(laps.len() as u32);
        }

        let target = self.race.required_pit_stops + u32::from(car.emergency_pit_used);
        let deviation = car.pit_stop_count.abs_diff(target);
        total_time += STOP_DEVIATION_PENALTY_S * deviation as f64;

        SimulationResult {
            total_time_s: total_time,
            pit_stop_count: car.pit_stop_count,
            is_dnf: car.is_retired,
            retired_at_lap: car.retired_at_lap,
            retirement_cause: car.retirement_cause,
            laps,
        }
    }

    pub fn fitness<R: Rng + ?Sized>(&self, strategy: &Strategy, rng: &mut R) -> f64 {
        self.simulate(strategy, rng).total_time_s
    }
}
