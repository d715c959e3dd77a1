use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TireCompound {
    Soft,
    Medium,
    Hard,
    Intermediate,
    Wet,
}

impl TireCompound {
    pub const ALL: [TireCompound; 5] = [
        TireCompound::Soft,
        TireCompound::Medium,
        TireCompound::Hard,
        TireCompound::Intermediate,
        TireCompound::Wet,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TireCompound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherState {
    Dry,
    LightRain,
    MediumRain,
    HeavyRain,
}

impl WeatherState {
    pub fn is_rain(self) -> bool {
        !matches!(self, WeatherState::Dry)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Ascending pit-stop laps (1-based) for one car.
///
/// Construction always sorts, so every holder sees laps in race order. Spacing
/// between stops is not enforced here: the optimizer keeps it by construction
/// and the simulator prices violations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<u32>", into = "Vec<u32>")]
pub struct Strategy(Vec<u32>);

impl Strategy {
    pub fn from_laps(mut laps: Vec<u32>) -> Self {
        laps.sort_unstable();
        Strategy(laps)
    }

    pub fn laps(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, lap: u32) -> bool {
        self.0.binary_search(&lap).is_ok()
    }

    /// First scheduled stop strictly after `lap`, if any.
    pub fn next_stop_after(&self, lap: u32) -> Option<u32> {
        self.0.iter().copied().find(|&stop| stop > lap)
    }

    /// Length of every stint, the final run to the flag included.
    pub fn stint_lengths(&self, total_laps: u32) -> Vec<u32> {
        let mut stints = Vec::with_capacity(self.0.len() + 1);
        let mut last = 0;
        for &stop in &self.0 {
            stints.push(stop.saturating_sub(last));
            last = stop;
        }
        stints.push(total_laps.saturating_sub(last));
        stints
    }
}

impl From<Vec<u32>> for Strategy {
    fn from(laps: Vec<u32>) -> Self {
        Strategy::from_laps(laps)
    }
}

impl From<Strategy> for Vec<u32> {
    fn from(strategy: Strategy) -> Self {
        strategy.0
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetirementCause {
    /// Tire age went past the compound's lifespan.
    TireBurst,
    /// Wear reached the hard ceiling during a lap.
    Overheat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LapStatus {
    Racing,
    PlannedPit,
    EmergencyPit,
    TireBurst,
    Overheat,
    Retired,
}

impl From<RetirementCause> for LapStatus {
    fn from(cause: RetirementCause) -> Self {
        match cause {
            RetirementCause::TireBurst => LapStatus::TireBurst,
            RetirementCause::Overheat => LapStatus::Overheat,
        }
    }
}

/// Mutable per-car race state, one per simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarState {
    pub name: String,
    /// Laps fully completed so far.
    pub lap_index: u32,
    pub total_time_s: f64,
    pub current_tire: TireCompound,
    pub tire_wear_pct: f64,
    pub tire_age_laps: u32,
    pub pit_stop_count: u32,
    pub last_pit_lap: u32,
    pub is_retired: bool,
    pub retired_at_lap: Option<u32>,
    pub retirement_cause: Option<RetirementCause>,
    pub emergency_pit_used: bool,
    pub position: u32,
}

impl CarState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lap_index: 0,
            total_time_s: 0.0,
            current_tire: TireCompound::Medium,
            tire_wear_pct: 0.0,
            tire_age_laps: 0,
            pit_stop_count: 0,
            last_pit_lap: 0,
            is_retired: false,
            retired_at_lap: None,
            retirement_cause: None,
            emergency_pit_used: false,
            position: 0,
        }
    }

    pub(crate) fn fit_tire(&mut self, compound: TireCompound) {
        self.current_tire = compound;
        self.tire_wear_pct = 0.0;
        self.tire_age_laps = 0;
    }
}

/// Telemetry snapshot for one car on one lap. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapRecord {
    pub lap: u32,
    pub weather: WeatherState,
    pub tire: TireCompound,
    pub tire_wear_pct: f64,
    pub tire_age_laps: u32,
    pub lap_time_s: f64,
    pub pit_time_s: f64,
    pub total_time_s: f64,
    pub pit_stop_count: u32,
    pub status: LapStatus,
    pub is_dnf: bool,
    pub retired_at_lap: Option<u32>,
}

impl LapRecord {
    /// Zero-time entry for a car that is out of the race on `lap`.
    pub fn retired(car: &CarState, lap: u32, weather: WeatherState, status: LapStatus) -> Self {
        Self {
            lap,
            weather,
            tire: car.current_tire,
            tire_wear_pct: car.tire_wear_pct,
            tire_age_laps: car.tire_age_laps,
            lap_time_s: 0.0,
            pit_time_s: 0.0,
            total_time_s: car.total_time_s,
            pit_stop_count: car.pit_stop_count,
            status,
            is_dnf: true,
            retired_at_lap: car.retired_at_lap,
        }
    }

    /// Time the car spent on this lap, pit lane included.
    pub fn elapsed_s(&self) -> f64 {
        self.lap_time_s + self.pit_time_s
    }
}
