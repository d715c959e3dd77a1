use crate::types::{TireCompound, WeatherState};

/// Wear rates, lifespans and weather mismatch penalties for every compound.
#[derive(Debug, Clone, PartialEq)]
pub struct TireCatalog {
    /// Wear (percent) per lap, indexed by compound.
    wear_rates: [f64; 5],
    /// Lifespan in laps is `lifespan_factor * 100 / wear_rate`.
    lifespan_factor: f64,
    /// Extra seconds per lap, rows by weather, columns by compound.
    mismatch: [[f64; 5]; 4],
}

impl TireCatalog {
    //                           Soft  Medium Hard  Inter  Wet
    pub const STANDARD: TireCatalog = TireCatalog {
        wear_rates: [8.0, 6.5, 2.5, 5.0, 3.0],
        lifespan_factor: 1.5,
        mismatch: [
            [0.0, 0.0, 0.0, 4.5, 25.0],   // dry
            [12.0, 8.0, 10.0, 0.0, 1.5],  // light rain
            [18.0, 12.0, 15.0, 2.5, 0.0], // medium rain
            [22.0, 18.0, 20.0, 7.0, 0.0], // heavy rain
        ],
    };

    /// Same table with a different lifespan multiplier.
    pub fn with_lifespan_factor(mut self, factor: f64) -> Self {
        self.lifespan_factor = factor;
        self
    }

    pub fn wear_rate(&self, compound: TireCompound) -> f64 {
        self.wear_rates[compound.index()]
    }

    /// Tire age after which a burst becomes possible.
    pub fn lifespan_laps(&self, compound: TireCompound) -> f64 {
        self.lifespan_factor * 100.0 / self.wear_rate(compound)
    }

    pub fn mismatch_penalty(&self, weather: WeatherState, compound: TireCompound) -> f64 {
        self.mismatch[weather.index()][compound.index()]
    }
}

impl Default for TireCatalog {
    fn default() -> Self {
        Self::STANDARD
    }
}
