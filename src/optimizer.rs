use crate::config::{OptimizerConfig, RaceConfig};
use crate::error::ConfigError;
use crate::model::StrategySimulator;
use crate::tires::TireCatalog;
use crate::types::Strategy;
use crate::weather::WeatherSequence;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;

/// A candidate strategy and its cached fitness (total simulated time).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Individual {
    pub strategy: Strategy,
    /// `None` until scored; lower is better.
    pub fitness: Option<f64>,
}

impl Individual {
    pub fn new(strategy: Strategy) -> Self {
        Self { strategy, fitness: None }
    }

    fn replace(&mut self, strategy: Strategy) {
        self.strategy = strategy;
        self.fitness = None;
    }

    fn score(&self) -> f64 {
        self.fitness.unwrap_or(f64::INFINITY)
    }
}

fn by_fitness(a: &Individual, b: &Individual) -> Ordering {
    a.score().total_cmp(&b.score())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationStats {
    pub generation: u32,
    pub evaluations: usize,
    pub min_fitness: f64,
    pub mean_fitness: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationOutcome {
    pub best: Individual,
    pub log: Vec<GenerationStats>,
}

/// Evolves pit-stop lap sequences against the single-car simulator.
///
/// Owns the population, the elite set and its random stream. Each evaluation
/// gets its own seed drawn from that stream before scoring starts, so the
/// parallel scoring pass gives the same answer as a sequential one.
pub struct GeneticOptimizer<'a> {
    race: &'a RaceConfig,
    settings: &'a OptimizerConfig,
    simulator: StrategySimulator<'a>,
    rng: StdRng,
    population: Vec<Individual>,
    elites: Vec<Individual>,
    log: Vec<GenerationStats>,
}

impl<'a> GeneticOptimizer<'a> {
    pub fn new(
        race: &'a RaceConfig,
        settings: &'a OptimizerConfig,
        tires: &'a TireCatalog,
        weather: &'a WeatherSequence,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            race,
            settings,
            simulator: StrategySimulator::new(race, tires, weather),
            rng: StdRng::seed_from_u64(seed),
            population: Vec::with_capacity(settings.population_size),
            elites: Vec::with_capacity(settings.hall_of_fame_size),
            log: Vec::with_capacity(settings.max_generations as usize + 1),
        })
    }

    /// Runs the full fixed-length search and returns the best strategy seen.
    pub fn run(mut self) -> OptimizationOutcome {
        self.population = (0..self.settings.population_size)
            .map(|_| Individual::new(random_strategy(self.race, &mut self.rng)))
            .collect();
        let evaluations = self.evaluate_pending();
        self.update_elites();
        self.record(0, evaluations);

        for generation in 1..=self.settings.max_generations {
            self.step(generation);
        }

        let best = self
            .elites
            .first()
            .or_else(|| self.population.iter().min_by(|a, b| by_fitness(a, b)))
            .cloned()
            .unwrap_or_else(|| Individual::new(Strategy::default()));
        tracing::info!(
            "best strategy {} fitness={:.2} after {} generations",
            best.strategy,
            best.score(),
            self.settings.max_generations
        );

        OptimizationOutcome { best, log: self.log }
    }

    fn step(&mut self, generation: u32) {
        let breed_count = self.settings.population_size.saturating_sub(self.elites.len());
        let mut offspring = self.select(breed_count);

        for pair in offspring.chunks_exact_mut(2) {
            if self.rng.random_bool(self.settings.p_crossover) {
                let (left, right) = pair.split_at_mut(1);
                let (a, b) = two_point_crossover(&left[0].strategy, &right[0].strategy, &mut self.rng);
                left[0].replace(a);
                right[0].replace(b);
            }
        }

        for child in offspring.iter_mut() {
            if self.rng.random_bool(self.settings.p_mutation) {
                let mutated = mutate(&child.strategy, self.race, &mut self.rng);
                child.replace(mutated);
            }
        }

        offspring.extend(self.elites.iter().cloned());
        self.population = offspring;

        let evaluations = self.evaluate_pending();
        self.update_elites();
        self.record(generation, evaluations);
    }

    /// Tournament selection; returns owned copies.
    fn select(&mut self, count: usize) -> Vec<Individual> {
        let pool = &self.population;
        (0..count)
            .map(|_| {
                (0..self.settings.tournament_size)
                    .map(|_| &pool[self.rng.random_range(0..pool.len())])
                    .min_by(|a, b| by_fitness(a, b))
                    .cloned()
                    .unwrap_or_else(|| pool[0].clone())
            })
            .collect()
    }

    /// Scores every individual without a cached fitness.
    fn evaluate_pending(&mut self) -> usize {
        let seeds: Vec<Option<u64>> = self
            .population
            .iter()
            .map(|ind| ind.fitness.is_none().then(|| self.rng.random::<u64>()))
            .collect();
        let pending = seeds.iter().flatten().count();
        let simulator = &self.simulator;

        self.population
            .par_iter_mut()
            .zip(seeds.par_iter())
            .for_each(|(ind, seed)| {
                if let Some(seed) = *seed {
                    let mut rng = StdRng::seed_from_u64(seed);
                    ind.fitness = Some(simulator.fitness(&ind.strategy, &mut rng));
                }
            });
        pending
    }

    /// Keeps the best distinct strategies ever scored, as owned copies.
    fn update_elites(&mut self) {
        let mut candidates: Vec<&Individual> = self
            .elites
            .iter()
            .chain(self.population.iter())
            .filter(|ind| ind.fitness.is_some())
            .collect();
        candidates.sort_by(|a, b| by_fitness(a, b));

        let mut elites: Vec<Individual> = Vec::with_capacity(self.settings.hall_of_fame_size);
        for ind in candidates {
            if elites.len() == self.settings.hall_of_fame_size {
                break;
            }
            if elites.iter().all(|e| e.strategy != ind.strategy) {
                elites.push(ind.clone());
            }
        }
        self.elites = elites;
    }

    fn record(&mut self, generation: u32, evaluations: usize) {
        let scores: Vec<f64> = self.population.iter().map(Individual::score).collect();
        let min_fitness = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let mean_fitness = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        tracing::debug!(
            "gen={generation} nevals={evaluations} min={min_fitness:.2} avg={mean_fitness:.2}"
        );
        self.log.push(GenerationStats {
            generation,
            evaluations,
            min_fitness,
            mean_fitness,
        });
    }
}

/// Builds one chromosome stop by stop, keeping room for the stints that follow.
///
/// Stop `i` of `n` is drawn from `[last + min_stint, total - (n - i) * min_stint]`.
/// When that range is empty the stop is clamped to the upper bound (never
/// below lap 1).
pub fn random_strategy<R: Rng + ?Sized>(race: &RaceConfig, rng: &mut R) -> Strategy {
    let stops = race.required_pit_stops;
    let mut laps = Vec::with_capacity(stops as usize);
    let mut last: u32 = 0;
    for i in 0..stops {
        let lo = last.saturating_add(race.min_stint_length);
        let hi = race
            .total_laps
            .saturating_sub((stops - i).saturating_mul(race.min_stint_length))
            .max(1);
        let lap = if lo >= hi { hi } else { rng.random_range(lo..=hi) };
        laps.push(lap);
        last = lap;
    }
    Strategy::from_laps(laps)
}

/// Two-point crossover over the lap genes; offspring come back re-sorted.
///
/// Sorting repairs ordering but not stint spacing, which is left to the
/// fitness function.
pub fn two_point_crossover<R: Rng + ?Sized>(
    a: &Strategy,
    b: &Strategy,
    rng: &mut R,
) -> (Strategy, Strategy) {
    let mut left = a.laps().to_vec();
    let mut right = b.laps().to_vec();
    let size = left.len().min(right.len());
    if size >= 2 {
        let mut cx1 = rng.random_range(1..=size);
        let mut cx2 = rng.random_range(1..size);
        if cx2 >= cx1 {
            cx2 += 1;
        } else {
            std::mem::swap(&mut cx1, &mut cx2);
        }
        left[cx1..cx2].swap_with_slice(&mut right[cx1..cx2]);
    }
    (Strategy::from_laps(left), Strategy::from_laps(right))
}

/// Redraws each gene with probability `1 / len` between its neighbours,
/// keeping `min_stint_length` on both sides; a gene with no room stays put.
pub fn mutate<R: Rng + ?Sized>(strategy: &Strategy, race: &RaceConfig, rng: &mut R) -> Strategy {
    let mut laps = strategy.laps().to_vec();
    let n = laps.len();
    if n == 0 {
        return strategy.clone();
    }
    let gene_rate = 1.0 / n as f64;
    for i in 0..n {
        if !rng.random_bool(gene_rate) {
            continue;
        }
        let prev = if i > 0 { laps[i - 1] } else { 0 };
        let next = if i + 1 < n { laps[i + 1] } else { race.total_laps };
        let lo = prev.saturating_add(race.min_stint_length);
        let hi = next.saturating_sub(race.min_stint_length);
        if lo < hi {
            laps[i] = rng.random_range(lo..=hi);
        }
    }
    Strategy::from_laps(laps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WeatherState;

    fn spacing_ok(s: &Strategy, race: &RaceConfig) -> bool {
        s.stint_lengths(race.total_laps)
            .iter()
            .all(|&len| len >= race.min_stint_length)
    }

    #[test]
    fn initial_strategies_respect_stint_spacing() {
        let race = RaceConfig::default();
        let mut rng = StdRng::seed_from_u64(10);
        for _ in 0..500 {
            let s = random_strategy(&race, &mut rng);
            assert_eq!(s.len(), 2);
            assert!(s.laps()[0] < s.laps()[1]);
            assert!(spacing_ok(&s, &race), "{s}");
        }
    }

    #[test]
    fn crowded_race_clamps_instead_of_failing() {
        let race = RaceConfig {
            total_laps: 20,
            required_pit_stops: 3,
            min_stint_length: 10,
            ..RaceConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let s = random_strategy(&race, &mut rng);
        assert_eq!(s.len(), 3);
        assert!(s.laps().iter().all(|&lap| (1..=20).contains(&lap)));
    }

    #[test]
    fn oversized_stint_length_saturates_to_clamp() {
        let race = RaceConfig {
            min_stint_length: u32::MAX / 2 + 1,
            ..RaceConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(2);
        let s = random_strategy(&race, &mut rng);
        assert_eq!(s.len(), 2);
        assert!(s.laps().iter().all(|&lap| (1..=race.total_laps).contains(&lap)));

        let race = RaceConfig {
            min_stint_length: u32::MAX - 5,
            ..RaceConfig::default()
        };
        let original = Strategy::from_laps(vec![15, 30]);
        for _ in 0..50 {
            assert_eq!(mutate(&original, &race, &mut rng), original);
        }
    }

    #[test]
    fn crossover_keeps_genes_and_order() {
        let mut rng = StdRng::seed_from_u64(3);
        let a = Strategy::from_laps(vec![10, 20, 30]);
        let b = Strategy::from_laps(vec![12, 25, 38]);
        for _ in 0..100 {
            let (c, d) = two_point_crossover(&a, &b, &mut rng);
            let mut pool: Vec<u32> = c.laps().iter().chain(d.laps()).copied().collect();
            pool.sort_unstable();
            assert_eq!(pool, vec![10, 12, 20, 25, 30, 38]);
            assert!(c.laps().windows(2).all(|w| w[0] <= w[1]));
            assert!(d.laps().windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn crossover_of_single_gene_copies_parents() {
        let mut rng = StdRng::seed_from_u64(3);
        let a = Strategy::from_laps(vec![10]);
        let b = Strategy::from_laps(vec![30]);
        assert_eq!(two_point_crossover(&a, &b, &mut rng), (a.clone(), b.clone()));
    }

    #[test]
    fn mutation_preserves_spacing_of_valid_strategy() {
        let race = RaceConfig::default();
        let mut rng = StdRng::seed_from_u64(5);
        let mut s = Strategy::from_laps(vec![15, 30]);
        for _ in 0..500 {
            s = mutate(&s, &race, &mut rng);
            assert!(spacing_ok(&s, &race), "{s}");
        }
    }

    #[test]
    fn elite_best_never_gets_worse() {
        let race = RaceConfig::default();
        let settings = OptimizerConfig {
            population_size: 40,
            max_generations: 15,
            ..OptimizerConfig::default()
        };
        let tires = TireCatalog::STANDARD;
        let weather = WeatherSequence::generate(race.total_laps, 3, 8, 21);
        let outcome = GeneticOptimizer::new(&race, &settings, &tires, &weather, 8)
            .unwrap()
            .run();

        assert_eq!(outcome.log.len(), 16);
        assert_eq!(outcome.log[0].evaluations, 40);
        for pair in outcome.log.windows(2) {
            assert!(pair[1].min_fitness <= pair[0].min_fitness);
        }
        assert_eq!(outcome.best.fitness, Some(outcome.log.last().unwrap().min_fitness));
    }

    #[test]
    fn elites_are_distinct_owned_copies() {
        let race = RaceConfig::default();
        let settings = OptimizerConfig {
            population_size: 6,
            hall_of_fame_size: 3,
            ..OptimizerConfig::default()
        };
        let tires = TireCatalog::STANDARD;
        let weather = WeatherSequence::generate(50, 3, 8, 1);
        let mut ga = GeneticOptimizer::new(&race, &settings, &tires, &weather, 1).unwrap();

        let scored = |laps: Vec<u32>, fitness: f64| Individual {
            strategy: Strategy::from_laps(laps),
            fitness: Some(fitness),
        };
        ga.population = vec![
            scored(vec![15, 30], 5_000.0),
            scored(vec![15, 30], 4_800.0),
            scored(vec![12, 35], 4_900.0),
            scored(vec![12, 35], 4_900.0),
            scored(vec![20, 40], 6_000.0),
            scored(vec![18, 33], 4_700.0),
        ];
        ga.update_elites();

        let laps: Vec<&[u32]> = ga.elites.iter().map(|e| e.strategy.laps()).collect();
        assert_eq!(laps, vec![&[18, 33][..], &[15, 30][..], &[12, 35][..]]);
        let scores: Vec<f64> = ga.elites.iter().map(Individual::score).collect();
        assert_eq!(scores, vec![4_700.0, 4_800.0, 4_900.0]);

        // reshaping the population leaves the elite copies untouched
        for ind in ga.population.iter_mut() {
            ind.replace(Strategy::from_laps(vec![25, 45]));
        }
        assert_eq!(ga.elites[1].strategy.laps(), &[15, 30]);
        assert_eq!(ga.elites[1].fitness, Some(4_800.0));

        // a worse re-score of an elite strategy does not displace it
        ga.population[0] = scored(vec![18, 33], 9_000.0);
        ga.update_elites();
        assert_eq!(ga.elites[0].fitness, Some(4_700.0));
        assert_eq!(ga.elites.iter().filter(|e| e.strategy.laps() == [18, 33]).count(), 1);
    }

    #[test]
    fn same_seed_same_search() {
        let race = RaceConfig { total_laps: 30, min_stint_length: 8, ..RaceConfig::default() };
        let settings = OptimizerConfig {
            population_size: 24,
            max_generations: 6,
            ..OptimizerConfig::default()
        };
        let tires = TireCatalog::STANDARD;
        let weather = WeatherSequence::from_states(vec![WeatherState::Dry; 30]);
        let run = |seed| {
            GeneticOptimizer::new(&race, &settings, &tires, &weather, seed)
                .unwrap()
                .run()
        };
        let a = run(99);
        let b = run(99);
        assert_eq!(a.best, b.best);
        assert_eq!(a.log, b.log);
    }

    #[test]
    fn rejects_empty_population() {
        let race = RaceConfig::default();
        let settings = OptimizerConfig {
            population_size: 0,
            hall_of_fame_size: 0,
            ..OptimizerConfig::default()
        };
        let tires = TireCatalog::STANDARD;
        let weather = WeatherSequence::generate(50, 3, 8, 1);
        assert!(GeneticOptimizer::new(&race, &settings, &tires, &weather, 1).is_err());
    }
}
