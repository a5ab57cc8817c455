//! Monte Carlo outcome forecasting for matched patterns.
//!
//! For every (pattern match, declared KPI) pair the simulator draws N samples
//! from a Normal whose mean is the pattern's effect size hint scaled to the
//! KPI's units and by the match strength (confidence blended with the
//! triggering factors' values), and whose spread tightens as confidence
//! rises. Summary statistics come from `stats` (empirical quantiles, normal
//! fallback below the sample minimum).
//!
//! # Reproducibility
//!
//! A master seed (explicit from config, or per-session entropy in
//! production) is mixed with each (pattern, KPI) pair into an independent
//! RNG stream, so simulations can fan out across threads while staying
//! bit-identical for a fixed seed. Same seed + same inputs ⇒ identical
//! summary statistics.
//!
//! Per-KPI failures (malformed effect size, degenerate spread) are recorded
//! as `SimulationSkipped` notes and never abort the stage.

pub mod stats;

use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::config::SimulatorConfig;
use crate::analysis::factors::FactorSet;
use crate::analysis::patterns::PatternCatalog;
use crate::analysis::types::{Kpi, PatternMatch, SimulationResult};
use crate::errors::SimError;

/// Output of the simulation stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimOutput {
    /// One result per successful (pattern, KPI) simulation, in match rank
    /// order then KPI declaration order
    pub results: Vec<SimulationResult>,
    /// Per-KPI skips, recorded and non-fatal
    pub notes: Vec<SimError>,
}

/// Seeded Monte Carlo simulator.
#[derive(Debug, Clone)]
pub struct MonteCarloSimulator {
    config: SimulatorConfig,
}

/// One simulation work item.
struct SimJob {
    pattern_id: crate::analysis::types::PatternId,
    kpi: Kpi,
    effect_size_hint: f64,
    confidence: f64,
    driver: f64,
    seed: u64,
}

impl MonteCarloSimulator {
    /// Create with given configuration.
    pub fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }

    /// Resolve the master seed: an explicit config seed wins; otherwise the
    /// per-session entropy supplied by the orchestrator.
    pub fn master_seed(&self, session_entropy: u64) -> u64 {
        if self.config.seed != 0 {
            self.config.seed
        } else {
            session_entropy
        }
    }

    /// Simulate every declared KPI of every match.
    pub fn simulate(
        &self,
        matches: &[PatternMatch],
        catalog: &PatternCatalog,
        factors: &FactorSet,
        master_seed: u64,
    ) -> SimOutput {
        let mut jobs: Vec<SimJob> = Vec::new();
        let mut notes: Vec<SimError> = Vec::new();

        for m in matches {
            let Some(spec) = catalog.get(m.pattern_id) else {
                notes.push(SimError::Skipped {
                    pattern_id: m.pattern_id.to_string(),
                    kpi: "*".to_string(),
                    reason: "pattern missing from catalog".to_string(),
                });
                continue;
            };

            // Mean value of the factors that triggered the match; the
            // uninformative midpoint when none are available.
            let values: Vec<f64> = m
                .factors_triggered
                .iter()
                .filter_map(|&id| factors.value(id))
                .collect();
            let driver = if values.is_empty() {
                0.5
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            };

            for (kpi_index, &kpi) in spec.kpis.iter().enumerate() {
                jobs.push(SimJob {
                    pattern_id: m.pattern_id,
                    kpi,
                    effect_size_hint: spec.effect_size_hint,
                    confidence: m.confidence,
                    driver,
                    seed: stream_seed(master_seed, m.pattern_id.0, kpi_index as u64),
                });
            }
        }

        // Each job owns an independent RNG stream: parallel execution is
        // reproducible and order-preserving.
        let outcomes: Vec<Result<SimulationResult, SimError>> =
            jobs.par_iter().map(|job| self.run_job(job)).collect();

        let mut results = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(note) => notes.push(note),
            }
        }

        debug!(
            target: "vantage::simulation",
            simulated = results.len(),
            skipped = notes.len(),
            "simulation stage complete"
        );

        SimOutput { results, notes }
    }

    /// Run one (pattern, KPI) simulation.
    fn run_job(&self, job: &SimJob) -> Result<SimulationResult, SimError> {
        let skipped = |reason: &str| SimError::Skipped {
            pattern_id: job.pattern_id.to_string(),
            kpi: job.kpi.name().to_string(),
            reason: reason.to_string(),
        };

        if !job.effect_size_hint.is_finite() || job.effect_size_hint <= 0.0 {
            return Err(skipped("malformed effect size hint"));
        }
        let sample_count = self.config.sample_count;
        if sample_count == 0 {
            return Err(skipped("sample count is zero"));
        }

        let scale = kpi_scale(job.kpi);
        // Strength blends how confidently the pattern matched with how
        // strongly its driving factors scored.
        let strength = 0.5 * (job.confidence + job.driver);
        let mean = job.effect_size_hint * scale * strength;

        // Higher confidence → tighter spread.
        let tightening = (1.0
            - self.config.confidence_tightening.clamp(0.0, 1.0) * job.confidence)
            .max(0.05);
        let std_dev = (self.config.base_relative_spread * scale * job.effect_size_hint * tightening)
            .max(scale * 1e-3);

        let normal = Normal::new(mean, std_dev)
            .map_err(|e| skipped(&format!("invalid outcome distribution: {e}")))?;

        let mut rng = rand::rngs::StdRng::seed_from_u64(job.seed);
        let mut samples: Vec<f64> = (0..sample_count).map(|_| normal.sample(&mut rng)).collect();

        let s = stats::summarize(
            &mut samples,
            kpi_baseline(job.kpi),
            self.config.min_samples_for_empirical,
        );

        Ok(SimulationResult {
            pattern_id: job.pattern_id,
            kpi: job.kpi,
            mean: s.mean,
            median: s.median,
            std_dev: s.std_dev,
            percentile_5: s.percentile_5,
            percentile_95: s.percentile_95,
            ci_90: s.ci_90,
            ci_95: s.ci_95,
            ci_99: s.ci_99,
            probability_positive: s.probability_positive,
            sample_count,
            low_sample_approximation: s.low_sample_approximation,
        })
    }
}

/// Fresh entropy for a production session (config seed 0).
pub fn session_entropy() -> u64 {
    rand::thread_rng().gen()
}

/// KPI unit scale: effect hints are [0,1]; this maps them to outcome units.
fn kpi_scale(kpi: Kpi) -> f64 {
    match kpi {
        // Share points
        Kpi::MarketShareGain => 10.0,
        // Fractions
        Kpi::RevenueGrowth => 0.40,
        Kpi::AdoptionRate => 0.30,
        Kpi::RetentionUplift => 0.20,
        Kpi::MarginUplift => 0.15,
    }
}

/// KPI baseline for `probability_positive`.
fn kpi_baseline(kpi: Kpi) -> f64 {
    match kpi {
        // Revenue grows with the market anyway; outperformance starts here.
        Kpi::RevenueGrowth => 0.02,
        _ => 0.0,
    }
}

/// Mix the master seed with a (pattern, KPI) pair into an independent
/// stream seed (splitmix64 finalizer).
fn stream_seed(master: u64, pattern: u16, kpi_index: u64) -> u64 {
    let mut z = master
        .wrapping_add((pattern as u64) << 32)
        .wrapping_add(kpi_index)
        .wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::patterns::{Archetype, PatternCatalog, PatternSpec};
    use crate::analysis::types::{Factor, FactorId, PatternId};

    fn one_pattern(effect_size_hint: f64, kpis: Vec<Kpi>) -> PatternCatalog {
        PatternCatalog::new(vec![PatternSpec {
            id: PatternId(1),
            name: "Test".to_string(),
            archetype: Archetype::Growth,
            clauses: Vec::new(),
            effect_size_hint,
            kpis,
        }])
    }

    fn one_match(confidence: f64) -> Vec<PatternMatch> {
        vec![PatternMatch {
            pattern_id: PatternId(1),
            confidence,
            segments_involved: Vec::new(),
            factors_triggered: vec![FactorId(1)],
            evidence_strength: confidence,
        }]
    }

    fn factors() -> FactorSet {
        FactorSet {
            factors: vec![Factor {
                id: FactorId(1),
                value: 0.7,
                confidence: 0.8,
                formula_id: "f1".to_string(),
                inputs: Vec::new(),
            }],
            failures: Vec::new(),
        }
    }

    fn simulator(seed: u64, sample_count: usize) -> MonteCarloSimulator {
        MonteCarloSimulator::new(SimulatorConfig {
            seed,
            sample_count,
            ..Default::default()
        })
    }

    #[test]
    fn test_seeded_runs_are_bit_identical() {
        let catalog = one_pattern(0.6, vec![Kpi::RevenueGrowth, Kpi::MarketShareGain]);
        let sim = simulator(42, 2_000);

        let a = sim.simulate(&one_match(0.7), &catalog, &factors(), sim.master_seed(0));
        let b = sim.simulate(&one_match(0.7), &catalog, &factors(), sim.master_seed(0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seeds_differ() {
        let catalog = one_pattern(0.6, vec![Kpi::RevenueGrowth]);
        let a = simulator(1, 2_000);
        let b = simulator(2, 2_000);

        let ra = a.simulate(&one_match(0.7), &catalog, &factors(), a.master_seed(0));
        let rb = b.simulate(&one_match(0.7), &catalog, &factors(), b.master_seed(0));
        assert_ne!(ra.results[0].mean, rb.results[0].mean);
    }

    #[test]
    fn test_percentile_ordering_invariant() {
        let catalog = one_pattern(0.8, vec![Kpi::MarketShareGain]);
        for seed in 1..=20u64 {
            let sim = simulator(seed, 1_000);
            let out = sim.simulate(&one_match(0.6), &catalog, &factors(), sim.master_seed(0));
            let r = &out.results[0];
            assert!(r.percentile_5 <= r.median, "seed {seed}");
            assert!(r.median <= r.percentile_95, "seed {seed}");
        }
    }

    #[test]
    fn test_higher_confidence_tightens_spread() {
        let catalog = one_pattern(0.6, vec![Kpi::RevenueGrowth]);
        let sim = simulator(7, 5_000);

        let low = sim.simulate(&one_match(0.2), &catalog, &factors(), sim.master_seed(0));
        let high = sim.simulate(&one_match(0.9), &catalog, &factors(), sim.master_seed(0));
        assert!(high.results[0].std_dev < low.results[0].std_dev);
    }

    #[test]
    fn test_malformed_effect_size_is_skipped_not_fatal() {
        let catalog = one_pattern(f64::NAN, vec![Kpi::RevenueGrowth]);
        let sim = simulator(3, 500);

        let out = sim.simulate(&one_match(0.7), &catalog, &factors(), sim.master_seed(0));
        assert!(out.results.is_empty());
        assert_eq!(out.notes.len(), 1);
        assert!(matches!(&out.notes[0], SimError::Skipped { reason, .. } if reason.contains("effect size")));
    }

    #[test]
    fn test_low_sample_run_is_flagged() {
        let catalog = one_pattern(0.6, vec![Kpi::RevenueGrowth]);
        let sim = simulator(5, 50); // below min_samples_for_empirical (100)

        let out = sim.simulate(&one_match(0.7), &catalog, &factors(), sim.master_seed(0));
        assert!(out.results[0].low_sample_approximation);
    }

    #[test]
    fn test_result_order_follows_match_rank_and_kpi_order() {
        let catalog = PatternCatalog::new(vec![
            PatternSpec {
                id: PatternId(1),
                name: "A".to_string(),
                archetype: Archetype::Growth,
                clauses: Vec::new(),
                effect_size_hint: 0.5,
                kpis: vec![Kpi::RevenueGrowth, Kpi::MarginUplift],
            },
            PatternSpec {
                id: PatternId(2),
                name: "B".to_string(),
                archetype: Archetype::Niche,
                clauses: Vec::new(),
                effect_size_hint: 0.5,
                kpis: vec![Kpi::AdoptionRate],
            },
        ]);
        let matches = vec![
            PatternMatch {
                pattern_id: PatternId(2),
                confidence: 0.9,
                segments_involved: Vec::new(),
                factors_triggered: Vec::new(),
                evidence_strength: 0.9,
            },
            PatternMatch {
                pattern_id: PatternId(1),
                confidence: 0.5,
                segments_involved: Vec::new(),
                factors_triggered: Vec::new(),
                evidence_strength: 0.5,
            },
        ];
        let sim = simulator(11, 200);
        let out = sim.simulate(&matches, &catalog, &factors(), sim.master_seed(0));

        let order: Vec<(PatternId, Kpi)> =
            out.results.iter().map(|r| (r.pattern_id, r.kpi)).collect();
        assert_eq!(
            order,
            vec![
                (PatternId(2), Kpi::AdoptionRate),
                (PatternId(1), Kpi::RevenueGrowth),
                (PatternId(1), Kpi::MarginUplift),
            ]
        );
    }

    #[test]
    fn test_probability_positive_bounds() {
        let catalog = one_pattern(0.7, vec![Kpi::MarketShareGain]);
        let sim = simulator(13, 1_000);
        let out = sim.simulate(&one_match(0.8), &catalog, &factors(), sim.master_seed(0));

        let p = out.results[0].probability_positive;
        assert!((0.0..=1.0).contains(&p));
        // Strong positive mean: most samples should land above zero.
        assert!(p > 0.8);
    }
}
