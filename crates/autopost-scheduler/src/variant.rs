use std::sync::Mutex;

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

use crate::{
    error::{Result, ScheduleError},
    types::{Job, VariantPolicy, WeightedVariant},
};

/// Picks the configuration variant a run is generated with.
pub trait VariantSelector: Send + Sync {
    fn select_variant(&self, job: &Job, policy: &VariantPolicy) -> Result<String>;
}

/// Default selector covering every [`VariantPolicy`].
///
/// Rotation is keyed by `job.run_count`, so it survives restarts without
/// extra state. The random source is injectable for reproducible tests.
pub struct PolicySelector<R = StdRng> {
    rng: Mutex<R>,
}

impl PolicySelector<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl Default for PolicySelector<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng + Send> PolicySelector<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }
}

impl<R: Rng + Send> VariantSelector for PolicySelector<R> {
    fn select_variant(&self, job: &Job, policy: &VariantPolicy) -> Result<String> {
        match policy {
            VariantPolicy::Fixed { variant } => {
                if variant.trim().is_empty() {
                    return Err(ScheduleError::VariantUnavailable(
                        "fixed variant is empty".to_string(),
                    ));
                }
                Ok(variant.clone())
            }
            VariantPolicy::RoundRobin { variants } => {
                if variants.is_empty() {
                    return Err(ScheduleError::VariantUnavailable(
                        "round-robin list is empty".to_string(),
                    ));
                }
                Ok(variants[job.run_count as usize % variants.len()].clone())
            }
            VariantPolicy::Alternating { variants } => match variants.as_slice() {
                [] => Err(ScheduleError::VariantUnavailable(
                    "alternating list is empty".to_string(),
                )),
                [only] => Ok(only.clone()),
                [first, second, ..] => Ok(if job.run_count % 2 == 0 {
                    first.clone()
                } else {
                    second.clone()
                }),
            },
            VariantPolicy::WeightedRandom { weights } => {
                let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
                weighted_pick(weights, &mut *rng).map(|w| w.variant.clone())
            }
            VariantPolicy::Random { variants } => {
                let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
                variants.choose(&mut *rng).cloned().ok_or_else(|| {
                    ScheduleError::VariantUnavailable("random list is empty".to_string())
                })
            }
        }
    }
}

/// Draw one entry with probability proportional to its weight.
///
/// Entries with a weight that is zero, negative, or not finite are never
/// chosen. Fails when nothing is left to choose from.
pub fn weighted_pick<'a, R: Rng + ?Sized>(
    weights: &'a [WeightedVariant],
    rng: &mut R,
) -> Result<&'a WeightedVariant> {
    let eligible: Vec<&WeightedVariant> = weights
        .iter()
        .filter(|w| w.weight.is_finite() && w.weight > 0.0)
        .collect();
    let total: f64 = eligible.iter().map(|w| w.weight).sum();
    if eligible.is_empty() || !total.is_finite() {
        return Err(ScheduleError::VariantUnavailable(
            "no variant has a positive weight".to_string(),
        ));
    }

    let mut roll = rng.gen_range(0.0..total);
    for &entry in &eligible {
        if roll < entry.weight {
            return Ok(entry);
        }
        roll -= entry.weight;
    }
    // float rounding can leave `roll` a hair above the last bucket
    Ok(eligible[eligible.len() - 1])
}
