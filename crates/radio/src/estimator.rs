//! Bayesian estimate of the ambient packet loss probability

use log::{trace, warn};

use crate::FloodError;

/// Neutral estimate used whenever the posterior cannot answer.
const NEUTRAL_LOSS: f64 = 0.5;

/// Discretized posterior over the loss probability `p`, built from counts of
/// received and missed status packets.
#[derive(Debug, Clone)]
pub struct LossEstimator {
    candidates: Vec<f64>,
    masses: Vec<f64>,
}

impl Default for LossEstimator {
    fn default() -> Self {
        Self::uniform(0.001)
    }
}

impl LossEstimator {
    pub fn new(step: f64) -> Result<Self, FloodError> {
        if !(step > 0.0 && step <= 1.0) {
            return Err(FloodError::InvalidConfig(format!("estimator step must be in (0, 1], got {}", step)));
        }
        Ok(Self::uniform(step))
    }

    fn uniform(step: f64) -> Self {
        let steps = (1.0 / step + 1e-9).floor() as usize;
        let mut candidates: Vec<f64> = (0..=steps).map(|i| (i as f64 * step).min(1.0)).collect();
        if let Some(last) = candidates.last_mut() {
            if (1.0 - *last).abs() < 1e-9 {
                *last = 1.0;
            }
        }
        let mass = 1.0 / candidates.len() as f64;
        let masses = vec![mass; candidates.len()];
        Self { candidates, masses }
    }

    /// Folds `successes` receptions and `failures` losses into the posterior.
    pub fn report_observation(&mut self, successes: u32, failures: u32) {
        let s = f64::from(successes);
        let f = f64::from(failures);

        // log space keeps long runs of one outcome from underflowing
        let log_posterior: Vec<f64> = self
            .candidates
            .iter()
            .zip(&self.masses)
            .map(|(&p, &mass)| {
                if mass <= 0.0 {
                    f64::NEG_INFINITY
                } else {
                    mass.ln() + log_pow(p, f) + log_pow(1.0 - p, s)
                }
            })
            .collect();

        let peak = log_posterior.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !peak.is_finite() {
            warn!(
                "Loss posterior collapsed after {} successes / {} failures, resetting to uniform prior",
                successes, failures
            );
            let mass = 1.0 / self.masses.len() as f64;
            self.masses.iter_mut().for_each(|m| *m = mass);
            return;
        }

        let mut total = 0.0;
        for (mass, lp) in self.masses.iter_mut().zip(&log_posterior) {
            *mass = (lp - peak).exp();
            total += *mass;
        }
        for mass in self.masses.iter_mut() {
            *mass /= total;
        }

        trace!(
            "Loss observation: {} ok / {} missed, expected loss now {:.4}",
            successes,
            failures,
            self.expected_loss()
        );
    }

    /// Posterior mean of the loss probability.
    pub fn expected_loss(&self) -> f64 {
        let loss: f64 = self
            .candidates
            .iter()
            .zip(&self.masses)
            .map(|(p, m)| p * m)
            .sum();
        if loss.is_nan() {
            return NEUTRAL_LOSS;
        }
        loss
    }

    /// Candidate with the largest mass. The lowest candidate wins ties.
    pub fn most_likely_loss(&self) -> f64 {
        let mut loss = 0.0;
        let mut best = 0.0;
        for (&p, &m) in self.candidates.iter().zip(&self.masses) {
            if m > best {
                best = m;
                loss = p;
            }
        }
        loss
    }

    /// Smallest candidate whose cumulative mass reaches `target`.
    pub fn loss_at_percentile(&self, target: f64) -> f64 {
        let mut cumulative = 0.0;
        for (&p, &m) in self.candidates.iter().zip(&self.masses) {
            cumulative += m;
            if cumulative >= target {
                return p;
            }
        }
        NEUTRAL_LOSS
    }

    pub fn candidates(&self) -> &[f64] {
        &self.candidates
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }
}

/// `ln(base^exp)` with `0^0 = 1`.
fn log_pow(base: f64, exp: f64) -> f64 {
    if exp == 0.0 {
        0.0
    } else if base <= 0.0 {
        f64::NEG_INFINITY
    } else {
        exp * base.ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total_mass(est: &LossEstimator) -> f64 {
        est.masses().iter().sum()
    }

    #[test]
    fn uniform_prior() {
        let est = LossEstimator::default();
        assert_eq!(est.candidates().len(), 1001);
        assert_eq!(est.candidates()[0], 0.0);
        assert_eq!(*est.candidates().last().unwrap(), 1.0);
        assert!((est.expected_loss() - 0.5).abs() < 1e-9);
        assert!((total_mass(&est) - 1.0).abs() < 1e-9);
        // every candidate ties, the first one wins
        assert_eq!(est.most_likely_loss(), 0.0);
    }

    #[test]
    fn masses_stay_normalized() {
        let mut est = LossEstimator::default();
        let observations = [(1, 0), (0, 3), (5, 2), (0, 0), (40, 1), (1, 17), (250, 250)];
        for (s, f) in observations {
            est.report_observation(s, f);
            assert!((total_mass(&est) - 1.0).abs() < 1e-9, "mass drifted after ({}, {})", s, f);
            assert!(est.masses().iter().all(|m| *m >= 0.0));
            let expected = est.expected_loss();
            assert!((0.0..=1.0).contains(&expected));
        }
    }

    #[test]
    fn converges_to_no_loss() {
        let mut est = LossEstimator::default();
        for _ in 0..200 {
            est.report_observation(10, 0);
        }
        assert_eq!(est.most_likely_loss(), 0.0);
        assert!(est.expected_loss() < 0.01);
    }

    #[test]
    fn converges_to_total_loss() {
        let mut est = LossEstimator::default();
        for _ in 0..200 {
            est.report_observation(0, 10);
        }
        assert_eq!(est.most_likely_loss(), 1.0);
        assert!(est.expected_loss() > 0.99);
    }

    #[test]
    fn tracks_a_mixed_rate() {
        let mut est = LossEstimator::default();
        for _ in 0..100 {
            est.report_observation(7, 3);
        }
        assert!((est.most_likely_loss() - 0.3).abs() < 0.01);
        assert!((est.expected_loss() - 0.3).abs() < 0.02);
        let low = est.loss_at_percentile(0.05);
        let high = est.loss_at_percentile(0.95);
        assert!(low < 0.3 && 0.3 < high);
    }

    #[test]
    fn percentile_edges() {
        let est = LossEstimator::default();
        assert_eq!(est.loss_at_percentile(0.0), 0.0);
        assert!((est.loss_at_percentile(0.5) - 0.5).abs() <= 0.001 + 1e-12);
        assert_eq!(est.loss_at_percentile(1.5), NEUTRAL_LOSS);
    }

    #[test]
    fn collapsed_posterior_falls_back_to_neutral() {
        // only p = 0 and p = 1 are candidates; one success and one failure
        // rule both out
        let mut est = LossEstimator::new(1.0).unwrap();
        assert_eq!(est.candidates(), &[0.0, 1.0]);
        est.report_observation(1, 1);
        assert_eq!(est.expected_loss(), NEUTRAL_LOSS);
        assert!((total_mass(&est) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_step() {
        assert!(LossEstimator::new(0.0).is_err());
        assert!(LossEstimator::new(1.5).is_err());
    }
}
