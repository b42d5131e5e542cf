use super::Variant;
use crate::Utility;

/// the three hooks that differentiate regret-minimization flavors.
/// the traversal skeleton is shared; these decide how deltas are
/// weighted going in and how cumulative regret is adjusted after.
pub trait Schedule: Send + Sync {
    /// weight on regret deltas emitted at iteration t
    fn regret_weight(&self, _t: usize) -> Utility {
        1.0
    }
    /// weight on strategy-sum deltas emitted at iteration t
    fn strategy_weight(&self, _t: usize) -> Utility {
        1.0
    }
    /// adjustment applied to cumulative regrets after a fold
    fn settle(&self, _regrets: &mut [Utility]) {}
    /// sample opponent actions instead of enumerating them?
    fn samples(&self) -> bool {
        false
    }
}

/// exhaustive traversal, optionally discounting early regret
/// by d_t = t^(-alpha).
pub struct Vanilla {
    pub discounting: bool,
    pub alpha: f64,
}

impl Schedule for Vanilla {
    fn regret_weight(&self, t: usize) -> Utility {
        if self.discounting && t > 0 {
            (t as f64).powf(-self.alpha)
        } else {
            1.0
        }
    }
}

/// Monte-Carlo traversal: one updater per task, opponents sampled by
/// their current strategy. no discount.
pub struct ChanceSampling;

impl Schedule for ChanceSampling {
    fn samples(&self) -> bool {
        true
    }
}

/// regret-matching-plus: cumulative regrets clamped at zero after
/// every fold, and no discount ever.
pub struct Plus;

impl Schedule for Plus {
    fn settle(&self, regrets: &mut [Utility]) {
        for r in regrets.iter_mut() {
            *r = r.max(0.0);
        }
    }
}

pub fn schedule(variant: Variant, discounting: bool, alpha: f64) -> Box<dyn Schedule> {
    match variant {
        Variant::Vanilla => Box::new(Vanilla { discounting, alpha }),
        Variant::ChanceSampling => Box::new(ChanceSampling),
        Variant::Plus => Box::new(Plus),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vanilla_discount_decays() {
        let rules = Vanilla {
            discounting: true,
            alpha: 0.5,
        };
        assert!(rules.regret_weight(1) == 1.0);
        assert!(rules.regret_weight(4) == 0.5);
        assert!(rules.regret_weight(100) < rules.regret_weight(4));
    }

    #[test]
    fn plus_never_discounts_but_clamps() {
        let rules = Plus;
        assert!(rules.regret_weight(1000) == 1.0);
        let mut regrets = vec![-1.0, 2.0];
        rules.settle(&mut regrets);
        assert!(regrets == [0.0, 2.0]);
    }

    #[test]
    fn sampling_flag() {
        assert!(ChanceSampling.samples());
        assert!(!Plus.samples());
        assert!(
            !Vanilla {
                discounting: false,
                alpha: 0.0
            }
            .samples()
        );
    }
}
