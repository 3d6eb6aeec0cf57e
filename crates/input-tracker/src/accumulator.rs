//! Fractional-remainder pointer delta scaling.

use multiwall_common::config::clamp_sensitivity;

/// Scales integer pointer deltas while carrying the sub-unit remainder
/// forward, so slow motion at low factors is delayed rather than lost.
///
/// After every call the emitted total differs from `factor * raw total` by
/// at most half a unit per axis.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaAccumulator {
    factor: f64,
    x: f64,
    y: f64,
}

impl DeltaAccumulator {
    pub fn new(factor: f64) -> Self {
        Self {
            factor: clamp_sensitivity(factor),
            x: 0.0,
            y: 0.0,
        }
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Scale one raw delta and return the whole units to emit.
    pub fn scale(&mut self, dx: i64, dy: i64) -> (i64, i64) {
        self.x += dx as f64 * self.factor;
        self.y += dy as f64 * self.factor;
        let ex = self.x.round();
        let ey = self.y.round();
        self.x -= ex;
        self.y -= ey;
        (ex as i64, ey as i64)
    }

    /// Carried fractional motion per axis.
    pub fn remainder(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn reset(&mut self) {
        self.x = 0.0;
        self.y = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_slow_motion_is_not_lost() {
        let mut acc = DeltaAccumulator::new(0.3);
        let emitted: Vec<i64> = (0..10).map(|_| acc.scale(1, 0).0).collect();
        // Naive per-event rounding would emit ten zeros.
        assert_eq!(emitted.iter().sum::<i64>(), 3);
    }

    #[test]
    fn test_factor_is_clamped() {
        assert_eq!(DeltaAccumulator::new(0.0).factor(), 0.05);
        assert_eq!(DeltaAccumulator::new(1e6).factor(), 100.0);
    }

    #[test]
    fn test_nan_factor_scales_one_to_one() {
        let mut acc = DeltaAccumulator::new(f64::NAN);
        assert_eq!(acc.factor(), 1.0);
        assert_eq!(acc.scale(10, -10), (10, -10));
        assert_eq!(acc.scale(10, 10), (10, 10));
    }

    #[test]
    fn test_reset_drops_carry() {
        let mut acc = DeltaAccumulator::new(0.4);
        assert_eq!(acc.scale(1, -1), (0, 0));
        acc.reset();
        assert_eq!(acc.remainder(), (0.0, 0.0));
        assert_eq!(acc.scale(1, -1), (0, 0));
    }

    proptest! {
        #[test]
        fn test_emitted_tracks_ideal_at_every_prefix(
            factor in 0.05f64..100.0,
            deltas in proptest::collection::vec((-60i64..60, -60i64..60), 1..300),
        ) {
            let mut acc = DeltaAccumulator::new(factor);
            let (mut raw_x, mut raw_y) = (0i64, 0i64);
            let (mut out_x, mut out_y) = (0i64, 0i64);
            for (dx, dy) in deltas {
                let (ex, ey) = acc.scale(dx, dy);
                raw_x += dx;
                raw_y += dy;
                out_x += ex;
                out_y += ey;
                prop_assert!((out_x as f64 - factor * raw_x as f64).abs() < 1.0);
                prop_assert!((out_y as f64 - factor * raw_y as f64).abs() < 1.0);
            }
        }
    }
}
