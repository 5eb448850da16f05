// THEORY:
// The `MotionModulator` turns the jittery, per-frame motion of tracked blobs into
// control values that can be sent to an effect without sounding or looking
// nervous.
//
// Algorithm steps, per tick:
// 1.  **Coherence**: Only significant blobs take part. Their velocity vectors and
//     speeds are summed, and the length of the summed vector divided by the sum of
//     speeds tells how much the motions agree in direction: 1 when everything
//     moves the same way, towards 0 when motions cancel out.
// 2.  **Fast Channel (C)**: The coherence itself, clamped to [0, 1]. No memory.
// 3.  **Leaky Integrators (A, B)**: Each one is pushed up by coherence times its
//     attack rate and pulled down by a fixed decay every tick, then clamped to
//     [0, 1]. A is slow, B is faster; together they give the downstream effects
//     a "mood" and a "flash" response to the same underlying signal.
//
// The modulator owns its accumulators. There is no global state; two modulators
// fed the same ticks produce the same output.

use crate::core_modules::tracker::TrackedBlob;
use crate::error::{Error, Result};

/// Attack and decay rates of the two integrating channels, per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModulatorConfig {
    pub attack_a: f64,
    pub decay_a: f64,
    pub attack_b: f64,
    pub decay_b: f64,
}

impl ModulatorConfig {
    /// Rejects negative or non-finite rates.
    pub fn validate(&self) -> Result<()> {
        let rates = [
            ("attack_a", self.attack_a),
            ("decay_a", self.decay_a),
            ("attack_b", self.attack_b),
            ("decay_b", self.decay_b),
        ];
        for (name, rate) in rates {
            if !rate.is_finite() || rate < 0.0 {
                return Err(Error::range(name, rate));
            }
        }
        Ok(())
    }
}

impl Default for ModulatorConfig {
    fn default() -> Self {
        Self {
            attack_a: 0.025,
            decay_a: 0.025,
            attack_b: 0.05,
            decay_b: 0.04,
        }
    }
}

/// The three control values produced by one tick, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Modulation {
    /// Slow integrator.
    pub a: f64,
    /// Mid-speed integrator.
    pub b: f64,
    /// Instantaneous coherence.
    pub c: f64,
}

impl Modulation {
    /// The channels in effect-index order.
    pub fn values(&self) -> [f64; 3] {
        [self.a, self.b, self.c]
    }
}

/// Directional agreement of the significant blobs' motion, in [0, 1].
pub fn coherence(tracked: &[TrackedBlob]) -> f64 {
    let (sum_x, sum_y, sum_speed) = tracked
        .iter()
        .filter(|t| t.is_significant())
        .fold((0.0, 0.0, 0.0), |(x, y, s), t| {
            (x + t.velocity.0, y + t.velocity.1, s + t.speed)
        });

    if sum_speed > 0.0 {
        sum_x.hypot(sum_y) / sum_speed
    } else {
        0.0
    }
}

/// Owns the modulation state and advances it once per tick.
#[derive(Debug, Clone, Default)]
pub struct MotionModulator {
    config: ModulatorConfig,
    state: Modulation,
}

impl MotionModulator {
    pub fn new(config: ModulatorConfig) -> Self {
        Self {
            config,
            state: Modulation::default(),
        }
    }

    pub fn config(&self) -> &ModulatorConfig {
        &self.config
    }

    /// The values produced by the last tick.
    pub fn state(&self) -> Modulation {
        self.state
    }

    /// Advances the accumulators by one tick.
    pub fn modulate(&mut self, tracked: &[TrackedBlob]) -> Modulation {
        let coherence = coherence(tracked);
        let cfg = &self.config;

        self.state = Modulation {
            a: integrate(self.state.a, coherence, cfg.attack_a, cfg.decay_a),
            b: integrate(self.state.b, coherence, cfg.attack_b, cfg.decay_b),
            c: clamp_unit(coherence),
        };
        self.state
    }

    /// Returns every channel to zero.
    pub fn reset(&mut self) {
        self.state = Modulation::default();
    }
}

fn integrate(value: f64, drive: f64, attack: f64, decay: f64) -> f64 {
    clamp_unit(value + drive * attack - decay)
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{ModulatorConfig, Modulation, MotionModulator, coherence};
    use crate::core_modules::blob::Blob;
    use crate::core_modules::tracker::{TrackedBlob, Tracker, TrackerConfig};

    /// Tracks a blob that moved by `velocity` over one second.
    fn tracked_with(config: TrackerConfig, velocity: (f64, f64)) -> TrackedBlob {
        let mut tracker = Tracker::new(config);
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(1);
        tracker
            .track(vec![Blob::new((0.0, 0.0), 5.0, t0)], f64::MAX)
            .unwrap();
        let mut tracked = tracker
            .track(vec![Blob::new(velocity, 5.0, t1)], f64::MAX)
            .unwrap();
        tracked.remove(0)
    }

    /// A settled, significant blob moving with `velocity` px/s.
    fn moving(velocity: (f64, f64)) -> TrackedBlob {
        tracked_with(
            TrackerConfig {
                speed_threshold: 1.0,
                maturity: Duration::ZERO,
            },
            velocity,
        )
    }

    #[test]
    fn aligned_motion_is_fully_coherent() {
        let blobs = vec![moving((300.0, 0.0)), moving((150.0, 0.0))];
        assert!((coherence(&blobs) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn opposing_motion_cancels() {
        let blobs = vec![moving((200.0, 0.0)), moving((-200.0, 0.0))];
        assert!(coherence(&blobs).abs() < 1e-9);
    }

    #[test]
    fn perpendicular_motion_is_partly_coherent() {
        let blobs = vec![moving((0.0, 200.0)), moving((200.0, 0.0))];
        assert!((coherence(&blobs) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-9);
    }

    #[test]
    fn insignificant_blobs_are_ignored() {
        let settled = moving((300.0, 0.0));
        let fresh = tracked_with(
            TrackerConfig {
                speed_threshold: 1.0,
                maturity: Duration::from_secs(60),
            },
            (-300.0, 0.0),
        );
        assert!(fresh.speed > 0.0);
        assert!(!fresh.is_significant());

        assert!((coherence(&[settled, fresh.clone()]) - 1.0).abs() < 1e-9);
        assert_eq!(coherence(&[fresh]), 0.0);
    }

    #[test]
    fn empty_tick_only_decays() {
        let mut modulator = MotionModulator::default();
        let aligned = vec![moving((300.0, 0.0))];
        for _ in 0..20 {
            modulator.modulate(&aligned);
        }
        let before = modulator.state();
        assert!(before.b > 0.0);

        let after = modulator.modulate(&[]);
        assert_eq!(after.c, 0.0);
        assert!(after.b < before.b);

        for _ in 0..100 {
            modulator.modulate(&[]);
        }
        assert_eq!(modulator.state(), Modulation::default());
    }

    #[test]
    fn integrators_decay_from_any_level() {
        let mut modulator = MotionModulator::new(ModulatorConfig {
            attack_a: 0.5,
            decay_a: 0.025,
            attack_b: 0.5,
            decay_b: 0.04,
        });
        let aligned = vec![moving((300.0, 0.0))];
        modulator.modulate(&aligned);
        let before = modulator.modulate(&aligned);
        assert!(before.a > 0.0 && before.b > 0.0);

        let after = modulator.modulate(&[]);
        assert!(after.a < before.a);
        assert!(after.b < before.b);
        assert_eq!(after.c, 0.0);
    }

    #[test]
    fn outputs_stay_in_unit_range() {
        let mut modulator = MotionModulator::new(ModulatorConfig {
            attack_a: 10.0,
            decay_a: 0.0,
            attack_b: 3.0,
            decay_b: 0.5,
        });
        let frames = [
            vec![moving((1e12, 0.0)), moving((1e12, 1.0))],
            vec![],
            vec![moving((3.0, -4.0))],
            vec![moving((-1e6, 0.0)), moving((1e6, 0.0))],
        ];
        for frame in frames.iter().cycle().take(40) {
            let m = modulator.modulate(frame);
            for v in m.values() {
                assert!((0.0..=1.0).contains(&v), "{v} escaped [0, 1]");
            }
        }
    }

    #[test]
    fn reset_zeroes_every_channel() {
        let mut modulator = MotionModulator::default();
        let aligned = vec![moving((300.0, 0.0))];
        for _ in 0..10 {
            modulator.modulate(&aligned);
        }
        modulator.reset();
        assert_eq!(modulator.state(), Modulation::default());
    }

    #[test]
    fn negative_rates_are_rejected() {
        let config = ModulatorConfig {
            decay_b: -0.1,
            ..ModulatorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(crate::Error::InputRange { name: "decay_b", .. })
        ));
        assert!(ModulatorConfig::default().validate().is_ok());
    }
}
