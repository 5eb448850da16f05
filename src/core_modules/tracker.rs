// THEORY:
// The `tracker` module gives the pipeline its short-term memory. It takes the
// stateless list of `Blob`s from a single frame and links each one to the blob it
// most plausibly was in the previous frame.
//
// This module solves the "data association problem" with the simplest rule that
// stays deterministic:
// 1.  **Greedy Matching**: Current blobs are visited in extraction order. Each one
//     claims the nearest previous blob that nobody has claimed yet. Ties go to
//     whichever previous blob comes first in the stored list.
// 2.  **Radius-aware Gate**: A claim only stands if the centers are closer than
//     the mean of the two radii plus a gate coefficient. Anything further away is
//     a new object and starts a fresh chain.
// 3.  **Identity Persistence**: A matched blob inherits the color and birth time
//     of its predecessor, so age accumulates along the chain.
// 4.  **One-frame Memory**: Only the last frame's list is kept. Previous blobs
//     that nobody claimed simply vanish; no "lost" event is produced.
//
// The tracker also derives per-blob motion (velocity, speed) and decides which
// blobs are settled and fast enough to count as significant motion.

use std::time::Duration;

use tracing::trace;

use crate::core_modules::blob::{Blob, Color};
use crate::error::{Error, Result};

/// Colors handed out to new chains, in rotation.
const CHAIN_PALETTE: [Color; 8] = [
    [0, 255, 0],
    [255, 0, 0],
    [0, 0, 255],
    [255, 255, 0],
    [0, 255, 255],
    [255, 0, 255],
    [255, 128, 0],
    [128, 0, 255],
];

/// Thresholds that decide whether a tracked blob's motion is significant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    /// Minimum speed, in pixels per second.
    pub speed_threshold: f64,
    /// Minimum chain age before motion is trusted.
    pub maturity: Duration,
}

impl TrackerConfig {
    /// Rejects a negative or non-finite speed threshold.
    pub fn validate(&self) -> Result<()> {
        if !self.speed_threshold.is_finite() || self.speed_threshold < 0.0 {
            return Err(Error::range("speed_threshold", self.speed_threshold));
        }
        Ok(())
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            speed_threshold: 100.0,
            maturity: Duration::from_millis(300),
        }
    }
}

/// A blob of the current frame together with the motion derived from its chain.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedBlob {
    pub blob: Blob,
    /// Pixels per second, relative to the predecessor.
    pub velocity: (f64, f64),
    /// Magnitude of `velocity`.
    pub speed: f64,
    significant: bool,
}

impl TrackedBlob {
    fn new(blob: Blob, predecessor: Option<&Blob>, config: &TrackerConfig) -> Self {
        let velocity = match predecessor {
            Some(prev) => {
                let dt = blob
                    .observed_at
                    .saturating_duration_since(prev.observed_at)
                    .as_secs_f64();
                if dt > 0.0 {
                    (
                        (blob.center.0 - prev.center.0) / dt,
                        (blob.center.1 - prev.center.1) / dt,
                    )
                } else {
                    (0.0, 0.0)
                }
            }
            None => (0.0, 0.0),
        };
        let speed = velocity.0.hypot(velocity.1);
        let significant = speed > config.speed_threshold && blob.age() > config.maturity;

        Self {
            blob,
            velocity,
            speed,
            significant,
        }
    }

    /// True when the blob moves faster than the speed threshold and its chain is
    /// older than the maturity duration.
    pub fn is_significant(&self) -> bool {
        self.significant
    }
}

/// Associates blobs across consecutive frames.
#[derive(Debug, Default)]
pub struct Tracker {
    config: TrackerConfig,
    /// The matched blobs of the last frame.
    previous: Vec<Blob>,
    /// Rotating index into `CHAIN_PALETTE`.
    next_color: usize,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            previous: Vec::new(),
            next_color: 0,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The blobs of the last tracked frame. `predecessor` indices produced by the
    /// next call to [`track`](Self::track) point into this list.
    pub fn previous(&self) -> &[Blob] {
        &self.previous
    }

    /// Links the current frame's blobs to the previous frame's and replaces the
    /// stored frame with the result.
    pub fn track(&mut self, current: Vec<Blob>, distance_gate: f64) -> Result<Vec<TrackedBlob>> {
        if !distance_gate.is_finite() || distance_gate < 0.0 {
            return Err(Error::range("distance_gate", distance_gate));
        }

        let mut claimed = vec![false; self.previous.len()];
        let mut tracked = Vec::with_capacity(current.len());

        for mut blob in current {
            // --- 1. Nearest unclaimed predecessor ---
            let mut nearest: Option<(usize, f64)> = None;
            for (i, prev) in self.previous.iter().enumerate() {
                if claimed[i] {
                    continue;
                }
                let dist = blob.distance_to(prev);
                if nearest.is_none_or(|(_, best)| dist < best) {
                    nearest = Some((i, dist));
                }
            }

            // --- 2. Gate ---
            let matched = nearest.filter(|&(i, dist)| {
                let prev = &self.previous[i];
                dist < (prev.radius + blob.radius) / 2.0 + distance_gate
            });

            // --- 3. Link or start a chain ---
            let predecessor = match matched {
                Some((i, dist)) => {
                    claimed[i] = true;
                    let prev = &self.previous[i];
                    blob.predecessor = Some(i);
                    blob.color = prev.color;
                    blob.birth = prev.birth;
                    trace!(predecessor = i, distance = dist, "Matched blob.");
                    Some(prev)
                }
                None => {
                    blob.predecessor = None;
                    blob.birth = blob.observed_at;
                    blob.color = CHAIN_PALETTE[self.next_color % CHAIN_PALETTE.len()];
                    self.next_color = self.next_color.wrapping_add(1);
                    None
                }
            };

            tracked.push(TrackedBlob::new(blob, predecessor, &self.config));
        }

        self.previous = tracked.iter().map(|t| t.blob.clone()).collect();
        Ok(tracked)
    }

    /// Forgets the previous frame. The next frame starts every chain afresh.
    pub fn reset(&mut self) {
        self.previous.clear();
    }
}
