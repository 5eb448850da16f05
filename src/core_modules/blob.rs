// THEORY:
// The `blob` module holds the plain data that flows between the extraction and
// tracking stages. A `Blob` is a snapshot: one bright or moving region in one
// frame, approximated by the smallest circle that encloses its contour.
//
// Key architectural principles:
// 1.  **Stateless Data Container**: A `Blob` carries no behaviour of its own. The
//     `Tracker` fills in the identity fields (color, birth, predecessor) when it
//     links a blob to the previous frame.
// 2.  **Non-owning Chains**: The link to the blob this one was matched from is an
//     index into the previous frame's list, not a pointer. The previous list is
//     dropped wholesale every tick, so a strong reference would either keep it
//     alive forever or dangle.

use std::time::Instant;

/// An integer vertex of a contour, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// An ordered, implicitly closed polygon produced by an external contour finder.
pub type Contour = Vec<Point>;

/// A cosmetic RGB tag that stays with a blob for as long as it is tracked.
pub type Color = [u8; 3];

/// A single region of interest detected in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    /// Center of the minimum enclosing circle.
    pub center: (f64, f64),
    /// Radius of the minimum enclosing circle. Never negative.
    pub radius: f64,
    /// Display color. Not used by modulation.
    pub color: Color,
    /// When the chain this blob belongs to was first observed.
    pub birth: Instant,
    /// When the frame containing this blob was captured.
    pub observed_at: Instant,
    /// Index of the matched blob in the preceding frame's list, if any.
    pub predecessor: Option<usize>,
}

impl Blob {
    /// Creates an unlinked observation. Its chain is born at `observed_at`.
    pub fn new(center: (f64, f64), radius: f64, observed_at: Instant) -> Self {
        Self {
            center,
            radius,
            color: [255, 255, 255],
            birth: observed_at,
            observed_at,
            predecessor: None,
        }
    }

    /// Euclidean distance between the centers of two blobs.
    pub fn distance_to(&self, other: &Blob) -> f64 {
        let dx = self.center.0 - other.center.0;
        let dy = self.center.1 - other.center.1;
        dx.hypot(dy)
    }

    /// How long this blob's chain has existed at the time it was observed.
    pub fn age(&self) -> std::time::Duration {
        self.observed_at.saturating_duration_since(self.birth)
    }
}
