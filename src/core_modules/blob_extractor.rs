// THEORY:
// The `BlobExtractor` is the entry point of the tracking pipeline. It receives the
// contours an external thresholding step found in the current frame and turns the
// ones that look like real light/motion events into `Blob`s.
//
// Algorithm steps, per contour:
// 1.  **Area**: The enclosed polygon area is computed with the shoelace formula.
//     This is geometric area, not a pixel count, matching what contour-finding
//     libraries report.
// 2.  **Band Filtering**: Contours whose area falls outside the inclusive
//     `[min, max]` band are background noise and are dropped without comment.
// 3.  **Degeneracy**: Contours with fewer than three vertices, or with (near) zero
//     area such as collinear strokes, are skipped. They never reach the circle
//     fitting and never cause an error.
// 4.  **Enclosing Circle**: The minimum enclosing circle of the vertices gives the
//     blob's center and radius.
//
// The extractor is a stateless utility. Output order always matches the source
// contour order, in the parallel variant as well.

use std::thread;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::trace;

use crate::core_modules::blob::{Blob, Contour, Point};
use crate::error::{Error, Result};

/// Polygons with less area than this are treated as degenerate.
const DEGENERATE_AREA_EPSILON: f64 = 1e-9;

/// Slack used when testing whether a point lies inside a candidate circle.
const CONTAINMENT_EPSILON: f64 = 1e-7;

/// Seed for the point order used by the enclosing-circle search.
const CIRCLE_SHUFFLE_SEED: u64 = 0x5EED_C1C1E;

/// Below this many contours the parallel variant just runs sequentially.
const PARALLEL_MIN_CONTOURS: usize = 64;

/// The inclusive range of contour areas that count as blobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaBand {
    min: f64,
    max: f64,
}

impl AreaBand {
    /// Creates a band, rejecting negative, non-finite or inverted bounds.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || min < 0.0 {
            return Err(Error::range("min_area", min));
        }
        if !max.is_finite() || max < min {
            return Err(Error::range("max_area", max));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn contains(&self, area: f64) -> bool {
        area >= self.min && area <= self.max
    }
}

impl Default for AreaBand {
    /// 300 to 1200 square pixels, sized for small light sources seen by a webcam.
    fn default() -> Self {
        Self {
            min: 300.0,
            max: 1200.0,
        }
    }
}

/// A circle described by its center and radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: (f64, f64),
    pub radius: f64,
}

impl Circle {
    fn contains(&self, p: (f64, f64)) -> bool {
        let d = (p.0 - self.center.0).hypot(p.1 - self.center.1);
        d <= self.radius + CONTAINMENT_EPSILON * self.radius.max(1.0)
    }

    fn from_two(a: (f64, f64), b: (f64, f64)) -> Self {
        let center = ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0);
        Self {
            center,
            radius: (a.0 - b.0).hypot(a.1 - b.1) / 2.0,
        }
    }

    fn from_three(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Self {
        let (bx, by) = (b.0 - a.0, b.1 - a.1);
        let (cx, cy) = (c.0 - a.0, c.1 - a.1);
        let d = 2.0 * (bx * cy - by * cx);
        if d.abs() < f64::EPSILON {
            // Collinear: the widest pair spans the other point.
            let mut widest = Self::from_two(a, b);
            for candidate in [Self::from_two(a, c), Self::from_two(b, c)] {
                if candidate.radius > widest.radius {
                    widest = candidate;
                }
            }
            return widest;
        }
        let b2 = bx * bx + by * by;
        let c2 = cx * cx + cy * cy;
        let ux = (cy * b2 - by * c2) / d;
        let uy = (bx * c2 - cx * b2) / d;
        Self {
            center: (a.0 + ux, a.1 + uy),
            radius: ux.hypot(uy),
        }
    }
}

/// Polygon area of a closed contour, via the shoelace formula.
///
/// Each cross term fits in an `i64`; the running sum is kept in `i128` so any
/// `i32` coordinates are safe.
pub fn contour_area(contour: &[Point]) -> f64 {
    if contour.len() < 3 {
        return 0.0;
    }
    let twice_area: i128 = contour
        .iter()
        .zip(contour.iter().cycle().skip(1))
        .map(|(p, q)| (p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64) as i128)
        .sum();
    (twice_area as f64).abs() / 2.0
}

/// Smallest circle enclosing every vertex of the contour.
///
/// Returns `None` for an empty contour. Points are visited in a fixed-seed
/// shuffled order: boundary order is the worst case for the incremental search,
/// and the fixed seed keeps results identical from run to run.
pub fn min_enclosing_circle(contour: &[Point]) -> Option<Circle> {
    let mut points: Vec<(f64, f64)> = contour.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    points.shuffle(&mut StdRng::seed_from_u64(CIRCLE_SHUFFLE_SEED));
    let first = *points.first()?;
    let mut circle = Circle {
        center: first,
        radius: 0.0,
    };

    for i in 1..points.len() {
        if circle.contains(points[i]) {
            continue;
        }
        circle = Circle {
            center: points[i],
            radius: 0.0,
        };
        for j in 0..i {
            if circle.contains(points[j]) {
                continue;
            }
            circle = Circle::from_two(points[i], points[j]);
            for k in 0..j {
                if !circle.contains(points[k]) {
                    circle = Circle::from_three(points[i], points[j], points[k]);
                }
            }
        }
    }

    Some(circle)
}

/// Converts contours into blobs for a single frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlobExtractor {
    band: AreaBand,
}

impl BlobExtractor {
    pub fn new(band: AreaBand) -> Self {
        Self { band }
    }

    pub fn band(&self) -> AreaBand {
        self.band
    }

    /// Extracts a blob from every contour whose area lies inside the band.
    pub fn extract(&self, contours: &[Contour], observed_at: Instant) -> Vec<Blob> {
        contours
            .iter()
            .filter_map(|contour| self.extract_one(contour, observed_at))
            .collect()
    }

    /// Same as [`extract`](Self::extract), spread across one worker per CPU.
    ///
    /// Results are concatenated in chunk order, so the output is identical to
    /// the sequential version.
    pub fn extract_parallel(&self, contours: &[Contour], observed_at: Instant) -> Vec<Blob> {
        let workers = num_cpus::get().max(1);
        if workers == 1 || contours.len() < PARALLEL_MIN_CONTOURS {
            return self.extract(contours, observed_at);
        }

        let chunk_size = contours.len().div_ceil(workers);
        thread::scope(|scope| {
            let handles: Vec<_> = contours
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || self.extract(chunk, observed_at)))
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| match handle.join() {
                    Ok(blobs) => blobs,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    fn extract_one(&self, contour: &[Point], observed_at: Instant) -> Option<Blob> {
        let area = contour_area(contour);
        if area <= DEGENERATE_AREA_EPSILON {
            trace!(vertices = contour.len(), "Skipping degenerate contour.");
            return None;
        }
        if !self.band.contains(area) {
            return None;
        }

        let circle = min_enclosing_circle(contour)?;
        Some(Blob::new(circle.center, circle.radius, observed_at))
    }
}
