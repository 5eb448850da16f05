// THEORY:
// The `pipeline` module is the top-level API of the crate. It strings the stages
// together into a single per-frame call and owns all state that lives longer than
// one frame: the tracker's previous blob list and the modulator's accumulators.
//
// One tick is one captured frame, processed completely before the next:
//   contours -> BlobExtractor -> Tracker -> MotionModulator -> ControlEmitter
//
// The stages are strictly sequential: tracker output is modulator input. Only
// extraction may fan out across threads, and it joins before tracking starts.

use std::time::Instant;

use futures::{Stream, StreamExt};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::core_modules::blob::Contour;
use crate::core_modules::blob_extractor::{AreaBand, BlobExtractor};
use crate::core_modules::control_emitter::{ControlChannel, ControlEmitter, default_channels};
use crate::core_modules::modulator::{ModulatorConfig, MotionModulator};
use crate::core_modules::tracker::{Tracker, TrackerConfig};
use crate::error::{Error, Result};
use crate::midi::MidiSink;

// Re-export key data structures for the public API.
pub use crate::core_modules::modulator::Modulation;
pub use crate::core_modules::tracker::TrackedBlob;

/// Configuration for the FrameDriver, allowing for tunable behavior.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Contour areas that count as blobs.
    pub area: AreaBand,
    /// Added to the mean radius of two blobs to get their matching distance.
    pub distance_gate: f64,
    pub tracker: TrackerConfig,
    pub modulator: ModulatorConfig,
    /// Routing for effects A, B and C, in that order. Extra entries are only
    /// ever reset.
    pub channels: Vec<ControlChannel>,
    /// Spread blob extraction across CPUs.
    pub parallel_extraction: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            area: AreaBand::default(),
            distance_gate: 10.0,
            tracker: TrackerConfig::default(),
            modulator: ModulatorConfig::default(),
            channels: default_channels(),
            parallel_extraction: false,
        }
    }
}

/// The contours found in one captured frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub contours: Vec<Contour>,
    pub captured_at: Instant,
}

/// What one tick produced.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tracked: Vec<TrackedBlob>,
    pub modulation: Modulation,
}

impl TickReport {
    pub fn significant_count(&self) -> usize {
        self.tracked.iter().filter(|t| t.is_significant()).count()
    }
}

/// Drives the whole pipeline, one frame at a time.
pub struct FrameDriver<S: MidiSink> {
    extractor: BlobExtractor,
    tracker: Tracker,
    modulator: MotionModulator,
    emitter: ControlEmitter<S>,
    distance_gate: f64,
    parallel_extraction: bool,
    ticks: u64,
}

impl<S: MidiSink> FrameDriver<S> {
    pub fn new(config: PipelineConfig, sink: S) -> Result<Self> {
        if !config.distance_gate.is_finite() || config.distance_gate < 0.0 {
            return Err(Error::range("distance_gate", config.distance_gate));
        }
        config.tracker.validate()?;
        config.modulator.validate()?;

        Ok(Self {
            extractor: BlobExtractor::new(config.area),
            tracker: Tracker::new(config.tracker),
            modulator: MotionModulator::new(config.modulator),
            emitter: ControlEmitter::new(sink, config.channels),
            distance_gate: config.distance_gate,
            parallel_extraction: config.parallel_extraction,
            ticks: 0,
        })
    }

    /// Processes one frame and sends the resulting control values.
    ///
    /// Tracker and modulator state advance even if the sink then fails, so the
    /// next tick continues from the frame that was actually seen.
    pub fn tick(&mut self, contours: &[Contour], now: Instant) -> Result<TickReport> {
        self.ticks += 1;

        // Stage 1: Extraction
        let blobs = if self.parallel_extraction {
            self.extractor.extract_parallel(contours, now)
        } else {
            self.extractor.extract(contours, now)
        };

        // Stage 2: Tracking
        let tracked = self.tracker.track(blobs, self.distance_gate)?;

        // Stage 3: Modulation
        let modulation = self.modulator.modulate(&tracked);

        let report = TickReport {
            tracked,
            modulation,
        };
        debug!(
            tick = self.ticks,
            contours = contours.len(),
            blobs = report.tracked.len(),
            significant = report.significant_count(),
            a = modulation.a,
            b = modulation.b,
            c = modulation.c,
            "Processed frame."
        );

        // Stage 4: Emission
        for (effect, value) in modulation.values().into_iter().enumerate() {
            if effect < self.emitter.channels().len() {
                self.emitter.set(effect, value)?;
            }
        }

        Ok(report)
    }

    /// Runs ticks until the frame stream ends, then resets every channel.
    ///
    /// A tick that fails is logged and skipped; the stream keeps going.
    pub async fn run<St>(&mut self, mut frames: St) -> Result<u64>
    where
        St: Stream<Item = Frame> + Unpin,
    {
        let span = info_span!("frame driver", sink = self.emitter.sink().name());
        async {
            info!("Frame driver started.");

            let mut processed: u64 = 0;
            while let Some(frame) = frames.next().await {
                match self.tick(&frame.contours, frame.captured_at) {
                    Ok(_) => processed += 1,
                    Err(e) => warn!(err = %e, "Frame failed."),
                }
            }

            info!(frames = processed, "Frame stream ended, resetting channels.");
            self.shutdown()?;
            Ok::<_, Error>(processed)
        }
        .instrument(span)
        .await
    }

    /// Returns hardware to neutral and clears all tracking and modulation state.
    pub fn shutdown(&mut self) -> Result<()> {
        self.tracker.reset();
        self.modulator.reset();
        self.emitter.reset_all()
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn modulator(&self) -> &MotionModulator {
        &self.modulator
    }

    pub fn emitter(&self) -> &ControlEmitter<S> {
        &self.emitter
    }

    /// How many ticks have been attempted.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;
    use std::time::{Duration, Instant};

    use futures::stream;

    use super::{Frame, FrameDriver, PipelineConfig};
    use crate::core_modules::blob::{Contour, Point};
    use crate::core_modules::tracker::TrackerConfig;
    use crate::midi::MockSink;

    fn square(cx: i32, cy: i32) -> Contour {
        vec![
            Point::new(cx - 10, cy - 10),
            Point::new(cx + 10, cy - 10),
            Point::new(cx + 10, cy + 10),
            Point::new(cx - 10, cy + 10),
        ]
    }

    #[test]
    fn tick_emits_three_channels() -> Result<(), Box<dyn Error>> {
        let sink = MockSink::new("mock");
        let mut driver = FrameDriver::new(PipelineConfig::default(), sink.clone())?;

        let report = driver.tick(&[square(50, 50)], Instant::now())?;

        assert_eq!(report.tracked.len(), 1);
        assert_eq!(report.significant_count(), 0);
        assert_eq!(
            sink.written(),
            vec![[0xB7, 0, 0], [0xBA, 1, 0], [0xBE, 42, 0]]
        );
        assert_eq!(driver.ticks(), 1);
        Ok(())
    }

    #[test]
    fn contours_outside_band_are_ignored() -> Result<(), Box<dyn Error>> {
        let mut driver = FrameDriver::new(PipelineConfig::default(), MockSink::new("mock"))?;
        let tiny = vec![Point::new(0, 0), Point::new(2, 0), Point::new(2, 2)];

        let report = driver.tick(&[tiny], Instant::now())?;
        assert!(report.tracked.is_empty());
        Ok(())
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = PipelineConfig {
            distance_gate: -3.0,
            ..PipelineConfig::default()
        };
        assert!(FrameDriver::new(config, MockSink::new("mock")).is_err());
    }

    #[test]
    fn invalid_speed_threshold_is_rejected() {
        for speed_threshold in [f64::NAN, -1.0, f64::INFINITY] {
            let config = PipelineConfig {
                tracker: TrackerConfig {
                    speed_threshold,
                    ..TrackerConfig::default()
                },
                ..PipelineConfig::default()
            };
            assert!(matches!(
                FrameDriver::new(config, MockSink::new("mock")),
                Err(crate::Error::InputRange {
                    name: "speed_threshold",
                    ..
                })
            ));
        }
    }

    #[test]
    fn device_failure_is_reported_but_state_advances() -> Result<(), Box<dyn Error>> {
        let sink = MockSink::new("mock");
        let mut driver = FrameDriver::new(PipelineConfig::default(), sink.clone())?;
        sink.set_failing(true);

        assert!(driver.tick(&[square(50, 50)], Instant::now()).is_err());
        assert_eq!(driver.tracker().previous().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn run_resets_channels_at_end_of_stream() -> Result<(), Box<dyn Error>> {
        let sink = MockSink::new("mock");
        let mut driver = FrameDriver::new(PipelineConfig::default(), sink.clone())?;
        let start = Instant::now();
        let frames: Vec<Frame> = (0..5)
            .map(|i| Frame {
                contours: vec![square(50 + i * 5, 50)],
                captured_at: start + Duration::from_millis(33 * i as u64),
            })
            .collect();

        let processed = driver.run(stream::iter(frames)).await?;

        assert_eq!(processed, 5);
        let written = sink.written();
        assert_eq!(written.len(), 5 * 3 + 3);
        assert_eq!(
            written[written.len() - 3..],
            [[0xB7, 0, 64], [0xBA, 1, 64], [0xBE, 42, 64]]
        );
        assert!(driver.tracker().previous().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn run_survives_failing_ticks() -> Result<(), Box<dyn Error>> {
        let sink = MockSink::new("mock");
        let mut driver = FrameDriver::new(PipelineConfig::default(), sink.clone())?;
        sink.set_failing(true);
        let frames = vec![Frame {
            contours: vec![square(50, 50)],
            captured_at: Instant::now(),
        }];

        // Every write fails, including the final reset.
        assert!(driver.run(stream::iter(frames)).await.is_err());
        assert_eq!(driver.ticks(), 1);
        Ok(())
    }
}
