// THEORY:
// This file is the main entry point for the `flicker_cc` library crate. It
// defines the public API exposed to applications that own a camera and a MIDI
// output and want one to drive the other.
//
// The primary export is the `FrameDriver` and its associated data structures
// (`PipelineConfig`, `Frame`, `TickReport`), which run the whole chain per frame.
// The individual stages in `core_modules` stay public for callers that want to
// drive them separately, for example to draw tracked blobs over the video.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod midi;
pub mod pipeline;

pub use error::{Error, Result};
