// THEORY:
// Every failure the pipeline can surface is one of a small number of kinds.
// Range violations are caught at the boundaries (extractor inputs, emitter
// inputs, configuration) and reported with the offending name and value.
// Degenerate geometry is never an error: it is resolved locally with a neutral
// value, so it has no variant here. Device failures come from the MIDI sink and
// are handed back to the caller untouched; nothing in this crate retries them.

/// Errors produced by the modulation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A value fell outside its documented domain.
    #[error("{name} out of range: {value}")]
    InputRange { name: &'static str, value: f64 },

    /// An effect index that has no entry in the channel table.
    #[error("no control channel configured for effect {0}")]
    UnknownEffect(usize),

    /// The MIDI sink could not be opened or refused a write.
    #[error("MIDI device error: {0}")]
    Device(String),

    /// The settings file could not be loaded or parsed.
    #[error("config load/parse error: {0}")]
    Config(#[from] ::config::ConfigError),
}

impl Error {
    pub(crate) fn range(name: &'static str, value: impl Into<f64>) -> Self {
        Error::InputRange {
            name,
            value: value.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
