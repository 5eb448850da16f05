use crate::error::Result;

mod midir;
mod mock;

pub use mock::Sink as MockSink;

/// Something that accepts raw 3-byte MIDI messages.
pub trait MidiSink {
    /// Returns the name of the underlying device.
    fn name(&self) -> &str;

    /// Sends one message immediately. Failures are reported, never retried.
    fn write(&mut self, message: &[u8; 3]) -> Result<()>;
}

impl<S: MidiSink + ?Sized> MidiSink for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn write(&mut self, message: &[u8; 3]) -> Result<()> {
        (**self).write(message)
    }
}

/// Lists the names of the MIDI output ports known to midir.
pub fn list_ports() -> Result<Vec<String>> {
    midir::list()
}

/// Opens the sink with the given name.
///
/// Names starting with `mock` give a recording sink that never touches
/// hardware. Anything else is matched against the midir output ports.
pub fn open_sink(name: &str) -> Result<Box<dyn MidiSink>> {
    if name.starts_with("mock") {
        return Ok(Box::new(MockSink::new(name)));
    }

    Ok(Box::new(midir::Sink::open(name)?))
}
