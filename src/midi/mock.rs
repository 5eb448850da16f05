use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use tracing::debug;

use crate::error::{Error, Result};

/// A sink that records every message instead of sending it.
///
/// Clones share the same record, so a test can keep one handle while the
/// pipeline owns another.
#[derive(Clone, Debug)]
pub struct Sink {
    name: String,
    written: Arc<Mutex<Vec<[u8; 3]>>>,
    failing: Arc<AtomicBool>,
}

impl Sink {
    pub fn new(name: &str) -> Sink {
        Sink {
            name: name.to_string(),
            written: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Every message written so far, oldest first.
    pub fn written(&self) -> Vec<[u8; 3]> {
        match self.written.lock() {
            Ok(written) => written.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Forgets the recorded messages.
    pub fn clear(&self) {
        match self.written.lock() {
            Ok(mut written) => written.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    /// Makes subsequent writes fail as if the device had gone away.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }
}

impl super::MidiSink for Sink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, message: &[u8; 3]) -> Result<()> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(Error::Device(format!("{} is unavailable", self.name)));
        }
        debug!(device = %self.name, message = ?message, "Recording MIDI message.");
        let mut written = self
            .written
            .lock()
            .map_err(|_| Error::Device(format!("{} record is poisoned", self.name)))?;
        written.push(*message);
        Ok(())
    }
}
