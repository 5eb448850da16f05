use midir::{MidiOutput, MidiOutputConnection};
use tracing::{debug, info};

use crate::error::{Error, Result};

const CLIENT_NAME: &str = "flicker_cc output";

/// A sink backed by a midir output connection.
pub struct Sink {
    name: String,
    connection: MidiOutputConnection,
}

impl Sink {
    /// Connects to the first output port whose name contains `name`.
    pub fn open(name: &str) -> Result<Sink> {
        let output = MidiOutput::new(CLIENT_NAME).map_err(|e| Error::Device(e.to_string()))?;

        let port = output
            .ports()
            .into_iter()
            .find(|port| {
                output
                    .port_name(port)
                    .is_ok_and(|port_name| port_name.contains(name))
            })
            .ok_or_else(|| Error::Device(format!("no MIDI output port matching {name:?}")))?;
        let port_name = output
            .port_name(&port)
            .map_err(|e| Error::Device(e.to_string()))?;

        let connection = output
            .connect(&port, "flicker_cc")
            .map_err(|e| Error::Device(e.to_string()))?;
        info!(port = %port_name, "Opened MIDI output.");

        Ok(Sink {
            name: port_name,
            connection,
        })
    }
}

impl super::MidiSink for Sink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, message: &[u8; 3]) -> Result<()> {
        debug!(
            port = %self.name,
            status = message[0],
            data1 = message[1],
            data2 = message[2],
            "Sending MIDI message."
        );
        self.connection
            .send(message)
            .map_err(|e| Error::Device(e.to_string()))
    }
}

pub fn list() -> Result<Vec<String>> {
    let output = MidiOutput::new(CLIENT_NAME).map_err(|e| Error::Device(e.to_string()))?;
    Ok(output
        .ports()
        .iter()
        .filter_map(|port| output.port_name(port).ok())
        .collect())
}
