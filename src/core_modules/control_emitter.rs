// THEORY:
// The `ControlEmitter` is the boundary between the modulation math and the MIDI
// wire. Upstream everything is an abstract float in [0, 1]; only here is a value
// turned into a 7-bit integer and packed into a 3-byte Control Change message.
//
// Key architectural principles:
// 1.  **Contract Boundary**: Inputs are validated again even though the modulator
//     already clamps. Out-of-range values are errors here, never silently fixed.
// 2.  **Static Routing**: A fixed table maps each effect index to a MIDI channel,
//     a controller number and a neutral default value.
// 3.  **Unbuffered Output**: Each control update becomes exactly one sink write.
//     Control-rate traffic is far below MIDI bandwidth, and a stale value is not
//     worth retrying, so device errors are handed straight back to the caller.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::midi::MidiSink;

/// Largest 7-bit data value.
pub const VALUE_MAX: u8 = 0x7F;

/// Largest channel number that fits in the status nibble.
pub const CHANNEL_MAX: u8 = 0x0F;

/// Channel voice commands, placed in the high nibble of the status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    NoteOff = 0x80,
    NoteOn = 0x90,
    PolyphonicAftertouch = 0xA0,
    ControlChange = 0xB0,
    ProgramChange = 0xC0,
    ChannelAftertouch = 0xD0,
    PitchBend = 0xE0,
}

/// Well-known controller numbers.
pub mod controllers {
    pub const BANK: u8 = 0x00;
    pub const MODULATION: u8 = 0x01;
    pub const BREATH: u8 = 0x02;
    pub const FOOT: u8 = 0x04;
    pub const PORTAMENTO_TIME: u8 = 0x05;
    pub const DATA_ENTRY_MSB: u8 = 0x06;
    pub const VOLUME: u8 = 0x07;
    pub const BALANCE: u8 = 0x08;
    pub const PAN: u8 = 0x0A;
    pub const EXPRESSION: u8 = 0x0B;
    pub const EFFECT1: u8 = 0x0C;
    pub const EFFECT2: u8 = 0x0D;
    pub const DAMPER: u8 = 0x40;
    pub const PORTAMENTO: u8 = 0x41;
    pub const SOSTENUTO: u8 = 0x42;
    pub const SOFT_PEDAL: u8 = 0x43;
    pub const LEGATO: u8 = 0x44;
    pub const HOLD2: u8 = 0x45;

    /// Channel mode message: silence every sounding note on the channel.
    pub const ALL_NOTES_OFF: u8 = 0x7B;
}

/// Maps a float in [0, 1] linearly onto 0..=127.
pub fn normalize_to_7bit(x: f64) -> Result<u8> {
    if !(0.0..=1.0).contains(&x) {
        return Err(Error::range("normalized value", x));
    }
    Ok((x * VALUE_MAX as f64).round() as u8)
}

/// Packs a channel voice message.
pub fn build_message(channel: u8, command: Command, data1: u8, data2: u8) -> Result<[u8; 3]> {
    if channel > CHANNEL_MAX {
        return Err(Error::range("channel", channel));
    }
    Ok([command as u8 | channel, data1, data2])
}

/// Packs a Control Change message.
///
/// `controller` may use the full byte; `value` must fit in seven bits.
pub fn build_cc_message(channel: u8, controller: u8, value: u8) -> Result<[u8; 3]> {
    if value > VALUE_MAX {
        return Err(Error::range("control value", value));
    }
    build_message(channel, Command::ControlChange, controller, value)
}

/// Routing for one effect: where its value goes and what "neutral" means.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlChannel {
    channel: u8,
    controller: u8,
    default_value: f64,
}

impl ControlChannel {
    pub fn new(channel: u8, controller: u8, default_value: f64) -> Result<Self> {
        if channel > CHANNEL_MAX {
            return Err(Error::range("channel", channel));
        }
        if !(0.0..=1.0).contains(&default_value) {
            return Err(Error::range("default value", default_value));
        }
        Ok(Self {
            channel,
            controller,
            default_value,
        })
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn controller(&self) -> u8 {
        self.controller
    }

    pub fn default_value(&self) -> f64 {
        self.default_value
    }
}

/// The routing table for effects A, B and C.
pub fn default_channels() -> Vec<ControlChannel> {
    [(7, 0), (10, 1), (14, 42)]
        .into_iter()
        .map(|(channel, controller)| ControlChannel {
            channel,
            controller,
            default_value: 0.5,
        })
        .collect()
}

/// Sends normalized effect values to a MIDI sink.
pub struct ControlEmitter<S: MidiSink> {
    sink: S,
    channels: Vec<ControlChannel>,
}

impl<S: MidiSink> ControlEmitter<S> {
    pub fn new(sink: S, channels: Vec<ControlChannel>) -> Self {
        Self { sink, channels }
    }

    pub fn channels(&self) -> &[ControlChannel] {
        &self.channels
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Writes `value` to the given channel.
    pub fn emit(&mut self, channel: &ControlChannel, value: f64) -> Result<()> {
        let value7 = normalize_to_7bit(value)?;
        let message = build_cc_message(channel.channel, channel.controller, value7)?;
        debug!(
            channel = channel.channel,
            controller = channel.controller,
            value = value7,
            "Emitting control change."
        );
        self.sink.write(&message)
    }

    /// Writes the channel's default value.
    pub fn reset(&mut self, channel: &ControlChannel) -> Result<()> {
        self.emit(channel, channel.default_value)
    }

    /// Sets the value of the effect with the given index.
    pub fn set(&mut self, effect: usize, value: f64) -> Result<()> {
        let channel = self.channel(effect)?;
        self.emit(&channel, value)
    }

    /// Returns the effect with the given index to its default value.
    pub fn reset_effect(&mut self, effect: usize) -> Result<()> {
        let channel = self.channel(effect)?;
        self.reset(&channel)
    }

    /// Resets every configured effect. All channels are attempted even if one
    /// fails; the first error is returned.
    pub fn reset_all(&mut self) -> Result<()> {
        let mut first_error = None;
        for channel in self.channels.clone() {
            if let Err(e) = self.reset(&channel) {
                warn!(
                    channel = channel.channel,
                    controller = channel.controller,
                    err = %e,
                    "Unable to reset control channel."
                );
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn channel(&self, effect: usize) -> Result<ControlChannel> {
        self.channels
            .get(effect)
            .copied()
            .ok_or(Error::UnknownEffect(effect))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Command, ControlChannel, ControlEmitter, build_cc_message, build_message,
        controllers, default_channels, normalize_to_7bit,
    };
    use crate::Error;
    use crate::midi::MockSink;

    #[test]
    fn normalize_covers_the_full_range() {
        assert_eq!(normalize_to_7bit(0.0).unwrap(), 0);
        assert_eq!(normalize_to_7bit(1.0).unwrap(), 127);
        assert_eq!(normalize_to_7bit(0.5).unwrap(), 64);
        for i in 0..=1000 {
            let v = normalize_to_7bit(i as f64 / 1000.0).unwrap();
            assert!(v <= 127);
        }
    }

    #[test]
    fn normalize_rejects_out_of_range() {
        for x in [-0.001, 1.001, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                normalize_to_7bit(x),
                Err(Error::InputRange { .. })
            ));
        }
    }

    #[test]
    fn control_change_layout() {
        assert_eq!(build_cc_message(7, 0, 64).unwrap(), [0xB7, 0x00, 0x40]);
        assert_eq!(build_cc_message(0, 255, 127).unwrap(), [0xB0, 0xFF, 0x7F]);
        assert_eq!(
            build_cc_message(14, controllers::ALL_NOTES_OFF, 0).unwrap(),
            [0xBE, 0x7B, 0x00]
        );
    }

    #[test]
    fn control_change_bounds() {
        assert!(build_cc_message(16, 0, 0).is_err());
        assert!(build_cc_message(0, 0, 128).is_err());
        assert!(build_cc_message(15, 0, 127).is_ok());
    }

    #[test]
    fn other_commands() {
        assert_eq!(
            build_message(0, Command::NoteOn, 60, 127).unwrap(),
            [0x90, 60, 127]
        );
        assert_eq!(
            build_message(9, Command::ProgramChange, 5, 0).unwrap(),
            [0xC9, 5, 0]
        );
        assert!(build_message(16, Command::NoteOff, 60, 0).is_err());
    }

    #[test]
    fn channel_validation() {
        assert!(ControlChannel::new(16, 0, 0.5).is_err());
        assert!(ControlChannel::new(0, 0, 1.5).is_err());
        assert!(ControlChannel::new(0, 0, f64::NAN).is_err());
        let channel = ControlChannel::new(15, 200, 1.0).unwrap();
        assert_eq!(channel.channel(), 15);
        assert_eq!(channel.controller(), 200);
    }

    #[test]
    fn emit_writes_one_message() {
        let sink = MockSink::new("mock");
        let mut emitter = ControlEmitter::new(sink.clone(), default_channels());

        emitter.set(0, 0.5).unwrap();
        emitter.set(2, 1.0).unwrap();

        assert_eq!(sink.written(), vec![[0xB7, 0x00, 0x40], [0xBE, 42, 0x7F]]);
    }

    #[test]
    fn reset_sends_default_values() {
        let sink = MockSink::new("mock");
        let mut emitter = ControlEmitter::new(sink.clone(), default_channels());

        emitter.reset_effect(1).unwrap();
        assert_eq!(sink.written(), vec![[0xBA, 0x01, 0x40]]);

        sink.clear();
        emitter.reset_all().unwrap();
        assert_eq!(
            sink.written(),
            vec![[0xB7, 0x00, 0x40], [0xBA, 0x01, 0x40], [0xBE, 42, 0x40]]
        );
    }

    #[test]
    fn unknown_effect() {
        let mut emitter = ControlEmitter::new(MockSink::new("mock"), default_channels());
        assert!(matches!(emitter.set(3, 0.1), Err(Error::UnknownEffect(3))));
        assert!(matches!(emitter.reset_effect(7), Err(Error::UnknownEffect(7))));
    }

    #[test]
    fn invalid_value_writes_nothing() {
        let sink = MockSink::new("mock");
        let mut emitter = ControlEmitter::new(sink.clone(), default_channels());
        assert!(emitter.set(0, 2.0).is_err());
        assert!(sink.written().is_empty());
    }

    #[test]
    fn device_errors_propagate() {
        let sink = MockSink::new("mock");
        let mut emitter = ControlEmitter::new(sink.clone(), default_channels());
        sink.set_failing(true);

        assert!(matches!(emitter.set(0, 0.2), Err(Error::Device(_))));
        assert!(matches!(emitter.reset_all(), Err(Error::Device(_))));

        sink.set_failing(false);
        emitter.set(0, 0.2).unwrap();
        assert_eq!(sink.written().len(), 1);
    }
}
