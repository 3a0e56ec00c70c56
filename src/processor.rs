use crate::error::PrepareError;
use crate::midi::TimedMidiEvent;

/// The device configuration a processor is prepared against.
///
/// Captured once per device start; `prepare` is always called with the
/// configuration that subsequent `process` calls will honour.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DeviceConfig {
    pub sample_rate: f64,
    /// Maximum number of samples per channel in any one process call.
    pub block_size: usize,
    pub num_input_channels: usize,
    pub num_output_channels: usize,
}

impl DeviceConfig {
    /// Number of channels in the unified buffer view a processor sees.
    pub fn total_channels(&self) -> usize {
        usize::max(self.num_input_channels, self.num_output_channels)
    }
}

pub struct ProcessorData<'a> {
    /// Number of samples in each audio channel
    pub samples: usize,
    /// Channel-major audio, `max(inputs, outputs)` channels wide. Input
    /// channels arrive pre-filled; the processor writes its output in place.
    pub audio: &'a mut [&'a mut [f32]],
    /// MIDI events for this block, non-decreasing in time
    pub midi: &'a [TimedMidiEvent],
}

/// A pluggable audio processing unit.
///
/// `prepare` is called with the device configuration before any `process`
/// call, and `release` before reconfiguration or teardown. `process` runs on
/// the real-time audio thread and must not block or allocate.
pub trait Processor: Send {
    /// Gets the processor ready for streaming. Returning an error leaves the
    /// processor out of the stream; no `process` call will follow.
    fn prepare(&mut self, config: &DeviceConfig) -> Result<(), PrepareError>;

    /// Processes one block of MIDI and audio data.
    fn process(&mut self, data: ProcessorData);

    /// Frees whatever `prepare` set up. Always paired with a successful
    /// `prepare`.
    fn release(&mut self);
}
