use crate::convert::{deinterleave, interleave};
use crate::error::DeviceError;
use crate::player::AudioIoCallback;
use crate::processor::DeviceConfig;
use crate::MAX_BLOCK_SIZE;
use basedrop::Handle;
use bumpalo::Bump;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, Device, Stream, StreamConfig};
use ringbuf_basedrop as ringbuf;
use std::sync::{Arc, Mutex};

/// Streams a duplex audio connection through an [`AudioIoCallback`].
///
/// The input device (if any) is captured into a ring buffer whose retired
/// allocations are collected off the audio thread via the caller's basedrop
/// [`Handle`]. Captured samples re-emerge, deinterleaved, as the callback's
/// input channels; the callback runs on the output stream's thread.
///
/// The callback mutex is uncontended while streaming: the control side only
/// locks it in [`stop`](Self::stop), after both streams are gone.
pub struct DuplexDriver {
    _input: Option<Stream>,
    output: Stream,
    callback: Arc<Mutex<dyn AudioIoCallback>>,
}

impl DuplexDriver {
    /// Builds and starts the streams. `about_to_start` is delivered with the
    /// negotiated configuration before the first callback.
    pub fn start(
        input: Option<(&Device, &StreamConfig)>,
        output: (&Device, &StreamConfig),
        callback: impl AudioIoCallback + 'static,
        handle: &Handle,
    ) -> Result<Self, DeviceError> {
        let (output_device, output_config) = output;
        let num_outputs = output_config.channels as usize;
        let num_inputs = input.map(|(_, config)| config.channels as usize).unwrap_or(0);

        let block_size = match output_config.buffer_size {
            BufferSize::Fixed(frames) => (frames as usize).min(MAX_BLOCK_SIZE),
            BufferSize::Default => MAX_BLOCK_SIZE,
        };

        let config = DeviceConfig {
            sample_rate: output_config.sample_rate.0 as f64,
            block_size,
            num_input_channels: num_inputs,
            num_output_channels: num_outputs,
        };

        let callback: Arc<Mutex<dyn AudioIoCallback>> = Arc::new(Mutex::new(callback));
        callback.lock().unwrap().about_to_start(config);

        // Capture side: push raw interleaved samples into the ring buffer
        let (input_stream, mut consumer) = match input {
            Some((device, input_config)) => {
                let capacity = (num_inputs * MAX_BLOCK_SIZE * 4).max(1);
                let (mut producer, consumer) = ringbuf::RingBuffer::new(capacity).split(handle);
                let stream = device.build_input_stream(
                    input_config,
                    move |data: &[f32], _| {
                        producer.push_slice(data);
                    },
                    |err| log::error!("input stream error: {err}"),
                    None,
                )?;
                (Some(stream), Some(consumer))
            }
            None => (None, None),
        };

        // Render side: everything the callback touches is allocated here,
        // before streaming starts
        let cb = Arc::clone(&callback);
        let mut raw_input = vec![0.0f32; num_inputs * MAX_BLOCK_SIZE];
        let mut input_channels = vec![vec![0.0f32; MAX_BLOCK_SIZE]; num_inputs];
        let mut output_channels = vec![vec![0.0f32; MAX_BLOCK_SIZE]; num_outputs];
        let mut arena = Bump::new();
        let _ = arena.alloc_slice_fill_copy(4 * (num_inputs + num_outputs).max(1), 0usize);
        arena.reset();

        let output_stream = output_device.build_output_stream(
            output_config,
            move |data: &mut [f32], _| {
                let Ok(mut callback) = cb.lock() else {
                    data.fill(0.0);
                    return;
                };
                if num_outputs == 0 {
                    data.fill(0.0);
                    return;
                }

                // Devices may hand over more than one block's worth at once
                for chunk in data.chunks_mut(MAX_BLOCK_SIZE * num_outputs) {
                    let frames = chunk.len() / num_outputs;
                    if frames == 0 {
                        chunk.fill(0.0);
                        continue;
                    }

                    arena.reset();

                    // Pop what the capture side has; underflow degrades to silence
                    let needed = frames * num_inputs;
                    let read = consumer
                        .as_mut()
                        .map(|c| c.pop_slice(&mut raw_input[..needed]))
                        .unwrap_or(0);
                    raw_input[read..needed].fill(0.0);
                    {
                        let channels = arena.alloc_slice_fill_iter(
                            input_channels.iter_mut().map(|ch| &mut ch[..frames]),
                        );
                        deinterleave(&raw_input[..needed], channels);
                    }

                    let inputs =
                        arena.alloc_slice_fill_iter(input_channels.iter().map(|ch| &ch[..frames]));
                    {
                        let outputs = arena.alloc_slice_fill_iter(
                            output_channels.iter_mut().map(|ch| &mut ch[..frames]),
                        );
                        callback.io_callback(inputs, outputs, frames);
                    }

                    let rendered =
                        arena.alloc_slice_fill_iter(output_channels.iter().map(|ch| &ch[..frames]));
                    interleave(rendered, &mut chunk[..frames * num_outputs]);
                    chunk[frames * num_outputs..].fill(0.0);
                }
            },
            |err| log::error!("output stream error: {err}"),
            None,
        )?;

        if let Some(stream) = &input_stream {
            stream.play()?;
        }
        output_stream.play()?;

        Ok(Self {
            _input: input_stream,
            output: output_stream,
            callback,
        })
    }

    /// Tears the streams down, then delivers the `stopped` notification.
    /// cpal guarantees no callback runs once its stream is dropped.
    pub fn stop(self) {
        let Self {
            _input,
            output,
            callback,
        } = self;
        drop(output);
        drop(_input);
        if let Ok(mut callback) = callback.lock() {
            callback.stopped();
        };
    }
}
