use bumpalo::Bump;

/// Owns the scratch storage that reshapes a device's raw channel slices into
/// the unified channel-major view a processor expects.
///
/// The view always spans `max(inputs, outputs)` channels: input channels are
/// copied in, the remainder is zero-filled, and after processing the first
/// `outputs` channels are copied back out. Storage is sized once by
/// [`resize`](Self::resize); [`adapt`](Self::adapt) runs on the audio thread
/// and never allocates.
pub struct ChannelBufferAdapter {
    scratch: Vec<f32>,
    /// Per-callback arena for the `&mut [&mut [f32]]` view. Reset each block;
    /// its chunk is pre-grown in `resize` so `adapt` never reaches the
    /// allocator.
    arena: Bump,
    max_channels: usize,
    block_size: usize,
    /// Channel count of the most recent view, so `write_back` knows which
    /// output channels were produced.
    view_channels: usize,
}

impl Default for ChannelBufferAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelBufferAdapter {
    pub fn new() -> Self {
        Self {
            scratch: Vec::new(),
            arena: Bump::new(),
            max_channels: 0,
            block_size: 0,
            view_channels: 0,
        }
    }

    /// Allocates scratch storage for up to `max_channels` channels of
    /// `block_size` samples. Control path only; never call from the audio
    /// callback.
    pub fn resize(&mut self, max_channels: usize, block_size: usize) {
        self.max_channels = max_channels;
        self.block_size = block_size;
        self.view_channels = 0;
        self.scratch.clear();
        self.scratch.resize(max_channels * block_size, 0.0);

        self.arena.reset();
        let _ = self.arena.alloc_slice_fill_copy(2 * max_channels.max(1), 0usize);
        self.arena.reset();
    }

    /// Builds the unified channel view for one block: copies each input
    /// channel into scratch, zero-fills the channels past the inputs, and
    /// returns `max(inputs, num_output_channels)` channel slices (clamped to
    /// the configured capacity).
    pub fn adapt(
        &mut self,
        inputs: &[&[f32]],
        num_output_channels: usize,
        num_samples: usize,
    ) -> &mut [&mut [f32]] {
        let num_samples = num_samples.min(self.block_size);
        let total = inputs
            .len()
            .max(num_output_channels)
            .min(self.max_channels);
        self.view_channels = total;

        if total == 0 || self.block_size == 0 {
            return self.arena.alloc_slice_fill_iter(core::iter::empty());
        }

        for (ch, chunk) in self
            .scratch
            .chunks_exact_mut(self.block_size)
            .take(total)
            .enumerate()
        {
            match inputs.get(ch) {
                Some(input) => {
                    let len = num_samples.min(input.len());
                    chunk[..len].copy_from_slice(&input[..len]);
                    chunk[len..num_samples].fill(0.0);
                }
                None => chunk[..num_samples].fill(0.0),
            }
        }

        self.arena.reset();
        let views = self
            .scratch
            .chunks_exact_mut(self.block_size)
            .take(total)
            .map(|chunk| &mut chunk[..num_samples]);
        self.arena.alloc_slice_fill_iter(views)
    }

    /// Copies the processed view back into the device's output slices.
    /// Output channels beyond the view, and samples beyond `num_samples`,
    /// are silenced.
    pub fn write_back(&self, outputs: &mut [&mut [f32]], num_samples: usize) {
        let num_samples = num_samples.min(self.block_size);
        for (ch, output) in outputs.iter_mut().enumerate() {
            if ch < self.view_channels {
                let len = num_samples.min(output.len());
                let start = ch * self.block_size;
                output[..len].copy_from_slice(&self.scratch[start..start + len]);
                output[len..].fill(0.0);
            } else {
                output.fill(0.0);
            }
        }
    }
}
