/// Interleaves per-channel buffers into a single frame-major signal.
pub fn interleave(channels: &[&[f32]], output: &mut [f32]) {
    let num_channels = channels.len();
    for (ch, samples) in channels.iter().enumerate() {
        for (i, &sample) in samples.iter().enumerate() {
            output[i * num_channels + ch] = sample;
        }
    }
}

/// Splits an interleaved signal into per-channel buffers.
pub fn deinterleave(input: &[f32], channels: &mut [&mut [f32]]) {
    let num_channels = channels.len();
    if num_channels == 0 {
        return;
    }
    for (i, frame) in input.chunks_exact(num_channels).enumerate() {
        for (ch, &sample) in frame.iter().enumerate() {
            channels[ch][i] = sample;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_interleave() {
        let left = [1.0, 2.0];
        let right = [-1.0, -2.0];
        let mut output = [0.0; 4];
        interleave(&[&left, &right], &mut output);
        assert_eq!(output, [1.0, -1.0, 2.0, -2.0]);
    }

    #[test]
    fn test_deinterleave() {
        let input = [1.0, -1.0, 2.0, -2.0];
        let mut left = [0.0; 2];
        let mut right = [0.0; 2];
        deinterleave(&input, &mut [&mut left, &mut right]);
        assert_eq!(left, [1.0, 2.0]);
        assert_eq!(right, [-1.0, -2.0]);
    }
}
