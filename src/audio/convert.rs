//! Sample format helpers shared by capture, playback and the backends.

/// Convert signed 16-bit PCM to normalized f32.
pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|s| f32::from(*s) / 32_768.0).collect()
}

pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32_767.0).round() as i16
}

/// Multiply every sample by `gain`, saturating at the i16 range.
pub fn apply_gain(samples: &[i16], gain: f32) -> Vec<i16> {
    if (gain - 1.0).abs() < f32::EPSILON {
        return samples.to_vec();
    }
    samples
        .iter()
        .map(|s| (f32::from(*s) * gain).clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16)
        .collect()
}

/// Scale playback by a 0-100 volume percentage.
pub fn scale_volume(samples: &[i16], volume: u8) -> Vec<i16> {
    apply_gain(samples, f32::from(volume.min(100)) / 100.0)
}

/// Average interleaved frames down to mono.
pub fn downmix<T: Copy>(data: &[T], channels: usize, convert: impl Fn(T) -> f32) -> Vec<f32> {
    let channels = channels.max(1);
    data.chunks(channels)
        .map(|frame| frame.iter().map(|s| convert(*s)).sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Linear resampler; fine for speech where latency matters more than phase accuracy.
pub fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || input.is_empty() {
        return input.to_vec();
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let output_len = (input.len() as f64 * ratio).round() as usize;
    let mut output = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let src_idx = i as f64 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = (src_idx - idx as f64) as f32;
        if idx + 1 < input.len() {
            output.push(input[idx] * (1.0 - frac) + input[idx + 1] * frac);
        } else {
            output.push(input.last().copied().unwrap_or(0.0));
        }
    }
    output
}
