const FLOOR_DB: f32 = -96.0;

/// RMS of normalized samples (0..1 for full-scale input).
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    energy.sqrt()
}

pub fn rms_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return FLOOR_DB;
    }
    amplitude_to_db(rms(samples))
}

pub fn amplitude_to_db(amplitude: f32) -> f32 {
    (20.0 * amplitude.max(1e-6).log10()).max(FLOOR_DB)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_db_handles_empty() {
        assert_eq!(rms_db(&[]), FLOOR_DB);
    }

    #[test]
    fn full_scale_square_wave_is_zero_db() {
        let samples = [1.0f32, -1.0, 1.0, -1.0];
        assert!((rms(&samples) - 1.0).abs() < 1e-6);
        assert!(rms_db(&samples).abs() < 1e-4);
    }

    #[test]
    fn hundredth_amplitude_is_minus_forty_db() {
        assert!((amplitude_to_db(0.01) + 40.0).abs() < 1e-3);
    }
}
