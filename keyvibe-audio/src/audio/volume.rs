//! Integer PCM volume scaling

/// Volume percentage (0-100) as a multiplier
pub fn volume_fraction(volume: u8) -> f32 {
    f32::from(volume.min(100)) / 100.0
}

/// Scale samples in place by `fraction`, truncating toward zero.
pub fn scale_samples(samples: &mut [i16], fraction: f32) {
    if fraction >= 1.0 {
        return;
    }
    for sample in samples.iter_mut() {
        *sample = (f32::from(*sample) * fraction) as i16;
    }
}
