//! Volume level from raw audio chunks, for the waveform/level display.

pub const INT16_MAX: f64 = 32767.0;

/// RMS level of `chunk` (int16 little-endian) normalized to `[0.0, 1.0]`.
///
/// Returns 0.0 for empty or too-short input; never fails. A trailing odd
/// byte is ignored.
pub fn chunk_rms_level(chunk: &[u8]) -> f32 {
    if chunk.len() < 2 {
        return 0.0;
    }
    let n = chunk.len() / 2;
    let total: f64 = chunk
        .chunks_exact(2)
        .map(|b| {
            let s = i16::from_le_bytes([b[0], b[1]]) as f64;
            s * s
        })
        .sum();
    let rms = (total / n as f64).sqrt();
    (rms / INT16_MAX).min(1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn empty_and_short_input_is_zero() {
        assert_eq!(chunk_rms_level(&[]), 0.0);
        assert_eq!(chunk_rms_level(&[0x01]), 0.0);
    }

    #[test]
    fn silence_is_zero() {
        let chunk = samples_to_bytes(&[0; 1024]);
        assert_eq!(chunk_rms_level(&chunk), 0.0);
    }

    #[test]
    fn full_scale_is_one() {
        let chunk = samples_to_bytes(&[32767, -32767, 32767, -32767]);
        let level = chunk_rms_level(&chunk);
        assert!((level - 1.0).abs() < 1e-6);
    }

    #[test]
    fn negative_full_scale_clamps_to_one() {
        let chunk = samples_to_bytes(&[-32768; 8]);
        assert_eq!(chunk_rms_level(&chunk), 1.0);
    }

    #[test]
    fn level_is_always_in_unit_range() {
        for seed in 0..64u32 {
            let samples: Vec<i16> = (0..257)
                .map(|i| ((seed.wrapping_mul(2654435761).wrapping_add(i * 7919)) % 65536) as i32)
                .map(|v| (v - 32768) as i16)
                .collect();
            let level = chunk_rms_level(&samples_to_bytes(&samples));
            assert!((0.0..=1.0).contains(&level), "level {level} out of range");
        }
    }

    #[test]
    fn odd_trailing_byte_is_ignored() {
        let mut chunk = samples_to_bytes(&[1000, 1000]);
        let even = chunk_rms_level(&chunk);
        chunk.push(0xFF);
        assert_eq!(chunk_rms_level(&chunk), even);
    }
}
