use voxloop_core::DecodeError;

/// Bytes per PCM16 sample on the wire.
pub const SAMPLE_WIDTH: usize = 2;

// ── DecodedBuffer ─────────────────────────────────────────────

/// A block of decoded mono samples tagged with its sample rate, so the
/// scheduler can compute duration from the exact sample count.
#[derive(Debug, Clone)]
pub struct DecodedBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedBuffer {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

// ── Conversions ───────────────────────────────────────────────

/// Convert one capture frame of f32 samples to PCM16LE bytes.
/// Samples are clamped to [-1.0, 1.0] before conversion so clipped input
/// cannot wrap around, then rounded to the nearest integer step.
pub fn encode_frame(samples: &[f32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * SAMPLE_WIDTH);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        data.extend_from_slice(&value.to_le_bytes());
    }
    data
}

/// Interpret PCM16LE bytes as a mono sample buffer at `sample_rate`.
pub fn decode_chunk(data: &[u8], sample_rate: u32) -> Result<DecodedBuffer, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }
    if data.len() % SAMPLE_WIDTH != 0 {
        return Err(DecodeError::Unaligned(data.len()));
    }

    let samples = data
        .chunks_exact(SAMPLE_WIDTH)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();

    Ok(DecodedBuffer {
        samples,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Group A: encoding ───────────────────────────────────────

    #[test]
    fn test_encode_zero_samples_are_zero_bytes() {
        let data = encode_frame(&[0.0; 8]);
        assert_eq!(data.len(), 16);
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_encode_full_scale_values() {
        let data = encode_frame(&[1.0, -1.0]);
        assert_eq!(&data[..2], &32767i16.to_le_bytes());
        assert_eq!(&data[2..], &(-32767i16).to_le_bytes());
    }

    #[test]
    fn test_encode_clamps_out_of_range_input() {
        // Clipped input must saturate, not wrap around
        let data = encode_frame(&[2.0, -3.5]);
        assert_eq!(&data[..2], &32767i16.to_le_bytes());
        assert_eq!(&data[2..], &(-32767i16).to_le_bytes());
    }

    #[test]
    fn test_encode_rounds_to_nearest() {
        // 0.5 * 32767 = 16383.5, which truncation would turn into 16383
        let data = encode_frame(&[0.5]);
        assert_eq!(data, 16384i16.to_le_bytes());
    }

    #[test]
    fn test_encode_is_little_endian() {
        // 0x0100 = 256; LE puts the low byte first
        let data = encode_frame(&[256.0 / 32767.0]);
        assert_eq!(data, vec![0x00, 0x01]);
    }

    // ── Group B: decoding ───────────────────────────────────────

    #[test]
    fn test_decode_empty_payload_fails() {
        match decode_chunk(&[], 24000) {
            Err(DecodeError::Empty) => {}
            other => panic!("expected Empty, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_odd_length_payload_fails() {
        match decode_chunk(&[1, 2, 3], 24000) {
            Err(DecodeError::Unaligned(3)) => {}
            other => panic!("expected Unaligned(3), got {:?}", other),
        }
    }

    #[test]
    fn test_decode_known_values() {
        // 16384 → 0.5, -16384 → -0.5
        let mut data = Vec::new();
        data.extend_from_slice(&16384i16.to_le_bytes());
        data.extend_from_slice(&(-16384i16).to_le_bytes());

        let buffer = decode_chunk(&data, 24000).unwrap();
        assert_eq!(buffer.samples, vec![0.5, -0.5]);
        assert_eq!(buffer.sample_rate, 24000);
    }

    #[test]
    fn test_decode_tags_exact_sample_count() {
        let data = vec![0u8; 480];
        let buffer = decode_chunk(&data, 24000).unwrap();
        assert_eq!(buffer.samples.len(), 240);
    }

    // ── Group C: round trips and duration ───────────────────────

    #[test]
    fn test_zero_frame_round_trip() {
        let frame = vec![0.0f32; 4096];
        let encoded = encode_frame(&frame);
        let decoded = decode_chunk(&encoded, 16000).unwrap();
        assert_eq!(decoded.samples.len(), 4096);
        assert!(decoded.samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_sine_round_trip_within_quantization_step() {
        let frame: Vec<f32> = (0..512)
            .map(|i| (i as f32 * 0.05 * std::f32::consts::TAU).sin() * 0.8)
            .collect();
        let decoded = decode_chunk(&encode_frame(&frame), 16000).unwrap();
        for (a, b) in decoded.samples.iter().zip(frame.iter()) {
            assert!((a - b).abs() < 1.0 / 32768.0, "expected {}, got {}", b, a);
        }
    }

    #[test]
    fn test_duration_from_sample_count() {
        let buffer = DecodedBuffer {
            samples: vec![0.0; 24000],
            sample_rate: 24000,
        };
        assert_eq!(buffer.duration_seconds(), 1.0);

        let half = DecodedBuffer {
            samples: vec![0.0; 12000],
            sample_rate: 24000,
        };
        assert_eq!(half.duration_seconds(), 0.5);
    }
}
