//! Audio Test Fixtures
//!
//! Programmatically generated 16-bit little-endian mono PCM, so tests need
//! no audio files on disk.

use std::f32::consts::PI;

/// Microphone sample rate
pub const SAMPLE_RATE: u32 = 16000;

/// Duration constants (in samples at 16kHz)
pub const MS_100: usize = 1600;
pub const MS_500: usize = 8000;
pub const SECOND: usize = 16000;

/// Generate silence (zeros)
pub fn generate_silence(duration_samples: usize) -> Vec<i16> {
    vec![0i16; duration_samples]
}

/// Generate silence as raw bytes
pub fn generate_silence_bytes(duration_samples: usize) -> Vec<u8> {
    samples_to_bytes(&generate_silence(duration_samples))
}

/// Generate a sine wave tone
pub fn generate_sine_wave(duration_samples: usize, frequency: f32, amplitude: f32) -> Vec<i16> {
    let max_amplitude = amplitude * i16::MAX as f32;
    let angular_freq = 2.0 * PI * frequency / SAMPLE_RATE as f32;

    (0..duration_samples)
        .map(|i| ((angular_freq * i as f32).sin() * max_amplitude) as i16)
        .collect()
}

/// Generate a sine wave as raw bytes
pub fn generate_sine_wave_bytes(duration_samples: usize, frequency: f32, amplitude: f32) -> Vec<u8> {
    samples_to_bytes(&generate_sine_wave(duration_samples, frequency, amplitude))
}

/// Generate a speech-like pattern (amplitude-modulated tone mix)
pub fn generate_speech_pattern(duration_samples: usize) -> Vec<i16> {
    let syllable_rate = 4.0;
    (0..duration_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            let envelope = (0.5 + 0.5 * (2.0 * PI * syllable_rate * t).sin()).powi(2);
            let tone = 0.6 * (2.0 * PI * 180.0 * t).sin()
                + 0.3 * (2.0 * PI * 720.0 * t).sin()
                + 0.1 * (2.0 * PI * 2400.0 * t).sin();
            (tone * envelope * 0.5 * i16::MAX as f32) as i16
        })
        .collect()
}

pub fn generate_speech_pattern_bytes(duration_samples: usize) -> Vec<u8> {
    samples_to_bytes(&generate_speech_pattern(duration_samples))
}

/// Convert samples to little-endian bytes
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Convert little-endian bytes back to samples
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Split PCM into chunks of `chunk_ms` milliseconds at 16kHz.
pub fn chunk_pcm(pcm: &[u8], chunk_ms: usize) -> Vec<Vec<u8>> {
    let chunk_bytes = SAMPLE_RATE as usize * chunk_ms / 1000 * 2;
    pcm.chunks(chunk_bytes).map(<[u8]>::to_vec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_generation() {
        let bytes = generate_silence_bytes(MS_100);
        assert_eq!(bytes.len(), MS_100 * 2);
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_sine_wave_peaks_near_amplitude() {
        let samples = generate_sine_wave(SECOND, 440.0, 0.5);
        let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap();
        assert!(peak > (i16::MAX as f32 * 0.45) as u16);
        assert!(peak <= (i16::MAX as f32 * 0.5) as u16 + 1);
    }

    #[test]
    fn test_samples_bytes_conversion() {
        let samples = vec![0, 1, -1, i16::MAX, i16::MIN];
        assert_eq!(bytes_to_samples(&samples_to_bytes(&samples)), samples);
    }

    #[test]
    fn test_chunk_pcm_sizes() {
        let pcm = generate_speech_pattern_bytes(MS_500);
        let chunks = chunk_pcm(&pcm, 100);
        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.len() == 3200));
    }
}
