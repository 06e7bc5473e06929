//! Embedded sound data.
//!
//! Short sounds generated at runtime so the players can be exercised without
//! any audio files on disk.

/// Names accepted by [`embedded_sound`].
pub const EMBEDDED_SOUND_NAMES: &[&str] = &["silence", "tick"];

const SAMPLE_RATE: u32 = 44_100;

/// Returns the WAV bytes of the embedded sound called `name`.
#[must_use]
pub fn embedded_sound(name: &str) -> Option<Vec<u8>> {
    match name {
        "silence" => Some(wav(&vec![0; SAMPLE_RATE as usize])),
        "tick" => Some(wav(&tick_samples())),
        _ => None,
    }
}

/// A 50ms 880Hz beep followed by 450ms of silence.
fn tick_samples() -> Vec<i16> {
    let total = (SAMPLE_RATE / 2) as usize;
    let beep = (SAMPLE_RATE / 20) as usize;
    (0..total)
        .map(|i| {
            if i >= beep {
                return 0;
            }
            let t = i as f32 / SAMPLE_RATE as f32;
            let envelope = 1.0 - i as f32 / beep as f32;
            ((t * 880.0 * std::f32::consts::TAU).sin() * envelope * 8_000.0) as i16
        })
        .collect()
}

/// Encodes mono 16-bit PCM samples as a WAV file.
fn wav(samples: &[i16]) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    // RIFF header
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    // fmt chunk: PCM, mono, 16-bit
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    out.extend_from_slice(&(SAMPLE_RATE * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    // data chunk
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}
