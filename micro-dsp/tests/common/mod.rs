#![allow(dead_code)]

use wavegen::{sine, wf};

pub const SAMPLE_RATE: f32 = 8192.0;
pub const FFT_SIZE: usize = 1024;

/// Bin width is `SAMPLE_RATE / FFT_SIZE` = 8 Hz, so 1000 Hz lands on bin 125.
pub const TONE_HZ: f32 = 1000.0;
pub const TONE_BIN: usize = 125;

/// `n` samples of a sine at `frequency`, scaled to `amplitude` of full scale.
pub fn sine_i16(frequency: f32, amplitude: f32, n: usize) -> Vec<i16> {
    let waveform = wf!(f32, SAMPLE_RATE, sine!(frequency: frequency));
    waveform
        .iter()
        .take(n)
        .map(|s| (s * amplitude * i16::MAX as f32) as i16)
        .collect()
}

pub fn sine_f32(frequency: f32, amplitude: f32, n: usize) -> Vec<f32> {
    let waveform = wf!(f32, SAMPLE_RATE, sine!(frequency: frequency));
    waveform.iter().take(n).map(|s| s * amplitude).collect()
}

pub fn peak_bin(spectrum: &[f32]) -> usize {
    spectrum
        .iter()
        .enumerate()
        .fold((0, f32::MIN), |(best, max), (i, &v)| {
            if v > max {
                (i, v)
            } else {
                (best, max)
            }
        })
        .0
}
