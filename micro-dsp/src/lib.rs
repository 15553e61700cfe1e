#![no_std]
//! PCM frames in, normalized magnitude spectra out.
//!
//! Frames are windowed, transformed with a real FFT and mapped onto a byte
//! decibel scale the way browser audio analysers report spectra, then divided
//! by 255.

extern crate alloc;

use alloc::{vec, vec::Vec};
use microdsp::common::{apply_window_function, WindowFunctionType::Hann};
use microfft::Complex32;
use micromath::F32Ext;
use thiserror::Error;

pub const MIN_FFT_SIZE: usize = 64;
pub const MAX_FFT_SIZE: usize = 4096;
pub const DEFAULT_FFT_SIZE: usize = 4096;
pub const DEFAULT_SAMPLE_RATE: f32 = 44100.0;
pub const DEFAULT_MIN_DECIBELS: f32 = -100.0;
pub const DEFAULT_MAX_DECIBELS: f32 = -30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DspError {
    #[error("unsupported FFT size {0}, expected a power of two in 64..=4096")]
    UnsupportedFftSize(usize),

    #[error("expected {expected} samples, got {actual}")]
    SampleCountMismatch { expected: usize, actual: usize },

    #[error("decibel range must be finite and increasing")]
    InvalidDecibelRange,
}

pub type Result<T> = core::result::Result<T, DspError>;

/// Normalize a single sample from i16 to f32.
pub fn normalize_sample(sample: i16) -> f32 {
    sample as f32 / i16::MAX as f32
}

/// Normalize a slice of i16 samples into `normalized_samples`.
pub fn normalize_samples(samples: &[i16], normalized_samples: &mut [f32]) {
    for (out, &sample) in normalized_samples.iter_mut().zip(samples) {
        *out = normalize_sample(sample);
    }
}

/// Apply a Hann window to a slice of f32 samples.
pub fn apply_hann_window(samples: &mut [f32]) {
    apply_window_function(Hann, samples);
}

pub fn is_supported_fft_size(fft_size: usize) -> bool {
    fft_size.is_power_of_two() && (MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft_size)
}

macro_rules! rfft_sized {
    ($samples:ident, $($n:literal => $f:ident),+ $(,)?) => {
        match $samples.len() {
            $($n => {
                let buf: &mut [f32; $n] = $samples
                    .try_into()
                    .map_err(|_| DspError::UnsupportedFftSize($n))?;
                Ok(microfft::real::$f(buf).as_mut_slice())
            })+
            n => Err(DspError::UnsupportedFftSize(n)),
        }
    };
}

/// In-place real FFT of `samples`; returns `samples.len() / 2` bins.
///
/// The Nyquist term is packed into the imaginary part of bin 0.
pub fn compute_fft(samples: &mut [f32]) -> Result<&mut [Complex32]> {
    rfft_sized!(
        samples,
        64 => rfft_64,
        128 => rfft_128,
        256 => rfft_256,
        512 => rfft_512,
        1024 => rfft_1024,
        2048 => rfft_2048,
        4096 => rfft_4096,
    )
}

/// Magnitudes `|X[k]| / fft_size` of the FFT output.
pub fn compute_magnitude(fft_output: &[Complex32], magnitude: &mut [f32]) -> Result<()> {
    if magnitude.len() != fft_output.len() {
        return Err(DspError::SampleCountMismatch {
            expected: fft_output.len(),
            actual: magnitude.len(),
        });
    }
    let scale = 1.0 / (2 * fft_output.len()) as f32;
    for (k, (out, c)) in magnitude.iter_mut().zip(fft_output).enumerate() {
        // bin 0 carries the Nyquist term in `im`
        let power = if k == 0 {
            c.re * c.re
        } else {
            c.re * c.re + c.im * c.im
        };
        *out = F32Ext::sqrt(power) * scale;
    }
    Ok(())
}

/// Map a linear magnitude onto 0..=255 between `min_db` and `max_db`.
pub fn magnitude_to_byte(magnitude: f32, min_db: f32, max_db: f32) -> u8 {
    if !(magnitude > 0.0) {
        return 0;
    }
    let db = 20.0 * F32Ext::log10(magnitude);
    let scaled = 255.0 * (db - min_db) / (max_db - min_db);
    scaled.clamp(0.0, 255.0) as u8
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerConfig {
    pub fft_size: usize,
    pub sample_rate: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            sample_rate: DEFAULT_SAMPLE_RATE,
            min_decibels: DEFAULT_MIN_DECIBELS,
            max_decibels: DEFAULT_MAX_DECIBELS,
        }
    }
}

impl AnalyzerConfig {
    pub fn with_fft_size(mut self, fft_size: usize) -> Self {
        self.fft_size = fft_size;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: f32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_decibel_range(mut self, min_decibels: f32, max_decibels: f32) -> Self {
        self.min_decibels = min_decibels;
        self.max_decibels = max_decibels;
        self
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn validate(&self) -> Result<()> {
        if !is_supported_fft_size(self.fft_size) {
            return Err(DspError::UnsupportedFftSize(self.fft_size));
        }
        if !self.min_decibels.is_finite()
            || !self.max_decibels.is_finite()
            || self.min_decibels >= self.max_decibels
        {
            return Err(DspError::InvalidDecibelRange);
        }
        Ok(())
    }
}

/// Turns PCM frames of `fft_size` samples into `fft_size / 2` bin spectra.
#[derive(Debug, Clone)]
pub struct SpectrumAnalyzer {
    config: AnalyzerConfig,
    samples: Vec<f32>,
    magnitudes: Vec<f32>,
    bytes: Vec<u8>,
    normalized: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        config.validate()?;
        let bins = config.bin_count();
        Ok(Self {
            config,
            samples: vec![0.0; config.fft_size],
            magnitudes: vec![0.0; bins],
            bytes: vec![0; bins],
            normalized: vec![0.0; bins],
        })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Changing the FFT size changes the bin count; every buffer is reallocated.
    pub fn reconfigure(&mut self, config: AnalyzerConfig) -> Result<()> {
        *self = Self::new(config)?;
        Ok(())
    }

    pub fn bin_count(&self) -> usize {
        self.config.bin_count()
    }

    pub fn sample_rate(&self) -> f32 {
        self.config.sample_rate
    }

    /// Process one frame and return its normalized spectrum.
    pub fn process_frame(&mut self, frame: &[i16]) -> Result<&[f32]> {
        if frame.len() != self.config.fft_size {
            return Err(DspError::SampleCountMismatch {
                expected: self.config.fft_size,
                actual: frame.len(),
            });
        }

        normalize_samples(frame, &mut self.samples);
        apply_hann_window(&mut self.samples);
        let fft_output = compute_fft(&mut self.samples)?;
        compute_magnitude(fft_output, &mut self.magnitudes)?;

        let (min_db, max_db) = (self.config.min_decibels, self.config.max_decibels);
        for ((byte, norm), &mag) in self
            .bytes
            .iter_mut()
            .zip(self.normalized.iter_mut())
            .zip(&self.magnitudes)
        {
            *byte = magnitude_to_byte(mag, min_db, max_db);
            *norm = *byte as f32 / 255.0;
        }
        Ok(&self.normalized)
    }

    /// Byte spectrum of the last processed frame.
    pub fn byte_spectrum(&self) -> &[u8] {
        &self.bytes
    }

    /// Linear magnitudes of the last processed frame.
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    pub fn normalized_spectrum(&self) -> &[f32] {
        &self.normalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_compute_magnitude() {
        let mut fft_output = [Complex32 { re: 0.0, im: 0.0 }; 512];

        fft_output[0] = Complex32 { re: 1024.0, im: 512.0 }; // DC, Nyquist packed in im
        fft_output[1] = Complex32 { re: 0.0, im: 1024.0 };
        fft_output[511] = Complex32 { re: -1024.0, im: 0.0 };

        let mut magnitude = [0.0; 512];
        compute_magnitude(&fft_output, &mut magnitude).unwrap();

        assert_abs_diff_eq!(magnitude[0], 1.0, epsilon = 1e-2);
        assert_abs_diff_eq!(magnitude[1], 1.0, epsilon = 1e-2);
        assert_abs_diff_eq!(magnitude[511], 1.0, epsilon = 1e-2);
        assert_abs_diff_eq!(magnitude[2], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_compute_magnitude_length() {
        let fft_output = [Complex32 { re: 0.0, im: 0.0 }; 32];
        let mut magnitude = [0.0; 16];
        assert_eq!(
            compute_magnitude(&fft_output, &mut magnitude),
            Err(DspError::SampleCountMismatch {
                expected: 32,
                actual: 16
            })
        );
    }

    #[test]
    fn test_fft_sizes() {
        let mut samples = [0.0f32; 256];
        assert_eq!(compute_fft(&mut samples).unwrap().len(), 128);
        let mut odd = [0.0f32; 100];
        assert_eq!(compute_fft(&mut odd).err(), Some(DspError::UnsupportedFftSize(100)));
        assert!(is_supported_fft_size(64));
        assert!(!is_supported_fft_size(32));
        assert!(!is_supported_fft_size(8192));
    }

    #[test]
    fn test_magnitude_to_byte() {
        assert_eq!(magnitude_to_byte(0.0, -100.0, -30.0), 0);
        assert_eq!(magnitude_to_byte(1.0, -100.0, -30.0), 255);
        // -65 dB sits halfway
        let mid = magnitude_to_byte(5.623413e-4, -100.0, -30.0);
        assert!((124..=131).contains(&mid), "{}", mid);
        assert_eq!(magnitude_to_byte(1e-6, -100.0, -30.0), 0);
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(AnalyzerConfig::default().validate(), Ok(()));
        assert_eq!(AnalyzerConfig::default().bin_count(), 2048);
        assert_eq!(
            AnalyzerConfig::default().with_fft_size(1000).validate(),
            Err(DspError::UnsupportedFftSize(1000))
        );
        assert_eq!(
            AnalyzerConfig::default()
                .with_decibel_range(-30.0, -100.0)
                .validate(),
            Err(DspError::InvalidDecibelRange)
        );
    }

    #[test]
    fn test_silence() {
        let mut analyzer = SpectrumAnalyzer::new(AnalyzerConfig::default().with_fft_size(256)).unwrap();
        let spectrum = analyzer.process_frame(&[0; 256]).unwrap();
        assert_eq!(spectrum.len(), 128);
        assert!(spectrum.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_frame_length() {
        let mut analyzer = SpectrumAnalyzer::new(AnalyzerConfig::default().with_fft_size(256)).unwrap();
        assert_eq!(
            analyzer.process_frame(&[0; 128]).err(),
            Some(DspError::SampleCountMismatch {
                expected: 256,
                actual: 128
            })
        );
    }
}
