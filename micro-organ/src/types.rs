use alloc::vec::Vec;

use crate::error::{OrganError, Result};

/// Sampling context of the spectrum stream: how many bins each frame carries
/// and the audio sample rate they were computed at.
///
/// Created once by whoever owns the analysis source and handed by value to every
/// component that needs it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "logging", derive(defmt::Format))]
pub struct SamplingParameters {
    pub bin_count: usize,
    pub sample_rate: f32,
}

impl SamplingParameters {
    pub fn new(bin_count: usize, sample_rate: f32) -> Result<Self> {
        if bin_count == 0 {
            return Err(OrganError::InvalidConfig("bin count must be greater than 0"));
        }
        if !(sample_rate > 0.0) {
            return Err(OrganError::InvalidConfig("sample rate must be positive"));
        }
        Ok(Self {
            bin_count,
            sample_rate,
        })
    }

    /// Highest representable frequency.
    pub fn nyquist(&self) -> f32 {
        self.sample_rate / 2.0
    }

    /// Width of one spectrum bin in Hz.
    pub fn bin_width_hz(&self) -> f32 {
        self.nyquist() / self.bin_count as f32
    }
}

/// Map a byte spectrum (0..=255 per bin) onto 0..1.
pub fn normalize_byte_spectrum(bytes: &[u8]) -> Vec<f32> {
    bytes.iter().map(|&b| b as f32 / 255.0).collect()
}

/// One frame of VU meter output.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "logging", derive(defmt::Format))]
pub struct MeterReading {
    pub level: f32,              // averaged energy scaled into 0..1, drives the lights
    pub instantaneous_level: f32, // instantaneous energy scaled by its own tracker
    pub energy: f32,             // raw instantaneous energy
    pub averaged_energy: f32,    // raw windowed energy
    pub max: f32,                // tracked max of the averaged energy
    pub min: f32,                // tracked min of the averaged energy
}

/// Stage × channel grid produced by the stage organ once its buffer is warm.
/// Row 0 is the newest frame alone, row k the product of the k + 1 newest frames.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StageGrid {
    pub rows: Vec<Vec<f32>>,
}

impl StageGrid {
    pub fn stage_count(&self) -> usize {
        self.rows.len()
    }

    pub fn stage(&self, stage: usize) -> Option<&[f32]> {
        self.rows.get(stage).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_sampling_parameters() {
        let params = SamplingParameters::new(1024, 44100.0).unwrap();
        assert_abs_diff_eq!(params.nyquist(), 22050.0);
        assert_abs_diff_eq!(params.bin_width_hz(), 21.533203, epsilon = 1e-4);
    }

    #[test]
    fn test_normalize_byte_spectrum() {
        let spectrum = normalize_byte_spectrum(&[0, 51, 255]);
        assert_eq!(spectrum[0], 0.0);
        assert_abs_diff_eq!(spectrum[1], 0.2, epsilon = 1e-6);
        assert_eq!(spectrum[2], 1.0);
    }

    #[test]
    fn test_stage_grid_access() {
        let grid = StageGrid {
            rows: alloc::vec![alloc::vec![1.0, 0.5], alloc::vec![0.25, 0.0]],
        };
        assert_eq!(grid.stage_count(), 2);
        assert_eq!(grid.stage(1), Some(&[0.25, 0.0][..]));
        assert_eq!(grid.stage(2), None);
    }

    #[test]
    fn test_sampling_parameters_rejects_degenerate_values() {
        assert!(matches!(
            SamplingParameters::new(0, 44100.0),
            Err(OrganError::InvalidConfig(_))
        ));
        assert!(matches!(
            SamplingParameters::new(512, 0.0),
            Err(OrganError::InvalidConfig(_))
        ));
        assert!(matches!(
            SamplingParameters::new(512, f32::NAN),
            Err(OrganError::InvalidConfig(_))
        ));
    }
}
