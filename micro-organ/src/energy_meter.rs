use alloc::vec::Vec;
use core::any::Any;

#[cfg(feature = "logging")]
use defmt::{debug, info};

use crate::band_energy::BandEnergyReducer;
use crate::config::{MeterConfig, WindowWeighting};
use crate::error::{expect_len, OrganError, Result};
use crate::hub::{LevelSink, SpectrumClient};
use crate::range_tracker::RangeTracker;
use crate::recent_buffer::RecentBuffer;
use crate::types::{MeterReading, SamplingParameters};

/// Spread a normalized level over `count` lights.
///
/// Lights fill in order; the last lit one carries the fractional remainder. With a
/// `brightness_range` above 0 every lit light is additionally dimmed toward the
/// level itself.
pub fn fill_lights(level: f32, count: usize, brightness_range: f32) -> Vec<f32> {
    let level = level.clamp(0.0, 1.0);
    let brightness = brightness_range * level + 1.0 - brightness_range;
    let mut remaining = count as f32 * level;
    (0..count)
        .map(|_| {
            let v = remaining.clamp(0.0, 1.0);
            remaining -= v;
            v * brightness
        })
        .collect()
}

/// Output of one meter frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeterFrame {
    pub reading: MeterReading,
    pub lights: Vec<f32>,
}

/// Whole-spectrum energy meter (VU).
///
/// The instantaneous energy of each frame is averaged over a short window and
/// auto-ranged by a single-channel tracker; a second tracker follows the
/// instantaneous energy alone.
#[derive(Debug, Clone)]
pub struct EnergyMeter {
    config: MeterConfig,
    reducer: BandEnergyReducer,
    params: Option<SamplingParameters>,
    window: RecentBuffer<f32>,
    averaged: RangeTracker,
    instantaneous: RangeTracker,
}

impl EnergyMeter {
    pub fn new(config: MeterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            reducer: BandEnergyReducer::new(config.bin_exponent),
            params: None,
            window: RecentBuffer::with_capacity(config.window),
            averaged: RangeTracker::with_channels(1, config.tracker),
            instantaneous: RangeTracker::with_channels(1, config.tracker),
        })
    }

    pub fn config(&self) -> &MeterConfig {
        &self.config
    }

    pub fn parameters(&self) -> Option<SamplingParameters> {
        self.params
    }

    /// Tracked `(min, max)` of the averaged energy.
    pub fn extrema(&self) -> Option<(f32, f32)> {
        self.averaged.extrema(0)
    }

    pub fn change_sampling_parameters(&mut self, params: SamplingParameters) {
        #[cfg(feature = "logging")]
        info!(
            "vu meter: {} bins @ {} Hz",
            params.bin_count, params.sample_rate
        );
        self.params = Some(params);
        self.reset();
    }

    pub fn set_light_count(&mut self, light_count: usize) -> Result<()> {
        let config = self.config.with_light_count(light_count);
        config.validate()?;
        self.config = config;
        self.averaged.clear();
        self.instantaneous.clear();
        Ok(())
    }

    /// Apply a new configuration.
    ///
    /// A changed light count or bin exponent resets the tracked ranges; a changed
    /// window keeps the newest samples that still fit.
    pub fn reconfigure(&mut self, config: MeterConfig) -> Result<()> {
        config.validate()?;
        #[cfg(feature = "logging")]
        debug!("vu meter reconfigured: {}", config);

        if config.bin_exponent != self.config.bin_exponent {
            self.reducer = BandEnergyReducer::new(config.bin_exponent);
            self.reset();
        } else if config.light_count != self.config.light_count {
            self.averaged.clear();
            self.instantaneous.clear();
        }
        self.window.set_capacity(config.window);
        self.averaged.reconfigure(config.tracker);
        self.instantaneous.reconfigure(config.tracker);
        self.config = config;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.averaged.clear();
        self.instantaneous.clear();
    }

    fn averaged_energy(&self) -> f32 {
        let len = self.window.len();
        let (mut sum, mut weights, mut scale) = (0.0, 0.0, 1.0);
        for (age, &e) in self.window.iter().enumerate() {
            let w = match self.config.weighting {
                WindowWeighting::Geometric { ratio_per_mille } => {
                    let w = scale;
                    scale *= ratio_per_mille / 1000.0;
                    w
                }
                WindowWeighting::Linear => (len - age) as f32,
            };
            sum += e * w;
            weights += w;
        }
        if weights > 0.0 {
            sum / weights
        } else {
            0.0
        }
    }

    pub fn push_frame(&mut self, spectrum: &[f32], now_ms: u64) -> Result<MeterFrame> {
        let params = self
            .params
            .ok_or(OrganError::IllegalState("sampling parameters not set"))?;
        expect_len(params.bin_count, spectrum.len())?;

        let energy = self.reducer.total(spectrum);

        // A grown window is padded with the current sample.
        while self.window.len() + 1 < self.window.capacity() {
            self.window.push(energy);
        }
        self.window.push(energy);
        let averaged_energy = self.averaged_energy();

        let level = scale_one(&mut self.averaged, averaged_energy, now_ms)?;
        let instantaneous_level = scale_one(&mut self.instantaneous, energy, now_ms)?;
        let (min, max) = self.averaged.extrema(0).unwrap_or_default();

        Ok(MeterFrame {
            reading: MeterReading {
                level,
                instantaneous_level,
                energy,
                averaged_energy,
                max,
                min,
            },
            lights: fill_lights(level, self.config.light_count, self.config.brightness_range),
        })
    }
}

impl SpectrumClient for EnergyMeter {
    fn change_sampling_parameters(
        &mut self,
        params: SamplingParameters,
        _sink: &mut dyn LevelSink,
    ) -> Result<()> {
        EnergyMeter::change_sampling_parameters(self, params);
        Ok(())
    }

    fn push_frame(&mut self, spectrum: &[f32], now_ms: u64, sink: &mut dyn LevelSink) -> Result<()> {
        let frame = EnergyMeter::push_frame(self, spectrum, now_ms)?;
        sink.meter_level(frame.reading.level, frame.reading.max, frame.reading.min);
        sink.lights(&frame.lights);
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn scale_one(tracker: &mut RangeTracker, value: f32, now_ms: u64) -> Result<f32> {
    Ok(tracker.scale(&[value], now_ms)?.first().copied().unwrap_or(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range_tracker::TrackerConfig;
    use alloc::vec;
    use approx::assert_abs_diff_eq;

    fn meter(config: MeterConfig, bins: usize) -> EnergyMeter {
        let mut meter = EnergyMeter::new(config).unwrap();
        meter.change_sampling_parameters(SamplingParameters::new(bins, 44100.0).unwrap());
        meter
    }

    #[test]
    fn test_fill_half() {
        let lights = fill_lights(0.5, 32, 0.0);
        assert_eq!(lights.iter().filter(|&&v| v == 1.0).count(), 16);
        assert!(lights[16..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_fill_integral_level() {
        let lights = fill_lights(0.5625, 32, 0.0);
        assert!(lights[..18].iter().all(|&v| v == 1.0));
        assert!(lights[18..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_fill_fractional_remainder() {
        let lights = fill_lights(0.3, 4, 0.0);
        assert_abs_diff_eq!(lights[0], 1.0);
        assert_abs_diff_eq!(lights[1], 0.2, epsilon = 1e-6);
        assert_eq!(&lights[2..], &[0.0, 0.0]);
    }

    #[test]
    fn test_fill_brightness_range() {
        assert_eq!(fill_lights(0.5, 4, 1.0), vec![0.5, 0.5, 0.0, 0.0]);
        // half the range: lit lights sit at 0.75
        assert_eq!(fill_lights(0.5, 4, 0.5), vec![0.75, 0.75, 0.0, 0.0]);
        assert_eq!(fill_lights(1.0, 3, 1.0), vec![1.0; 3]);
        assert!(fill_lights(0.0, 8, 0.0).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_requires_sampling_parameters() {
        let mut meter = EnergyMeter::new(MeterConfig::default()).unwrap();
        assert!(matches!(
            meter.push_frame(&[0.5; 8], 0),
            Err(OrganError::IllegalState(_))
        ));
    }

    #[test]
    fn test_size_mismatch() {
        let mut meter = meter(MeterConfig::default(), 8);
        assert_eq!(
            meter.push_frame(&[0.5; 4], 0),
            Err(OrganError::SizeMismatch {
                expected: 8,
                actual: 4
            })
        );
        assert_eq!(meter.extrema(), None);
    }

    #[test]
    fn test_level_follows_range() {
        let config = MeterConfig::default().with_bin_exponent(1);
        let mut meter = meter(config, 4);

        // the first frame only seeds the range
        let first = meter.push_frame(&[0.2; 4], 0).unwrap();
        assert_eq!(first.reading.level, 0.0);

        let loud = meter.push_frame(&[1.0; 4], 10).unwrap();
        assert_abs_diff_eq!(loud.reading.level, 1.0);
        assert!(loud.lights.iter().all(|&v| v == 1.0));

        let mid = meter.push_frame(&[0.6; 4], 20).unwrap();
        assert_abs_diff_eq!(mid.reading.level, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(mid.reading.max, 1.0);
        assert_abs_diff_eq!(mid.reading.min, 0.2, epsilon = 1e-6);
        let lit = mid.lights.iter().filter(|&&v| v > 1e-3).count();
        assert_eq!(lit, 16);
        assert_abs_diff_eq!(mid.lights[0], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_power_energy() {
        let mut meter = meter(MeterConfig::default(), 4);
        let frame = meter.push_frame(&[0.5, 0.5, 1.0, 0.0], 0).unwrap();
        // (0.25 + 0.25 + 1.0 + 0.0) / 4
        assert_abs_diff_eq!(frame.reading.energy, 0.375);
    }

    #[test]
    fn test_geometric_window() {
        let config = MeterConfig::default()
            .with_bin_exponent(1)
            .with_window(3, WindowWeighting::Geometric { ratio_per_mille: 500.0 });
        let mut meter = meter(config, 2);
        meter.push_frame(&[0.0; 2], 0).unwrap();
        let frame = meter.push_frame(&[1.0; 2], 1).unwrap();
        // weights 1, 0.5, 0.25 over [1, 0, 0]
        assert_abs_diff_eq!(frame.reading.averaged_energy, 1.0 / 1.75, epsilon = 1e-6);
        assert_abs_diff_eq!(frame.reading.energy, 1.0);
    }

    #[test]
    fn test_linear_window() {
        let config = MeterConfig::default()
            .with_bin_exponent(1)
            .with_window(3, WindowWeighting::Linear);
        let mut meter = meter(config, 2);
        meter.push_frame(&[0.0; 2], 0).unwrap();
        let frame = meter.push_frame(&[1.0; 2], 1).unwrap();
        // weights 3, 2, 1 over [1, 0, 0]
        assert_abs_diff_eq!(frame.reading.averaged_energy, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_grown_window_is_padded() {
        let config = MeterConfig::default().with_bin_exponent(1);
        let mut meter = meter(config, 2);
        meter.push_frame(&[0.0; 2], 0).unwrap();

        meter
            .reconfigure(config.with_window(3, WindowWeighting::Linear))
            .unwrap();
        let frame = meter.push_frame(&[1.0; 2], 1).unwrap();
        // [1, 1(pad), 0] weighted 3, 2, 1
        assert_abs_diff_eq!(frame.reading.averaged_energy, 5.0 / 6.0, epsilon = 1e-6);
    }

    #[test]
    fn test_light_count_change_resets_range() {
        let mut meter = meter(MeterConfig::default(), 2);
        meter.push_frame(&[0.5; 2], 0).unwrap();
        assert!(meter.extrema().is_some());

        meter.set_light_count(8).unwrap();
        assert_eq!(meter.extrema(), None);
        assert_eq!(meter.push_frame(&[0.5; 2], 1).unwrap().lights.len(), 8);
        assert!(meter.set_light_count(0).is_err());
    }

    #[test]
    fn test_instantaneous_tracker_is_independent() {
        let config = MeterConfig::default()
            .with_bin_exponent(1)
            .with_window(2, WindowWeighting::Linear)
            .with_tracker(
                TrackerConfig::default()
                    .with_independent_sustain(3000)
                    .with_scale_min(true),
            );
        let mut meter = meter(config, 1);
        meter.push_frame(&[0.0], 0).unwrap();
        let frame = meter.push_frame(&[1.0], 1).unwrap();
        // the instantaneous range is 0..1, the averaged one 0..2/3
        assert_abs_diff_eq!(frame.reading.instantaneous_level, 1.0);
        assert_abs_diff_eq!(frame.reading.level, 1.0);
        assert_abs_diff_eq!(frame.reading.max, 2.0 / 3.0, epsilon = 1e-6);
    }
}
