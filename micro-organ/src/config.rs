use crate::error::{OrganError, Result};
use crate::range_tracker::TrackerConfig;

// --- Range tracker defaults ---
pub const TRACKER_DECAY_PER_MILLE: f32 = 995.0;
pub const TRACKER_SUSTAIN_MS: u64 = 3000; // hold before an extremum starts to relax
pub const TRACKER_SPILL_RATIO: f32 = 0.0;
pub const TRACKER_SPILL_FLOOR: f32 = 0.0;
pub const TRACKER_SCALE_MIN: bool = false;

// --- Light organ (one row of lights) ---
pub const ORGAN_CHANNELS: usize = 32;
pub const ORGAN_MAX_FREQ_HZ: f32 = 2500.0;
pub const ORGAN_SPAN_RATIO: f32 = 2.0; // last band is twice as wide as the first
pub const ORGAN_BIN_EXPONENT: u32 = 2;
pub const ORGAN_DECAY_PER_MILLE: f32 = 997.0;
pub const ORGAN_SPILL_RATIO: f32 = 0.05;
pub const ORGAN_SPILL_FLOOR: f32 = 1.0; // neighbors count in full

// --- Stage organ (channels × stages grid) ---
pub const STAGE_ORGAN_CHANNELS: usize = 32;
pub const STAGE_ORGAN_STAGES: usize = 6;
pub const STAGE_ORGAN_MAX_FREQ_HZ: f32 = 2500.0;
pub const STAGE_ORGAN_SPAN_RATIO: f32 = 2.0;
pub const STAGE_ORGAN_BIN_EXPONENT: u32 = 1;
pub const STAGE_SUSTAIN_MS: u64 = 20;
pub const STAGE_DECAY_PER_MILLE: f32 = 960.0;
pub const STAGE_SPILL_RATIO: f32 = 0.3;

// --- VU meter ---
pub const VU_LIGHTS: usize = 32;
pub const VU_AVG_WINDOW: usize = 1;
pub const VU_AVG_SCALE_PER_MILLE: f32 = 995.0;
pub const VU_BRIGHTNESS_RANGE: f32 = 1.0;
pub const VU_SCALE_MIN: bool = true;
pub const VU_DECAY_PER_MILLE: f32 = 997.0;
pub const VU_SUSTAIN_MS: u64 = 3000;
pub const VU_BIN_EXPONENT: u32 = 2;

// --- Spectrum transform ---
pub const TRANSFORM_BUFFER_SIZE: usize = 5;

// --- Limits ---
pub const MAX_CHANNELS: usize = 256;
pub const MAX_STAGES: usize = 16;
pub const MAX_LIGHTS: usize = 256;
pub const MAX_AVG_WINDOW: usize = 50;
pub const MAX_TRANSFORM_BUFFER: usize = 50;

/// How samples in the VU averaging window are weighted by age.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "logging", derive(defmt::Format))]
pub enum WindowWeighting {
    /// The sample of age `i` weighs `(ratio_per_mille / 1000)^i`.
    Geometric { ratio_per_mille: f32 },
    /// The sample of age `i` weighs `window - i`.
    Linear,
}

impl Default for WindowWeighting {
    fn default() -> Self {
        WindowWeighting::Geometric {
            ratio_per_mille: VU_AVG_SCALE_PER_MILLE,
        }
    }
}

impl WindowWeighting {
    pub fn validate(&self) -> Result<()> {
        match *self {
            WindowWeighting::Geometric { ratio_per_mille }
                if !(ratio_per_mille > 0.0 && ratio_per_mille <= 1000.0) =>
            {
                Err(OrganError::InvalidConfig(
                    "window ratio must be within (0, 1000] per mille",
                ))
            }
            _ => Ok(()),
        }
    }
}

fn check_range(value: usize, max: usize, what: &'static str) -> Result<()> {
    if value == 0 || value > max {
        Err(OrganError::InvalidConfig(what))
    } else {
        Ok(())
    }
}

fn check_bands(max_freq: f32, span_ratio: f32) -> Result<()> {
    if !(max_freq > 0.0) || !max_freq.is_finite() {
        return Err(OrganError::InvalidConfig("max frequency must be positive"));
    }
    if !(span_ratio > 0.0) || !span_ratio.is_finite() {
        return Err(OrganError::InvalidConfig("span ratio must be positive"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "logging", derive(defmt::Format))]
pub struct OrganConfig {
    pub channel_count: usize,
    pub max_freq: f32,
    pub span_ratio: f32,
    pub bin_exponent: u32,
    pub tracker: TrackerConfig,
}

impl Default for OrganConfig {
    fn default() -> Self {
        Self {
            channel_count: ORGAN_CHANNELS,
            max_freq: ORGAN_MAX_FREQ_HZ,
            span_ratio: ORGAN_SPAN_RATIO,
            bin_exponent: ORGAN_BIN_EXPONENT,
            tracker: TrackerConfig::default()
                .with_continuous_decay()
                .with_decay_per_mille(ORGAN_DECAY_PER_MILLE)
                .with_spill(ORGAN_SPILL_RATIO, ORGAN_SPILL_FLOOR),
        }
    }
}

impl OrganConfig {
    pub fn with_channel_count(mut self, channel_count: usize) -> Self {
        self.channel_count = channel_count;
        self
    }

    pub fn with_max_freq(mut self, max_freq: f32) -> Self {
        self.max_freq = max_freq;
        self
    }

    pub fn with_span_ratio(mut self, span_ratio: f32) -> Self {
        self.span_ratio = span_ratio;
        self
    }

    pub fn with_bin_exponent(mut self, bin_exponent: u32) -> Self {
        self.bin_exponent = bin_exponent;
        self
    }

    pub fn with_tracker(mut self, tracker: TrackerConfig) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_range(self.channel_count, MAX_CHANNELS, "channel count out of range")?;
        check_bands(self.max_freq, self.span_ratio)?;
        self.tracker.validate()
    }

    /// Whether moving from `self` to `other` needs a new band layout.
    pub(crate) fn layout_differs(&self, other: &Self) -> bool {
        self.channel_count != other.channel_count
            || self.max_freq != other.max_freq
            || self.span_ratio != other.span_ratio
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "logging", derive(defmt::Format))]
pub struct StageOrganConfig {
    pub channel_count: usize,
    pub stage_count: usize,
    pub max_freq: f32,
    pub span_ratio: f32,
    pub bin_exponent: u32,
    /// Tracker settings every stage starts with.
    pub stage_tracker: TrackerConfig,
}

impl Default for StageOrganConfig {
    fn default() -> Self {
        Self {
            channel_count: STAGE_ORGAN_CHANNELS,
            stage_count: STAGE_ORGAN_STAGES,
            max_freq: STAGE_ORGAN_MAX_FREQ_HZ,
            span_ratio: STAGE_ORGAN_SPAN_RATIO,
            bin_exponent: STAGE_ORGAN_BIN_EXPONENT,
            stage_tracker: TrackerConfig::default()
                .with_sustain(STAGE_SUSTAIN_MS)
                .with_decay_per_mille(STAGE_DECAY_PER_MILLE)
                .with_spill(STAGE_SPILL_RATIO, 0.0),
        }
    }
}

impl StageOrganConfig {
    pub fn with_channel_count(mut self, channel_count: usize) -> Self {
        self.channel_count = channel_count;
        self
    }

    pub fn with_stage_count(mut self, stage_count: usize) -> Self {
        self.stage_count = stage_count;
        self
    }

    pub fn with_max_freq(mut self, max_freq: f32) -> Self {
        self.max_freq = max_freq;
        self
    }

    pub fn with_span_ratio(mut self, span_ratio: f32) -> Self {
        self.span_ratio = span_ratio;
        self
    }

    pub fn with_bin_exponent(mut self, bin_exponent: u32) -> Self {
        self.bin_exponent = bin_exponent;
        self
    }

    pub fn with_stage_tracker(mut self, stage_tracker: TrackerConfig) -> Self {
        self.stage_tracker = stage_tracker;
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_range(self.channel_count, MAX_CHANNELS, "channel count out of range")?;
        check_range(self.stage_count, MAX_STAGES, "stage count out of range")?;
        check_bands(self.max_freq, self.span_ratio)?;
        self.stage_tracker.validate()
    }

    /// Whether moving from `self` to `other` needs a new band layout.
    pub(crate) fn layout_differs(&self, other: &Self) -> bool {
        self.channel_count != other.channel_count
            || self.max_freq != other.max_freq
            || self.span_ratio != other.span_ratio
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "logging", derive(defmt::Format))]
pub struct MeterConfig {
    pub light_count: usize,
    pub bin_exponent: u32,
    /// Number of recent frames averaged; 1 uses the instantaneous energy.
    pub window: usize,
    pub weighting: WindowWeighting,
    /// 0 lights every lit LED at full brightness, 1 dims them with the level.
    pub brightness_range: f32,
    pub tracker: TrackerConfig,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            light_count: VU_LIGHTS,
            bin_exponent: VU_BIN_EXPONENT,
            window: VU_AVG_WINDOW,
            weighting: WindowWeighting::default(),
            brightness_range: VU_BRIGHTNESS_RANGE,
            tracker: TrackerConfig::default()
                .with_independent_sustain(VU_SUSTAIN_MS)
                .with_decay_per_mille(VU_DECAY_PER_MILLE)
                .with_scale_min(VU_SCALE_MIN),
        }
    }
}

impl MeterConfig {
    pub fn with_light_count(mut self, light_count: usize) -> Self {
        self.light_count = light_count;
        self
    }

    pub fn with_bin_exponent(mut self, bin_exponent: u32) -> Self {
        self.bin_exponent = bin_exponent;
        self
    }

    pub fn with_window(mut self, window: usize, weighting: WindowWeighting) -> Self {
        self.window = window;
        self.weighting = weighting;
        self
    }

    pub fn with_brightness_range(mut self, brightness_range: f32) -> Self {
        self.brightness_range = brightness_range;
        self
    }

    pub fn with_tracker(mut self, tracker: TrackerConfig) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_range(self.light_count, MAX_LIGHTS, "light count out of range")?;
        check_range(self.window, MAX_AVG_WINDOW, "averaging window out of range")?;
        if !(0.0..=1.0).contains(&self.brightness_range) {
            return Err(OrganError::InvalidConfig("brightness range must be within 0..1"));
        }
        self.weighting.validate()?;
        self.tracker.validate()
    }
}
