use alloc::vec::Vec;

#[cfg(feature = "logging")]
use defmt::debug;

use crate::config::{
    TRACKER_DECAY_PER_MILLE, TRACKER_SCALE_MIN, TRACKER_SPILL_FLOOR, TRACKER_SPILL_RATIO,
    TRACKER_SUSTAIN_MS,
};
use crate::error::{expect_len, OrganError, Result};

/// When the tracked extrema are allowed to relax toward the current signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "logging", derive(defmt::Format))]
pub enum DecayMode {
    /// Decay on every frame.
    Continuous,
    /// Hold an extremum for `hold_ms` after it was last set, then decay.
    /// With `linked` set, a new max also restarts the min's hold and vice versa.
    Sustain { hold_ms: u64, linked: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "logging", derive(defmt::Format))]
pub struct TrackerConfig {
    /// Fraction of the range kept per decay step, in thousandths (995 = 0.995).
    pub decay_per_mille: f32,
    pub mode: DecayMode,
    /// Neighbor window as a fraction of the channel count.
    pub spill_ratio: f32,
    /// Weight of the neighbor at the edge of the spill window (the nearest one has 1.0).
    pub spill_floor: f32,
    /// Normalize `(v - min) / (max - min)` instead of `v / max`.
    pub scale_min: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            decay_per_mille: TRACKER_DECAY_PER_MILLE,
            mode: DecayMode::Sustain {
                hold_ms: TRACKER_SUSTAIN_MS,
                linked: true,
            },
            spill_ratio: TRACKER_SPILL_RATIO,
            spill_floor: TRACKER_SPILL_FLOOR,
            scale_min: TRACKER_SCALE_MIN,
        }
    }
}

impl TrackerConfig {
    pub fn with_decay_per_mille(mut self, decay_per_mille: f32) -> Self {
        self.decay_per_mille = decay_per_mille;
        self
    }

    pub fn with_continuous_decay(mut self) -> Self {
        self.mode = DecayMode::Continuous;
        self
    }

    pub fn with_sustain(mut self, hold_ms: u64) -> Self {
        self.mode = DecayMode::Sustain {
            hold_ms,
            linked: true,
        };
        self
    }

    pub fn with_independent_sustain(mut self, hold_ms: u64) -> Self {
        self.mode = DecayMode::Sustain {
            hold_ms,
            linked: false,
        };
        self
    }

    pub fn with_spill(mut self, spill_ratio: f32, spill_floor: f32) -> Self {
        self.spill_ratio = spill_ratio;
        self.spill_floor = spill_floor;
        self
    }

    pub fn with_scale_min(mut self, scale_min: bool) -> Self {
        self.scale_min = scale_min;
        self
    }

    /// Decay must lie in (0, 1000] per mille, spill ratio and floor in 0..1.
    pub fn validate(&self) -> Result<()> {
        if !(self.decay_per_mille > 0.0 && self.decay_per_mille <= 1000.0) {
            return Err(OrganError::InvalidConfig("decay must be within (0, 1000] per mille"));
        }
        if !(0.0..=1.0).contains(&self.spill_ratio) {
            return Err(OrganError::InvalidConfig("spill ratio must be within 0..1"));
        }
        if !(0.0..=1.0).contains(&self.spill_floor) {
            return Err(OrganError::InvalidConfig("spill floor must be within 0..1"));
        }
        Ok(())
    }

    fn decay_factor(&self) -> f32 {
        self.decay_per_mille / 1000.0
    }

    /// Neighbors considered on each side; 0 disables spill.
    pub fn spill_window(&self, channel_count: usize) -> usize {
        let cs = libm::roundf(self.spill_ratio * channel_count as f32);
        if cs > 0.0 {
            cs as usize
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ChannelRange {
    max: f32,
    min: f32,
    max_set_at: u64,
    min_set_at: u64,
}

impl ChannelRange {
    fn seed(value: f32, now_ms: u64) -> Self {
        Self {
            max: value,
            min: value,
            max_set_at: now_ms,
            min_set_at: now_ms,
        }
    }

    fn decay(&mut self, config: &TrackerConfig, now_ms: u64) {
        let r = config.decay_factor();
        let (decay_max, decay_min) = match config.mode {
            DecayMode::Continuous => (true, true),
            DecayMode::Sustain { hold_ms, linked } => {
                // linked holds end on the deadline, independent ones just after it
                let expired = |set_at: u64| {
                    let elapsed = now_ms.saturating_sub(set_at);
                    if linked {
                        elapsed >= hold_ms
                    } else {
                        elapsed > hold_ms
                    }
                };
                (expired(self.max_set_at), expired(self.min_set_at))
            }
        };
        if decay_max {
            self.max *= r;
        }
        if decay_min {
            self.min = 1.0 - (1.0 - self.min) * r;
        }
    }

    fn observe(&mut self, value: f32, now_ms: u64, linked: bool) {
        let mut touched = false;
        if value < self.min {
            self.min = value;
            self.min_set_at = now_ms;
            touched = true;
        }
        if value > self.max {
            self.max = value;
            self.max_set_at = now_ms;
            touched = true;
        }
        if linked && touched {
            self.min_set_at = now_ms;
            self.max_set_at = now_ms;
        }
    }
}

fn normalize(value: f32, min: f32, max: f32, scale_min: bool) -> f32 {
    let (base, span) = if scale_min {
        (value - min, max - min)
    } else {
        (value, max)
    };
    // Silence or a collapsed range is a defined 0, never NaN or infinity.
    if !(span > 0.0) {
        return 0.0;
    }
    (base / span).clamp(0.0, 1.0)
}

/// Per-channel adaptive auto-range.
///
/// Every channel remembers a running max and min that relax toward the signal over
/// time; each input value is reported relative to that range, optionally widened by
/// the ranges of neighboring channels (spill).
#[derive(Debug, Clone, PartialEq)]
pub struct RangeTracker {
    config: TrackerConfig,
    channel_count: usize,
    ranges: Vec<ChannelRange>, // empty until the first frame seeds it
}

impl RangeTracker {
    /// A tracker without channels; [`scale`](Self::scale) fails until
    /// [`set_channel_count`](Self::set_channel_count) is called.
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_channels(0, config)
    }

    pub fn with_channels(channel_count: usize, config: TrackerConfig) -> Self {
        Self {
            config,
            channel_count,
            ranges: Vec::with_capacity(channel_count),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Scalar parameters apply from the next frame on; tracked ranges are kept.
    pub fn reconfigure(&mut self, config: TrackerConfig) {
        self.config = config;
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn set_channel_count(&mut self, channel_count: usize) {
        #[cfg(feature = "logging")]
        debug!(
            "range tracker: {} -> {} channels",
            self.channel_count, channel_count
        );
        self.clear();
        self.channel_count = channel_count;
    }

    /// Forget every tracked range; the next frame seeds them again.
    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    pub fn is_seeded(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Tracked `(min, max)` of one channel, before spill.
    pub fn extrema(&self, channel: usize) -> Option<(f32, f32)> {
        self.ranges.get(channel).map(|r| (r.min, r.max))
    }

    pub fn scale(&mut self, input: &[f32], now_ms: u64) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(self.channel_count);
        self.scale_into(input, now_ms, &mut out)?;
        Ok(out)
    }

    /// Update the ranges with one frame and write the normalized values into `out`.
    pub fn scale_into(&mut self, input: &[f32], now_ms: u64, out: &mut Vec<f32>) -> Result<()> {
        if self.channel_count == 0 {
            return Err(OrganError::IllegalState("range tracker has no channels"));
        }
        expect_len(self.channel_count, input.len())?;

        if self.ranges.is_empty() {
            self.ranges
                .extend(input.iter().map(|&v| ChannelRange::seed(v, now_ms)));
        }

        let linked = matches!(self.config.mode, DecayMode::Sustain { linked: true, .. });
        for (range, &value) in self.ranges.iter_mut().zip(input) {
            range.decay(&self.config, now_ms);
            range.observe(value, now_ms, linked);
        }

        let n = self.channel_count;
        let cs = self.config.spill_window(n);
        let floor = self.config.spill_floor;

        out.clear();
        for (i, &value) in input.iter().enumerate() {
            let mut min = self.ranges[i].min;
            let mut max = self.ranges[i].max;

            if cs > 0 {
                let lo = i.saturating_sub(cs);
                let hi = (i + cs).min(n - 1);
                for (ii, neighbor) in self.ranges.iter().enumerate().take(hi + 1).skip(lo) {
                    let f = 1.0 - (1.0 - floor) * i.abs_diff(ii) as f32 / cs as f32;
                    let spilled_min = 1.0 - f * (1.0 - neighbor.min);
                    let spilled_max = neighbor.max * f;
                    if spilled_min < min {
                        min = spilled_min;
                    }
                    if spilled_max > max {
                        max = spilled_max;
                    }
                }
            }

            out.push(normalize(value, min, max, self.config.scale_min));
        }
        Ok(())
    }
}
