use alloc::{vec, vec::Vec};

#[cfg(feature = "logging")]
use defmt::debug;

use crate::error::{expect_len, OrganError, Result};
use crate::range_tracker::{RangeTracker, TrackerConfig};
use crate::recent_buffer::RecentBuffer;
use crate::types::StageGrid;

/// Multiplicative persistence over the most recent band-energy frames.
///
/// Stage `k` is the bin-wise product of the `k + 1` newest frames, normalized by a
/// tracker of its own. Bands that stay loud survive into the deeper stages while
/// short bursts only light the first ones.
#[derive(Debug, Clone)]
pub struct TemporalPersistence {
    channel_count: usize,
    stage_count: usize,
    default_config: TrackerConfig,
    frames: RecentBuffer<Vec<f32>>,
    trackers: Vec<RangeTracker>,
    product: Vec<f32>,
}

impl TemporalPersistence {
    pub fn new(channel_count: usize, stage_count: usize, stage_config: TrackerConfig) -> Result<Self> {
        if channel_count == 0 {
            return Err(OrganError::InvalidConfig("channel count must be greater than 0"));
        }
        if stage_count == 0 {
            return Err(OrganError::InvalidConfig("stage count must be greater than 0"));
        }
        stage_config.validate()?;
        Ok(Self {
            channel_count,
            stage_count,
            default_config: stage_config,
            frames: RecentBuffer::with_capacity(stage_count),
            trackers: (0..stage_count)
                .map(|_| RangeTracker::with_channels(channel_count, stage_config))
                .collect(),
            product: vec![1.0; channel_count],
        })
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn stage_count(&self) -> usize {
        self.stage_count
    }

    /// Frames currently buffered; output starts once this reaches the stage count.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_warm(&self) -> bool {
        self.depth() == self.stage_count
    }

    pub fn stage_config(&self, stage: usize) -> Option<&TrackerConfig> {
        self.trackers.get(stage).map(RangeTracker::config)
    }

    pub fn tracker(&self, stage: usize) -> Option<&RangeTracker> {
        self.trackers.get(stage)
    }

    /// Push one frame of raw band energies.
    ///
    /// Trackers of the stages already covered by the buffer are updated on every
    /// frame; the grid is only returned once all stages are covered.
    pub fn push(&mut self, energies: &[f32], now_ms: u64) -> Result<Option<StageGrid>> {
        expect_len(self.channel_count, energies.len())?;

        self.frames.push(energies.to_vec());

        self.product.clear();
        self.product.resize(self.channel_count, 1.0);

        let mut rows = Vec::with_capacity(self.stage_count);
        for (frame, tracker) in self.frames.iter().zip(self.trackers.iter_mut()) {
            for (p, &e) in self.product.iter_mut().zip(frame) {
                *p *= e;
            }
            rows.push(tracker.scale(&self.product, now_ms)?);
        }

        if rows.len() == self.stage_count {
            Ok(Some(StageGrid { rows }))
        } else {
            Ok(None)
        }
    }

    pub fn set_channel_count(&mut self, channel_count: usize) -> Result<()> {
        if channel_count == 0 {
            return Err(OrganError::InvalidConfig("channel count must be greater than 0"));
        }
        #[cfg(feature = "logging")]
        debug!("persistence: {} -> {} channels", self.channel_count, channel_count);

        self.channel_count = channel_count;
        self.frames.clear();
        for tracker in self.trackers.iter_mut() {
            tracker.set_channel_count(channel_count);
        }
        Ok(())
    }

    /// Resize the stage stack. Surviving stages keep their tracker settings, new
    /// stages start from the default one; every stage loses its tracked ranges.
    pub fn set_stage_count(&mut self, stage_count: usize) -> Result<()> {
        if stage_count == 0 {
            return Err(OrganError::InvalidConfig("stage count must be greater than 0"));
        }
        #[cfg(feature = "logging")]
        debug!("persistence: {} -> {} stages", self.stage_count, stage_count);

        self.stage_count = stage_count;
        self.frames.set_capacity(stage_count);
        self.trackers.truncate(stage_count);
        while self.trackers.len() < stage_count {
            self.trackers
                .push(RangeTracker::with_channels(self.channel_count, self.default_config));
        }
        self.reset();
        Ok(())
    }

    /// Scalar tracker settings of one stage; they apply from the next frame on.
    pub fn set_stage_config(&mut self, stage: usize, config: TrackerConfig) -> Result<()> {
        config.validate()?;
        let tracker = self
            .trackers
            .get_mut(stage)
            .ok_or(OrganError::InvalidConfig("stage index out of range"))?;
        tracker.reconfigure(config);
        Ok(())
    }

    /// Apply `config` to every stage and use it for stages added later.
    pub fn set_default_config(&mut self, config: TrackerConfig) {
        self.default_config = config;
        for tracker in self.trackers.iter_mut() {
            tracker.reconfigure(config);
        }
    }

    pub fn reset(&mut self) {
        self.frames.clear();
        for tracker in self.trackers.iter_mut() {
            tracker.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn steady() -> TrackerConfig {
        TrackerConfig::default()
            .with_continuous_decay()
            .with_decay_per_mille(1000.0)
    }

    #[test]
    fn test_output_suppressed_during_warm_up() {
        let mut persistence = TemporalPersistence::new(2, 3, steady()).unwrap();

        assert_eq!(persistence.push(&[0.5, 1.0], 0).unwrap(), None);
        assert_eq!(persistence.depth(), 1);
        assert!(persistence.tracker(0).unwrap().is_seeded());
        assert!(!persistence.tracker(1).unwrap().is_seeded());

        assert_eq!(persistence.push(&[0.5, 1.0], 16).unwrap(), None);
        assert!(persistence.tracker(1).unwrap().is_seeded());
        assert!(!persistence.tracker(2).unwrap().is_seeded());

        let grid = persistence.push(&[0.5, 1.0], 32).unwrap().unwrap();
        assert_eq!(grid.stage_count(), 3);
        assert!(persistence.is_warm());

        // once warm every frame produces a grid
        assert!(persistence.push(&[0.5, 1.0], 48).unwrap().is_some());
        assert_eq!(persistence.depth(), 3);
    }

    #[test]
    fn test_stages_multiply_recent_frames() {
        let mut persistence = TemporalPersistence::new(1, 3, steady()).unwrap();
        persistence.push(&[0.5], 0).unwrap();
        persistence.push(&[0.25], 1).unwrap();
        persistence.push(&[0.8], 2).unwrap();

        // newest first: 0.8, 0.8 * 0.25, 0.8 * 0.25 * 0.5
        let expected = [0.8, 0.2, 0.1];
        for (stage, &e) in expected.iter().enumerate() {
            let (min, max) = persistence.tracker(stage).unwrap().extrema(0).unwrap();
            assert_abs_diff_eq!(max, e, epsilon = 1e-6);
            assert!(min <= max);
        }
    }

    #[test]
    fn test_each_stage_has_its_own_tracker() {
        let mut persistence = TemporalPersistence::new(1, 2, steady()).unwrap();
        persistence
            .set_stage_config(1, steady().with_scale_min(true))
            .unwrap();
        persistence.push(&[0.5], 0).unwrap();
        let grid = persistence.push(&[0.5], 1).unwrap().unwrap();

        // stage 0 keeps v / max, stage 1 collapses to an empty range
        assert_abs_diff_eq!(grid.rows[0][0], 1.0);
        assert_abs_diff_eq!(grid.rows[1][0], 0.0);
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let mut persistence = TemporalPersistence::new(2, 2, steady()).unwrap();
        persistence.push(&[0.5, 0.5], 0).unwrap();
        assert_eq!(
            persistence.push(&[0.5], 1),
            Err(OrganError::SizeMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(persistence.depth(), 1);
    }

    #[test]
    fn test_reconfiguration_clears_state() {
        let mut persistence = TemporalPersistence::new(2, 2, steady()).unwrap();
        persistence.push(&[0.5, 0.5], 0).unwrap();
        persistence.push(&[0.5, 0.5], 1).unwrap();

        persistence.set_stage_count(4).unwrap();
        assert_eq!(persistence.depth(), 0);
        assert_eq!(persistence.stage_count(), 4);
        assert!((0..4).all(|s| !persistence.tracker(s).unwrap().is_seeded()));

        persistence.push(&[0.5, 0.5], 2).unwrap();
        persistence.set_channel_count(3).unwrap();
        assert_eq!(persistence.depth(), 0);
        assert_eq!(persistence.tracker(3).unwrap().channel_count(), 3);
        assert!(persistence.push(&[0.5, 0.5, 0.5], 3).is_ok());
    }

    #[test]
    fn test_stage_settings_survive_resize() {
        let mut persistence = TemporalPersistence::new(1, 2, steady()).unwrap();
        let custom = steady().with_spill(0.3, 0.0);
        persistence.set_stage_config(1, custom).unwrap();
        persistence.set_stage_count(3).unwrap();
        assert_eq!(persistence.stage_config(1), Some(&custom));
        assert_eq!(persistence.stage_config(2), Some(&steady()));
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(TemporalPersistence::new(0, 2, steady()).is_err());
        assert!(TemporalPersistence::new(2, 0, steady()).is_err());
        let mut persistence = TemporalPersistence::new(2, 2, steady()).unwrap();
        assert!(matches!(
            persistence.set_stage_config(2, steady()),
            Err(OrganError::InvalidConfig(_))
        ));
        assert!(persistence.set_stage_count(0).is_err());

        let runaway = steady().with_decay_per_mille(1500.0);
        assert!(TemporalPersistence::new(2, 2, runaway).is_err());
        assert!(persistence.set_stage_config(0, runaway).is_err());
        assert_eq!(persistence.stage_config(0), Some(&steady()));
    }
}
