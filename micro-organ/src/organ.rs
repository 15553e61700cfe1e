use alloc::vec::Vec;
use core::any::Any;

#[cfg(feature = "logging")]
use defmt::{debug, info};

use crate::band_allocator::BandLayout;
use crate::band_energy::BandEnergyReducer;
use crate::config::{OrganConfig, StageOrganConfig};
use crate::error::{OrganError, Result};
use crate::hub::{LevelSink, SpectrumClient};
use crate::range_tracker::{RangeTracker, TrackerConfig};
use crate::temporal_persistence::TemporalPersistence;
use crate::types::{normalize_byte_spectrum, SamplingParameters, StageGrid};

fn allocate(
    params: SamplingParameters,
    channel_count: usize,
    max_freq: f32,
    span_ratio: f32,
) -> Result<BandLayout> {
    BandLayout::allocate(
        params.sample_rate,
        params.bin_count,
        max_freq,
        channel_count,
        span_ratio,
    )
}

/// One row of lights: band energies auto-ranged per channel.
#[derive(Debug, Clone)]
pub struct LightOrgan {
    config: OrganConfig,
    reducer: BandEnergyReducer,
    params: Option<SamplingParameters>,
    layout: Option<BandLayout>,
    tracker: RangeTracker,
    energies: Vec<f32>,
    levels: Vec<f32>,
}

impl LightOrgan {
    pub fn new(config: OrganConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            reducer: BandEnergyReducer::new(config.bin_exponent),
            params: None,
            layout: None,
            tracker: RangeTracker::new(config.tracker),
            energies: Vec::with_capacity(config.channel_count),
            levels: Vec::with_capacity(config.channel_count),
        })
    }

    pub fn config(&self) -> &OrganConfig {
        &self.config
    }

    pub fn layout(&self) -> Option<&BandLayout> {
        self.layout.as_ref()
    }

    pub fn tracker(&self) -> &RangeTracker {
        &self.tracker
    }

    /// Levels of the last accepted frame.
    pub fn levels(&self) -> &[f32] {
        &self.levels
    }

    fn relayout(&mut self, params: SamplingParameters) -> Result<&BandLayout> {
        let layout = allocate(
            params,
            self.config.channel_count,
            self.config.max_freq,
            self.config.span_ratio,
        )?;
        #[cfg(feature = "logging")]
        info!("light organ: band sizes {}", layout.sizes());

        self.tracker.set_channel_count(layout.channel_count());
        self.levels.clear();
        self.params = Some(params);
        Ok(self.layout.insert(layout))
    }

    pub fn change_sampling_parameters(&mut self, params: SamplingParameters) -> Result<&BandLayout> {
        self.relayout(params)
    }

    /// Apply a new configuration. Returns the new layout when the band structure
    /// had to be recomputed.
    pub fn reconfigure(&mut self, config: OrganConfig) -> Result<Option<&BandLayout>> {
        config.validate()?;
        #[cfg(feature = "logging")]
        debug!("light organ reconfigured: {}", config);

        let previous = core::mem::replace(&mut self.config, config);
        self.tracker.reconfigure(config.tracker);
        if config.bin_exponent != previous.bin_exponent {
            self.reducer = BandEnergyReducer::new(config.bin_exponent);
            self.tracker.clear();
        }
        match self.params {
            Some(params) if previous.layout_differs(&config) => self.relayout(params).map(Some),
            _ => Ok(None),
        }
    }

    /// [`reconfigure`](Self::reconfigure), announcing a recomputed layout to `sink`.
    pub fn reconfigure_with_sink(
        &mut self,
        config: OrganConfig,
        sink: &mut dyn LevelSink,
    ) -> Result<()> {
        if let Some(layout) = self.reconfigure(config)? {
            sink.band_layout_changed(layout.sizes());
        }
        Ok(())
    }

    pub fn push_frame(&mut self, spectrum: &[f32], now_ms: u64) -> Result<&[f32]> {
        let layout = self
            .layout
            .as_ref()
            .ok_or(OrganError::IllegalState("sampling parameters not set"))?;
        layout.group_with(spectrum, &self.reducer, &mut self.energies)?;
        self.tracker
            .scale_into(&self.energies, now_ms, &mut self.levels)?;
        Ok(&self.levels)
    }

    pub fn push_byte_frame(&mut self, spectrum: &[u8], now_ms: u64) -> Result<&[f32]> {
        let normalized = normalize_byte_spectrum(spectrum);
        self.push_frame(&normalized, now_ms)
    }
}

impl SpectrumClient for LightOrgan {
    fn change_sampling_parameters(
        &mut self,
        params: SamplingParameters,
        sink: &mut dyn LevelSink,
    ) -> Result<()> {
        let layout = self.relayout(params)?;
        sink.band_layout_changed(layout.sizes());
        Ok(())
    }

    fn push_frame(&mut self, spectrum: &[f32], now_ms: u64, sink: &mut dyn LevelSink) -> Result<()> {
        let levels = LightOrgan::push_frame(self, spectrum, now_ms)?;
        sink.channel_levels(levels);
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Channels × stages grid: band energies persisted over the recent frames.
#[derive(Debug, Clone)]
pub struct StageOrgan {
    config: StageOrganConfig,
    reducer: BandEnergyReducer,
    params: Option<SamplingParameters>,
    layout: Option<BandLayout>,
    persistence: TemporalPersistence,
    energies: Vec<f32>,
}

impl StageOrgan {
    pub fn new(config: StageOrganConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            reducer: BandEnergyReducer::new(config.bin_exponent),
            params: None,
            layout: None,
            persistence: TemporalPersistence::new(
                config.channel_count,
                config.stage_count,
                config.stage_tracker,
            )?,
            energies: Vec::with_capacity(config.channel_count),
        })
    }

    pub fn config(&self) -> &StageOrganConfig {
        &self.config
    }

    pub fn layout(&self) -> Option<&BandLayout> {
        self.layout.as_ref()
    }

    pub fn persistence(&self) -> &TemporalPersistence {
        &self.persistence
    }

    /// Tune the tracker of a single stage.
    pub fn set_stage_config(&mut self, stage: usize, config: TrackerConfig) -> Result<()> {
        self.persistence.set_stage_config(stage, config)
    }

    fn relayout(&mut self, params: SamplingParameters) -> Result<&BandLayout> {
        let layout = allocate(
            params,
            self.config.channel_count,
            self.config.max_freq,
            self.config.span_ratio,
        )?;
        #[cfg(feature = "logging")]
        info!("stage organ: band sizes {}", layout.sizes());

        self.persistence.set_channel_count(layout.channel_count())?;
        self.params = Some(params);
        Ok(self.layout.insert(layout))
    }

    pub fn change_sampling_parameters(&mut self, params: SamplingParameters) -> Result<&BandLayout> {
        self.relayout(params)
    }

    /// Apply a new configuration. Returns the new layout when the band structure
    /// had to be recomputed.
    pub fn reconfigure(&mut self, config: StageOrganConfig) -> Result<Option<&BandLayout>> {
        config.validate()?;
        #[cfg(feature = "logging")]
        debug!("stage organ reconfigured: {}", config);

        let previous = core::mem::replace(&mut self.config, config);
        if config.stage_tracker != previous.stage_tracker {
            self.persistence.set_default_config(config.stage_tracker);
        }
        if config.stage_count != previous.stage_count {
            self.persistence.set_stage_count(config.stage_count)?;
        }
        if config.bin_exponent != previous.bin_exponent {
            self.reducer = BandEnergyReducer::new(config.bin_exponent);
            self.persistence.reset();
        }

        match self.params {
            Some(params) if previous.layout_differs(&config) => self.relayout(params).map(Some),
            None if config.channel_count != previous.channel_count => {
                self.persistence.set_channel_count(config.channel_count)?;
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// [`reconfigure`](Self::reconfigure), announcing a recomputed layout to `sink`.
    pub fn reconfigure_with_sink(
        &mut self,
        config: StageOrganConfig,
        sink: &mut dyn LevelSink,
    ) -> Result<()> {
        if let Some(layout) = self.reconfigure(config)? {
            sink.band_layout_changed(layout.sizes());
        }
        Ok(())
    }

    /// Returns the stage grid once the persistence buffer is warm.
    pub fn push_frame(&mut self, spectrum: &[f32], now_ms: u64) -> Result<Option<StageGrid>> {
        let layout = self
            .layout
            .as_ref()
            .ok_or(OrganError::IllegalState("sampling parameters not set"))?;
        layout.group_with(spectrum, &self.reducer, &mut self.energies)?;
        self.persistence.push(&self.energies, now_ms)
    }

    pub fn push_byte_frame(&mut self, spectrum: &[u8], now_ms: u64) -> Result<Option<StageGrid>> {
        let normalized = normalize_byte_spectrum(spectrum);
        self.push_frame(&normalized, now_ms)
    }
}

impl SpectrumClient for StageOrgan {
    fn change_sampling_parameters(
        &mut self,
        params: SamplingParameters,
        sink: &mut dyn LevelSink,
    ) -> Result<()> {
        let layout = self.relayout(params)?;
        sink.band_layout_changed(layout.sizes());
        Ok(())
    }

    fn push_frame(&mut self, spectrum: &[f32], now_ms: u64, sink: &mut dyn LevelSink) -> Result<()> {
        if let Some(grid) = StageOrgan::push_frame(self, spectrum, now_ms)? {
            for (stage, row) in grid.rows.iter().enumerate() {
                sink.stage_levels(stage, row);
            }
        }
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
