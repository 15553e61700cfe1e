#![no_std]
//! Audio-reactive light organ: turns a stream of magnitude spectra into
//! normalized light levels.
//!
//! Spectrum bins are grouped into geometrically widening bands
//! ([`BandLayout`]), reduced to one energy per band ([`BandEnergyReducer`]) and
//! auto-ranged per channel ([`RangeTracker`]). [`StageOrgan`] adds
//! multiplicative persistence across recent frames and [`EnergyMeter`] turns the
//! whole-spectrum energy into a VU bar. A [`SpectrumHub`] fans frames out to any
//! number of these.

extern crate alloc;

#[cfg(feature = "logging")]
use defmt_rtt as _;

pub mod band_allocator;
pub mod band_energy;
pub mod color_strategy;
pub mod config;
pub mod energy_meter;
pub mod error;
pub mod hub;
pub mod organ;
pub mod range_tracker;
pub mod recent_buffer;
pub mod spectrum_transform;
pub mod temporal_persistence;
pub mod types;

pub use band_allocator::{target_bin_count, BandLayout};
pub use band_energy::BandEnergyReducer;
pub use color_strategy::{colorize, ColorContext, ColorStrategy, GradientColor, SpectrumColor};
pub use config::{MeterConfig, OrganConfig, StageOrganConfig, WindowWeighting};
pub use energy_meter::{fill_lights, EnergyMeter, MeterFrame};
pub use error::{OrganError, Result};
pub use hub::{ClientId, LevelSink, SpectrumClient, SpectrumHub};
pub use organ::{LightOrgan, StageOrgan};
pub use range_tracker::{DecayMode, RangeTracker, TrackerConfig};
pub use recent_buffer::RecentBuffer;
pub use spectrum_transform::{SpectrumTransform, Transformed};
pub use temporal_persistence::TemporalPersistence;
pub use types::{normalize_byte_spectrum, MeterReading, SamplingParameters, StageGrid};
