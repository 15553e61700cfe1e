use alloc::{boxed::Box, vec::Vec};
use core::any::Any;

#[cfg(feature = "logging")]
use defmt::{info, warn};

use crate::error::{expect_len, OrganError, Result};
use crate::types::{normalize_byte_spectrum, SamplingParameters};

/// Receiver of everything a client produces; rendering collaborators implement the
/// calls they care about.
pub trait LevelSink {
    /// Band widths, once per layout recomputation.
    fn band_layout_changed(&mut self, _sizes: &[usize]) {}

    /// One normalized level per channel, once per frame.
    fn channel_levels(&mut self, _levels: &[f32]) {}

    /// One normalized row per stage, once per frame after warm-up.
    fn stage_levels(&mut self, _stage: usize, _levels: &[f32]) {}

    /// VU level with the tracked extrema it was scaled by.
    fn meter_level(&mut self, _level: f32, _aux_max: f32, _aux_min: f32) {}

    /// Per-light intensities of the VU meter.
    fn lights(&mut self, _intensities: &[f32]) {}
}

/// Discards every output.
impl LevelSink for () {}

/// Consumer of the spectrum stream.
pub trait SpectrumClient {
    /// Called on registration and whenever the analysis source changes.
    fn change_sampling_parameters(
        &mut self,
        params: SamplingParameters,
        sink: &mut dyn LevelSink,
    ) -> Result<()>;

    /// One normalized spectrum frame; `spectrum.len()` is the current bin count.
    fn push_frame(&mut self, spectrum: &[f32], now_ms: u64, sink: &mut dyn LevelSink)
        -> Result<()>;

    /// The concrete client, reached again through [`SpectrumHub::with_client`].
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "logging", derive(defmt::Format))]
pub struct ClientId(usize);

impl ClientId {
    pub fn index(&self) -> usize {
        self.0
    }
}

struct Registration {
    client: Box<dyn SpectrumClient>,
    sink: Box<dyn LevelSink>,
}

/// Fans the spectrum stream out to its clients in registration order.
///
/// Owns the sampling context; every client learns it on registration and again on
/// every change.
pub struct SpectrumHub {
    params: SamplingParameters,
    clients: Vec<Registration>,
    last: Vec<f32>,
}

impl SpectrumHub {
    pub fn new(params: SamplingParameters) -> Self {
        Self {
            params,
            clients: Vec::new(),
            last: Vec::new(),
        }
    }

    pub fn parameters(&self) -> SamplingParameters {
        self.params
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// The last accepted spectrum; empty until the first frame after a change of
    /// sampling parameters.
    pub fn last_spectrum(&self) -> &[f32] {
        &self.last
    }

    pub fn add_client(
        &mut self,
        mut client: Box<dyn SpectrumClient>,
        mut sink: Box<dyn LevelSink>,
    ) -> Result<ClientId> {
        client.change_sampling_parameters(self.params, sink.as_mut())?;
        let id = ClientId(self.clients.len());
        self.clients.push(Registration { client, sink });

        #[cfg(feature = "logging")]
        info!("spectrum hub: client {} registered", id.0);

        Ok(id)
    }

    /// Run `f` on the registered client `id` and its paired sink.
    ///
    /// This is how a live client is reconfigured; `T` must be the type it was
    /// registered as.
    pub fn with_client<T, R>(
        &mut self,
        id: ClientId,
        f: impl FnOnce(&mut T, &mut dyn LevelSink) -> R,
    ) -> Result<R>
    where
        T: SpectrumClient + 'static,
    {
        let registration = self
            .clients
            .get_mut(id.0)
            .ok_or(OrganError::IllegalState("unknown client"))?;
        let client = registration
            .client
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(OrganError::IllegalState("client registered as another type"))?;
        Ok(f(client, registration.sink.as_mut()))
    }

    pub fn change_sampling_parameters(&mut self, params: SamplingParameters) -> Result<()> {
        #[cfg(feature = "logging")]
        info!(
            "spectrum hub: {} bins @ {} Hz",
            params.bin_count, params.sample_rate
        );

        self.params = params;
        self.last.clear();
        let mut outcome = Ok(());
        for registration in self.clients.iter_mut() {
            let result = registration
                .client
                .change_sampling_parameters(params, registration.sink.as_mut());
            keep_first_error(&mut outcome, result);
        }
        outcome
    }

    pub fn push_frame(&mut self, spectrum: &[f32], now_ms: u64) -> Result<()> {
        if let Err(e) = expect_len(self.params.bin_count, spectrum.len()) {
            #[cfg(feature = "logging")]
            warn!("spectrum hub: frame rejected: {}", e);
            return Err(e);
        }

        self.last.clear();
        self.last.extend_from_slice(spectrum);
        // a failing client does not starve the ones registered after it
        let mut outcome = Ok(());
        for registration in self.clients.iter_mut() {
            let result = registration
                .client
                .push_frame(spectrum, now_ms, registration.sink.as_mut());
            keep_first_error(&mut outcome, result);
        }
        outcome
    }

    pub fn push_byte_frame(&mut self, spectrum: &[u8], now_ms: u64) -> Result<()> {
        let normalized = normalize_byte_spectrum(spectrum);
        self.push_frame(&normalized, now_ms)
    }
}

fn keep_first_error(outcome: &mut Result<()>, result: Result<()>) {
    if let Err(e) = result {
        #[cfg(feature = "logging")]
        warn!("spectrum hub: client failed: {}", e);
        if outcome.is_ok() {
            *outcome = Err(e);
        }
    }
}
