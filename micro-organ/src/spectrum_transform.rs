use alloc::vec::Vec;
use core::any::Any;

#[cfg(feature = "logging")]
use defmt::debug;

use crate::config::{MAX_TRANSFORM_BUFFER, TRANSFORM_BUFFER_SIZE};
use crate::error::{OrganError, Result};
use crate::hub::{LevelSink, SpectrumClient};
use crate::recent_buffer::RecentBuffer;
use crate::types::SamplingParameters;

/// Bin-wise product of the last few spectra. Peaks that persist across frames
/// survive, transients are suppressed.
#[derive(Debug, Clone)]
pub struct SpectrumTransform {
    frames: RecentBuffer<Vec<f32>>,
    product: Vec<f32>,
}

impl Default for SpectrumTransform {
    fn default() -> Self {
        Self {
            frames: RecentBuffer::with_capacity(TRANSFORM_BUFFER_SIZE),
            product: Vec::new(),
        }
    }
}

impl SpectrumTransform {
    pub fn new(buffer_size: usize) -> Result<Self> {
        check_buffer_size(buffer_size)?;
        Ok(Self {
            frames: RecentBuffer::with_capacity(buffer_size),
            product: Vec::new(),
        })
    }

    pub fn buffer_size(&self) -> usize {
        self.frames.capacity()
    }

    /// Resizing drops every buffered frame.
    pub fn set_buffer_size(&mut self, buffer_size: usize) -> Result<()> {
        check_buffer_size(buffer_size)?;
        #[cfg(feature = "logging")]
        debug!("spectrum transform: buffer {} -> {}", self.frames.capacity(), buffer_size);
        self.frames = RecentBuffer::with_capacity(buffer_size);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.product.clear();
    }

    /// Buffer `spectrum` and return the product over everything buffered.
    pub fn push(&mut self, spectrum: &[f32]) -> &[f32] {
        if self.frames.newest().is_some_and(|f| f.len() != spectrum.len()) {
            self.frames.clear();
        }
        self.frames.push(spectrum.to_vec());

        self.product.clear();
        self.product.extend_from_slice(spectrum);
        for frame in self.frames.iter().skip(1) {
            for (p, &v) in self.product.iter_mut().zip(frame) {
                *p *= v;
            }
        }
        &self.product
    }
}

fn check_buffer_size(buffer_size: usize) -> Result<()> {
    if buffer_size == 0 || buffer_size > MAX_TRANSFORM_BUFFER {
        return Err(OrganError::InvalidConfig("transform buffer size out of range"));
    }
    Ok(())
}

/// Feeds a transformed spectrum to an inner client.
pub struct Transformed<C> {
    transform: SpectrumTransform,
    inner: C,
}

impl<C: SpectrumClient> Transformed<C> {
    pub fn new(transform: SpectrumTransform, inner: C) -> Self {
        Self { transform, inner }
    }

    pub fn transform(&self) -> &SpectrumTransform {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut SpectrumTransform {
        &mut self.transform
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: SpectrumClient + 'static> SpectrumClient for Transformed<C> {
    fn change_sampling_parameters(
        &mut self,
        params: SamplingParameters,
        sink: &mut dyn LevelSink,
    ) -> Result<()> {
        self.transform.clear();
        self.inner.change_sampling_parameters(params, sink)
    }

    fn push_frame(&mut self, spectrum: &[f32], now_ms: u64, sink: &mut dyn LevelSink) -> Result<()> {
        let transformed = self.transform.push(spectrum);
        self.inner.push_frame(transformed, now_ms, sink)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrganConfig;
    use crate::organ::LightOrgan;
    use alloc::vec;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_product_of_recent_frames() {
        let mut transform = SpectrumTransform::new(3).unwrap();
        assert_eq!(transform.push(&[0.5, 1.0]), &[0.5, 1.0]);
        assert_eq!(transform.push(&[0.5, 0.5]), &[0.25, 0.5]);
        assert_eq!(transform.push(&[1.0, 0.5]), &[0.25, 0.25]);
        // the first frame drops out
        assert_eq!(transform.push(&[1.0, 1.0]), &[0.5, 0.25]);
    }

    #[test]
    fn test_resize_and_length_change_clear() {
        let mut transform = SpectrumTransform::default();
        assert_eq!(transform.buffer_size(), 5);
        transform.push(&[0.5, 0.5]);

        transform.set_buffer_size(2).unwrap();
        assert_eq!(transform.push(&[0.5, 0.5]), &[0.5, 0.5]);

        assert_eq!(transform.push(&[0.5, 0.5, 0.5]), &[0.5, 0.5, 0.5]);

        assert!(transform.set_buffer_size(0).is_err());
        assert!(SpectrumTransform::new(51).is_err());
    }

    #[test]
    fn test_transformed_client() {
        let organ = LightOrgan::new(OrganConfig::default().with_channel_count(1)).unwrap();
        let mut client = Transformed::new(SpectrumTransform::new(2).unwrap(), organ);
        let params = SamplingParameters::new(4, 1000.0).unwrap();
        client.change_sampling_parameters(params, &mut ()).unwrap();

        SpectrumClient::push_frame(&mut client, &[0.5; 4], 0, &mut ()).unwrap();
        assert_eq!(client.inner().levels(), &[1.0]);

        // 0.5 * 0.5 per bin, squared by the default power reducer, against the
        // decayed max of the first frame
        SpectrumClient::push_frame(&mut client, &[0.5; 4], 1, &mut ()).unwrap();
        assert_abs_diff_eq!(client.inner().levels()[0], 0.0625 / 0.24925, epsilon = 1e-5);

        client.change_sampling_parameters(params, &mut ()).unwrap();
        SpectrumClient::push_frame(&mut client, &[0.5; 4], 2, &mut ()).unwrap();
        assert_eq!(client.inner().levels(), vec![1.0]);
    }
}
