use alloc::{vec, vec::Vec};

#[cfg(feature = "logging")]
use defmt::debug;

use crate::band_energy::BandEnergyReducer;
use crate::error::{expect_len, OrganError, Result};

/// Number of spectrum bins needed to reach `max_freq`, clamped to the bins that exist.
pub fn target_bin_count(sample_rate: f32, bin_count: usize, max_freq: f32) -> usize {
    let t = libm::round(2.0 * bin_count as f64 * max_freq as f64 / sample_rate as f64);
    if t <= 0.0 {
        0
    } else {
        (t as usize).min(bin_count)
    }
}

/// Partition of a spectrum into contiguous bands whose widths grow geometrically,
/// so the last band is `span_ratio` times as wide as the first.
///
/// Immutable once built; a change of any input means allocating a new layout.
#[derive(Debug, Clone, PartialEq)]
pub struct BandLayout {
    sample_rate: f32,
    bin_count: usize,
    max_freq: f32,
    channel_count: usize,
    span_ratio: f32,
    sizes: Vec<usize>,
    ranges: Vec<(usize, usize)>,
}

impl BandLayout {
    pub fn allocate(
        sample_rate: f32,
        bin_count: usize,
        max_freq: f32,
        channel_count: usize,
        span_ratio: f32,
    ) -> Result<Self> {
        if !(sample_rate > 0.0) {
            return Err(OrganError::InvalidConfig("sample rate must be positive"));
        }
        if bin_count == 0 {
            return Err(OrganError::InvalidConfig("bin count must be greater than 0"));
        }
        if channel_count == 0 {
            return Err(OrganError::InvalidConfig("channel count must be greater than 0"));
        }
        if !(span_ratio > 0.0) || !span_ratio.is_finite() {
            return Err(OrganError::InvalidConfig("span ratio must be positive"));
        }
        if !(max_freq >= 0.0) || !max_freq.is_finite() {
            return Err(OrganError::InvalidConfig("max frequency must be non-negative"));
        }

        let target = target_bin_count(sample_rate, bin_count, max_freq);
        let sizes = if channel_count == 1 {
            vec![target.max(1)]
        } else {
            Self::geometric_sizes(target, channel_count, span_ratio as f64)
        };
        let ranges = Self::clipped_ranges(&sizes, bin_count);

        #[cfg(feature = "logging")]
        debug!(
            "band layout: {} bins @ {} Hz up to {} Hz -> {} channels, target {}",
            bin_count, sample_rate, max_freq, channel_count, target
        );

        Ok(Self {
            sample_rate,
            bin_count,
            max_freq,
            channel_count,
            span_ratio,
            sizes,
            ranges,
        })
    }

    // Widths are w[i] = a * b^i for 0 <= i < count, with w[count - 1] / w[0] = span,
    // thus b^(count - 1) = span and a * (1 - b^count) / (1 - b) = target.
    fn geometric_sizes(target: usize, count: usize, span: f64) -> Vec<usize> {
        let b = libm::pow(span, 1.0 / (count - 1) as f64);
        let t = target as f64;
        let a = if libm::fabs(b - 1.0) < 1e-12 {
            t / count as f64
        } else {
            t * (1.0 - b) / (1.0 - libm::pow(b, count as f64))
        };

        let mut sizes: Vec<usize> = (0..count)
            .map(|i| {
                let w = libm::round(a * libm::pow(b, i as f64));
                if w > 0.0 {
                    w as usize
                } else {
                    0
                }
            })
            .collect();
        let mut total: usize = sizes.iter().sum();

        // Every band needs at least one bin; the surplus is taken back below.
        for size in sizes.iter_mut() {
            if *size < 1 {
                total += 1 - *size;
                *size = 1;
            }
        }

        while total > target {
            let mut found = false;
            for size in sizes.iter_mut() {
                if total <= target {
                    break;
                }
                if *size > 1 {
                    *size -= 1;
                    total -= 1;
                    found = true;
                }
            }
            if !found {
                // More channels than bins: every band is down to one bin.
                break;
            }
        }

        while total < target {
            for size in sizes.iter_mut().rev() {
                if total >= target {
                    break;
                }
                *size += 1;
                total += 1;
            }
        }

        sizes
    }

    fn clipped_ranges(sizes: &[usize], bin_count: usize) -> Vec<(usize, usize)> {
        let mut start = 0;
        sizes
            .iter()
            .map(|&size| {
                let range = (start.min(bin_count), (start + size).min(bin_count));
                start += size;
                range
            })
            .collect()
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// `(start, end)` bin index pairs, one per band, clipped to the spectrum.
    pub fn band_ranges(&self) -> &[(usize, usize)] {
        &self.ranges
    }

    /// Bins covered by all bands together.
    pub fn target_bins(&self) -> usize {
        self.sizes.iter().sum()
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn max_freq(&self) -> f32 {
        self.max_freq
    }

    pub fn span_ratio(&self) -> f32 {
        self.span_ratio
    }

    /// Mean of `bin^exponent` per band.
    pub fn group(&self, spectrum: &[f32], exponent: u32) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(self.channel_count);
        self.group_with(spectrum, &BandEnergyReducer::new(exponent), &mut out)?;
        Ok(out)
    }

    /// Like [`group`](Self::group) but reusing `out` and an existing reducer.
    pub fn group_with(
        &self,
        spectrum: &[f32],
        reducer: &BandEnergyReducer,
        out: &mut Vec<f32>,
    ) -> Result<()> {
        expect_len(self.bin_count, spectrum.len())?;
        out.clear();
        out.extend(
            self.ranges
                .iter()
                .map(|&(start, end)| reducer.reduce(&spectrum[start..end])),
        );
        Ok(())
    }
}
