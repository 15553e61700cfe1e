/// Reduces the raw magnitudes of a band to one energy value: the mean of every
/// bin raised to `exponent`.
///
/// Exponent 1 is plain mean magnitude, 2 is mean power (the "loudness" weighting).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "logging", derive(defmt::Format))]
pub struct BandEnergyReducer {
    exponent: u32,
}

impl Default for BandEnergyReducer {
    fn default() -> Self {
        Self::linear()
    }
}

impl BandEnergyReducer {
    /// An exponent of 0 is treated as 1.
    pub const fn new(exponent: u32) -> Self {
        Self {
            exponent: if exponent == 0 { 1 } else { exponent },
        }
    }

    pub const fn linear() -> Self {
        Self::new(1)
    }

    pub const fn power() -> Self {
        Self::new(2)
    }

    pub fn exponent(&self) -> u32 {
        self.exponent
    }

    #[inline]
    fn weigh(&self, bin: f32) -> f32 {
        let mut e = bin;
        for _ in 1..self.exponent {
            e *= bin;
        }
        e
    }

    /// Mean weighted energy of `bins`; an empty band has no energy.
    pub fn reduce(&self, bins: &[f32]) -> f32 {
        if bins.is_empty() {
            return 0.0;
        }
        let sum: f32 = bins.iter().map(|&b| self.weigh(b)).sum();
        sum / bins.len() as f32
    }

    /// Whole-spectrum energy, the VU meter's per-frame scalar.
    pub fn total(&self, spectrum: &[f32]) -> f32 {
        self.reduce(spectrum)
    }
}
