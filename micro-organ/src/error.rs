use thiserror::Error;

/// Contract violations raised by the signal-conditioning components.
///
/// None of these are retryable: each one means the caller handed over a frame or a
/// configuration the component cannot accept. The frame is dropped and tracked
/// state is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "logging", derive(defmt::Format))]
pub enum OrganError {
    /// An operation was attempted before the configuration it depends on exists,
    /// e.g. pushing a frame before sampling parameters were declared.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    /// An input length disagrees with the configured dimension.
    #[error("size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A structural parameter is out of its domain (zero channels, zero sample rate...).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = core::result::Result<T, OrganError>;

/// Fails with [`OrganError::SizeMismatch`] unless `actual == expected`.
#[inline]
pub(crate) fn expect_len(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(OrganError::SizeMismatch { expected, actual })
    }
}
