// Hybrid timestamp arithmetic: physical milliseconds in the high bits, an 18-bit logical counter below

use crate::error::ParameterError;

/// Number of low bits holding the logical counter.
pub const LOGICAL_BITS: u32 = 18;
const LOGICAL_MASK: u64 = (1 << LOGICAL_BITS) - 1;

/// Physical part of `hybridts`, in milliseconds since the Unix epoch.
pub fn physical_ms(hybridts: u64) -> u64 {
    hybridts >> LOGICAL_BITS
}

pub fn logical(hybridts: u64) -> u64 {
    hybridts & LOGICAL_MASK
}

/// Seconds since the Unix epoch encoded in `hybridts`.
pub fn hybridts_to_unixtime(hybridts: u64) -> f64 {
    physical_ms(hybridts) as f64 / 1000.0
}

/// Moves a physical millisecond count into the high bits, failing when it does not fit.
fn compose(name: &'static str, physical_ms: f64, logical: u64) -> Result<u64, ParameterError> {
    // `as` saturates, so anything past u64::MAX also fails the multiplication.
    (physical_ms.max(0.0) as u64)
        .checked_mul(1 << LOGICAL_BITS)
        .map(|high| high | logical)
        .ok_or_else(|| ParameterError::InvalidNumber {
            name,
            value: physical_ms.to_string(),
        })
}

/// Hybrid timestamp for `epoch` seconds shifted by `milliseconds`, with a zero logical part.
pub fn mkts_from_unixtime(epoch: f64, milliseconds: f64) -> Result<u64, ParameterError> {
    compose("epoch", epoch * 1000.0 + milliseconds, 0)
}

/// Shifts the physical part of `hybridts` by `milliseconds`, keeping the logical counter.
pub fn mkts_from_hybridts(hybridts: u64, milliseconds: f64) -> Result<u64, ParameterError> {
    compose(
        "milliseconds",
        physical_ms(hybridts) as f64 + milliseconds,
        logical(hybridts),
    )
}
