// src/error.rs
use thiserror::Error;

/// Construction-time failures. Steady-state paths never error; they degrade
/// (lower LOD, coarser lighting) instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("map x/y dimensions {0}x{1} must be powers of two (wraparound uses bit masks)")]
    NonPowerOfTwoMap(u32, u32),

    #[error("map dimensions {0}x{1}x{2} must be multiples of the chunk size {}", crate::config::CHUNK_SIZE)]
    UnalignedMap(u32, u32, u32),
}
