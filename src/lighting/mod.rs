// src/lighting/mod.rs
// Dirty-chunk tracking + background evaluation + GPU streaming.

pub mod ambient;
pub mod chunks;
pub mod evaluator;
pub mod radiosity;
pub mod streamer;

pub use ambient::AmbientShadowEngine;
pub use chunks::{Chunk, ChunkGrid, ChunkRegion};
pub use evaluator::{BackgroundEvaluator, EvalReport, EvalStatsWindow, LightingKernel};
pub use radiosity::RadiosityEngine;
pub use streamer::{stream_pending, StreamPayload};
