// src/lib.rs
// Voxel lighting and sparse shadow engine.
//
// Three cooperating subsystems, all host-driven (call `update`/`build_frame`
// once per frame, hand in a `Device`):
//
//   * `lighting::ambient`   - per-voxel ambient occlusion, recomputed
//     incrementally on a background worker and streamed chunk by chunk.
//   * `lighting::radiosity` - secondary-bounce lighting over a wide envelope,
//     same worker/streamer plumbing, four packed RGB channels.
//   * `shadow`              - per-frame sparse shadow map: casters grouped on
//     a tile grid, packed into one atlas with adaptive LOD, addressed through
//     a page table.
//
// The crate never touches a graphics API. Hosts implement `Device` and map
// the described uploads onto whatever they render with.

pub mod config;
pub mod device;
pub mod error;
pub mod lighting;
pub mod map;
pub mod shadow;

pub use device::{Device, RecordingDevice, Region3, VolumeTarget};
pub use error::EngineError;
pub use lighting::{AmbientShadowEngine, RadiosityEngine};
pub use map::{MemoryMap, VoxelMap};
pub use shadow::{
    Aabb, ModelId, ModelInstance, RenderEntry, ShadowSettings, SparseShadowRenderer,
};
