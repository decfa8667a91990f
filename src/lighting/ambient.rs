// src/lighting/ambient.rs
// Ambient occlusion engine: one float per voxel, recomputed over dirty
// sub-regions by the background worker and streamed into a 3D R32F texture.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use glam::{IVec3, Vec3};
use once_cell::sync::Lazy;

use crate::config;
use crate::device::{Device, Region3, VolumeTarget};
use crate::error::EngineError;
use crate::lighting::chunks::{ChunkGrid, ChunkRegion};
use crate::lighting::evaluator::{BackgroundEvaluator, EvalStatsWindow, LightingKernel};
use crate::lighting::streamer::{stream_pending, StreamPayload};
use crate::map::VoxelMap;

/// Per-chunk AO values, element-atomic so the worker can write them lock-free
/// under the dirty/pending flag protocol. Values are f32 bits in [0,1].
pub struct AoChunk {
    values: Box<[AtomicU32]>,
}

impl AoChunk {
    pub fn new() -> Self {
        let open = 1.0f32.to_bits();
        let values = (0..config::CHUNK_VOLUME)
            .map(|_| AtomicU32::new(open))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { values }
    }

    #[inline]
    fn index(lx: i32, ly: i32, lz: i32) -> usize {
        let cs = config::CHUNK_SIZE_I;
        (lx + (ly + lz * cs) * cs) as usize
    }

    #[inline]
    pub fn set(&self, lx: i32, ly: i32, lz: i32, v: f32) {
        self.values[Self::index(lx, ly, lz)].store(v.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self, lx: i32, ly: i32, lz: i32) -> f32 {
        f32::from_bits(self.values[Self::index(lx, ly, lz)].load(Ordering::Relaxed))
    }
}

impl Default for AoChunk {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamPayload for AoChunk {
    fn upload(&self, device: &mut dyn Device, chunk_origin: [u32; 3]) {
        let mut staging = Vec::with_capacity(config::CHUNK_VOLUME);
        staging.extend(
            self.values
                .iter()
                .map(|v| f32::from_bits(v.load(Ordering::Relaxed))),
        );
        device.upload_volume_r32f(
            VolumeTarget::AmbientOcclusion,
            Region3 {
                origin: chunk_origin,
                size: [config::CHUNK_SIZE; 3],
            },
            &staging,
        );
    }
}

/// Evenly distributed unit directions (spherical Fibonacci). Deterministic so
/// incremental and full recomputations agree exactly.
pub(crate) fn ray_directions(count: usize) -> Vec<Vec3> {
    let golden = core::f32::consts::PI * (3.0 - 5.0f32.sqrt());
    (0..count)
        .map(|i| {
            let z = 1.0 - 2.0 * (i as f32 + 0.5) / count as f32;
            let r = (1.0 - z * z).max(0.0).sqrt();
            let a = golden * i as f32;
            Vec3::new(r * a.cos(), r * a.sin(), z)
        })
        .collect()
}

static AO_RAYS: Lazy<Vec<Vec3>> = Lazy::new(|| ray_directions(config::AO_RAY_COUNT));

/// Fraction of rays from the voxel center that escape the kernel envelope
/// without hitting a solid voxel. Solid voxels read as fully occluded.
pub fn ambient_occlusion_at<M: VoxelMap>(map: &M, x: i32, y: i32, z: i32) -> f32 {
    if map.is_solid(x, y, z) {
        return 0.0;
    }
    let p = Vec3::new(x as f32 + 0.5, y as f32 + 0.5, z as f32 + 0.5);
    let mut open = 0u32;
    'rays: for dir in AO_RAYS.iter() {
        for step in 1..=config::AO_ENVELOPE {
            let q = p + *dir * step as f32;
            if map.is_solid(
                q.x.floor() as i32,
                q.y.floor() as i32,
                q.z.floor() as i32,
            ) {
                continue 'rays;
            }
        }
        open += 1;
    }
    open as f32 / config::AO_RAY_COUNT as f32
}

pub struct AoKernel<M: VoxelMap> {
    map: Arc<M>,
}

impl<M: VoxelMap> LightingKernel for AoKernel<M> {
    type Payload = AoChunk;

    fn evaluate(&self, grid: &ChunkGrid<AoChunk>, chunk_index: usize, region: ChunkRegion) {
        let (cx, cy, cz) = grid.chunk_coord(chunk_index);
        let cs = config::CHUNK_SIZE_I;
        let chunk = grid.chunk(chunk_index);
        for lz in region.min[2]..=region.max[2] {
            for ly in region.min[1]..=region.max[1] {
                for lx in region.min[0]..=region.max[0] {
                    let v = ambient_occlusion_at(
                        self.map.as_ref(),
                        cx * cs + lx,
                        cy * cs + ly,
                        cz * cs + lz,
                    );
                    chunk.payload.set(lx, ly, lz, v);
                }
            }
        }
    }
}

pub struct AmbientShadowEngine<M: VoxelMap> {
    grid: Arc<ChunkGrid<AoChunk>>,
    evaluator: BackgroundEvaluator<AoKernel<M>>,
}

impl<M: VoxelMap> AmbientShadowEngine<M> {
    pub fn new(map: Arc<M>) -> Result<Self, EngineError> {
        let grid = Arc::new(ChunkGrid::new(
            map.width(),
            map.height(),
            map.depth(),
            AoChunk::new,
        )?);
        let evaluator = BackgroundEvaluator::new(grid.clone(), AoKernel { map });
        Ok(Self { grid, evaluator })
    }

    /// Per-voxel-edit notification from the map/gameplay system. The box is
    /// expanded by the AO kernel envelope before invalidation.
    pub fn game_map_changed(&self, x: i32, y: i32, z: i32) {
        let e = config::AO_ENVELOPE;
        self.grid.invalidate([x - e, y - e, z - e], [x + e, y + e, z + e]);
    }

    /// Per-frame pump (render thread): relaunch the background worker if
    /// needed and stream any finished chunks. Returns the upload count.
    pub fn update(&mut self, device: &mut dyn Device, eye: Vec3) -> usize {
        self.evaluator.update(eye_chunk(eye));
        stream_pending(&self.grid, device)
    }

    pub fn num_dirty_chunks(&self) -> usize {
        self.grid.num_dirty_chunks()
    }

    pub fn grid(&self) -> &ChunkGrid<AoChunk> {
        &self.grid
    }

    pub fn stats(&mut self) -> EvalStatsWindow {
        self.evaluator.stats.drain()
    }

    pub fn evaluator_idle(&self) -> bool {
        self.evaluator.is_idle()
    }
}

#[inline]
pub(crate) fn eye_chunk(eye: Vec3) -> IVec3 {
    let cs = config::CHUNK_SIZE_I;
    IVec3::new(
        (eye.x.floor() as i32).div_euclid(cs),
        (eye.y.floor() as i32).div_euclid(cs),
        (eye.z.floor() as i32).div_euclid(cs),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingDevice;
    use crate::map::MemoryMap;
    use std::time::Duration;

    fn test_map() -> Arc<MemoryMap> {
        let mut m = MemoryMap::new(32, 32, 32);
        // floor slab at the bottom two layers plus a pillar
        m.fill_box([0, 0, 30], [31, 31, 31], [200, 180, 150]);
        m.fill_box([10, 10, 20], [12, 12, 29], [90, 90, 90]);
        Arc::new(m)
    }

    #[test]
    fn incremental_matches_direct_recomputation() {
        let map = test_map();
        let grid = ChunkGrid::new(32, 32, 32, AoChunk::new).unwrap();
        let kernel = AoKernel { map: map.clone() };

        // record a dirty region and evaluate it the incremental way
        grid.invalidate([8, 8, 18], [14, 14, 31]);
        for index in 0..grid.chunks().len() {
            if let Some(region) = grid.chunk(index).take_region() {
                kernel.evaluate(&grid, index, region);
            }
        }

        // every voxel of the recorded region must match a direct recompute
        for z in 18..32 {
            for y in 8..15 {
                for x in 8..15 {
                    let cs = config::CHUNK_SIZE_I;
                    let idx = grid.chunk_index(x / cs, y / cs, z / cs);
                    let got = grid
                        .chunk(idx)
                        .payload
                        .get(x % cs, y % cs, z % cs);
                    let want = ambient_occlusion_at(map.as_ref(), x, y, z);
                    assert_eq!(got, want, "voxel ({x},{y},{z})");
                }
            }
        }
    }

    #[test]
    fn solid_voxels_are_fully_occluded() {
        let map = test_map();
        assert_eq!(ambient_occlusion_at(map.as_ref(), 11, 11, 25), 0.0);
        // high in the open sky everything is visible
        assert_eq!(ambient_occlusion_at(map.as_ref(), 20, 20, 2), 1.0);
    }

    #[test]
    fn engine_drains_edits_and_streams_results() {
        let map = test_map();
        let mut engine = AmbientShadowEngine::new(map).unwrap();
        let mut dev = RecordingDevice::default();

        engine.game_map_changed(16, 16, 24);
        let dirtied = engine.num_dirty_chunks();
        assert!(dirtied > 0);

        let mut uploads = 0usize;
        for _ in 0..10_000 {
            uploads += engine.update(&mut dev, Vec3::new(16.0, 16.0, 24.0));
            if uploads >= dirtied && engine.num_dirty_chunks() == 0 {
                break;
            }
            std::thread::sleep(Duration::from_micros(200));
        }
        assert_eq!(uploads, dirtied, "one upload per dirtied chunk");
        assert_eq!(engine.num_dirty_chunks(), 0);
        assert_eq!(dev.volume_r32f.len(), dirtied);
        for (target, region, texels) in &dev.volume_r32f {
            assert_eq!(*target, VolumeTarget::AmbientOcclusion);
            assert_eq!(region.size, [16, 16, 16]);
            assert_eq!(texels.len(), config::CHUNK_VOLUME);
        }
    }

    #[test]
    fn envelope_expands_across_chunk_seams() {
        let map = test_map();
        let engine = AmbientShadowEngine::new(map).unwrap();
        // an edit at a chunk corner must spill into the neighbors
        engine.game_map_changed(16, 16, 16);
        assert_eq!(engine.num_dirty_chunks(), 8);
    }
}
