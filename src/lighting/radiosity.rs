// src/lighting/radiosity.rs
// Secondary-bounce lighting engine: per voxel, a flat term plus three axis
// basis terms, each an RGB triple packed to 16 bits per lane. Same evaluator
// and streamer plumbing as the ambient engine, with a much wider envelope.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::Vec3;

use crate::config;
use crate::device::{Device, Region3, VolumeTarget};
use crate::error::EngineError;
use crate::lighting::ambient::{eye_chunk, ray_directions};
use crate::lighting::chunks::{ChunkGrid, ChunkRegion};
use crate::lighting::evaluator::{BackgroundEvaluator, EvalStatsWindow, LightingKernel};
use crate::lighting::streamer::{stream_pending, StreamPayload};
use crate::map::VoxelMap;

const SUN_DIR: Vec3 = Vec3::new(0.408_248_3, 0.408_248_3, -0.816_496_6);
const SUN_MARCH_CAP: i32 = 256;

/// flat / x / y / z basis lanes.
pub const CHANNEL_COUNT: usize = 4;

const CHANNEL_TARGETS: [VolumeTarget; CHANNEL_COUNT] = [
    VolumeTarget::RadiosityFlat,
    VolumeTarget::RadiosityX,
    VolumeTarget::RadiosityY,
    VolumeTarget::RadiosityZ,
];

#[inline]
fn pack_rgb(rgb: [u16; 3]) -> u64 {
    rgb[0] as u64 | (rgb[1] as u64) << 16 | (rgb[2] as u64) << 32
}

#[inline]
fn unpack_rgb(w: u64) -> [u16; 3] {
    [w as u16, (w >> 16) as u16, (w >> 32) as u16]
}

/// Per-chunk radiosity values: one packed RGB word per voxel per channel.
pub struct RadiosityChunk {
    channels: [Box<[AtomicU64]>; CHANNEL_COUNT],
}

impl RadiosityChunk {
    pub fn new() -> Self {
        let make = || {
            (0..config::CHUNK_VOLUME)
                .map(|_| AtomicU64::new(0))
                .collect::<Vec<_>>()
                .into_boxed_slice()
        };
        Self {
            channels: [make(), make(), make(), make()],
        }
    }

    #[inline]
    fn index(lx: i32, ly: i32, lz: i32) -> usize {
        let cs = config::CHUNK_SIZE_I;
        (lx + (ly + lz * cs) * cs) as usize
    }

    #[inline]
    pub fn set(&self, channel: usize, lx: i32, ly: i32, lz: i32, rgb: [u16; 3]) {
        self.channels[channel][Self::index(lx, ly, lz)].store(pack_rgb(rgb), Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self, channel: usize, lx: i32, ly: i32, lz: i32) -> [u16; 3] {
        unpack_rgb(self.channels[channel][Self::index(lx, ly, lz)].load(Ordering::Relaxed))
    }
}

impl Default for RadiosityChunk {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamPayload for RadiosityChunk {
    fn upload(&self, device: &mut dyn Device, chunk_origin: [u32; 3]) {
        let region = Region3 {
            origin: chunk_origin,
            size: [config::CHUNK_SIZE; 3],
        };
        for (channel, target) in CHANNEL_TARGETS.iter().enumerate() {
            let mut staging: Vec<[u16; 4]> = Vec::with_capacity(config::CHUNK_VOLUME);
            staging.extend(self.channels[channel].iter().map(|w| {
                let rgb = unpack_rgb(w.load(Ordering::Relaxed));
                [rgb[0], rgb[1], rgb[2], 0]
            }));
            device.upload_volume_rgba16(*target, region, bytemuck::cast_slice(&staging));
        }
    }
}

/// Whether the sun reaches `(x, y, z)`: march toward the sun until the ray
/// leaves the top of the map or hits a solid voxel.
fn sun_visible<M: VoxelMap>(map: &M, x: i32, y: i32, z: i32) -> bool {
    // SUN_DIR points toward the sun; z is negative because depth grows down.
    let p = Vec3::new(x as f32 + 0.5, y as f32 + 0.5, z as f32 + 0.5);
    for step in 1..=SUN_MARCH_CAP {
        let q = p + SUN_DIR * step as f32;
        if q.z < 0.0 {
            return true;
        }
        if map.is_solid(q.x.floor() as i32, q.y.floor() as i32, q.z.floor() as i32) {
            return false;
        }
    }
    false
}

/// Gathered incident radiance at one voxel, per channel, in linear [0,1]-ish
/// units before fixed-point packing.
pub fn gather_radiance_at<M: VoxelMap>(map: &M, x: i32, y: i32, z: i32) -> [[f32; 3]; CHANNEL_COUNT] {
    let mut out = [[0.0f32; 3]; CHANNEL_COUNT];
    if map.is_solid(x, y, z) {
        return out;
    }

    let dirs = radiosity_dirs();
    let p = Vec3::new(x as f32 + 0.5, y as f32 + 0.5, z as f32 + 0.5);
    'dirs: for dir in dirs.iter() {
        let mut prev = (x, y, z);
        for step in 1..=config::RADIOSITY_RANGE as i32 {
            let q = p + *dir * step as f32;
            let v = (q.x.floor() as i32, q.y.floor() as i32, q.z.floor() as i32);
            if !map.is_solid(v.0, v.1, v.2) {
                prev = v;
                continue;
            }
            if !sun_visible(map, prev.0, prev.1, prev.2) {
                continue 'dirs;
            }
            let c = map.color(v.0, v.1, v.2);
            let falloff = 1.0 - (step - 1) as f32 / config::RADIOSITY_RANGE;
            // map [-1,1] direction components into [0,1] basis weights
            let weights = [
                1.0,
                dir.x * 0.5 + 0.5,
                dir.y * 0.5 + 0.5,
                dir.z * 0.5 + 0.5,
            ];
            for (channel, w) in weights.iter().enumerate() {
                for lane in 0..3 {
                    out[channel][lane] += (c[lane] as f32 / 255.0) * falloff * w;
                }
            }
            continue 'dirs;
        }
    }

    let norm = 1.0 / dirs.len() as f32;
    for channel in out.iter_mut() {
        for lane in channel.iter_mut() {
            *lane *= norm;
        }
    }
    out
}

fn radiosity_dirs() -> &'static [Vec3] {
    use once_cell::sync::Lazy;
    static DIRS: Lazy<Vec<Vec3>> = Lazy::new(|| ray_directions(config::RADIOSITY_GATHER_DIRS));
    &DIRS
}

#[inline]
fn to_fixed(v: f32) -> u16 {
    (v * config::RADIOSITY_FIXED_SCALE).clamp(0.0, u16::MAX as f32) as u16
}

pub struct RadiosityKernel<M: VoxelMap> {
    map: Arc<M>,
}

impl<M: VoxelMap> LightingKernel for RadiosityKernel<M> {
    type Payload = RadiosityChunk;

    fn evaluate(&self, grid: &ChunkGrid<RadiosityChunk>, chunk_index: usize, region: ChunkRegion) {
        let (cx, cy, cz) = grid.chunk_coord(chunk_index);
        let cs = config::CHUNK_SIZE_I;
        let chunk = grid.chunk(chunk_index);
        for lz in region.min[2]..=region.max[2] {
            for ly in region.min[1]..=region.max[1] {
                for lx in region.min[0]..=region.max[0] {
                    let gathered = gather_radiance_at(
                        self.map.as_ref(),
                        cx * cs + lx,
                        cy * cs + ly,
                        cz * cs + lz,
                    );
                    for (channel, rgb) in gathered.iter().enumerate() {
                        chunk.payload.set(
                            channel,
                            lx,
                            ly,
                            lz,
                            [to_fixed(rgb[0]), to_fixed(rgb[1]), to_fixed(rgb[2])],
                        );
                    }
                }
            }
        }
    }
}

pub struct RadiosityEngine<M: VoxelMap> {
    grid: Arc<ChunkGrid<RadiosityChunk>>,
    evaluator: BackgroundEvaluator<RadiosityKernel<M>>,
}

impl<M: VoxelMap> RadiosityEngine<M> {
    pub fn new(map: Arc<M>) -> Result<Self, EngineError> {
        let grid = Arc::new(ChunkGrid::new(
            map.width(),
            map.height(),
            map.depth(),
            RadiosityChunk::new,
        )?);
        let evaluator = BackgroundEvaluator::new(grid.clone(), RadiosityKernel { map });
        Ok(Self { grid, evaluator })
    }

    /// Per-voxel-edit notification; bounce lighting reaches several chunks, so
    /// the invalidation envelope is correspondingly wide.
    pub fn game_map_changed(&self, x: i32, y: i32, z: i32) {
        let e = config::RADIOSITY_ENVELOPE;
        self.grid.invalidate([x - e, y - e, z - e], [x + e, y + e, z + e]);
    }

    pub fn update(&mut self, device: &mut dyn Device, eye: Vec3) -> usize {
        self.evaluator.update(eye_chunk(eye));
        stream_pending(&self.grid, device)
    }

    pub fn num_dirty_chunks(&self) -> usize {
        self.grid.num_dirty_chunks()
    }

    pub fn grid(&self) -> &ChunkGrid<RadiosityChunk> {
        &self.grid
    }

    pub fn stats(&mut self) -> EvalStatsWindow {
        self.evaluator.stats.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingDevice;
    use crate::map::MemoryMap;

    fn lit_floor_map() -> Arc<MemoryMap> {
        let mut m = MemoryMap::new(32, 32, 32);
        m.fill_box([0, 0, 30], [31, 31, 31], [255, 64, 32]);
        Arc::new(m)
    }

    #[test]
    fn rgb_packing_round_trips() {
        let c = RadiosityChunk::new();
        c.set(2, 3, 4, 5, [1, 4096, 65535]);
        assert_eq!(c.get(2, 3, 4, 5), [1, 4096, 65535]);
        assert_eq!(c.get(0, 3, 4, 5), [0, 0, 0]);
    }

    #[test]
    fn solid_voxels_gather_nothing() {
        let map = lit_floor_map();
        let g = gather_radiance_at(map.as_ref(), 5, 5, 31);
        assert_eq!(g, [[0.0; 3]; CHANNEL_COUNT]);
    }

    #[test]
    fn open_voxel_above_lit_floor_receives_bounce() {
        let map = lit_floor_map();
        let g = gather_radiance_at(map.as_ref(), 16, 16, 28);
        assert!(g[0][0] > 0.0, "flat red bounce from the floor");
        assert!(g[0][0] >= g[0][1], "floor is red-dominant");
        // rays never escape downward with light, so the +z basis should carry
        // at least as much as the flat term scaled by its weight bound
        assert!(g[3][0] > 0.0);
    }

    #[test]
    fn upload_covers_all_four_channels() {
        let grid = ChunkGrid::new(32, 32, 32, RadiosityChunk::new).unwrap();
        let mut dev = RecordingDevice::default();

        let idx = grid.chunk_index(1, 1, 0);
        grid.chunk(idx).set_transfer_pending();
        assert_eq!(stream_pending(&grid, &mut dev), 1);

        assert_eq!(dev.volume_rgba16.len(), CHANNEL_COUNT);
        let targets: Vec<_> = dev.volume_rgba16.iter().map(|(t, _, _)| *t).collect();
        assert_eq!(targets, CHANNEL_TARGETS.to_vec());
        for (_, region, texels) in &dev.volume_rgba16 {
            assert_eq!(region.origin, [16, 16, 0]);
            assert_eq!(region.size, [16, 16, 16]);
            assert_eq!(texels.len(), config::CHUNK_VOLUME * 4);
        }
    }

    #[test]
    fn edit_envelope_spans_chunks() {
        let map = lit_floor_map();
        let engine = RadiosityEngine::new(map).unwrap();
        engine.game_map_changed(16, 16, 16);
        // +-6 chunks on a 2x2x2 grid dirties everything
        assert_eq!(engine.num_dirty_chunks(), 8);
    }
}
