// src/lighting/chunks.rs
// Chunk storage shared by the lighting engines: dirty-region accumulation on
// the render thread, payload writes on the evaluator thread, flag-gated
// handoff to the streamer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::config;
use crate::error::EngineError;

/// Dirty sub-region of one chunk, in chunk-local voxel coordinates,
/// inclusive on both ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkRegion {
    pub min: [i32; 3],
    pub max: [i32; 3],
}

impl ChunkRegion {
    #[inline]
    pub fn union(&mut self, other: &ChunkRegion) {
        for a in 0..3 {
            self.min[a] = self.min[a].min(other.min[a]);
            self.max[a] = self.max[a].max(other.max[a]);
        }
    }

    /// Full-chunk region.
    pub fn full() -> Self {
        Self {
            min: [0; 3],
            max: [config::CHUNK_SIZE_I - 1; 3],
        }
    }
}

/// One 16^3 sub-volume of the voxel field.
///
/// Threading contract (not enforced by the type system, see the grid docs):
/// the render thread appends dirty regions; the single evaluator worker takes
/// them and is then the only payload writer until it sets `transfer_pending`;
/// the render-thread streamer is the only payload reader, and only after it
/// observes `transfer_pending`.
pub struct Chunk<P> {
    dirty: AtomicBool,
    transfer_pending: AtomicBool,
    // Tiny and uncontended: held for a few instructions by either side.
    region: Mutex<Option<ChunkRegion>>,
    pub payload: P,
}

impl<P> Chunk<P> {
    fn new(payload: P) -> Self {
        Self {
            dirty: AtomicBool::new(false),
            transfer_pending: AtomicBool::new(false),
            region: Mutex::new(None),
            payload,
        }
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_transfer_pending(&self) -> bool {
        self.transfer_pending.load(Ordering::Relaxed)
    }

    /// Accumulate a dirty region (render thread).
    pub(crate) fn push_region(&self, r: ChunkRegion) {
        let mut g = self.region.lock().unwrap();
        match g.as_mut() {
            Some(cur) => cur.union(&r),
            None => *g = Some(r),
        }
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Take ownership of the accumulated region (evaluator worker). The dirty
    /// flag drops with the take, so an edit racing with evaluation re-dirties
    /// the chunk instead of being lost.
    pub(crate) fn take_region(&self) -> Option<ChunkRegion> {
        let mut g = self.region.lock().unwrap();
        let r = g.take();
        if r.is_some() {
            self.dirty.store(false, Ordering::Relaxed);
        }
        r
    }

    /// Publish finished payload writes to the streamer. Release pairs with the
    /// Acquire in `take_transfer_pending`.
    pub(crate) fn set_transfer_pending(&self) {
        self.transfer_pending.store(true, Ordering::Release);
    }

    /// Consume the pending flag (render thread). True at most once per
    /// dirty/clean cycle.
    pub(crate) fn take_transfer_pending(&self) -> bool {
        self.transfer_pending.swap(false, Ordering::AcqRel)
    }

    #[cfg(test)]
    pub(crate) fn peek_region(&self) -> Option<ChunkRegion> {
        *self.region.lock().unwrap()
    }
}

/// Flat array of chunks covering the whole map. X/Y chunk coordinates wrap
/// via bit masks (power-of-two grid enforced at construction), Z is bounded.
pub struct ChunkGrid<P> {
    nx: i32,
    ny: i32,
    nz: i32,
    mask_x: i32,
    mask_y: i32,
    depth_voxels: i32,
    chunks: Vec<Chunk<P>>,
}

impl<P> ChunkGrid<P> {
    pub fn new(
        map_w: u32,
        map_h: u32,
        map_d: u32,
        mut make_payload: impl FnMut() -> P,
    ) -> Result<Self, EngineError> {
        let cs = config::CHUNK_SIZE;
        if map_w % cs != 0 || map_h % cs != 0 || map_d % cs != 0 {
            return Err(EngineError::UnalignedMap(map_w, map_h, map_d));
        }
        let (nx, ny, nz) = (map_w / cs, map_h / cs, map_d / cs);
        if !nx.is_power_of_two() || !ny.is_power_of_two() {
            return Err(EngineError::NonPowerOfTwoMap(map_w, map_h));
        }

        let len = (nx * ny * nz) as usize;
        let mut chunks = Vec::with_capacity(len);
        for _ in 0..len {
            chunks.push(Chunk::new(make_payload()));
        }

        Ok(Self {
            nx: nx as i32,
            ny: ny as i32,
            nz: nz as i32,
            mask_x: nx as i32 - 1,
            mask_y: ny as i32 - 1,
            depth_voxels: map_d as i32,
            chunks,
        })
    }

    #[inline]
    pub fn dims(&self) -> (i32, i32, i32) {
        (self.nx, self.ny, self.nz)
    }

    /// Flat index for a chunk coordinate. X/Y wrap; Z must be in range.
    #[inline]
    pub fn chunk_index(&self, cx: i32, cy: i32, cz: i32) -> usize {
        debug_assert!(cz >= 0 && cz < self.nz);
        let x = cx & self.mask_x;
        let y = cy & self.mask_y;
        (x + (y + cz * self.ny) * self.nx) as usize
    }

    #[inline]
    pub fn chunk_coord(&self, index: usize) -> (i32, i32, i32) {
        let i = index as i32;
        (i % self.nx, (i / self.nx) % self.ny, i / (self.nx * self.ny))
    }

    #[inline]
    pub fn chunk(&self, index: usize) -> &Chunk<P> {
        &self.chunks[index]
    }

    #[inline]
    pub fn chunks(&self) -> &[Chunk<P>] {
        &self.chunks
    }

    /// Record that the world-space box `[min, max]` (inclusive, already
    /// expanded by the caller's kernel envelope) must be re-evaluated.
    ///
    /// Z is clipped to the valid depth range; a box that becomes degenerate
    /// after clipping is dropped silently (edits at the very top/bottom of the
    /// map fall out of range by design). Each overlapping chunk gets the box
    /// translated into its local space and unioned into its dirty region.
    pub fn invalidate(&self, min: [i32; 3], max: [i32; 3]) {
        let lo = [min[0], min[1], min[2].max(0)];
        let hi = [max[0], max[1], max[2].min(self.depth_voxels - 1)];
        if lo[0] > hi[0] || lo[1] > hi[1] || lo[2] > hi[2] {
            return;
        }

        let cs = config::CHUNK_SIZE_I;
        for cz in lo[2].div_euclid(cs)..=hi[2].div_euclid(cs) {
            for cy in lo[1].div_euclid(cs)..=hi[1].div_euclid(cs) {
                for cx in lo[0].div_euclid(cs)..=hi[0].div_euclid(cs) {
                    let base = [cx * cs, cy * cs, cz * cs];
                    let r = ChunkRegion {
                        min: [
                            (lo[0] - base[0]).max(0),
                            (lo[1] - base[1]).max(0),
                            (lo[2] - base[2]).max(0),
                        ],
                        max: [
                            (hi[0] - base[0]).min(cs - 1),
                            (hi[1] - base[1]).min(cs - 1),
                            (hi[2] - base[2]).min(cs - 1),
                        ],
                    };
                    self.chunks[self.chunk_index(cx, cy, cz)].push_region(r);
                }
            }
        }
    }

    /// Linear scan; used for scheduling decisions only.
    pub fn num_dirty_chunks(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_dirty()).count()
    }
}
