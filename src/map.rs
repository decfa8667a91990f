// src/map.rs
// Voxel field seam. The lighting engines only ever read the map through this
// trait; loading, editing and persistence live with the host.

/// Read-only view of the voxel field.
///
/// X and Y wrap around the map edges (the map is a torus on those axes);
/// Z is bounded. Queries above the top (z < 0) resolve to air, queries below
/// the bottom (z >= depth) resolve to solid ground.
pub trait VoxelMap: Send + Sync + 'static {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn depth(&self) -> u32;

    fn is_solid(&self, x: i32, y: i32, z: i32) -> bool;

    /// Surface color of a voxel; only meaningful where `is_solid` holds.
    fn color(&self, x: i32, y: i32, z: i32) -> [u8; 3];
}

/// Plain in-memory map: one bit of occupancy plus a color per voxel.
/// Used by tests and by hosts that keep the whole field resident.
pub struct MemoryMap {
    w: u32,
    h: u32,
    d: u32,
    solid: Vec<u64>,
    colors: Vec<[u8; 3]>,
}

impl MemoryMap {
    pub fn new(w: u32, h: u32, d: u32) -> Self {
        let len = (w as usize) * (h as usize) * (d as usize);
        Self {
            w,
            h,
            d,
            solid: vec![0u64; (len + 63) / 64],
            colors: vec![[0; 3]; len],
        }
    }

    #[inline]
    fn index(&self, x: i32, y: i32, z: i32) -> usize {
        let x = x.rem_euclid(self.w as i32) as usize;
        let y = y.rem_euclid(self.h as i32) as usize;
        let z = z as usize;
        x + (y + z * self.h as usize) * self.w as usize
    }

    pub fn set_solid(&mut self, x: i32, y: i32, z: i32, solid: bool) {
        if z < 0 || z >= self.d as i32 {
            return;
        }
        let i = self.index(x, y, z);
        if solid {
            self.solid[i / 64] |= 1 << (i % 64);
        } else {
            self.solid[i / 64] &= !(1 << (i % 64));
        }
    }

    pub fn set_color(&mut self, x: i32, y: i32, z: i32, color: [u8; 3]) {
        if z < 0 || z >= self.d as i32 {
            return;
        }
        let i = self.index(x, y, z);
        self.colors[i] = color;
    }

    /// Fill an inclusive box with solid voxels of one color.
    pub fn fill_box(&mut self, min: [i32; 3], max: [i32; 3], color: [u8; 3]) {
        for z in min[2]..=max[2] {
            for y in min[1]..=max[1] {
                for x in min[0]..=max[0] {
                    self.set_solid(x, y, z, true);
                    self.set_color(x, y, z, color);
                }
            }
        }
    }
}

impl VoxelMap for MemoryMap {
    fn width(&self) -> u32 {
        self.w
    }
    fn height(&self) -> u32 {
        self.h
    }
    fn depth(&self) -> u32 {
        self.d
    }

    fn is_solid(&self, x: i32, y: i32, z: i32) -> bool {
        if z < 0 {
            return false;
        }
        if z >= self.d as i32 {
            return true;
        }
        let i = self.index(x, y, z);
        self.solid[i / 64] & (1 << (i % 64)) != 0
    }

    fn color(&self, x: i32, y: i32, z: i32) -> [u8; 3] {
        if z < 0 {
            return [0; 3];
        }
        if z >= self.d as i32 {
            // below the map everything reads as bedrock grey
            return [128, 128, 128];
        }
        self.colors[self.index(x, y, z)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xy_wraparound() {
        let mut m = MemoryMap::new(32, 32, 16);
        m.set_solid(0, 5, 3, true);
        assert!(m.is_solid(32, 5, 3));
        assert!(m.is_solid(-32, 5, 3));
        assert!(m.is_solid(0, 37, 3));
        assert!(!m.is_solid(1, 5, 3));
    }

    #[test]
    fn z_is_bounded_not_cyclic() {
        let m = MemoryMap::new(32, 32, 16);
        assert!(!m.is_solid(0, 0, -1), "above the top is open sky");
        assert!(m.is_solid(0, 0, 16), "below the bottom is solid ground");
    }
}
