// src/shadow/collect.rs
// Per-frame shadow-caster collection: project model bounds into light space,
// quantize to the tile grid, and merge overlapping footprints into groups.
// Instances and groups live in flat arenas with u32 sentinel links; nothing
// here survives the frame.

use glam::{IVec2, Mat4, Vec3};

use crate::config;
use crate::shadow::INVALID_U32;

/// Non-owning reference to a renderable model; resolution is the host's job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModelId(pub u32);

/// Object-space axis-aligned bounding box.
#[derive(Clone, Copy, Debug)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

/// One visible model instance as handed in by the scene graph.
#[derive(Clone, Copy, Debug)]
pub struct ModelInstance {
    pub model: ModelId,
    pub bounds: Aabb,
    pub transform: Mat4,
    /// First-person view models bypass depth testing and never cast.
    pub depth_hack: bool,
}

pub(crate) struct Instance {
    pub model: ModelId,
    pub transform: Mat4,
    pub tile_min: IVec2,
    pub tile_max: IVec2,
    pub lod: i32,
    pub prev: u32,
    pub next: u32,
}

/// Final atlas placement of a group (margin included in w/h).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub lod: i32,
}

pub(crate) struct Group {
    pub tile_min: IVec2,
    pub tile_max: IVec2,
    /// Required LOD: max over all member instances.
    pub lod: i32,
    pub first: u32,
    pub last: u32,
    pub valid: bool,
    pub placement: Option<Placement>,
}

impl Group {
    #[inline]
    pub fn tile_extent(&self) -> (u32, u32) {
        (
            (self.tile_max.x - self.tile_min.x + 1) as u32,
            (self.tile_max.y - self.tile_min.y + 1) as u32,
        )
    }
}

/// Frame-scoped caster state. Rebuilt every frame; buffers keep their
/// capacity across frames.
pub(crate) struct CasterFrame {
    pub instances: Vec<Instance>,
    pub groups: Vec<Group>,
    /// Tiles x Tiles index: occupied cells point at a *valid* group.
    pub group_map: Vec<u32>,
}

impl CasterFrame {
    pub fn new() -> Self {
        let tiles = config::SHADOW_TILES as usize;
        Self {
            instances: Vec::new(),
            groups: Vec::new(),
            group_map: vec![INVALID_U32; tiles * tiles],
        }
    }

    pub fn clear(&mut self) {
        self.instances.clear();
        self.groups.clear();
        self.group_map.fill(INVALID_U32);
    }

    /// Gather this frame's casters. `light_vp` maps world space onto the
    /// [-1,1]^2 light square; `eye_light` is the camera position expressed in
    /// the same space (drives the LOD demand).
    pub fn collect(&mut self, scene: &[ModelInstance], light_vp: &Mat4, eye_light: Vec3) {
        self.clear();
        for m in scene {
            if m.depth_hack {
                continue;
            }

            let mut min = Vec3::splat(f32::INFINITY);
            let mut max = Vec3::splat(f32::NEG_INFINITY);
            for c in m.bounds.corners() {
                let p = light_vp.project_point3(m.transform.transform_point3(c));
                min = min.min(p);
                max = max.max(p);
            }

            // entirely outside the light-space square
            if max.x < -1.0 || min.x > 1.0 || max.y < -1.0 || min.y > 1.0 {
                continue;
            }
            // zero-area footprint
            if max.x <= min.x || max.y <= min.y {
                continue;
            }

            let tiles = config::SHADOW_TILES as f32;
            let hi = config::SHADOW_TILES as i32 - 1;
            let to_tile = |v: f32| (((v + 1.0) * 0.5 * tiles) as i32).clamp(0, hi);
            let tile_min = IVec2::new(to_tile(min.x), to_tile(min.y));
            let tile_max = IVec2::new(to_tile(max.x), to_tile(max.y));

            let center = light_vp.project_point3(m.transform.transform_point3(m.bounds.center()));
            let lod = compute_lod(center.distance(eye_light));

            self.register(m, tile_min, tile_max, lod);
        }
    }

    /// Register a footprint: merge every group it (transitively) overlaps and
    /// append the instance to the winner. `group_map` cells inside the merged
    /// rect are repainted so they always point at a valid group.
    fn register(&mut self, m: &ModelInstance, tile_min: IVec2, tile_max: IVec2, lod: i32) {
        let inst = self.instances.len() as u32;
        self.instances.push(Instance {
            model: m.model,
            transform: m.transform,
            tile_min,
            tile_max,
            lod,
            prev: INVALID_U32,
            next: INVALID_U32,
        });

        // Expand-and-rescan: absorbing a group can grow the rect over cells
        // owned by yet another group, so scan until a pass finds nothing new.
        let mut rect_min = tile_min;
        let mut rect_max = tile_max;
        let mut winner = INVALID_U32;
        loop {
            let mut grew = false;
            for ty in rect_min.y..=rect_max.y {
                for tx in rect_min.x..=rect_max.x {
                    let cell = self.group_map[Self::cell(tx, ty)];
                    if cell == INVALID_U32 || cell == winner {
                        continue;
                    }
                    // cells of groups merged earlier in this call are stale
                    // until the final repaint below
                    if !self.groups[cell as usize].valid {
                        continue;
                    }
                    if winner == INVALID_U32 {
                        winner = cell;
                    } else {
                        self.merge_groups(winner, cell);
                    }
                    let g = &self.groups[winner as usize];
                    rect_min = rect_min.min(g.tile_min);
                    rect_max = rect_max.max(g.tile_max);
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }

        let gid = if winner == INVALID_U32 {
            let gid = self.groups.len() as u32;
            self.groups.push(Group {
                tile_min: rect_min,
                tile_max: rect_max,
                lod,
                first: inst,
                last: inst,
                valid: true,
                placement: None,
            });
            gid
        } else {
            let g = &mut self.groups[winner as usize];
            g.tile_min = rect_min;
            g.tile_max = rect_max;
            g.lod = g.lod.max(lod);
            let tail = g.last;
            g.last = inst;
            self.instances[inst as usize].prev = tail;
            self.instances[tail as usize].next = inst;
            winner
        };

        for ty in rect_min.y..=rect_max.y {
            for tx in rect_min.x..=rect_max.x {
                self.group_map[Self::cell(tx, ty)] = gid;
            }
        }
    }

    /// Absorb `loser` into `winner`: splice the member lists, union the
    /// bounds, take the max LOD. Exactly one valid group remains.
    fn merge_groups(&mut self, winner: u32, loser: u32) {
        debug_assert_ne!(winner, loser);
        let (l_min, l_max, l_lod, l_first, l_last) = {
            let l = &mut self.groups[loser as usize];
            debug_assert!(l.valid);
            l.valid = false;
            (l.tile_min, l.tile_max, l.lod, l.first, l.last)
        };

        let w = &mut self.groups[winner as usize];
        w.tile_min = w.tile_min.min(l_min);
        w.tile_max = w.tile_max.max(l_max);
        w.lod = w.lod.max(l_lod);
        let tail = w.last;
        w.last = l_last;
        self.instances[tail as usize].next = l_first;
        self.instances[l_first as usize].prev = tail;
    }

    #[inline]
    fn cell(tx: i32, ty: i32) -> usize {
        (ty * config::SHADOW_TILES as i32 + tx) as usize
    }

    /// Member instance indices of a group, in insertion order.
    pub fn group_members(&self, gid: u32) -> GroupMembers<'_> {
        GroupMembers {
            frame: self,
            cursor: self.groups[gid as usize].first,
        }
    }
}

pub(crate) struct GroupMembers<'a> {
    frame: &'a CasterFrame,
    cursor: u32,
}

impl<'a> Iterator for GroupMembers<'a> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.cursor == INVALID_U32 {
            return None;
        }
        let i = self.cursor;
        self.cursor = self.frame.instances[i as usize].next;
        Some(i)
    }
}

/// Inverse-distance LOD demand: nearer casters ask for more atlas texels.
#[inline]
pub(crate) fn compute_lod(dist: f32) -> i32 {
    let d = dist.max(1e-3);
    let lod = (config::LOD_DISTANCE_SCALE / d).log2().round() as i32;
    lod.clamp(config::INSTANCE_LOD_MIN, config::INSTANCE_LOD_MAX)
}
