// src/shadow/pack.rs
// Guillotine atlas packer with an adaptive LOD-bias search. The node tree is
// an index arena rebuilt on every attempt; placements degrade in resolution
// rather than fail.

use log::warn;

use crate::config;
use crate::shadow::collect::{Group, Placement};

/// A child position in the cut tree.
#[derive(Clone, Copy, Debug)]
enum Slot {
    Empty,
    Group(u32),
    Node(u32),
}

/// One guillotine cut. `vertical` splits child 0 off at `cut` texels from the
/// left; otherwise from the top.
#[derive(Clone, Copy, Debug)]
struct PackNode {
    cut: u32,
    vertical: bool,
    child: [Slot; 2],
}

#[derive(Clone, Copy, Debug)]
struct Rect {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

pub(crate) struct TilePacker {
    atlas_size: u32,
    max_lod: i32,
    nodes: Vec<PackNode>,
    root: Slot,
}

impl TilePacker {
    pub fn new(atlas_size: u32) -> Self {
        debug_assert!(atlas_size.is_power_of_two() && atlas_size >= config::SHADOW_TILES);
        let max_lod =
            (atlas_size.trailing_zeros() - config::SHADOW_TILES.trailing_zeros()) as i32;
        Self {
            atlas_size,
            max_lod,
            nodes: Vec::new(),
            root: Slot::Empty,
        }
    }

    /// Atlas-space footprint of a group at a given bias: tile extent shifted
    /// by the clamped effective LOD, plus a 1-texel safety margin per axis.
    fn footprint(&self, group: &Group, bias: i32) -> (u32, u32, i32) {
        let lod = (group.lod + bias - config::LOD_BIAS_NEUTRAL).clamp(0, self.max_lod);
        let (tw, th) = group.tile_extent();
        ((tw << lod) + 1, (th << lod) + 1, lod)
    }

    /// Run the LOD-bias search over all valid groups and write final
    /// placements. Returns the bias that was used.
    pub fn pack(&mut self, groups: &mut [Group]) -> i32 {
        for g in groups.iter_mut() {
            g.placement = None;
        }

        let mut bias = config::LOD_BIAS_NEUTRAL;
        if self.try_pack(groups, bias) {
            // fits at neutral: probe upward for the most detail that still packs
            let mut best = bias;
            while bias < config::LOD_BIAS_CEILING {
                bias += 1;
                if self.try_pack(groups, bias) {
                    best = bias;
                } else {
                    break;
                }
            }
            if best != bias {
                let ok = self.try_pack(groups, best);
                debug_assert!(ok);
            }
            return best;
        }

        // overloaded: shrink until it fits
        while bias > config::LOD_BIAS_FLOOR {
            bias -= 1;
            if self.try_pack(groups, bias) {
                return bias;
            }
        }

        // Last resort: minimum LOD for everything, drop what still cannot
        // fit. Dropped groups stay unplaced and resolve to the page-table
        // sentinel, which reads as "no shadow" rather than an error.
        warn!(
            "shadow atlas overflow: packing {} groups at minimum LOD, dropping the rest",
            groups.iter().filter(|g| g.valid).count()
        );
        self.pack_degraded(groups);
        config::LOD_BIAS_FLOOR
    }

    /// One packing attempt at a fixed bias. On success every valid group has
    /// a placement; on failure placements are partial garbage and the next
    /// attempt rewrites them.
    fn try_pack(&mut self, groups: &mut [Group], bias: i32) -> bool {
        self.reset();
        for gi in 0..groups.len() {
            if !groups[gi].valid {
                continue;
            }
            let (w, h, lod) = self.footprint(&groups[gi], bias);
            match self.place_group(gi as u32, w, h) {
                Some((x, y)) => groups[gi].placement = Some(Placement { x, y, w, h, lod }),
                None => return false,
            }
        }
        true
    }

    fn pack_degraded(&mut self, groups: &mut [Group]) {
        self.reset();
        for gi in 0..groups.len() {
            groups[gi].placement = None;
            if !groups[gi].valid {
                continue;
            }
            let (w, h, lod) = self.footprint(&groups[gi], config::LOD_BIAS_FLOOR);
            if let Some((x, y)) = self.place_group(gi as u32, w, h) {
                groups[gi].placement = Some(Placement { x, y, w, h, lod });
            }
        }
    }

    fn reset(&mut self) {
        self.nodes.clear();
        self.root = Slot::Empty;
    }

    fn place_group(&mut self, gid: u32, w: u32, h: u32) -> Option<(u32, u32)> {
        let rect = Rect {
            x: 0,
            y: 0,
            w: self.atlas_size,
            h: self.atlas_size,
        };
        let root = self.root;
        let (root, pos) = self.place(root, rect, gid, w, h);
        self.root = root;
        pos
    }

    /// Recursive descent. Returns the (possibly re-written) slot plus the
    /// placement position on success.
    fn place(&mut self, slot: Slot, rect: Rect, gid: u32, w: u32, h: u32) -> (Slot, Option<(u32, u32)>) {
        match slot {
            Slot::Group(_) => (slot, None),
            Slot::Empty => {
                if w > rect.w || h > rect.h {
                    return (slot, None);
                }
                let leaf = Slot::Group(gid);
                let new_slot = if w == rect.w && h == rect.h {
                    leaf
                } else if w == rect.w {
                    // exact width: one horizontal cut, free space below
                    Slot::Node(self.push(PackNode {
                        cut: h,
                        vertical: false,
                        child: [leaf, Slot::Empty],
                    }))
                } else if h == rect.h {
                    // exact height: one vertical cut, free space to the right
                    Slot::Node(self.push(PackNode {
                        cut: w,
                        vertical: true,
                        child: [leaf, Slot::Empty],
                    }))
                } else {
                    // general case: vertical cut at w, then the left column is
                    // cut horizontally at h (guillotine L-split)
                    let inner = self.push(PackNode {
                        cut: h,
                        vertical: false,
                        child: [leaf, Slot::Empty],
                    });
                    Slot::Node(self.push(PackNode {
                        cut: w,
                        vertical: true,
                        child: [Slot::Node(inner), Slot::Empty],
                    }))
                };
                (new_slot, Some((rect.x, rect.y)))
            }
            Slot::Node(ni) => {
                let node = self.nodes[ni as usize];
                let (r0, r1) = split(rect, node.cut, node.vertical);

                let (c0, pos) = self.place(node.child[0], r0, gid, w, h);
                self.nodes[ni as usize].child[0] = c0;
                if pos.is_some() {
                    return (Slot::Node(ni), pos);
                }

                let (c1, pos) = self.place(node.child[1], r1, gid, w, h);
                self.nodes[ni as usize].child[1] = c1;
                (Slot::Node(ni), pos)
            }
        }
    }

    #[inline]
    fn push(&mut self, node: PackNode) -> u32 {
        self.nodes.push(node);
        (self.nodes.len() - 1) as u32
    }
}

#[inline]
fn split(rect: Rect, cut: u32, vertical: bool) -> (Rect, Rect) {
    if vertical {
        (
            Rect { x: rect.x, y: rect.y, w: cut, h: rect.h },
            Rect { x: rect.x + cut, y: rect.y, w: rect.w - cut, h: rect.h },
        )
    } else {
        (
            Rect { x: rect.x, y: rect.y, w: rect.w, h: cut },
            Rect { x: rect.x, y: rect.y + cut, w: rect.w, h: rect.h - cut },
        )
    }
}
