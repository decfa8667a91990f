// src/shadow/page_table.rs
// Indirection table sampled by the shadow shader: one u32 texel per tile,
// mapping the tile to its atlas position and LOD. Rebuilt and re-uploaded
// whole every frame (it is tiny and groups are frame-scoped).

use crate::config;
use crate::shadow::collect::{CasterFrame, Group};
use crate::shadow::INVALID_U32;

/// "No shadow caster on this tile."
pub const PAGE_TABLE_SENTINEL: u32 = 0xFFFF_FFFF;

/// Byte layout: [atlas-x low 8 | atlas-y low 8 | x high nibble + y high
/// nibble | lod]. 12 bits per axis covers the 4096-texel atlas maximum.
#[inline]
pub fn pack_texel(atlas_x: u32, atlas_y: u32, lod: u32) -> u32 {
    debug_assert!(atlas_x < (1 << 12) && atlas_y < (1 << 12) && lod < (1 << 8));
    (atlas_x & 0xff)
        | (atlas_y & 0xff) << 8
        | (((atlas_x >> 8) & 0xf) | ((atlas_y >> 8) & 0xf) << 4) << 16
        | lod << 24
}

#[inline]
pub fn decode_texel(texel: u32) -> (u32, u32, u32) {
    let x = (texel & 0xff) | ((texel >> 16) & 0xf) << 8;
    let y = (texel >> 8) & 0xff | ((texel >> 20) & 0xf) << 8;
    let lod = texel >> 24;
    (x, y, lod)
}

/// Build the full table from this frame's group map and placements. Tiles
/// with no group, or whose group was dropped by degraded-mode packing, get
/// the sentinel.
pub(crate) fn build(frame: &CasterFrame, out: &mut Vec<u32>) {
    let tiles = config::SHADOW_TILES as i32;
    out.clear();
    out.reserve((tiles * tiles) as usize);

    for ty in 0..tiles {
        for tx in 0..tiles {
            let cell = frame.group_map[(ty * tiles + tx) as usize];
            out.push(texel_for(frame, cell, tx, ty));
        }
    }
}

#[inline]
fn texel_for(frame: &CasterFrame, cell: u32, tx: i32, ty: i32) -> u32 {
    if cell == INVALID_U32 {
        return PAGE_TABLE_SENTINEL;
    }
    let g: &Group = &frame.groups[cell as usize];
    debug_assert!(g.valid, "group map cell points at an invalidated group");
    let Some(p) = g.placement else {
        return PAGE_TABLE_SENTINEL;
    };
    let ax = p.x + (((tx - g.tile_min.x) as u32) << p.lod);
    let ay = p.y + (((ty - g.tile_min.y) as u32) << p.lod);
    pack_texel(ax, ay, p.lod as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadow::collect::Placement;
    use glam::IVec2;

    #[test]
    fn texel_round_trip() {
        for (x, y, lod) in [(0, 0, 0), (255, 17, 3), (4095, 4095, 5), (300, 2049, 1)] {
            assert_eq!(decode_texel(pack_texel(x, y, lod)), (x, y, lod));
        }
    }

    #[test]
    fn table_decodes_to_recorded_placements() {
        let mut frame = CasterFrame::new();
        frame.groups.push(Group {
            tile_min: IVec2::new(4, 6),
            tile_max: IVec2::new(6, 7),
            lod: 3,
            first: INVALID_U32,
            last: INVALID_U32,
            valid: true,
            placement: Some(Placement { x: 100, y: 200, w: 25, h: 17, lod: 3 }),
        });
        for ty in 6..=7 {
            for tx in 4..=6 {
                frame.group_map[(ty * config::SHADOW_TILES as usize) + tx] = 0;
            }
        }

        let mut table = Vec::new();
        build(&frame, &mut table);
        assert_eq!(table.len(), (config::SHADOW_TILES * config::SHADOW_TILES) as usize);

        // occupied tiles decode to placement-relative coordinates
        let t = table[6 * config::SHADOW_TILES as usize + 5];
        let (ax, ay, lod) = decode_texel(t);
        assert_eq!((ax, ay, lod), (100 + (1 << 3), 200, 3));

        // empty tiles carry the sentinel
        assert_eq!(table[0], PAGE_TABLE_SENTINEL);
    }

    #[test]
    fn unplaced_groups_read_as_no_shadow() {
        let mut frame = CasterFrame::new();
        frame.groups.push(Group {
            tile_min: IVec2::new(0, 0),
            tile_max: IVec2::new(0, 0),
            lod: 1,
            first: INVALID_U32,
            last: INVALID_U32,
            valid: true,
            placement: None,
        });
        frame.group_map[0] = 0;

        let mut table = Vec::new();
        build(&frame, &mut table);
        assert_eq!(table[0], PAGE_TABLE_SENTINEL);
    }
}
