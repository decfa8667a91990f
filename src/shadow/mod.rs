// src/shadow/mod.rs
// Sparse shadow-map renderer: collect casters into tile groups, pack the
// groups into a single atlas with adaptive LOD, publish an indirection table.
// The host renders the returned entries into the atlas viewports.

pub mod collect;
pub mod pack;
pub mod page_table;

pub use collect::{Aabb, ModelId, ModelInstance, Placement};
pub use page_table::{decode_texel, pack_texel, PAGE_TABLE_SENTINEL};

use glam::{Mat4, Vec3};
use log::warn;

use crate::config;
use crate::device::Device;
use collect::CasterFrame;
use pack::TilePacker;

pub(crate) const INVALID_U32: u32 = 0xFFFF_FFFF;

#[derive(Clone, Copy, Debug)]
pub struct ShadowSettings {
    /// Atlas edge length in texels. Power of two, at most
    /// `config::MAX_SHADOW_MAP_SIZE`.
    pub map_size: u32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            map_size: config::DEFAULT_SHADOW_MAP_SIZE,
        }
    }
}

/// One draw the host must issue into the atlas: render `model` under
/// `transform` with the light matrix, viewport set to the placement rect.
#[derive(Clone, Copy, Debug)]
pub struct RenderEntry {
    pub model: ModelId,
    pub transform: Mat4,
    pub placement: Placement,
}

pub struct SparseShadowRenderer {
    map_size: u32,
    frame: CasterFrame,
    packer: TilePacker,
    entries: Vec<RenderEntry>,
    table: Vec<u32>,
    last_bias: i32,
}

impl SparseShadowRenderer {
    pub fn new(settings: ShadowSettings) -> Self {
        let mut map_size = settings.map_size.clamp(config::SHADOW_TILES, config::MAX_SHADOW_MAP_SIZE);
        if !map_size.is_power_of_two() {
            let rounded = map_size
                .next_power_of_two()
                .min(config::MAX_SHADOW_MAP_SIZE);
            warn!("shadow map size {map_size} is not a power of two, using {rounded}");
            map_size = rounded;
        }
        if map_size != settings.map_size {
            warn!("shadow map size adjusted: {} -> {map_size}", settings.map_size);
        }
        Self {
            map_size,
            frame: CasterFrame::new(),
            packer: TilePacker::new(map_size),
            entries: Vec::new(),
            table: Vec::new(),
            last_bias: config::LOD_BIAS_NEUTRAL,
        }
    }

    pub fn map_size(&self) -> u32 {
        self.map_size
    }

    /// LOD bias the last `build_frame` settled on. Above neutral means spare
    /// atlas space, below means the scene was squeezed.
    pub fn last_bias(&self) -> i32 {
        self.last_bias
    }

    /// Run the full per-frame pipeline: collect, group, pack, upload the page
    /// table, and return the atlas draws for the host to render.
    pub fn build_frame(
        &mut self,
        scene: &[ModelInstance],
        light_vp: &Mat4,
        eye_light: Vec3,
        device: &mut dyn Device,
    ) -> &[RenderEntry] {
        self.frame.collect(scene, light_vp, eye_light);
        self.last_bias = self.packer.pack(&mut self.frame.groups);

        page_table::build(&self.frame, &mut self.table);
        device.upload_page_table([config::SHADOW_TILES; 2], &self.table);

        self.entries.clear();
        for gid in 0..self.frame.groups.len() as u32 {
            let g = &self.frame.groups[gid as usize];
            if !g.valid {
                continue;
            }
            let Some(placement) = g.placement else {
                continue;
            };
            for i in self.frame.group_members(gid) {
                let inst = &self.frame.instances[i as usize];
                self.entries.push(RenderEntry {
                    model: inst.model,
                    transform: inst.transform,
                    placement,
                });
            }
        }
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingDevice;

    fn caster(x: f32, y: f32, half: f32) -> ModelInstance {
        ModelInstance {
            model: ModelId(7),
            bounds: Aabb {
                min: Vec3::splat(-half),
                max: Vec3::splat(half),
            },
            transform: Mat4::from_translation(Vec3::new(x, y, 0.0)),
            depth_hack: false,
        }
    }

    #[test]
    fn settings_are_sanitized() {
        let r = SparseShadowRenderer::new(ShadowSettings { map_size: 3000 });
        assert_eq!(r.map_size(), 4096);
        let r = SparseShadowRenderer::new(ShadowSettings { map_size: 1 << 20 });
        assert_eq!(r.map_size(), config::MAX_SHADOW_MAP_SIZE);
        let r = SparseShadowRenderer::new(ShadowSettings::default());
        assert_eq!(r.map_size(), config::DEFAULT_SHADOW_MAP_SIZE);
    }

    #[test]
    fn frame_produces_entries_and_page_table() {
        let mut r = SparseShadowRenderer::new(ShadowSettings::default());
        let mut dev = RecordingDevice::default();
        let scene = [caster(-0.5, -0.5, 0.05), caster(0.5, 0.5, 0.05)];

        let entries = r.build_frame(&scene, &Mat4::IDENTITY, Vec3::ZERO, &mut dev);
        assert_eq!(entries.len(), 2);
        for e in entries {
            assert_eq!(e.model, ModelId(7));
        }

        assert_eq!(dev.page_tables.len(), 1);
        let (size, table) = &dev.page_tables[0];
        assert_eq!(*size, [config::SHADOW_TILES; 2]);
        // occupied tiles decode into their group's placement rect
        let occupied = table.iter().filter(|&&t| t != PAGE_TABLE_SENTINEL).count();
        assert!(occupied > 0);
        for &t in table {
            if t == PAGE_TABLE_SENTINEL {
                continue;
            }
            let (ax, ay, _) = decode_texel(t);
            assert!(ax < r.map_size() && ay < r.map_size());
        }
    }

    #[test]
    fn empty_scene_uploads_all_sentinels() {
        let mut r = SparseShadowRenderer::new(ShadowSettings::default());
        let mut dev = RecordingDevice::default();
        let entries = r.build_frame(&[], &Mat4::IDENTITY, Vec3::ZERO, &mut dev);
        assert!(entries.is_empty());
        let (_, table) = &dev.page_tables[0];
        assert!(table.iter().all(|&t| t == PAGE_TABLE_SENTINEL));
    }
}
