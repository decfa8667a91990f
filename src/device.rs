// src/device.rs
// Opaque GPU command sink. The engines never talk to a graphics API directly;
// they describe sub-region uploads and the host maps those onto its device.

/// A 3D sub-region of a volume texture, in texels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region3 {
    pub origin: [u32; 3],
    pub size: [u32; 3],
}

impl Region3 {
    #[inline]
    pub fn texel_count(&self) -> usize {
        self.size.iter().map(|&s| s as usize).product()
    }
}

/// Which volume texture an upload addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VolumeTarget {
    AmbientOcclusion,
    RadiosityFlat,
    RadiosityX,
    RadiosityY,
    RadiosityZ,
}

pub trait Device {
    /// One-channel float upload (ambient occlusion), `region.texel_count()`
    /// texels in x-major, then y, then z order.
    fn upload_volume_r32f(&mut self, target: VolumeTarget, region: Region3, texels: &[f32]);

    /// Four-lane 16-bit upload (radiosity channels), 4 lanes per texel.
    fn upload_volume_rgba16(&mut self, target: VolumeTarget, region: Region3, texels: &[u16]);

    /// Full rewrite of the shadow page table (one u32 per tile).
    fn upload_page_table(&mut self, size: [u32; 2], texels: &[u32]);
}

/// Capture-only device: records every upload verbatim. Used by the test suite
/// to check streamer exactness and by hosts for upload tracing.
#[derive(Default)]
pub struct RecordingDevice {
    pub volume_r32f: Vec<(VolumeTarget, Region3, Vec<f32>)>,
    pub volume_rgba16: Vec<(VolumeTarget, Region3, Vec<u16>)>,
    pub page_tables: Vec<([u32; 2], Vec<u32>)>,
}

impl Device for RecordingDevice {
    fn upload_volume_r32f(&mut self, target: VolumeTarget, region: Region3, texels: &[f32]) {
        debug_assert_eq!(texels.len(), region.texel_count());
        self.volume_r32f.push((target, region, texels.to_vec()));
    }

    fn upload_volume_rgba16(&mut self, target: VolumeTarget, region: Region3, texels: &[u16]) {
        debug_assert_eq!(texels.len(), region.texel_count() * 4);
        self.volume_rgba16.push((target, region, texels.to_vec()));
    }

    fn upload_page_table(&mut self, size: [u32; 2], texels: &[u32]) {
        debug_assert_eq!(texels.len(), (size[0] * size[1]) as usize);
        self.page_tables.push((size, texels.to_vec()));
    }
}
