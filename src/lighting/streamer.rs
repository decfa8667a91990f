// src/lighting/streamer.rs
// Render-thread consumer half of the evaluator handoff: chunks whose pending
// flag is set get exactly one sub-region upload per channel, sized to one
// chunk, then the flag is consumed.

use crate::config;
use crate::device::Device;
use crate::lighting::chunks::ChunkGrid;

/// Payload that knows how to push one chunk's worth of texels to the device.
pub trait StreamPayload {
    fn upload(&self, device: &mut dyn Device, chunk_origin: [u32; 3]);
}

/// Scan all chunks and upload the ones with finished, un-transferred results.
/// Returns the number of chunks uploaded.
pub fn stream_pending<P: StreamPayload>(grid: &ChunkGrid<P>, device: &mut dyn Device) -> usize {
    let cs = config::CHUNK_SIZE;
    let mut uploads = 0usize;
    for (index, chunk) in grid.chunks().iter().enumerate() {
        // AcqRel swap: pairs with the evaluator's Release store so the payload
        // reads below see everything the worker wrote.
        if !chunk.take_transfer_pending() {
            continue;
        }
        let (cx, cy, cz) = grid.chunk_coord(index);
        chunk
            .payload
            .upload(device, [cx as u32 * cs, cy as u32 * cs, cz as u32 * cs]);
        uploads += 1;
    }
    uploads
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{RecordingDevice, Region3, VolumeTarget};

    struct StampPayload {
        stamp: f32,
    }

    impl StreamPayload for StampPayload {
        fn upload(&self, device: &mut dyn Device, chunk_origin: [u32; 3]) {
            let region = Region3 {
                origin: chunk_origin,
                size: [config::CHUNK_SIZE; 3],
            };
            device.upload_volume_r32f(
                VolumeTarget::AmbientOcclusion,
                region,
                &vec![self.stamp; config::CHUNK_VOLUME],
            );
        }
    }

    #[test]
    fn uploads_once_per_dirty_cycle() {
        let grid = ChunkGrid::new(32, 32, 32, || StampPayload { stamp: 7.0 }).unwrap();
        let mut dev = RecordingDevice::default();

        // nothing pending: no uploads
        assert_eq!(stream_pending(&grid, &mut dev), 0);

        // mark one chunk's results ready
        let idx = grid.chunk_index(1, 0, 1);
        grid.chunk(idx).set_transfer_pending();

        assert_eq!(stream_pending(&grid, &mut dev), 1);
        assert_eq!(dev.volume_r32f.len(), 1);
        let (target, region, texels) = &dev.volume_r32f[0];
        assert_eq!(*target, VolumeTarget::AmbientOcclusion);
        assert_eq!(region.origin, [16, 0, 16]);
        assert_eq!(region.size, [16, 16, 16]);
        assert!(texels.iter().all(|&t| t == 7.0));

        // flag is consumed: a second pass uploads nothing
        assert_eq!(stream_pending(&grid, &mut dev), 0);
        assert_eq!(dev.volume_r32f.len(), 1);
    }
}
