// src/lighting/evaluator.rs
// Single background worker per engine. The render thread pumps `update()`;
// the worker recomputes a bounded batch of dirty chunks, preferring chunks
// near the eye, and reports back over a bounded channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use glam::IVec3;
use rand::Rng;
use rustc_hash::FxHashSet as HashSet;

use crate::config;
use crate::lighting::chunks::{ChunkGrid, ChunkRegion};

/// Per-voxel lighting kernel run by the background worker.
pub trait LightingKernel: Send + Sync + 'static {
    type Payload: Send + Sync + 'static;

    /// Recompute the chunk's values over `region` (chunk-local, inclusive).
    /// Must write every voxel of the region before returning.
    fn evaluate(&self, grid: &ChunkGrid<Self::Payload>, chunk_index: usize, region: ChunkRegion);

    /// Worker-thread setup hook (floating-point environment masking on
    /// platforms that need it). No-op by default.
    fn prepare_worker(&self) {}
}

/// What one worker run did; drained into [`EvalStatsWindow`] on the render
/// thread.
#[derive(Clone, Copy, Debug)]
pub struct EvalReport {
    pub evaluated: u32,
    pub near_tier: bool,
    pub elapsed_ms: f64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EvalStatsWindow {
    pub runs: u32,
    pub far_runs: u32,
    pub chunks: u64,
    pub ms_sum: f64,
    pub ms_max: f64,
}

impl EvalStatsWindow {
    #[inline]
    pub fn record(&mut self, r: &EvalReport) {
        self.runs += 1;
        if !r.near_tier {
            self.far_runs += 1;
        }
        self.chunks += r.evaluated as u64;
        self.ms_sum += r.elapsed_ms;
        self.ms_max = self.ms_max.max(r.elapsed_ms);
    }

    #[inline]
    pub fn drain(&mut self) -> Self {
        std::mem::take(self)
    }
}

struct WorkerShared<K: LightingKernel> {
    grid: Arc<ChunkGrid<K::Payload>>,
    kernel: K,
    done: AtomicBool,
    tx_report: Sender<EvalReport>,
}

pub struct BackgroundEvaluator<K: LightingKernel> {
    shared: Arc<WorkerShared<K>>,
    rx_report: Receiver<EvalReport>,
    worker: Option<JoinHandle<()>>,
    pub stats: EvalStatsWindow,
}

impl<K: LightingKernel> BackgroundEvaluator<K> {
    pub fn new(grid: Arc<ChunkGrid<K::Payload>>, kernel: K) -> Self {
        let (tx_report, rx_report) = bounded(64);
        Self {
            shared: Arc::new(WorkerShared {
                grid,
                kernel,
                done: AtomicBool::new(true),
                tx_report,
            }),
            rx_report,
            worker: None,
            stats: EvalStatsWindow::default(),
        }
    }

    /// Render-thread pump, once per frame. Joins a finished worker (cheap,
    /// it already signalled done) and relaunches while any chunk is dirty.
    /// Never leaves more than one worker alive.
    pub fn update(&mut self, eye_chunk: IVec3) {
        for r in self.rx_report.try_iter() {
            self.stats.record(&r);
        }

        if self.worker.is_some() {
            if !self.shared.done.load(Ordering::Acquire) {
                return;
            }
            if let Some(h) = self.worker.take() {
                let _ = h.join();
            }
        }

        if self.shared.grid.num_dirty_chunks() == 0 {
            return;
        }

        self.shared.done.store(false, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        self.worker = Some(std::thread::spawn(move || run(shared, eye_chunk)));
    }

    /// True when no worker is outstanding (joined or never started).
    pub fn is_idle(&self) -> bool {
        self.worker.is_none()
    }
}

impl<K: LightingKernel> Drop for BackgroundEvaluator<K> {
    fn drop(&mut self) {
        // teardown waits for the in-flight worker before chunk storage goes away
        if let Some(h) = self.worker.take() {
            let _ = h.join();
        }
    }
}

fn run<K: LightingKernel>(shared: Arc<WorkerShared<K>>, eye_chunk: IVec3) {
    shared.kernel.prepare_worker();
    let t0 = Instant::now();
    let grid = shared.grid.as_ref();

    let mut candidates: Vec<usize> = Vec::with_capacity(config::EVAL_CANDIDATE_CAP);
    collect_near(grid, eye_chunk, &mut candidates);
    let near_tier = !candidates.is_empty();
    if !near_tier {
        for (i, c) in grid.chunks().iter().enumerate() {
            if c.is_dirty() {
                candidates.push(i);
                if candidates.len() >= config::EVAL_CANDIDATE_CAP {
                    break;
                }
            }
        }
    }

    // Uniform random draw with swap-remove so no index order can starve.
    let mut rng = rand::thread_rng();
    let mut evaluated = 0u32;
    while !candidates.is_empty() && (evaluated as usize) < config::EVAL_CHUNKS_PER_RUN {
        let pick = rng.gen_range(0..candidates.len());
        let index = candidates.swap_remove(pick);
        let chunk = grid.chunk(index);
        let Some(region) = chunk.take_region() else {
            continue;
        };
        shared.kernel.evaluate(grid, index, region);
        chunk.set_transfer_pending();
        evaluated += 1;
    }

    let _ = shared.tx_report.try_send(EvalReport {
        evaluated,
        near_tier,
        elapsed_ms: t0.elapsed().as_secs_f64() * 1000.0,
    });
    shared.done.store(true, Ordering::Release);
}

/// Dirty chunks within the Chebyshev eye window, wrap-aware on x/y. The set
/// guard drops duplicates when the window spans a full wrap of a small map.
fn collect_near<P>(grid: &ChunkGrid<P>, eye: IVec3, out: &mut Vec<usize>) {
    let (_, _, nz) = grid.dims();
    let r = config::NEAR_CHUNK_RADIUS;
    let mut seen: HashSet<usize> = HashSet::default();

    for dz in -r..=r {
        let cz = eye.z + dz;
        if cz < 0 || cz >= nz {
            continue;
        }
        for dy in -r..=r {
            for dx in -r..=r {
                let idx = grid.chunk_index(eye.x + dx, eye.y + dy, cz);
                if grid.chunk(idx).is_dirty() && seen.insert(idx) {
                    out.push(idx);
                    if out.len() >= config::EVAL_CANDIDATE_CAP {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Kernel that tracks how many workers are inside it at once.
    struct ProbeKernel {
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
        evaluated: Arc<AtomicUsize>,
    }

    impl LightingKernel for ProbeKernel {
        type Payload = ();

        fn evaluate(&self, _grid: &ChunkGrid<()>, _index: usize, _region: ChunkRegion) {
            let n = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(n, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(1));
            self.evaluated.fetch_add(1, Ordering::SeqCst);
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn pump_until_clean(ev: &mut BackgroundEvaluator<ProbeKernel>, grid: &ChunkGrid<()>) {
        for _ in 0..10_000 {
            ev.update(IVec3::new(0, 0, 0));
            if grid.num_dirty_chunks() == 0 && ev.shared.done.load(Ordering::Acquire) {
                // one more update to join the last worker
                ev.update(IVec3::new(0, 0, 0));
                if ev.is_idle() {
                    return;
                }
            }
            std::thread::sleep(Duration::from_micros(200));
        }
        panic!("evaluator did not drain the dirty set");
    }

    #[test]
    fn at_most_one_worker_and_all_chunks_evaluated() {
        let grid = Arc::new(ChunkGrid::new(512, 512, 64, || ()).unwrap());
        let max_active = Arc::new(AtomicUsize::new(0));
        let evaluated = Arc::new(AtomicUsize::new(0));
        let kernel = ProbeKernel {
            active: Arc::new(AtomicUsize::new(0)),
            max_active: max_active.clone(),
            evaluated: evaluated.clone(),
        };
        let mut ev = BackgroundEvaluator::new(grid.clone(), kernel);

        // dirty 20 distinct chunk columns scattered over the grid
        for i in 0..20 {
            let x = i * 16;
            grid.invalidate([x, 0, 0], [x, 0, 0]);
        }
        let dirtied = grid.num_dirty_chunks();
        assert!(dirtied > config::EVAL_CHUNKS_PER_RUN, "needs multiple runs");

        pump_until_clean(&mut ev, &grid);

        assert_eq!(evaluated.load(Ordering::SeqCst), dirtied);
        assert_eq!(max_active.load(Ordering::SeqCst), 1, "one worker at a time");
        assert!(ev.stats.runs >= 2);
        assert_eq!(ev.stats.chunks, dirtied as u64);
    }

    #[test]
    fn near_chunks_are_preferred() {
        let grid: ChunkGrid<()> = ChunkGrid::new(1024, 1024, 64, || ()).unwrap();
        // one dirty chunk near the eye, one far away
        grid.invalidate([0, 0, 0], [0, 0, 0]);
        grid.invalidate([800, 800, 0], [800, 800, 0]);

        let mut near = Vec::new();
        collect_near(&grid, IVec3::new(0, 0, 0), &mut near);
        assert_eq!(near, vec![grid.chunk_index(0, 0, 0)]);
    }

    #[test]
    fn far_fallback_when_no_near_chunks() {
        let grid: ChunkGrid<()> = ChunkGrid::new(1024, 1024, 64, || ()).unwrap();
        grid.invalidate([800, 800, 0], [800, 800, 0]);

        let mut near = Vec::new();
        collect_near(&grid, IVec3::new(0, 0, 0), &mut near);
        assert!(near.is_empty());
    }
}
