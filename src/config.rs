// src/config.rs
// -------------
// Global config knobs for the lighting engines + sparse shadow packer.

pub const CHUNK_SIZE: u32 = 16;
pub const CHUNK_SIZE_I: i32 = CHUNK_SIZE as i32;
pub const CHUNK_VOLUME: usize = (CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE) as usize;

// -----------------------------------------------------------------------------
// Ambient occlusion
// -----------------------------------------------------------------------------

// Kernel envelope: a single voxel edit invalidates this many voxels around it,
// because the AO rays sample that far.
pub const AO_ENVELOPE: i32 = 8;
pub const AO_RAY_COUNT: usize = 64;

// -----------------------------------------------------------------------------
// Radiosity
// -----------------------------------------------------------------------------

// Envelope in chunks: bounce lighting gathers across a much wider radius.
pub const RADIOSITY_ENVELOPE_CHUNKS: i32 = 6;
pub const RADIOSITY_ENVELOPE: i32 = RADIOSITY_ENVELOPE_CHUNKS * CHUNK_SIZE_I;
pub const RADIOSITY_GATHER_DIRS: usize = 32;
pub const RADIOSITY_RANGE: f32 = 48.0;
// Fixed-point scale for the packed 16-bit channel values.
pub const RADIOSITY_FIXED_SCALE: f32 = 4096.0;

// -----------------------------------------------------------------------------
// Background evaluation budget
// -----------------------------------------------------------------------------

pub const EVAL_CANDIDATE_CAP: usize = 256;
pub const EVAL_CHUNKS_PER_RUN: usize = 8;
// Chebyshev window (in chunks) around the eye that is preferred for evaluation.
pub const NEAR_CHUNK_RADIUS: i32 = 6;

// -----------------------------------------------------------------------------
// Sparse shadow map
// -----------------------------------------------------------------------------

// Tile grid overlaid on the [-1,1]^2 light-space square.
pub const SHADOW_TILES: u32 = 64;

pub const DEFAULT_SHADOW_MAP_SIZE: u32 = 2048;
pub const MAX_SHADOW_MAP_SIZE: u32 = 4096;

// LOD-bias search. 100 is neutral; raising the bias buys detail for distant
// groups, lowering it shrinks footprints until the atlas fits. At FLOOR every
// group is already at its minimum footprint.
pub const LOD_BIAS_NEUTRAL: i32 = 100;
pub const LOD_BIAS_CEILING: i32 = 140;
pub const LOD_BIAS_FLOOR: i32 = 84;

// Per-instance LOD demand from the inverse-distance metric.
pub const INSTANCE_LOD_MIN: i32 = 1;
pub const INSTANCE_LOD_MAX: i32 = 16;
pub const LOD_DISTANCE_SCALE: f32 = 32.0;
