//! Seam between the session and the native graphics binding.
//!
//! - `gl` implements [`GraphicsDriver`] on top of `glow` for both desktop GL
//!   and GLES contexts.
//! - `recording` (tests and the `testing` feature) implements it without a
//!   GPU, counting object creation/deletion so leaks are observable.
//!
//! Handles are plain non-zero object names, so programs and stages can live in
//! the shared, lock-guarded registry regardless of which driver produced them.

mod gl;
#[cfg(any(test, feature = "testing"))]
pub(crate) mod recording;

use std::num::NonZeroU32;

use crate::error::SessionError;
use crate::types::{StageKind, Viewport};

pub use gl::GlowDriver;

/// Name of one compiled shader stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageHandle(pub(crate) NonZeroU32);

/// Name of one linked program object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) NonZeroU32);

impl StageHandle {
    pub fn raw(self) -> u32 {
        self.0.get()
    }
}

impl ProgramHandle {
    pub fn raw(self) -> u32 {
        self.0.get()
    }
}

/// Vertex array plus the two buffers backing the full-screen quad.
#[derive(Debug, PartialEq, Eq)]
pub struct QuadHandle {
    pub(crate) vertex_array: NonZeroU32,
    pub(crate) vertex_buffer: NonZeroU32,
    pub(crate) index_buffer: NonZeroU32,
}

/// Interleaved position (xyz) + colour (rgb) for the four corners, counter
/// clockwise from bottom left. Colour is unused by the stock shaders but kept
/// so vertex shaders can rely on the 6-float layout.
pub const QUAD_VERTICES: [f32; 24] = [
    -1.0, -1.0, 0.0, 0.0, 0.0, 0.0, //
    1.0, -1.0, 0.0, 0.0, 0.0, 0.0, //
    1.0, 1.0, 0.0, 0.0, 0.0, 0.0, //
    -1.0, 1.0, 0.0, 0.0, 0.0, 0.0, //
];

/// Drawn as a triangle fan.
pub const QUAD_INDICES: [u32; 4] = [0, 1, 2, 3];

/// Byte stride of one interleaved vertex.
pub const VERTEX_STRIDE: i32 = 6 * std::mem::size_of::<f32>() as i32;

/// Operations the render session needs from a graphics binding.
///
/// Every method must be called from the thread the underlying context is
/// current on; the session enforces this by never leaving its owning thread.
pub trait GraphicsDriver {
    fn create_stage(&self, stage: StageKind) -> Result<StageHandle, SessionError>;

    /// Uploads and compiles `source`. `Err` carries the driver's info log.
    fn compile_stage(&self, stage: StageHandle, source: &str) -> Result<(), String>;

    fn delete_stage(&self, stage: StageHandle);

    fn create_program(&self) -> Result<ProgramHandle, SessionError>;

    fn attach_stage(&self, program: ProgramHandle, stage: StageHandle);

    /// Links the attached stages. `Err` carries the driver's info log.
    fn link_program(&self, program: ProgramHandle) -> Result<(), String>;

    fn delete_program(&self, program: ProgramHandle);

    fn use_program(&self, program: Option<ProgramHandle>);

    /// Returns `false` when `program` declares no active uniform named `name`.
    fn set_uniform_f32(&self, program: ProgramHandle, name: &str, value: f32) -> bool;

    /// Returns `false` when `program` declares no active uniform named `name`.
    fn set_uniform_vec2(&self, program: ProgramHandle, name: &str, value: [f32; 2]) -> bool;

    fn create_quad(&self, vertices: &[f32], indices: &[u32]) -> Result<QuadHandle, SessionError>;

    /// Draws `index_count` indices of `quad` as a triangle fan.
    fn draw_quad(&self, quad: &QuadHandle, index_count: i32);

    fn delete_quad(&self, quad: QuadHandle);

    fn set_viewport(&self, viewport: Viewport);

    fn clear(&self, color: [f32; 4]);

    /// Reads the colour buffer back as tightly packed RGBA rows, bottom row
    /// first.
    fn read_pixels(&self, viewport: Viewport) -> Result<Vec<u8>, SessionError>;

    /// Pops the oldest pending driver error code, if any.
    fn last_error(&self) -> Option<u32>;
}
