//! Renderer crate for quadloop.
//!
//! Draws a full-screen quad with one of several named GLSL programs, with hot
//! reload of the active program on every frame. The overall flow is:
//!
//! ```text
//!   scheduler thread
//!          │ SessionConfig + SharedState
//!          ▼
//!   RenderSession::create ──▶ window::open ──▶ winit + glutin + glow
//!          │
//!          ├─▶ attach_shader(key, file) ──▶ ShaderSource ──▶ ShaderProgram
//!          │
//!          └─▶ tick() ──▶ reload_current() ──▶ run_frame() ──▶ present
//!                              ▲                    ▲
//!                              └──── SharedState ───┘
//!                          {programs, current key, uniforms}
//! ```
//!
//! `RenderSession` owns the context and is pinned to the thread that built
//! it. Other threads reach it only through [`SharedState`]: writing uniforms
//! and selecting which shader is drawn. All GL traffic goes through the
//! [`GraphicsDriver`] trait so the session logic can be exercised without a
//! GPU (see the `testing` feature).

pub mod driver;
mod error;
mod program;
mod session;
mod source;
mod state;
mod surface;
mod types;
pub mod window;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use driver::{GlowDriver, GraphicsDriver, ProgramHandle, QuadHandle, StageHandle};
pub use error::{ErrorKind, SessionError};
pub use program::{ShaderProgram, RESOLUTION_UNIFORM};
pub use session::{FrameOutcome, RenderSession};
pub use source::ShaderSource;
pub use state::{RenderState, SharedState, UniformSet};
pub use surface::Surface;
pub use types::{GlApi, SessionConfig, ShaderEntry, ShaderKey, StageKind, Viewport};
pub use window::GlWindow;
