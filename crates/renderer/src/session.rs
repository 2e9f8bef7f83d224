use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::thread::{self, ThreadId};

use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::driver::{GlowDriver, GraphicsDriver, QuadHandle, QUAD_INDICES, QUAD_VERTICES};
use crate::error::{ErrorKind, SessionError};
use crate::program::ShaderProgram;
use crate::source::ShaderSource;
use crate::state::SharedState;
use crate::surface::Surface;
use crate::types::{SessionConfig, ShaderEntry, ShaderKey, Viewport};
use crate::window::{self, GlWindow};

/// Result of one [`RenderSession::tick`].
#[derive(Debug)]
pub enum FrameOutcome {
    /// A frame was drawn and presented.
    Presented,
    /// The surface asked to close; stop without reporting an error.
    ShouldStop,
    /// Hot reload hit a compile, link or missing-source error. The frame was
    /// still drawn with the last good pipeline.
    ShaderFault(SessionError),
    /// Rendering cannot continue.
    Fatal(SessionError),
}

/// Marks the thread that owns the graphics context.
///
/// Holding a raw pointer marker makes the session `!Send`, so the compiler
/// keeps it on the thread it was built on.
#[derive(Debug)]
struct ContextAffinity {
    owner: ThreadId,
    _not_send: PhantomData<*const ()>,
}

impl ContextAffinity {
    fn claim() -> Self {
        Self {
            owner: thread::current().id(),
            _not_send: PhantomData,
        }
    }

    fn verify(&self) {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "graphics context used off its owning thread"
        );
    }
}

/// Owns the graphics context, the window surface and the quad, and draws the
/// current shader from the shared registry.
///
/// Must stay on the thread that created it. Everything other threads may touch
/// lives in the [`SharedState`] returned by [`RenderSession::shared`].
pub struct RenderSession<D: GraphicsDriver = GlowDriver, S: Surface = GlWindow> {
    driver: D,
    surface: S,
    quad: Option<QuadHandle>,
    viewport: Viewport,
    shader_root: PathBuf,
    clear_color: [f32; 4],
    state: SharedState,
    capture_armed: bool,
    captured: Option<RgbaImage>,
    affinity: Option<ContextAffinity>,
}

impl RenderSession<GlowDriver, GlWindow> {
    /// Opens a window with a current GL context and prepares it for drawing.
    pub fn create(config: &SessionConfig, state: SharedState) -> Result<Self, SessionError> {
        let (driver, surface) = window::open(config)?;
        Self::from_parts(driver, surface, config, state)
    }
}

impl<D: GraphicsDriver, S: Surface> RenderSession<D, S> {
    /// Assembles a session around an already initialised driver and surface.
    pub fn from_parts(
        driver: D,
        surface: S,
        config: &SessionConfig,
        state: SharedState,
    ) -> Result<Self, SessionError> {
        let quad = driver
            .create_quad(&QUAD_VERTICES, &QUAD_INDICES)
            .map_err(|err| SessionError::init("quad geometry", err))?;
        driver.set_viewport(config.viewport);
        debug!(
            root = %config.shader_root.display(),
            width = config.viewport.width,
            height = config.viewport.height,
            "render session ready"
        );

        Ok(Self {
            driver,
            surface,
            quad: Some(quad),
            viewport: config.viewport,
            shader_root: config.shader_root.clone(),
            clear_color: config.clear_color,
            state,
            capture_armed: false,
            captured: None,
            affinity: Some(ContextAffinity::claim()),
        })
    }

    pub fn shared(&self) -> &SharedState {
        &self.state
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn shader_root(&self) -> &Path {
        &self.shader_root
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Compiles `<root>/<filename>.{vert,frag}` and registers it under `key`.
    ///
    /// The first shader attached becomes current. Meant to be called before
    /// the render loop starts.
    pub fn attach_shader(
        &mut self,
        key: impl Into<ShaderKey>,
        filename: &str,
    ) -> Result<(), SessionError> {
        let key = key.into();
        if key.is_empty() {
            return Err(SessionError::InvalidKey);
        }
        self.ensure_live()?;
        if self.state.read().contains(key.as_str()) {
            return Err(SessionError::DuplicateKey(key));
        }

        let source = ShaderSource::resolve(&self.shader_root, filename)?;
        let path = source.base().to_path_buf();
        let mut program = ShaderProgram::build(&self.driver, source)?;

        let mut state = self.state.write();
        if state.contains(key.as_str()) {
            drop(state);
            program.delete(&self.driver);
            return Err(SessionError::DuplicateKey(key));
        }
        state.insert(key.clone(), program)?;
        info!(key = %key, path = %path.display(), "attached shader");
        Ok(())
    }

    /// Attaches every entry in order, stopping at the first failure.
    pub fn attach_shaders(&mut self, entries: &[ShaderEntry]) -> Result<(), SessionError> {
        for entry in entries {
            self.attach_shader(entry.key.clone(), &entry.file)?;
        }
        Ok(())
    }

    /// Makes `key` the shader drawn by subsequent frames.
    pub fn select_shader(&self, key: &str) -> Result<(), SessionError> {
        self.state.select(key)?;
        debug!(key, "selected shader");
        Ok(())
    }

    /// Rebuilds the current shader from disk.
    ///
    /// Holds the exclusive lock for the rebuild, so no frame can draw a
    /// half-replaced program. A failed rebuild leaves the previous pipeline in
    /// place.
    pub fn reload_current(&mut self) -> Result<(), SessionError> {
        self.ensure_live()?;
        let mut state = self.state.write();
        let key = state.current().cloned().ok_or(SessionError::NothingSelected)?;
        let program = state
            .program_mut(key.as_str())
            .ok_or_else(|| SessionError::UnknownShader(key.clone()))?;
        program.reload(&self.driver)
    }

    /// Polls events, clears, draws the current shader and presents.
    pub fn run_frame(&mut self) -> Result<(), SessionError> {
        self.ensure_live()?;
        self.surface.poll_events();
        if let Some(viewport) = self.surface.take_resize() {
            debug!(width = viewport.width, height = viewport.height, "surface resized");
            self.viewport = viewport;
            self.driver.set_viewport(viewport);
        }
        self.driver.clear(self.clear_color);
        if self.surface.should_close() {
            return Err(SessionError::ShouldClose);
        }

        self.draw_current()?;
        if self.capture_armed {
            self.capture_armed = false;
            match self.capture_frame() {
                Ok(image) => self.captured = Some(image),
                Err(err) => warn!("frame capture failed: {err}"),
            }
        }
        self.surface.present()
    }

    fn draw_current(&self) -> Result<(), SessionError> {
        let quad = self
            .quad
            .as_ref()
            .ok_or_else(|| SessionError::Driver("quad geometry was released".into()))?;
        let state = self.state.read();
        let key = state.current().ok_or(SessionError::NothingSelected)?;
        let program = state
            .program(key.as_str())
            .ok_or_else(|| SessionError::UnknownShader(key.clone()))?;
        program.run(&self.driver, quad, self.viewport.resolution(), state.uniforms())
    }

    /// Reloads the current shader and draws one frame, classifying any
    /// failure.
    pub fn tick(&mut self) -> FrameOutcome {
        let fault = match self.reload_current() {
            Ok(()) => None,
            Err(err) if err.is_shader_fault() => Some(err),
            Err(err) => return classify(err),
        };
        match self.run_frame() {
            Ok(()) => match fault {
                Some(err) => FrameOutcome::ShaderFault(err),
                None => FrameOutcome::Presented,
            },
            Err(err) => classify(err),
        }
    }

    /// Reads back what has been drawn so far this frame, top row first.
    pub fn capture_frame(&self) -> Result<RgbaImage, SessionError> {
        self.ensure_live()?;
        let viewport = self.viewport;
        let pixels = self.driver.read_pixels(viewport)?;
        let mut image = RgbaImage::from_raw(viewport.width, viewport.height, pixels)
            .ok_or_else(|| SessionError::Driver("pixel read-back returned a short buffer".into()))?;
        // GL rows start at the bottom
        image::imageops::flip_vertical_in_place(&mut image);
        Ok(image)
    }

    /// Captures the next frame drawn by [`run_frame`](Self::run_frame) before
    /// it is presented. Collect it with [`take_capture`](Self::take_capture).
    pub fn capture_next_frame(&mut self) {
        self.capture_armed = true;
    }

    pub fn take_capture(&mut self) -> Option<RgbaImage> {
        self.captured.take()
    }

    /// True while a requested capture has not been attempted yet.
    pub fn capture_pending(&self) -> bool {
        self.capture_armed
    }

    /// Deletes every program and the quad and gives up the context claim.
    /// Safe to call repeatedly; also runs on drop.
    pub fn cleanup(&mut self) {
        let Some(affinity) = self.affinity.take() else {
            return;
        };
        affinity.verify();

        let programs = self.state.write().drain_programs();
        for (key, mut program) in programs {
            program.delete(&self.driver);
            debug!(key = %key, "deleted shader program");
        }
        if let Some(quad) = self.quad.take() {
            self.driver.delete_quad(quad);
        }
        self.capture_armed = false;
        self.captured = None;
        info!("render session cleaned up");
    }

    fn ensure_live(&self) -> Result<(), SessionError> {
        match &self.affinity {
            Some(affinity) => {
                affinity.verify();
                Ok(())
            }
            None => Err(SessionError::Driver(
                "render session has been cleaned up".into(),
            )),
        }
    }
}

impl<D: GraphicsDriver, S: Surface> Drop for RenderSession<D, S> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn classify(err: SessionError) -> FrameOutcome {
    match err.kind() {
        ErrorKind::ShouldClose => FrameOutcome::ShouldStop,
        ErrorKind::Compile | ErrorKind::Link | ErrorKind::Resolution => {
            FrameOutcome::ShaderFault(err)
        }
        _ => FrameOutcome::Fatal(err),
    }
}
