//! Native window and GL context for a render session.
//!
//! `winit` provides the window and event loop, `glutin` the context and
//! window surface, and the loaded entry points are handed to [`GlowDriver`].
//! The event loop is built with `with_any_thread` so the whole stack can live
//! on the scheduler's render thread instead of `main`.
use std::ffi::CString;
use std::num::NonZeroU32;
use std::time::Duration;

use glutin::config::{Api, ConfigTemplateBuilder};
use glutin::context::{ContextApi, ContextAttributesBuilder, PossiblyCurrentContext, Version};
use glutin::display::GetGlDisplay;
use glutin::prelude::*;
use glutin::surface::{Surface as GlutinSurface, SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use glutin_winit::DisplayBuilder;
use raw_window_handle::HasRawWindowHandle;
use tracing::{debug, info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{EventLoop, EventLoopBuilder};
use winit::keyboard::{Key, NamedKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowBuilder};

use crate::driver::GlowDriver;
use crate::error::SessionError;
use crate::surface::Surface;
use crate::types::{GlApi, SessionConfig, Viewport};

/// A visible window with a current GL context.
///
/// Fields drop top to bottom: the GL surface goes before the context, and both
/// go before the window and event loop they were created from.
pub struct GlWindow {
    surface: GlutinSurface<WindowSurface>,
    context: PossiblyCurrentContext,
    window: Window,
    event_loop: EventLoop<()>,
    close_requested: bool,
    pending_resize: Option<Viewport>,
}

/// Opens the window described by `config`, makes its context current on the
/// calling thread and loads the GL binding for it.
pub fn open(config: &SessionConfig) -> Result<(GlowDriver, GlWindow), SessionError> {
    let event_loop = build_event_loop()?;

    let viewport = config.viewport;
    let window_builder = WindowBuilder::new()
        .with_title(config.title.clone())
        .with_inner_size(PhysicalSize::new(viewport.width, viewport.height))
        .with_resizable(false);

    let mut template = ConfigTemplateBuilder::new().with_alpha_size(8);
    if config.api == GlApi::Embedded {
        template = template.with_api(Api::GLES3);
    }

    let (window, gl_config) = DisplayBuilder::new()
        .with_window_builder(Some(window_builder))
        .build(&event_loop, template, |configs| {
            configs
                .reduce(|best, candidate| {
                    if candidate.num_samples() > best.num_samples() {
                        candidate
                    } else {
                        best
                    }
                })
                // glutin-winit only calls the picker with the result of a
                // successful `find_configs`, which fails with `BadConfig` when
                // nothing matches the template
                .expect("display offered no GL configs")
        })
        .map_err(|err| SessionError::init("GL display", err))?;
    let window = window.ok_or_else(|| SessionError::init("window", "no window was created"))?;

    let raw_window_handle = window.raw_window_handle();
    let gl_display = gl_config.display();

    let context_api = match config.api {
        GlApi::Desktop => ContextApi::OpenGl(Some(Version::new(3, 3))),
        GlApi::Embedded => ContextApi::Gles(Some(Version::new(3, 0))),
    };
    let context_attributes = ContextAttributesBuilder::new()
        .with_context_api(context_api)
        .build(Some(raw_window_handle));
    let not_current = unsafe { gl_display.create_context(&gl_config, &context_attributes) }
        .map_err(|err| SessionError::init("GL context", err))?;

    let (width, height) = non_zero_size(viewport)?;
    let surface_attributes =
        SurfaceAttributesBuilder::<WindowSurface>::new().build(raw_window_handle, width, height);
    let surface = unsafe { gl_display.create_window_surface(&gl_config, &surface_attributes) }
        .map_err(|err| SessionError::init("GL surface", err))?;

    let context = not_current
        .make_current(&surface)
        .map_err(|err| SessionError::init("GL context", err))?;

    if let Err(err) = surface.set_swap_interval(&context, SwapInterval::Wait(NonZeroU32::MIN)) {
        debug!("vsync unavailable: {err}");
    }

    let driver = unsafe {
        GlowDriver::from_loader(config.api, |symbol| match CString::new(symbol) {
            Ok(symbol) => gl_display.get_proc_address(&symbol),
            Err(_) => std::ptr::null(),
        })
    };
    info!(
        api = %config.api,
        version = %driver.version_string(),
        width = viewport.width,
        height = viewport.height,
        "opened render window"
    );

    Ok((
        driver,
        GlWindow {
            surface,
            context,
            window,
            event_loop,
            close_requested: false,
            pending_resize: None,
        },
    ))
}

fn build_event_loop() -> Result<EventLoop<()>, SessionError> {
    let mut builder = EventLoopBuilder::new();
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use winit::platform::wayland::EventLoopBuilderExtWayland;
        EventLoopBuilderExtWayland::with_any_thread(&mut builder, true);
    }

    #[cfg(any(
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        use winit::platform::x11::EventLoopBuilderExtX11;
        EventLoopBuilderExtX11::with_any_thread(&mut builder, true);
    }
    builder
        .build()
        .map_err(|err| SessionError::init("event loop", err))
}

fn non_zero_size(viewport: Viewport) -> Result<(NonZeroU32, NonZeroU32), SessionError> {
    match (
        NonZeroU32::new(viewport.width),
        NonZeroU32::new(viewport.height),
    ) {
        (Some(width), Some(height)) => Ok((width, height)),
        _ => Err(SessionError::init(
            "GL surface",
            format!("invalid size {}x{}", viewport.width, viewport.height),
        )),
    }
}

impl GlWindow {
    pub fn window(&self) -> &Window {
        &self.window
    }
}

impl Surface for GlWindow {
    fn poll_events(&mut self) {
        let mut close = false;
        let mut resized = None;
        let status = self
            .event_loop
            .pump_events(Some(Duration::ZERO), |event, _target| {
                if let Event::WindowEvent { event, .. } = event {
                    match event {
                        WindowEvent::CloseRequested => close = true,
                        WindowEvent::KeyboardInput {
                            event:
                                KeyEvent {
                                    logical_key: Key::Named(NamedKey::Escape),
                                    state: ElementState::Pressed,
                                    ..
                                },
                            ..
                        } => close = true,
                        WindowEvent::Resized(size) => resized = Some(size),
                        _ => {}
                    }
                }
            });
        if let PumpStatus::Exit(code) = status {
            debug!(code, "event loop exited");
            close = true;
        }

        if let Some(size) = resized {
            if let (Some(width), Some(height)) =
                (NonZeroU32::new(size.width), NonZeroU32::new(size.height))
            {
                self.surface.resize(&self.context, width, height);
                self.pending_resize = Some(Viewport::new(size.width, size.height));
            }
        }
        if close && !self.close_requested {
            info!("window close requested");
            self.close_requested = true;
        }
    }

    fn should_close(&self) -> bool {
        self.close_requested
    }

    fn present(&mut self) -> Result<(), SessionError> {
        self.surface.swap_buffers(&self.context).map_err(|err| {
            warn!("buffer swap failed: {err}");
            SessionError::Driver(format!("failed to present frame: {err}"))
        })
    }

    fn take_resize(&mut self) -> Option<Viewport> {
        self.pending_resize.take()
    }
}
