//! GPU-free stand-ins for driving a [`RenderSession`](crate::RenderSession) in
//! tests, here and in downstream crates.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::SessionError;
use crate::surface::Surface;
use crate::types::Viewport;

pub use crate::driver::recording::{
    DrawCall, DriverLog, RecordingDriver, UniformValue, COMPILE_ERROR_MARKER, LINK_ERROR_MARKER,
};

#[derive(Debug, Default)]
struct HeadlessCounters {
    close: AtomicBool,
    polls: AtomicUsize,
    presents: AtomicUsize,
}

/// [`Surface`] without a window. Clones share state, so a test can keep one
/// copy to request a close or count presented frames while the session owns
/// the other.
#[derive(Debug, Clone, Default)]
pub struct HeadlessSurface {
    counters: Arc<HeadlessCounters>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Behaves like the user pressing Escape.
    pub fn request_close(&self) {
        self.counters.close.store(true, Ordering::SeqCst);
    }

    pub fn presented(&self) -> usize {
        self.counters.presents.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.counters.polls.load(Ordering::SeqCst)
    }
}

impl Surface for HeadlessSurface {
    fn poll_events(&mut self) {
        self.counters.polls.fetch_add(1, Ordering::SeqCst);
    }

    fn should_close(&self) -> bool {
        self.counters.close.load(Ordering::SeqCst)
    }

    fn present(&mut self) -> Result<(), SessionError> {
        self.counters.presents.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn take_resize(&mut self) -> Option<Viewport> {
        None
    }
}
