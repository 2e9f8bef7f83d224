use crate::error::SessionError;
use crate::types::Viewport;

/// The presentation side of a session: event polling, close requests and
/// buffer swaps.
///
/// Implemented by [`GlWindow`](crate::window::GlWindow) for real windows and by
/// `HeadlessSurface` (behind the `testing` feature) for tests.
pub trait Surface {
    /// Drains pending window-system events without blocking.
    fn poll_events(&mut self);

    /// True once the user asked the window to close (close button or Escape).
    fn should_close(&self) -> bool;

    /// Swaps the back buffer onto the screen.
    fn present(&mut self) -> Result<(), SessionError>;

    /// New drawable size if the surface was resized since the last call.
    fn take_resize(&mut self) -> Option<Viewport> {
        None
    }
}
