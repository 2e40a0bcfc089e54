//! Rendering backend that keeps the books without drawing anything.
//!
//! Useful for running the compositing manager against a display server that
//! renders on its own, and for exercising the compositor without a GPU.

use novade_compositor_core::error::BackendError;
use novade_compositor_core::plugin::{PaintFrame, RenderingBackend};
use novade_compositor_core::protocol::{Geometry, ScreenInfo};
use novade_compositor_core::window::Window;
use tracing::{debug, trace};

pub const NAME: &str = "headless";

/// Per-window state kept in [`Window::rendering`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessSurface {
    pub paints: u64,
    pub geometry: Geometry,
}

#[derive(Debug, Default)]
pub struct HeadlessBackend {
    screen: Option<ScreenInfo>,
    finalized: bool,
    frames: u64,
    background_generation: u64,
    released: u64,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn background_generation(&self) -> u64 {
        self.background_generation
    }

    pub fn released(&self) -> u64 {
        self.released
    }

    pub fn surface(window: &Window) -> Option<&HeadlessSurface> {
        window.rendering.as_ref()?.downcast_ref::<HeadlessSurface>()
    }
}

impl RenderingBackend for HeadlessBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn initialize(&mut self, screen: &ScreenInfo) -> Result<(), BackendError> {
        if screen.width == 0 || screen.height == 0 {
            return Err(BackendError::Initialization {
                backend: NAME.to_string(),
                reason: format!("screen has no area ({}x{})", screen.width, screen.height),
            });
        }
        self.screen = Some(*screen);
        Ok(())
    }

    fn finalize_initialize(&mut self) -> Result<(), BackendError> {
        if self.screen.is_none() {
            return Err(BackendError::FinalizeInitialization {
                backend: NAME.to_string(),
                reason: "backend was never initialized".to_string(),
            });
        }
        self.finalized = true;
        debug!(backend = NAME, "Rendering backend ready");
        Ok(())
    }

    fn reset_background(&mut self, screen: &ScreenInfo) {
        self.screen = Some(*screen);
        self.background_generation += 1;
        debug!(width = screen.width, height = screen.height, "Background reset");
    }

    fn paint(&mut self, frame: PaintFrame<'_>) {
        self.frames += 1;
        for handle in frame.windows {
            let Some(window) = frame.registry.get_mut(*handle) else {
                continue;
            };
            let geometry = window.geometry;
            match window
                .rendering
                .as_mut()
                .and_then(|data| data.downcast_mut::<HeadlessSurface>())
            {
                Some(surface) => {
                    surface.paints += 1;
                    surface.geometry = geometry;
                }
                None => window.rendering = Some(Box::new(HeadlessSurface { paints: 1, geometry })),
            }
        }
        trace!(
            frame = self.frames,
            windows = frame.windows.len(),
            rectangles = frame.damaged.rectangles().len(),
            whole_session = frame.whole_session,
            "Frame accounted"
        );
    }

    fn release_window(&mut self, window: &mut Window) {
        if window.rendering.take().is_some() {
            self.released += 1;
        }
    }
}
