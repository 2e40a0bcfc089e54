//! Plugin that restricts painting to windows actually on screen.

use novade_compositor_core::plugin::{Plugin, PluginCapabilities};
use novade_compositor_core::protocol::{DisplayEvent, ScreenInfo};
use novade_compositor_core::registry::{WindowRef, WindowRegistry};
use novade_compositor_core::error::PluginError;
use tracing::trace;

pub const NAME: &str = "visible";

#[derive(Debug, Default)]
pub struct VisiblePlugin {
    /// Number of windows left out of the last list.
    skipped: usize,
    events: u64,
}

impl VisiblePlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Plugin for VisiblePlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::SUPPLY_WINDOW_LIST | PluginCapabilities::EVENTS
    }

    fn initialize(&mut self, _screen: &ScreenInfo) -> Result<(), PluginError> {
        self.skipped = 0;
        self.events = 0;
        Ok(())
    }

    fn supply_window_list(&mut self, registry: &WindowRegistry) -> Option<Vec<WindowRef>> {
        let visible: Vec<WindowRef> = registry
            .iter()
            .filter(|(handle, _)| registry.is_visible(*handle))
            .map(|(handle, _)| handle)
            .collect();
        self.skipped = registry.len() - visible.len();
        trace!(visible = visible.len(), skipped = self.skipped, "Selected visible windows");
        Some(visible)
    }

    fn on_event(&mut self, _event: &DisplayEvent, _registry: &WindowRegistry) {
        self.events += 1;
    }
}
