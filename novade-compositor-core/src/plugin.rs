//! Rendering backend and plugin contracts, and the ordered plugin dispatch.

use bitflags::bitflags;
use tracing::{debug, info, warn};

use crate::error::{BackendError, PluginError};
use crate::extensions::Extensions;
use crate::protocol::{DisplayEvent, ScreenInfo};
use crate::region::Region;
use crate::registry::{WindowRef, WindowRegistry};
use crate::window::Window;

/// Everything a backend needs for one paint pass.
pub struct PaintFrame<'a> {
    /// The backend may keep private data in [`Window::rendering`].
    pub registry: &'a mut WindowRegistry,
    /// Windows to paint, bottom to top.
    pub windows: &'a [WindowRef],
    /// Screen area to repaint, unless `whole_session` is set.
    pub damaged: &'a Region,
    pub whole_session: bool,
}

/// Draws the composited screen.
///
/// Exactly one backend is active. All methods are called from the event loop
/// thread.
pub trait RenderingBackend {
    /// Name under which the backend is registered.
    fn name(&self) -> &str;

    /// Called before the display has been queried for its capabilities.
    ///
    /// # Errors
    ///
    /// A failure here is fatal to the compositing manager.
    fn initialize(&mut self, screen: &ScreenInfo) -> Result<(), BackendError>;

    /// Called once extension replies have been collected.
    fn finalize_initialize(&mut self) -> Result<(), BackendError>;

    /// The root window changed size; the background must be rebuilt.
    fn reset_background(&mut self, screen: &ScreenInfo);

    /// Paints the given windows.
    fn paint(&mut self, frame: PaintFrame<'_>);

    /// Drops whatever the backend keeps for `window`. Called exactly once per
    /// window, when it stops being tracked.
    fn release_window(&mut self, window: &mut Window);
}

bitflags! {
    /// Optional hooks a plugin implements.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PluginCapabilities: u32 {
        const SUPPLY_WINDOW_LIST = 1 << 0;
        const PAINT = 1 << 1;
        const EVENTS = 1 << 2;
        const MANAGE_EXISTING = 1 << 3;
    }
}

/// Extension point run alongside the rendering backend.
///
/// Only the hooks announced through [`Plugin::capabilities`] are called;
/// the others keep their default no-op bodies.
pub trait Plugin {
    fn name(&self) -> &str;

    fn capabilities(&self) -> PluginCapabilities;

    fn initialize(&mut self, _screen: &ScreenInfo) -> Result<(), PluginError> {
        Ok(())
    }

    fn finalize_initialize(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Whether the plugin can work with what the display offers. Failing
    /// plugins are disabled, not removed.
    fn check_requirements(&mut self, _extensions: &Extensions) -> bool {
        true
    }

    /// Windows to paint instead of the whole stack. `None` or an empty list
    /// leaves the choice to the next plugin.
    fn supply_window_list(&mut self, _registry: &WindowRegistry) -> Option<Vec<WindowRef>> {
        None
    }

    /// Called after the backend painted `windows`.
    fn paint(&mut self, _registry: &WindowRegistry, _windows: &[WindowRef]) {}

    /// Called after the compositor handled `event`.
    fn on_event(&mut self, _event: &DisplayEvent, _registry: &WindowRegistry) {}

    /// Called once the pre-existing windows are tracked.
    fn manage_existing(&mut self, _registry: &WindowRegistry) {}

    fn unload(&mut self) {}
}

struct PluginEntry {
    plugin: Box<dyn Plugin>,
    enabled: bool,
    initialized: bool,
}

/// Loaded plugins in registration order.
#[derive(Default)]
pub struct PluginDispatch {
    entries: Vec<PluginEntry>,
}

impl PluginDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        debug!(plugin = plugin.name(), "Plugin registered");
        self.entries.push(PluginEntry {
            plugin,
            enabled: true,
            initialized: false,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.plugin.name()).collect()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.enabled && e.plugin.name() == name)
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) {
        for entry in self.entries.iter_mut().filter(|e| e.plugin.name() == name) {
            entry.enabled = enabled && entry.initialized;
        }
    }

    fn enabled_with(&mut self, capability: PluginCapabilities) -> impl Iterator<Item = &mut PluginEntry> {
        self.entries
            .iter_mut()
            .filter(move |e| e.enabled && e.plugin.capabilities().contains(capability))
    }

    /// Initializes every plugin; a failing one is disabled.
    pub fn initialize_all(&mut self, screen: &ScreenInfo) {
        for entry in &mut self.entries {
            match entry.plugin.initialize(screen) {
                Ok(()) => entry.initialized = true,
                Err(e) => {
                    warn!(plugin = entry.plugin.name(), error = %e, "Plugin disabled");
                    entry.enabled = false;
                }
            }
        }
    }

    pub fn finalize_initialize_all(&mut self) {
        for entry in self.entries.iter_mut().filter(|e| e.enabled) {
            if let Err(e) = entry.plugin.finalize_initialize() {
                warn!(plugin = entry.plugin.name(), error = %e, "Plugin disabled");
                entry.enabled = false;
                entry.initialized = false;
            }
        }
    }

    /// Disables every enabled plugin whose requirements are not met.
    pub fn check_requirements(&mut self, extensions: &Extensions) {
        for entry in self.entries.iter_mut().filter(|e| e.enabled) {
            if !entry.plugin.check_requirements(extensions) {
                warn!(plugin = entry.plugin.name(), "Plugin requirements not met, plugin disabled");
                entry.enabled = false;
            }
        }
    }

    /// Re-runs the requirement checks of plugins disabled by them. Plugins that
    /// failed to initialize stay disabled.
    pub fn recheck_disabled(&mut self, extensions: &Extensions) {
        for entry in self.entries.iter_mut().filter(|e| !e.enabled && e.initialized) {
            if entry.plugin.check_requirements(extensions) {
                info!(plugin = entry.plugin.name(), "Plugin requirements now met, plugin enabled");
                entry.enabled = true;
            }
        }
    }

    /// Picks the windows to paint: the first non-empty list supplied by an
    /// enabled plugin, otherwise the whole stack.
    pub fn select_window_list(&mut self, registry: &WindowRegistry) -> Vec<WindowRef> {
        for entry in self.enabled_with(PluginCapabilities::SUPPLY_WINDOW_LIST) {
            match entry.plugin.supply_window_list(registry) {
                Some(list) if !list.is_empty() => {
                    debug!(plugin = entry.plugin.name(), windows = list.len(), "Plugin supplied window list");
                    return list;
                }
                _ => continue,
            }
        }
        registry.stacking_order()
    }

    pub fn paint(&mut self, registry: &WindowRegistry, windows: &[WindowRef]) {
        for entry in self.enabled_with(PluginCapabilities::PAINT) {
            entry.plugin.paint(registry, windows);
        }
    }

    pub fn notify(&mut self, event: &DisplayEvent, registry: &WindowRegistry) {
        for entry in self.enabled_with(PluginCapabilities::EVENTS) {
            entry.plugin.on_event(event, registry);
        }
    }

    pub fn manage_existing(&mut self, registry: &WindowRegistry) {
        for entry in self.enabled_with(PluginCapabilities::MANAGE_EXISTING) {
            entry.plugin.manage_existing(registry);
        }
    }

    /// Unloads every plugin, in registration order.
    pub fn unload_all(&mut self) {
        for mut entry in self.entries.drain(..) {
            debug!(plugin = entry.plugin.name(), "Unloading plugin");
            entry.plugin.unload();
        }
    }
}
