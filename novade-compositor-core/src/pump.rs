//! Event draining and dispatch.
//!
//! [`Compositor::drain_events`] handles every event that can be obtained
//! without waiting. During startup it drains until the connection runs dry and
//! treats protocol errors as fatal. In steady state it stops reading the
//! connection once the repaint interval is nearly used up and then only
//! drains what is already buffered, so painting is never delayed by an event
//! source that keeps refilling.

use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::compositor::Compositor;
use crate::error::{CompositorError, TransportError};
use crate::protocol::{
    DamageId, DisplayEvent, ErrorCode, Geometry, MapState, ProtocolError, StackPlace, Timestamp, WindowId,
};
use crate::registry::WindowRef;
use crate::transport::Transport;

/// Safety margin subtracted from the repaint interval when draining.
pub const DRAIN_EPSILON: Duration = Duration::from_millis(1);

/// Root window properties naming the background pixmap.
pub const BACKGROUND_ATOMS: &[&str] = &["_XROOTPMAP_ID", "_XSETROOT_ID", "ESETROOT_PMAP_ID"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainMode {
    /// Before painting starts: drain everything, protocol errors are fatal.
    Startup,
    /// While painting: bounded by the repaint interval, protocol errors are logged.
    Steady,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Events dispatched.
    pub handled: usize,
    /// Whether reading stopped because the repaint interval ran out.
    pub budget_exhausted: bool,
}

impl<T: Transport> Compositor<T> {
    /// Dispatches every event available without waiting.
    ///
    /// # Errors
    ///
    /// A broken connection is always fatal, as is any protocol error in
    /// [`DrainMode::Startup`].
    pub fn drain_events(&mut self, mode: DrainMode) -> Result<DrainReport, CompositorError> {
        let started = Instant::now();
        let budget = self.scheduler.repaint_interval();
        let mut report = DrainReport::default();
        let mut reading = true;

        loop {
            if !self.transport.is_connected() {
                return Err(TransportError::Disconnected.into());
            }
            if reading && mode == DrainMode::Steady && started.elapsed() + DRAIN_EPSILON > budget {
                trace!(handled = report.handled, "Repaint interval reached, draining buffered events only");
                reading = false;
                report.budget_exhausted = true;
            }
            let event = if reading {
                self.transport.poll_for_event()?
            } else {
                self.transport.poll_for_queued_event()
            };
            let Some(event) = event else {
                break;
            };
            self.dispatch_event(event, mode)?;
            report.handled += 1;
        }
        Ok(report)
    }

    fn dispatch_event(&mut self, event: DisplayEvent, mode: DrainMode) -> Result<(), CompositorError> {
        trace!(kind = event.kind(), window = ?event.window(), "Dispatching event");
        let removes_window = match &event {
            DisplayEvent::Destroy { .. } => true,
            DisplayEvent::Reparent { parent, window, .. } => {
                *parent != self.screen.root && self.registry.lookup(*window).is_some()
            }
            _ => false,
        };
        // Plugins may still reference a window that is about to go away.
        if removes_window {
            self.plugins.notify(&event, &self.registry);
        }

        match &event {
            DisplayEvent::Error(error) => self.handle_protocol_error(error, mode)?,
            DisplayEvent::Damage(notify) => {
                if let Some(handle) = self.registry.lookup(notify.drawable) {
                    self.registry.sync_shape(handle, &mut self.transport)?;
                }
                let outcome = self.damage.window_damaged(&mut self.registry, notify);
                trace!(window = %notify.drawable, ?outcome, "Damage notification");
                if self.damage.is_damaged() {
                    self.scheduler.note_damage();
                }
            }
            DisplayEvent::Create {
                parent, window, geometry, ..
            } => {
                if *parent == self.screen.root && Some(*window) != self.ownership.proxy() {
                    self.registry.add(&mut self.transport, *window, Some(*geometry))?;
                }
            }
            DisplayEvent::Configure {
                window,
                above_sibling,
                geometry,
                override_redirect,
            } => self.handle_configure(*window, *above_sibling, *geometry, *override_redirect)?,
            DisplayEvent::Destroy { window } => self.handle_destroy(*window)?,
            DisplayEvent::Map {
                window,
                override_redirect,
            } => self.handle_map(*window, *override_redirect)?,
            DisplayEvent::Unmap { window } => self.handle_unmap(*window)?,
            DisplayEvent::Reparent { window, parent, .. } => self.handle_reparent(*window, *parent)?,
            DisplayEvent::Circulate { window, place } => self.handle_circulate(*window, *place),
            DisplayEvent::Property { window, atom, time, .. } => self.handle_property(*window, atom, *time)?,
            DisplayEvent::ScreenChange {
                root,
                width,
                height,
                refresh_rate,
            } => {
                if *root == self.screen.root {
                    debug!(width, height, ?refresh_rate, "Screen changed");
                    self.resize_screen(*width, *height);
                    self.scheduler.set_refresh_rate(*refresh_rate);
                }
            }
            DisplayEvent::Key { .. } | DisplayEvent::Button { .. } => {}
        }

        if !removes_window {
            self.plugins.notify(&event, &self.registry);
        }
        Ok(())
    }

    fn handle_protocol_error(&mut self, error: &ProtocolError, mode: DrainMode) -> Result<(), CompositorError> {
        match mode {
            DrainMode::Startup if error.code == ErrorCode::Access && error.request == "RedirectSubwindows" => {
                Err(CompositorError::RedirectionRefused)
            }
            DrainMode::Startup => Err(CompositorError::Startup(error.clone())),
            DrainMode::Steady => {
                warn!(%error, "Protocol error");
                Ok(())
            }
        }
    }

    fn damage_if_visible(&mut self, handle: WindowRef) {
        if self.registry.is_visible(handle) {
            self.damage.damage_window(&self.registry, handle);
            self.scheduler.note_damage();
        }
    }

    pub(crate) fn resize_screen(&mut self, width: u32, height: u32) {
        self.screen.width = width;
        self.screen.height = height;
        self.registry.set_screen_size(width, height);
        self.backend.reset_background(&self.screen);
        self.damage.add_damaged_region(None, true);
        self.scheduler.note_damage();
    }

    fn handle_configure(
        &mut self,
        window: WindowId,
        above_sibling: WindowId,
        geometry: Geometry,
        override_redirect: bool,
    ) -> Result<(), CompositorError> {
        if window == self.screen.root {
            self.resize_screen(geometry.width, geometry.height);
            return Ok(());
        }
        let Some(handle) = self.registry.lookup(window) else {
            return Ok(());
        };
        let was_visible = self.registry.is_visible(handle);
        self.damage_if_visible(handle);

        let Some(entry) = self.registry.get_mut(handle) else {
            return Ok(());
        };
        if was_visible {
            entry.damaged_ratio = entry.damaged_ratio.max(1.0);
        }
        let previous = entry.geometry;
        entry.geometry = geometry;
        entry.attributes.override_redirect = override_redirect;
        let viewable = entry.is_viewable();

        if previous.size_differs(&geometry) {
            if viewable {
                self.registry.refresh_pixmap(handle, &mut self.transport)?;
            }
            self.registry.request_shape(handle, &mut self.transport)?;
        }

        if above_sibling.is_none() {
            self.registry.lower_to_bottom(handle);
        } else {
            let sibling = self.registry.lookup(above_sibling);
            if sibling.is_none() {
                debug!(%window, sibling = %above_sibling, "Unknown sibling, raising window to the top");
            }
            self.registry.restack(handle, sibling);
        }

        self.registry.sync_shape(handle, &mut self.transport)?;
        self.damage_if_visible(handle);
        Ok(())
    }

    fn handle_destroy(&mut self, window: WindowId) -> Result<(), CompositorError> {
        let Some(handle) = self.registry.lookup(window) else {
            return Ok(());
        };
        self.damage_if_visible(handle);
        // The server frees the damage object together with the window.
        if let Some(entry) = self.registry.get_mut(handle) {
            entry.damage = DamageId::NONE;
        }
        self.registry.remove(handle, self.backend.as_mut(), &mut self.transport)?;
        Ok(())
    }

    fn handle_map(&mut self, window: WindowId, override_redirect: bool) -> Result<(), CompositorError> {
        let Some(handle) = self.registry.lookup(window) else {
            return Ok(());
        };
        if let Some(entry) = self.registry.get_mut(handle) {
            entry.attributes.map_state = MapState::Viewable;
            entry.attributes.override_redirect = override_redirect;
            entry.clear_damage();
        }
        self.registry.refresh_pixmap(handle, &mut self.transport)?;
        self.registry.request_shape(handle, &mut self.transport)?;
        Ok(())
    }

    fn handle_unmap(&mut self, window: WindowId) -> Result<(), CompositorError> {
        let Some(handle) = self.registry.lookup(window) else {
            return Ok(());
        };
        self.damage_if_visible(handle);
        if let Some(entry) = self.registry.get_mut(handle) {
            entry.attributes.map_state = MapState::Unmapped;
            entry.clear_damage();
        }
        self.registry.release_pixmap(handle, &mut self.transport)?;
        Ok(())
    }

    fn handle_reparent(&mut self, window: WindowId, parent: WindowId) -> Result<(), CompositorError> {
        if parent == self.screen.root {
            self.registry.add(&mut self.transport, window, None)?;
            return Ok(());
        }
        if let Some(handle) = self.registry.lookup(window) {
            self.damage_if_visible(handle);
            self.registry.remove(handle, self.backend.as_mut(), &mut self.transport)?;
        }
        Ok(())
    }

    fn handle_circulate(&mut self, window: WindowId, place: StackPlace) {
        let Some(handle) = self.registry.lookup(window) else {
            return;
        };
        match place {
            StackPlace::OnTop => self.registry.restack(handle, None),
            StackPlace::OnBottom => self.registry.lower_to_bottom(handle),
        }
        self.damage_if_visible(handle);
    }

    fn handle_property(&mut self, window: WindowId, atom: &str, time: Timestamp) -> Result<(), CompositorError> {
        if window == self.screen.root && BACKGROUND_ATOMS.contains(&atom) {
            debug!(atom, "New background pixmap set");
            self.backend.reset_background(&self.screen);
            self.damage.add_damaged_region(None, true);
            self.scheduler.note_damage();
        }
        self.ownership
            .handle_property_notify(&mut self.transport, window, atom, time)?;
        self.plugins.recheck_disabled(&self.extensions);
        Ok(())
    }
}
