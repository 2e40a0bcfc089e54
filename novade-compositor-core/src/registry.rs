//! Registry of tracked windows.
//!
//! Windows live in an arena of generation-checked slots. A `BTreeMap` indexes
//! them by id and an intrusive doubly linked list threaded through the windows
//! holds the bottom-to-top stacking order. Each window is owned by its slot
//! only; both structures refer to it through [`WindowRef`] handles.

use std::collections::BTreeMap;

use tracing::{debug, trace, warn};

use crate::error::TransportError;
use crate::plugin::RenderingBackend;
use crate::protocol::{
    DamageId, EventMask, Geometry, PixmapId, Request, ScreenInfo, ShapeInfo, WindowId, WindowInfo,
};
use crate::region::Region;
use crate::transport::{Cookie, Transport, TransportExt};
use crate::window::Window;

/// Stable handle to a window in the registry.
///
/// A handle outlives its window harmlessly: lookups through a stale handle
/// return `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowRef {
    index: u32,
    generation: u32,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    window: Option<Window>,
}

/// First half of [`WindowRegistry::request_add`]: the replies still in flight.
#[derive(Debug)]
#[must_use = "a pending add does nothing until finalized"]
pub struct PendingAdd {
    id: WindowId,
    info: Cookie<WindowInfo>,
    geometry: Option<Geometry>,
    shape: Option<Cookie<ShapeInfo>>,
}

impl PendingAdd {
    pub fn id(&self) -> WindowId {
        self.id
    }
}

#[derive(Debug)]
pub struct WindowRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    index: BTreeMap<WindowId, WindowRef>,
    bottom: Option<WindowRef>,
    top: Option<WindowRef>,
    screen: ScreenInfo,
    shape_supported: bool,
}

impl WindowRegistry {
    pub fn new(screen: ScreenInfo) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: BTreeMap::new(),
            bottom: None,
            top: None,
            screen,
            shape_supported: false,
        }
    }

    pub fn screen(&self) -> &ScreenInfo {
        &self.screen
    }

    pub fn set_screen_size(&mut self, width: u32, height: u32) {
        self.screen.width = width;
        self.screen.height = height;
    }

    /// Enables shape requests once the shape extension is known to be present.
    pub fn set_shape_supported(&mut self, supported: bool) {
        self.shape_supported = supported;
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn lookup(&self, id: WindowId) -> Option<WindowRef> {
        self.index.get(&id).copied()
    }

    pub fn get(&self, window: WindowRef) -> Option<&Window> {
        self.slots
            .get(window.index as usize)
            .filter(|slot| slot.generation == window.generation)
            .and_then(|slot| slot.window.as_ref())
    }

    pub fn get_mut(&mut self, window: WindowRef) -> Option<&mut Window> {
        self.slots
            .get_mut(window.index as usize)
            .filter(|slot| slot.generation == window.generation)
            .and_then(|slot| slot.window.as_mut())
    }

    /// Windows from bottom to top.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            registry: self,
            next: self.bottom,
        }
    }

    pub fn stacking_order(&self) -> Vec<WindowRef> {
        self.iter().map(|(r, _)| r).collect()
    }

    pub fn stacking_ids(&self) -> Vec<WindowId> {
        self.iter().map(|(_, w)| w.id).collect()
    }

    /// Stores `window` on top of the stack. Returns `None` if its id is
    /// already tracked.
    pub fn insert(&mut self, window: Window) -> Option<WindowRef> {
        if self.index.contains_key(&window.id) {
            return None;
        }
        let id = window.id;
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.window = Some(window);
                WindowRef {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    window: Some(window),
                });
                WindowRef { index, generation: 0 }
            }
        };
        self.index.insert(id, handle);
        self.link_above(handle, self.top);
        Some(handle)
    }

    /// Issues the requests needed to track `id`. `geometry` is used as is when
    /// the caller already knows it, otherwise it is fetched too.
    ///
    /// Returns `None` when the window is already tracked.
    pub fn request_add<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        id: WindowId,
        geometry: Option<Geometry>,
    ) -> Result<Option<PendingAdd>, TransportError> {
        if self.index.contains_key(&id) {
            trace!(window = %id, "Window already tracked, add ignored");
            return Ok(None);
        }
        let info = transport.get_window_info(id, geometry.is_none())?;
        let shape = if self.shape_supported {
            Some(transport.get_shape(id)?)
        } else {
            None
        };
        Ok(Some(PendingAdd { id, info, geometry, shape }))
    }

    /// Collects the replies of a [`PendingAdd`] and tracks the window.
    ///
    /// A window that vanished in the meantime is skipped and yields `None`.
    pub fn finalize_add<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        pending: PendingAdd,
    ) -> Result<Option<WindowRef>, TransportError> {
        let PendingAdd { id, info, geometry, shape } = pending;
        let info = match info.finalize(transport) {
            Ok(info) => info,
            Err(TransportError::Protocol(error)) => {
                debug!(window = %id, %error, "Window vanished before it could be tracked");
                if let Some(cookie) = shape {
                    Self::discard(transport, cookie)?;
                }
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let geometry = match geometry.or(info.geometry) {
            Some(geometry) if !self.index.contains_key(&id) => geometry,
            missing => {
                if missing.is_none() {
                    warn!(window = %id, "No geometry available for window, not tracking it");
                }
                if let Some(cookie) = shape {
                    Self::discard(transport, cookie)?;
                }
                return Ok(None);
            }
        };

        let mut window = Window::new(id, info.attributes, geometry);
        window.shape_cookie = shape;
        if !window.attributes.input_only {
            window.damage = DamageId(transport.generate_id());
            transport.send(Request::CreateDamage {
                damage: window.damage,
                window: id,
            })?;
        }
        transport.send(Request::SelectInput {
            window: id,
            mask: EventMask::PROPERTY_CHANGE,
        })?;
        if window.is_viewable() && !window.attributes.input_only {
            let pixmap = PixmapId(transport.generate_id());
            transport.send(Request::NameWindowPixmap { window: id, pixmap })?;
            window.pixmap = Some(pixmap);
        }
        debug!(window = %id, ?geometry, viewable = window.is_viewable(), "Tracking window");
        Ok(self.insert(window))
    }

    /// Issues and finalizes an add in one go.
    pub fn add<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        id: WindowId,
        geometry: Option<Geometry>,
    ) -> Result<Option<WindowRef>, TransportError> {
        match self.request_add(transport, id, geometry)? {
            Some(pending) => self.finalize_add(transport, pending),
            None => Ok(None),
        }
    }

    /// Tracks the windows reported at startup, in stacking order.
    ///
    /// All requests are issued before any reply is awaited. Windows listed in
    /// `skip` (the compositor's own) are not tracked.
    pub fn manage_existing<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        children: &[WindowId],
        skip: &[WindowId],
    ) -> Result<Vec<WindowRef>, TransportError> {
        let mut pending = Vec::with_capacity(children.len());
        for id in children.iter().filter(|id| !skip.contains(id)) {
            if let Some(add) = self.request_add(transport, *id, None)? {
                pending.push(add);
            }
        }
        transport.flush()?;

        let mut added = Vec::with_capacity(pending.len());
        for add in pending {
            if let Some(handle) = self.finalize_add(transport, add)? {
                added.push(handle);
            }
        }
        debug!(count = added.len(), "Managed pre-existing windows");
        Ok(added)
    }

    /// Stops tracking `window` and releases everything it owns.
    ///
    /// Callers notify plugins before calling this. A window whose drawable is
    /// already gone should have its damage handle reset to
    /// [`DamageId::NONE`] first, the server frees it along with the drawable.
    pub fn remove<T: Transport + ?Sized>(
        &mut self,
        window: WindowRef,
        backend: &mut dyn RenderingBackend,
        transport: &mut T,
    ) -> Result<Option<Window>, TransportError> {
        if self.get(window).is_none() {
            return Ok(None);
        }
        self.unlink(window);
        let slot = &mut self.slots[window.index as usize];
        let Some(mut removed) = slot.window.take() else {
            return Ok(None);
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(window.index);
        self.index.remove(&removed.id);

        backend.release_window(&mut removed);
        removed.rendering = None;
        if let Some(cookie) = removed.shape_cookie.take() {
            Self::discard(transport, cookie)?;
        }
        if let Some(pixmap) = removed.pixmap.take() {
            transport.send(Request::FreePixmap { pixmap })?;
        }
        if !removed.damage.is_none() {
            transport.send(Request::DestroyDamage { damage: removed.damage })?;
            removed.damage = DamageId::NONE;
        }
        debug!(window = %removed.id, "Stopped tracking window");
        Ok(Some(removed))
    }

    /// Frees the offscreen buffer of `window`, if it has one.
    pub fn release_pixmap<T: Transport + ?Sized>(
        &mut self,
        window: WindowRef,
        transport: &mut T,
    ) -> Result<(), TransportError> {
        if let Some(pixmap) = self.get_mut(window).and_then(|w| w.pixmap.take()) {
            transport.send(Request::FreePixmap { pixmap })?;
        }
        Ok(())
    }

    /// Replaces the offscreen buffer of `window`. The old buffer is released
    /// before the new one is named; unviewable windows end up without one.
    pub fn refresh_pixmap<T: Transport + ?Sized>(
        &mut self,
        window: WindowRef,
        transport: &mut T,
    ) -> Result<(), TransportError> {
        self.release_pixmap(window, transport)?;
        let Some(entry) = self.get_mut(window) else {
            return Ok(());
        };
        if !entry.is_viewable() || entry.attributes.input_only {
            return Ok(());
        }
        let pixmap = PixmapId(transport.generate_id());
        transport.send(Request::NameWindowPixmap {
            window: entry.id,
            pixmap,
        })?;
        entry.pixmap = Some(pixmap);
        Ok(())
    }

    /// Moves `window` directly above `sibling`, or to the top without one.
    pub fn restack(&mut self, window: WindowRef, sibling: Option<WindowRef>) {
        if self.get(window).is_none() || sibling == Some(window) {
            return;
        }
        let sibling = sibling.filter(|s| self.get(*s).is_some());
        self.unlink(window);
        match sibling {
            Some(sibling) => self.link_above(window, Some(sibling)),
            None => self.link_above(window, self.top),
        }
    }

    /// Moves `window` to the bottom of the stack.
    pub fn lower_to_bottom(&mut self, window: WindowRef) {
        if self.get(window).is_none() {
            return;
        }
        self.unlink(window);
        self.link_above(window, None);
    }

    /// Issues a fetch of the bounding shape of `window`. Without the shape
    /// extension the shape follows the geometry.
    pub fn request_shape<T: Transport + ?Sized>(
        &mut self,
        window: WindowRef,
        transport: &mut T,
    ) -> Result<(), TransportError> {
        if !self.shape_supported {
            if let Some(entry) = self.get_mut(window) {
                entry.shape = None;
                entry.is_rectangular = true;
            }
            return Ok(());
        }
        self.sync_shape(window, transport)?;
        let Some(id) = self.get(window).map(|w| w.id) else {
            return Ok(());
        };
        let cookie = transport.get_shape(id)?;
        if let Some(entry) = self.get_mut(window) {
            entry.shape_cookie = Some(cookie);
        }
        Ok(())
    }

    /// Collects an in-flight shape reply, if any.
    pub fn sync_shape<T: Transport + ?Sized>(
        &mut self,
        window: WindowRef,
        transport: &mut T,
    ) -> Result<(), TransportError> {
        let Some(entry) = self.get_mut(window) else {
            return Ok(());
        };
        let Some(cookie) = entry.shape_cookie.take() else {
            return Ok(());
        };
        match cookie.finalize(transport) {
            Ok(info) => entry.set_shape(info),
            Err(TransportError::Protocol(error)) => {
                debug!(window = %entry.id, %error, "Shape request failed, keeping previous shape");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Visible region of `window` in screen coordinates.
    pub fn get_region<T: Transport + ?Sized>(
        &mut self,
        window: WindowRef,
        transport: &mut T,
        include_border: bool,
        force_refresh: bool,
    ) -> Result<Region, TransportError> {
        if force_refresh {
            self.request_shape(window, transport)?;
            transport.flush()?;
        }
        self.sync_shape(window, transport)?;
        Ok(self
            .get(window)
            .map(|w| w.screen_region(include_border))
            .unwrap_or_default())
    }

    /// Whether `window` currently contributes pixels to the screen.
    pub fn is_visible(&self, window: WindowRef) -> bool {
        let Some(entry) = self.get(window) else {
            return false;
        };
        let geometry = &entry.geometry;
        entry.is_viewable()
            && !entry.attributes.input_only
            && geometry.width > 0
            && geometry.height > 0
            && !entry.shape().is_empty()
            && entry.screen_region(true).intersects(&self.screen.rectangle())
    }

    /// Removes every window, topmost first.
    pub fn clear<T: Transport + ?Sized>(
        &mut self,
        backend: &mut dyn RenderingBackend,
        transport: &mut T,
    ) -> Result<(), TransportError> {
        while let Some(top) = self.top {
            self.remove(top, backend, transport)?;
        }
        Ok(())
    }

    fn discard<T: Transport + ?Sized>(transport: &mut T, cookie: Cookie<ShapeInfo>) -> Result<(), TransportError> {
        match cookie.finalize(transport) {
            Ok(_) | Err(TransportError::Protocol(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn unlink(&mut self, window: WindowRef) {
        let Some((below, above)) = self.get_mut(window).map(|w| (w.below.take(), w.above.take())) else {
            return;
        };
        match below.and_then(|b| self.get_mut(b)) {
            Some(entry) => entry.above = above,
            None => self.bottom = above,
        }
        match above.and_then(|a| self.get_mut(a)) {
            Some(entry) => entry.below = below,
            None => self.top = below,
        }
    }

    // Links an unlinked `window` directly above `below`, or at the bottom.
    fn link_above(&mut self, window: WindowRef, below: Option<WindowRef>) {
        let above = match below {
            Some(b) => self.get(b).and_then(|w| w.above),
            None => self.bottom,
        };
        if let Some(entry) = self.get_mut(window) {
            entry.below = below;
            entry.above = above;
        }
        match below.and_then(|b| self.get_mut(b)) {
            Some(entry) => entry.above = Some(window),
            None => self.bottom = Some(window),
        }
        match above.and_then(|a| self.get_mut(a)) {
            Some(entry) => entry.below = Some(window),
            None => self.top = Some(window),
        }
    }
}

/// Bottom-to-top iterator over the registry.
pub struct Iter<'a> {
    registry: &'a WindowRegistry,
    next: Option<WindowRef>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (WindowRef, &'a Window);

    fn next(&mut self) -> Option<Self::Item> {
        let handle = self.next?;
        let window = self.registry.get(handle)?;
        self.next = window.above;
        Some((handle, window))
    }
}
