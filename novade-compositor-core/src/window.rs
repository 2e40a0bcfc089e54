use std::any::Any;
use std::fmt;

use crate::protocol::{DamageId, Geometry, MapState, PixmapId, ShapeInfo, WindowAttributes, WindowId};
use crate::region::{Rectangle, Region};
use crate::registry::WindowRef;
use crate::transport::Cookie;

/// One tracked top-level window.
///
/// Instances live in the [`crate::registry::WindowRegistry`] arena and are
/// reached through a [`WindowRef`].
pub struct Window {
    pub id: WindowId,
    pub geometry: Geometry,
    pub attributes: WindowAttributes,
    /// Bounding shape relative to the content origin, `None` until fetched.
    pub(crate) shape: Option<Region>,
    pub is_rectangular: bool,
    pub(crate) shape_cookie: Option<Cookie<ShapeInfo>>,
    pub damage: DamageId,
    pub damaged: bool,
    /// Damaged fraction of the surface since the last paint. Values of 1.0 and
    /// above mean fully damaged.
    pub damaged_ratio: f32,
    /// Damage notifications received since the last paint.
    pub damage_notify_count: u16,
    /// Offscreen buffer, only present while the window is viewable.
    pub pixmap: Option<PixmapId>,
    /// Private data of the rendering backend.
    pub rendering: Option<Box<dyn Any>>,
    pub(crate) below: Option<WindowRef>,
    pub(crate) above: Option<WindowRef>,
}

impl Window {
    pub fn new(id: WindowId, attributes: WindowAttributes, geometry: Geometry) -> Self {
        Self {
            id,
            geometry,
            attributes,
            shape: None,
            is_rectangular: true,
            shape_cookie: None,
            damage: DamageId::NONE,
            damaged: false,
            damaged_ratio: 0.0,
            damage_notify_count: 0,
            pixmap: None,
            rendering: None,
            below: None,
            above: None,
        }
    }

    pub fn is_viewable(&self) -> bool {
        self.attributes.map_state == MapState::Viewable
    }

    pub fn is_fully_damaged(&self) -> bool {
        self.damaged_ratio >= 1.0
    }

    /// Forgets the damage accumulated since the last paint.
    pub fn clear_damage(&mut self) {
        self.damaged = false;
        self.damaged_ratio = 0.0;
        self.damage_notify_count = 0;
    }

    pub(crate) fn set_shape(&mut self, info: ShapeInfo) {
        if info.shaped {
            self.is_rectangular = false;
            self.shape = Some(Region::from_rectangles(info.rectangles));
        } else {
            self.is_rectangular = true;
            self.shape = Some(self.content_rectangle().into());
        }
    }

    fn content_rectangle(&self) -> Rectangle {
        Rectangle::new(0, 0, self.geometry.width as i32, self.geometry.height as i32)
    }

    /// Shape in window coordinates, the full content area when not fetched yet.
    pub fn shape(&self) -> Region {
        match &self.shape {
            Some(shape) => shape.clone(),
            None => self.content_rectangle().into(),
        }
    }

    /// Visible region in screen coordinates. The border is only added for
    /// rectangular windows.
    pub fn screen_region(&self, include_border: bool) -> Region {
        if include_border && self.is_rectangular {
            return self.geometry.outer_rectangle().into();
        }
        let bw = self.geometry.border_width as i32;
        self.shape().translated(self.geometry.x + bw, self.geometry.y + bw)
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("id", &self.id)
            .field("geometry", &self.geometry)
            .field("attributes", &self.attributes)
            .field("is_rectangular", &self.is_rectangular)
            .field("damage", &self.damage)
            .field("damaged", &self.damaged)
            .field("damaged_ratio", &self.damaged_ratio)
            .field("pixmap", &self.pixmap)
            .field("has_rendering_data", &self.rendering.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn window() -> Window {
        Window::new(
            WindowId(0x42),
            WindowAttributes {
                map_state: MapState::Viewable,
                ..Default::default()
            },
            Geometry::new(10, 20, 100, 50, 3),
        )
    }

    #[test]
    fn test_unfetched_shape_covers_content() {
        let window = window();
        assert_eq!(window.shape().rectangles(), &[Rectangle::new(0, 0, 100, 50)]);
        assert_eq!(window.screen_region(false).rectangles(), &[Rectangle::new(13, 23, 100, 50)]);
        assert_eq!(window.screen_region(true).rectangles(), &[Rectangle::new(10, 20, 106, 56)]);
    }

    #[test]
    fn test_custom_shape_ignores_border() {
        let mut window = window();
        window.set_shape(ShapeInfo {
            shaped: true,
            rectangles: vec![Rectangle::new(0, 0, 20, 20), Rectangle::new(60, 30, 40, 20)],
        });
        assert!(!window.is_rectangular);
        let region = window.screen_region(true);
        assert_eq!(region.rectangles().len(), 2);
        assert!(region.contains_rectangle(&Rectangle::new(13, 23, 20, 20)));
    }

    #[test]
    fn test_clear_damage() {
        let mut window = window();
        window.damaged = true;
        window.damaged_ratio = 1.3;
        window.damage_notify_count = 7;
        assert!(window.is_fully_damaged());
        window.clear_damage();
        assert!(!window.damaged);
        assert_eq!(window.damaged_ratio, 0.0);
        assert_eq!(window.damage_notify_count, 0);
    }
}
