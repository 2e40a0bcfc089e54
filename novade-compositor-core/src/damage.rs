//! Damage accumulation.
//!
//! The tracker keeps the union of screen areas that need repainting and a flag
//! for "repaint everything". Each window also accumulates the fraction of its
//! surface damaged since it was last painted; past the configured ratio it is
//! treated as fully damaged and further notifications for it are not unioned.

use novade_core::config::DamageConfig;
use tracing::trace;

use crate::protocol::{DamageId, DamageNotify};
use crate::region::{Rectangle, Region};
use crate::registry::{WindowRef, WindowRegistry};

/// What [`DamageTracker::window_damaged`] did with a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    /// Unknown or invisible window.
    Ignored,
    /// The window was already fully damaged in this cycle.
    AlreadyFull,
    /// The notified rectangle was added.
    Partial,
    /// The whole window was added.
    Full,
}

#[derive(Debug)]
pub struct DamageTracker {
    region: Region,
    whole_session: bool,
    fully_damaged_ratio: f32,
    notify_max: u16,
}

impl DamageTracker {
    pub fn new(config: &DamageConfig) -> Self {
        Self {
            region: Region::new(),
            whole_session: false,
            fully_damaged_ratio: config.fully_damaged_ratio,
            notify_max: config.notify_max,
        }
    }

    /// Adds `region` to the pending damage. Without a region, or with
    /// `is_full`, the whole session is marked damaged instead.
    pub fn add_damaged_region(&mut self, region: Option<&Region>, is_full: bool) {
        match region {
            Some(region) if !is_full => {
                if !self.whole_session {
                    self.region.union(region);
                }
            }
            _ => {
                self.whole_session = true;
                self.region.clear();
            }
        }
    }

    pub fn is_damaged(&self) -> bool {
        self.whole_session || !self.region.is_empty()
    }

    pub fn is_whole_session_damaged(&self) -> bool {
        self.whole_session
    }

    pub fn damaged_region(&self) -> &Region {
        &self.region
    }

    /// Accounts a damage notification for its window.
    pub fn window_damaged(&mut self, registry: &mut WindowRegistry, notify: &DamageNotify) -> DamageOutcome {
        let Some(handle) = registry.lookup(notify.drawable) else {
            return DamageOutcome::Ignored;
        };
        if !registry.is_visible(handle) {
            return DamageOutcome::Ignored;
        }
        let Some(window) = registry.get_mut(handle) else {
            return DamageOutcome::Ignored;
        };
        if window.damaged_ratio >= self.fully_damaged_ratio {
            return DamageOutcome::AlreadyFull;
        }

        let geometry = window.geometry;
        let content = Rectangle::new(0, 0, geometry.width as i32, geometry.height as i32);
        let changed = notify.area.intersection(&content);
        let surface = geometry.area();
        let fraction = if surface == 0 {
            1.0
        } else {
            changed.area() as f32 / surface as f32
        };

        window.damaged = true;
        let flooded = window.damage_notify_count > self.notify_max;
        window.damage_notify_count = window.damage_notify_count.saturating_add(1);
        window.damaged_ratio += fraction;
        trace!(
            window = %window.id,
            ratio = window.damaged_ratio,
            notifications = window.damage_notify_count,
            "Window damaged"
        );

        if flooded || window.damaged_ratio >= self.fully_damaged_ratio {
            window.damaged_ratio = window.damaged_ratio.max(1.0);
            let full = window.screen_region(true);
            self.add_damaged_region(Some(&full), false);
            DamageOutcome::Full
        } else {
            let bw = geometry.border_width as i32;
            let area = changed.translate(geometry.x + bw, geometry.y + bw);
            self.add_damaged_region(Some(&Region::from_rectangle(area)), false);
            DamageOutcome::Partial
        }
    }

    /// Adds the current area of `window`, e.g. before it moves or disappears.
    pub fn damage_window(&mut self, registry: &WindowRegistry, window: WindowRef) {
        if let Some(entry) = registry.get(window) {
            self.add_damaged_region(Some(&entry.screen_region(true)), false);
        }
    }

    /// Clears the pending damage after a paint and resets the windows that
    /// were part of it.
    ///
    /// Returns the damage handles whose server-side damage must be subtracted.
    pub fn reset_damaged(&mut self, registry: &mut WindowRegistry, painted: &[WindowRef]) -> Vec<DamageId> {
        self.region.clear();
        self.whole_session = false;
        let mut handles = Vec::new();
        for handle in painted {
            if let Some(window) = registry.get_mut(*handle) {
                if window.damaged && !window.damage.is_none() {
                    handles.push(window.damage);
                }
                window.clear_damage();
            }
        }
        handles
    }
}
