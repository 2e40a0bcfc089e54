//! # Novade Compositor Core
//!
//! Core logic of the NovaDE compositing manager. The manager redirects the
//! top-level windows of a display server screen offscreen and repaints the
//! screen from their contents.
//!
//! The crate is independent of any particular connection or renderer:
//! - [`transport::Transport`] abstracts the display server connection with
//!   two-phase requests ([`transport::Cookie`]).
//! - [`registry::WindowRegistry`] mirrors the stacking order of top-level
//!   windows.
//! - [`damage::DamageTracker`] accumulates the screen area to repaint.
//! - [`scheduler::RepaintScheduler`] adapts the repaint interval to the
//!   refresh rate and measured paint times.
//! - [`ownership::OwnershipHandshake`] claims the per-screen compositing
//!   manager selection.
//! - [`plugin::RenderingBackend`] and [`plugin::PluginDispatch`] are the
//!   extension points for painting and policy.
//!
//! [`compositor::Compositor`] ties them together; its event handling lives in
//! [`pump`].

pub mod compositor;
pub mod damage;
pub mod error;
pub mod extensions;
pub mod ownership;
pub mod plugin;
pub mod protocol;
pub mod pump;
pub mod region;
pub mod registry;
pub mod scheduler;
pub mod transport;
pub mod window;

#[cfg(test)]
mod testing;

pub use compositor::{Compositor, PaintOutcome};
pub use damage::{DamageOutcome, DamageTracker};
pub use error::{BackendError, CompositorError, OwnershipError, PluginError, TransportError};
pub use extensions::Extensions;
pub use plugin::{PaintFrame, Plugin, PluginCapabilities, PluginDispatch, RenderingBackend};
pub use pump::{DrainMode, DrainReport};
pub use region::{Rectangle, Region};
pub use registry::{WindowRef, WindowRegistry};
pub use scheduler::RepaintScheduler;
pub use transport::{Cookie, Transport, TransportExt};
pub use window::Window;
