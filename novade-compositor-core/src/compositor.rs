//! The compositing manager context.
//!
//! [`Compositor`] owns every component and makes the lifecycle explicit:
//! [`Compositor::new`], [`Compositor::initialize`], then
//! [`Compositor::paint_tick`] and [`Compositor::drain_events`] driven by the
//! caller's event loop, and finally [`Compositor::shutdown`].

use std::time::Duration;

use novade_core::config::CompositorConfig;
use tracing::{debug, info, warn};

use crate::damage::DamageTracker;
use crate::error::{CompositorError, TransportError};
use crate::extensions::{Extensions, RANDR, SHAPE};
use crate::ownership::OwnershipHandshake;
use crate::plugin::{PaintFrame, PluginDispatch, RenderingBackend};
use crate::protocol::{EventMask, Request, ScreenInfo};
use crate::pump::DrainMode;
use crate::registry::WindowRegistry;
use crate::scheduler::RepaintScheduler;
use crate::transport::{Transport, TransportExt};

/// Result of one repaint timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintOutcome {
    /// Nothing was damaged; the interval is unchanged.
    Idle { next_interval: Duration },
    Painted {
        windows: usize,
        paint_time: Duration,
        next_interval: Duration,
    },
}

impl PaintOutcome {
    pub fn next_interval(&self) -> Duration {
        match self {
            PaintOutcome::Idle { next_interval } | PaintOutcome::Painted { next_interval, .. } => *next_interval,
        }
    }
}

pub struct Compositor<T: Transport> {
    pub(crate) transport: T,
    pub(crate) screen: ScreenInfo,
    pub(crate) registry: WindowRegistry,
    pub(crate) damage: DamageTracker,
    pub(crate) scheduler: RepaintScheduler,
    pub(crate) plugins: PluginDispatch,
    pub(crate) backend: Box<dyn RenderingBackend>,
    pub(crate) ownership: OwnershipHandshake,
    pub(crate) extensions: Extensions,
}

impl<T: Transport> Compositor<T> {
    pub fn new(
        transport: T,
        backend: Box<dyn RenderingBackend>,
        plugins: PluginDispatch,
        config: &CompositorConfig,
    ) -> Self {
        let screen = transport.screen();
        Self {
            transport,
            screen,
            registry: WindowRegistry::new(screen),
            damage: DamageTracker::new(&config.damage),
            scheduler: RepaintScheduler::new(&config.scheduler),
            plugins,
            backend,
            ownership: OwnershipHandshake::new(screen.number),
            extensions: Extensions::default(),
        }
    }

    /// Claims the screen and starts compositing.
    ///
    /// Independent requests are issued together and their replies collected
    /// later, so startup costs a handful of round trips:
    ///
    /// 1. extension queries and the selection owner query;
    /// 2. the ownership claim and the refresh rate query;
    /// 3. a sync whose reply guarantees the claim's property notification
    ///    has arrived;
    /// 4. redirection and the window tree, under a server grab.
    ///
    /// # Errors
    ///
    /// Fails if a required extension is missing, the backend fails to
    /// initialize, another compositing manager is running, or the connection
    /// breaks.
    pub fn initialize(&mut self) -> Result<(), CompositorError> {
        let root = self.screen.root;
        info!(%root, width = self.screen.width, height = self.screen.height, backend = self.backend.name(), "Initializing compositing manager");

        let pending_extensions = Extensions::request(&mut self.transport)?;
        self.ownership.begin(&mut self.transport)?;
        self.transport.flush()?;
        self.backend.initialize(&self.screen)?;
        self.plugins.initialize_all(&self.screen);

        self.extensions = pending_extensions.finalize(&mut self.transport)?;
        self.registry.set_shape_supported(self.extensions.is_present(SHAPE));
        self.ownership.check_existing_owner(&mut self.transport, root)?;
        let refresh_rate = if self.extensions.is_present(RANDR) {
            Some(self.transport.get_refresh_rate(root)?)
        } else {
            None
        };
        self.transport.flush()?;
        self.backend.finalize_initialize()?;
        self.plugins.finalize_initialize_all();

        self.transport.sync()?;
        self.drain_events(DrainMode::Startup)?;
        let proxy = self.ownership.confirm()?;

        let mut root_mask = EventMask::SUBSTRUCTURE_NOTIFY | EventMask::STRUCTURE_NOTIFY | EventMask::PROPERTY_CHANGE;
        if refresh_rate.is_some() {
            root_mask |= EventMask::SCREEN_CHANGE;
        }
        self.transport.send(Request::GrabServer)?;
        self.transport.send(Request::RedirectSubwindows { window: root })?;
        self.transport.send(Request::SelectInput {
            window: root,
            mask: root_mask,
        })?;
        let tree = self.transport.query_tree(root)?;
        self.transport.sync()?;
        if let Err(e) = self.drain_events(DrainMode::Startup) {
            let _ = self.transport.send(Request::UngrabServer);
            let _ = self.transport.flush();
            return Err(e);
        }
        let tree = tree.finalize(&mut self.transport)?;
        self.registry.manage_existing(&mut self.transport, &tree.children, &[proxy])?;
        self.transport.send(Request::UngrabServer)?;
        self.transport.flush()?;

        self.plugins.manage_existing(&self.registry);
        self.plugins.check_requirements(&self.extensions);

        let rate = match refresh_rate {
            Some(cookie) => match cookie.finalize(&mut self.transport) {
                Ok(info) => info.rate,
                Err(TransportError::Protocol(error)) => {
                    warn!(%error, "Refresh rate query failed");
                    None
                }
                Err(e) => return Err(e.into()),
            },
            None => None,
        };
        self.scheduler.set_refresh_rate(rate);

        self.damage.add_damaged_region(None, true);
        self.scheduler.note_damage();
        self.paint_tick()?;
        info!(
            windows = self.registry.len(),
            plugins = ?self.plugins.names(),
            "Compositing manager running"
        );
        Ok(())
    }

    /// Handles one expiry of the repaint timer.
    ///
    /// With pending damage the selected windows are painted, the damage is
    /// reset and the next interval is derived from the measured paint time.
    /// The caller should then drain events once more, without waiting.
    pub fn paint_tick(&mut self) -> Result<PaintOutcome, CompositorError> {
        if !self.damage.is_damaged() {
            self.scheduler.note_idle_tick();
            return Ok(PaintOutcome::Idle {
                next_interval: self.scheduler.repaint_interval(),
            });
        }

        let started = self.scheduler.begin_paint();
        let windows = self.plugins.select_window_list(&self.registry);
        let damaged = self.damage.damaged_region().clone();
        self.backend.paint(PaintFrame {
            registry: &mut self.registry,
            windows: &windows,
            damaged: &damaged,
            whole_session: self.damage.is_whole_session_damaged(),
        });
        self.plugins.paint(&self.registry, &windows);

        for damage in self.damage.reset_damaged(&mut self.registry, &windows) {
            self.transport.send(Request::SubtractDamage { damage })?;
        }
        self.transport.flush()?;

        let paint_time = started.elapsed();
        let next_interval = self.scheduler.record_paint(paint_time);
        debug!(
            windows = windows.len(),
            paint_time_us = paint_time.as_micros() as u64,
            next_interval_us = next_interval.as_micros() as u64,
            "Painted"
        );
        Ok(PaintOutcome::Painted {
            windows: windows.len(),
            paint_time,
            next_interval,
        })
    }

    /// Tears everything down in dependency order: plugins, windows, backend,
    /// capability cache, then the ownership claim and the connection.
    ///
    /// Every step runs even if an earlier one failed; the first error is
    /// returned.
    pub fn shutdown(self) -> Result<(), CompositorError> {
        let Compositor {
            mut transport,
            mut registry,
            mut plugins,
            mut backend,
            mut ownership,
            mut extensions,
            ..
        } = self;
        info!("Shutting down compositing manager");
        let mut first_error: Option<TransportError> = None;

        plugins.unload_all();
        if let Err(e) = registry.clear(backend.as_mut(), &mut transport) {
            warn!(error = %e, "Failed to release window resources");
            first_error.get_or_insert(e);
        }
        drop(backend);
        extensions.clear();
        if let Err(e) = ownership.release(&mut transport) {
            warn!(error = %e, "Failed to release compositing manager selection");
            first_error.get_or_insert(e);
        }
        if let Err(e) = transport.flush() {
            first_error.get_or_insert(e);
        }
        drop(transport);

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    pub fn screen(&self) -> &ScreenInfo {
        &self.screen
    }

    pub fn registry(&self) -> &WindowRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut WindowRegistry {
        &mut self.registry
    }

    pub fn damage(&self) -> &DamageTracker {
        &self.damage
    }

    pub fn scheduler(&self) -> &RepaintScheduler {
        &self.scheduler
    }

    pub fn plugins(&self) -> &PluginDispatch {
        &self.plugins
    }

    pub fn plugins_mut(&mut self) -> &mut PluginDispatch {
        &mut self.plugins
    }

    pub fn ownership(&self) -> &OwnershipHandshake {
        &self.ownership
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn repaint_interval(&self) -> Duration {
        self.scheduler.repaint_interval()
    }
}
