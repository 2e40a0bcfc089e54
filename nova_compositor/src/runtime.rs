//! The event loop driving an initialized [`Compositor`].
//!
//! Three sources are registered with `calloop`:
//! - a timer firing every repaint interval, which paints and reschedules
//!   itself with the interval the scheduler derived from the paint;
//! - readiness of the display connection, which drains events;
//! - SIGINT, SIGTERM and SIGHUP, which stop the loop.
//!
//! After each paint an idle callback drains the events that arrived while
//! painting, so they are handled before the loop goes back to sleep.

use std::os::fd::AsFd;

use calloop::generic::Generic;
use calloop::signals::{Signal, Signals};
use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, Interest, LoopHandle, LoopSignal, Mode, PostAction};
use novade_compositor_core::compositor::{Compositor, PaintOutcome};
use novade_compositor_core::error::CompositorError;
use novade_compositor_core::pump::DrainMode;
use novade_compositor_core::transport::Transport;
use thiserror::Error;
use tracing::{debug, error, info, trace};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("event loop failure: {0}")]
    EventLoop(#[from] calloop::Error),
    #[error(transparent)]
    Compositor(#[from] CompositorError),
}

/// Why the loop stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Signal(Signal),
}

struct LoopState<T: Transport> {
    compositor: Compositor<T>,
    signal: LoopSignal,
    outcome: Option<Result<Exit, CompositorError>>,
}

impl<T: Transport> LoopState<T> {
    fn stop(&mut self, outcome: Result<Exit, CompositorError>) {
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
        }
        self.signal.stop();
    }

    fn drain(&mut self) {
        let result = self
            .compositor
            .drain_events(DrainMode::Steady)
            .and_then(|report| {
                trace!(handled = report.handled, budget_exhausted = report.budget_exhausted, "Events drained");
                self.compositor.transport_mut().flush().map_err(CompositorError::from)
            });
        if let Err(e) = result {
            error!(error = %e, "Fatal error while handling display events");
            self.stop(Err(e));
        }
    }

    fn paint(&mut self, handle: &LoopHandle<'static, LoopState<T>>) -> TimeoutAction
    where
        T: 'static,
    {
        match self.compositor.paint_tick() {
            Ok(outcome) => {
                if let PaintOutcome::Painted { .. } = outcome {
                    handle.insert_idle(|state| state.drain());
                }
                TimeoutAction::ToDuration(outcome.next_interval())
            }
            Err(e) => {
                error!(error = %e, "Fatal error while painting");
                self.stop(Err(e));
                TimeoutAction::Drop
            }
        }
    }
}

/// Runs the loop until a signal arrives or a fatal error occurs, then hands
/// the compositor back for teardown.
///
/// `readiness` must become readable whenever the display connection has data.
pub fn run<T, F>(
    compositor: Compositor<T>,
    readiness: F,
) -> (Compositor<T>, Result<Exit, RuntimeError>)
where
    T: Transport + 'static,
    F: AsFd + 'static,
{
    run_with(compositor, readiness, |_| Ok(()))
}

fn run_with<T, F, S>(
    compositor: Compositor<T>,
    readiness: F,
    extra_sources: S,
) -> (Compositor<T>, Result<Exit, RuntimeError>)
where
    T: Transport + 'static,
    F: AsFd + 'static,
    S: FnOnce(&LoopHandle<'static, LoopState<T>>) -> Result<(), RuntimeError>,
{
    let mut event_loop: EventLoop<'static, LoopState<T>> = match EventLoop::try_new() {
        Ok(event_loop) => event_loop,
        Err(e) => return (compositor, Err(e.into())),
    };
    let mut state = LoopState {
        compositor,
        signal: event_loop.get_signal(),
        outcome: None,
    };

    let result = register_sources(&event_loop.handle(), &state, readiness)
        .and_then(|()| extra_sources(&event_loop.handle()))
        .and_then(|()| {
            info!("Entering event loop");
            event_loop.run(None, &mut state, |_| {}).map_err(RuntimeError::from)
        })
        .and_then(|()| match state.outcome.take() {
            Some(Ok(exit)) => Ok(exit),
            Some(Err(e)) => Err(e.into()),
            None => Err(RuntimeError::EventLoop(calloop::Error::OtherError(
                "event loop stopped without a reason".into(),
            ))),
        });
    (state.compositor, result)
}

fn register_sources<T, F>(
    handle: &LoopHandle<'static, LoopState<T>>,
    state: &LoopState<T>,
    readiness: F,
) -> Result<(), RuntimeError>
where
    T: Transport + 'static,
    F: AsFd + 'static,
{
    let timer_handle = handle.clone();
    let first_tick = state.compositor.repaint_interval();
    handle
        .insert_source(Timer::from_duration(first_tick), move |_, _, state| {
            state.paint(&timer_handle)
        })
        .map_err(|e| e.error)?;

    handle
        .insert_source(
            Generic::new(readiness, Interest::READ, Mode::Level),
            |_, _, state: &mut LoopState<T>| {
                state.drain();
                Ok(PostAction::Continue)
            },
        )
        .map_err(|e| e.error)?;

    let signals = Signals::new(&[Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP])?;
    handle
        .insert_source(signals, |event, _, state| {
            let signal = event.signal();
            info!(?signal, "Received signal, shutting down");
            state.stop(Ok(Exit::Signal(signal)));
        })
        .map_err(|e| e.error)?;
    debug!(first_tick_us = first_tick.as_micros() as u64, "Event sources registered");
    Ok(())
}
