//! The display transport contract.
//!
//! Requests are two-phase: issuing a request never blocks and yields a typed
//! [`Cookie`], and [`Cookie::finalize`] blocks only on that request's reply.
//! Independent requests are issued back to back and finalized afterwards so a
//! batch costs a single round trip.

use std::fmt;
use std::marker::PhantomData;

use crate::error::TransportError;
use crate::protocol::{
    DisplayEvent, ExtensionInfo, RefreshRateInfo, Reply, Request, ScreenInfo, SelectionOwner, ShapeInfo,
    SyncDone, TreeInfo, WindowId, WindowInfo,
};

/// Connection to the display server.
///
/// Implementations own the inbound buffer: replies and events read while
/// waiting for some other reply are kept, never dropped.
pub trait Transport {
    /// Root window and size of the managed screen.
    fn screen(&self) -> ScreenInfo;

    /// Allocates a fresh resource id for a client-created object.
    fn generate_id(&mut self) -> u32;

    /// Queues `request` and returns its sequence number. Never waits.
    fn send_request(&mut self, request: Request) -> Result<u64, TransportError>;

    /// Blocks until the reply to `sequence` is available.
    ///
    /// A protocol error reported for the request is returned as
    /// [`TransportError::Protocol`].
    fn wait_for_reply(&mut self, sequence: u64) -> Result<Reply, TransportError>;

    /// Writes every queued request to the server.
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Returns the next event, reading from the connection if nothing is
    /// buffered. Never blocks.
    fn poll_for_event(&mut self) -> Result<Option<DisplayEvent>, TransportError>;

    /// Returns the next already-buffered event without touching the connection.
    fn poll_for_queued_event(&mut self) -> Option<DisplayEvent>;

    fn is_connected(&self) -> bool;
}

/// Conversion of a generic [`Reply`] into the payload a cookie promised.
pub trait FromReply: Sized {
    const KIND: &'static str;

    fn from_reply(reply: Reply) -> Result<Self, TransportError>;
}

macro_rules! impl_from_reply {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromReply for $ty {
                const KIND: &'static str = stringify!($variant);

                fn from_reply(reply: Reply) -> Result<Self, TransportError> {
                    match reply {
                        Reply::$variant(inner) => Ok(inner),
                        other => Err(TransportError::UnexpectedReply {
                            expected: Self::KIND,
                            actual: other.kind(),
                        }),
                    }
                }
            }
        )*
    };
}

impl_from_reply! {
    ExtensionInfo => Extension,
    SelectionOwner => SelectionOwner,
    WindowInfo => WindowInfo,
    ShapeInfo => Shape,
    TreeInfo => Tree,
    RefreshRateInfo => RefreshRate,
}

impl FromReply for SyncDone {
    const KIND: &'static str = "Sync";

    fn from_reply(reply: Reply) -> Result<Self, TransportError> {
        match reply {
            Reply::Sync => Ok(SyncDone),
            other => Err(TransportError::UnexpectedReply {
                expected: Self::KIND,
                actual: other.kind(),
            }),
        }
    }
}

/// Handle to a request whose reply has not been collected yet.
#[must_use = "a cookie must be finalized to collect its reply"]
pub struct Cookie<T> {
    sequence: u64,
    _reply: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for Cookie<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cookie").field("sequence", &self.sequence).finish()
    }
}

impl<T: FromReply> Cookie<T> {
    pub fn new(sequence: u64) -> Self {
        Self {
            sequence,
            _reply: PhantomData,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Blocks on the in-flight reply and converts it.
    pub fn finalize<X: Transport + ?Sized>(self, transport: &mut X) -> Result<T, TransportError> {
        let reply = transport.wait_for_reply(self.sequence)?;
        T::from_reply(reply)
    }
}

/// Typed request helpers available on every [`Transport`].
pub trait TransportExt: Transport {
    fn issue<R: FromReply>(&mut self, request: Request) -> Result<Cookie<R>, TransportError> {
        debug_assert!(request.expects_reply(), "{} has no reply", request.name());
        let sequence = self.send_request(request)?;
        Ok(Cookie::new(sequence))
    }

    /// Sends a request that has no reply.
    fn send(&mut self, request: Request) -> Result<(), TransportError> {
        self.send_request(request).map(|_| ())
    }

    /// Round trip to the server; every earlier request has been processed
    /// once this returns.
    fn sync(&mut self) -> Result<(), TransportError> {
        let cookie: Cookie<SyncDone> = self.issue(Request::Sync)?;
        self.flush()?;
        cookie.finalize(self).map(|_| ())
    }

    fn query_extension(&mut self, name: &str) -> Result<Cookie<ExtensionInfo>, TransportError> {
        self.issue(Request::QueryExtension { name: name.to_string() })
    }

    fn get_selection_owner(&mut self, selection: &str) -> Result<Cookie<SelectionOwner>, TransportError> {
        self.issue(Request::GetSelectionOwner {
            selection: selection.to_string(),
        })
    }

    fn get_window_info(&mut self, window: WindowId, geometry: bool) -> Result<Cookie<WindowInfo>, TransportError> {
        self.issue(Request::GetWindowInfo { window, geometry })
    }

    fn get_shape(&mut self, window: WindowId) -> Result<Cookie<ShapeInfo>, TransportError> {
        self.issue(Request::GetShape { window })
    }

    fn query_tree(&mut self, window: WindowId) -> Result<Cookie<TreeInfo>, TransportError> {
        self.issue(Request::QueryTree { window })
    }

    fn get_refresh_rate(&mut self, window: WindowId) -> Result<Cookie<RefreshRateInfo>, TransportError> {
        self.issue(Request::GetRefreshRate { window })
    }
}

impl<T: Transport + ?Sized> TransportExt for T {}
