//! Compositing-manager selection ownership.
//!
//! Only one compositing manager may run per screen. Ownership is expressed by
//! owning the `_NET_WM_CM_S<screen>` selection through a proxy window:
//!
//! 1. ask who owns the selection ([`OwnershipHandshake::begin`]);
//! 2. give up if someone does, otherwise create the proxy window and change a
//!    property on it ([`OwnershipHandshake::check_existing_owner`]);
//! 3. the resulting property notification carries a server timestamp, which
//!    is used to take the selection ([`OwnershipHandshake::handle_property_notify`]).

use std::fmt;

use tracing::{debug, error, info};

use crate::error::{OwnershipError, TransportError};
use crate::protocol::{EventMask, Request, SelectionOwner, Timestamp, WindowId};
use crate::transport::{Cookie, Transport, TransportExt};

pub const SELECTION_PREFIX: &str = "_NET_WM_CM_S";
/// Property changed on the proxy window to obtain a timestamp.
pub const OWNERSHIP_ATOM: &str = "_NET_WM_NAME";
pub const PROXY_WINDOW_NAME: &str = "nova-compmgr";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    AlreadyRunning { owner: WindowId },
    NotConfirmed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipState {
    Init,
    CheckingExistingOwner,
    Claiming,
    ConfirmingOwnership { proxy: WindowId },
    Owned { proxy: WindowId, timestamp: Timestamp },
    Failed(FailureReason),
}

impl fmt::Display for OwnershipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnershipState::Init => write!(f, "Init"),
            OwnershipState::CheckingExistingOwner => write!(f, "CheckingExistingOwner"),
            OwnershipState::Claiming => write!(f, "Claiming"),
            OwnershipState::ConfirmingOwnership { .. } => write!(f, "ConfirmingOwnership"),
            OwnershipState::Owned { .. } => write!(f, "Owned"),
            OwnershipState::Failed(_) => write!(f, "Failed"),
        }
    }
}

#[derive(Debug)]
pub struct OwnershipHandshake {
    state: OwnershipState,
    selection: String,
    owner_cookie: Option<Cookie<SelectionOwner>>,
    proxy: Option<WindowId>,
}

impl OwnershipHandshake {
    pub fn new(screen_number: u32) -> Self {
        Self {
            state: OwnershipState::Init,
            selection: format!("{}{}", SELECTION_PREFIX, screen_number),
            owner_cookie: None,
            proxy: None,
        }
    }

    pub fn state(&self) -> &OwnershipState {
        &self.state
    }

    pub fn selection(&self) -> &str {
        &self.selection
    }

    /// The proxy window, once created.
    pub fn proxy(&self) -> Option<WindowId> {
        self.proxy
    }

    pub fn is_owned(&self) -> bool {
        matches!(self.state, OwnershipState::Owned { .. })
    }

    fn out_of_order(&self, step: &'static str) -> OwnershipError {
        OwnershipError::OutOfOrder {
            step,
            state: self.state.to_string(),
        }
    }

    /// Issues the selection owner query. The reply is collected by
    /// [`Self::check_existing_owner`].
    pub fn begin<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), OwnershipError> {
        if self.state != OwnershipState::Init {
            return Err(self.out_of_order("begin"));
        }
        self.owner_cookie = Some(transport.get_selection_owner(&self.selection)?);
        self.state = OwnershipState::CheckingExistingOwner;
        Ok(())
    }

    /// Collects the owner query and, if the selection is free, starts the claim.
    pub fn check_existing_owner<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        root: WindowId,
    ) -> Result<(), OwnershipError> {
        let cookie = match (&self.state, self.owner_cookie.take()) {
            (OwnershipState::CheckingExistingOwner, Some(cookie)) => cookie,
            _ => return Err(self.out_of_order("check_existing_owner")),
        };
        let reply = cookie.finalize(transport)?;
        if !reply.owner.is_none() {
            error!(owner = %reply.owner, selection = %self.selection, "Another compositing manager is already running");
            self.state = OwnershipState::Failed(FailureReason::AlreadyRunning { owner: reply.owner });
            return Err(OwnershipError::AlreadyRunning { owner: reply.owner });
        }

        self.state = OwnershipState::Claiming;
        let proxy = WindowId(transport.generate_id());
        self.proxy = Some(proxy);
        transport.send(Request::CreateProxyWindow { window: proxy, parent: root })?;
        transport.send(Request::SelectInput {
            window: proxy,
            mask: EventMask::PROPERTY_CHANGE,
        })?;
        transport.send(Request::ChangeProperty {
            window: proxy,
            property: OWNERSHIP_ATOM.to_string(),
            value: PROXY_WINDOW_NAME.to_string(),
        })?;
        debug!(%proxy, selection = %self.selection, "Claiming compositing manager selection");
        self.state = OwnershipState::ConfirmingOwnership { proxy };
        Ok(())
    }

    /// Feeds a property notification. Returns `true` if it completed the
    /// handshake; unrelated notifications are ignored.
    pub fn handle_property_notify<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        window: WindowId,
        atom: &str,
        time: Timestamp,
    ) -> Result<bool, TransportError> {
        let OwnershipState::ConfirmingOwnership { proxy } = self.state else {
            return Ok(false);
        };
        if window != proxy || atom != OWNERSHIP_ATOM {
            return Ok(false);
        }
        transport.send(Request::SetSelectionOwner {
            owner: proxy,
            selection: self.selection.clone(),
            time,
        })?;
        info!(%proxy, selection = %self.selection, "Compositing manager selection acquired");
        self.state = OwnershipState::Owned { proxy, timestamp: time };
        Ok(true)
    }

    /// Final check once the startup events have been drained.
    pub fn confirm(&mut self) -> Result<WindowId, OwnershipError> {
        match &self.state {
            OwnershipState::Owned { proxy, .. } => Ok(*proxy),
            OwnershipState::ConfirmingOwnership { .. } => {
                self.state = OwnershipState::Failed(FailureReason::NotConfirmed);
                Err(OwnershipError::NotConfirmed)
            }
            OwnershipState::Failed(FailureReason::AlreadyRunning { owner }) => {
                Err(OwnershipError::AlreadyRunning { owner: *owner })
            }
            OwnershipState::Failed(FailureReason::NotConfirmed) => Err(OwnershipError::NotConfirmed),
            _ => Err(self.out_of_order("confirm")),
        }
    }

    /// Destroys the proxy window, which gives the selection up.
    pub fn release<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), TransportError> {
        if let Some(proxy) = self.proxy.take() {
            transport.send(Request::DestroyWindow { window: proxy })?;
            debug!(%proxy, "Compositing manager selection released");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DisplayEvent;
    use crate::testing::{ScriptedTransport, ROOT};
    use pretty_assertions::assert_eq;

    fn next_property(transport: &mut ScriptedTransport) -> (WindowId, String, Timestamp) {
        loop {
            match transport.poll_for_event().unwrap() {
                Some(DisplayEvent::Property { window, atom, time, .. }) => return (window, atom, time),
                Some(_) => continue,
                None => panic!("no property notification"),
            }
        }
    }

    #[test]
    fn test_handshake_reaches_owned() {
        let mut transport = ScriptedTransport::new();
        let server = transport.server();
        let mut handshake = OwnershipHandshake::new(0);
        assert_eq!(handshake.selection(), "_NET_WM_CM_S0");

        handshake.begin(&mut transport).unwrap();
        assert_eq!(handshake.state(), &OwnershipState::CheckingExistingOwner);
        handshake.check_existing_owner(&mut transport, ROOT).unwrap();
        let proxy = handshake.proxy().unwrap();
        assert_eq!(handshake.state(), &OwnershipState::ConfirmingOwnership { proxy });

        let (window, atom, time) = next_property(&mut transport);
        assert!(handshake.handle_property_notify(&mut transport, window, &atom, time).unwrap());
        assert_eq!(handshake.state(), &OwnershipState::Owned { proxy, timestamp: time });
        assert_eq!(handshake.confirm().unwrap(), proxy);
        assert_eq!(server.borrow().selection_owner, proxy);
        assert_eq!(
            server.borrow().sent.last(),
            Some(&Request::SetSelectionOwner {
                owner: proxy,
                selection: "_NET_WM_CM_S0".to_string(),
                time
            })
        );
    }

    #[test]
    fn test_existing_owner_fails_without_claiming() {
        let mut transport = ScriptedTransport::new();
        let server = transport.server();
        server.borrow_mut().selection_owner = WindowId(0x1e00007);
        let mut handshake = OwnershipHandshake::new(0);

        handshake.begin(&mut transport).unwrap();
        let err = handshake.check_existing_owner(&mut transport, ROOT).unwrap_err();
        assert!(matches!(err, OwnershipError::AlreadyRunning { owner } if owner == WindowId(0x1e00007)));
        assert_eq!(
            handshake.state(),
            &OwnershipState::Failed(FailureReason::AlreadyRunning {
                owner: WindowId(0x1e00007)
            })
        );
        assert!(handshake.proxy().is_none());
        assert_eq!(server.borrow().sent_names(), vec!["GetSelectionOwner"]);
        assert!(handshake.confirm().is_err());
    }

    #[test]
    fn test_unrelated_notifications_leave_state_unchanged() {
        let mut transport = ScriptedTransport::new();
        let mut handshake = OwnershipHandshake::new(1);
        handshake.begin(&mut transport).unwrap();
        handshake.check_existing_owner(&mut transport, ROOT).unwrap();
        let proxy = handshake.proxy().unwrap();
        let before = handshake.state().clone();

        assert!(!handshake
            .handle_property_notify(&mut transport, WindowId(0x77), OWNERSHIP_ATOM, 5)
            .unwrap());
        assert!(!handshake
            .handle_property_notify(&mut transport, proxy, "WM_CLASS", 6)
            .unwrap());
        assert_eq!(handshake.state(), &before);
    }

    #[test]
    fn test_confirm_without_notification_fails() {
        let mut transport = ScriptedTransport::new();
        let mut handshake = OwnershipHandshake::new(0);
        handshake.begin(&mut transport).unwrap();
        handshake.check_existing_owner(&mut transport, ROOT).unwrap();
        assert!(matches!(handshake.confirm(), Err(OwnershipError::NotConfirmed)));
        assert_eq!(handshake.state(), &OwnershipState::Failed(FailureReason::NotConfirmed));
    }

    #[test]
    fn test_steps_out_of_order_are_rejected() {
        let mut transport = ScriptedTransport::new();
        let mut handshake = OwnershipHandshake::new(0);
        assert!(matches!(
            handshake.check_existing_owner(&mut transport, ROOT),
            Err(OwnershipError::OutOfOrder { step: "check_existing_owner", .. })
        ));
        handshake.begin(&mut transport).unwrap();
        assert!(matches!(
            handshake.begin(&mut transport),
            Err(OwnershipError::OutOfOrder { step: "begin", .. })
        ));
    }

    #[test]
    fn test_release_destroys_proxy_once() {
        let mut transport = ScriptedTransport::new();
        let server = transport.server();
        let mut handshake = OwnershipHandshake::new(0);
        handshake.begin(&mut transport).unwrap();
        handshake.check_existing_owner(&mut transport, ROOT).unwrap();
        let proxy = handshake.proxy().unwrap();

        handshake.release(&mut transport).unwrap();
        handshake.release(&mut transport).unwrap();
        assert_eq!(server.borrow().count_sent("DestroyWindow"), 1);
        assert_eq!(server.borrow().sent.last(), Some(&Request::DestroyWindow { window: proxy }));
    }
}
