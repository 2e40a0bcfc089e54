//! JSON-lines transport over a Unix stream socket.
//!
//! Every message is one JSON object per line. The server opens with
//! `{"setup":{...}}`; afterwards it sends `{"reply":{...}}`, `{"error":{...}}`
//! and `{"event":{...}}` lines, and the client sends
//! `{"sequence":n,"request":{...}}` lines. The socket stays non-blocking so
//! events can be polled; it is switched to blocking only while flushing or
//! waiting for a specific reply.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io::{self, ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use novade_compositor_core::error::TransportError;
use novade_compositor_core::protocol::{DisplayEvent, ProtocolError, Reply, Request, ScreenInfo};
use novade_compositor_core::transport::Transport;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

const READ_CHUNK: usize = 16 * 1024;

/// Connection parameters announced by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setup {
    pub screen: ScreenInfo,
    /// First id of the range the client may allocate resources from.
    pub resource_base: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMessage {
    pub sequence: u64,
    pub reply: Reply,
}

/// A line sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inbound {
    Setup(Setup),
    Reply(ReplyMessage),
    Error(ProtocolError),
    Event(DisplayEvent),
}

/// A line sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outbound {
    pub sequence: u64,
    pub request: Request,
}

pub struct StreamTransport {
    stream: UnixStream,
    screen: ScreenInfo,
    next_id: u32,
    next_sequence: u64,
    outgoing: Vec<u8>,
    incoming: Vec<u8>,
    /// Sequences of requests whose reply has not arrived yet.
    awaiting: BTreeSet<u64>,
    replies: BTreeMap<u64, Result<Reply, ProtocolError>>,
    events: VecDeque<DisplayEvent>,
    connected: bool,
}

impl StreamTransport {
    pub fn connect(path: &Path) -> Result<Self, TransportError> {
        debug!(path = %path.display(), "Connecting to display server");
        let stream = UnixStream::connect(path)?;
        Self::from_stream(stream)
    }

    /// Performs the setup exchange on an already connected stream.
    pub fn from_stream(stream: UnixStream) -> Result<Self, TransportError> {
        let mut transport = Self {
            stream,
            screen: ScreenInfo {
                root: Default::default(),
                width: 0,
                height: 0,
                number: 0,
            },
            next_id: 0,
            next_sequence: 0,
            outgoing: Vec::new(),
            incoming: Vec::new(),
            awaiting: BTreeSet::new(),
            replies: BTreeMap::new(),
            events: VecDeque::new(),
            connected: true,
        };
        let setup = loop {
            match transport.next_line()? {
                Some(Inbound::Setup(setup)) => break setup,
                Some(other) => {
                    return Err(TransportError::Codec(format!(
                        "expected setup message, got {:?}",
                        other
                    )))
                }
                None => transport.read_blocking()?,
            }
        };
        transport.stream.set_nonblocking(true)?;
        transport.screen = setup.screen;
        transport.next_id = setup.resource_base;
        debug!(root = %setup.screen.root, width = setup.screen.width, height = setup.screen.height, "Display server setup received");
        Ok(transport)
    }

    /// A second handle on the socket, for readiness polling.
    pub fn try_clone_stream(&self) -> io::Result<UnixStream> {
        self.stream.try_clone()
    }

    /// Pops one complete line from the inbound buffer and decodes it.
    fn next_line(&mut self) -> Result<Option<Inbound>, TransportError> {
        loop {
            let Some(end) = self.incoming.iter().position(|b| *b == b'\n') else {
                return Ok(None);
            };
            let line: Vec<u8> = self.incoming.drain(..=end).collect();
            let line = &line[..end];
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return serde_json::from_slice(line)
                .map(Some)
                .map_err(|e| TransportError::Codec(e.to_string()));
        }
    }

    /// Decodes every buffered line into replies and events.
    fn dispatch_lines(&mut self) -> Result<(), TransportError> {
        while let Some(message) = self.next_line()? {
            match message {
                Inbound::Reply(ReplyMessage { sequence, reply }) => {
                    if !self.awaiting.remove(&sequence) {
                        warn!(sequence, "Dropping reply nobody waits for");
                        continue;
                    }
                    self.replies.insert(sequence, Ok(reply));
                }
                Inbound::Error(error) if self.awaiting.remove(&error.sequence) => {
                    self.replies.insert(error.sequence, Err(error));
                }
                Inbound::Error(error) => self.events.push_back(DisplayEvent::Error(error)),
                Inbound::Event(event) => self.events.push_back(event),
                Inbound::Setup(_) => return Err(TransportError::Codec("unexpected setup message".to_string())),
            }
        }
        Ok(())
    }

    /// Reads whatever is available. Returns the number of bytes read; zero
    /// means nothing was ready.
    fn read_available(&mut self) -> Result<usize, TransportError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(self.disconnected()),
                Ok(n) => {
                    self.incoming.extend_from_slice(&chunk[..n]);
                    trace!(bytes = n, "Read from display server");
                    return Ok(n);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(0),
                Err(e) => return Err(self.io_failure(e)),
            }
        }
    }

    fn read_blocking(&mut self) -> Result<(), TransportError> {
        self.set_blocking(true)?;
        let result = self.read_available();
        self.set_blocking(false)?;
        result.map(|_| ())
    }

    fn set_blocking(&mut self, blocking: bool) -> Result<(), TransportError> {
        self.stream.set_nonblocking(!blocking).map_err(TransportError::Io)
    }

    fn disconnected(&mut self) -> TransportError {
        if self.connected {
            warn!("Display server closed the connection");
        }
        self.connected = false;
        TransportError::Disconnected
    }

    fn io_failure(&mut self, error: io::Error) -> TransportError {
        self.connected = false;
        TransportError::Io(error)
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.connected {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }
}

impl Transport for StreamTransport {
    fn screen(&self) -> ScreenInfo {
        self.screen
    }

    fn generate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    fn send_request(&mut self, request: Request) -> Result<u64, TransportError> {
        self.ensure_connected()?;
        self.next_sequence += 1;
        let sequence = self.next_sequence;
        if request.expects_reply() {
            self.awaiting.insert(sequence);
        }
        trace!(sequence, request = request.name(), "Queueing request");
        serde_json::to_writer(&mut self.outgoing, &Outbound { sequence, request })
            .map_err(|e| TransportError::Codec(e.to_string()))?;
        self.outgoing.push(b'\n');
        Ok(sequence)
    }

    fn wait_for_reply(&mut self, sequence: u64) -> Result<Reply, TransportError> {
        self.flush()?;
        loop {
            self.dispatch_lines()?;
            if let Some(reply) = self.replies.remove(&sequence) {
                return reply.map_err(TransportError::Protocol);
            }
            if !self.awaiting.contains(&sequence) {
                return Err(TransportError::UnknownSequence(sequence));
            }
            self.read_blocking()?;
        }
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.ensure_connected()?;
        if self.outgoing.is_empty() {
            return Ok(());
        }
        self.set_blocking(true)?;
        let result = self.stream.write_all(&self.outgoing).and_then(|_| self.stream.flush());
        self.set_blocking(false)?;
        match result {
            Ok(()) => {
                self.outgoing.clear();
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Err(self.disconnected()),
            Err(e) => Err(self.io_failure(e)),
        }
    }

    fn poll_for_event(&mut self) -> Result<Option<DisplayEvent>, TransportError> {
        if let Some(event) = self.events.pop_front() {
            return Ok(Some(event));
        }
        self.ensure_connected()?;
        self.read_available()?;
        self.dispatch_lines()?;
        Ok(self.events.pop_front())
    }

    fn poll_for_queued_event(&mut self) -> Option<DisplayEvent> {
        if self.events.is_empty() {
            if let Err(e) = self.dispatch_lines() {
                warn!(error = %e, "Malformed buffered message");
            }
        }
        self.events.pop_front()
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use novade_compositor_core::protocol::{DamageNotify, ErrorCode, SelectionOwner, WindowId};
    use novade_compositor_core::region::Rectangle;
    use novade_compositor_core::transport::TransportExt;
    use pretty_assertions::assert_eq;
    use std::io::{BufRead, BufReader};

    const SCREEN: ScreenInfo = ScreenInfo {
        root: WindowId(0x100),
        width: 800,
        height: 600,
        number: 0,
    };

    fn send_line(peer: &mut UnixStream, message: &Inbound) {
        let mut line = serde_json::to_vec(message).unwrap();
        line.push(b'\n');
        peer.write_all(&line).unwrap();
    }

    fn connected() -> (StreamTransport, UnixStream) {
        let (client, mut server) = UnixStream::pair().unwrap();
        send_line(
            &mut server,
            &Inbound::Setup(Setup {
                screen: SCREEN,
                resource_base: 0x0040_0000,
            }),
        );
        (StreamTransport::from_stream(client).unwrap(), server)
    }

    fn read_request(reader: &mut BufReader<UnixStream>) -> Outbound {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        serde_json::from_str(&line).unwrap()
    }

    fn damage_event(x: i32) -> Inbound {
        Inbound::Event(DisplayEvent::Damage(DamageNotify {
            damage: Default::default(),
            drawable: WindowId(0x20),
            area: Rectangle::new(x, 0, 1, 1),
        }))
    }

    #[test]
    fn test_setup_announces_screen_and_id_range() {
        let (mut transport, _server) = connected();
        assert_eq!(transport.screen(), SCREEN);
        assert_eq!(transport.generate_id(), 0x0040_0000);
        assert_eq!(transport.generate_id(), 0x0040_0001);
    }

    #[test]
    fn test_requests_are_written_on_flush() {
        let (mut transport, server) = connected();
        transport.send(Request::GrabServer).unwrap();
        transport.send(Request::UngrabServer).unwrap();
        transport.flush().unwrap();

        let mut reader = BufReader::new(server);
        assert_eq!(
            read_request(&mut reader),
            Outbound {
                sequence: 1,
                request: Request::GrabServer
            }
        );
        assert_eq!(read_request(&mut reader).sequence, 2);
    }

    #[test]
    fn test_events_arriving_before_a_reply_are_kept() {
        let (mut transport, mut server) = connected();
        let cookie = transport.get_selection_owner("_NET_WM_CM_S0").unwrap();
        transport.flush().unwrap();
        send_line(&mut server, &damage_event(1));
        send_line(
            &mut server,
            &Inbound::Reply(ReplyMessage {
                sequence: cookie.sequence(),
                reply: Reply::SelectionOwner(SelectionOwner { owner: WindowId::NONE }),
            }),
        );

        assert_eq!(cookie.finalize(&mut transport).unwrap().owner, WindowId::NONE);
        assert!(matches!(transport.poll_for_queued_event(), Some(DisplayEvent::Damage(_))));
        assert_eq!(transport.poll_for_queued_event(), None);
    }

    #[test]
    fn test_error_for_pending_request_is_returned_by_finalize() {
        let (mut transport, mut server) = connected();
        let cookie = transport.get_window_info(WindowId(0x99), true).unwrap();
        send_line(
            &mut server,
            &Inbound::Error(ProtocolError {
                sequence: cookie.sequence(),
                code: ErrorCode::Window,
                resource: 0x99,
                request: "GetWindowInfo".to_string(),
            }),
        );
        match cookie.finalize(&mut transport) {
            Err(TransportError::Protocol(error)) => assert_eq!(error.code, ErrorCode::Window),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_error_for_void_request_becomes_event() {
        let (mut transport, mut server) = connected();
        let sequence = transport.send_request(Request::RedirectSubwindows { window: SCREEN.root }).unwrap();
        send_line(
            &mut server,
            &Inbound::Error(ProtocolError {
                sequence,
                code: ErrorCode::Access,
                resource: SCREEN.root.0,
                request: "RedirectSubwindows".to_string(),
            }),
        );
        let event = loop {
            if let Some(event) = transport.poll_for_event().unwrap() {
                break event;
            }
        };
        assert!(matches!(event, DisplayEvent::Error(ProtocolError { code: ErrorCode::Access, .. })));
    }

    #[test]
    fn test_queued_poll_never_reads_the_socket() {
        let (mut transport, mut server) = connected();
        send_line(&mut server, &damage_event(1));
        assert_eq!(transport.poll_for_queued_event(), None);
        let event = loop {
            if let Some(event) = transport.poll_for_event().unwrap() {
                break event;
            }
        };
        assert!(matches!(event, DisplayEvent::Damage(_)));
    }

    #[test]
    fn test_closed_peer_disconnects() {
        let (mut transport, server) = connected();
        drop(server);
        assert!(matches!(transport.poll_for_event(), Err(TransportError::Disconnected)));
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.send_request(Request::Sync),
            Err(TransportError::Disconnected)
        ));
    }

    #[test]
    fn test_malformed_line_is_a_codec_error() {
        let (client, mut server) = UnixStream::pair().unwrap();
        server.write_all(b"{not json}\n").unwrap();
        assert!(matches!(
            StreamTransport::from_stream(client),
            Err(TransportError::Codec(_))
        ));
    }
}
