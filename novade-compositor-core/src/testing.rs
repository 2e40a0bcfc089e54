//! In-memory display server and recording collaborators for unit tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

use novade_core::config::CompositorConfig;

use crate::compositor::Compositor;
use crate::error::{BackendError, PluginError, TransportError};
use crate::extensions::Extensions;
use crate::plugin::{PaintFrame, Plugin, PluginCapabilities, PluginDispatch, RenderingBackend};
use crate::protocol::{
    DisplayEvent, ErrorCode, EventMask, ExtensionInfo, Geometry, MapState, ProtocolError, RefreshRateInfo, Reply,
    Request, ScreenInfo, SelectionOwner, ShapeInfo, TreeInfo, WindowAttributes, WindowId, WindowInfo,
};
use crate::region::Rectangle;
use crate::registry::{WindowRef, WindowRegistry};
use crate::window::Window;

pub(crate) const ROOT: WindowId = WindowId(0x100);

pub(crate) type Journal = Rc<RefCell<Vec<String>>>;

#[derive(Debug, Clone)]
pub(crate) struct FakeWindow {
    pub attributes: WindowAttributes,
    pub geometry: Geometry,
    pub shape: Option<Vec<Rectangle>>,
}

/// Scripted server state shared between a test and its [`ScriptedTransport`].
#[derive(Debug)]
pub(crate) struct FakeServer {
    pub screen: ScreenInfo,
    pub windows: BTreeMap<WindowId, FakeWindow>,
    pub children: Vec<WindowId>,
    pub selection_owner: WindowId,
    pub refresh_rate: Option<u16>,
    pub extensions: BTreeMap<String, ExtensionInfo>,
    /// Requests whose name is listed here fail with the given code.
    pub failing: BTreeMap<&'static str, ErrorCode>,
    pub sent: Vec<Request>,
    /// Events that arrive when the connection is read.
    pub events: VecDeque<DisplayEvent>,
    /// Events already sitting in the client-side buffer.
    pub queued: VecDeque<DisplayEvent>,
    /// When set, every read of the connection yields this event and buffers another copy.
    pub endless: Option<DisplayEvent>,
    pub connected: bool,
    pub polls: usize,
    pub journal: Journal,
    replies: BTreeMap<u64, Result<Reply, ProtocolError>>,
    property_listeners: BTreeSet<WindowId>,
    next_sequence: u64,
    next_id: u32,
    clock: u32,
}

impl FakeServer {
    pub fn new() -> Self {
        let mut extensions = BTreeMap::new();
        for (name, major, minor) in [
            ("Composite", 0, 4),
            ("DAMAGE", 1, 1),
            ("XFIXES", 5, 0),
            ("SHAPE", 1, 1),
            ("RANDR", 1, 5),
        ] {
            extensions.insert(
                name.to_string(),
                ExtensionInfo {
                    present: true,
                    major_version: major,
                    minor_version: minor,
                },
            );
        }
        Self {
            screen: ScreenInfo {
                root: ROOT,
                width: 1024,
                height: 768,
                number: 0,
            },
            windows: BTreeMap::new(),
            children: Vec::new(),
            selection_owner: WindowId::NONE,
            refresh_rate: Some(60),
            extensions,
            failing: BTreeMap::new(),
            sent: Vec::new(),
            events: VecDeque::new(),
            queued: VecDeque::new(),
            endless: None,
            connected: true,
            polls: 0,
            journal: Rc::new(RefCell::new(Vec::new())),
            replies: BTreeMap::new(),
            property_listeners: BTreeSet::new(),
            next_sequence: 0,
            next_id: 0x0060_0000,
            clock: 1000,
        }
    }

    /// Adds a top-level window above the existing ones.
    pub fn add_window(&mut self, id: WindowId, attributes: WindowAttributes, geometry: Geometry) {
        self.windows.insert(
            id,
            FakeWindow {
                attributes,
                geometry,
                shape: None,
            },
        );
        self.children.push(id);
    }

    pub fn add_mapped_window(&mut self, id: WindowId, geometry: Geometry) {
        self.add_window(
            id,
            WindowAttributes {
                map_state: MapState::Viewable,
                ..Default::default()
            },
            geometry,
        );
    }

    pub fn sent_names(&self) -> Vec<&'static str> {
        self.sent.iter().map(Request::name).collect()
    }

    pub fn count_sent(&self, name: &str) -> usize {
        self.sent.iter().filter(|r| r.name() == name).count()
    }

    fn bad_window(sequence: u64, request: &Request, window: WindowId) -> ProtocolError {
        ProtocolError {
            sequence,
            code: ErrorCode::Window,
            resource: window.0,
            request: request.name().to_string(),
        }
    }

    fn answer(&mut self, sequence: u64, request: &Request) -> Option<Result<Reply, ProtocolError>> {
        match request {
            Request::QueryExtension { name } => {
                let info = self.extensions.get(name).copied().unwrap_or(ExtensionInfo {
                    present: false,
                    major_version: 0,
                    minor_version: 0,
                });
                Some(Ok(Reply::Extension(info)))
            }
            Request::GetSelectionOwner { .. } => Some(Ok(Reply::SelectionOwner(SelectionOwner {
                owner: self.selection_owner,
            }))),
            Request::SetSelectionOwner { owner, .. } => {
                self.selection_owner = *owner;
                None
            }
            Request::SelectInput { window, mask } => {
                if mask.contains(EventMask::PROPERTY_CHANGE) {
                    self.property_listeners.insert(*window);
                }
                None
            }
            Request::ChangeProperty { window, property, .. } => {
                if self.property_listeners.contains(window) {
                    self.clock += 1;
                    self.events.push_back(DisplayEvent::Property {
                        window: *window,
                        atom: property.clone(),
                        time: self.clock,
                        deleted: false,
                    });
                }
                None
            }
            Request::GetWindowInfo { window, geometry } => Some(match self.windows.get(window) {
                Some(fake) => Ok(Reply::WindowInfo(WindowInfo {
                    attributes: fake.attributes,
                    geometry: geometry.then_some(fake.geometry),
                })),
                None => Err(Self::bad_window(sequence, request, *window)),
            }),
            Request::GetShape { window } => Some(match self.windows.get(window) {
                Some(fake) => Ok(Reply::Shape(ShapeInfo {
                    shaped: fake.shape.is_some(),
                    rectangles: fake.shape.clone().unwrap_or_default(),
                })),
                None => Err(Self::bad_window(sequence, request, *window)),
            }),
            Request::QueryTree { .. } => Some(Ok(Reply::Tree(TreeInfo {
                root: self.screen.root,
                children: self.children.clone(),
            }))),
            Request::GetRefreshRate { .. } => Some(Ok(Reply::RefreshRate(RefreshRateInfo {
                rate: self.refresh_rate,
            }))),
            Request::Sync => Some(Ok(Reply::Sync)),
            _ => None,
        }
    }
}

/// [`crate::transport::Transport`] backed by a shared [`FakeServer`].
pub(crate) struct ScriptedTransport {
    server: Rc<RefCell<FakeServer>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::with_server(Rc::new(RefCell::new(FakeServer::new())))
    }

    pub fn with_server(server: Rc<RefCell<FakeServer>>) -> Self {
        Self { server }
    }

    pub fn server(&self) -> Rc<RefCell<FakeServer>> {
        Rc::clone(&self.server)
    }
}

impl Drop for ScriptedTransport {
    fn drop(&mut self) {
        self.server.borrow().journal.borrow_mut().push("transport:close".to_string());
    }
}

impl crate::transport::Transport for ScriptedTransport {
    fn screen(&self) -> ScreenInfo {
        self.server.borrow().screen
    }

    fn generate_id(&mut self) -> u32 {
        let mut server = self.server.borrow_mut();
        server.next_id += 1;
        server.next_id
    }

    fn send_request(&mut self, request: Request) -> Result<u64, TransportError> {
        let mut server = self.server.borrow_mut();
        if !server.connected {
            return Err(TransportError::Disconnected);
        }
        server.next_sequence += 1;
        let sequence = server.next_sequence;
        if let Some(code) = server.failing.get(request.name()).copied() {
            let error = ProtocolError {
                sequence,
                code,
                resource: 0,
                request: request.name().to_string(),
            };
            if request.expects_reply() {
                server.replies.insert(sequence, Err(error));
            } else {
                server.events.push_back(DisplayEvent::Error(error));
            }
        } else if let Some(answer) = server.answer(sequence, &request) {
            server.replies.insert(sequence, answer);
        }
        if matches!(request, Request::DestroyWindow { .. }) {
            server.journal.borrow_mut().push(format!("request:{}", request.name()));
        }
        server.sent.push(request);
        Ok(sequence)
    }

    fn wait_for_reply(&mut self, sequence: u64) -> Result<Reply, TransportError> {
        let mut server = self.server.borrow_mut();
        if !server.connected {
            return Err(TransportError::Disconnected);
        }
        match server.replies.remove(&sequence) {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(error)) => Err(TransportError::Protocol(error)),
            None => Err(TransportError::UnknownSequence(sequence)),
        }
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        let server = self.server.borrow();
        if !server.connected {
            return Err(TransportError::Disconnected);
        }
        server.journal.borrow_mut().push("transport:flush".to_string());
        Ok(())
    }

    fn poll_for_event(&mut self) -> Result<Option<DisplayEvent>, TransportError> {
        let mut server = self.server.borrow_mut();
        if !server.connected {
            return Err(TransportError::Disconnected);
        }
        server.polls += 1;
        if let Some(event) = server.queued.pop_front() {
            return Ok(Some(event));
        }
        if let Some(event) = server.endless.clone() {
            server.queued.push_back(event.clone());
            return Ok(Some(event));
        }
        Ok(server.events.pop_front())
    }

    fn poll_for_queued_event(&mut self) -> Option<DisplayEvent> {
        self.server.borrow_mut().queued.pop_front()
    }

    fn is_connected(&self) -> bool {
        self.server.borrow().connected
    }
}

/// Shared record of what a [`RecordingBackend`] was asked to do.
#[derive(Debug, Default)]
pub(crate) struct BackendLog {
    pub initialized: bool,
    pub finalized: bool,
    pub frames: Vec<Vec<WindowId>>,
    pub whole_session_frames: usize,
    pub released: Vec<WindowId>,
    pub background_resets: usize,
}

pub(crate) struct RecordingBackend {
    pub log: Rc<RefCell<BackendLog>>,
    pub journal: Option<Journal>,
    pub fail_initialize: bool,
}

impl RecordingBackend {
    pub fn new() -> (Self, Rc<RefCell<BackendLog>>) {
        let log = Rc::new(RefCell::new(BackendLog::default()));
        (
            Self {
                log: Rc::clone(&log),
                journal: None,
                fail_initialize: false,
            },
            log,
        )
    }
}

impl Drop for RecordingBackend {
    fn drop(&mut self) {
        if let Some(journal) = &self.journal {
            journal.borrow_mut().push("backend:drop".to_string());
        }
    }
}

impl RenderingBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    fn initialize(&mut self, _screen: &ScreenInfo) -> Result<(), BackendError> {
        if self.fail_initialize {
            return Err(BackendError::Initialization {
                backend: "recording".to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        self.log.borrow_mut().initialized = true;
        Ok(())
    }

    fn finalize_initialize(&mut self) -> Result<(), BackendError> {
        self.log.borrow_mut().finalized = true;
        Ok(())
    }

    fn reset_background(&mut self, _screen: &ScreenInfo) {
        self.log.borrow_mut().background_resets += 1;
    }

    fn paint(&mut self, frame: PaintFrame<'_>) {
        let ids = frame
            .windows
            .iter()
            .filter_map(|r| frame.registry.get(*r).map(|w| w.id))
            .collect();
        let mut log = self.log.borrow_mut();
        log.frames.push(ids);
        if frame.whole_session {
            log.whole_session_frames += 1;
        }
    }

    fn release_window(&mut self, window: &mut Window) {
        window.rendering = None;
        self.log.borrow_mut().released.push(window.id);
        if let Some(journal) = &self.journal {
            journal.borrow_mut().push(format!("backend:release:{}", window.id));
        }
    }
}

/// Plugin whose answers are fixed by the test.
pub(crate) struct ScriptedPlugin {
    pub name: String,
    pub capabilities: PluginCapabilities,
    pub list: Option<Vec<WindowId>>,
    pub requirements_met: bool,
    pub fail_initialize: bool,
    pub journal: Journal,
}

impl ScriptedPlugin {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            capabilities: PluginCapabilities::EVENTS,
            list: None,
            requirements_met: true,
            fail_initialize: false,
            journal: Rc::clone(journal),
        }
    }

    pub fn supplying(mut self, list: Vec<WindowId>) -> Self {
        self.capabilities |= PluginCapabilities::SUPPLY_WINDOW_LIST;
        self.list = Some(list);
        self
    }

    fn record(&self, what: &str) {
        self.journal.borrow_mut().push(format!("plugin:{}:{}", self.name, what));
    }
}

impl Plugin for ScriptedPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> PluginCapabilities {
        self.capabilities
    }

    fn initialize(&mut self, _screen: &ScreenInfo) -> Result<(), PluginError> {
        if self.fail_initialize {
            return Err(PluginError::Initialization {
                plugin: self.name.clone(),
                reason: "scripted failure".to_string(),
            });
        }
        self.record("initialize");
        Ok(())
    }

    fn check_requirements(&mut self, _extensions: &Extensions) -> bool {
        self.record("check_requirements");
        self.requirements_met
    }

    fn supply_window_list(&mut self, registry: &WindowRegistry) -> Option<Vec<WindowRef>> {
        let ids = self.list.as_ref()?;
        Some(ids.iter().filter_map(|id| registry.lookup(*id)).collect())
    }

    fn on_event(&mut self, event: &DisplayEvent, _registry: &WindowRegistry) {
        self.record(&format!("event:{}", event.kind()));
    }

    fn unload(&mut self) {
        self.record("unload");
    }
}

/// A compositor wired to a fake server, a recording backend and scripted plugins.
pub(crate) struct Harness {
    pub compositor: Compositor<ScriptedTransport>,
    pub server: Rc<RefCell<FakeServer>>,
    pub backend: Rc<RefCell<BackendLog>>,
    pub journal: Journal,
}

/// Builds an uninitialized compositor. `setup` prepares the server, every
/// name in `plugins` becomes an event-observing [`ScriptedPlugin`].
pub(crate) fn harness(setup: impl FnOnce(&mut FakeServer), plugins: Vec<&str>) -> Harness {
    let server = Rc::new(RefCell::new(FakeServer::new()));
    setup(&mut server.borrow_mut());
    let journal = Rc::clone(&server.borrow().journal);

    let (mut backend, log) = RecordingBackend::new();
    backend.journal = Some(Rc::clone(&journal));

    let mut dispatch = PluginDispatch::new();
    for name in plugins {
        dispatch.register(Box::new(ScriptedPlugin::new(name, &journal)));
    }

    let compositor = Compositor::new(
        ScriptedTransport::with_server(Rc::clone(&server)),
        Box::new(backend),
        dispatch,
        &CompositorConfig::default(),
    );
    Harness {
        compositor,
        server,
        backend: log,
        journal,
    }
}
