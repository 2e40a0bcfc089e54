//! Messages exchanged with the display transport.
//!
//! The compositor speaks in terms of [`Request`]s (some of which expect a
//! [`Reply`]) and receives [`DisplayEvent`]s. All types are `serde`
//! serializable so a transport can put them on a wire unchanged.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::region::Rectangle;

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// The null resource.
            pub const NONE: $name = $name(0);

            pub fn is_none(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#010x}", self.0)
            }
        }
    };
}

resource_id!(
    /// Opaque, stable identifier of an on-screen window.
    WindowId
);
resource_id!(
    /// Change-tracking object attached to one window.
    DamageId
);
resource_id!(
    /// Offscreen buffer holding a window's contents.
    PixmapId
);

/// Server timestamp carried by property notifications.
pub type Timestamp = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapState {
    Unmapped,
    Unviewable,
    Viewable,
}

/// Position and size of a window. `x`/`y` locate the outer border corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub border_width: u32,
}

impl Geometry {
    pub fn new(x: i32, y: i32, width: u32, height: u32, border_width: u32) -> Self {
        Self { x, y, width, height, border_width }
    }

    /// Content area in screen coordinates.
    pub fn inner_rectangle(&self) -> Rectangle {
        let bw = self.border_width as i32;
        Rectangle::new(self.x + bw, self.y + bw, self.width as i32, self.height as i32)
    }

    /// Content area plus border in screen coordinates.
    pub fn outer_rectangle(&self) -> Rectangle {
        let bw2 = 2 * self.border_width as i32;
        Rectangle::new(self.x, self.y, self.width as i32 + bw2, self.height as i32 + bw2)
    }

    /// Content area in pixels.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Whether a change from `self` to `other` invalidates the offscreen buffer.
    pub fn size_differs(&self, other: &Geometry) -> bool {
        self.width != other.width || self.height != other.height || self.border_width != other.border_width
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowAttributes {
    pub map_state: MapState,
    #[serde(default)]
    pub override_redirect: bool,
    #[serde(default)]
    pub input_only: bool,
}

impl Default for WindowAttributes {
    fn default() -> Self {
        Self {
            map_state: MapState::Unmapped,
            override_redirect: false,
            input_only: false,
        }
    }
}

/// Root window and dimensions of the managed screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenInfo {
    pub root: WindowId,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub number: u32,
}

impl ScreenInfo {
    pub fn rectangle(&self) -> Rectangle {
        Rectangle::new(0, 0, self.width as i32, self.height as i32)
    }
}

bitflags! {
    /// Event classes selected on a window.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct EventMask: u32 {
        const STRUCTURE_NOTIFY = 1 << 0;
        const SUBSTRUCTURE_NOTIFY = 1 << 1;
        const PROPERTY_CHANGE = 1 << 2;
        const SCREEN_CHANGE = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackPlace {
    OnTop,
    OnBottom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    QueryExtension { name: String },
    GetSelectionOwner { selection: String },
    SetSelectionOwner { owner: WindowId, selection: String, time: Timestamp },
    CreateProxyWindow { window: WindowId, parent: WindowId },
    ChangeProperty { window: WindowId, property: String, value: String },
    DestroyWindow { window: WindowId },
    SelectInput { window: WindowId, mask: EventMask },
    GetWindowInfo { window: WindowId, geometry: bool },
    GetShape { window: WindowId },
    QueryTree { window: WindowId },
    RedirectSubwindows { window: WindowId },
    CreateDamage { damage: DamageId, window: WindowId },
    DestroyDamage { damage: DamageId },
    SubtractDamage { damage: DamageId },
    NameWindowPixmap { window: WindowId, pixmap: PixmapId },
    FreePixmap { pixmap: PixmapId },
    GetRefreshRate { window: WindowId },
    GrabServer,
    UngrabServer,
    Sync,
}

impl Request {
    /// Whether the server answers this request with a [`Reply`].
    pub fn expects_reply(&self) -> bool {
        matches!(
            self,
            Request::QueryExtension { .. }
                | Request::GetSelectionOwner { .. }
                | Request::GetWindowInfo { .. }
                | Request::GetShape { .. }
                | Request::QueryTree { .. }
                | Request::GetRefreshRate { .. }
                | Request::Sync
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Request::QueryExtension { .. } => "QueryExtension",
            Request::GetSelectionOwner { .. } => "GetSelectionOwner",
            Request::SetSelectionOwner { .. } => "SetSelectionOwner",
            Request::CreateProxyWindow { .. } => "CreateProxyWindow",
            Request::ChangeProperty { .. } => "ChangeProperty",
            Request::DestroyWindow { .. } => "DestroyWindow",
            Request::SelectInput { .. } => "SelectInput",
            Request::GetWindowInfo { .. } => "GetWindowInfo",
            Request::GetShape { .. } => "GetShape",
            Request::QueryTree { .. } => "QueryTree",
            Request::RedirectSubwindows { .. } => "RedirectSubwindows",
            Request::CreateDamage { .. } => "CreateDamage",
            Request::DestroyDamage { .. } => "DestroyDamage",
            Request::SubtractDamage { .. } => "SubtractDamage",
            Request::NameWindowPixmap { .. } => "NameWindowPixmap",
            Request::FreePixmap { .. } => "FreePixmap",
            Request::GetRefreshRate { .. } => "GetRefreshRate",
            Request::GrabServer => "GrabServer",
            Request::UngrabServer => "UngrabServer",
            Request::Sync => "Sync",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionInfo {
    pub present: bool,
    #[serde(default)]
    pub major_version: u32,
    #[serde(default)]
    pub minor_version: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionOwner {
    pub owner: WindowId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub attributes: WindowAttributes,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

/// Bounding shape relative to the window's content origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeInfo {
    /// `false` when the window has no custom shape.
    pub shaped: bool,
    #[serde(default)]
    pub rectangles: Vec<Rectangle>,
}

/// Children of a window in bottom-to-top stacking order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeInfo {
    pub root: WindowId,
    pub children: Vec<WindowId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRateInfo {
    /// Refresh rate in Hz, if the display reports one.
    pub rate: Option<u16>,
}

/// Acknowledgement of a [`Request::Sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDone;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Extension(ExtensionInfo),
    SelectionOwner(SelectionOwner),
    WindowInfo(WindowInfo),
    Shape(ShapeInfo),
    Tree(TreeInfo),
    RefreshRate(RefreshRateInfo),
    Sync,
}

impl Reply {
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Extension(_) => "Extension",
            Reply::SelectionOwner(_) => "SelectionOwner",
            Reply::WindowInfo(_) => "WindowInfo",
            Reply::Shape(_) => "Shape",
            Reply::Tree(_) => "Tree",
            Reply::RefreshRate(_) => "RefreshRate",
            Reply::Sync => "Sync",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Window,
    Pixmap,
    Match,
    Access,
    Value,
    Alloc,
    Damage,
    Other,
}

impl ErrorCode {
    pub fn label(self) -> &'static str {
        match self {
            ErrorCode::Window => "BadWindow",
            ErrorCode::Pixmap => "BadPixmap",
            ErrorCode::Match => "BadMatch",
            ErrorCode::Access => "BadAccess",
            ErrorCode::Value => "BadValue",
            ErrorCode::Alloc => "BadAlloc",
            ErrorCode::Damage => "BadDamage",
            ErrorCode::Other => "UnknownError",
        }
    }
}

/// Error reported by the server for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolError {
    pub sequence: u64,
    pub code: ErrorCode,
    #[serde(default)]
    pub resource: u32,
    /// Name of the failed request, see [`Request::name`].
    pub request: String,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in {} for resource {:#x} (sequence {})",
            self.code.label(),
            self.request,
            self.resource,
            self.sequence
        )
    }
}

impl std::error::Error for ProtocolError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageNotify {
    pub damage: DamageId,
    pub drawable: WindowId,
    /// Changed area relative to the window's content origin.
    pub area: Rectangle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisplayEvent {
    Damage(DamageNotify),
    Create {
        parent: WindowId,
        window: WindowId,
        geometry: Geometry,
        #[serde(default)]
        override_redirect: bool,
    },
    Configure {
        window: WindowId,
        /// Sibling directly below the window, or none when it is at the bottom.
        above_sibling: WindowId,
        geometry: Geometry,
        #[serde(default)]
        override_redirect: bool,
    },
    Destroy {
        window: WindowId,
    },
    Map {
        window: WindowId,
        #[serde(default)]
        override_redirect: bool,
    },
    Unmap {
        window: WindowId,
    },
    Reparent {
        window: WindowId,
        parent: WindowId,
        #[serde(default)]
        override_redirect: bool,
    },
    Circulate {
        window: WindowId,
        place: StackPlace,
    },
    Property {
        window: WindowId,
        atom: String,
        time: Timestamp,
        #[serde(default)]
        deleted: bool,
    },
    ScreenChange {
        root: WindowId,
        width: u32,
        height: u32,
        refresh_rate: Option<u16>,
    },
    Key {
        window: WindowId,
        keycode: u8,
        pressed: bool,
    },
    Button {
        window: WindowId,
        button: u8,
        pressed: bool,
    },
    Error(ProtocolError),
}

impl DisplayEvent {
    /// The window the event is about, if any.
    pub fn window(&self) -> Option<WindowId> {
        match self {
            DisplayEvent::Damage(notify) => Some(notify.drawable),
            DisplayEvent::Create { window, .. }
            | DisplayEvent::Configure { window, .. }
            | DisplayEvent::Destroy { window }
            | DisplayEvent::Map { window, .. }
            | DisplayEvent::Unmap { window }
            | DisplayEvent::Reparent { window, .. }
            | DisplayEvent::Circulate { window, .. }
            | DisplayEvent::Property { window, .. }
            | DisplayEvent::Key { window, .. }
            | DisplayEvent::Button { window, .. } => Some(*window),
            DisplayEvent::ScreenChange { root, .. } => Some(*root),
            DisplayEvent::Error(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DisplayEvent::Damage(_) => "Damage",
            DisplayEvent::Create { .. } => "Create",
            DisplayEvent::Configure { .. } => "Configure",
            DisplayEvent::Destroy { .. } => "Destroy",
            DisplayEvent::Map { .. } => "Map",
            DisplayEvent::Unmap { .. } => "Unmap",
            DisplayEvent::Reparent { .. } => "Reparent",
            DisplayEvent::Circulate { .. } => "Circulate",
            DisplayEvent::Property { .. } => "Property",
            DisplayEvent::ScreenChange { .. } => "ScreenChange",
            DisplayEvent::Key { .. } => "Key",
            DisplayEvent::Button { .. } => "Button",
            DisplayEvent::Error(_) => "Error",
        }
    }
}
