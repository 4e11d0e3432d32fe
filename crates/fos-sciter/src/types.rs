//! Handles and geometry
//!
//! Opaque engine identifiers and the plain structs that cross the ABI.

use std::ffi::c_void;

use bitflags::bitflags;

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(pub usize);

        impl $name {
            /// The bad/null sentinel, never a live object
            pub const NULL: Self = Self(0);

            pub fn is_valid(self) -> bool {
                self != Self::NULL
            }

            pub fn as_ptr(self) -> *mut c_void {
                self.0 as *mut c_void
            }

            pub fn from_ptr(ptr: *mut c_void) -> Self {
                Self(ptr as usize)
            }
        }
    };
}

opaque_handle!(
    /// `HELEMENT`
    ElementHandle
);
opaque_handle!(
    /// `HWINDOW`
    WindowHandle
);
opaque_handle!(
    /// `HREQUEST`
    RequestHandle
);

/// 2D point in device pixels
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// 2D size in device pixels
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub cx: i32,
    pub cy: i32,
}

/// Rectangle as left/top/right/bottom edges
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { left: x, top: y, right: x + width, bottom: y + height }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

bitflags! {
    /// `SCITER_CREATE_WINDOW_FLAGS`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WindowFlags: u32 {
        /// Child window only, if this flag is set all other flags ignored
        const CHILD = 1 << 0;
        const TITLEBAR = 1 << 1;
        const RESIZEABLE = 1 << 2;
        /// Tool window
        const TOOL = 1 << 3;
        /// Minimize / maximize buttons
        const CONTROLS = 1 << 4;
        const GLASSY = 1 << 5;
        /// Transparent window (e.g. WS_EX_LAYERED on Windows)
        const ALPHA = 1 << 6;
        /// Main window of the application, closing it exits the process
        const MAIN = 1 << 7;
        const POPUP = 1 << 8;
        /// Enables debug output and the inspector
        const ENABLE_DEBUG = 1 << 9;
        /// The window owns its script VM
        const OWNS_VM = 1 << 10;
    }
}

impl Default for WindowFlags {
    fn default() -> Self {
        Self::TITLEBAR | Self::RESIZEABLE | Self::CONTROLS | Self::MAIN | Self::ENABLE_DEBUG
    }
}
