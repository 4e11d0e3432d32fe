//! Event payloads
//!
//! Event group codes and the fixed parameter layouts the engine passes to the
//! element event procedure, one struct per group.

use std::ffi::{c_char, c_void, CStr};

use crate::types::{ElementHandle, Point, Rect, Size};
use crate::value::Value;

// ============================================================================
// Event groups
// ============================================================================

/// Attach/detach notifications
pub const HANDLE_INITIALIZATION: u32 = 0x0000;
pub const HANDLE_MOUSE: u32 = 0x0001;
pub const HANDLE_KEY: u32 = 0x0002;
pub const HANDLE_FOCUS: u32 = 0x0004;
pub const HANDLE_SCROLL: u32 = 0x0008;
pub const HANDLE_TIMER: u32 = 0x0010;
pub const HANDLE_SIZE: u32 = 0x0020;
pub const HANDLE_DRAW: u32 = 0x0040;
pub const HANDLE_DATA_ARRIVED: u32 = 0x0080;
/// Synthesized events from built-in behaviors: clicks, value changes
pub const HANDLE_BEHAVIOR_EVENT: u32 = 0x0100;
pub const HANDLE_METHOD_CALL: u32 = 0x0200;
pub const HANDLE_SCRIPTING_METHOD_CALL: u32 = 0x0400;
pub const HANDLE_TISCRIPT_METHOD_CALL: u32 = 0x0800;
/// Drag and drop exchange
pub const HANDLE_EXCHANGE: u32 = 0x1000;
pub const HANDLE_GESTURE: u32 = 0x2000;
/// Scripting object model: passport and asset requests
pub const HANDLE_SOM: u32 = 0x8000;
pub const HANDLE_ALL: u32 = 0xFFFF;
/// The engine asks which groups a handler wants; the reply is written to a `u32`
pub const SUBSCRIPTIONS_REQUEST: u32 = 0xFFFF_FFFF;

// ============================================================================
// Initialization
// ============================================================================

pub const BEHAVIOR_DETACH: u32 = 0;
pub const BEHAVIOR_ATTACH: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitializationParams {
    pub cmd: u32,
}

// ============================================================================
// Phases and behavior events
// ============================================================================

/// Bubbling phase
pub const BUBBLING: u32 = 0;
/// Sinking (capture) phase
pub const SINKING: u32 = 0x8000;
/// The event was already handled by someone else
pub const HANDLED: u32 = 0x10000;

pub const BUTTON_CLICK: u32 = 0;
pub const BUTTON_PRESS: u32 = 1;
pub const BUTTON_STATE_CHANGED: u32 = 2;
pub const EDIT_VALUE_CHANGING: u32 = 3;
pub const EDIT_VALUE_CHANGED: u32 = 4;
pub const SELECT_SELECTION_CHANGED: u32 = 5;
pub const SELECT_STATE_CHANGED: u32 = 6;
pub const POPUP_REQUEST: u32 = 7;
pub const POPUP_READY: u32 = 8;
pub const POPUP_DISMISSED: u32 = 9;
pub const MENU_ITEM_ACTIVE: u32 = 0xA;
pub const MENU_ITEM_CLICK: u32 = 0xB;
pub const CONTEXT_MENU_REQUEST: u32 = 0x10;
pub const DOCUMENT_COMPLETE: u32 = 0x93;
/// First code available for application events
pub const FIRST_APPLICATION_EVENT_CODE: u32 = 0x100;

#[repr(C)]
#[derive(Debug, Clone)]
pub struct BehaviorEventParams {
    /// Event code in the low 12 bits, phase flags above
    pub cmd: u32,
    /// Owner of the event, e.g. the element a context menu belongs to
    pub he_target: ElementHandle,
    /// Source element
    pub he: ElementHandle,
    /// UI action that caused the event, or an application value
    pub reason: usize,
    pub data: Value,
}

impl BehaviorEventParams {
    pub fn new(cmd: u32, phase: u32, target: ElementHandle) -> Self {
        Self { cmd: cmd | phase, he_target: target, he: target, reason: 0, data: Value::new() }
    }

    pub fn cmd(&self) -> u32 {
        self.cmd & 0xFFF
    }

    pub fn phase(&self) -> u32 {
        self.cmd & 0xFFFF_F000
    }
}

// ============================================================================
// Input
// ============================================================================

pub const MOUSE_ENTER: u32 = 0;
pub const MOUSE_LEAVE: u32 = 1;
pub const MOUSE_MOVE: u32 = 2;
pub const MOUSE_UP: u32 = 3;
pub const MOUSE_DOWN: u32 = 4;
pub const MOUSE_DCLICK: u32 = 5;
pub const MOUSE_WHEEL: u32 = 6;
pub const MOUSE_TICK: u32 = 7;
pub const MOUSE_IDLE: u32 = 8;
pub const MOUSE_CLICK: u32 = 0xFF;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseParams {
    pub cmd: u32,
    pub target: ElementHandle,
    /// Position relative to the target element
    pub pos: Point,
    /// Position relative to the view
    pub pos_view: Point,
    pub button_state: u32,
    pub alt_state: u32,
    pub cursor_type: u32,
    pub is_on_icon: i32,
    pub dragging: ElementHandle,
    pub dragging_mode: u32,
}

pub const KEY_DOWN: u32 = 0;
pub const KEY_UP: u32 = 1;
pub const KEY_CHAR: u32 = 2;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyParams {
    pub cmd: u32,
    pub target: ElementHandle,
    pub key_code: u32,
    pub alt_state: u32,
}

pub const FOCUS_OUT: u32 = 0;
pub const FOCUS_IN: u32 = 1;
pub const FOCUS_GOT: u32 = 2;
pub const FOCUS_LOST: u32 = 3;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusParams {
    pub cmd: u32,
    pub target: ElementHandle,
    pub by_mouse_click: i32,
    /// Setting this in the FOCUS_LOST phase keeps focus where it is
    pub cancel: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollParams {
    pub cmd: u32,
    pub target: ElementHandle,
    pub pos: i32,
    pub vertical: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureParams {
    pub cmd: u32,
    pub target: ElementHandle,
    pub pos: Point,
    pub pos_view: Point,
    pub flags: u32,
    pub delta_time: u32,
    pub delta_xy: Size,
    pub delta_v: f64,
}

#[repr(C)]
#[derive(Debug, Clone)]
pub struct ExchangeParams {
    pub cmd: u32,
    pub target: ElementHandle,
    pub source: ElementHandle,
    pub pos: Point,
    pub pos_view: Point,
    pub mode: u32,
    pub data: Value,
}

// ============================================================================
// Rendering and timers
// ============================================================================

pub const DRAW_BACKGROUND: u32 = 0;
pub const DRAW_CONTENT: u32 = 1;
pub const DRAW_FOREGROUND: u32 = 2;
pub const DRAW_OUTLINE: u32 = 3;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawParams {
    pub cmd: u32,
    pub gfx: *mut c_void,
    pub area: Rect,
    pub reserved: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerParams {
    /// 0 for the element's default timer
    pub timer_id: usize,
}

// ============================================================================
// Calls and data
// ============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodParams {
    pub method_id: u32,
}

/// Call of a native method from script, by name
#[repr(C)]
#[derive(Debug)]
pub struct ScriptingMethodParams {
    name: *const c_char,
    argv: *const Value,
    argc: u32,
    /// Undefined unless the handler sets it
    pub result: Value,
}

impl ScriptingMethodParams {
    /// Call record for `name` with `args`
    ///
    /// # Safety
    /// `name` and `args` must outlive the record and every copy the engine
    /// reads.
    pub unsafe fn new(name: &CStr, args: &[Value]) -> Self {
        Self {
            name: name.as_ptr(),
            argv: args.as_ptr(),
            argc: args.len() as u32,
            result: Value::new(),
        }
    }

    /// Method name, empty when missing or not UTF-8
    pub fn name(&self) -> &str {
        if self.name.is_null() {
            return "";
        }
        unsafe { CStr::from_ptr(self.name) }.to_str().unwrap_or("")
    }

    pub fn args(&self) -> &[Value] {
        if self.argv.is_null() || self.argc == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.argv, self.argc as usize) }
    }

    pub fn set_result(&mut self, result: Value) {
        self.result = result;
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiscriptMethodParams {
    pub vm: usize,
    /// Method id (a symbol)
    pub tag: u64,
    pub result: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataArrivedParams {
    pub initiator: ElementHandle,
    data: *const u8,
    data_size: u32,
    pub data_type: u32,
    /// HTTP status, 0 for an unknown error
    pub status: u32,
    /// NUL-terminated UTF-16
    uri: *const u16,
}

impl DataArrivedParams {
    /// A `uri` without its terminating NUL reads as empty
    ///
    /// # Safety
    /// `data` and `uri` must outlive the record and every copy of it.
    pub unsafe fn new(initiator: ElementHandle, data: &[u8], data_type: u32, status: u32, uri: &[u16]) -> Self {
        Self {
            initiator,
            data: data.as_ptr(),
            data_size: data.len() as u32,
            data_type,
            status,
            uri: wide_ptr(uri),
        }
    }

    pub fn data(&self) -> &[u8] {
        if self.data.is_null() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.data, self.data_size as usize) }
    }

    pub fn uri(&self) -> String {
        unsafe { wide_to_string(self.uri) }
    }
}

pub const SOM_GET_PASSPORT: u32 = 0;
pub const SOM_GET_ASSET: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SomParams {
    pub cmd: u32,
    /// Passport or asset pointer, filled by the handler
    pub result: *mut c_void,
}

/// Read a NUL-terminated UTF-16 string, replacing bad surrogates
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated buffer.
pub unsafe fn wide_to_string(ptr: *const u16) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0;
    while unsafe { *ptr.add(len) } != 0 {
        len += 1;
    }
    let units = unsafe { std::slice::from_raw_parts(ptr, len) };
    String::from_utf16_lossy(units)
}

/// Pointer to a NUL-terminated UTF-16 buffer, null when `s` lacks the NUL
pub(crate) fn wide_ptr(s: &[u16]) -> *const u16 {
    if s.last() == Some(&0) { s.as_ptr() } else { std::ptr::null() }
}

/// NUL-terminated UTF-16 copy of `s`
pub fn string_to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn test_behavior_cmd_and_phase() {
        let p = BehaviorEventParams::new(BUTTON_CLICK, SINKING | HANDLED, ElementHandle(1));
        assert_eq!(p.cmd(), BUTTON_CLICK);
        assert_eq!(p.phase(), SINKING | HANDLED);

        let p = BehaviorEventParams::new(MENU_ITEM_CLICK, BUBBLING, ElementHandle(1));
        assert_eq!(p.cmd(), MENU_ITEM_CLICK);
        assert_eq!(p.phase(), BUBBLING);
    }

    #[test]
    fn test_scripting_params_views() {
        let name = CString::new("sum").unwrap();
        let args = [Value::from(1), Value::from(2)];
        let params = unsafe { ScriptingMethodParams::new(&name, &args) };
        assert_eq!(params.name(), "sum");
        assert_eq!(params.args().len(), 2);
        assert_eq!(params.args()[1], Value::from(2));
    }

    #[test]
    fn test_scripting_params_empty_and_non_utf8() {
        let params = unsafe { ScriptingMethodParams::new(c"", &[]) };
        assert_eq!(params.name(), "");
        assert!(params.args().is_empty());

        let bad = CString::new(vec![0xff, 0xfe]).unwrap();
        let params = unsafe { ScriptingMethodParams::new(&bad, &[]) };
        assert_eq!(params.name(), "");
    }

    #[test]
    fn test_wide_strings() {
        let wide = string_to_wide("this://app/𝄞");
        assert_eq!(*wide.last().unwrap(), 0);
        assert_eq!(unsafe { wide_to_string(wide.as_ptr()) }, "this://app/𝄞");
        assert_eq!(unsafe { wide_to_string(std::ptr::null()) }, "");
    }

    #[test]
    fn test_data_arrived_views() {
        let uri = string_to_wide("http://x/y");
        let body = b"payload";
        let params = unsafe { DataArrivedParams::new(ElementHandle::NULL, body, 0, 200, &uri) };
        assert_eq!(params.data(), b"payload");
        assert_eq!(params.uri(), "http://x/y");

        let unterminated: Vec<u16> = "http://x/y".encode_utf16().collect();
        let params = unsafe { DataArrivedParams::new(ElementHandle::NULL, &[], 0, 0, &unterminated) };
        assert_eq!(params.uri(), "");
        assert!(params.data().is_empty());
    }
}
