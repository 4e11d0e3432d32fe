//! Host callback notifications
//!
//! Payloads of the window-level host callback and the record of closures a
//! window registers to receive them.

use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr};
use std::rc::Rc;

use crate::api::ElementEventProc;
use crate::events::{wide_ptr, wide_to_string};
use crate::handler::EventHandler;
use crate::types::{ElementHandle, Rect, RequestHandle, WindowHandle};

/// The engine is about to load a resource
pub const SC_LOAD_DATA: u32 = 0x01;
/// A resource finished loading
pub const SC_DATA_LOADED: u32 = 0x02;
/// An element declares a `behavior` in its style
pub const SC_ATTACH_BEHAVIOR: u32 = 0x04;
/// Always the last notification of an engine instance
pub const SC_ENGINE_DESTROYED: u32 = 0x05;
pub const SC_POSTED_NOTIFICATION: u32 = 0x06;
/// Critical rendering error, usually a bad gfx driver
pub const SC_GRAPHICS_CRITICAL_FAILURE: u32 = 0x07;
pub const SC_KEYBOARD_REQUEST: u32 = 0x08;
pub const SC_INVALIDATE_RECT: u32 = 0x09;

/// Reply to `SC_LOAD_DATA`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum LoadResult {
    /// Default loading, unless the handler already supplied the data
    Ok = 0,
    /// Fail the load
    Discard = 1,
    /// Data will be delivered later through the request API
    Delayed = 2,
}

/// `SciterResourceType`
pub mod resource {
    pub const HTML: u32 = 0;
    pub const IMAGE: u32 = 1;
    pub const STYLE: u32 = 2;
    pub const CURSOR: u32 = 3;
    pub const SCRIPT: u32 = 4;
    pub const RAW: u32 = 5;
    pub const FONT: u32 = 6;
    pub const SOUND: u32 = 7;
}

/// Common header of every notification
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackNotification {
    pub code: u32,
    pub hwnd: WindowHandle,
}

#[repr(C)]
#[derive(Debug)]
pub struct ScnLoadData {
    pub hdr: CallbackNotification,
    /// NUL-terminated UTF-16
    uri: *const u16,
    out_data: *const u8,
    out_data_size: u32,
    pub data_type: u32,
    pub request: RequestHandle,
    pub principal: ElementHandle,
    pub initiator: ElementHandle,
}

impl ScnLoadData {
    /// A `uri` without its terminating NUL reads as empty
    ///
    /// # Safety
    /// `uri` must outlive the notification.
    pub unsafe fn new(hwnd: WindowHandle, uri: &[u16], data_type: u32, request: RequestHandle) -> Self {
        Self {
            hdr: CallbackNotification { code: SC_LOAD_DATA, hwnd },
            uri: wide_ptr(uri),
            out_data: std::ptr::null(),
            out_data_size: 0,
            data_type,
            request,
            principal: ElementHandle::NULL,
            initiator: ElementHandle::NULL,
        }
    }

    pub fn uri(&self) -> String {
        unsafe { wide_to_string(self.uri) }
    }

    /// Hand the engine a buffer it can read after the callback returns
    pub fn set_data(&mut self, data: &'static [u8]) {
        self.out_data = data.as_ptr();
        self.out_data_size = data.len() as u32;
    }

    pub fn has_data(&self) -> bool {
        !self.out_data.is_null()
    }

    /// Buffer supplied through `set_data`, empty until then
    pub fn data(&self) -> &[u8] {
        if self.out_data.is_null() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.out_data, self.out_data_size as usize) }
    }
}

#[repr(C)]
#[derive(Debug)]
pub struct ScnDataLoaded {
    pub hdr: CallbackNotification,
    uri: *const u16,
    data: *const u8,
    data_size: u32,
    pub data_type: u32,
    pub status: u32,
}

impl ScnDataLoaded {
    /// # Safety
    /// `uri` and `data` must outlive the notification.
    pub unsafe fn new(hwnd: WindowHandle, uri: &[u16], data: &[u8], data_type: u32, status: u32) -> Self {
        Self {
            hdr: CallbackNotification { code: SC_DATA_LOADED, hwnd },
            uri: wide_ptr(uri),
            data: data.as_ptr(),
            data_size: data.len() as u32,
            data_type,
            status,
        }
    }

    pub fn uri(&self) -> String {
        unsafe { wide_to_string(self.uri) }
    }

    pub fn data(&self) -> &[u8] {
        if self.data.is_null() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.data, self.data_size as usize) }
    }
}

#[repr(C)]
#[derive(Debug)]
pub struct ScnAttachBehavior {
    pub hdr: CallbackNotification,
    pub element: ElementHandle,
    behavior_name: *const c_char,
    /// Filled by the host when it provides the behavior
    pub element_proc: Option<ElementEventProc>,
    pub element_tag: *mut c_void,
}

impl ScnAttachBehavior {
    /// # Safety
    /// `name` must outlive the notification.
    pub unsafe fn new(hwnd: WindowHandle, element: ElementHandle, name: &CStr) -> Self {
        Self {
            hdr: CallbackNotification { code: SC_ATTACH_BEHAVIOR, hwnd },
            element,
            behavior_name: name.as_ptr(),
            element_proc: None,
            element_tag: std::ptr::null_mut(),
        }
    }

    pub fn behavior_name(&self) -> &str {
        if self.behavior_name.is_null() {
            return "";
        }
        unsafe { CStr::from_ptr(self.behavior_name) }.to_str().unwrap_or("")
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScnPostedNotification {
    pub hdr: CallbackNotification,
    pub wparam: usize,
    pub lparam: usize,
    pub lreturn: usize,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScnKeyboardRequest {
    pub hdr: CallbackNotification,
    /// 0 hides the keyboard, anything else is a keyboard type
    pub keyboard_mode: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScnInvalidateRect {
    pub hdr: CallbackNotification,
    pub invalid_rect: Rect,
}

/// Supplies a behavior handler for a name not found in `behaviors`
pub type BehaviorFactory = Box<dyn Fn(&str) -> Option<Rc<EventHandler>>>;

/// Closures answering a window's host notifications
#[derive(Default)]
pub struct CallbackHandler {
    /// Behaviors by CSS name; one record may serve many elements
    pub behaviors: HashMap<String, Rc<EventHandler>>,
    pub on_load_data: Option<Box<dyn Fn(&mut ScnLoadData) -> LoadResult>>,
    pub on_data_loaded: Option<Box<dyn Fn(&ScnDataLoaded) -> u32>>,
    pub on_attach_behavior: Option<BehaviorFactory>,
    pub on_engine_destroyed: Option<Box<dyn Fn() -> u32>>,
    pub on_posted_notification: Option<Box<dyn Fn(&mut ScnPostedNotification) -> u32>>,
    pub on_graphics_critical_failure: Option<Box<dyn Fn() -> u32>>,
    pub on_keyboard_request: Option<Box<dyn Fn(&ScnKeyboardRequest) -> u32>>,
    pub on_invalidate_rect: Option<Box<dyn Fn(&ScnInvalidateRect) -> u32>>,
}

impl CallbackHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` as the behavior named `name`
    pub fn with_behavior(mut self, name: &str, handler: Rc<EventHandler>) -> Self {
        self.behaviors.insert(name.to_string(), handler);
        self
    }

    /// Behavior for `name`, from the table first and then the factory
    pub fn find_behavior(&self, name: &str) -> Option<Rc<EventHandler>> {
        self.behaviors
            .get(name)
            .cloned()
            .or_else(|| self.on_attach_behavior.as_ref().and_then(|factory| factory(name)))
    }
}
