//! Engine boundary
//!
//! The native engine is reached only through these two traits. `SciterApi`
//! covers everything that must run on the engine thread; `RequestApi` is the
//! thread-safe subset used to complete resource requests from workers.
//!
//! An engine is installed per thread. Every wrapper in this crate looks it up
//! through [`api`], so code running on a thread without an engine gets
//! [`Error::NoEngine`] instead of touching foreign state.

use std::cell::RefCell;
use std::ffi::c_void;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{DomResult, Error, RequestResult, Result, ValueResult};
use crate::notify::CallbackNotification;
use crate::options::RuntimeOption;
use crate::types::{ElementHandle, Rect, RequestHandle, WindowFlags, WindowHandle};
use crate::value::Value;

/// `ElementEventProc`: returns nonzero when the event was consumed
pub type ElementEventProc =
    unsafe extern "C" fn(tag: *mut c_void, he: ElementHandle, evtg: u32, prms: *mut c_void) -> i32;

/// `SciterHostCallback`
pub type HostCallback =
    unsafe extern "C" fn(pns: *mut CallbackNotification, param: *mut c_void) -> u32;

/// Engine-thread API
pub trait SciterApi {
    // Windows and documents
    fn create_window(&self, flags: WindowFlags, frame: &Rect, parent: WindowHandle) -> WindowHandle;
    fn load_file(&self, hwnd: WindowHandle, path: &str) -> bool;
    fn load_html(&self, hwnd: WindowHandle, html: &[u8], base_url: &str) -> bool;
    fn set_callback(&self, hwnd: WindowHandle, callback: HostCallback, param: *mut c_void);
    /// `hwnd` is `NULL` for process-wide options
    fn set_option(&self, hwnd: WindowHandle, option: RuntimeOption, value: usize) -> bool;
    fn set_home_url(&self, hwnd: WindowHandle, url: &str) -> bool;
    fn data_ready(&self, hwnd: WindowHandle, uri: &str, data: &[u8]) -> bool;
    fn data_ready_async(
        &self,
        hwnd: WindowHandle,
        uri: &str,
        data: &[u8],
        request: RequestHandle,
    ) -> bool;
    fn window_attach_event_handler(
        &self,
        hwnd: WindowHandle,
        proc_: ElementEventProc,
        tag: *mut c_void,
        subscription: u32,
    ) -> DomResult;
    fn window_detach_event_handler(
        &self,
        hwnd: WindowHandle,
        proc_: ElementEventProc,
        tag: *mut c_void,
    ) -> DomResult;
    fn call(&self, hwnd: WindowHandle, name: &str, args: &[Value], retval: &mut Value) -> bool;
    fn eval(&self, hwnd: WindowHandle, script: &str, retval: &mut Value) -> bool;

    // Elements
    fn use_element(&self, he: ElementHandle) -> DomResult;
    fn unuse_element(&self, he: ElementHandle) -> DomResult;
    fn root_element(&self, hwnd: WindowHandle, out: &mut ElementHandle) -> DomResult;
    /// `found` returns `true` to stop the enumeration
    fn select_elements(
        &self,
        he: ElementHandle,
        selector: &str,
        found: &mut dyn FnMut(ElementHandle) -> bool,
    ) -> DomResult;
    fn attach_event_handler(
        &self,
        he: ElementHandle,
        proc_: ElementEventProc,
        tag: *mut c_void,
    ) -> DomResult;
    fn detach_event_handler(
        &self,
        he: ElementHandle,
        proc_: ElementEventProc,
        tag: *mut c_void,
    ) -> DomResult;
    fn call_scripting_function(
        &self,
        he: ElementHandle,
        name: &str,
        args: &[Value],
        retval: &mut Value,
    ) -> DomResult;
    fn call_scripting_method(
        &self,
        he: ElementHandle,
        name: &str,
        args: &[Value],
        retval: &mut Value,
    ) -> DomResult;
    fn get_value(&self, he: ElementHandle, out: &mut Value) -> DomResult;
    fn set_value(&self, he: ElementHandle, value: &Value) -> DomResult;

    // Values
    fn value_invoke(
        &self,
        function: &Value,
        this: &Value,
        args: &[Value],
        retval: &mut Value,
        name_or_url: &str,
    ) -> ValueResult;

    /// Thread-safe request API
    fn request_api(&self) -> Arc<dyn RequestApi>;
}

/// Thread-safe request API
pub trait RequestApi: Send + Sync {
    fn use_request(&self, rq: RequestHandle) -> RequestResult;
    fn unuse_request(&self, rq: RequestHandle) -> RequestResult;
    fn set_succeeded(&self, rq: RequestHandle, status: u32, data: &[u8]) -> RequestResult;
    fn set_failed(&self, rq: RequestHandle, status: u32, data: &[u8]) -> RequestResult;
    fn append_data_chunk(&self, rq: RequestHandle, data: &[u8]) -> RequestResult;
    fn url(&self, rq: RequestHandle, received: &mut dyn FnMut(&str)) -> RequestResult;
    fn request_type(&self, rq: RequestHandle, out: &mut u32) -> RequestResult;
    fn state(&self, rq: RequestHandle, out: &mut u32) -> RequestResult;
}

thread_local! {
    static ENGINE: RefCell<Option<Rc<dyn SciterApi>>> = const { RefCell::new(None) };
}

/// Install the engine for this thread, returning the one it replaces
pub fn install(api: Rc<dyn SciterApi>) -> Option<Rc<dyn SciterApi>> {
    tracing::debug!("Installing engine API on {:?}", std::thread::current().id());
    ENGINE.with(|engine| engine.borrow_mut().replace(api))
}

pub fn uninstall() -> Option<Rc<dyn SciterApi>> {
    ENGINE.try_with(|engine| engine.borrow_mut().take()).ok().flatten()
}

/// Engine of the current thread
pub fn api() -> Result<Rc<dyn SciterApi>> {
    ENGINE
        .try_with(|engine| engine.borrow().clone())
        .ok()
        .flatten()
        .ok_or(Error::NoEngine)
}

pub fn is_installed() -> bool {
    api().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingEngine;

    #[test]
    fn test_no_engine_by_default() {
        assert!(matches!(api(), Err(Error::NoEngine)));
        assert!(!is_installed());
    }

    #[test]
    fn test_install_replaces() {
        let first = RecordingEngine::install();
        assert!(is_installed());
        let previous = install(Rc::new(RecordingEngine::new()));
        assert!(previous.is_some());
        assert!(uninstall().is_some());
        assert!(uninstall().is_none());
        drop(first);
    }

    #[test]
    fn test_install_is_per_thread() {
        let _engine = RecordingEngine::install();
        let other = std::thread::spawn(is_installed).join().unwrap();
        assert!(!other);
        assert!(is_installed());
    }
}
