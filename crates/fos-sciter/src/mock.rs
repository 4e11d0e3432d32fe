//! In-process recording engine
//!
//! [`RecordingEngine`] implements [`SciterApi`] without a native library. It
//! keeps reference counts, attached handlers, element values and loaded
//! documents in plain tables, and replays engine-side activity (events,
//! behavior attachment, resource loads) through the registered trampolines.
//! Tests and the demo driver run against it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::api::{self, ElementEventProc, HostCallback, RequestApi, SciterApi};
use crate::error::{DomResult, RequestResult, ValueResult};
use crate::events::{
    string_to_wide, BehaviorEventParams, InitializationParams, ScriptingMethodParams,
    BEHAVIOR_ATTACH, BEHAVIOR_DETACH, HANDLE_BEHAVIOR_EVENT, HANDLE_INITIALIZATION,
    HANDLE_SCRIPTING_METHOD_CALL,
};
use crate::notify::{resource, CallbackNotification, ScnAttachBehavior, ScnLoadData, SC_ENGINE_DESTROYED};
use crate::options::RuntimeOption;
use crate::types::{ElementHandle, Rect, RequestHandle, WindowFlags, WindowHandle};
use crate::value::Value;

type ScriptFunction = Rc<dyn Fn(&[Value]) -> Value>;

#[derive(Clone, Copy)]
struct Attachment {
    proc_: ElementEventProc,
    tag: usize,
}

#[derive(Default)]
struct EngineState {
    windows: usize,
    fail_create: bool,
    element_refs: HashMap<ElementHandle, usize>,
    underflows: usize,
    attached: HashMap<ElementHandle, Vec<Attachment>>,
    window_attached: HashMap<WindowHandle, Vec<Attachment>>,
    values: HashMap<ElementHandle, Value>,
    selections: HashMap<String, Vec<ElementHandle>>,
    loaded: HashMap<WindowHandle, String>,
    home_urls: HashMap<WindowHandle, String>,
    options: HashMap<(WindowHandle, RuntimeOption), usize>,
    data_ready: Vec<(String, usize)>,
    callbacks: HashMap<WindowHandle, (HostCallback, usize)>,
    calls: Vec<String>,
}

/// Engine double for tests and headless runs
pub struct RecordingEngine {
    state: RefCell<EngineState>,
    scripts: RefCell<HashMap<String, ScriptFunction>>,
    requests: Arc<RecordingRequests>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(EngineState::default()),
            scripts: RefCell::new(HashMap::new()),
            requests: Arc::new(RecordingRequests::new()),
        }
    }

    /// Create an engine and install it for the current thread
    pub fn install() -> Rc<Self> {
        let engine = Rc::new(Self::new());
        api::install(engine.clone());
        engine
    }

    fn log(&self, call: String) {
        self.state.borrow_mut().calls.push(call);
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Every engine call so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn element_refcount(&self, he: ElementHandle) -> usize {
        self.state.borrow().element_refs.get(&he).copied().unwrap_or(0)
    }

    /// Releases of elements nobody held
    pub fn underflows(&self) -> usize {
        self.state.borrow().underflows
    }

    /// Tags of the handlers attached to `he`
    pub fn attached(&self, he: ElementHandle) -> Vec<usize> {
        self.state.borrow().attached.get(&he).map_or_else(Vec::new, |list| list.iter().map(|a| a.tag).collect())
    }

    pub fn window_attached(&self, hwnd: WindowHandle) -> Vec<usize> {
        self.state
            .borrow()
            .window_attached
            .get(&hwnd)
            .map_or_else(Vec::new, |list| list.iter().map(|a| a.tag).collect())
    }

    /// Base URL of the last document loaded into the window
    pub fn loaded(&self, hwnd: WindowHandle) -> Option<String> {
        self.state.borrow().loaded.get(&hwnd).cloned()
    }

    pub fn home_url(&self, hwnd: WindowHandle) -> Option<String> {
        self.state.borrow().home_urls.get(&hwnd).cloned()
    }

    pub fn option(&self, hwnd: WindowHandle, option: RuntimeOption) -> Option<usize> {
        self.state.borrow().options.get(&(hwnd, option)).copied()
    }

    /// `(uri, byte count)` of every data-ready call
    pub fn data_ready_log(&self) -> Vec<(String, usize)> {
        self.state.borrow().data_ready.clone()
    }

    /// Parameter of the window's host callback
    pub fn callback(&self, hwnd: WindowHandle) -> Option<usize> {
        self.state.borrow().callbacks.get(&hwnd).map(|(_, param)| *param)
    }

    pub fn requests(&self) -> Arc<RecordingRequests> {
        Arc::clone(&self.requests)
    }

    // ========================================================================
    // Scripting
    // ========================================================================

    /// Elements returned for `selector`, in document order
    pub fn set_selection(&self, selector: &str, found: &[ElementHandle]) {
        self.state.borrow_mut().selections.insert(selector.to_string(), found.to_vec());
    }

    pub fn fail_window_creation(&self) {
        self.state.borrow_mut().fail_create = true;
    }

    /// Define a script-side function reachable through `call` and friends
    pub fn define_script_function<F>(&self, name: &str, f: F)
    where
        F: Fn(&[Value]) -> Value + 'static,
    {
        self.scripts.borrow_mut().insert(name.to_string(), Rc::new(f));
    }

    fn script(&self, name: &str) -> Option<ScriptFunction> {
        self.scripts.borrow().get(name).cloned()
    }

    // ========================================================================
    // Event replay
    // ========================================================================

    fn deliver(list: &[Attachment], he: ElementHandle, evtg: u32, prms: *mut c_void) -> bool {
        list.iter().any(|a| unsafe { (a.proc_)(a.tag as *mut c_void, he, evtg, prms) } != 0)
    }

    /// Deliver a raw event to the handlers attached to `he`, innermost
    /// attachment last, until one consumes it
    ///
    /// # Safety
    /// `prms` must point to the payload struct of group `evtg`.
    pub unsafe fn send_event(&self, he: ElementHandle, evtg: u32, prms: *mut c_void) -> bool {
        let list = self.state.borrow().attached.get(&he).cloned().unwrap_or_default();
        Self::deliver(&list, he, evtg, prms)
    }

    pub fn send_behavior_event(&self, he: ElementHandle, params: &mut BehaviorEventParams) -> bool {
        unsafe { self.send_event(he, HANDLE_BEHAVIOR_EVENT, (params as *mut BehaviorEventParams).cast()) }
    }

    fn scripting_call(list: &[Attachment], he: ElementHandle, name: &str, args: &[Value]) -> Option<Value> {
        let name = CString::new(name).ok()?;
        let mut params = unsafe { ScriptingMethodParams::new(&name, args) };
        let handled = Self::deliver(
            list,
            he,
            HANDLE_SCRIPTING_METHOD_CALL,
            (&mut params as *mut ScriptingMethodParams).cast(),
        );
        handled.then_some(params.result)
    }

    /// Call a native method of `he` the way script does; `None` when no
    /// handler answered
    pub fn call_element_method(&self, he: ElementHandle, name: &str, args: &[Value]) -> Option<Value> {
        let list = self.state.borrow().attached.get(&he).cloned().unwrap_or_default();
        Self::scripting_call(&list, he, name, args)
    }

    /// Call a function defined on the window the way script does
    pub fn call_native_method(&self, hwnd: WindowHandle, name: &str, args: &[Value]) -> Option<Value> {
        let list = self.state.borrow().window_attached.get(&hwnd).cloned().unwrap_or_default();
        Self::scripting_call(&list, ElementHandle::NULL, name, args)
    }

    /// Remove `he` from the document: every handler gets `BEHAVIOR_DETACH`
    pub fn remove_element(&self, he: ElementHandle) {
        let list = self.state.borrow_mut().attached.remove(&he).unwrap_or_default();
        self.log(format!("remove {:?}", he));
        for a in list {
            let mut init = InitializationParams { cmd: BEHAVIOR_DETACH };
            unsafe { (a.proc_)(a.tag as *mut c_void, he, HANDLE_INITIALIZATION, (&mut init as *mut InitializationParams).cast()) };
        }
    }

    fn notify(&self, hwnd: WindowHandle, pns: *mut CallbackNotification) -> Option<u32> {
        let (callback, param) = self.state.borrow().callbacks.get(&hwnd).copied()?;
        Some(unsafe { callback(pns, param as *mut c_void) })
    }

    /// Ask the window's host callback for the behavior `name` of `he`; on
    /// success the returned handler is attached and receives `BEHAVIOR_ATTACH`
    pub fn attach_behavior(&self, hwnd: WindowHandle, he: ElementHandle, name: &str) -> bool {
        let Ok(behavior_name) = CString::new(name) else {
            return false;
        };
        let mut scn = unsafe { ScnAttachBehavior::new(hwnd, he, &behavior_name) };
        let rc = self.notify(hwnd, (&mut scn as *mut ScnAttachBehavior).cast());
        let Some(proc_) = scn.element_proc.filter(|_| rc == Some(1)) else {
            return false;
        };
        let attachment = Attachment { proc_, tag: scn.element_tag as usize };
        self.state.borrow_mut().attached.entry(he).or_default().push(attachment);
        self.log(format!("behavior {} {:?}", name, he));
        let mut init = InitializationParams { cmd: BEHAVIOR_ATTACH };
        unsafe { proc_(scn.element_tag, he, HANDLE_INITIALIZATION, (&mut init as *mut InitializationParams).cast()) };
        true
    }

    /// Send `SC_LOAD_DATA` for `uri`; `None` when the window has no callback
    pub fn load_data(&self, hwnd: WindowHandle, uri: &str, request: RequestHandle) -> Option<u32> {
        let wide = string_to_wide(uri);
        let mut scn = unsafe { ScnLoadData::new(hwnd, &wide, resource::HTML, request) };
        self.notify(hwnd, (&mut scn as *mut ScnLoadData).cast())
    }

    /// Send the last notification of the engine's life
    pub fn destroy(&self, hwnd: WindowHandle) -> Option<u32> {
        let mut hdr = CallbackNotification { code: SC_ENGINE_DESTROYED, hwnd };
        self.notify(hwnd, &mut hdr)
    }
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SciterApi for RecordingEngine {
    fn create_window(&self, flags: WindowFlags, _frame: &Rect, _parent: WindowHandle) -> WindowHandle {
        let mut state = self.state.borrow_mut();
        if state.fail_create {
            return WindowHandle::NULL;
        }
        state.windows += 1;
        let hwnd = WindowHandle(0x1000 * state.windows);
        state.calls.push(format!("create_window {:?} {:?}", hwnd, flags));
        hwnd
    }

    fn load_file(&self, hwnd: WindowHandle, path: &str) -> bool {
        self.log(format!("load_file {}", path));
        self.state.borrow_mut().loaded.insert(hwnd, path.to_string());
        true
    }

    fn load_html(&self, hwnd: WindowHandle, html: &[u8], base_url: &str) -> bool {
        self.log(format!("load_html {} bytes", html.len()));
        self.state.borrow_mut().loaded.insert(hwnd, base_url.to_string());
        true
    }

    fn set_callback(&self, hwnd: WindowHandle, callback: HostCallback, param: *mut c_void) {
        self.log(format!("set_callback {:?}", hwnd));
        self.state.borrow_mut().callbacks.insert(hwnd, (callback, param as usize));
    }

    fn set_option(&self, hwnd: WindowHandle, option: RuntimeOption, value: usize) -> bool {
        self.state.borrow_mut().options.insert((hwnd, option), value);
        true
    }

    fn set_home_url(&self, hwnd: WindowHandle, url: &str) -> bool {
        self.state.borrow_mut().home_urls.insert(hwnd, url.to_string());
        true
    }

    fn data_ready(&self, _hwnd: WindowHandle, uri: &str, data: &[u8]) -> bool {
        self.state.borrow_mut().data_ready.push((uri.to_string(), data.len()));
        true
    }

    fn data_ready_async(&self, _hwnd: WindowHandle, uri: &str, data: &[u8], request: RequestHandle) -> bool {
        self.state.borrow_mut().data_ready.push((uri.to_string(), data.len()));
        self.requests.set_succeeded(request, 200, data).is_ok()
    }

    fn window_attach_event_handler(
        &self,
        hwnd: WindowHandle,
        proc_: ElementEventProc,
        tag: *mut c_void,
        _subscription: u32,
    ) -> DomResult {
        if !hwnd.is_valid() {
            return DomResult::InvalidHwnd;
        }
        let tag = tag as usize;
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("window_attach {:?} #{}", hwnd, tag));
        state.window_attached.entry(hwnd).or_default().push(Attachment { proc_, tag });
        DomResult::Ok
    }

    fn window_detach_event_handler(&self, hwnd: WindowHandle, _proc: ElementEventProc, tag: *mut c_void) -> DomResult {
        let tag = tag as usize;
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("window_detach {:?} #{}", hwnd, tag));
        let Some(list) = state.window_attached.get_mut(&hwnd) else {
            return DomResult::InvalidHwnd;
        };
        match list.iter().position(|a| a.tag == tag) {
            Some(i) => {
                list.remove(i);
                DomResult::Ok
            }
            None => DomResult::InvalidParameter,
        }
    }

    fn call(&self, _hwnd: WindowHandle, name: &str, args: &[Value], retval: &mut Value) -> bool {
        self.log(format!("call {}", name));
        match self.script(name) {
            Some(f) => {
                *retval = f(args);
                true
            }
            None => false,
        }
    }

    fn eval(&self, _hwnd: WindowHandle, script: &str, retval: &mut Value) -> bool {
        self.log(format!("eval {}", script));
        *retval = Value::from(script);
        true
    }

    fn use_element(&self, he: ElementHandle) -> DomResult {
        if !he.is_valid() {
            return DomResult::InvalidHandle;
        }
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("use {:?}", he));
        *state.element_refs.entry(he).or_insert(0) += 1;
        DomResult::Ok
    }

    fn unuse_element(&self, he: ElementHandle) -> DomResult {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        state.calls.push(format!("unuse {:?}", he));
        match state.element_refs.get_mut(&he) {
            Some(count) if *count > 0 => {
                *count -= 1;
                DomResult::Ok
            }
            _ => {
                state.underflows += 1;
                DomResult::InvalidHandle
            }
        }
    }

    fn root_element(&self, hwnd: WindowHandle, out: &mut ElementHandle) -> DomResult {
        if !hwnd.is_valid() {
            return DomResult::InvalidHwnd;
        }
        *out = ElementHandle(hwnd.0 + 1);
        DomResult::Ok
    }

    fn select_elements(
        &self,
        _he: ElementHandle,
        selector: &str,
        found: &mut dyn FnMut(ElementHandle) -> bool,
    ) -> DomResult {
        let matches = self.state.borrow().selections.get(selector).cloned().unwrap_or_default();
        for he in matches {
            if found(he) {
                break;
            }
        }
        DomResult::Ok
    }

    fn attach_event_handler(&self, he: ElementHandle, proc_: ElementEventProc, tag: *mut c_void) -> DomResult {
        if !he.is_valid() {
            return DomResult::InvalidHandle;
        }
        {
            let mut state = self.state.borrow_mut();
            state.calls.push(format!("attach {:?} #{}", he, tag as usize));
            state.attached.entry(he).or_default().push(Attachment { proc_, tag: tag as usize });
        }
        let mut init = InitializationParams { cmd: BEHAVIOR_ATTACH };
        unsafe { proc_(tag, he, HANDLE_INITIALIZATION, (&mut init as *mut InitializationParams).cast()) };
        DomResult::Ok
    }

    fn detach_event_handler(&self, he: ElementHandle, proc_: ElementEventProc, tag: *mut c_void) -> DomResult {
        let removed = {
            let mut state = self.state.borrow_mut();
            state.calls.push(format!("detach {:?} #{}", he, tag as usize));
            state.attached.get_mut(&he).and_then(|list| {
                let i = list.iter().position(|a| a.tag == tag as usize)?;
                Some(list.remove(i))
            })
        };
        if removed.is_none() {
            return DomResult::InvalidParameter;
        }
        let mut init = InitializationParams { cmd: BEHAVIOR_DETACH };
        unsafe { proc_(tag, he, HANDLE_INITIALIZATION, (&mut init as *mut InitializationParams).cast()) };
        DomResult::Ok
    }

    fn call_scripting_function(&self, he: ElementHandle, name: &str, args: &[Value], retval: &mut Value) -> DomResult {
        self.log(format!("call_scripting_function {}", name));
        if !he.is_valid() {
            return DomResult::InvalidHandle;
        }
        match self.script(name) {
            Some(f) => {
                *retval = f(args);
                DomResult::Ok
            }
            None => DomResult::InvalidParameter,
        }
    }

    fn call_scripting_method(&self, he: ElementHandle, name: &str, args: &[Value], retval: &mut Value) -> DomResult {
        self.log(format!("call_scripting_method {}", name));
        if !he.is_valid() {
            return DomResult::InvalidHandle;
        }
        match self.script(name) {
            Some(f) => {
                *retval = f(args);
                DomResult::Ok
            }
            None => DomResult::InvalidParameter,
        }
    }

    fn get_value(&self, he: ElementHandle, out: &mut Value) -> DomResult {
        *out = self.state.borrow().values.get(&he).cloned().unwrap_or_default();
        DomResult::Ok
    }

    fn set_value(&self, he: ElementHandle, value: &Value) -> DomResult {
        self.state.borrow_mut().values.insert(he, value.clone());
        DomResult::Ok
    }

    fn value_invoke(
        &self,
        _function: &Value,
        _this: &Value,
        args: &[Value],
        retval: &mut Value,
        name_or_url: &str,
    ) -> ValueResult {
        self.log(format!("value_invoke {}", name_or_url));
        match self.script(name_or_url) {
            Some(f) => {
                *retval = f(args);
                ValueResult::Ok
            }
            None => ValueResult::IncompatibleType,
        }
    }

    fn request_api(&self) -> Arc<dyn RequestApi> {
        self.requests.clone()
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Default)]
struct RequestRecord {
    url: String,
    verb: u32,
    refs: usize,
    state: u32,
    status: Option<u32>,
    body: Vec<u8>,
}

#[derive(Debug, Default)]
struct RequestTable {
    next: usize,
    records: HashMap<RequestHandle, RequestRecord>,
}

/// Thread-safe request double
#[derive(Debug, Default)]
pub struct RecordingRequests {
    table: Mutex<RequestTable>,
}

impl RecordingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RequestTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a pending request; the engine holds the first reference
    pub fn add(&self, url: &str, verb: u32) -> RequestHandle {
        let mut table = self.lock();
        table.next += 1;
        let rq = RequestHandle(table.next);
        table.records.insert(rq, RequestRecord { url: url.to_string(), verb, refs: 1, ..Default::default() });
        rq
    }

    pub fn refcount(&self, rq: RequestHandle) -> usize {
        self.lock().records.get(&rq).map_or(0, |r| r.refs)
    }

    /// Completion status, `None` while pending
    pub fn status(&self, rq: RequestHandle) -> Option<u32> {
        self.lock().records.get(&rq).and_then(|r| r.status)
    }

    pub fn body(&self, rq: RequestHandle) -> Vec<u8> {
        self.lock().records.get(&rq).map(|r| r.body.clone()).unwrap_or_default()
    }

    fn with_record(&self, rq: RequestHandle, f: impl FnOnce(&mut RequestRecord) -> RequestResult) -> RequestResult {
        match self.lock().records.get_mut(&rq) {
            Some(record) => f(record),
            None => RequestResult::BadParam,
        }
    }

    fn complete(&self, rq: RequestHandle, state: u32, status: u32, data: &[u8]) -> RequestResult {
        self.with_record(rq, |r| {
            if r.state != 0 {
                return RequestResult::Failure;
            }
            r.state = state;
            r.status = Some(status);
            r.body.extend_from_slice(data);
            RequestResult::Ok
        })
    }
}

impl RequestApi for RecordingRequests {
    fn use_request(&self, rq: RequestHandle) -> RequestResult {
        self.with_record(rq, |r| {
            r.refs += 1;
            RequestResult::Ok
        })
    }

    fn unuse_request(&self, rq: RequestHandle) -> RequestResult {
        self.with_record(rq, |r| {
            if r.refs == 0 {
                return RequestResult::Failure;
            }
            r.refs -= 1;
            RequestResult::Ok
        })
    }

    fn set_succeeded(&self, rq: RequestHandle, status: u32, data: &[u8]) -> RequestResult {
        self.complete(rq, 1, status, data)
    }

    fn set_failed(&self, rq: RequestHandle, status: u32, data: &[u8]) -> RequestResult {
        self.complete(rq, 2, status, data)
    }

    fn append_data_chunk(&self, rq: RequestHandle, data: &[u8]) -> RequestResult {
        self.with_record(rq, |r| {
            r.body.extend_from_slice(data);
            RequestResult::Ok
        })
    }

    fn url(&self, rq: RequestHandle, received: &mut dyn FnMut(&str)) -> RequestResult {
        let url = self.lock().records.get(&rq).map(|r| r.url.clone());
        match url {
            Some(url) => {
                received(&url);
                RequestResult::Ok
            }
            None => RequestResult::BadParam,
        }
    }

    fn request_type(&self, rq: RequestHandle, out: &mut u32) -> RequestResult {
        self.with_record(rq, |r| {
            *out = r.verb;
            RequestResult::Ok
        })
    }

    fn state(&self, rq: RequestHandle, out: &mut u32) -> RequestResult {
        self.with_record(rq, |r| {
            *out = r.state;
            RequestResult::Ok
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unuse_underflow_is_recorded() {
        let engine = RecordingEngine::new();
        assert_eq!(engine.unuse_element(ElementHandle(5)), DomResult::InvalidHandle);
        assert_eq!(engine.underflows(), 1);
        assert_eq!(engine.element_refcount(ElementHandle(5)), 0);
    }

    #[test]
    fn test_use_null_rejected() {
        let engine = RecordingEngine::new();
        assert_eq!(engine.use_element(ElementHandle::NULL), DomResult::InvalidHandle);
    }

    #[test]
    fn test_selection_stops_early() {
        let engine = RecordingEngine::new();
        engine.set_selection("p", &[ElementHandle(1), ElementHandle(2), ElementHandle(3)]);
        let mut seen = 0;
        engine.select_elements(ElementHandle(9), "p", &mut |_| {
            seen += 1;
            seen == 2
        });
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_request_completes_once() {
        let requests = RecordingRequests::new();
        let rq = requests.add("this://app/a", 1);
        assert_eq!(requests.set_succeeded(rq, 200, b"x"), RequestResult::Ok);
        assert_eq!(requests.set_failed(rq, 500, b""), RequestResult::Failure);
        assert_eq!(requests.status(rq), Some(200));
        assert_eq!(requests.use_request(RequestHandle(99)), RequestResult::BadParam);
    }
}
