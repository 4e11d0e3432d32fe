//! Windows
//!
//! A [`Window`] wraps an engine window handle, its host callbacks and the
//! window-level event handlers attached through it.

use std::cell::{OnceCell, RefCell};
use std::rc::Rc;

use url::Url;

use crate::api;
use crate::dispatch;
use crate::dom::Element;
use crate::error::{DomResult, Error, Result};
use crate::events::HANDLE_ALL;
use crate::handler::{EventHandler, EventMapper};
use crate::notify::CallbackHandler;
use crate::options::{RuntimeOption, WindowConfig};
use crate::request::Request;
use crate::types::WindowHandle;
use crate::value::Value;

fn failed(op: &'static str) -> Error {
    Error::Dom { result: DomResult::OperationFailed, op }
}

pub struct Window {
    hwnd: WindowHandle,
    callbacks: RefCell<Vec<(Rc<CallbackHandler>, usize)>>,
    handlers: RefCell<Vec<(Rc<EventHandler>, usize)>>,
    mapper: OnceCell<EventMapper>,
}

impl Window {
    pub fn create(config: &WindowConfig) -> Result<Self> {
        let hwnd = api::api()?.create_window(config.flags, &config.rect, config.parent);
        if !hwnd.is_valid() {
            return Err(Error::Dom { result: DomResult::InvalidHwnd, op: "SciterCreateWindow" });
        }
        tracing::info!("Created window {:?} ({:?})", hwnd, config.flags);
        Ok(Self::wrap(hwnd))
    }

    /// Adopt a window created elsewhere
    pub fn wrap(hwnd: WindowHandle) -> Self {
        Self {
            hwnd,
            callbacks: RefCell::new(Vec::new()),
            handlers: RefCell::new(Vec::new()),
            mapper: OnceCell::new(),
        }
    }

    pub fn handle(&self) -> WindowHandle {
        self.hwnd
    }

    /// Route the window's host notifications to `callback`
    pub fn set_callback(&self, callback: &Rc<CallbackHandler>) -> Result<usize> {
        if let Some((_, index)) = self.callbacks.borrow().iter().find(|(c, _)| Rc::ptr_eq(c, callback)) {
            return Ok(*index);
        }
        let api = api::api()?;
        let index = dispatch::register_callback(Rc::clone(callback));
        api.set_callback(self.hwnd, dispatch::host_callback, dispatch::index_to_tag(index));
        self.callbacks.borrow_mut().push((Rc::clone(callback), index));
        Ok(index)
    }

    /// Attach a handler receiving every event of the window
    pub fn attach_event_handler(&self, handler: &Rc<EventHandler>) -> Result<usize> {
        if let Some((_, index)) = self.handlers.borrow().iter().find(|(h, _)| Rc::ptr_eq(h, handler)) {
            return Ok(*index);
        }
        let api = api::api()?;
        let index = dispatch::register_handler(Rc::clone(handler), false);
        let result = api.window_attach_event_handler(
            self.hwnd,
            dispatch::element_proc,
            dispatch::index_to_tag(index),
            HANDLE_ALL,
        );
        if let Err(e) = result.check("SciterWindowAttachEventHandler") {
            dispatch::detach_handler(index);
            return Err(e);
        }
        self.handlers.borrow_mut().push((Rc::clone(handler), index));
        Ok(index)
    }

    pub fn detach_event_handler(&self, handler: &Rc<EventHandler>) -> Result<()> {
        let position = self.handlers.borrow().iter().position(|(h, _)| Rc::ptr_eq(h, handler));
        let Some(position) = position else {
            return Ok(());
        };
        let (_, index) = self.handlers.borrow_mut().remove(position);
        let result = api::api()?.window_detach_event_handler(
            self.hwnd,
            dispatch::element_proc,
            dispatch::index_to_tag(index),
        );
        dispatch::detach_handler(index);
        result.check("SciterWindowDetachEventHandler")
    }

    /// Expose `f` to script as a method of the window's root
    pub fn define_function<F>(&self, name: &str, f: F) -> Result<()>
    where
        F: Fn(&[Value]) -> Value + 'static,
    {
        let mapper = match self.mapper.get() {
            Some(mapper) => mapper,
            None => {
                let mapper = EventMapper::new();
                self.attach_event_handler(mapper.handler())?;
                self.mapper.get_or_init(|| mapper)
            }
        };
        mapper.add_method(name, f);
        Ok(())
    }

    // ========================================================================
    // Documents
    // ========================================================================

    pub fn load_file(&self, path: &str) -> Result<()> {
        tracing::info!("Loading {}", path);
        if api::api()?.load_file(self.hwnd, path) { Ok(()) } else { Err(failed("SciterLoadFile")) }
    }

    pub fn load_html(&self, html: &[u8], base_url: &str) -> Result<()> {
        tracing::debug!("Loading {} bytes of HTML at {}", html.len(), base_url);
        if api::api()?.load_html(self.hwnd, html, base_url) { Ok(()) } else { Err(failed("SciterLoadHtml")) }
    }

    /// Base URL for relative script module paths
    pub fn set_home_url(&self, url: &str) -> Result<()> {
        let url = Url::parse(url)?;
        if api::api()?.set_home_url(self.hwnd, url.as_str()) {
            Ok(())
        } else {
            Err(failed("SciterSetHomeURL"))
        }
    }

    pub fn set_option(&self, option: RuntimeOption, value: usize) -> Result<()> {
        if api::api()?.set_option(self.hwnd, option, value) {
            Ok(())
        } else {
            Err(failed("SciterSetOption"))
        }
    }

    /// Answer a `SC_LOAD_DATA` synchronously
    pub fn data_ready(&self, uri: &str, data: &[u8]) -> Result<()> {
        if api::api()?.data_ready(self.hwnd, uri, data) { Ok(()) } else { Err(failed("SciterDataReady")) }
    }

    /// Answer a delayed load for `request`
    pub fn data_ready_async(&self, uri: &str, data: &[u8], request: &Request) -> Result<()> {
        if api::api()?.data_ready_async(self.hwnd, uri, data, request.handle()) {
            Ok(())
        } else {
            Err(failed("SciterDataReadyAsync"))
        }
    }

    // ========================================================================
    // Script
    // ========================================================================

    /// Call a global script function
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let argv = args.to_vec();
        let mut retval = Value::new();
        if api::api()?.call(self.hwnd, name, &argv, &mut retval) {
            Ok(retval)
        } else {
            Err(failed("SciterCall"))
        }
    }

    pub fn eval(&self, script: &str) -> Result<Value> {
        let mut retval = Value::new();
        if api::api()?.eval(self.hwnd, script, &mut retval) {
            Ok(retval)
        } else {
            Err(failed("SciterEval"))
        }
    }

    pub fn root_element(&self) -> Result<Element> {
        Element::root(self.hwnd)
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        let handlers = std::mem::take(self.handlers.get_mut());
        let api = api::api().ok();
        for (_, index) in handlers {
            if let Some(api) = &api {
                let tag = dispatch::index_to_tag(index);
                let result = api.window_detach_event_handler(self.hwnd, dispatch::element_proc, tag);
                if result != DomResult::Ok {
                    tracing::debug!("SciterWindowDetachEventHandler(#{}) failed: {}", index, result);
                }
            }
            dispatch::detach_handler(index);
        }
    }
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window").field("hwnd", &self.hwnd).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingEngine;

    #[test]
    fn test_create_and_load() {
        let engine = RecordingEngine::install();
        let window = Window::create(&WindowConfig::default()).unwrap();
        assert!(window.handle().is_valid());
        window.load_html(b"<html><body/></html>", "this://app/").unwrap();
        assert_eq!(engine.loaded(window.handle()).as_deref(), Some("this://app/"));
    }

    #[test]
    fn test_create_failure() {
        let engine = RecordingEngine::install();
        engine.fail_window_creation();
        assert!(matches!(
            Window::create(&WindowConfig::default()),
            Err(Error::Dom { result: DomResult::InvalidHwnd, .. })
        ));
    }

    #[test]
    fn test_home_url_is_validated() {
        let _engine = RecordingEngine::install();
        let window = Window::create(&WindowConfig::default()).unwrap();
        assert!(matches!(window.set_home_url("not a url"), Err(Error::Url(_))));
        window.set_home_url("this://app/").unwrap();
    }

    #[test]
    fn test_define_function_reaches_script() {
        let engine = RecordingEngine::install();
        let window = Window::create(&WindowConfig::default()).unwrap();
        window
            .define_function("add", |args| Value::from(args.iter().map(Value::to_int).sum::<i32>()))
            .unwrap();
        let result = engine.call_native_method(window.handle(), "add", &[Value::from(2), Value::from(3)]);
        assert_eq!(result, Some(Value::from(5)));
        assert_eq!(engine.call_native_method(window.handle(), "missing", &[]), None);
    }

    #[test]
    fn test_set_callback_deduplicates() {
        let engine = RecordingEngine::install();
        let window = Window::create(&WindowConfig::default()).unwrap();
        let cb = Rc::new(CallbackHandler::new());
        let a = window.set_callback(&cb).unwrap();
        let b = window.set_callback(&cb).unwrap();
        assert_eq!(a, b);
        assert!(engine.callback(window.handle()).is_some());
    }

    #[test]
    fn test_drop_detaches_window_handlers() {
        let engine = RecordingEngine::install();
        let window = Window::create(&WindowConfig::default()).unwrap();
        let hwnd = window.handle();
        let handler = Rc::new(EventHandler::new());
        let index = window.attach_event_handler(&handler).unwrap();
        assert_eq!(engine.window_attached(hwnd).len(), 1);
        drop(window);
        assert!(engine.window_attached(hwnd).is_empty());
        assert!(dispatch::handler_at(index).is_none());
    }

    #[test]
    fn test_call_and_eval() {
        let engine = RecordingEngine::install();
        let window = Window::create(&WindowConfig::default()).unwrap();
        engine.define_script_function("twice", |args| Value::from(args[0].to_int() * 2));
        assert_eq!(window.call("twice", &[Value::from(4)]).unwrap(), Value::from(8));
        assert!(window.call("absent", &[]).is_err());
        assert_eq!(window.eval("1 + 1").unwrap(), Value::from("1 + 1"));
    }
}
