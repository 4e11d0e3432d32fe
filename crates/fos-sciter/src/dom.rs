//! DOM elements
//!
//! [`Element`] owns one engine reference to an element handle. Wrapping a
//! handle acquires it and dropping the wrapper releases it, after detaching
//! every event handler attached through the wrapper.

use std::cell::{OnceCell, RefCell};
use std::rc::Rc;

use crate::api::{self, SciterApi};
use crate::dispatch;
use crate::error::{DomResult, Error, Result};
use crate::handler::{EventHandler, EventMapper};
use crate::types::{ElementHandle, WindowHandle};
use crate::value::Value;

pub struct Element {
    he: ElementHandle,
    /// Handlers attached through this wrapper, with their dispatch index
    handlers: RefCell<Vec<(Rc<EventHandler>, usize)>>,
    mapper: OnceCell<EventMapper>,
}

impl Element {
    /// Take a reference to `he`. The null handle is wrapped without one.
    pub fn wrap(he: ElementHandle) -> Result<Self> {
        if he.is_valid() {
            api::api()?.use_element(he).check("Sciter_UseElement")?;
        }
        Ok(Self { he, handlers: RefCell::new(Vec::new()), mapper: OnceCell::new() })
    }

    /// Root element of a window's document
    pub fn root(hwnd: WindowHandle) -> Result<Self> {
        let mut he = ElementHandle::NULL;
        api::api()?.root_element(hwnd, &mut he).check("SciterGetRootElement")?;
        Self::wrap(he)
    }

    pub fn handle(&self) -> ElementHandle {
        self.he
    }

    pub fn is_valid(&self) -> bool {
        self.he.is_valid()
    }

    // ========================================================================
    // Event handlers
    // ========================================================================

    /// Attach `handler`, returning its dispatch index. Attaching the same
    /// handler twice returns the existing index.
    pub fn attach_event_handler(&self, handler: &Rc<EventHandler>) -> Result<usize> {
        if let Some(index) = self.handler_index(handler) {
            return Ok(index);
        }
        let api = api::api()?;
        // The slot must exist before the engine sends BEHAVIOR_ATTACH
        let index = dispatch::register_handler(Rc::clone(handler), false);
        let result = api.attach_event_handler(self.he, dispatch::element_proc, dispatch::index_to_tag(index));
        if let Err(e) = result.check("SciterAttachEventHandler") {
            dispatch::detach_handler(index);
            return Err(e);
        }
        tracing::debug!("Attached handler #{} to element {:?}", index, self.he);
        self.handlers.borrow_mut().push((Rc::clone(handler), index));
        Ok(index)
    }

    /// Detach `handler` and null its dispatch slot. Unknown handlers are ignored.
    pub fn detach_event_handler(&self, handler: &Rc<EventHandler>) -> Result<()> {
        let position = self.handlers.borrow().iter().position(|(h, _)| Rc::ptr_eq(h, handler));
        let Some(position) = position else {
            return Ok(());
        };
        let (_, index) = self.handlers.borrow_mut().remove(position);
        let api = api::api()?;
        detach_index(&*api, self.he, index)
    }

    /// Dispatch index of an attached handler
    pub fn handler_index(&self, handler: &Rc<EventHandler>) -> Option<usize> {
        self.handlers
            .borrow()
            .iter()
            .find(|(h, _)| Rc::ptr_eq(h, handler))
            .map(|(_, index)| *index)
    }

    fn mapper(&self) -> Result<&EventMapper> {
        if let Some(mapper) = self.mapper.get() {
            return Ok(mapper);
        }
        let mapper = EventMapper::new();
        self.attach_event_handler(mapper.handler())?;
        Ok(self.mapper.get_or_init(|| mapper))
    }

    /// Expose `f` to script as a method of this element
    pub fn define_method<F>(&self, name: &str, f: F) -> Result<()>
    where
        F: Fn(&[Value]) -> Value + 'static,
    {
        self.mapper()?.add_method(name, f);
        Ok(())
    }

    /// Run `f` when the element is clicked
    pub fn on_click<F>(&self, f: F) -> Result<()>
    where
        F: Fn() + 'static,
    {
        self.mapper()?.on_click(f);
        Ok(())
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// All descendants matching a CSS selector
    pub fn select(&self, selector: &str) -> Result<Vec<Element>> {
        self.select_handles(selector, usize::MAX)?
            .into_iter()
            .map(Element::wrap)
            .collect()
    }

    pub fn select_first(&self, selector: &str) -> Result<Option<Element>> {
        self.select_handles(selector, 1)?.into_iter().next().map(Element::wrap).transpose()
    }

    /// The one descendant matching `selector`
    pub fn select_unique(&self, selector: &str) -> Result<Element> {
        let handles = self.select_handles(selector, 2)?;
        match handles.as_slice() {
            [he] => Element::wrap(*he),
            _ => {
                // The first two matches are enough to reject; count the rest for the error
                let count = if handles.is_empty() { 0 } else { self.select_handles(selector, usize::MAX)?.len() };
                Err(Error::NotUnique { selector: selector.to_string(), count })
            }
        }
    }

    /// Like [`select_unique`](Self::select_unique) for call sites that know
    /// the match exists.
    ///
    /// # Panics
    /// When the selector does not match exactly one element.
    pub fn must_select_unique(&self, selector: &str) -> Element {
        match self.select_unique(selector) {
            Ok(element) => element,
            Err(e) => panic!("must_select_unique: {}", e),
        }
    }

    pub fn select_by_id(&self, id: &str) -> Result<Element> {
        self.select_unique(&format!("#{}", id))
    }

    /// # Panics
    /// When no single element has the id.
    pub fn must_select_by_id(&self, id: &str) -> Element {
        self.must_select_unique(&format!("#{}", id))
    }

    fn select_handles(&self, selector: &str, limit: usize) -> Result<Vec<ElementHandle>> {
        let mut found = Vec::new();
        api::api()?
            .select_elements(self.he, selector, &mut |he| {
                found.push(he);
                found.len() >= limit
            })
            .check("SciterSelectElements")?;
        Ok(found)
    }

    // ========================================================================
    // Scripting
    // ========================================================================

    /// Call a global script function in the element's namespace
    pub fn call_function(&self, name: &str, args: &[Value]) -> Result<Value> {
        let argv = args.to_vec();
        let mut retval = Value::new();
        api::api()?
            .call_scripting_function(self.he, name, &argv, &mut retval)
            .check("SciterCallScriptingFunction")?;
        Ok(retval)
    }

    /// Call a script method of the element
    pub fn call_method(&self, name: &str, args: &[Value]) -> Result<Value> {
        let argv = args.to_vec();
        let mut retval = Value::new();
        api::api()?
            .call_scripting_method(self.he, name, &argv, &mut retval)
            .check("SciterCallScriptingMethod")?;
        Ok(retval)
    }

    pub fn value(&self) -> Result<Value> {
        let mut value = Value::new();
        api::api()?.get_value(self.he, &mut value).check("SciterGetValue")?;
        Ok(value)
    }

    pub fn set_value(&self, value: &Value) -> Result<()> {
        api::api()?.set_value(self.he, value).check("SciterSetValue")
    }
}

/// Detach the handler at `index` from `he`, then null its slot
fn detach_index(api: &dyn SciterApi, he: ElementHandle, index: usize) -> Result<()> {
    let result = api.detach_event_handler(he, dispatch::element_proc, dispatch::index_to_tag(index));
    dispatch::detach_handler(index);
    tracing::debug!("Detached handler #{} from element {:?}", index, he);
    result.check("SciterDetachEventHandler")
}

impl Drop for Element {
    fn drop(&mut self) {
        let handlers = std::mem::take(self.handlers.get_mut());
        let Ok(api) = api::api() else {
            for (_, index) in handlers {
                dispatch::detach_handler(index);
            }
            return;
        };
        // Handlers go first: detaching needs the handle alive
        for (_, index) in handlers {
            if let Err(e) = detach_index(&*api, self.he, index) {
                tracing::debug!("{}", e);
            }
        }
        if self.he.is_valid() {
            let result = api.unuse_element(self.he);
            if result != DomResult::Ok {
                tracing::debug!("Sciter_UnuseElement({:?}) failed: {}", self.he, result);
            }
        }
    }
}

impl std::fmt::Debug for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("he", &self.he)
            .field("handlers", &self.handlers.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingEngine;

    #[test]
    fn test_wrap_acquires_and_drop_releases() {
        let engine = RecordingEngine::install();
        let he = ElementHandle(0x10);
        {
            let element = Element::wrap(he).unwrap();
            assert_eq!(engine.element_refcount(he), 1);
            assert!(element.is_valid());
        }
        assert_eq!(engine.element_refcount(he), 0);
        assert_eq!(engine.underflows(), 0);
    }

    #[test]
    fn test_wrap_null_skips_engine() {
        let engine = RecordingEngine::install();
        let element = Element::wrap(ElementHandle::NULL).unwrap();
        assert!(!element.is_valid());
        drop(element);
        assert_eq!(engine.element_refcount(ElementHandle::NULL), 0);
        assert_eq!(engine.underflows(), 0);
    }

    #[test]
    fn test_wrap_without_engine() {
        assert!(matches!(Element::wrap(ElementHandle(1)), Err(Error::NoEngine)));
    }

    #[test]
    fn test_attach_is_deduplicated() {
        let engine = RecordingEngine::install();
        let element = Element::wrap(ElementHandle(0x20)).unwrap();
        let handler = Rc::new(EventHandler::new());
        let first = element.attach_event_handler(&handler).unwrap();
        let second = element.attach_event_handler(&handler).unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.attached(element.handle()).len(), 1);
    }

    #[test]
    fn test_detach_nulls_slot() {
        let engine = RecordingEngine::install();
        let element = Element::wrap(ElementHandle(0x30)).unwrap();
        let handler = Rc::new(EventHandler::new());
        let index = element.attach_event_handler(&handler).unwrap();

        element.detach_event_handler(&handler).unwrap();
        assert!(dispatch::handler_at(index).is_none());
        assert_eq!(element.handler_index(&handler), None);
        assert!(engine.attached(element.handle()).is_empty());
    }

    #[test]
    fn test_drop_detaches_before_release() {
        let engine = RecordingEngine::install();
        let he = ElementHandle(0x40);
        let handler = Rc::new(EventHandler::new());
        let element = Element::wrap(he).unwrap();
        let index = element.attach_event_handler(&handler).unwrap();
        drop(element);

        assert!(dispatch::handler_at(index).is_none());
        let log = engine.calls();
        let detach = log.iter().position(|c| c.starts_with("detach")).unwrap();
        let unuse = log.iter().rposition(|c| c.starts_with("unuse")).unwrap();
        assert!(detach < unuse);
        assert_eq!(engine.element_refcount(he), 0);
    }

    #[test]
    fn test_select_variants() {
        let engine = RecordingEngine::install();
        engine.set_selection("li", &[ElementHandle(0x51), ElementHandle(0x52)]);
        engine.set_selection("#ok", &[ElementHandle(0x53)]);
        let root = Element::wrap(ElementHandle(0x50)).unwrap();

        assert_eq!(root.select("li").unwrap().len(), 2);
        assert_eq!(root.select_first("li").unwrap().map(|e| e.handle()), Some(ElementHandle(0x51)));
        assert!(root.select_first("none").unwrap().is_none());
        assert_eq!(root.select_by_id("ok").unwrap().handle(), ElementHandle(0x53));

        match root.select_unique("li") {
            Err(Error::NotUnique { count, .. }) => assert_eq!(count, 2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(root.select_unique("none"), Err(Error::NotUnique { count: 0, .. })));
    }

    #[test]
    #[should_panic(expected = "must_select_unique")]
    fn test_must_select_unique_panics() {
        let _engine = RecordingEngine::install();
        let root = Element::wrap(ElementHandle(0x60)).unwrap();
        root.must_select_unique(".missing");
    }

    #[test]
    fn test_value_roundtrip_through_engine() {
        let _engine = RecordingEngine::install();
        let input = Element::wrap(ElementHandle(0x70)).unwrap();
        assert!(input.value().unwrap().is_undefined());
        input.set_value(&Value::from("typed")).unwrap();
        assert_eq!(input.value().unwrap(), Value::from("typed"));
    }

    #[test]
    fn test_call_function_copies_args() {
        let engine = RecordingEngine::install();
        engine.define_script_function("echo", |args| args.iter().cloned().collect());
        let el = Element::wrap(ElementHandle(0x80)).unwrap();
        let args = vec![Value::from(1), Value::from("two")];
        let ret = el.call_function("echo", &args).unwrap();
        drop(args);
        assert_eq!(ret.len(), 2);
        assert!(engine.calls().iter().any(|c| c == "call_scripting_function echo"));
    }
}
