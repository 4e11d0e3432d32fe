//! Event handler records
//!
//! An [`EventHandler`] is a set of optional closures, one per event group.
//! [`EventMapper`] builds one on top of a per-name method table and a click
//! list. Handlers shared as behaviors across many elements are counted in a
//! side table keyed by [`HandlerId`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::dom::Element;
use crate::events::{
    BehaviorEventParams, DataArrivedParams, DrawParams, ExchangeParams, FocusParams,
    GestureParams, KeyParams, MethodParams, MouseParams, ScriptingMethodParams, ScrollParams,
    SomParams, TiscriptMethodParams, TimerParams, BUTTON_CLICK, SINKING,
};
use crate::value::Value;

/// Closure receiving only the element
pub type ElementFn = Box<dyn Fn(&Element)>;

/// Closure receiving the element and the event payload; `true` consumes the event
pub type ParamsFn<P> = Box<dyn Fn(&Element, &mut P) -> bool>;

/// Native method callable from script
pub type ScriptFn = dyn Fn(&[Value]) -> Value;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a handler record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// Per-element (or per-window) event handler
pub struct EventHandler {
    id: HandlerId,
    pub on_attached: Option<ElementFn>,
    pub on_detached: Option<ElementFn>,
    pub on_mouse: Option<ParamsFn<MouseParams>>,
    pub on_key: Option<ParamsFn<KeyParams>>,
    pub on_focus: Option<ParamsFn<FocusParams>>,
    pub on_draw: Option<ParamsFn<DrawParams>>,
    pub on_timer: Option<ParamsFn<TimerParams>>,
    /// Synthesized events from built-in behaviors, e.g. `BUTTON_CLICK`
    pub on_behavior_event: Option<ParamsFn<BehaviorEventParams>>,
    pub on_method_call: Option<ParamsFn<MethodParams>>,
    /// Calls from script by method name
    pub on_scripting_method_call: Option<ParamsFn<ScriptingMethodParams>>,
    pub on_tiscript_method_call: Option<ParamsFn<TiscriptMethodParams>>,
    /// A requested resource arrived; `true` cancels its normal use
    pub on_data_arrived: Option<ParamsFn<DataArrivedParams>>,
    pub on_size: Option<ElementFn>,
    pub on_scroll: Option<ParamsFn<ScrollParams>>,
    pub on_exchange: Option<ParamsFn<ExchangeParams>>,
    pub on_gesture: Option<ParamsFn<GestureParams>>,
    pub on_som: Option<ParamsFn<SomParams>>,
}

impl EventHandler {
    pub fn new() -> Self {
        Self {
            id: HandlerId(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed)),
            on_attached: None,
            on_detached: None,
            on_mouse: None,
            on_key: None,
            on_focus: None,
            on_draw: None,
            on_timer: None,
            on_behavior_event: None,
            on_method_call: None,
            on_scripting_method_call: None,
            on_tiscript_method_call: None,
            on_data_arrived: None,
            on_size: None,
            on_scroll: None,
            on_exchange: None,
            on_gesture: None,
            on_som: None,
        }
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler").field("id", &self.id).finish_non_exhaustive()
    }
}

// ============================================================================
// Behavior side table
// ============================================================================

thread_local! {
    static BEHAVIORS: RefCell<HashMap<HandlerId, (Rc<EventHandler>, usize)>> =
        RefCell::new(HashMap::new());
}

/// Count one more element using `handler` as a behavior; returns the new count
pub fn behavior_acquire(handler: &Rc<EventHandler>) -> usize {
    BEHAVIORS.with(|table| {
        let mut table = table.borrow_mut();
        let entry = table.entry(handler.id()).or_insert_with(|| (Rc::clone(handler), 0));
        entry.1 += 1;
        tracing::debug!("Behavior {:?} attached, {} element(s)", handler.id(), entry.1);
        entry.1
    })
}

/// Count one element less; at zero the table lets go of the handler
pub fn behavior_release(id: HandlerId) -> usize {
    let (count, forgotten) = BEHAVIORS
        .try_with(|table| {
            let mut table = table.borrow_mut();
            let Some(entry) = table.get_mut(&id) else {
                return (0, None);
            };
            entry.1 -= 1;
            let count = entry.1;
            let forgotten = if count == 0 { table.remove(&id) } else { None };
            (count, forgotten)
        })
        .unwrap_or((0, None));
    if forgotten.is_some() {
        tracing::debug!("Behavior {:?} no longer attached anywhere", id);
    }
    count
}

/// Elements currently using the behavior
pub fn behavior_refcount(id: HandlerId) -> usize {
    BEHAVIORS.with(|table| table.borrow().get(&id).map_or(0, |entry| entry.1))
}

// ============================================================================
// Event mapper
// ============================================================================

#[derive(Default)]
struct MapperTables {
    methods: RefCell<HashMap<String, Rc<ScriptFn>>>,
    clicks: RefCell<Vec<Rc<dyn Fn()>>>,
}

/// Handler routing script calls by name and button clicks to host closures
pub struct EventMapper {
    tables: Rc<MapperTables>,
    handler: Rc<EventHandler>,
}

impl EventMapper {
    pub fn new() -> Self {
        let tables = Rc::new(MapperTables::default());
        let mut handler = EventHandler::new();

        let methods = Rc::clone(&tables);
        handler.on_scripting_method_call = Some(Box::new(move |_: &Element, params: &mut ScriptingMethodParams| {
            let method = methods.methods.borrow().get(params.name()).cloned();
            match method {
                Some(f) => {
                    let result = f(params.args());
                    params.set_result(result);
                    true
                }
                None => false,
            }
        }));

        let clicks = Rc::clone(&tables);
        handler.on_behavior_event = Some(Box::new(move |_: &Element, params: &mut BehaviorEventParams| {
            if params.cmd() == BUTTON_CLICK && params.phase() == SINKING {
                let list: Vec<_> = clicks.clicks.borrow().clone();
                for f in list {
                    f();
                }
            }
            false
        }));

        Self { tables, handler: Rc::new(handler) }
    }

    pub fn handler(&self) -> &Rc<EventHandler> {
        &self.handler
    }

    /// Expose `f` to script as `name`, replacing an earlier definition
    pub fn add_method<F>(&self, name: &str, f: F)
    where
        F: Fn(&[Value]) -> Value + 'static,
    {
        self.tables.methods.borrow_mut().insert(name.to_string(), Rc::new(f));
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.tables.methods.borrow().contains_key(name)
    }

    /// Run `f` on every button click seen in the sinking phase
    pub fn on_click<F>(&self, f: F)
    where
        F: Fn() + 'static,
    {
        self.tables.clicks.borrow_mut().push(Rc::new(f));
    }
}

impl Default for EventMapper {
    fn default() -> Self {
        Self::new()
    }
}
