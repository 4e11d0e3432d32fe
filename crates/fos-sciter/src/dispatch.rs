//! Event dispatch
//!
//! The engine identifies a host handler only by the opaque tag it was given
//! at attach time. Tags here are indices into per-thread slot tables, so a
//! stale tag resolves to an empty slot instead of a dangling pointer.
//!
//! [`element_proc`] and [`host_callback`] are the two entry points the engine
//! calls. Both decode the raw payload, look up the slot and route to the
//! matching closure of the stored record.

use std::ffi::c_void;
use std::rc::Rc;

use crate::dom::Element;
use crate::error::{DomResult, Error, Result};
use crate::events::{
    BEHAVIOR_ATTACH, BEHAVIOR_DETACH, BehaviorEventParams, DataArrivedParams, DrawParams,
    ExchangeParams, FocusParams, GestureParams, HANDLE_ALL, HANDLE_BEHAVIOR_EVENT,
    HANDLE_DATA_ARRIVED, HANDLE_DRAW, HANDLE_EXCHANGE, HANDLE_FOCUS, HANDLE_GESTURE,
    HANDLE_INITIALIZATION, HANDLE_KEY, HANDLE_METHOD_CALL, HANDLE_MOUSE, HANDLE_SCRIPTING_METHOD_CALL,
    HANDLE_SCROLL, HANDLE_SIZE, HANDLE_SOM, HANDLE_TIMER, HANDLE_TISCRIPT_METHOD_CALL,
    InitializationParams, KeyParams, MethodParams, MouseParams, SUBSCRIPTIONS_REQUEST,
    ScriptingMethodParams, ScrollParams, SomParams, TimerParams, TiscriptMethodParams,
};
use crate::handler::{EventHandler, ParamsFn, behavior_acquire, behavior_release};
use crate::notify::{
    CallbackHandler, CallbackNotification, SC_ATTACH_BEHAVIOR, SC_DATA_LOADED, SC_ENGINE_DESTROYED,
    SC_GRAPHICS_CRITICAL_FAILURE, SC_INVALIDATE_RECT, SC_KEYBOARD_REQUEST, SC_LOAD_DATA,
    SC_POSTED_NOTIFICATION, ScnAttachBehavior, ScnDataLoaded, ScnInvalidateRect, ScnKeyboardRequest,
    ScnLoadData, ScnPostedNotification,
};
use crate::registry::SlotTable;
use crate::types::ElementHandle;

/// Handler record as stored for the engine
pub struct HandlerSlot {
    pub handler: Rc<EventHandler>,
    /// Attached through `SC_ATTACH_BEHAVIOR` rather than by the host
    pub behavior: bool,
}

thread_local! {
    static ELEMENT_HANDLERS: SlotTable<HandlerSlot> = SlotTable::new();
    static HOST_CALLBACKS: SlotTable<CallbackHandler> = SlotTable::new();
}

/// Opaque engine tag for a slot index
pub fn index_to_tag(index: usize) -> *mut c_void {
    index as *mut c_void
}

fn tag_to_index(tag: *mut c_void) -> usize {
    tag as usize
}

// ============================================================================
// Slot tables
// ============================================================================

/// Store `handler` for dispatch, returning its index
pub fn register_handler(handler: Rc<EventHandler>, behavior: bool) -> usize {
    let id = handler.id();
    let index = ELEMENT_HANDLERS.with(|table| table.register(Rc::new(HandlerSlot { handler, behavior })));
    tracing::debug!("Registered handler {:?} at #{} (behavior: {})", id, index, behavior);
    index
}

pub fn handler_at(index: usize) -> Option<Rc<HandlerSlot>> {
    ELEMENT_HANDLERS.with(|table| table.get(index))
}

/// Null the slot; later events with its tag are ignored
pub fn detach_handler(index: usize) -> Option<Rc<HandlerSlot>> {
    ELEMENT_HANDLERS.try_with(|table| table.detach(index)).ok().flatten()
}

/// Index of the first live slot holding `handler`
pub fn handler_position(handler: &Rc<EventHandler>) -> Option<usize> {
    ELEMENT_HANDLERS.with(|table| table.position(|slot| Rc::ptr_eq(&slot.handler, handler)))
}

pub fn register_callback(callback: Rc<CallbackHandler>) -> usize {
    let index = HOST_CALLBACKS.with(|table| table.register(callback));
    tracing::debug!("Registered host callback at #{}", index);
    index
}

pub fn callback_at(index: usize) -> Option<Rc<CallbackHandler>> {
    HOST_CALLBACKS.with(|table| table.get(index))
}

// ============================================================================
// Element events
// ============================================================================

/// Decoded `ElementEventProc` payload
#[derive(Debug)]
pub enum EventParams<'a> {
    /// Reply with the groups the handler wants
    Subscriptions(&'a mut u32),
    Initialization(&'a mut InitializationParams),
    Mouse(&'a mut MouseParams),
    Key(&'a mut KeyParams),
    Focus(&'a mut FocusParams),
    Scroll(&'a mut ScrollParams),
    Timer(&'a mut TimerParams),
    /// Carries no payload
    Size,
    Draw(&'a mut DrawParams),
    DataArrived(&'a mut DataArrivedParams),
    BehaviorEvent(&'a mut BehaviorEventParams),
    MethodCall(&'a mut MethodParams),
    ScriptingMethodCall(&'a mut ScriptingMethodParams),
    TiscriptMethodCall(&'a mut TiscriptMethodParams),
    Exchange(&'a mut ExchangeParams),
    Gesture(&'a mut GestureParams),
    Som(&'a mut SomParams),
}

unsafe fn param<'a, T>(prms: *mut c_void) -> Result<&'a mut T> {
    unsafe { prms.cast::<T>().as_mut() }.ok_or(Error::Dom {
        result: DomResult::InvalidParameter,
        op: "ElementEventProc",
    })
}

impl EventParams<'_> {
    /// Decode a raw event
    ///
    /// # Safety
    /// `prms` must be null or point to the payload struct of group `evtg`,
    /// valid for the returned lifetime.
    pub unsafe fn from_raw(evtg: u32, prms: *mut c_void) -> Result<Self> {
        let params = unsafe {
            match evtg {
                SUBSCRIPTIONS_REQUEST => Self::Subscriptions(param(prms)?),
                HANDLE_INITIALIZATION => Self::Initialization(param(prms)?),
                HANDLE_MOUSE => Self::Mouse(param(prms)?),
                HANDLE_KEY => Self::Key(param(prms)?),
                HANDLE_FOCUS => Self::Focus(param(prms)?),
                HANDLE_SCROLL => Self::Scroll(param(prms)?),
                HANDLE_TIMER => Self::Timer(param(prms)?),
                HANDLE_SIZE => Self::Size,
                HANDLE_DRAW => Self::Draw(param(prms)?),
                HANDLE_DATA_ARRIVED => Self::DataArrived(param(prms)?),
                HANDLE_BEHAVIOR_EVENT => Self::BehaviorEvent(param(prms)?),
                HANDLE_METHOD_CALL => Self::MethodCall(param(prms)?),
                HANDLE_SCRIPTING_METHOD_CALL => Self::ScriptingMethodCall(param(prms)?),
                HANDLE_TISCRIPT_METHOD_CALL => Self::TiscriptMethodCall(param(prms)?),
                HANDLE_EXCHANGE => Self::Exchange(param(prms)?),
                HANDLE_GESTURE => Self::Gesture(param(prms)?),
                HANDLE_SOM => Self::Som(param(prms)?),
                other => return Err(Error::UnknownEventGroup(other)),
            }
        };
        Ok(params)
    }
}

fn call<P>(f: &Option<ParamsFn<P>>, element: &Element, params: &mut P) -> bool {
    f.as_ref().is_some_and(|f| f(element, params))
}

/// Route one event to the handler stored at `index`. Returns whether the
/// event was consumed; events for nulled slots are ignored.
pub fn dispatch_element_event(index: usize, he: ElementHandle, params: EventParams<'_>) -> Result<bool> {
    let Some(slot) = handler_at(index) else {
        tracing::trace!("Event for detached handler #{} ignored", index);
        return Ok(false);
    };

    match params {
        EventParams::Subscriptions(groups) => {
            *groups = HANDLE_ALL;
            Ok(true)
        }
        EventParams::Initialization(p) => Ok(initialization(index, &slot, he, p.cmd)),
        other => Ok(route(&slot.handler, &Element::wrap(he)?, other)),
    }
}

/// Attach/detach bookkeeping. The refcount and the slot are updated even
/// when the element cannot be wrapped; only the closures need it.
fn initialization(index: usize, slot: &HandlerSlot, he: ElementHandle, cmd: u32) -> bool {
    let handler = &slot.handler;
    let element = match Element::wrap(he) {
        Ok(element) => Some(element),
        Err(e) => {
            tracing::warn!("Handler #{}: cannot wrap {:?}: {}", index, he, e);
            None
        }
    };

    match cmd {
        BEHAVIOR_ATTACH => {
            if slot.behavior {
                behavior_acquire(handler);
            }
            if let (Some(f), Some(element)) = (&handler.on_attached, &element) {
                f(element);
            }
            true
        }
        BEHAVIOR_DETACH => {
            if let (Some(f), Some(element)) = (&handler.on_detached, &element) {
                f(element);
            }
            if slot.behavior {
                behavior_release(handler.id());
            }
            detach_handler(index);
            true
        }
        other => {
            tracing::debug!("Unknown initialization command {}", other);
            false
        }
    }
}

fn route(handler: &EventHandler, element: &Element, params: EventParams<'_>) -> bool {
    match params {
        EventParams::Mouse(p) => call(&handler.on_mouse, element, p),
        EventParams::Key(p) => call(&handler.on_key, element, p),
        EventParams::Focus(p) => call(&handler.on_focus, element, p),
        EventParams::Scroll(p) => call(&handler.on_scroll, element, p),
        EventParams::Timer(p) => call(&handler.on_timer, element, p),
        EventParams::Size => {
            if let Some(f) = &handler.on_size {
                f(element);
            }
            false
        }
        EventParams::Draw(p) => call(&handler.on_draw, element, p),
        EventParams::DataArrived(p) => call(&handler.on_data_arrived, element, p),
        EventParams::BehaviorEvent(p) => call(&handler.on_behavior_event, element, p),
        EventParams::MethodCall(p) => call(&handler.on_method_call, element, p),
        EventParams::ScriptingMethodCall(p) => call(&handler.on_scripting_method_call, element, p),
        EventParams::TiscriptMethodCall(p) => call(&handler.on_tiscript_method_call, element, p),
        EventParams::Exchange(p) => call(&handler.on_exchange, element, p),
        EventParams::Gesture(p) => call(&handler.on_gesture, element, p),
        EventParams::Som(p) => call(&handler.on_som, element, p),
        // Answered before an element is wrapped
        EventParams::Subscriptions(_) | EventParams::Initialization(_) => false,
    }
}

/// `ElementEventProc` handed to the engine for every attached handler
///
/// # Safety
/// Called by the engine with a tag from [`index_to_tag`] and the payload of
/// group `evtg`.
pub unsafe extern "C" fn element_proc(tag: *mut c_void, he: ElementHandle, evtg: u32, prms: *mut c_void) -> i32 {
    let index = tag_to_index(tag);
    let params = match unsafe { EventParams::from_raw(evtg, prms) } {
        Ok(params) => params,
        Err(e) => {
            tracing::error!("Handler #{}: {}", index, e);
            return 0;
        }
    };
    match dispatch_element_event(index, he, params) {
        Ok(handled) => i32::from(handled),
        Err(e) => {
            tracing::error!("Handler #{}: {}", index, e);
            0
        }
    }
}

// ============================================================================
// Host notifications
// ============================================================================

/// Decoded host callback payload
#[derive(Debug)]
pub enum Notification<'a> {
    LoadData(&'a mut ScnLoadData),
    DataLoaded(&'a ScnDataLoaded),
    AttachBehavior(&'a mut ScnAttachBehavior),
    EngineDestroyed,
    PostedNotification(&'a mut ScnPostedNotification),
    GraphicsCriticalFailure,
    KeyboardRequest(&'a ScnKeyboardRequest),
    InvalidateRect(&'a ScnInvalidateRect),
    Unknown(u32),
}

impl Notification<'_> {
    /// Decode by the header code; `None` for a null pointer
    ///
    /// # Safety
    /// `pns` must be null or point to the notification struct its code names.
    pub unsafe fn from_raw(pns: *mut CallbackNotification) -> Option<Self> {
        let code = unsafe { pns.as_ref() }?.code;
        let n = unsafe {
            match code {
                SC_LOAD_DATA => Self::LoadData(&mut *pns.cast::<ScnLoadData>()),
                SC_DATA_LOADED => Self::DataLoaded(&*pns.cast::<ScnDataLoaded>()),
                SC_ATTACH_BEHAVIOR => Self::AttachBehavior(&mut *pns.cast::<ScnAttachBehavior>()),
                SC_ENGINE_DESTROYED => Self::EngineDestroyed,
                SC_POSTED_NOTIFICATION => Self::PostedNotification(&mut *pns.cast::<ScnPostedNotification>()),
                SC_GRAPHICS_CRITICAL_FAILURE => Self::GraphicsCriticalFailure,
                SC_KEYBOARD_REQUEST => Self::KeyboardRequest(&*pns.cast::<ScnKeyboardRequest>()),
                SC_INVALIDATE_RECT => Self::InvalidateRect(&*pns.cast::<ScnInvalidateRect>()),
                other => Self::Unknown(other),
            }
        };
        Some(n)
    }
}

/// Route one notification to the callback record stored at `index`
pub fn dispatch_host_notification(index: usize, notification: Notification<'_>) -> u32 {
    let Some(cb) = callback_at(index) else {
        tracing::trace!("Notification for unknown callback #{} ignored", index);
        return 0;
    };

    match notification {
        Notification::LoadData(scn) => cb.on_load_data.as_ref().map_or(0, |f| f(scn) as u32),
        Notification::DataLoaded(scn) => cb.on_data_loaded.as_ref().map_or(0, |f| f(scn)),
        Notification::AttachBehavior(scn) => {
            let name = scn.behavior_name().to_string();
            match cb.find_behavior(&name) {
                Some(behavior) => {
                    let slot = register_handler(behavior, true);
                    scn.element_proc = Some(element_proc);
                    scn.element_tag = index_to_tag(slot);
                    tracing::debug!("Behavior <{}> attached to {:?} as #{}", name, scn.element, slot);
                    1
                }
                None => {
                    tracing::warn!("No such behavior <{}> found", name);
                    0
                }
            }
        }
        Notification::EngineDestroyed => cb.on_engine_destroyed.as_ref().map_or(0, |f| f()),
        Notification::PostedNotification(scn) => cb.on_posted_notification.as_ref().map_or(0, |f| f(scn)),
        Notification::GraphicsCriticalFailure => {
            tracing::error!("Graphics critical failure");
            cb.on_graphics_critical_failure.as_ref().map_or(0, |f| f())
        }
        Notification::KeyboardRequest(scn) => cb.on_keyboard_request.as_ref().map_or(0, |f| f(scn)),
        Notification::InvalidateRect(scn) => cb.on_invalidate_rect.as_ref().map_or(0, |f| f(scn)),
        Notification::Unknown(code) => {
            tracing::debug!("Unknown host notification 0x{:02X}", code);
            0
        }
    }
}

/// `SciterHostCallback` handed to the engine for every registered callback
///
/// # Safety
/// Called by the engine with a parameter from [`index_to_tag`].
pub unsafe extern "C" fn host_callback(pns: *mut CallbackNotification, param: *mut c_void) -> u32 {
    match unsafe { Notification::from_raw(pns) } {
        Some(n) => dispatch_host_notification(tag_to_index(param), n),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BUTTON_CLICK, MouseParams, SINKING};
    use crate::handler::behavior_refcount;
    use crate::mock::RecordingEngine;
    use crate::notify::{LoadResult, resource};
    use crate::types::{Point, RequestHandle, WindowHandle};
    use std::cell::Cell;
    use std::ffi::CString;

    fn mouse(cmd: u32) -> MouseParams {
        MouseParams {
            cmd,
            target: ElementHandle(1),
            pos: Point::default(),
            pos_view: Point::default(),
            button_state: 1,
            alt_state: 0,
            cursor_type: 0,
            is_on_icon: 0,
            dragging: ElementHandle::NULL,
            dragging_mode: 0,
        }
    }

    #[test]
    fn test_subscriptions_reply_all() {
        let _engine = RecordingEngine::install();
        let index = register_handler(Rc::new(EventHandler::new()), false);
        let mut groups = 0u32;
        let handled = dispatch_element_event(index, ElementHandle(1), EventParams::Subscriptions(&mut groups)).unwrap();
        assert!(handled);
        assert_eq!(groups, HANDLE_ALL);
    }

    #[test]
    fn test_routes_to_matching_closure() {
        let _engine = RecordingEngine::install();
        let seen = Rc::new(Cell::new(0));
        let counter = Rc::clone(&seen);
        let mut handler = EventHandler::new();
        handler.on_mouse = Some(Box::new(move |_: &Element, p: &mut MouseParams| {
            counter.set(p.cmd);
            true
        }));
        let index = register_handler(Rc::new(handler), false);

        let mut p = mouse(crate::events::MOUSE_DOWN);
        assert!(dispatch_element_event(index, ElementHandle(1), EventParams::Mouse(&mut p)).unwrap());
        assert_eq!(seen.get(), crate::events::MOUSE_DOWN);

        // No key closure: not consumed
        let mut key = KeyParams { cmd: 0, target: ElementHandle(1), key_code: 65, alt_state: 0 };
        assert!(!dispatch_element_event(index, ElementHandle(1), EventParams::Key(&mut key)).unwrap());
    }

    #[test]
    fn test_detached_slot_ignores_events() {
        let _engine = RecordingEngine::install();
        let index = register_handler(Rc::new(EventHandler::new()), false);
        detach_handler(index);
        let mut p = mouse(0);
        assert!(!dispatch_element_event(index, ElementHandle(1), EventParams::Mouse(&mut p)).unwrap());
        assert!(!dispatch_element_event(9999, ElementHandle(1), EventParams::Size).unwrap());
    }

    #[test]
    fn test_unknown_group_is_not_consumed() {
        let _engine = RecordingEngine::install();
        let index = register_handler(Rc::new(EventHandler::new()), false);
        let mut dummy = 0u32;
        let rc = unsafe { element_proc(index_to_tag(index), ElementHandle(1), 0x4000, (&mut dummy as *mut u32).cast()) };
        assert_eq!(rc, 0);
        assert!(matches!(
            unsafe { EventParams::from_raw(0x4000, std::ptr::null_mut()) },
            Err(Error::UnknownEventGroup(0x4000))
        ));
        assert!(matches!(
            unsafe { EventParams::from_raw(HANDLE_MOUSE, std::ptr::null_mut()) },
            Err(Error::Dom { result: DomResult::InvalidParameter, .. })
        ));
    }

    #[test]
    fn test_element_proc_behavior_event() {
        let _engine = RecordingEngine::install();
        let clicks = Rc::new(Cell::new(0));
        let counter = Rc::clone(&clicks);
        let mut handler = EventHandler::new();
        handler.on_behavior_event = Some(Box::new(move |_: &Element, p: &mut BehaviorEventParams| {
            if p.cmd() == BUTTON_CLICK {
                counter.set(counter.get() + 1);
            }
            false
        }));
        let index = register_handler(Rc::new(handler), false);
        let mut p = BehaviorEventParams::new(BUTTON_CLICK, SINKING, ElementHandle(2));
        let rc = unsafe {
            element_proc(index_to_tag(index), ElementHandle(2), HANDLE_BEHAVIOR_EVENT, (&mut p as *mut BehaviorEventParams).cast())
        };
        assert_eq!(rc, 0);
        assert_eq!(clicks.get(), 1);
    }

    #[test]
    fn test_detach_runs_closure_and_nulls_slot() {
        let _engine = RecordingEngine::install();
        let detached = Rc::new(Cell::new(false));
        let flag = Rc::clone(&detached);
        let mut handler = EventHandler::new();
        handler.on_detached = Some(Box::new(move |_: &Element| flag.set(true)));
        let index = register_handler(Rc::new(handler), false);

        let mut init = InitializationParams { cmd: BEHAVIOR_DETACH };
        assert!(dispatch_element_event(index, ElementHandle(3), EventParams::Initialization(&mut init)).unwrap());
        assert!(detached.get());
        assert!(handler_at(index).is_none());
    }

    #[test]
    fn test_detach_without_engine_still_releases() {
        let engine = RecordingEngine::install();
        let behavior = Rc::new(EventHandler::new());
        let id = behavior.id();
        let index = register_handler(Rc::clone(&behavior), true);

        let mut init = InitializationParams { cmd: BEHAVIOR_ATTACH };
        assert!(dispatch_element_event(index, ElementHandle(6), EventParams::Initialization(&mut init)).unwrap());
        assert_eq!(behavior_refcount(id), 1);

        crate::api::uninstall();
        init.cmd = BEHAVIOR_DETACH;
        assert!(dispatch_element_event(index, ElementHandle(6), EventParams::Initialization(&mut init)).unwrap());
        assert_eq!(behavior_refcount(id), 0);
        assert!(handler_at(index).is_none());
        assert_eq!(Rc::strong_count(&behavior), 1);
        assert_eq!(engine.element_refcount(ElementHandle(6)), 0);
    }

    #[test]
    fn test_other_groups_need_the_element() {
        let index = register_handler(Rc::new(EventHandler::new()), false);
        let mut p = mouse(0);
        assert!(matches!(
            dispatch_element_event(index, ElementHandle(1), EventParams::Mouse(&mut p)),
            Err(Error::NoEngine)
        ));
        let mut groups = 0u32;
        assert!(dispatch_element_event(index, ElementHandle(1), EventParams::Subscriptions(&mut groups)).unwrap());
    }

    #[test]
    fn test_attach_behavior_notification() {
        let _engine = RecordingEngine::install();
        let clock = Rc::new(EventHandler::new());
        let id = clock.id();
        let cb = register_callback(Rc::new(CallbackHandler::new().with_behavior("clock", Rc::clone(&clock))));

        let name = CString::new("clock").unwrap();
        let mut scn = unsafe { ScnAttachBehavior::new(WindowHandle(1), ElementHandle(4), &name) };
        let rc = unsafe { host_callback((&mut scn as *mut ScnAttachBehavior).cast(), index_to_tag(cb)) };
        assert_eq!(rc, 1);
        let proc_ = scn.element_proc.unwrap();

        let mut init = InitializationParams { cmd: BEHAVIOR_ATTACH };
        unsafe { proc_(scn.element_tag, ElementHandle(4), HANDLE_INITIALIZATION, (&mut init as *mut InitializationParams).cast()) };
        assert_eq!(behavior_refcount(id), 1);

        init.cmd = BEHAVIOR_DETACH;
        unsafe { proc_(scn.element_tag, ElementHandle(4), HANDLE_INITIALIZATION, (&mut init as *mut InitializationParams).cast()) };
        assert_eq!(behavior_refcount(id), 0);
        assert!(handler_at(tag_to_index(scn.element_tag)).is_none());
    }

    #[test]
    fn test_attach_unknown_behavior() {
        let cb = register_callback(Rc::new(CallbackHandler::new()));
        let name = CString::new("ghost").unwrap();
        let mut scn = unsafe { ScnAttachBehavior::new(WindowHandle(1), ElementHandle(5), &name) };
        assert_eq!(dispatch_host_notification(cb, Notification::AttachBehavior(&mut scn)), 0);
        assert!(scn.element_proc.is_none());
    }

    #[test]
    fn test_load_data_result() {
        let mut handler = CallbackHandler::new();
        handler.on_load_data = Some(Box::new(|_: &mut ScnLoadData| LoadResult::Delayed));
        let cb = register_callback(Rc::new(handler));
        let mut scn = unsafe { ScnLoadData::new(WindowHandle(1), &[], resource::HTML, RequestHandle(1)) };
        assert_eq!(dispatch_host_notification(cb, Notification::LoadData(&mut scn)), LoadResult::Delayed as u32);
        assert_eq!(unsafe { host_callback(std::ptr::null_mut(), index_to_tag(cb)) }, 0);
    }
}
