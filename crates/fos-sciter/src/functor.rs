//! Native functor bridge
//!
//! Host closures exposed to script as function values. The engine only
//! carries an opaque tag, so closures live in a per-thread map keyed by that
//! tag until the engine (or the last `Value` holding it) releases them.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::c_void;
use std::rc::Rc;

use crate::value::Value;

/// Closure callable from script
pub type NativeFunctor = dyn Fn(&[Value]) -> Value;

#[derive(Default)]
struct FunctorMap {
    next_tag: usize,
    entries: HashMap<usize, Rc<NativeFunctor>>,
}

thread_local! {
    static FUNCTORS: RefCell<FunctorMap> = RefCell::new(FunctorMap::default());
}

/// Store a closure and hand out its tag. Tags start at 1 and are never reused.
pub fn register(f: Rc<NativeFunctor>) -> usize {
    FUNCTORS.with(|map| {
        let mut map = map.borrow_mut();
        map.next_tag += 1;
        let tag = map.next_tag;
        map.entries.insert(tag, f);
        tracing::debug!("Registered native functor #{}", tag);
        tag
    })
}

/// Run the closure behind `tag`, writing its result to `retval`.
///
/// Returns `false` when the tag is unknown or already released.
pub fn invoke(tag: usize, args: &[Value], retval: &mut Value) -> bool {
    // Clone out so the closure may register or release functors itself
    let f = FUNCTORS.with(|map| map.borrow().entries.get(&tag).cloned());
    match f {
        Some(f) => {
            *retval = f(args);
            true
        }
        None => {
            tracing::warn!("Invoke of unknown native functor #{}", tag);
            false
        }
    }
}

/// Forget the closure behind `tag`. Releasing twice is a no-op.
pub fn release(tag: usize) -> bool {
    // try_with: values may still drop while the thread is tearing down
    let removed = FUNCTORS
        .try_with(|map| map.borrow_mut().entries.remove(&tag))
        .ok()
        .flatten();
    if removed.is_some() {
        tracing::debug!("Released native functor #{}", tag);
    }
    removed.is_some()
}

pub fn contains(tag: usize) -> bool {
    FUNCTORS.with(|map| map.borrow().entries.contains_key(&tag))
}

/// Live closures on this thread
pub fn len() -> usize {
    FUNCTORS.with(|map| map.borrow().entries.len())
}

/// Ownership of one functor tag.
///
/// Dropping it releases the closure unless the tag was exported to the
/// engine, which then owns the map entry until it calls
/// [`native_functor_release`].
#[derive(Debug)]
pub struct FunctorRef {
    tag: usize,
    exported: Cell<bool>,
}

impl FunctorRef {
    pub(crate) fn new(tag: usize) -> Self {
        Self { tag, exported: Cell::new(false) }
    }

    pub fn tag(&self) -> usize {
        self.tag
    }

    /// Hand the tag to the engine; host-side drops no longer release it
    pub fn export(&self) -> usize {
        if !self.exported.replace(true) {
            tracing::debug!("Native functor #{} exported", self.tag);
        }
        self.tag
    }

    pub fn is_exported(&self) -> bool {
        self.exported.get()
    }
}

impl Drop for FunctorRef {
    fn drop(&mut self) {
        if !self.exported.get() {
            release(self.tag);
        }
    }
}

/// `NATIVE_FUNCTOR_INVOKE`
///
/// # Safety
/// `argv` must point to `argc` initialized values and `retval` to a valid
/// value slot.
#[allow(improper_ctypes_definitions)]
pub unsafe extern "C" fn native_functor_invoke(
    tag: *mut c_void,
    argc: u32,
    argv: *const Value,
    retval: *mut Value,
) {
    let args = if argv.is_null() || argc == 0 {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(argv, argc as usize) }
    };
    if let Some(retval) = unsafe { retval.as_mut() } {
        invoke(tag as usize, args, retval);
    }
}

/// `NATIVE_FUNCTOR_RELEASE`
///
/// # Safety
/// Always safe to call; `tag` is only used as a map key.
pub unsafe extern "C" fn native_functor_release(tag: *mut c_void) {
    release(tag as usize);
}
