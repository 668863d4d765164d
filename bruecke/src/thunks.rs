//! Thunks: single-shot lazy caches.
//!
//! ```text
//! [Header 8B] [value: nullable Obj, 8B] [closure: nullable Obj, 8B]
//! ```
//!
//! Either `value` is set (evaluated) or `closure` is (pending); forcing
//! consumes the closure and fills the cache exactly once. The once-only,
//! thread-safe force routine belongs to the host runtime
//! ([`HostScheduler::force_thunk`](crate::host::HostScheduler::force_thunk));
//! this module only owns the object shape that routine consumes.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::alloc::alloc_object;
use crate::host::HostScheduler;
use crate::object::{Header, Object, TAG_THUNK};
use crate::rc::inc;
use crate::tagged::Obj;

#[repr(C)]
pub struct ThunkObject {
    pub header: Header,
    pub(crate) value: AtomicPtr<Object>,
    pub(crate) closure: AtomicPtr<Object>,
}

const _: () = assert!(size_of::<ThunkObject>() == 24);

#[inline(always)]
unsafe fn thunk_ptr(o: Obj) -> *mut ThunkObject {
    debug_assert!(unsafe { o.is_thunk() });
    unsafe { o.as_ptr() as *mut ThunkObject }
}

fn alloc_thunk(value: Obj, closure: Obj) -> Option<Obj> {
    let o = alloc_object(size_of::<ThunkObject>(), TAG_THUNK, 0)?;
    unsafe {
        let t = o.as_ptr() as *mut ThunkObject;
        // Fresh object, not yet shared: relaxed init is fine.
        (*t).value = AtomicPtr::new(value.raw() as *mut Object);
        (*t).closure = AtomicPtr::new(closure.raw() as *mut Object);
    }
    Some(o)
}

/// An already-evaluated thunk: zero evaluation cost, takes ownership of
/// `v`.
pub fn thunk_pure(v: Obj) -> Option<Obj> {
    alloc_thunk(v, Obj::NULL)
}

/// A pending thunk; takes ownership of `closure` (arity 0, invoked once
/// by the host's force routine).
pub fn mk_thunk(closure: Obj) -> Option<Obj> {
    alloc_thunk(Obj::NULL, closure)
}

/// Cached value, or null when not yet forced. Borrowing read: no
/// refcount traffic.
///
/// # Safety
///
/// `o` must be a thunk object.
#[inline(always)]
pub unsafe fn thunk_value(o: Obj) -> Obj {
    unsafe { Obj::from_raw_ptr((*thunk_ptr(o)).value.load(Ordering::Acquire)) }
}

/// Pending closure, or null once forced.
///
/// # Safety
///
/// `o` must be a thunk object.
#[inline(always)]
pub unsafe fn thunk_closure(o: Obj) -> Obj {
    unsafe { Obj::from_raw_ptr((*thunk_ptr(o)).closure.load(Ordering::Acquire)) }
}

/// Fill the cache and surrender the consumed closure reference. Host
/// force routines call this after evaluation; the closure slot is
/// cleared first so a finalizing thunk never double-releases it.
///
/// # Safety
///
/// `o` must be a thunk object; ownership of `v` transfers to the thunk.
/// Only the host's once-only force routine may call this.
pub unsafe fn thunk_fill(o: Obj, v: Obj) -> Obj {
    unsafe {
        let t = thunk_ptr(o);
        let closure = (*t).closure.swap(ptr::null_mut(), Ordering::AcqRel);
        (*t).value.store(v.raw() as *mut Object, Ordering::Release);
        Obj::from_raw_ptr(closure)
    }
}

/// Borrowing read of the value, forcing through the host on a cache
/// miss.
///
/// # Safety
///
/// `o` must be a thunk object.
pub unsafe fn thunk_get(o: Obj, host: &impl HostScheduler) -> Obj {
    unsafe {
        let v = thunk_value(o);
        if !v.is_null() {
            return v;
        }
        host.force_thunk(o)
    }
}

/// Owning read: the returned value carries one extra reference.
///
/// # Safety
///
/// `o` must be a thunk object.
pub unsafe fn thunk_get_own(o: Obj, host: &impl HostScheduler) -> Obj {
    unsafe {
        let v = thunk_get(o, host);
        inc(v);
        v
    }
}
