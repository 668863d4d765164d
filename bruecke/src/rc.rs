//! Reference-counting core.
//!
//! Refcount states: `1` exclusive, `>1` shared, `0` immortal, `<0`
//! multi-threaded with the share count negated. The fast paths compile to
//! a load, a compare and a store; everything expensive (child release,
//! atomic contention, reclamation) lives behind [`dec_cold`], taken only
//! when a decrement cannot simply subtract one.
//!
//! The cold path walks an explicit worklist instead of recursing, so a
//! million-element ownership chain releases in constant stack space.

use std::sync::atomic::{Ordering, fence};

use log::trace;

use crate::alloc::free_object;
use crate::arrays::ArrayObject;
use crate::closures::ClosureObject;
use crate::ctor::CtorObject;
use crate::external::ExternalObject;
use crate::object::{
    MAX_CTOR_TAG, Object, TAG_ARRAY, TAG_BIGINT, TAG_CLOSURE, TAG_EXTERNAL, TAG_REF, TAG_SARRAY,
    TAG_STRING, TAG_TASK, TAG_THUNK,
};
use crate::refs::RefObject;
use crate::tagged::Obj;
use crate::tasks::TaskObject;
use crate::thunks::ThunkObject;

/// Take one more owned reference. No-op for scalars, null and immortal
/// objects.
///
/// # Safety
///
/// Non-scalar, non-null `o` must reference a live heap object.
#[inline(always)]
pub unsafe fn inc(o: Obj) {
    unsafe { inc_n(o, 1) }
}

/// Take `n` more owned references in one step.
///
/// # Safety
///
/// Non-scalar, non-null `o` must reference a live heap object.
#[inline(always)]
pub unsafe fn inc_n(o: Obj, n: usize) {
    if o.is_scalar() || o.is_null() {
        return;
    }
    let h = unsafe { o.header() };
    let rc = h.rc();
    if rc > 0 {
        h.store_rc(rc + n as i32);
    } else if rc < 0 {
        // MT representation counts down from -1.
        h.rc_atomic().fetch_sub(n as i32, Ordering::Relaxed);
    }
}

/// Give up one owned reference; destroys the object when it was the last.
///
/// # Safety
///
/// Non-scalar, non-null `o` must reference a live heap object the caller
/// owns one reference to. Containers holding uninitialized slots (see
/// [`alloc_array_with_size`](crate::arrays::alloc_array_with_size)) must
/// not reach here before every slot is populated.
#[inline(always)]
pub unsafe fn dec(o: Obj) {
    if o.is_scalar() || o.is_null() {
        return;
    }
    let h = unsafe { o.header() };
    let rc = h.rc();
    if rc > 1 {
        h.store_rc(rc - 1);
    } else if rc != 0 {
        unsafe { dec_cold(o) };
    }
}

/// True when in-place mutation is allowed: scalars always, heap objects
/// only while exclusively owned.
///
/// # Safety
///
/// Non-scalar, non-null `o` must reference a live heap object.
#[inline(always)]
pub unsafe fn is_exclusive(o: Obj) -> bool {
    if o.is_scalar() {
        return true;
    }
    if o.is_null() {
        return false;
    }
    unsafe { o.header().rc() == 1 }
}

/// # Safety
///
/// Non-scalar, non-null `o` must reference a live heap object.
#[inline(always)]
pub unsafe fn is_shared(o: Obj) -> bool {
    if o.is_scalar() || o.is_null() {
        return false;
    }
    unsafe { o.header().rc() > 1 }
}

/// Flip an object (and everything it owns) to the multi-threaded refcount
/// representation. Must happen before the object is handed to another
/// thread; there is no auto-promotion.
///
/// The root must be exclusive; owned children may already be shared or
/// already marked.
///
/// # Safety
///
/// Non-scalar, non-null `o` must reference a live heap object not yet
/// visible to other threads.
pub unsafe fn mark_mt(o: Obj) {
    debug_assert!(unsafe { is_exclusive(o) });
    unsafe { mark_graph(o, |h, rc| h.store_rc(-rc)) }
}

/// Make an object (and everything it owns) immortal: rc 0, inc/dec
/// become no-ops, never freed.
///
/// # Safety
///
/// Non-scalar, non-null `o` must reference a live heap object not yet
/// visible to other threads.
pub unsafe fn mark_persistent(o: Obj) {
    unsafe { mark_graph(o, |h, _| h.store_rc(0)) }
}

unsafe fn mark_graph(o: Obj, f: impl Fn(&crate::object::Header, i32)) {
    if o.is_scalar() || o.is_null() {
        return;
    }
    let mut todo: Vec<*mut Object> = vec![unsafe { o.as_ptr() }];
    while let Some(p) = todo.pop() {
        let h = unsafe { &(*p).header };
        let rc = h.rc();
        if rc <= 0 {
            // Already marked (or immortal): its subgraph is too.
            continue;
        }
        f(h, rc);
        unsafe {
            for_each_child(p, &mut |c| {
                if !c.is_scalar() && !c.is_null() {
                    todo.push(c.as_ptr());
                }
            });
        }
    }
}

/// Cold decrement: last single-threaded reference, or any multi-threaded
/// decrement.
#[cold]
unsafe fn dec_cold(o: Obj) {
    let h = unsafe { o.header() };
    let rc = h.rc();
    if rc == 1 {
        unsafe { destroy(o.as_ptr()) };
    } else {
        debug_assert!(rc < 0);
        if h.rc_atomic().fetch_add(1, Ordering::Release) == -1 {
            fence(Ordering::Acquire);
            unsafe { destroy(o.as_ptr()) };
        }
    }
}

/// Decrement an owned child during teardown, queueing it when this was
/// its last reference.
unsafe fn dec_child(v: Obj, todo: &mut Vec<*mut Object>) {
    if v.is_scalar() || v.is_null() {
        return;
    }
    let h = unsafe { v.header() };
    let rc = h.rc();
    if rc > 1 {
        h.store_rc(rc - 1);
    } else if rc == 1 {
        todo.push(unsafe { v.as_ptr() });
    } else if rc < 0 && h.rc_atomic().fetch_add(1, Ordering::Release) == -1 {
        fence(Ordering::Acquire);
        todo.push(unsafe { v.as_ptr() });
    }
}

/// Enumerate the owned object slots of one heap object, per its variant's
/// layout. External objects are skipped: only their registered visitor
/// can enumerate references hidden in native data.
pub(crate) unsafe fn for_each_child(p: *mut Object, f: &mut impl FnMut(Obj)) {
    let tag = unsafe { (*p).header.tag() };
    unsafe {
        if tag <= MAX_CTOR_TAG {
            let c = p as *mut CtorObject;
            let n = (*p).header.other() as usize;
            for i in 0..n {
                f((*c).fields_ptr().add(i).read());
            }
            return;
        }
        match tag {
            TAG_ARRAY => {
                let a = p as *mut ArrayObject;
                for i in 0..(*a).size {
                    f((*a).fields_ptr().add(i).read());
                }
            }
            TAG_CLOSURE => {
                let c = p as *mut ClosureObject;
                for i in 0..(*c).num_fixed as usize {
                    f((*c).fields_ptr().add(i).read());
                }
            }
            TAG_THUNK => {
                let t = p as *mut ThunkObject;
                f(Obj::from_raw_ptr((*t).value.load(Ordering::Acquire)));
                f(Obj::from_raw_ptr((*t).closure.load(Ordering::Acquire)));
            }
            TAG_TASK => {
                let t = p as *mut TaskObject;
                f(Obj::from_raw_ptr((*t).value.load(Ordering::Acquire)));
                f(Obj::from_raw_ptr((*t).closure.load(Ordering::Acquire)));
            }
            TAG_REF => {
                let r = p as *mut RefObject;
                f((*r).value);
            }
            TAG_SARRAY | TAG_STRING | TAG_BIGINT | TAG_EXTERNAL => {}
            _ => debug_assert!(false, "unknown tag {tag}"),
        }
    }
}

/// Destroy a dead object: release every owned child (iteratively), run
/// external finalizers, return the storage.
unsafe fn destroy(p: *mut Object) {
    let mut todo: Vec<*mut Object> = vec![p];
    while let Some(p) = todo.pop() {
        let tag = unsafe { (*p).header.tag() };
        trace!("destroy {p:p} tag {tag}");
        if tag == TAG_EXTERNAL {
            let e = p as *mut ExternalObject;
            unsafe {
                if let Some(finalize) = (*(*e).class).finalize {
                    finalize((*e).data);
                }
            }
        } else {
            unsafe { for_each_child(p, &mut |c| dec_child(c, &mut todo)) };
        }
        unsafe { free_object(p) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctor::{alloc_ctor, ctor_set};

    #[test]
    fn inc_dec_balance_restores_rc() {
        let o = alloc_ctor(0, 0, 0).unwrap();
        unsafe {
            assert_eq!(o.header().rc(), 1);
            for _ in 0..5 {
                inc(o);
            }
            assert_eq!(o.header().rc(), 6);
            assert!(is_shared(o));
            for _ in 0..5 {
                dec(o);
            }
            assert_eq!(o.header().rc(), 1);
            assert!(is_exclusive(o));
            dec(o);
        }
    }

    #[test]
    fn bulk_inc_matches_repeated_inc() {
        let o = alloc_ctor(0, 0, 0).unwrap();
        unsafe {
            inc_n(o, 7);
            assert_eq!(o.header().rc(), 8);
            for _ in 0..8 {
                dec(o);
            }
        }
    }

    #[test]
    fn scalars_ignore_refcounting() {
        let s = Obj::from_scalar(9);
        unsafe {
            inc(s);
            dec(s);
            assert!(is_exclusive(s));
            assert!(!is_shared(s));
        }
    }

    #[test]
    fn ownership_transfer_through_container() {
        // Scenario: A stored into B transfers the extra reference.
        let a = alloc_ctor(0, 0, 0).unwrap();
        let b = alloc_ctor(0, 1, 0).unwrap();
        unsafe {
            inc(a);
            assert_eq!(a.header().rc(), 2);
            ctor_set(b, 0, a);
            dec(b); // releases b, dropping a back to 1
            assert_eq!(a.header().rc(), 1);
            dec(a);
        }
    }

    #[test]
    fn mark_mt_flips_subgraph_negative() {
        let inner = alloc_ctor(0, 0, 0).unwrap();
        let outer = alloc_ctor(0, 1, 0).unwrap();
        unsafe {
            ctor_set(outer, 0, inner);
            mark_mt(outer);
            assert_eq!(outer.header().rc(), -1);
            assert_eq!(inner.header().rc(), -1);
            dec(outer);
        }
    }

    #[test]
    fn persistent_objects_survive_dec() {
        let o = alloc_ctor(0, 0, 0).unwrap();
        unsafe {
            mark_persistent(o);
            assert_eq!(o.header().rc(), 0);
            dec(o);
            dec(o);
            // still alive and readable
            assert_eq!(o.tag(), 0);
        }
        // immortal: deliberately leaked
    }

    #[test]
    fn mt_refcount_balances_across_threads() {
        let o = alloc_ctor(0, 0, 0).unwrap();
        unsafe {
            mark_mt(o);
            inc_n(o, 2);
        }
        let mut handles = Vec::new();
        for _ in 0..2 {
            handles.push(std::thread::spawn(move || {
                for _ in 0..10_000 {
                    unsafe {
                        inc(o);
                        dec(o);
                    }
                }
                unsafe { dec(o) };
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        unsafe {
            assert_eq!(o.header().rc(), -1);
            dec(o);
        }
    }
}
