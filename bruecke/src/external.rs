//! Foreign-resource wrappers.
//!
//! An external object pairs an opaque native-data pointer with a class
//! descriptor registered up front: an optional finalizer (invoked with
//! the data pointer when the wrapper dies) and an optional visitor
//! (invoked during host graph traversal so the native data can confess
//! the managed references it holds).
//!
//! ```text
//! [Header 8B] [class: *const ExternalClass, 8B] [data: *mut c_void, 8B]
//! ```

use std::ffi::c_void;
use std::sync::LazyLock;

use log::debug;
use parking_lot::Mutex;

use crate::alloc::alloc_object;
use crate::object::{Header, TAG_EXTERNAL};
use crate::rc::{dec, is_exclusive};
use crate::tagged::Obj;

/// Finalizer: called exactly once with the native-data pointer when the
/// wrapper's refcount reaches zero.
pub type ExternalFinalizeProc = unsafe extern "C" fn(data: *mut c_void);

/// GC visitor: must apply `visit` (a host-applied closure awaiting one
/// argument) once per managed reference the native data holds.
pub type ExternalForeachProc = unsafe extern "C" fn(data: *mut c_void, visit: Obj);

#[repr(C)]
pub struct ExternalClass {
    pub finalize: Option<ExternalFinalizeProc>,
    pub foreach: Option<ExternalForeachProc>,
}

#[repr(C)]
pub struct ExternalObject {
    pub header: Header,
    pub(crate) class: *const ExternalClass,
    pub(crate) data: *mut c_void,
}

const _: () = assert!(size_of::<ExternalObject>() == 24);

// Classes live for the whole process; the registry exists so the host
// collector can enumerate visitor-bearing classes.
static CLASSES: LazyLock<Mutex<Vec<&'static ExternalClass>>> =
    LazyLock::new(|| Mutex::new(Vec::new()));

/// Register a class descriptor; the returned pointer stays valid for the
/// life of the process.
pub fn register_external_class(
    finalize: Option<ExternalFinalizeProc>,
    foreach: Option<ExternalForeachProc>,
) -> *const ExternalClass {
    let class: &'static ExternalClass = Box::leak(Box::new(ExternalClass { finalize, foreach }));
    debug!(
        "registered external class {:p} (finalize: {}, foreach: {})",
        class,
        class.finalize.is_some(),
        class.foreach.is_some()
    );
    CLASSES.lock().push(class);
    class
}

#[inline(always)]
unsafe fn external_ptr(o: Obj) -> *mut ExternalObject {
    debug_assert!(unsafe { o.is_external() });
    unsafe { o.as_ptr() as *mut ExternalObject }
}

/// Wrap `data` under `class`. Ownership of the native payload follows
/// the class's finalizer from here on.
pub fn alloc_external(class: *const ExternalClass, data: *mut c_void) -> Option<Obj> {
    let o = alloc_object(size_of::<ExternalObject>(), TAG_EXTERNAL, 0)?;
    unsafe {
        let e = o.as_ptr() as *mut ExternalObject;
        (*e).class = class;
        (*e).data = data;
    }
    Some(o)
}

/// # Safety
///
/// `o` must be an external object.
#[inline(always)]
pub unsafe fn external_class(o: Obj) -> *const ExternalClass {
    unsafe { (*external_ptr(o)).class }
}

/// # Safety
///
/// `o` must be an external object.
#[inline(always)]
pub unsafe fn external_data(o: Obj) -> *mut c_void {
    unsafe { (*external_ptr(o)).data }
}

/// Replace the native payload: in place when the wrapper is exclusive,
/// otherwise into a fresh wrapper of the same class (consuming one
/// reference to `o`). The *old* payload is never finalized here —
/// asymmetric with the auto-releasing field model, by caller discipline.
///
/// # Safety
///
/// `o` must be an external object; `data` must be valid for the class's
/// finalizer.
pub unsafe fn set_external_data(o: Obj, data: *mut c_void) -> Option<Obj> {
    unsafe {
        if is_exclusive(o) {
            (*external_ptr(o)).data = data;
            return Some(o);
        }
        let fresh = alloc_external(external_class(o), data)?;
        dec(o);
        Some(fresh)
    }
}

/// Run the class's registered visitor, handing it `visit` to apply once
/// per managed reference in the native data. Called by the host
/// collector, never internally.
///
/// # Safety
///
/// `o` must be an external object; `visit` must be applicable by the
/// host for the duration of the call.
pub unsafe fn external_foreach(o: Obj, visit: Obj) {
    unsafe {
        if let Some(foreach) = (*external_class(o)).foreach {
            foreach(external_data(o), visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static FINALIZED: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn count_finalize(data: *mut c_void) {
        FINALIZED.fetch_add(data as usize, Ordering::SeqCst);
    }

    #[test]
    fn finalizer_runs_at_refcount_zero() {
        let class = register_external_class(Some(count_finalize), None);
        let o = alloc_external(class, 7 as *mut c_void).unwrap();
        unsafe {
            assert!(o.is_external());
            assert_eq!(external_data(o), 7 as *mut c_void);
            crate::rc::inc(o);
            dec(o);
            assert_eq!(FINALIZED.load(Ordering::SeqCst), 0);
            dec(o);
            assert_eq!(FINALIZED.load(Ordering::SeqCst), 7);
        }
    }

    #[test]
    fn set_data_in_place_when_exclusive() {
        let class = register_external_class(None, None);
        let o = alloc_external(class, 1 as *mut c_void).unwrap();
        unsafe {
            let o2 = set_external_data(o, 2 as *mut c_void).unwrap();
            assert_eq!(o2, o);
            assert_eq!(external_data(o), 2 as *mut c_void);
            dec(o);
        }
    }

    #[test]
    fn set_data_copies_when_shared() {
        let class = register_external_class(None, None);
        let o = alloc_external(class, 1 as *mut c_void).unwrap();
        unsafe {
            crate::rc::inc(o);
            let o2 = set_external_data(o, 2 as *mut c_void).unwrap();
            assert_ne!(o2, o);
            assert_eq!(external_data(o), 1 as *mut c_void);
            assert_eq!(external_data(o2), 2 as *mut c_void);
            assert_eq!(external_class(o2), external_class(o));
            dec(o);
            dec(o2);
        }
    }

    #[test]
    fn foreach_confesses_held_references() {
        // The native payload "holds" one managed reference; its visitor
        // reports it by tagging the visit argument it was given.
        static VISITED: AtomicUsize = AtomicUsize::new(0);
        unsafe extern "C" fn confess(_data: *mut c_void, visit: Obj) {
            VISITED.fetch_add(unsafe { visit.to_scalar() }, Ordering::SeqCst);
        }
        let class = register_external_class(None, Some(confess));
        let o = alloc_external(class, std::ptr::null_mut()).unwrap();
        unsafe {
            external_foreach(o, Obj::from_scalar(3));
            assert_eq!(VISITED.load(Ordering::SeqCst), 3);
            dec(o);
        }
    }
}
