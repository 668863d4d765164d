//! Tasks: handles to computations scheduled by the host runtime.
//!
//! ```text
//! [Header 8B] [value: nullable Obj, 8B] [closure: nullable Obj, 8B]
//! [handle: usize, 8B]
//! ```
//!
//! `spawn`/`map`/`bind` are pure marshalling: they build the object
//! shapes and forward them to the host scheduler, which owns execution,
//! completion and the blocking wait. `handle` is an opaque scheduler
//! token, 0 until the host claims the task.

use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crate::alloc::alloc_object;
use crate::host::HostScheduler;
use crate::object::{Header, Object, TAG_TASK};
use crate::tagged::Obj;

#[repr(C)]
pub struct TaskObject {
    pub header: Header,
    pub(crate) value: AtomicPtr<Object>,
    pub(crate) closure: AtomicPtr<Object>,
    pub(crate) handle: AtomicUsize,
}

const _: () = assert!(size_of::<TaskObject>() == 32);

#[inline(always)]
unsafe fn task_ptr(o: Obj) -> *mut TaskObject {
    debug_assert!(unsafe { o.is_task() });
    unsafe { o.as_ptr() as *mut TaskObject }
}

/// Build the object shape for a not-yet-scheduled task; takes ownership
/// of `closure`. Host schedulers consume this from
/// [`task_spawn`]/[`task_map`]/[`task_bind`].
pub fn mk_task(closure: Obj) -> Option<Obj> {
    let o = alloc_object(size_of::<TaskObject>(), TAG_TASK, 0)?;
    unsafe {
        let t = o.as_ptr() as *mut TaskObject;
        (*t).value = AtomicPtr::new(std::ptr::null_mut());
        (*t).closure = AtomicPtr::new(closure.raw() as *mut Object);
        (*t).handle = AtomicUsize::new(0);
    }
    Some(o)
}

/// Completed value, or null while still running.
///
/// # Safety
///
/// `o` must be a task object.
#[inline(always)]
pub unsafe fn task_value(o: Obj) -> Obj {
    unsafe { Obj::from_raw_ptr((*task_ptr(o)).value.load(Ordering::Acquire)) }
}

/// Pending closure, or null once the host has consumed it.
///
/// # Safety
///
/// `o` must be a task object.
#[inline(always)]
pub unsafe fn task_closure(o: Obj) -> Obj {
    unsafe { Obj::from_raw_ptr((*task_ptr(o)).closure.load(Ordering::Acquire)) }
}

/// # Safety
///
/// `o` must be a task object.
#[inline(always)]
pub unsafe fn task_handle(o: Obj) -> usize {
    unsafe { (*task_ptr(o)).handle.load(Ordering::Acquire) }
}

/// Record the host scheduler's token for this task.
///
/// # Safety
///
/// `o` must be a task object; only the host scheduler calls this.
#[inline(always)]
pub unsafe fn task_set_handle(o: Obj, handle: usize) {
    unsafe { (*task_ptr(o)).handle.store(handle, Ordering::Release) };
}

/// Complete the task and surrender the consumed closure reference, the
/// task-side mirror of [`thunk_fill`](crate::thunks::thunk_fill).
///
/// # Safety
///
/// `o` must be a task object; ownership of `v` transfers to the task.
/// Only the host's completion path may call this.
pub unsafe fn task_fill(o: Obj, v: Obj) -> Obj {
    unsafe {
        let t = task_ptr(o);
        let closure = (*t).closure.swap(std::ptr::null_mut(), Ordering::AcqRel);
        (*t).value.store(v.raw() as *mut Object, Ordering::Release);
        Obj::from_raw_ptr(closure)
    }
}

/// Ask the host to run `closure` (arity 0) at `prio`. Ownership of
/// `closure` transfers; the returned task carries one reference.
///
/// # Safety
///
/// `closure` must be a saturated closure object.
pub unsafe fn task_spawn(host: &impl HostScheduler, closure: Obj, prio: u32) -> Option<Obj> {
    unsafe { host.task_spawn(closure, prio) }
}

/// Ask the host for a task applying `f` to `t`'s result. Ownership of
/// both transfers.
///
/// # Safety
///
/// `f` must be a closure object awaiting one argument; `t` a task.
pub unsafe fn task_map(host: &impl HostScheduler, f: Obj, t: Obj) -> Option<Obj> {
    unsafe { host.task_map(f, t) }
}

/// Ask the host for a task running `f` on `t`'s result, where `f`
/// itself yields a task. Ownership of both transfers.
///
/// # Safety
///
/// `t` must be a task; `f` a closure object awaiting one argument.
pub unsafe fn task_bind(host: &impl HostScheduler, t: Obj, f: Obj) -> Option<Obj> {
    unsafe { host.task_bind(t, f) }
}

/// Block until `t` completes; forwarded verbatim to the host's blocking
/// primitive. Borrowing read of the result.
///
/// # Safety
///
/// `t` must be a task object.
pub unsafe fn task_wait(host: &impl HostScheduler, t: Obj) -> Obj {
    unsafe { host.task_wait(t) }
}
