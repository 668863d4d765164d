//! Injected host-runtime capabilities.
//!
//! This crate owns object shapes only; closure invocation, the once-only
//! thunk force race and task scheduling belong to the host runtime and
//! are modelled as traits the embedder implements. [`InlineHost`] is the
//! in-process stand-in used by tests: it applies closures eagerly on the
//! calling thread, so spawned tasks complete before `spawn` returns and
//! waits never block.

use std::ffi::c_void;
use std::mem::transmute;

use log::debug;
use parking_lot::Mutex;

use crate::closures::{closure_arity, closure_fun, closure_get, closure_num_fixed};
use crate::rc::{dec, inc};
use crate::result::mk_error_string;
use crate::tagged::Obj;
use crate::tasks::{mk_task, task_fill, task_set_handle, task_value};
use crate::thunks::{thunk_closure, thunk_fill, thunk_value};

/// Closure invocation.
///
/// Calling convention: `f`'s fixed arguments come first, then `args`;
/// together they must saturate the arity. Arguments are passed borrowed;
/// one reference to `f` is consumed; the returned value is owned by the
/// caller.
pub trait HostApply {
    /// # Safety
    ///
    /// `f` must be a closure object whose fixed slots are populated and
    /// `closure_num_fixed(f) + args.len() == closure_arity(f)`.
    unsafe fn apply(&self, f: Obj, args: &[Obj]) -> Option<Obj>;
}

/// Deferred-computation services: thunk forcing, task scheduling and the
/// blocking wait, all forwarded verbatim to the host.
pub trait HostScheduler: HostApply {
    /// Evaluate `t`'s closure at most once, fill the cache, and return
    /// the cached value (borrowed). A failed evaluation fills the cache
    /// with an error result; either way the cache is set on return.
    ///
    /// # Safety
    ///
    /// `t` must be a thunk object.
    unsafe fn force_thunk(&self, t: Obj) -> Obj;

    /// Schedule `closure` (saturated, arity 0); returns an owned task.
    ///
    /// # Safety
    ///
    /// `closure` must be a saturated closure object; ownership
    /// transfers.
    unsafe fn task_spawn(&self, closure: Obj, prio: u32) -> Option<Obj>;

    /// Task applying `f` to `t`'s result; consumes both.
    ///
    /// # Safety
    ///
    /// `f` must be a closure awaiting one argument, `t` a task object.
    unsafe fn task_map(&self, f: Obj, t: Obj) -> Option<Obj>;

    /// Task chaining `t` into the task-returning `f`; consumes both.
    ///
    /// # Safety
    ///
    /// `t` must be a task object, `f` a closure awaiting one argument
    /// that returns a task.
    unsafe fn task_bind(&self, t: Obj, f: Obj) -> Option<Obj>;

    /// Block until `t` completes; borrowing read of its value.
    ///
    /// # Safety
    ///
    /// `t` must be a task object.
    unsafe fn task_wait(&self, t: Obj) -> Obj;
}

/// Eager, same-thread host: the simplest implementation satisfying the
/// contracts, enough to exercise every object shape.
#[derive(Default)]
pub struct InlineHost {
    // Serializes forcing so the fill is observably once-only even when
    // tests share a thunk across threads.
    force_lock: Mutex<()>,
}

impl HostApply for InlineHost {
    unsafe fn apply(&self, f: Obj, args: &[Obj]) -> Option<Obj> {
        unsafe {
            debug_assert!(f.is_closure());
            let fixed = closure_num_fixed(f) as usize;
            debug_assert_eq!(fixed + args.len(), closure_arity(f) as usize);

            let mut all = [Obj::NULL; 4];
            let arity = fixed + args.len();
            assert!(arity <= all.len(), "InlineHost supports arity <= 4");
            for (i, slot) in all.iter_mut().take(fixed).enumerate() {
                *slot = closure_get(f, i);
            }
            all[fixed..arity].copy_from_slice(args);

            let fun = closure_fun(f);
            type F0 = unsafe extern "C" fn() -> Obj;
            type F1 = unsafe extern "C" fn(Obj) -> Obj;
            type F2 = unsafe extern "C" fn(Obj, Obj) -> Obj;
            type F3 = unsafe extern "C" fn(Obj, Obj, Obj) -> Obj;
            type F4 = unsafe extern "C" fn(Obj, Obj, Obj, Obj) -> Obj;
            let r = match arity {
                0 => transmute::<*mut c_void, F0>(fun)(),
                1 => transmute::<*mut c_void, F1>(fun)(all[0]),
                2 => transmute::<*mut c_void, F2>(fun)(all[0], all[1]),
                3 => transmute::<*mut c_void, F3>(fun)(all[0], all[1], all[2]),
                4 => transmute::<*mut c_void, F4>(fun)(all[0], all[1], all[2], all[3]),
                _ => unreachable!(),
            };
            dec(f);
            Some(r)
        }
    }
}

impl InlineHost {
    /// Shared completion path: run the pending closure (borrowed from
    /// the container), then swap the filled value in via `fill`.
    unsafe fn complete(&self, closure: Obj, fill: impl FnOnce(Obj) -> Obj) {
        unsafe {
            inc(closure); // apply consumes one reference
            let v = match self.apply(closure, &[]) {
                Some(v) => v,
                None => match mk_error_string("closure application failed") {
                    Some(e) => e,
                    None => Obj::NULL,
                },
            };
            let consumed = fill(v);
            dec(consumed);
        }
    }
}

impl HostScheduler for InlineHost {
    unsafe fn force_thunk(&self, t: Obj) -> Obj {
        unsafe {
            let _guard = self.force_lock.lock();
            let v = thunk_value(t);
            if !v.is_null() {
                // Lost the race: someone filled it while we waited.
                return v;
            }
            debug!("forcing thunk {:?}", t);
            self.complete(thunk_closure(t), |v| thunk_fill(t, v));
            thunk_value(t)
        }
    }

    unsafe fn task_spawn(&self, closure: Obj, prio: u32) -> Option<Obj> {
        unsafe {
            let _ = prio; // one thread, one priority
            let t = mk_task(closure)?;
            task_set_handle(t, 1);
            self.complete(closure, |v| task_fill(t, v));
            Some(t)
        }
    }

    unsafe fn task_map(&self, f: Obj, t: Obj) -> Option<Obj> {
        unsafe {
            let v = self.task_wait(t);
            let out = mk_task(Obj::NULL)?;
            task_set_handle(out, 1);
            let r = match self.apply(f, &[v]) {
                Some(r) => r,
                None => match mk_error_string("closure application failed") {
                    Some(e) => e,
                    None => {
                        dec(out);
                        dec(t);
                        return None;
                    }
                },
            };
            dec(task_fill(out, r));
            dec(t);
            Some(out)
        }
    }

    unsafe fn task_bind(&self, t: Obj, f: Obj) -> Option<Obj> {
        unsafe {
            let v = self.task_wait(t);
            let r = self.apply(f, &[v])?;
            debug_assert!(r.is_task());
            dec(t);
            Some(r)
        }
    }

    unsafe fn task_wait(&self, t: Obj) -> Obj {
        unsafe {
            let v = task_value(t);
            debug_assert!(
                !v.is_null(),
                "InlineHost completes tasks at spawn; a null value is a foreign task"
            );
            v
        }
    }
}
