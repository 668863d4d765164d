//! Partial-application objects: a function pointer plus the arguments
//! bound so far. This layer only prepares invocation data; applying a
//! saturated closure is the host runtime's job (see
//! [`HostApply`](crate::host::HostApply)).
//!
//! ```text
//! [Header 8B] [fun 8B] [arity u16][num_fixed u16][pad 4B] [arg_0 8B] ...
//! ```
//!
//! By convention `fun` points to an `unsafe extern "C"` function taking
//! `arity` `Obj` arguments (fixed ones first) and returning an `Obj`.

use std::ffi::c_void;

use crate::alloc::{alloc_object, free_object};
use crate::object::{Header, TAG_CLOSURE};
use crate::rc::{dec, inc, is_exclusive};
use crate::tagged::Obj;

#[repr(C)]
pub struct ClosureObject {
    pub header: Header,
    pub(crate) fun: *mut c_void,
    pub(crate) arity: u16,
    pub(crate) num_fixed: u16,
    fields: [Obj; 0],
}

const _: () = assert!(size_of::<ClosureObject>() == 24);

impl ClosureObject {
    #[inline(always)]
    pub(crate) fn fields_ptr(&self) -> *mut Obj {
        self.fields.as_ptr() as *mut Obj
    }
}

#[inline(always)]
unsafe fn closure_ptr(o: Obj) -> *mut ClosureObject {
    debug_assert!(unsafe { o.is_closure() });
    unsafe { o.as_ptr() as *mut ClosureObject }
}

/// Allocate a closure with room for `num_fixed` bound arguments; the
/// argument slots start **uninitialized** and must all be populated
/// (via [`closure_set`]) before the closure is released.
pub fn alloc_closure(fun: *mut c_void, arity: u16, num_fixed: u16) -> Option<Obj> {
    debug_assert!(num_fixed <= arity);
    let size = size_of::<ClosureObject>() + num_fixed as usize * size_of::<Obj>();
    let o = alloc_object(size, TAG_CLOSURE, 0)?;
    unsafe {
        let c = o.as_ptr() as *mut ClosureObject;
        (*c).fun = fun;
        (*c).arity = arity;
        (*c).num_fixed = num_fixed;
    }
    Some(o)
}

/// # Safety
///
/// `o` must be a closure object.
#[inline(always)]
pub unsafe fn closure_fun(o: Obj) -> *mut c_void {
    unsafe { (*closure_ptr(o)).fun }
}

/// # Safety
///
/// `o` must be a closure object.
#[inline(always)]
pub unsafe fn closure_arity(o: Obj) -> u16 {
    unsafe { (*closure_ptr(o)).arity }
}

/// # Safety
///
/// `o` must be a closure object.
#[inline(always)]
pub unsafe fn closure_num_fixed(o: Obj) -> u16 {
    unsafe { (*closure_ptr(o)).num_fixed }
}

/// Ready to invoke: every argument bound.
///
/// # Safety
///
/// `o` must be a closure object.
#[inline(always)]
pub unsafe fn closure_saturated(o: Obj) -> bool {
    unsafe { (*closure_ptr(o)).num_fixed == (*closure_ptr(o)).arity }
}

/// # Safety
///
/// `o` must be a closure object and `i < num_fixed`.
#[inline(always)]
pub unsafe fn closure_get(o: Obj, i: usize) -> Obj {
    unsafe {
        debug_assert!(i < closure_num_fixed(o) as usize);
        (*closure_ptr(o)).fields_ptr().add(i).read()
    }
}

/// Bind slot `i`, transferring ownership of `v`.
///
/// # Safety
///
/// `o` must be an exclusive closure object and `i < num_fixed`.
#[inline(always)]
pub unsafe fn closure_set(o: Obj, i: usize, v: Obj) {
    unsafe {
        debug_assert!(i < closure_num_fixed(o) as usize);
        (*closure_ptr(o)).fields_ptr().add(i).write(v);
    }
}

/// Bind one more argument, producing a closure with `num_fixed + 1`
/// fixed slots. Consumes one reference to `o` and takes ownership of
/// `arg`; when `o` was exclusive its arguments are moved without
/// refcount traffic, otherwise they are shared into the copy.
///
/// # Safety
///
/// `o` must be an unsaturated closure object with all fixed slots
/// populated.
pub unsafe fn closure_bind(o: Obj, arg: Obj) -> Option<Obj> {
    unsafe {
        debug_assert!(!closure_saturated(o));
        let n = closure_num_fixed(o) as usize;
        let fresh = alloc_closure(closure_fun(o), closure_arity(o), n as u16 + 1)?;
        let src = (*closure_ptr(o)).fields_ptr();
        let dst = (*closure_ptr(fresh)).fields_ptr();
        if is_exclusive(o) {
            std::ptr::copy_nonoverlapping(src, dst, n);
            // Arguments moved out; drop the shell without releasing them.
            free_object(o.as_ptr());
        } else {
            for i in 0..n {
                let a = src.add(i).read();
                inc(a);
                dst.add(i).write(a);
            }
            dec(o);
        }
        dst.add(n).write(arg);
        Some(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn add2(a: Obj, b: Obj) -> Obj {
        unsafe { Obj::from_scalar(a.to_scalar() + b.to_scalar()) }
    }

    fn add2_ptr() -> *mut c_void {
        add2 as usize as *mut c_void
    }

    #[test]
    fn fresh_closure_records_shape() {
        let c = alloc_closure(add2_ptr(), 2, 0).unwrap();
        unsafe {
            assert!(c.is_closure());
            assert_eq!(closure_arity(c), 2);
            assert_eq!(closure_num_fixed(c), 0);
            assert!(!closure_saturated(c));
            assert_eq!(closure_fun(c), add2_ptr());
            dec(c);
        }
    }

    #[test]
    fn bind_accumulates_until_saturated() {
        let c = alloc_closure(add2_ptr(), 2, 0).unwrap();
        unsafe {
            let c = closure_bind(c, Obj::from_scalar(10)).unwrap();
            assert_eq!(closure_num_fixed(c), 1);
            let c = closure_bind(c, Obj::from_scalar(20)).unwrap();
            assert!(closure_saturated(c));
            assert_eq!(closure_get(c, 0).to_scalar(), 10);
            assert_eq!(closure_get(c, 1).to_scalar(), 20);
            dec(c);
        }
    }

    #[test]
    fn shared_bind_shares_bound_args() {
        let child = crate::ctor::alloc_ctor(0, 0, 0).unwrap();
        let c = alloc_closure(add2_ptr(), 2, 1).unwrap();
        unsafe {
            inc(child);
            closure_set(c, 0, child);
            inc(c);
            let d = closure_bind(c, Obj::from_scalar(1)).unwrap();
            assert_eq!(child.header().rc(), 3); // ours + c's + d's
            dec(c);
            dec(d);
            assert_eq!(child.header().rc(), 1);
            dec(child);
        }
    }
}
