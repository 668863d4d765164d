//! Single-slot mutable reference cells.
//!
//! ```text
//! [Header 8B] [value: nullable Obj, 8B]
//! ```
//!
//! `ref_set` always releases the previous occupant before storing, so
//! overwriting can never leak.

use crate::alloc::alloc_object;
use crate::object::{Header, TAG_REF};
use crate::rc::{dec, inc};
use crate::tagged::Obj;

#[repr(C)]
pub struct RefObject {
    pub header: Header,
    pub(crate) value: Obj,
}

const _: () = assert!(size_of::<RefObject>() == 16);

#[inline(always)]
unsafe fn ref_ptr(o: Obj) -> *mut RefObject {
    debug_assert!(unsafe { o.is_ref() });
    unsafe { o.as_ptr() as *mut RefObject }
}

/// Allocate a cell holding `v` (may be [`Obj::NULL`] for an empty
/// cell); takes ownership of `v`.
pub fn mk_ref(v: Obj) -> Option<Obj> {
    let o = alloc_object(size_of::<RefObject>(), TAG_REF, 0)?;
    unsafe { (*(o.as_ptr() as *mut RefObject)).value = v };
    Some(o)
}

/// Borrowing read; null when the cell is empty.
///
/// # Safety
///
/// `o` must be a ref object.
#[inline(always)]
pub unsafe fn ref_get(o: Obj) -> Obj {
    unsafe { (*ref_ptr(o)).value }
}

/// Owning read: the occupant is returned with one extra reference.
///
/// # Safety
///
/// `o` must be a non-empty ref object.
#[inline(always)]
pub unsafe fn ref_get_own(o: Obj) -> Obj {
    unsafe {
        let v = ref_get(o);
        inc(v);
        v
    }
}

/// Store `v`, releasing the previous occupant first. Takes ownership of
/// `v`.
///
/// # Safety
///
/// `o` must be an exclusive ref object.
pub unsafe fn ref_set(o: Obj, v: Obj) {
    unsafe {
        let r = ref_ptr(o);
        dec((*r).value);
        (*r).value = v;
    }
}

/// Move the occupant out, leaving the cell empty. No refcount traffic;
/// the caller inherits the cell's reference.
///
/// # Safety
///
/// `o` must be an exclusive ref object.
pub unsafe fn ref_take(o: Obj) -> Obj {
    unsafe {
        let r = ref_ptr(o);
        let v = (*r).value;
        (*r).value = Obj::NULL;
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_releases_previous_occupant() {
        let first = crate::ctor::alloc_ctor(0, 0, 0).unwrap();
        let r = mk_ref(Obj::NULL).unwrap();
        unsafe {
            inc(first);
            ref_set(r, first);
            assert_eq!(ref_get(r), first);
            assert_eq!(first.header().rc(), 2);
            ref_set(r, Obj::from_scalar(5));
            assert_eq!(first.header().rc(), 1);
            assert_eq!(ref_get(r).to_scalar(), 5);
            dec(r);
            dec(first);
        }
    }

    #[test]
    fn owning_read_adds_a_reference() {
        let v = crate::ctor::alloc_ctor(0, 0, 0).unwrap();
        let r = mk_ref(v).unwrap();
        unsafe {
            let own = ref_get_own(r);
            assert_eq!(own, v);
            assert_eq!(v.header().rc(), 2);
            dec(r);
            assert_eq!(v.header().rc(), 1);
            dec(own);
        }
    }

    #[test]
    fn take_moves_without_rc_traffic() {
        let v = crate::ctor::alloc_ctor(0, 0, 0).unwrap();
        let r = mk_ref(v).unwrap();
        unsafe {
            let out = ref_take(r);
            assert_eq!(out, v);
            assert_eq!(v.header().rc(), 1);
            assert!(ref_get(r).is_null());
            dec(r);
            dec(out);
        }
    }

    #[test]
    fn teardown_releases_occupant() {
        let v = crate::ctor::alloc_ctor(0, 0, 0).unwrap();
        unsafe {
            inc(v);
            let r = mk_ref(v).unwrap();
            dec(r);
            assert_eq!(v.header().rc(), 1);
            dec(v);
        }
    }
}
