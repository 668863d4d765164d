//! Growable homogeneous scalar arrays: raw element bytes, no per-element
//! ownership, same size/capacity discipline as object arrays.
//!
//! ```text
//! [Header 8B] [size 8B] [capacity 8B] [element bytes ...]
//! ```
//!
//! The element width lives in the header's auxiliary byte; `size` and
//! `capacity` count elements, not bytes.

use crate::alloc::alloc_object;
use crate::object::{Header, TAG_SARRAY};
use crate::rc::{dec, is_exclusive};
use crate::tagged::Obj;

#[repr(C)]
pub struct SArrayObject {
    pub header: Header,
    pub(crate) size: usize,
    pub(crate) capacity: usize,
    data: [u8; 0],
}

const _: () = assert!(size_of::<SArrayObject>() == 24);

impl SArrayObject {
    #[inline(always)]
    pub(crate) fn data_ptr(&self) -> *mut u8 {
        self.data.as_ptr() as *mut u8
    }
}

#[inline(always)]
unsafe fn sarray_ptr(o: Obj) -> *mut SArrayObject {
    debug_assert!(unsafe { o.is_sarray() });
    unsafe { o.as_ptr() as *mut SArrayObject }
}

fn alloc_raw(elem_size: u8, capacity: usize, size: usize) -> Option<Obj> {
    debug_assert!(elem_size.is_power_of_two() && elem_size as usize <= 8);
    let bytes = size_of::<SArrayObject>() + capacity * elem_size as usize;
    let o = alloc_object(bytes, TAG_SARRAY, elem_size)?;
    unsafe {
        let a = o.as_ptr() as *mut SArrayObject;
        (*a).size = size;
        (*a).capacity = capacity;
    }
    Some(o)
}

/// Allocate an empty scalar array holding `capacity` elements of
/// `elem_size` bytes each.
pub fn alloc_sarray(elem_size: u8, capacity: usize) -> Option<Obj> {
    alloc_raw(elem_size, capacity, 0)
}

/// Pre-sized variant; element bytes start uninitialized, which is
/// harmless here (no per-element ownership) but still garbage to read.
pub fn alloc_sarray_with_size(elem_size: u8, capacity: usize, size: usize) -> Option<Obj> {
    debug_assert!(size <= capacity);
    alloc_raw(elem_size, capacity, size)
}

/// # Safety
///
/// `o` must be a scalar-array object.
#[inline(always)]
pub unsafe fn sarray_size(o: Obj) -> usize {
    unsafe { (*sarray_ptr(o)).size }
}

/// # Safety
///
/// `o` must be a scalar-array object.
#[inline(always)]
pub unsafe fn sarray_capacity(o: Obj) -> usize {
    unsafe { (*sarray_ptr(o)).capacity }
}

/// Element width in bytes.
///
/// # Safety
///
/// `o` must be a scalar-array object.
#[inline(always)]
pub unsafe fn sarray_elem_size(o: Obj) -> usize {
    unsafe { o.header().other() as usize }
}

/// # Safety
///
/// `o` must be a scalar-array object with elements of type `T`
/// (`size_of::<T>() == elem_size`) and `i < size`.
#[inline(always)]
pub unsafe fn sarray_get<T: Copy>(o: Obj, i: usize) -> T {
    unsafe {
        debug_assert_eq!(size_of::<T>(), sarray_elem_size(o));
        debug_assert!(i < sarray_size(o));
        (*sarray_ptr(o)).data_ptr().cast::<T>().add(i).read()
    }
}

/// # Safety
///
/// Same contract as [`sarray_get`], and `o` must be exclusive.
#[inline(always)]
pub unsafe fn sarray_set<T: Copy>(o: Obj, i: usize, v: T) {
    unsafe {
        debug_assert_eq!(size_of::<T>(), sarray_elem_size(o));
        debug_assert!(i < sarray_size(o));
        (*sarray_ptr(o)).data_ptr().cast::<T>().add(i).write(v);
    }
}

/// Raw size mutation, mirroring
/// [`array_set_size`](crate::arrays::array_set_size).
///
/// # Safety
///
/// `o` must be an exclusive scalar-array object and `n <= capacity`.
pub unsafe fn sarray_set_size(o: Obj, n: usize) {
    unsafe {
        debug_assert!(n <= sarray_capacity(o));
        (*sarray_ptr(o)).size = n;
    }
}

/// Byte view over the first `size` elements.
///
/// # Safety
///
/// `o` must be a scalar-array object whose `[0, size)` elements were
/// written, and the view must not outlive `o`.
pub unsafe fn sarray_bytes<'a>(o: Obj) -> &'a [u8] {
    unsafe {
        let a = sarray_ptr(o);
        std::slice::from_raw_parts((*a).data_ptr(), (*a).size * sarray_elem_size(o))
    }
}

/// Append with the copy-on-write discipline of
/// [`array_push`](crate::arrays::array_push); scalar elements copy
/// without refcount traffic.
///
/// # Safety
///
/// `o` must be a scalar-array object of `T` elements; on success one
/// reference to `a` is consumed.
pub unsafe fn sarray_push<T: Copy>(a: Obj, v: T) -> Option<Obj> {
    unsafe {
        debug_assert_eq!(size_of::<T>(), sarray_elem_size(a));
        let size = sarray_size(a);
        if is_exclusive(a) && size < sarray_capacity(a) {
            (*sarray_ptr(a)).data_ptr().cast::<T>().add(size).write(v);
            (*sarray_ptr(a)).size = size + 1;
            return Some(a);
        }
        let elem = sarray_elem_size(a) as u8;
        let fresh = alloc_sarray_with_size(elem, sarray_capacity(a).max(1) * 2, size + 1)?;
        std::ptr::copy_nonoverlapping(
            (*sarray_ptr(a)).data_ptr(),
            (*sarray_ptr(fresh)).data_ptr(),
            size * elem as usize,
        );
        (*sarray_ptr(fresh)).data_ptr().cast::<T>().add(size).write(v);
        dec(a);
        Some(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_capacity_discipline() {
        let a = alloc_sarray(4, 8).unwrap();
        unsafe {
            assert_eq!(sarray_size(a), 0);
            assert_eq!(sarray_capacity(a), 8);
            assert_eq!(sarray_elem_size(a), 4);
            dec(a);
        }
    }

    #[test]
    fn typed_get_set_round_trips() {
        let a = alloc_sarray_with_size(8, 4, 3).unwrap();
        unsafe {
            for i in 0..3 {
                sarray_set::<u64>(a, i, (i as u64 + 1) * 100);
            }
            assert_eq!(sarray_get::<u64>(a, 1), 200);
            assert_eq!(sarray_bytes(a).len(), 24);
            dec(a);
        }
    }

    #[test]
    fn push_grows_past_capacity() {
        let mut a = alloc_sarray(1, 1).unwrap();
        unsafe {
            for b in 0u8..5 {
                a = sarray_push(a, b).unwrap();
            }
            assert_eq!(sarray_size(a), 5);
            assert!(sarray_capacity(a) >= 5);
            assert_eq!(sarray_bytes(a), &[0, 1, 2, 3, 4]);
            dec(a);
        }
    }

    #[test]
    fn shared_push_leaves_original_untouched() {
        let a = alloc_sarray(1, 4).unwrap();
        unsafe {
            let a = sarray_push(a, 1u8).unwrap();
            crate::rc::inc(a);
            let b = sarray_push(a, 2u8).unwrap();
            assert_ne!(a, b);
            assert_eq!(sarray_size(a), 1);
            assert_eq!(sarray_bytes(b), &[1, 2]);
            dec(a);
            dec(b);
        }
    }
}
