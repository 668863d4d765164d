//! Growable arrays of owned object references.
//!
//! ```text
//! [Header 8B] [size 8B] [capacity 8B] [slot_0 8B] [slot_1 8B] ...
//! ```
//!
//! Teardown releases exactly the first `size` slots, so `size <=
//! capacity` and every slot below `size` must hold a valid reference or
//! scalar. Index accessors assert in debug builds only; out of range is
//! undefined behavior either way.

use crate::alloc::alloc_object;
use crate::object::{Header, TAG_ARRAY};
use crate::rc::{dec, inc, is_exclusive};
use crate::tagged::Obj;

#[repr(C)]
pub struct ArrayObject {
    pub header: Header,
    pub(crate) size: usize,
    pub(crate) capacity: usize,
    fields: [Obj; 0],
}

const _: () = assert!(size_of::<ArrayObject>() == 24);

impl ArrayObject {
    #[inline(always)]
    pub(crate) fn fields_ptr(&self) -> *mut Obj {
        self.fields.as_ptr() as *mut Obj
    }
}

#[inline(always)]
unsafe fn array_ptr(o: Obj) -> *mut ArrayObject {
    debug_assert!(unsafe { o.is_array() });
    unsafe { o.as_ptr() as *mut ArrayObject }
}

fn alloc_raw(capacity: usize, size: usize) -> Option<Obj> {
    let bytes = size_of::<ArrayObject>() + capacity * size_of::<Obj>();
    let o = alloc_object(bytes, TAG_ARRAY, 0)?;
    unsafe {
        let a = o.as_ptr() as *mut ArrayObject;
        (*a).size = size;
        (*a).capacity = capacity;
    }
    Some(o)
}

/// Allocate an empty array with room for `capacity` elements.
pub fn alloc_array(capacity: usize) -> Option<Obj> {
    alloc_raw(capacity, 0)
}

/// Allocate a pre-sized array whose first `size` slots are
/// **uninitialized**.
///
/// Every slot in `[0, size)` must be populated before the array is
/// released; releasing earlier is undefined behavior because teardown
/// unconditionally decrements all `size` slots.
pub fn alloc_array_with_size(capacity: usize, size: usize) -> Option<Obj> {
    debug_assert!(size <= capacity);
    alloc_raw(capacity, size)
}

/// # Safety
///
/// `o` must be an array object.
#[inline(always)]
pub unsafe fn array_size(o: Obj) -> usize {
    unsafe { (*array_ptr(o)).size }
}

/// # Safety
///
/// `o` must be an array object.
#[inline(always)]
pub unsafe fn array_capacity(o: Obj) -> usize {
    unsafe { (*array_ptr(o)).capacity }
}

/// Borrowing read: no refcount traffic. Callers keeping the element past
/// the array's lifetime must [`inc`] it themselves.
///
/// # Safety
///
/// `o` must be an array object and `i < size`.
#[inline(always)]
pub unsafe fn array_get(o: Obj, i: usize) -> Obj {
    unsafe {
        debug_assert!(i < array_size(o));
        (*array_ptr(o)).fields_ptr().add(i).read()
    }
}

/// Owning read: the element is returned with one extra reference.
///
/// # Safety
///
/// `o` must be an array object and `i < size`.
#[inline(always)]
pub unsafe fn array_get_own(o: Obj, i: usize) -> Obj {
    unsafe {
        let v = array_get(o, i);
        inc(v);
        v
    }
}

/// Raw slot write, transferring ownership of `v` to the array. The
/// previous occupant is not released.
///
/// # Safety
///
/// `o` must be an exclusive array object and `i < size`.
#[inline(always)]
pub unsafe fn array_set(o: Obj, i: usize, v: Obj) {
    unsafe {
        debug_assert!(i < array_size(o));
        (*array_ptr(o)).fields_ptr().add(i).write(v);
    }
}

/// Same as [`array_get`] without the debug assertion; purely a statement
/// of caller intent.
///
/// # Safety
///
/// `o` must be an array object and `i < size`.
#[inline(always)]
pub unsafe fn array_get_unchecked(o: Obj, i: usize) -> Obj {
    unsafe { (*array_ptr(o)).fields_ptr().add(i).read() }
}

/// Same as [`array_set`] without the debug assertion.
///
/// # Safety
///
/// `o` must be an exclusive array object and `i < size`.
#[inline(always)]
pub unsafe fn array_set_unchecked(o: Obj, i: usize, v: Obj) {
    unsafe { (*array_ptr(o)).fields_ptr().add(i).write(v) };
}

/// Exchange two slots without touching refcounts. Self-inverse; no-op
/// for `i == j`.
///
/// # Safety
///
/// `o` must be an exclusive array object, `i < size`, `j < size`.
pub unsafe fn array_swap(o: Obj, i: usize, j: usize) {
    if i == j {
        return;
    }
    unsafe {
        debug_assert!(i < array_size(o) && j < array_size(o));
        let fields = (*array_ptr(o)).fields_ptr();
        let tmp = fields.add(i).read();
        fields.add(i).write(fields.add(j).read());
        fields.add(j).write(tmp);
    }
}

/// Raw size mutation: no slot initialization, no releasing. Growing the
/// size over slots never written is undefined behavior on release.
///
/// # Safety
///
/// `o` must be an exclusive array object and `n <= capacity`.
pub unsafe fn array_set_size(o: Obj, n: usize) {
    unsafe {
        debug_assert!(n <= array_capacity(o));
        (*array_ptr(o)).size = n;
    }
}

/// Append honouring the copy-on-write discipline: in place when the
/// array is exclusive with spare capacity, otherwise into a fresh array
/// (consuming one reference to the original). Returns the array holding
/// the result, or `None` on allocation failure with `a` and `v` intact.
///
/// # Safety
///
/// `a` must be an array object; the caller transfers one reference to
/// each of `a` and `v` on success.
pub unsafe fn array_push(a: Obj, v: Obj) -> Option<Obj> {
    unsafe {
        let size = array_size(a);
        if is_exclusive(a) && size < array_capacity(a) {
            (*array_ptr(a)).fields_ptr().add(size).write(v);
            (*array_ptr(a)).size = size + 1;
            return Some(a);
        }
        let capacity = array_capacity(a).max(1) * 2;
        let fresh = alloc_array_with_size(capacity, size + 1)?;
        let src = (*array_ptr(a)).fields_ptr();
        let dst = (*array_ptr(fresh)).fields_ptr();
        if is_exclusive(a) {
            // Exclusive but full: move the slots, then drop the shell
            // without releasing children.
            std::ptr::copy_nonoverlapping(src, dst, size);
            (*array_ptr(a)).size = 0;
            dec(a);
        } else {
            for i in 0..size {
                let e = src.add(i).read();
                inc(e);
                dst.add(i).write(e);
            }
            dec(a);
        }
        dst.add(size).write(v);
        Some(fresh)
    }
}
