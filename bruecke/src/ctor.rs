//! Constructor layer: variable-shape algebraic values.
//!
//! ```text
//! [Header 8B] [obj_0 8B] ... [obj_{n-1} 8B] [scalar bytes ...]
//! ```
//!
//! The object-field count lives in the header's auxiliary byte; scalar
//! bytes follow the object fields. Accessors do not bounds-check: a bad
//! index is undefined behavior (debug builds assert).

use crate::alloc::alloc_object;
use crate::object::{Header, MAX_CTOR_TAG};
use crate::rc::dec;
use crate::tagged::Obj;

#[repr(C)]
pub struct CtorObject {
    pub header: Header,
    fields: [Obj; 0],
}

const _: () = assert!(size_of::<CtorObject>() == 8);

impl CtorObject {
    #[inline(always)]
    pub(crate) fn fields_ptr(&self) -> *mut Obj {
        self.fields.as_ptr() as *mut Obj
    }
}

#[inline(always)]
unsafe fn ctor_ptr(o: Obj) -> *mut CtorObject {
    debug_assert!(unsafe { o.is_ctor() } && !o.is_scalar());
    unsafe { o.as_ptr() as *mut CtorObject }
}

/// Allocate a constructor with `num_objs` object fields and
/// `scalar_bytes` bytes of unboxed storage.
///
/// Every object slot is pre-initialized to boxed zero — the cold path
/// unconditionally releases all `num_objs` slots, so a garbage slot
/// would corrupt memory on teardown. Scalar bytes start uninitialized.
///
/// `tag` must be in the constructor range; anything above
/// [`MAX_CTOR_TAG`] is a caller error and is not runtime-checked.
pub fn alloc_ctor(tag: u8, num_objs: usize, scalar_bytes: usize) -> Option<Obj> {
    debug_assert!(tag <= MAX_CTOR_TAG);
    debug_assert!(num_objs <= u8::MAX as usize);
    let size = size_of::<CtorObject>() + num_objs * size_of::<Obj>() + scalar_bytes;
    let o = alloc_object(size, tag, num_objs as u8)?;
    unsafe {
        let fields = (*ctor_ptr(o)).fields_ptr();
        for i in 0..num_objs {
            fields.add(i).write(Obj::from_scalar(0));
        }
    }
    Some(o)
}

/// # Safety
///
/// `o` must be a constructor object and `i < num_objs`.
#[inline(always)]
pub unsafe fn ctor_get(o: Obj, i: usize) -> Obj {
    unsafe {
        debug_assert!(i < o.header().other() as usize);
        (*ctor_ptr(o)).fields_ptr().add(i).read()
    }
}

/// Store `v`, transferring ownership of one reference to the container.
/// The previous occupant is not released; overwrite live fields through
/// [`ctor_release`] or an explicit [`dec`].
///
/// # Safety
///
/// `o` must be an exclusive constructor object and `i < num_objs`.
#[inline(always)]
pub unsafe fn ctor_set(o: Obj, i: usize, v: Obj) {
    unsafe {
        debug_assert!(i < o.header().other() as usize);
        (*ctor_ptr(o)).fields_ptr().add(i).write(v);
    }
}

/// In-place variant reclassification.
///
/// # Safety
///
/// `o` must be an exclusive constructor object; `tag` must stay in the
/// constructor range and describe the same field shape.
#[inline(always)]
pub unsafe fn ctor_set_tag(o: Obj, tag: u8) {
    debug_assert!(tag <= MAX_CTOR_TAG);
    unsafe { (*(o.as_ptr() as *mut CtorObject)).header.set_tag(tag) };
}

/// Release the first `n` object fields without freeing the container,
/// so the storage can be reused without a cascading free. The released
/// slots are reset to boxed zero.
///
/// # Safety
///
/// `o` must be an exclusive constructor object and `n <= num_objs`.
pub unsafe fn ctor_release(o: Obj, n: usize) {
    unsafe {
        debug_assert!(n <= o.header().other() as usize);
        let fields = (*ctor_ptr(o)).fields_ptr();
        for i in 0..n {
            dec(fields.add(i).read());
            fields.add(i).write(Obj::from_scalar(0));
        }
    }
}

// ── scalar-region accessors ────────────────────────────────────────
//
// Offsets are in bytes from the start of the field area (directly after
// the header); callers address scalars at `num_objs * 8 + k`.

macro_rules! scalar_accessors {
    ($get:ident, $set:ident, $ty:ty) => {
        /// # Safety
        ///
        /// `o` must be a constructor object and `offset` must address a
        #[doc = concat!("properly aligned `", stringify!($ty), "` inside its scalar region.")]
        #[inline(always)]
        pub unsafe fn $get(o: Obj, offset: usize) -> $ty {
            unsafe {
                let base = o.as_ptr() as *mut u8;
                base.add(size_of::<Header>() + offset).cast::<$ty>().read()
            }
        }

        /// # Safety
        ///
        /// Same contract as the getter, and `o` must be exclusive.
        #[inline(always)]
        pub unsafe fn $set(o: Obj, offset: usize, v: $ty) {
            unsafe {
                let base = o.as_ptr() as *mut u8;
                base.add(size_of::<Header>() + offset).cast::<$ty>().write(v)
            }
        }
    };
}

scalar_accessors!(ctor_get_u8, ctor_set_u8, u8);
scalar_accessors!(ctor_get_u16, ctor_set_u16, u16);
scalar_accessors!(ctor_get_u32, ctor_set_u32, u32);
scalar_accessors!(ctor_get_u64, ctor_set_u64, u64);
scalar_accessors!(ctor_get_usize, ctor_set_usize, usize);
scalar_accessors!(ctor_get_f64, ctor_set_f64, f64);

// ── boxed wide scalars ─────────────────────────────────────────────
//
// 64-bit integers and floats cannot be tagged; they travel as zero-field
// constructors carrying the value in the scalar region.

pub fn box_u64(v: u64) -> Option<Obj> {
    let o = alloc_ctor(0, 0, size_of::<u64>())?;
    unsafe { ctor_set_u64(o, 0, v) };
    Some(o)
}

/// # Safety
///
/// `o` must come from [`box_u64`].
pub unsafe fn unbox_u64(o: Obj) -> u64 {
    unsafe { ctor_get_u64(o, 0) }
}

pub fn box_f64(v: f64) -> Option<Obj> {
    let o = alloc_ctor(0, 0, size_of::<f64>())?;
    unsafe { ctor_set_f64(o, 0, v) };
    Some(o)
}

/// # Safety
///
/// `o` must come from [`box_f64`].
pub unsafe fn unbox_f64(o: Obj) -> f64 {
    unsafe { ctor_get_f64(o, 0) }
}
