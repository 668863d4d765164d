//! Obj: the pointer-sized handle every operation in this crate works on.
//!
//! An `Obj` is either a tagged scalar (low bit 1, payload in the upper 63
//! bits), a pointer to a heap object (low bit 0, 8-byte aligned), or the
//! null sentinel used for empty nullable slots (thunk caches, ref cells).
//! Scalars carry no refcount and are never freed; null is never a valid
//! object.

use crate::object::{Header, Object, MAX_CTOR_TAG};

pub const SCALAR_TAG: usize = 0b1;

/// Tagged handle to a managed value.
///
/// `Obj` is `Copy` on purpose: it is a raw handle, not an owning smart
/// pointer. Ownership is tracked manually through [`inc`](crate::rc::inc)
/// and [`dec`](crate::rc::dec), exactly one `dec` per owned reference.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Obj(*mut Object);

// Handles cross threads; the refcount protocol (not the type system)
// guards shared access.
unsafe impl Send for Obj {}
unsafe impl Sync for Obj {}

#[cold]
#[inline(never)]
fn scalar_overflow(n: usize) -> ! {
    panic!("scalar out of range for tagged encoding: {n}")
}

impl Obj {
    /// Empty nullable slot. Distinct from every scalar (low bit 0) and
    /// never a valid heap object.
    pub const NULL: Obj = Obj(core::ptr::null_mut());

    #[inline(always)]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    #[inline(always)]
    pub fn is_scalar(self) -> bool {
        self.0 as usize & SCALAR_TAG == SCALAR_TAG
    }

    /// Encode a small integer as a tagged scalar.
    ///
    /// The payload must fit in one bit less than the machine word;
    /// anything wider is a caller bug and aborts the process — wide
    /// values go through [`box_u64`](crate::ctor::box_u64) instead.
    #[inline(always)]
    pub fn from_scalar(n: usize) -> Self {
        if n >> (usize::BITS - 1) != 0 {
            scalar_overflow(n);
        }
        Self(((n << 1) | SCALAR_TAG) as *mut Object)
    }

    /// Decode a tagged scalar.
    ///
    /// # Safety
    ///
    /// `self` must be a scalar.
    #[inline(always)]
    pub unsafe fn to_scalar(self) -> usize {
        debug_assert!(self.is_scalar());
        self.0 as usize >> 1
    }

    #[inline(always)]
    pub fn from_ptr(ptr: *mut Object) -> Self {
        debug_assert_eq!(
            ptr as usize & 0b111,
            0,
            "heap pointer must be 8-byte aligned so the scalar bit is free"
        );
        Self(ptr)
    }

    /// Reinterpret stored bits (scalar, pointer or null) as a handle;
    /// used by the nullable atomic slots that park any encoding in a
    /// pointer word.
    #[inline(always)]
    pub(crate) fn from_raw_ptr(ptr: *mut Object) -> Self {
        Self(ptr)
    }

    /// # Safety
    ///
    /// `self` must be a heap reference (not scalar, not null).
    #[inline(always)]
    pub unsafe fn as_ptr(self) -> *mut Object {
        debug_assert!(!self.is_scalar() && !self.is_null());
        self.0
    }

    #[inline(always)]
    pub fn raw(self) -> usize {
        self.0 as usize
    }

    /// # Safety
    ///
    /// `self` must reference a live heap object.
    #[inline(always)]
    pub unsafe fn header(self) -> &'static Header {
        unsafe { &(*self.as_ptr()).header }
    }

    /// # Safety
    ///
    /// `self` must reference a live heap object.
    #[inline(always)]
    pub unsafe fn tag(self) -> u8 {
        unsafe { self.header().tag() }
    }

    /// True for scalars (all-fields-unboxed constructors) and for heap
    /// objects whose tag is in the constructor range.
    ///
    /// # Safety
    ///
    /// Non-scalar `self` must reference a live heap object.
    #[inline(always)]
    pub unsafe fn is_ctor(self) -> bool {
        self.is_scalar() || unsafe { self.tag() } <= MAX_CTOR_TAG
    }
}

macro_rules! tag_predicate {
    ($(#[$meta:meta])* $name:ident, $tag:path) => {
        $(#[$meta])*
        /// # Safety
        ///
        /// `self` must reference a live heap object.
        #[inline(always)]
        pub unsafe fn $name(self) -> bool {
            !self.is_scalar() && unsafe { self.tag() } == $tag
        }
    };
}

impl Obj {
    tag_predicate!(is_array, crate::object::TAG_ARRAY);
    tag_predicate!(is_sarray, crate::object::TAG_SARRAY);
    tag_predicate!(is_closure, crate::object::TAG_CLOSURE);
    tag_predicate!(is_string, crate::object::TAG_STRING);
    tag_predicate!(is_bigint, crate::object::TAG_BIGINT);
    tag_predicate!(is_thunk, crate::object::TAG_THUNK);
    tag_predicate!(is_task, crate::object::TAG_TASK);
    tag_predicate!(is_ref, crate::object::TAG_REF);
    tag_predicate!(is_external, crate::object::TAG_EXTERNAL);
}

impl core::fmt::Debug for Obj {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_null() {
            write!(f, "Null")
        } else if self.is_scalar() {
            write!(f, "Scalar({})", unsafe { self.to_scalar() })
        } else {
            write!(f, "Obj(0x{:x})", self.0 as usize)
        }
    }
}
