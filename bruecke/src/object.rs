//! Object header and tag-space partition.
//!
//! Every heap object starts with the same 8-byte header:
//!
//! ```text
//! bytes 0‥4: refcount (i32)  — >0 single-threaded, <0 multi-threaded
//!                              (magnitude = share count), 0 immortal
//! bytes 4‥6: cs_sz    (u16)  — allocation size in bytes, 0 = large
//! byte  6:   other    (u8)   — variant-specific (ctor field count,
//!                              scalar-array element width, ...)
//! byte  7:   tag      (u8)   — constructor tag or special kind
//! ```
//!
//! Tags `0..=MAX_CTOR_TAG` are algebraic constructors; everything above
//! selects exactly one special kind, so the kind predicates are mutually
//! exclusive by construction.

use std::sync::atomic::{AtomicI32, Ordering};

pub const MAX_CTOR_TAG: u8 = 244;
pub const TAG_ARRAY: u8 = 245;
pub const TAG_SARRAY: u8 = 246;
pub const TAG_CLOSURE: u8 = 247;
pub const TAG_STRING: u8 = 248;
pub const TAG_BIGINT: u8 = 249;
pub const TAG_THUNK: u8 = 250;
pub const TAG_TASK: u8 = 251;
pub const TAG_REF: u8 = 252;
pub const TAG_EXTERNAL: u8 = 253;

/// The 8-byte header at the start of every heap object.
///
/// The refcount is declared atomic so the multi-threaded representation
/// can use real atomic RMWs; the single-threaded fast path goes through
/// `Relaxed` load + store on purpose, which compiles to plain moves.
#[repr(C)]
pub struct Header {
    rc: AtomicI32,
    cs_sz: u16,
    other: u8,
    tag: u8,
}

const _: () = assert!(size_of::<Header>() == 8);

/// Prefix view shared by every object variant.
#[repr(C)]
pub struct Object {
    pub header: Header,
}

impl Header {
    /// Fresh headers start exclusive (rc = 1).
    pub fn new(tag: u8, cs_sz: u16, other: u8) -> Self {
        Self {
            rc: AtomicI32::new(1),
            cs_sz,
            other,
            tag,
        }
    }

    #[inline(always)]
    pub fn tag(&self) -> u8 {
        self.tag
    }

    #[inline(always)]
    pub fn other(&self) -> u8 {
        self.other
    }

    /// Allocation size in bytes; 0 means large, tracked by the allocator.
    #[inline(always)]
    pub fn cs_sz(&self) -> u16 {
        self.cs_sz
    }

    #[inline(always)]
    pub fn rc(&self) -> i32 {
        self.rc.load(Ordering::Relaxed)
    }

    /// Non-atomic refcount write; only legal while the object is not
    /// multi-threaded.
    #[inline(always)]
    pub(crate) fn store_rc(&self, rc: i32) {
        self.rc.store(rc, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn rc_atomic(&self) -> &AtomicI32 {
        &self.rc
    }

    /// In-place variant reclassification within the constructor range.
    pub(crate) fn set_tag(&mut self, tag: u8) {
        self.tag = tag;
    }
}

impl core::fmt::Debug for Header {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Header")
            .field("rc", &self.rc())
            .field("cs_sz", &self.cs_sz)
            .field("other", &self.other)
            .field("tag", &self.tag)
            .finish()
    }
}
