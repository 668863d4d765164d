//! Allocation boundary.
//!
//! The host runtime owns the real allocator; this module is the stand-in
//! that honours the same contract: `allocate(size)` may fail (surfaced as
//! `None`, propagated by the callers without dereferencing), headers are
//! always written explicitly, and reclamation goes through one free hook
//! driven by the header's size class.
//!
//! Small objects record their rounded byte size in the header's `cs_sz`
//! field so freeing needs no lookup. Objects too big for a `u16` store
//! `cs_sz = 0` and park their layout in a side table.

use std::alloc::Layout;
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::LazyLock;

use log::trace;
use parking_lot::Mutex;

use crate::object::{Header, Object};
use crate::tagged::Obj;

/// Largest byte size representable in the header size class; multiples of
/// 8 only, so round down.
const SMALL_MAX: usize = (u16::MAX as usize) & !7;

const OBJ_ALIGN: usize = 8;

static LARGE: LazyLock<Mutex<HashMap<usize, Layout>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

#[inline(always)]
const fn round_size(size: usize) -> usize {
    (size + (OBJ_ALIGN - 1)) & !(OBJ_ALIGN - 1)
}

/// Allocate storage for a heap object of `size` bytes and write its
/// header (rc = 1). Returns `None` when the underlying allocator fails.
pub fn alloc_object(size: usize, tag: u8, other: u8) -> Option<Obj> {
    debug_assert!(size >= size_of::<Header>());
    let size = round_size(size);
    let layout = Layout::from_size_align(size, OBJ_ALIGN).ok()?;
    // SAFETY: layout has non-zero size (at least one header).
    let raw = NonNull::new(unsafe { std::alloc::alloc(layout) })?;

    let cs_sz = if size <= SMALL_MAX {
        size as u16
    } else {
        trace!("large alloc: {size} bytes at {raw:p}");
        LARGE.lock().insert(raw.as_ptr() as usize, layout);
        0
    };

    let obj = raw.cast::<Object>();
    // SAFETY: freshly allocated, properly aligned, big enough for a header.
    // Header is the first field of every repr(C) variant.
    unsafe {
        obj.as_ptr()
            .cast::<Header>()
            .write(Header::new(tag, cs_sz, other));
    }
    Some(Obj::from_ptr(obj.as_ptr()))
}

/// Return an object's storage to the allocator. Fields must already be
/// released; this frees bytes only.
///
/// # Safety
///
/// `o` must point to a live object allocated by [`alloc_object`], and no
/// reference to it may be used afterwards.
pub(crate) unsafe fn free_object(o: *mut Object) {
    let cs_sz = unsafe { (*o).header.cs_sz() };
    let layout = if cs_sz != 0 {
        // SAFETY: cs_sz was produced from a valid rounded layout.
        unsafe { Layout::from_size_align_unchecked(cs_sz as usize, OBJ_ALIGN) }
    } else {
        let Some(layout) = LARGE.lock().remove(&(o as usize)) else {
            debug_assert!(false, "large object {o:p} missing from side table");
            return;
        };
        trace!("large free: {} bytes at {o:p}", layout.size());
        layout
    };
    // SAFETY: storage came from the global allocator with this layout.
    unsafe { std::alloc::dealloc(o.cast(), layout) };
}
