//! UTF-8 string objects.
//!
//! ```text
//! [Header 8B] [size 8B] [capacity 8B] [length 8B] [utf8 bytes ... NUL]
//! ```
//!
//! `size` counts bytes including a trailing NUL (kept so the data
//! pointer can cross a C boundary unmodified), `capacity` the bytes
//! available, `length` the number of scalar values (chars). No owned
//! children; teardown frees bytes only.

use crate::alloc::alloc_object;
use crate::object::{Header, TAG_STRING};
use crate::rc::{dec, is_exclusive};
use crate::tagged::Obj;

#[repr(C)]
pub struct StringObject {
    pub header: Header,
    pub(crate) size: usize,
    pub(crate) capacity: usize,
    pub(crate) length: usize,
    data: [u8; 0],
}

const _: () = assert!(size_of::<StringObject>() == 32);

impl StringObject {
    #[inline(always)]
    pub(crate) fn data_ptr(&self) -> *mut u8 {
        self.data.as_ptr() as *mut u8
    }
}

#[inline(always)]
unsafe fn string_ptr(o: Obj) -> *mut StringObject {
    debug_assert!(unsafe { o.is_string() });
    unsafe { o.as_ptr() as *mut StringObject }
}

fn alloc_raw(capacity: usize) -> Option<Obj> {
    let bytes = size_of::<StringObject>() + capacity;
    let o = alloc_object(bytes, TAG_STRING, 0)?;
    unsafe {
        let s = o.as_ptr() as *mut StringObject;
        (*s).size = 1;
        (*s).capacity = capacity;
        (*s).length = 0;
        (*s).data_ptr().write(0);
    }
    Some(o)
}

/// Build a string object from a Rust string slice.
pub fn mk_string(s: &str) -> Option<Obj> {
    let o = alloc_raw(s.len() + 1)?;
    unsafe {
        let p = string_ptr(o);
        std::ptr::copy_nonoverlapping(s.as_ptr(), (*p).data_ptr(), s.len());
        (*p).data_ptr().add(s.len()).write(0);
        (*p).size = s.len() + 1;
        (*p).length = s.chars().count();
    }
    Some(o)
}

/// Byte count excluding the trailing NUL.
///
/// # Safety
///
/// `o` must be a string object.
#[inline(always)]
pub unsafe fn string_size(o: Obj) -> usize {
    unsafe { (*string_ptr(o)).size - 1 }
}

/// Char count.
///
/// # Safety
///
/// `o` must be a string object.
#[inline(always)]
pub unsafe fn string_len(o: Obj) -> usize {
    unsafe { (*string_ptr(o)).length }
}

/// # Safety
///
/// `o` must be a string object; the view must not outlive `o`.
pub unsafe fn string_as_str<'a>(o: Obj) -> &'a str {
    unsafe {
        let p = string_ptr(o);
        let bytes = std::slice::from_raw_parts((*p).data_ptr(), (*p).size - 1);
        std::str::from_utf8_unchecked(bytes)
    }
}

/// Append a char with the copy-on-write discipline; consumes one
/// reference to `o` on success.
///
/// # Safety
///
/// `o` must be a string object.
pub unsafe fn string_push(o: Obj, c: char) -> Option<Obj> {
    let mut buf = [0u8; 4];
    unsafe { string_append_bytes(o, c.encode_utf8(&mut buf).as_bytes(), 1) }
}

/// Append a string slice; consumes one reference to `o` on success.
///
/// # Safety
///
/// `o` must be a string object.
pub unsafe fn string_append(o: Obj, s: &str) -> Option<Obj> {
    unsafe { string_append_bytes(o, s.as_bytes(), s.chars().count()) }
}

unsafe fn string_append_bytes(o: Obj, bytes: &[u8], chars: usize) -> Option<Obj> {
    unsafe {
        let used = (*string_ptr(o)).size;
        let target = if is_exclusive(o) && used + bytes.len() <= (*string_ptr(o)).capacity {
            o
        } else {
            let fresh = alloc_raw((used + bytes.len()).max(used * 2))?;
            let p = string_ptr(o);
            let q = string_ptr(fresh);
            std::ptr::copy_nonoverlapping((*p).data_ptr(), (*q).data_ptr(), used - 1);
            (*q).size = used;
            (*q).length = (*p).length;
            dec(o);
            fresh
        };
        let p = string_ptr(target);
        let end = (*p).size - 1;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), (*p).data_ptr().add(end), bytes.len());
        (*p).size = end + bytes.len() + 1;
        (*p).length += chars;
        (*p).data_ptr().add((*p).size - 1).write(0);
        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mk_string_round_trips() {
        let s = mk_string("grüße").unwrap();
        unsafe {
            assert!(s.is_string());
            assert_eq!(string_as_str(s), "grüße");
            assert_eq!(string_size(s), "grüße".len());
            assert_eq!(string_len(s), 5);
            dec(s);
        }
    }

    #[test]
    fn empty_string_has_nul_only() {
        let s = mk_string("").unwrap();
        unsafe {
            assert_eq!(string_size(s), 0);
            assert_eq!(string_len(s), 0);
            assert_eq!(string_as_str(s), "");
            dec(s);
        }
    }

    #[test]
    fn push_and_append_grow() {
        let mut s = mk_string("ab").unwrap();
        unsafe {
            s = string_push(s, 'c').unwrap();
            s = string_append(s, "déf").unwrap();
            assert_eq!(string_as_str(s), "abcdéf");
            assert_eq!(string_len(s), 6);
            dec(s);
        }
    }

    #[test]
    fn shared_append_copies() {
        let s = mk_string("x").unwrap();
        unsafe {
            crate::rc::inc(s);
            let t = string_append(s, "y").unwrap();
            assert_ne!(s, t);
            assert_eq!(string_as_str(s), "x");
            assert_eq!(string_as_str(t), "xy");
            dec(s);
            dec(t);
        }
    }
}
