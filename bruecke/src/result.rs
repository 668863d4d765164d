//! Result adapter: the uniform boundary-crossing error convention.
//!
//! A two-variant constructor — tag 0 wraps success, tag 1 wraps failure,
//! each with a single owned field. Inspection is one tag comparison,
//! extraction one field read, independent of payload type. Host-boundary
//! failures are routed through this shape; everything else in this crate
//! is either infallible, `None`-propagating, or documented UB.

use crate::ctor::{alloc_ctor, ctor_get, ctor_set};
use crate::rc::{dec, inc};
use crate::strings::mk_string;
use crate::tagged::Obj;

const TAG_OK: u8 = 0;
const TAG_ERROR: u8 = 1;

/// Wrap a success payload; takes ownership of `v`.
pub fn mk_ok(v: Obj) -> Option<Obj> {
    let o = alloc_ctor(TAG_OK, 1, 0)?;
    unsafe { ctor_set(o, 0, v) };
    Some(o)
}

/// Wrap a failure payload; takes ownership of `e`.
pub fn mk_error(e: Obj) -> Option<Obj> {
    let o = alloc_ctor(TAG_ERROR, 1, 0)?;
    unsafe { ctor_set(o, 0, e) };
    Some(o)
}

/// Failure wrapping a fresh string object, the common boundary shape.
pub fn mk_error_string(msg: &str) -> Option<Obj> {
    mk_error(mk_string(msg)?)
}

/// # Safety
///
/// `o` must be a result object.
#[inline(always)]
pub unsafe fn is_ok(o: Obj) -> bool {
    unsafe { o.tag() == TAG_OK }
}

/// # Safety
///
/// `o` must be a result object.
#[inline(always)]
pub unsafe fn is_error(o: Obj) -> bool {
    unsafe { o.tag() == TAG_ERROR }
}

/// Borrowing read of either payload.
///
/// # Safety
///
/// `o` must be a result object.
#[inline(always)]
pub unsafe fn result_payload(o: Obj) -> Obj {
    unsafe { ctor_get(o, 0) }
}

/// Owning extraction: returns the payload with one reference and
/// consumes the wrapper.
///
/// # Safety
///
/// `o` must be a result object the caller owns one reference to.
pub unsafe fn result_consume(o: Obj) -> Obj {
    unsafe {
        let v = result_payload(o);
        inc(v);
        dec(o);
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strings::string_as_str;

    #[test]
    fn ok_and_error_discriminate() {
        // Scenario: success wrapping 42, failure wrapping a message.
        let ok = mk_ok(Obj::from_scalar(42)).unwrap();
        let err = mk_error_string("host scheduler refused").unwrap();
        unsafe {
            assert!(is_ok(ok) && !is_error(ok));
            assert!(is_error(err) && !is_ok(err));
            assert_eq!(result_payload(ok).to_scalar(), 42);
            assert_eq!(string_as_str(result_payload(err)), "host scheduler refused");
            dec(ok);
            dec(err);
        }
    }

    #[test]
    fn consume_hands_over_the_payload() {
        let payload = crate::ctor::alloc_ctor(0, 0, 0).unwrap();
        let ok = mk_ok(payload).unwrap();
        unsafe {
            let got = result_consume(ok);
            assert_eq!(got, payload);
            assert_eq!(payload.header().rc(), 1);
            dec(got);
        }
    }
}
