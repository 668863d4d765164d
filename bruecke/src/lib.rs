//! bruecke: a zero-copy bridge exposing a managed runtime's object model
//! to native code.
//!
//! The contract is ABI-exact: tagged scalars (low bit 1), a uniform
//! 8-byte header, per-variant trailing-storage layouts, and a manual
//! refcount protocol with a single-threaded fast path and an atomic
//! multi-threaded path selected per object. The host runtime's
//! allocator, scheduler and collector stay external collaborators; see
//! [`host`] for the injected capability traits.

mod alloc;
mod arrays;
mod closures;
mod ctor;
mod external;
mod host;
mod object;
mod rc;
mod refs;
mod result;
mod sarrays;
mod strings;
mod tagged;
mod tasks;
mod thunks;

pub use alloc::alloc_object;
pub use arrays::{
    ArrayObject, alloc_array, alloc_array_with_size, array_capacity, array_get, array_get_own,
    array_get_unchecked, array_push, array_set, array_set_size, array_set_unchecked, array_size,
    array_swap,
};
pub use closures::{
    ClosureObject, alloc_closure, closure_arity, closure_bind, closure_fun, closure_get,
    closure_num_fixed, closure_saturated, closure_set,
};
pub use ctor::{
    CtorObject, alloc_ctor, box_f64, box_u64, ctor_get, ctor_get_f64, ctor_get_u8, ctor_get_u16,
    ctor_get_u32, ctor_get_u64, ctor_get_usize, ctor_release, ctor_set, ctor_set_f64,
    ctor_set_tag, ctor_set_u8, ctor_set_u16, ctor_set_u32, ctor_set_u64, ctor_set_usize,
    unbox_f64, unbox_u64,
};
pub use external::{
    ExternalClass, ExternalFinalizeProc, ExternalForeachProc, ExternalObject, alloc_external,
    external_class, external_data, external_foreach, register_external_class, set_external_data,
};
pub use host::{HostApply, HostScheduler, InlineHost};
pub use object::{
    Header, MAX_CTOR_TAG, Object, TAG_ARRAY, TAG_BIGINT, TAG_CLOSURE, TAG_EXTERNAL, TAG_REF,
    TAG_SARRAY, TAG_STRING, TAG_TASK, TAG_THUNK,
};
pub use rc::{dec, inc, inc_n, is_exclusive, is_shared, mark_mt, mark_persistent};
pub use refs::{RefObject, mk_ref, ref_get, ref_get_own, ref_set, ref_take};
pub use result::{
    is_error, is_ok, mk_error, mk_error_string, mk_ok, result_consume, result_payload,
};
pub use sarrays::{
    SArrayObject, alloc_sarray, alloc_sarray_with_size, sarray_bytes, sarray_capacity,
    sarray_elem_size, sarray_get, sarray_push, sarray_set, sarray_set_size, sarray_size,
};
pub use strings::{
    StringObject, mk_string, string_append, string_as_str, string_len, string_push, string_size,
};
pub use tagged::Obj;
pub use tasks::{
    TaskObject, mk_task, task_bind, task_closure, task_fill, task_handle, task_map,
    task_set_handle, task_spawn, task_value, task_wait,
};
pub use thunks::{
    ThunkObject, mk_thunk, thunk_closure, thunk_fill, thunk_get, thunk_get_own, thunk_pure,
    thunk_value,
};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ── tag exclusivity ────────────────────────────────────────────

    /// Exactly one kind predicate holds per heap object; scalars are
    /// constructors and nothing else.
    unsafe fn kind_census(o: Obj) -> usize {
        unsafe {
            [
                o.is_ctor(),
                o.is_array(),
                o.is_sarray(),
                o.is_closure(),
                o.is_string(),
                o.is_bigint(),
                o.is_thunk(),
                o.is_task(),
                o.is_ref(),
                o.is_external(),
            ]
            .iter()
            .filter(|&&b| b)
            .count()
        }
    }

    #[test]
    fn exactly_one_kind_per_object() {
        unsafe extern "C" fn nop() -> Obj {
            Obj::from_scalar(0)
        }
        let class = register_external_class(None, None);
        let objects = [
            alloc_ctor(7, 1, 8).unwrap(),
            alloc_array(2).unwrap(),
            alloc_sarray(4, 2).unwrap(),
            alloc_closure(nop as usize as *mut _, 0, 0).unwrap(),
            mk_string("s").unwrap(),
            thunk_pure(Obj::from_scalar(1)).unwrap(),
            mk_task(Obj::NULL).unwrap(),
            mk_ref(Obj::NULL).unwrap(),
            alloc_external(class, std::ptr::null_mut()).unwrap(),
        ];
        unsafe {
            for o in objects {
                assert_eq!(kind_census(o), 1, "{o:?}");
                dec(o);
            }
            let s = Obj::from_scalar(3);
            assert!(s.is_ctor());
            assert_eq!(kind_census(s), 1);
        }
    }

    // ── end-to-end scenarios ───────────────────────────────────────

    #[test]
    fn constructor_scenario() {
        let o = alloc_ctor(0, 2, 0).unwrap();
        unsafe {
            ctor_set(o, 0, Obj::from_scalar(10));
            ctor_set(o, 1, Obj::from_scalar(20));
            assert_eq!(ctor_get(o, 0).to_scalar(), 10);
            assert_eq!(ctor_get(o, 1).to_scalar(), 20);
            dec(o);
        }
    }

    #[test]
    fn nested_ownership_tears_down_deep_chains() {
        // A long ctor chain releases iteratively, not recursively.
        let mut head = alloc_ctor(0, 0, 0).unwrap();
        for _ in 0..100_000 {
            let link = alloc_ctor(1, 1, 0).unwrap();
            unsafe { ctor_set(link, 0, head) };
            head = link;
        }
        unsafe { dec(head) };
    }

    #[test]
    fn boundary_result_convention() {
        let host = InlineHost::default();
        unsafe extern "C" fn fails() -> Obj {
            // A host-side computation signalling failure.
            mk_error_string("resource exhausted").unwrap()
        }
        let c = alloc_closure(fails as usize as *mut _, 0, 0).unwrap();
        unsafe {
            let t = task_spawn(&host, c, 0).unwrap();
            let r = task_wait(&host, t);
            assert!(is_error(r));
            assert_eq!(string_as_str(result_payload(r)), "resource exhausted");
            dec(t);
        }
    }

    // ── property tests ─────────────────────────────────────────────

    proptest! {
        #[test]
        fn scalar_box_unbox_round_trips(n in 0usize..(1 << 63)) {
            let v = Obj::from_scalar(n);
            prop_assert!(v.is_scalar());
            prop_assert_eq!(v.raw() & 1, 1);
            prop_assert_eq!(unsafe { v.to_scalar() }, n);
        }

        #[test]
        fn refcount_balance(k in 1usize..64) {
            let o = alloc_ctor(0, 0, 0).unwrap();
            unsafe {
                let before = o.header().rc();
                inc_n(o, k);
                prop_assert_eq!(o.header().rc(), before + k as i32);
                prop_assert!(is_shared(o));
                for _ in 0..k {
                    dec(o);
                }
                prop_assert_eq!(o.header().rc(), before);
                prop_assert!(is_exclusive(o));
                dec(o);
            }
        }

        #[test]
        fn array_get_after_set(vals in proptest::collection::vec(0usize..1 << 62, 1..32)) {
            let a = alloc_array_with_size(vals.len(), vals.len()).unwrap();
            unsafe {
                for (i, &v) in vals.iter().enumerate() {
                    array_set(a, i, Obj::from_scalar(v));
                }
                for (i, &v) in vals.iter().enumerate() {
                    prop_assert_eq!(array_get(a, i).to_scalar(), v);
                }
                prop_assert!(array_capacity(a) >= array_size(a));
                dec(a);
            }
        }

        /// Concurrent balanced inc/dec on an MT object never change the
        /// final count, whatever the interleaving.
        #[test]
        fn mt_interleavings_preserve_refcount(
            per_thread in 1usize..512,
            threads in 2usize..5,
        ) {
            let o = alloc_ctor(0, 0, 0).unwrap();
            unsafe {
                mark_mt(o);
                inc_n(o, threads);
            }
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    std::thread::spawn(move || {
                        for _ in 0..per_thread {
                            unsafe {
                                inc(o);
                                dec(o);
                            }
                        }
                        unsafe { dec(o) };
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            unsafe {
                prop_assert_eq!(o.header().rc(), -1);
                dec(o);
            }
        }
    }
}
