//! Integration tests: the allocation contract the Rust runtime relies on,
//! checked against every backend.
//!
//! Run: cargo test -p heapbridge-core --test router_contract_test

use std::collections::HashSet;
use std::sync::atomic::{AtomicIsize, Ordering};

use heapbridge_core::backend::{MAX_SUPPORTED_ALIGNMENT, NATURAL_ALIGNMENT};
use heapbridge_core::{AllocRequest, Backend, BackendKind, BackendStrategy, Router};

const SIZES: [usize; 7] = [0, 1, 7, 16, 100, 4096, 65_537];
const ALIGNS: [usize; 9] = [1, 2, 4, 8, 16, 32, 64, 512, 4096];

fn routers() -> Vec<Router> {
    BackendKind::ALL
        .into_iter()
        .map(|kind| Router::new(Backend::for_kind(kind)))
        .collect()
}

#[test]
fn allocations_are_aligned_and_fully_writable() {
    for router in routers() {
        let kind = router.backend().kind();
        for size in SIZES {
            for align in ALIGNS {
                unsafe {
                    let p = router.alloc(size, align);
                    assert!(!p.is_null(), "{kind}: alloc({size}, {align})");
                    assert_eq!(p as usize % align, 0, "{kind}: alloc({size}, {align})");
                    p.write_bytes(0xAB, size);
                    let span = std::slice::from_raw_parts(p, size);
                    assert!(span.iter().all(|&b| b == 0xAB));
                    router.dealloc(p, size, align);
                }
            }
        }
    }
}

#[test]
fn alloc_zeroed_returns_zero_bytes() {
    for router in routers() {
        let kind = router.backend().kind();
        for size in SIZES {
            for align in [1, 8, 64, 4096] {
                unsafe {
                    // Leave garbage behind for the zeroed call to possibly reuse.
                    let dirty = router.alloc(size, align);
                    dirty.write_bytes(0xEE, size);
                    router.dealloc(dirty, size, align);

                    let p = router.alloc_zeroed(size, align);
                    assert!(!p.is_null(), "{kind}: alloc_zeroed({size}, {align})");
                    assert_eq!(p as usize % align, 0);
                    let span = std::slice::from_raw_parts(p, size);
                    assert!(span.iter().all(|&b| b == 0), "{kind}: size={size}");
                    router.dealloc(p, size, align);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Leak accounting
// ---------------------------------------------------------------------------

/// Wraps a real backend and tracks what is outstanding in it.
struct Counting {
    inner: Backend,
    live_blocks: AtomicIsize,
    live_bytes: AtomicIsize,
}

impl Counting {
    fn new(kind: BackendKind) -> Self {
        Self {
            inner: Backend::for_kind(kind),
            live_blocks: AtomicIsize::new(0),
            live_bytes: AtomicIsize::new(0),
        }
    }

    fn outstanding(&self) -> (isize, isize) {
        (
            self.live_blocks.load(Ordering::SeqCst),
            self.live_bytes.load(Ordering::SeqCst),
        )
    }

    fn track(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        if !ptr.is_null() {
            self.live_blocks.fetch_add(1, Ordering::SeqCst);
            self.live_bytes.fetch_add(size as isize, Ordering::SeqCst);
        }
        ptr
    }
}

unsafe impl BackendStrategy for Counting {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn max_supported_alignment(&self) -> Option<usize> {
        self.inner.max_supported_alignment()
    }

    fn supports_zeroed_allocate(&self) -> bool {
        self.inner.supports_zeroed_allocate()
    }

    unsafe fn allocate(&self, size: usize, align: usize) -> *mut u8 {
        self.track(unsafe { self.inner.allocate(size, align) }, size)
    }

    unsafe fn deallocate(&self, ptr: *mut u8, size: usize, align: usize) {
        self.live_blocks.fetch_sub(1, Ordering::SeqCst);
        self.live_bytes.fetch_sub(size as isize, Ordering::SeqCst);
        unsafe { self.inner.deallocate(ptr, size, align) }
    }

    unsafe fn reallocate(
        &self,
        ptr: *mut u8,
        old_size: usize,
        align: usize,
        new_size: usize,
    ) -> *mut u8 {
        let q = unsafe { self.inner.reallocate(ptr, old_size, align, new_size) };
        if !q.is_null() {
            self.live_bytes
                .fetch_add(new_size as isize - old_size as isize, Ordering::SeqCst);
        }
        q
    }

    unsafe fn allocate_zeroed(&self, size: usize, align: usize) -> *mut u8 {
        self.track(unsafe { self.inner.allocate_zeroed(size, align) }, size)
    }
}

#[test]
fn every_path_returns_what_it_takes() {
    for kind in BackendKind::ALL {
        let router = Router::new(Counting::new(kind));
        unsafe {
            for size in SIZES {
                for align in ALIGNS {
                    let p = router.alloc(size, align);
                    let z = router.alloc_zeroed(size, align);
                    assert!(!p.is_null() && !z.is_null(), "{kind}");
                    let q = router.realloc(p, size, align, size * 2 + 1);
                    assert!(!q.is_null(), "{kind}");
                    router.dealloc(q, size * 2 + 1, align);
                    router.dealloc(z, size, align);
                }
            }

            // A failed realloc still owns the block, and the caller frees it.
            let p = router.alloc(16, 8);
            assert!(router.realloc(p, 16, 8, isize::MAX as usize - 4096).is_null());
            router.dealloc(p, 16, 8);

            // Refused and failed requests leave nothing behind.
            let over = router.alloc(64, MAX_SUPPORTED_ALIGNMENT << 1);
            if !over.is_null() {
                router.dealloc(over, 64, MAX_SUPPORTED_ALIGNMENT << 1);
            }
            assert!(router.alloc(isize::MAX as usize - 4096, 8).is_null());
        }
        {
            let request = AllocRequest::new(100, 32).unwrap();
            let mut block = router.allocate(request).unwrap();
            block.resize(5000).unwrap();
            let _filled = router.allocate_filled(request, 7).unwrap();
        }
        assert_eq!(router.backend().outstanding(), (0, 0), "{kind}");
    }
}

/// Number of distinct addresses seen over `cycles` alloc/free pairs.
///
/// A heap that gets its blocks back hands the same few addresses out again;
/// one that never does produces a new address every cycle. Over-aligned
/// sizes stay above the C heap's small-chunk caches so freed blocks coalesce.
fn distinct_addresses(router: &Router, size: usize, align: usize, cycles: usize) -> usize {
    let mut seen = HashSet::new();
    for _ in 0..cycles {
        unsafe {
            let p = router.alloc(size, align);
            assert!(!p.is_null());
            *p = 1;
            seen.insert(p as usize);
            router.dealloc(p, size, align);
        }
    }
    seen.len()
}

#[test]
fn freed_blocks_are_reused() {
    const CYCLES: usize = 4_096;
    for router in routers() {
        let kind = router.backend().kind();
        for (size, align) in [(24, 8), (2000, NATURAL_ALIGNMENT * 2), (3000, 4096)] {
            let distinct = distinct_addresses(&router, size, align, CYCLES);
            assert!(
                distinct < CYCLES / 2,
                "{kind}: alloc({size}, {align}) produced {distinct} distinct addresses in {CYCLES} cycles"
            );
        }
    }
}

#[test]
fn reallocated_blocks_are_reused() {
    const CYCLES: usize = 2_048;
    for router in routers() {
        let kind = router.backend().kind();
        let mut seen = HashSet::new();
        for _ in 0..CYCLES {
            unsafe {
                let p = router.alloc(1500, 64);
                assert!(!p.is_null());
                let q = router.realloc(p, 1500, 64, 4096);
                assert!(!q.is_null());
                seen.insert(q as usize);
                router.dealloc(q, 4096, 64);
            }
        }
        assert!(seen.len() < CYCLES / 2, "{kind}: {} distinct addresses", seen.len());
    }
}

#[test]
fn repeated_alloc_dealloc_cycles_keep_working() {
    for router in routers() {
        for (size, align) in [(24, 8), (100, 32), (3000, 4096)] {
            for _ in 0..20_000 {
                unsafe {
                    let p = router.alloc(size, align);
                    assert!(!p.is_null());
                    *p = 1;
                    router.dealloc(p, size, align);
                }
            }
        }
    }
}

#[test]
fn shared_heap_example_scenario() {
    let router = Router::new(Backend::for_kind(BackendKind::SharedHeap));
    unsafe {
        // Natural alignment: plain path.
        let p = router.alloc(100, 8);
        assert!(!p.is_null());
        assert_eq!(p as usize % 8, 0);

        // Above natural alignment: aligned path.
        let q = router.alloc(100, NATURAL_ALIGNMENT * 2);
        assert!(!q.is_null());
        assert_eq!(q as usize % (NATURAL_ALIGNMENT * 2), 0);

        // Above the backend limit: refused.
        assert!(router.alloc(100, MAX_SUPPORTED_ALIGNMENT * 2).is_null());

        router.dealloc(p, 100, 8);
        router.dealloc(q, 100, NATURAL_ALIGNMENT * 2);
    }
}

#[test]
fn over_alignment_fails_every_time() {
    let router = Router::new(Backend::for_kind(BackendKind::SharedHeap));
    let align = MAX_SUPPORTED_ALIGNMENT << 1;
    for _ in 0..1_000 {
        unsafe {
            assert!(router.alloc(64, align).is_null());
            assert!(router.alloc_zeroed(64, align).is_null());
        }
    }
}

#[test]
fn realloc_preserves_content_prefix() {
    for router in routers() {
        let kind = router.backend().kind();
        for align in [8, 64] {
            unsafe {
                let p = router.alloc(16, align);
                assert!(!p.is_null());
                for i in 0..16 {
                    *p.add(i) = 0xA0 | i as u8;
                }

                let q = router.realloc(p, 16, align, 64);
                assert!(!q.is_null(), "{kind}");
                assert_eq!(q as usize % align, 0);
                for i in 0..16 {
                    assert_eq!(*q.add(i), 0xA0 | i as u8, "{kind}: byte {i}");
                }

                // Shrinking keeps the leading bytes too.
                let r = router.realloc(q, 64, align, 4);
                assert!(!r.is_null());
                for i in 0..4 {
                    assert_eq!(*r.add(i), 0xA0 | i as u8);
                }
                router.dealloc(r, 4, align);
            }
        }
    }
}

#[test]
fn failed_realloc_leaves_original_untouched() {
    for router in routers() {
        let kind = router.backend().kind();
        unsafe {
            let p = router.alloc(16, 8);
            assert!(!p.is_null());
            p.write_bytes(0x3C, 16);

            let huge = isize::MAX as usize - 4096;
            assert!(router.realloc(p, 16, 8, huge).is_null(), "{kind}");

            let span = std::slice::from_raw_parts(p, 16);
            assert!(span.iter().all(|&b| b == 0x3C), "{kind}");
            // Still owned and still usable.
            let q = router.realloc(p, 16, 8, 32);
            assert!(!q.is_null());
            router.dealloc(q, 32, 8);
        }
    }
}

#[test]
fn unsupported_alignment_on_realloc_keeps_original() {
    let router = Router::new(Backend::for_kind(BackendKind::SharedHeap));
    unsafe {
        let p = router.alloc(16, 8);
        assert!(!p.is_null());
        p.write_bytes(0x5D, 16);
        assert!(
            router
                .realloc(p, 16, MAX_SUPPORTED_ALIGNMENT << 1, 64)
                .is_null()
        );
        assert!(std::slice::from_raw_parts(p, 16).iter().all(|&b| b == 0x5D));
        router.dealloc(p, 16, 8);
    }
}

#[test]
fn zero_size_allocations_are_consistent() {
    for router in routers() {
        let kind = router.backend().kind();
        for align in [1, 16, 256] {
            let handles: Vec<*mut u8> = (0..8)
                .map(|_| unsafe { router.alloc(0, align) })
                .collect();
            for (i, &p) in handles.iter().enumerate() {
                assert!(!p.is_null(), "{kind}: alloc(0, {align})");
                assert_eq!(p as usize % align, 0);
                assert!(!handles[..i].contains(&p), "{kind}: duplicate zero-size handle");
            }
            for p in handles {
                unsafe { router.dealloc(p, 0, align) };
            }
        }
    }
}

#[test]
fn huge_requests_fail_softly() {
    for router in routers() {
        let kind = router.backend().kind();
        unsafe {
            assert!(router.alloc(isize::MAX as usize - 4096, 8).is_null(), "{kind}");
            assert!(
                router
                    .alloc_zeroed(isize::MAX as usize - 4096, 64)
                    .is_null(),
                "{kind}"
            );
        }
    }
}
