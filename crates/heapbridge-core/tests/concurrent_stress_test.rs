//! Concurrent stress: interleaved alloc/realloc/dealloc of random sizes and
//! alignments from many threads, with blocks handed across threads before
//! being freed.
//!
//! Run: cargo test -p heapbridge-core --test concurrent_stress_test

use std::thread;
use std::time::{Duration, Instant};

use heapbridge_core::{AllocRequest, Backend, BackendKind, OwnedBlock, Router};
use parking_lot::Mutex;

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range_usize(&mut self, low: usize, high_inclusive: usize) -> usize {
        assert!(low <= high_inclusive);
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

const THREADS: usize = 8;
const SLOTS: usize = 64;
const RUN_FOR: Duration = Duration::from_millis(300);

/// Fill byte derived from the block's identity, so corruption by another
/// thread shows up as a mismatch.
fn tag(thread_id: usize, slot: usize) -> u8 {
    ((thread_id * 31 + slot * 7) % 251) as u8 | 1
}

fn stress(kind: BackendKind) {
    let router = Router::new(Backend::for_kind(kind));
    let exchange: Mutex<Vec<(u8, OwnedBlock<'_, Backend>)>> = Mutex::new(Vec::new());

    thread::scope(|scope| {
        for thread_id in 0..THREADS {
            let router = &router;
            let exchange = &exchange;
            scope.spawn(move || {
                let mut rng = XorShift64::new(0xC0FF_EE00 + thread_id as u64);
                let mut slots: Vec<Option<(u8, OwnedBlock<'_, Backend>)>> =
                    (0..SLOTS).map(|_| None).collect();
                let started = Instant::now();
                let mut ops = 0usize;

                while started.elapsed() < RUN_FOR || ops < 2_000 {
                    ops += 1;
                    let slot = rng.gen_range_usize(0, SLOTS - 1);
                    match (slots[slot].take(), rng.gen_range_usize(0, 3)) {
                        (None, _) => {
                            let size = rng.gen_range_usize(0, 8192);
                            let align = 1usize << rng.gen_range_usize(0, 12);
                            let request = AllocRequest::new(size, align).unwrap();
                            let fill = tag(thread_id, slot);
                            let block = router.allocate_filled(request, fill).unwrap();
                            assert_eq!(block.addr() % align, 0);
                            slots[slot] = Some((fill, block));
                        }
                        (Some((fill, mut block)), 0) => {
                            let old_len = block.len();
                            let new_size = rng.gen_range_usize(0, 16_384);
                            block.resize(new_size).unwrap();
                            let kept = old_len.min(new_size);
                            assert!(
                                block.as_slice()[..kept].iter().all(|&b| b == fill),
                                "{kind}: resize lost data"
                            );
                            block.as_mut_slice().fill(fill);
                            slots[slot] = Some((fill, block));
                        }
                        (Some((fill, block)), 1) => {
                            assert!(block.as_slice().iter().all(|&b| b == fill));
                            exchange.lock().push((fill, block));
                        }
                        (Some((fill, block)), _) => {
                            assert!(
                                block.as_slice().iter().all(|&b| b == fill),
                                "{kind}: block corrupted before free"
                            );
                            drop(block);
                        }
                    }

                    // Free someone else's block now and then.
                    if ops % 16 == 0 {
                        let handed = exchange.lock().pop();
                        if let Some((fill, block)) = handed {
                            assert!(block.as_slice().iter().all(|&b| b == fill));
                        }
                    }
                }

                for (fill, block) in slots.into_iter().flatten() {
                    assert!(block.as_slice().iter().all(|&b| b == fill));
                }
            });
        }
    });

    for (fill, block) in exchange.into_inner() {
        assert!(block.as_slice().iter().all(|&b| b == fill));
    }
}

#[test]
fn shared_heap_survives_concurrent_stress() {
    stress(BackendKind::SharedHeap);
}

#[test]
fn aligned_heap_survives_concurrent_stress() {
    stress(BackendKind::AlignedHeap);
}

#[test]
fn runtime_default_survives_concurrent_stress() {
    stress(BackendKind::RuntimeDefault);
}

#[test]
fn global_router_survives_concurrent_stress() {
    let router = &heapbridge_core::ROUTER;
    thread::scope(|scope| {
        for thread_id in 0..THREADS {
            scope.spawn(move || {
                let mut rng = XorShift64::new(thread_id as u64 + 17);
                for _ in 0..5_000 {
                    let size = rng.gen_range_usize(1, 2048);
                    let align = 1usize << rng.gen_range_usize(0, 7);
                    unsafe {
                        let p = router.alloc(size, align);
                        assert!(!p.is_null());
                        p.write_bytes(0x99, size);
                        let q = router.realloc(p, size, align, size * 2);
                        assert!(!q.is_null());
                        assert_eq!(*q.add(size - 1), 0x99);
                        router.dealloc(q, size * 2, align);
                    }
                }
            });
        }
    });
}
