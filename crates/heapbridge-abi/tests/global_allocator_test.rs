//! The Rust heap running on `RoutedAllocator`: collections, over-aligned
//! types, fallible reservation and threads.
//!
//! Run: cargo test -p heapbridge-abi --test global_allocator_test

// The crate features register their own global allocator.
#![cfg(not(any(feature = "global-allocator", feature = "system-allocator")))]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread;

use heapbridge_abi::RoutedAllocator;
use parking_lot::Mutex;

#[global_allocator]
static GLOBAL: RoutedAllocator = RoutedAllocator;

#[repr(align(256))]
struct Page([u8; 256]);

#[test]
fn collections_work() {
    let mut v: Vec<u64> = Vec::new();
    for i in 0..100_000 {
        v.push(i);
    }
    assert_eq!(v.iter().sum::<u64>(), 4_999_950_000);
    v.truncate(10);
    v.shrink_to_fit();
    assert_eq!(v, (0..10).collect::<Vec<_>>());

    let mut s = String::new();
    for word in ["heap", "bridge", "router"] {
        s.push_str(word);
        s.push(' ');
    }
    assert_eq!(s.trim_end(), "heap bridge router");

    let mut map = HashMap::new();
    let mut tree = BTreeMap::new();
    for i in 0..5_000u32 {
        map.insert(i, i.to_string());
        tree.insert(i.to_string(), i);
    }
    assert_eq!(map[&4_999], "4999");
    assert_eq!(tree["17"], 17);
}

#[test]
fn over_aligned_boxes_and_vecs() {
    let pages: Vec<Box<Page>> = (0..64).map(|i| Box::new(Page([i as u8; 256]))).collect();
    for (i, page) in pages.iter().enumerate() {
        assert_eq!(&**page as *const Page as usize % 256, 0);
        assert!(page.0.iter().all(|&b| b == i as u8));
    }

    let mut packed: Vec<Page> = Vec::with_capacity(3);
    for i in 0..40 {
        packed.push(Page([i; 256]));
    }
    assert_eq!(packed.as_ptr() as usize % 256, 0);
    assert_eq!(packed[39].0[255], 39);
}

#[test]
fn zeroed_vec_is_zero() {
    let v = vec![0u8; 1 << 20];
    assert!(v.iter().all(|&b| b == 0));
}

#[test]
fn oversized_reservation_fails_without_abort() {
    let mut v: Vec<u8> = Vec::new();
    assert!(v.try_reserve(isize::MAX as usize).is_err());
    assert!(v.try_reserve(isize::MAX as usize - 4096).is_err());
    v.push(1);
    assert_eq!(v, [1]);
}

#[test]
fn threads_share_the_routed_heap() {
    let shared = Arc::new(Mutex::new(Vec::<Box<[u8]>>::new()));
    let handles: Vec<_> = (0..8u8)
        .map(|t| {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                for i in 0..2_000usize {
                    let block = vec![t; 1 + (i % 300)].into_boxed_slice();
                    if i % 3 == 0 {
                        shared.lock().push(block);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let blocks = std::mem::take(&mut *shared.lock());
    assert_eq!(blocks.len(), 8 * 667);
    for block in &blocks {
        let first = block[0];
        assert!(block.iter().all(|&b| b == first));
    }
}
