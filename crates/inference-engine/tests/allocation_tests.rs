//! `invoke()` must not touch the heap

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

use inference_engine::builder::{fixed_logits_model, gesture_cnn_model};
use inference_engine::InferenceEngine;

struct CountingAlloc;

thread_local! {
    static COUNTING: Cell<bool> = const { Cell::new(false) };
    static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
}

fn record() {
    if COUNTING.try_with(Cell::get).unwrap_or(false) {
        let _ = ALLOCATIONS.try_with(|n| n.set(n.get() + 1));
    }
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        record();
        System.alloc(layout)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        record();
        System.alloc_zeroed(layout)
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        record();
        System.realloc(ptr, layout, new_size)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static GLOBAL: CountingAlloc = CountingAlloc;

/// Run `f` and count heap allocations made on this thread meanwhile
fn allocations_during<R>(f: impl FnOnce() -> R) -> (R, usize) {
    ALLOCATIONS.with(|n| n.set(0));
    COUNTING.with(|c| c.set(true));
    let result = f();
    COUNTING.with(|c| c.set(false));
    (result, ALLOCATIONS.with(Cell::get))
}

fn assert_invoke_allocation_free(blob: &[u8]) {
    let mut engine: InferenceEngine<'_> = InferenceEngine::new(blob);
    engine.init().unwrap();
    engine.input_mut().unwrap().as_f32_mut().unwrap().fill(0.5);
    // first pass registers tracing callsites
    engine.invoke().unwrap();

    for _ in 0..3 {
        let (result, allocations) = allocations_during(|| engine.invoke());
        result.unwrap();
        assert_eq!(allocations, 0);
    }
}

#[test]
fn test_counter_sees_allocations() {
    let (v, allocations) = allocations_during(|| vec![0u8; 64]);
    assert_eq!(v.len(), 64);
    assert!(allocations >= 1);
}

#[test]
fn test_quantized_cnn_invoke_does_not_allocate() {
    assert_invoke_allocation_free(&gesture_cnn_model(7, 14).unwrap());
}

#[test]
fn test_float_model_invoke_does_not_allocate() {
    assert_invoke_allocation_free(&fixed_logits_model(32, 32, &[0.25; 14]).unwrap());
}
