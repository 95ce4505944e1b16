use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

use mnist_pipeline::Tensor;
use mnist_pipeline::preprocess::resize_images;

/// Tracks live and peak heap bytes.
struct PeakAlloc {
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl PeakAlloc {
    const fn new() -> Self {
        Self {
            live: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Restart peak tracking from the current live size.
    fn reset_peak(&self) -> usize {
        let live = self.live.load(Ordering::Relaxed);
        self.peak.store(live, Ordering::Relaxed);
        live
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    fn grow(&self, bytes: usize) {
        let live = self.live.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.peak.fetch_max(live, Ordering::Relaxed);
    }

    fn shrink(&self, bytes: usize) {
        self.live.fetch_sub(bytes, Ordering::Relaxed);
    }
}

unsafe impl GlobalAlloc for PeakAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.grow(layout.size());
        unsafe { System.alloc(layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        self.grow(layout.size());
        unsafe { System.alloc_zeroed(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.shrink(layout.size());
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        // Old and new blocks may coexist during the copy.
        self.grow(new_size);
        let out = unsafe { System.realloc(ptr, layout, new_size) };
        self.shrink(layout.size());
        out
    }
}

#[global_allocator]
static ALLOC: PeakAlloc = PeakAlloc::new();

#[test]
fn resize_peak_memory_stays_near_output_size() {
    const N: usize = 64;
    const SIDE: usize = 256;

    let input = Tensor::zeros(vec![N, 28, 28, 1]).unwrap();

    let before = ALLOC.reset_peak();
    let out = resize_images(&input, SIDE, SIDE).unwrap();
    let peak = ALLOC.peak() - before;

    assert_eq!(out.shape(), &[N, SIDE, SIDE, 1]);

    let output_bytes = N * SIDE * SIDE * size_of::<f32>();
    let sample_bytes = SIDE * SIDE * size_of::<f32>();
    let budget = output_bytes + 3 * sample_bytes + 64 * 1024;
    assert!(
        peak <= budget,
        "peak {peak} bytes exceeds budget {budget} bytes (output {output_bytes})"
    );
}
