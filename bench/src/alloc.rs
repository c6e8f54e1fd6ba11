// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! A counting global allocator, exposed to `criterion` as a
//! measurement, so that the per-packet path can be shown to make no
//! allocations at all.

use super::MeasurementInfo;
use criterion::Criterion;
use criterion::measurement::Measurement;
use criterion::measurement::ValueFormatter;
use std::alloc::GlobalAlloc;
use std::alloc::Layout;
use std::alloc::System;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[global_allocator]
static BENCH_ALLOC: CountingAlloc = CountingAlloc::new();

// Counts are process-wide: criterion runs one case at a time, and
// nothing else in a bench binary allocates concurrently.
struct CountingAlloc {
    count: AtomicU64,
    bytes: AtomicU64,
}

impl CountingAlloc {
    const fn new() -> Self {
        Self { count: AtomicU64::new(0), bytes: AtomicU64::new(0) }
    }
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(layout.size() as u64, Ordering::Relaxed);
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }
}

pub trait MemMeasure {
    fn read() -> u64;
    fn unit() -> &'static Unit;
    fn label() -> &'static str;
}

/// Number of allocations.
pub struct Allocs;

/// Bytes requested from the allocator.
pub struct BytesAlloced;

impl MemMeasure for Allocs {
    fn read() -> u64 {
        BENCH_ALLOC.count.load(Ordering::Relaxed)
    }

    fn unit() -> &'static Unit {
        static COUNT: Unit = Unit("");
        &COUNT
    }

    fn label() -> &'static str {
        "alloc_ct"
    }
}

impl MemMeasure for BytesAlloced {
    fn read() -> u64 {
        BENCH_ALLOC.bytes.load(Ordering::Relaxed)
    }

    fn unit() -> &'static Unit {
        static BYTES: Unit = Unit("B");
        &BYTES
    }

    fn label() -> &'static str {
        "alloc_sz"
    }
}

/// Reports values unscaled, in one fixed unit. Per-packet counts are
/// small enough that scaling would only obscure them.
pub struct Unit(&'static str);

impl ValueFormatter for Unit {
    fn scale_values(
        &self,
        _typical: f64,
        _values: &mut [f64],
    ) -> &'static str {
        self.0
    }

    fn scale_throughputs(
        &self,
        _typical: f64,
        _throughput: &criterion::Throughput,
        _values: &mut [f64],
    ) -> &'static str {
        self.0
    }

    fn scale_for_machines(&self, _values: &mut [f64]) -> &'static str {
        self.0
    }
}

/// Newtype used to mass-impl [`MemMeasure`] -> [`Measurement`].
pub struct Local<T>(T);

impl<T: MemMeasure> Measurement for Local<T> {
    type Intermediate = u64;
    type Value = u64;

    fn start(&self) -> Self::Intermediate {
        T::read()
    }

    fn end(&self, i: Self::Intermediate) -> Self::Value {
        T::read() - i
    }

    fn add(&self, v1: &Self::Value, v2: &Self::Value) -> Self::Value {
        v1 + v2
    }

    fn zero(&self) -> Self::Value {
        0
    }

    fn to_f64(&self, value: &Self::Value) -> f64 {
        *value as f64
    }

    fn formatter(&self) -> &dyn ValueFormatter {
        T::unit()
    }
}

impl<T: MemMeasure> MeasurementInfo for Local<T> {
    fn label() -> &'static str {
        T::label()
    }
}

/// Create a new [`Criterion`] instance measuring allocations instead
/// of time.
pub fn new_crit<T: MemMeasure>(val: T) -> Criterion<Local<T>> {
    Criterion::default()
        .with_measurement(Local(val))
        .sample_size(10)
        .warm_up_time(Duration::from_nanos(1))
        .measurement_time(Duration::from_micros(10))
        .nresamples(1)
        // Every sample is usually zero, which the plotters choke on.
        .without_plots()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::workload::Workload;

    // The only test in this crate, so nothing else allocates while it
    // counts.
    #[test]
    fn evaluate_does_not_allocate() {
        for wl in Workload::ALL {
            let (eng, frames) = wl.setup();
            let now = wl.now();
            let before = Allocs::read();
            for f in &frames {
                std::hint::black_box(eng.evaluate(f, now));
            }
            assert_eq!(Allocs::read() - before, 0, "{}", wl.name());
        }
    }
}
