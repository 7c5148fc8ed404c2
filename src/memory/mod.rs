//! Byte-level allocation tracking, reference-count primitives, size-class
//! pools, and collector scaffolding.
//!
//! The `Heap` is an explicit context object: the interpreter and the AST
//! arena each hold a handle instead of reaching for process globals. All
//! allocation-class operations fail by returning `None`/`false` — a panic
//! here would mean the heap's own bookkeeping is corrupt.

pub mod gc;
pub mod pool;

use std::panic::Location;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use pool::{PoolSet, PoolStats};

// ---- Reference counting ----

/// Atomic reference counter. Decrementing at zero saturates rather than
/// wrapping; the underflow is remembered as a logic fault.
#[derive(Debug, Default)]
pub struct RefCount {
    count: AtomicUsize,
    underflowed: AtomicBool,
}

impl RefCount {
    pub fn new(initial: usize) -> Self {
        RefCount {
            count: AtomicUsize::new(initial),
            underflowed: AtomicBool::new(false),
        }
    }

    /// Increment and return the new count.
    pub fn inc(&self) -> usize {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement and return the new count. Saturates at zero.
    pub fn dec(&self) -> usize {
        let result = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1));
        match result {
            Ok(previous) => previous - 1,
            Err(_) => {
                self.underflowed.store(true, Ordering::Release);
                0
            }
        }
    }

    pub fn get(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// True if a decrement was ever attempted at zero.
    pub fn underflowed(&self) -> bool {
        self.underflowed.load(Ordering::Acquire)
    }
}

// ---- Allocations ----

/// Identifies a live allocation in the tracking table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocId(u64);

/// An owned, zero-initialized block handed out by [`Heap::alloc`].
///
/// Ownership makes a literal double-free unrepresentable: `free` consumes
/// the block. Dropping a block without returning it to the heap leaves its
/// record in the tracking table, which is exactly what the leak report is
/// for.
#[derive(Debug)]
pub struct Allocation {
    id: AllocId,
    bytes: Box<[u8]>,
}

impl Allocation {
    pub fn id(&self) -> AllocId {
        self.id
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.bytes
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// An owned string duplicated through the heap, so that string copies show
/// up in the allocation statistics like every other block.
#[derive(Debug)]
pub struct HeapString {
    alloc: Allocation,
    len: usize,
}

impl HeapString {
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.alloc.data()[..self.len]).unwrap_or("")
    }

    pub fn id(&self) -> AllocId {
        self.alloc.id()
    }

    pub fn into_allocation(self) -> Allocation {
        self.alloc
    }
}

// ---- Statistics ----

#[derive(Debug, Default)]
struct StatsInner {
    total_allocated: AtomicUsize,
    total_freed: AtomicUsize,
    current_allocated: AtomicUsize,
    peak_allocated: AtomicUsize,
    allocation_count: AtomicUsize,
    free_count: AtomicUsize,
}

/// Snapshot of the heap's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub total_allocated: usize,
    pub total_freed: usize,
    pub current_allocated: usize,
    pub peak_allocated: usize,
    pub allocation_count: usize,
    pub free_count: usize,
}

// ---- Tracking ----

#[derive(Debug)]
struct BlockInfo {
    size: usize,
    site: &'static Location<'static>,
    timestamp: u64,
    /// Collector scaffolding: survives-collection generation.
    generation: u8,
    /// Collector scaffolding: mark bit.
    marked: bool,
    /// Bumped by `validate`/`is_tracked` probes.
    access: RefCount,
}

// ---- Limits ----

/// Ceilings on outstanding memory. `None` disables a given limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapLimits {
    /// Ceiling on total outstanding bytes.
    pub max_total_bytes: Option<usize>,
    /// Ceiling on any single allocation.
    pub max_allocation_bytes: Option<usize>,
    /// Fire the low-headroom callback when remaining headroom drops below
    /// this many bytes. Only meaningful with `max_total_bytes` set.
    pub low_headroom_bytes: Option<usize>,
}

type HeadroomCallback = Box<dyn Fn(usize) + Send + Sync>;

/// Construction-time heap configuration.
#[derive(Debug, Default)]
pub struct HeapConfig {
    pub limits: HeapLimits,
    /// Size classes routed through the pool layer.
    pub pool_size_classes: Vec<usize>,
}

// ---- Heap ----

/// The allocation context: zero-initialized blocks, owned-string
/// duplication, debug tracking, limits, and transparent pool routing.
pub struct Heap {
    debug: AtomicBool,
    next_id: AtomicU64,
    stats: StatsInner,
    limits: HeapLimits,
    tracked: Mutex<FxHashMap<AllocId, BlockInfo>>,
    headroom_callback: Mutex<Option<HeadroomCallback>>,
    pools: PoolSet,
}

impl Default for Heap {
    fn default() -> Self {
        Heap::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap::with_config(HeapConfig::default())
    }

    pub fn with_config(config: HeapConfig) -> Self {
        Heap {
            debug: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            stats: StatsInner::default(),
            limits: config.limits,
            tracked: Mutex::new(FxHashMap::default()),
            headroom_callback: Mutex::new(None),
            pools: PoolSet::new(&config.pool_size_classes),
        }
    }

    pub fn set_debug(&self, enable: bool) {
        self.debug.store(enable, Ordering::Release);
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::Acquire)
    }

    /// Register the callback fired when headroom under the total ceiling
    /// drops below the configured threshold. Receives remaining bytes.
    pub fn on_low_headroom(&self, callback: impl Fn(usize) + Send + Sync + 'static) {
        *self.headroom_callback.lock() = Some(Box::new(callback));
    }

    /// Allocate a zero-initialized block. A zero-size request is defined
    /// to fail rather than produce an empty block.
    #[track_caller]
    pub fn alloc(&self, size: usize) -> Option<Allocation> {
        let site = Location::caller();
        self.alloc_at(size, site)
    }

    fn alloc_at(&self, size: usize, site: &'static Location<'static>) -> Option<Allocation> {
        if size == 0 {
            return None;
        }
        if !self.admit(size) {
            return None;
        }

        let bytes = match self.pools.acquire(size) {
            Some(mut recycled) => {
                recycled.fill(0);
                recycled
            }
            None => vec![0u8; size].into_boxed_slice(),
        };

        let id = AllocId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.record_alloc(size);
        if self.debug_enabled() {
            self.tracked.lock().insert(
                id,
                BlockInfo {
                    size,
                    site,
                    timestamp: unix_timestamp(),
                    generation: 0,
                    marked: false,
                    access: RefCount::new(0),
                },
            );
        }
        self.check_headroom();
        Some(Allocation { id, bytes })
    }

    /// Resize a block. Absent input behaves as `alloc`; a zero new size
    /// behaves as `free`; otherwise bytes up to `min(old, new)` are
    /// preserved and any growth is zero-filled.
    #[track_caller]
    pub fn realloc(&self, block: Option<Allocation>, new_size: usize) -> Option<Allocation> {
        let site = Location::caller();
        let Some(block) = block else {
            return self.alloc_at(new_size, site);
        };
        if new_size == 0 {
            self.free(Some(block));
            return None;
        }

        let mut grown = self.alloc_at(new_size, site)?;
        let keep = block.size().min(new_size);
        grown.data_mut()[..keep].copy_from_slice(&block.data()[..keep]);
        self.free(Some(block));
        Some(grown)
    }

    /// Return a block to the heap. Safe no-op on absent input.
    pub fn free(&self, block: Option<Allocation>) {
        let Some(block) = block else {
            return;
        };
        let size = block.size();
        if self.debug_enabled() {
            self.tracked.lock().remove(&block.id);
        }
        self.record_free(size);
        self.pools.recycle(block.bytes);
    }

    /// Duplicate a string through the heap. Absent input yields an absent
    /// result, not a fault.
    #[track_caller]
    pub fn string_dup(&self, source: Option<&str>) -> Option<HeapString> {
        let site = Location::caller();
        let source = source?;
        // An empty string still needs a live backing block (zero-size
        // allocations are defined to fail), so it occupies one byte.
        let size = source.len().max(1);
        let mut alloc = self.alloc_at(size, site)?;
        alloc.data_mut()[..source.len()].copy_from_slice(source.as_bytes());
        Some(HeapString {
            alloc,
            len: source.len(),
        })
    }

    /// Account `bytes` against the limits without handing out a block.
    /// Used by the AST arena for chunk growth; a `false` result means the
    /// caller must fail its own allocation cleanly.
    pub fn reserve(&self, bytes: usize) -> bool {
        if bytes == 0 {
            return true;
        }
        if !self.admit(bytes) {
            return false;
        }
        self.record_alloc(bytes);
        self.check_headroom();
        true
    }

    /// Release bytes previously accepted by [`Heap::reserve`].
    pub fn release(&self, bytes: usize) {
        if bytes > 0 {
            self.record_free(bytes);
        }
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            total_allocated: self.stats.total_allocated.load(Ordering::Relaxed),
            total_freed: self.stats.total_freed.load(Ordering::Relaxed),
            current_allocated: self.stats.current_allocated.load(Ordering::Relaxed),
            peak_allocated: self.stats.peak_allocated.load(Ordering::Relaxed),
            allocation_count: self.stats.allocation_count.load(Ordering::Relaxed),
            free_count: self.stats.free_count.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.stats.total_allocated.store(0, Ordering::Relaxed);
        self.stats.total_freed.store(0, Ordering::Relaxed);
        self.stats.current_allocated.store(0, Ordering::Relaxed);
        self.stats.peak_allocated.store(0, Ordering::Relaxed);
        self.stats.allocation_count.store(0, Ordering::Relaxed);
        self.stats.free_count.store(0, Ordering::Relaxed);
    }

    /// Number of live tracked blocks. Zero when debug mode is off.
    pub fn check_leaks(&self) -> usize {
        self.tracked.lock().len()
    }

    /// Human-readable report of every live tracked block.
    pub fn leak_report(&self) -> String {
        let tracked = self.tracked.lock();
        if tracked.is_empty() {
            return "no leaks detected\n".to_string();
        }
        let mut lines: Vec<String> = tracked
            .values()
            .map(|info| {
                format!(
                    "leak: {} bytes allocated at {}:{} (t={})",
                    info.size,
                    info.site.file(),
                    info.site.line(),
                    info.timestamp
                )
            })
            .collect();
        lines.sort();
        let total: usize = tracked.values().map(|info| info.size).sum();
        lines.push(format!("total: {} leaks, {} bytes", tracked.len(), total));
        lines.push(String::new());
        lines.join("\n")
    }

    /// True if the id refers to a live tracked block. Only meaningful in
    /// debug mode.
    pub fn is_tracked(&self, id: AllocId) -> bool {
        let tracked = self.tracked.lock();
        match tracked.get(&id) {
            Some(info) => {
                info.access.inc();
                true
            }
            None => false,
        }
    }

    /// Validate a tracked block's size. `expected_size == 0` skips the
    /// size check. Only meaningful in debug mode.
    pub fn validate(&self, id: AllocId, expected_size: usize) -> bool {
        let tracked = self.tracked.lock();
        match tracked.get(&id) {
            Some(info) => {
                info.access.inc();
                expected_size == 0 || info.size == expected_size
            }
            None => false,
        }
    }

    pub fn pool_stats(&self) -> Vec<PoolStats> {
        self.pools.stats()
    }

    /// Drop all pooled free blocks, returning the number of blocks
    /// released.
    pub fn shutdown_pools(&self) -> usize {
        self.pools.shutdown()
    }

    // Collector scaffolding hooks, used by `gc::Collector`.

    pub(crate) fn mark_block(&self, id: AllocId) -> bool {
        let mut tracked = self.tracked.lock();
        match tracked.get_mut(&id) {
            Some(info) => {
                info.marked = true;
                true
            }
            None => false,
        }
    }

    pub(crate) fn sweep_marks(&self, age_survivors: bool) -> usize {
        let mut tracked = self.tracked.lock();
        let mut survivors = 0;
        for info in tracked.values_mut() {
            if info.marked {
                info.marked = false;
                if age_survivors {
                    info.generation = info.generation.saturating_add(1);
                }
                survivors += 1;
            }
        }
        survivors
    }

    pub(crate) fn count_old_blocks(&self, min_generation: u8) -> usize {
        self.tracked
            .lock()
            .values()
            .filter(|info| info.generation >= min_generation)
            .count()
    }

    // ---- internals ----

    fn admit(&self, size: usize) -> bool {
        if let Some(max_single) = self.limits.max_allocation_bytes {
            if size > max_single {
                return false;
            }
        }
        if let Some(max_total) = self.limits.max_total_bytes {
            let current = self.stats.current_allocated.load(Ordering::Relaxed);
            if current.saturating_add(size) > max_total {
                return false;
            }
        }
        true
    }

    fn check_headroom(&self) {
        let (Some(max_total), Some(threshold)) =
            (self.limits.max_total_bytes, self.limits.low_headroom_bytes)
        else {
            return;
        };
        let current = self.stats.current_allocated.load(Ordering::Relaxed);
        let headroom = max_total.saturating_sub(current);
        if headroom < threshold {
            if let Some(callback) = self.headroom_callback.lock().as_ref() {
                callback(headroom);
            }
        }
    }

    fn record_alloc(&self, size: usize) {
        self.stats.total_allocated.fetch_add(size, Ordering::Relaxed);
        let current = self.stats.current_allocated.fetch_add(size, Ordering::Relaxed) + size;
        self.stats.allocation_count.fetch_add(1, Ordering::Relaxed);
        self.stats.peak_allocated.fetch_max(current, Ordering::Relaxed);
    }

    fn record_free(&self, size: usize) {
        self.stats.total_freed.fetch_add(size, Ordering::Relaxed);
        let _ = self
            .stats
            .current_allocated
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(size))
            });
        self.stats.free_count.fetch_add(1, Ordering::Relaxed);
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
