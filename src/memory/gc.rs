//! Collector scaffolding: root registration, mark bits, and a `collect`
//! entry point.
//!
//! The runtime's correctness does not depend on collection — values are
//! reference-counted and the heap tracks blocks for diagnostics. This
//! module keeps the instrumentation surface (roots, marks, generations)
//! so an embedder can wire a real collector in later; `collect` itself
//! reclaims nothing.

use parking_lot::Mutex;

use super::{AllocId, Heap};

#[derive(Debug, Clone, Copy)]
pub struct GcConfig {
    /// Collections are skipped entirely when disabled.
    pub enabled: bool,
    /// Generation at which a surviving block counts as old.
    pub promotion_generation: u8,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            enabled: true,
            promotion_generation: 2,
        }
    }
}

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectStats {
    pub roots: usize,
    pub marked: usize,
    /// Blocks that have survived enough cycles to count as old.
    pub promoted: usize,
    pub bytes_reclaimed: usize,
}

pub struct Collector {
    config: GcConfig,
    roots: Mutex<Vec<AllocId>>,
}

impl Collector {
    pub fn new(config: GcConfig) -> Self {
        Collector {
            config,
            roots: Mutex::new(Vec::new()),
        }
    }

    /// Replace the root set.
    pub fn set_roots(&self, roots: &[AllocId]) {
        *self.roots.lock() = roots.to_vec();
    }

    pub fn add_root(&self, root: AllocId) {
        self.roots.lock().push(root);
    }

    pub fn clear_roots(&self) {
        self.roots.lock().clear();
    }

    pub fn root_count(&self) -> usize {
        self.roots.lock().len()
    }

    /// Set the mark bit on a tracked block. Returns `false` for unknown
    /// blocks (including everything when heap debug mode is off).
    pub fn mark(&self, heap: &Heap, id: AllocId) -> bool {
        heap.mark_block(id)
    }

    /// Run a collection cycle: mark from the registered roots, then sweep
    /// the mark bits. A full cycle also ages the survivors' generation
    /// counters. Reclaims nothing — blocks are owned and reference-counted
    /// elsewhere — and reports zero bytes, which callers must tolerate.
    pub fn collect(&self, heap: &Heap, full: bool) -> CollectStats {
        if !self.config.enabled {
            return CollectStats::default();
        }

        let roots = self.roots.lock().clone();
        let mut marked = 0;
        for &root in &roots {
            if heap.mark_block(root) {
                marked += 1;
            }
        }
        heap.sweep_marks(full);
        let promoted = heap.count_old_blocks(self.config.promotion_generation);

        CollectStats {
            roots: roots.len(),
            marked,
            promoted,
            bytes_reclaimed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_collector_is_inert() {
        let heap = Heap::new();
        let collector = Collector::new(GcConfig {
            enabled: false,
            ..GcConfig::default()
        });
        assert_eq!(collector.collect(&heap, true), CollectStats::default());
    }

    #[test]
    fn collect_marks_registered_roots() {
        let heap = Heap::new();
        heap.set_debug(true);
        let block = heap.alloc(16).expect("alloc");

        let collector = Collector::new(GcConfig::default());
        collector.add_root(block.id());
        assert_eq!(collector.root_count(), 1);

        let stats = collector.collect(&heap, false);
        assert_eq!(stats.roots, 1);
        assert_eq!(stats.marked, 1);
        assert_eq!(stats.bytes_reclaimed, 0);

        heap.free(Some(block));
    }

    #[test]
    fn stale_roots_do_not_mark() {
        let heap = Heap::new();
        heap.set_debug(true);
        let block = heap.alloc(16).expect("alloc");
        let id = block.id();
        heap.free(Some(block));

        let collector = Collector::new(GcConfig::default());
        collector.set_roots(&[id]);
        let stats = collector.collect(&heap, true);
        assert_eq!(stats.marked, 0);
    }

    #[test]
    fn clear_roots_empties_the_set() {
        let collector = Collector::new(GcConfig::default());
        let heap = Heap::new();
        heap.set_debug(true);
        let block = heap.alloc(8).expect("alloc");
        collector.add_root(block.id());
        collector.clear_roots();
        assert_eq!(collector.root_count(), 0);
        heap.free(Some(block));
    }
}
