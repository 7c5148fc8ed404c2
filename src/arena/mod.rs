//! Pooled storage for AST nodes.
//!
//! Every node variant lives in one fixed-size slot, so all nodes are
//! served from a common pool regardless of kind. A small fixed number of
//! pools, each behind its own mutex, keeps unrelated allocations from
//! contending; assignment is round-robin and otherwise uninterested in
//! what the node is. Slots carry an epoch tag, which makes releasing a
//! node twice — or resolving a stale handle — an O(1) detected error
//! instead of a free-list corruption.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::ast::Node;
use crate::memory::Heap;

/// Handle to a node stored in a [`NodeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pool: u8,
    slot: u32,
    epoch: u32,
}

/// Number of per-arena pools. Purely a contention knob.
const POOL_COUNT: usize = 4;
/// Nodes in a pool's first chunk; each further chunk doubles, capped.
const INITIAL_CHUNK_NODES: usize = 64;
const MAX_CHUNK_NODES: usize = 4096;

struct Slot {
    epoch: u32,
    node: Option<Node>,
}

struct PoolInner {
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Sizes of the chunks grown so far.
    chunks: Vec<usize>,
    next_chunk_nodes: usize,
}

impl PoolInner {
    fn new() -> Self {
        PoolInner {
            slots: Vec::new(),
            free: Vec::new(),
            chunks: Vec::new(),
            next_chunk_nodes: INITIAL_CHUNK_NODES,
        }
    }

    fn expand(&mut self, heap: &Heap) -> bool {
        let count = self.next_chunk_nodes;
        if !heap.reserve(count * std::mem::size_of::<Slot>()) {
            return false;
        }
        let base = self.slots.len() as u32;
        self.slots
            .extend((0..count).map(|_| Slot { epoch: 0, node: None }));
        // Freshly grown slots go on the free list newest-first so the
        // next acquisitions reuse a contiguous run.
        self.free.extend((0..count as u32).rev().map(|i| base + i));
        self.chunks.push(count);
        self.next_chunk_nodes = (self.next_chunk_nodes * 2).min(MAX_CHUNK_NODES);
        true
    }
}

/// Per-pool usage snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaPoolStats {
    pub chunks: usize,
    pub capacity: usize,
    pub free: usize,
    pub live: usize,
}

/// The node allocator. Cheap to share; all methods take `&self`.
pub struct NodeArena {
    heap: Arc<Heap>,
    pools: Vec<Mutex<PoolInner>>,
    cursor: AtomicUsize,
}

impl NodeArena {
    pub fn new(heap: Arc<Heap>) -> Self {
        NodeArena {
            heap,
            pools: (0..POOL_COUNT).map(|_| Mutex::new(PoolInner::new())).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Store a node, expanding the chosen pool if its free list is empty.
    /// Fails only if expansion is refused by the heap limits.
    pub fn acquire(&self, node: Node) -> Option<NodeId> {
        let pool_index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.pools.len();
        let mut pool = self.pools[pool_index].lock();

        if pool.free.is_empty() && !pool.expand(&self.heap) {
            return None;
        }

        let slot_index = pool.free.pop()?;
        let slot = &mut pool.slots[slot_index as usize];
        slot.node = Some(node);
        Some(NodeId {
            pool: pool_index as u8,
            slot: slot_index,
            epoch: slot.epoch,
        })
    }

    /// Return a node's slot to its pool. A second release of the same id,
    /// or a release through a stale id, is rejected without touching the
    /// free list.
    pub fn release(&self, id: NodeId) -> bool {
        let Some(pool) = self.pools.get(id.pool as usize) else {
            return false;
        };
        let mut pool = pool.lock();
        let Some(slot) = pool.slots.get_mut(id.slot as usize) else {
            return false;
        };
        if slot.epoch != id.epoch || slot.node.is_none() {
            return false;
        }
        slot.node = None;
        slot.epoch = slot.epoch.wrapping_add(1);
        pool.free.push(id.slot);
        true
    }

    /// Resolve a handle to a copy of its node. Released or stale handles
    /// resolve to `None` — the use-after-free tripwire.
    pub fn get(&self, id: NodeId) -> Option<Node> {
        let pool = self.pools.get(id.pool as usize)?.lock();
        let slot = pool.slots.get(id.slot as usize)?;
        if slot.epoch != id.epoch {
            return None;
        }
        slot.node.clone()
    }

    /// Total live nodes across all pools.
    pub fn live_nodes(&self) -> usize {
        self.pools
            .iter()
            .map(|pool| {
                let pool = pool.lock();
                pool.slots.len() - pool.free.len()
            })
            .sum()
    }

    pub fn pool_stats(&self) -> Vec<ArenaPoolStats> {
        self.pools
            .iter()
            .map(|pool| {
                let pool = pool.lock();
                ArenaPoolStats {
                    chunks: pool.chunks.len(),
                    capacity: pool.slots.len(),
                    free: pool.free.len(),
                    live: pool.slots.len() - pool.free.len(),
                }
            })
            .collect()
    }

    /// All live node ids, in pool/slot order. Supports the CLI's AST dump.
    pub fn live_ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::new();
        for (pool_index, pool) in self.pools.iter().enumerate() {
            let pool = pool.lock();
            for (slot_index, slot) in pool.slots.iter().enumerate() {
                if slot.node.is_some() {
                    ids.push(NodeId {
                        pool: pool_index as u8,
                        slot: slot_index as u32,
                        epoch: slot.epoch,
                    });
                }
            }
        }
        ids
    }
}

impl Drop for NodeArena {
    fn drop(&mut self) {
        for pool in &self.pools {
            let pool = pool.lock();
            let slots: usize = pool.chunks.iter().sum();
            self.heap.release(slots * std::mem::size_of::<Slot>());
        }
    }
}
