//! Tree nodes and the arena that owns them.
//!
//! Nodes are owned by a `Tree` arena and referenced by stable 32-bit ids;
//! the descent path is recorded explicitly, so nodes carry no parent
//! pointers. When transposition is allowed the arena doubles as a pool
//! keyed by Zobrist hash, letting distinct paths share subtrees.

use crate::types::{Move, Side};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8};
use std::sync::Arc;

pub(crate) type NodeId = u32;

pub(crate) const STATE_UNEVALUATED: u8 = 0;
pub(crate) const STATE_EVALUATING: u8 = 1;
pub(crate) const STATE_EXPANDED: u8 = 2;

/// Per-edge bookkeeping. Edge visits are kept on the parent rather than
/// the child so transposed children do not pollute PUCT statistics.
pub(crate) struct ChildEdge {
    pub id: NodeId,
    pub prior: f32,
    pub edge_visits: i64,
}

#[derive(Default)]
pub(crate) struct NodeStats {
    pub children: HashMap<Move, ChildEdge>,
    /// Raw network utility of this node's own evaluation, red-centric.
    pub nn_value: f64,
    pub visits: i64,
    pub weight_sum: f64,
    pub utility_avg: f64,
    pub utility_sq_avg: f64,
}

pub(crate) struct Node {
    pub mv: Move,
    pub next_to_move: Side,
    pub hash: u64,
    /// Unevaluated -> Evaluating -> Expanded; CAS guarantees one expander.
    pub state: AtomicU8,
    pub terminal: AtomicBool,
    pub virtual_losses: AtomicI32,
    pub stats: RwLock<NodeStats>,
}

impl Node {
    pub fn new(mv: Move, next_to_move: Side, hash: u64) -> Node {
        Node {
            mv,
            next_to_move,
            hash,
            state: AtomicU8::new(STATE_UNEVALUATED),
            terminal: AtomicBool::new(false),
            virtual_losses: AtomicI32::new(0),
            stats: RwLock::new(NodeStats::default()),
        }
    }
}

/// Arena plus optional hash pool. Append-only during a search; the engine
/// replaces the whole tree when the pool outgrows its bound.
pub struct Tree {
    arena: RwLock<Vec<Arc<Node>>>,
    by_hash: Mutex<HashMap<u64, NodeId>>,
    transposition: bool,
}

impl Tree {
    pub(crate) fn new(transposition: bool) -> Tree {
        Tree {
            arena: RwLock::new(Vec::with_capacity(1 << 12)),
            by_hash: Mutex::new(HashMap::with_capacity(1 << 12)),
            transposition,
        }
    }

    pub(crate) fn transposition(&self) -> bool {
        self.transposition
    }

    pub(crate) fn len(&self) -> usize {
        self.arena.read().len()
    }

    pub(crate) fn get(&self, id: NodeId) -> Arc<Node> {
        Arc::clone(&self.arena.read()[id as usize])
    }

    pub(crate) fn alloc(&self, node: Node) -> NodeId {
        let mut arena = self.arena.write();
        let id = arena.len() as NodeId;
        arena.push(Arc::new(node));
        id
    }

    /// Pool lookup in transposition mode; plain allocation otherwise.
    pub(crate) fn get_or_alloc(&self, hash: u64, make: impl FnOnce() -> Node) -> NodeId {
        if !self.transposition {
            return self.alloc(make());
        }
        let mut pool = self.by_hash.lock();
        if let Some(&id) = pool.get(&hash) {
            return id;
        }
        let id = self.alloc(make());
        pool.insert(hash, id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_shares_nodes_by_hash() {
        let tree = Tree::new(true);
        let a = tree.get_or_alloc(42, || Node::new(Move::NONE, Side::Red, 42));
        let b = tree.get_or_alloc(42, || Node::new(Move::NONE, Side::Red, 42));
        assert_eq!(a, b);
        let c = tree.get_or_alloc(43, || Node::new(Move::NONE, Side::Black, 43));
        assert_ne!(a, c);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn without_transposition_every_alloc_is_fresh() {
        let tree = Tree::new(false);
        let a = tree.get_or_alloc(42, || Node::new(Move::NONE, Side::Red, 42));
        let b = tree.get_or_alloc(42, || Node::new(Move::NONE, Side::Red, 42));
        assert_ne!(a, b);
    }
}
