//! MCTS tree node representation.
//!
//! Each node represents a position reached by playing `mv` from the parent.
//! All statistics are atomics so worker threads can update a shared tree
//! without locks; children are published once through a `OnceLock`.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::OnceLock;

use chess::ChessMove;

/// Index into the node arena. Using a newtype for type safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const NONE: NodeId = NodeId(u32::MAX);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    pub fn is_some(self) -> bool {
        !self.is_none()
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Expansion / terminal tag of a node.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Unexpanded = 0,
    Expanded = 1,
    Win = 2,
    Loss = 3,
    Draw = 4,
}

impl NodeState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => NodeState::Expanded,
            2 => NodeState::Win,
            3 => NodeState::Loss,
            4 => NodeState::Draw,
            _ => NodeState::Unexpanded,
        }
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeState::Win | NodeState::Loss | NodeState::Draw)
    }

    /// Exact value for the side to move at a terminal node.
    pub fn terminal_value(self) -> Option<f32> {
        match self {
            NodeState::Win => Some(1.0),
            NodeState::Loss => Some(-1.0),
            NodeState::Draw => Some(0.0),
            NodeState::Unexpanded | NodeState::Expanded => None,
        }
    }
}

/// Lock-free f32 accumulator stored as bits in an `AtomicU32`.
#[derive(Debug, Default)]
pub struct AtomicF32 {
    bits: AtomicU32,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn load(&self, ordering: Ordering) -> f32 {
        f32::from_bits(self.bits.load(ordering))
    }

    /// Compare-and-swap add; returns the previous value.
    #[inline]
    pub fn fetch_add(&self, delta: f32, ordering: Ordering) -> f32 {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = (f32::from_bits(current) + delta).to_bits();
            match self
                .bits
                .compare_exchange_weak(current, next, ordering, Ordering::Relaxed)
            {
                Ok(previous) => return f32::from_bits(previous),
                Err(actual) => current = actual,
            }
        }
    }
}

/// A node in the shared MCTS tree.
#[derive(Debug)]
pub struct MctsNode {
    /// Parent node index (NONE for root)
    pub parent: NodeId,

    /// Move that led here from the parent (None for root)
    pub mv: Option<ChessMove>,

    /// Prior probability from the policy head, renormalized over legal moves.
    pub prior: f32,

    /// Creation index within the tree; lower wins selection ties.
    pub build_order: u64,

    visits: AtomicU32,
    value_sum: AtomicF32,
    virtual_loss: AtomicU32,
    /// Simulations that ended at this node (evaluation or terminal hit).
    leaf_visits: AtomicU32,
    state: AtomicU8,
    children: OnceLock<Box<[NodeId]>>,
}

impl MctsNode {
    /// Create a new root node.
    pub fn new_root(build_order: u64) -> Self {
        Self::new_child(NodeId::NONE, None, 1.0, build_order)
    }

    /// Create a new child node.
    pub fn new_child(parent: NodeId, mv: Option<ChessMove>, prior: f32, build_order: u64) -> Self {
        Self {
            parent,
            mv,
            prior,
            build_order,
            visits: AtomicU32::new(0),
            value_sum: AtomicF32::new(0.0),
            virtual_loss: AtomicU32::new(0),
            leaf_visits: AtomicU32::new(0),
            state: AtomicU8::new(NodeState::Unexpanded as u8),
            children: OnceLock::new(),
        }
    }

    #[inline]
    pub fn visits(&self) -> u32 {
        self.visits.load(Ordering::Acquire)
    }

    #[inline]
    pub fn leaf_visits(&self) -> u32 {
        self.leaf_visits.load(Ordering::Acquire)
    }

    #[inline]
    pub fn virtual_loss(&self) -> u32 {
        self.virtual_loss.load(Ordering::Acquire)
    }

    #[inline]
    pub fn value_sum(&self) -> f32 {
        self.value_sum.load(Ordering::Acquire)
    }

    /// Mean backed-up value from this node's side to move.
    /// Returns 0.0 if never visited.
    #[inline]
    pub fn mean_value(&self) -> f32 {
        let visits = self.visits();
        if visits == 0 {
            0.0
        } else {
            self.value_sum() / visits as f32
        }
    }

    #[inline]
    pub fn state(&self) -> NodeState {
        NodeState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Children in build order, once the node has been expanded.
    #[inline]
    pub fn children(&self) -> Option<&[NodeId]> {
        self.children.get().map(|c| &c[..])
    }

    /// PUCT score of this node as seen from its parent.
    ///
    /// The stored value is from this node's side to move, so it is negated
    /// for the parent. Unvisited nodes contribute Q = 0.
    #[inline]
    pub fn puct_score(&self, parent_sqrt: f32, c_puct: f32) -> f32 {
        let q = -self.mean_value();
        let pending = (self.visits() + self.virtual_loss()) as f32;
        q + c_puct * self.prior * parent_sqrt / (1.0 + pending)
    }

    #[inline]
    pub fn add_virtual_loss(&self) {
        self.virtual_loss.fetch_add(1, Ordering::AcqRel);
    }

    /// Remove one unit of virtual loss. Never underflows.
    #[inline]
    pub fn remove_virtual_loss(&self) {
        let _ = self
            .virtual_loss
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |vl| vl.checked_sub(1));
    }

    /// Record one completed simulation passing through this node.
    #[inline]
    pub(crate) fn record(&self, value: f32) {
        self.value_sum.fetch_add(value, Ordering::AcqRel);
        self.visits.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    pub(crate) fn record_leaf(&self) {
        self.leaf_visits.fetch_add(1, Ordering::AcqRel);
    }

    /// Publish children; first writer wins. Returns true if `make` ran.
    pub(crate) fn publish_children(&self, make: impl FnOnce() -> Box<[NodeId]>) -> bool {
        let mut created = false;
        self.children.get_or_init(|| {
            created = true;
            make()
        });
        self.state
            .store(NodeState::Expanded as u8, Ordering::Release);
        created
    }

    /// Tag an unexpanded node as terminal. Returns false if another state
    /// was already set.
    pub(crate) fn mark_terminal(&self, state: NodeState) -> bool {
        debug_assert!(state.is_terminal());
        self.state
            .compare_exchange(
                NodeState::Unexpanded as u8,
                state as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}
