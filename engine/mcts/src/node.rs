//! MCTS tree node representation.
//!
//! Each node holds the position reached by playing `mv` from its parent.
//! Values are accumulated from the perspective of the player who made that
//! move, so a parent compares children by their mean value directly.

/// Index into the node arena. Using a newtype for type safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
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

/// A node in the MCTS tree.
#[derive(Debug, Clone)]
pub struct Node<S, A> {
    /// Position at this node
    pub position: S,

    /// Move that led here from the parent (None for root)
    pub mv: Option<A>,

    /// Parent node index (NONE for root)
    pub parent: NodeId,

    /// Children in legal-move order. Empty until expanded.
    pub children: Vec<NodeId>,

    /// Number of completed simulations through this node
    pub visit_count: u32,

    /// Sum of backed-up values, from the perspective of the player
    /// who moved into this node.
    pub value_sum: f32,

    /// Prior probability assigned by the parent's expansion
    pub prior: f32,

    /// Whether children have been created
    pub expanded: bool,

    /// Whether the position is game over
    pub is_terminal: bool,

    /// Outcome for the player to move here (only valid if is_terminal)
    pub terminal_value: f32,

    /// Pending evaluations whose path runs through this node
    pub in_flight: u32,
}

impl<S, A> Node<S, A> {
    /// Create a new root node.
    pub fn new_root(position: S, is_terminal: bool, terminal_value: f32) -> Self {
        Self {
            position,
            mv: None,
            parent: NodeId::NONE,
            children: Vec::new(),
            visit_count: 0,
            value_sum: 0.0,
            prior: 1.0,
            expanded: false,
            is_terminal,
            terminal_value,
            in_flight: 0,
        }
    }

    /// Create a new child node.
    pub fn new_child(
        parent: NodeId,
        mv: A,
        prior: f32,
        position: S,
        is_terminal: bool,
        terminal_value: f32,
    ) -> Self {
        Self {
            position,
            mv: Some(mv),
            parent,
            children: Vec::new(),
            visit_count: 0,
            value_sum: 0.0,
            prior,
            expanded: false,
            is_terminal,
            terminal_value,
            in_flight: 0,
        }
    }

    /// Calculate mean value Q = value_sum / visit_count.
    /// Returns 0.0 if never visited.
    #[inline]
    pub fn mean_value(&self) -> f32 {
        if self.visit_count == 0 {
            0.0
        } else {
            self.value_sum / self.visit_count as f32
        }
    }

    /// Visits including pending evaluations.
    #[inline]
    pub fn effective_visits(&self) -> u32 {
        self.visit_count + self.in_flight
    }

    /// Selection score used by the parent.
    ///
    /// `Q + c_puct * P * sqrt(N_parent) / (1 + N)`
    ///
    /// Each pending evaluation counts as a visit that lost `virtual_loss`,
    /// which steers concurrent selections away from unresolved paths.
    /// With nothing in flight this is exactly the textbook score.
    ///
    /// Takes pre-computed sqrt(parent_visits) to avoid redundant sqrt calls
    /// when comparing multiple children.
    #[inline]
    pub fn ucb_score(&self, parent_visits_sqrt: f32, c_puct: f32, virtual_loss: f32) -> f32 {
        let n = self.effective_visits();
        let q = if n == 0 {
            0.0
        } else {
            (self.value_sum - self.in_flight as f32 * virtual_loss) / n as f32
        };
        let u = c_puct * self.prior * parent_visits_sqrt / (1.0 + n as f32);
        q + u
    }

    #[inline]
    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    /// Check if this is a leaf node (not expanded or terminal).
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.is_terminal || !self.expanded || self.children.is_empty()
    }
}
