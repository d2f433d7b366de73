//! Insertion-ordered directed graph with cycle-detecting depth-first
//! traversal.
//!
//! Vertices live in an arena and are referenced by index, so edge sets and
//! traversal stacks never deal in object identity. Each vertex owns two edge
//! sets: *hard* edges (never removed) and *hybrid* edges, which are kept
//! separate while they are being derived and folded into the hard set with
//! [`DirectedGraph::merge_hybrid_edges`] before the final traversal.
//!
//! Traversal is iterative over an explicit frame stack, so histories of any
//! realistic size cannot exhaust the call stack. Visitation state lives in an
//! explicit [`VisitTable`] passed by the caller, which keeps the graph itself
//! reusable across passes.

use std::collections::BTreeSet;
use std::fmt;

/// Index-based handle to a vertex in a [`DirectedGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId(usize);

impl VertexId {
    /// The arena index of this vertex.
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Vertex<T> {
    value: T,
    edges: BTreeSet<VertexId>,
    hybrid_edges: BTreeSet<VertexId>,
}

/// Three-coloring of a traversal: not yet reached, on the current path, or
/// fully explored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitState {
    /// Not yet reached by any traversal using this table.
    New,
    /// Currently on the traversal path; an edge back here is a cycle.
    Open,
    /// Subtree fully explored.
    Done,
}

/// Visitation-state table for one or more rooted traversals.
///
/// Reusing one table across several [`DirectedGraph::dfs_from`] calls makes
/// them behave as a single forest traversal: vertices finished under an
/// earlier root are skipped under later ones.
#[derive(Debug, Clone)]
pub struct VisitTable {
    states: Vec<VisitState>,
}

impl VisitTable {
    /// Create a table for a graph of `len` vertices, all unvisited.
    pub fn new(len: usize) -> Self {
        Self {
            states: vec![VisitState::New; len],
        }
    }

    /// The state of `id`.
    pub fn state(&self, id: VertexId) -> VisitState {
        self.states[id.0]
    }

    fn set(&mut self, id: VertexId, state: VisitState) {
        self.states[id.0] = state;
    }
}

/// Callbacks invoked as a depth-first traversal enters and leaves vertices.
///
/// `enter` fires when a vertex is first reached (colored `Open`); `leave`
/// fires when its subtree is complete (colored `Done`). The pairing is what
/// makes an explicit "currently open" stack possible in callers.
pub trait DfsVisitor {
    /// Vertex first reached.
    fn enter(&mut self, _vertex: VertexId) {}
    /// Vertex subtree completed.
    fn leave(&mut self, _vertex: VertexId) {}
}

/// Visitor that does nothing; used for pure cycle checks.
#[derive(Debug, Default)]
pub struct NoopVisitor;

impl DfsVisitor for NoopVisitor {}

/// A back edge found during traversal: `from` has an edge to `to`, which is
/// still on the traversal path. Proof that the graph has a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleDetected {
    /// Tail of the back edge.
    pub from: VertexId,
    /// Head of the back edge, an ancestor still being explored.
    pub to: VertexId,
}

impl fmt::Display for CycleDetected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycle closed by edge {} -> {}",
            self.from.0, self.to.0
        )
    }
}

impl std::error::Error for CycleDetected {}

/// An insertion-ordered collection of vertices with hard and hybrid edges.
#[derive(Debug, Clone)]
pub struct DirectedGraph<T> {
    vertices: Vec<Vertex<T>>,
}

impl<T> Default for DirectedGraph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DirectedGraph<T> {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
        }
    }

    /// Append a vertex and return its handle.
    pub fn add_vertex(&mut self, value: T) -> VertexId {
        let id = VertexId(self.vertices.len());
        self.vertices.push(Vertex {
            value,
            edges: BTreeSet::new(),
            hybrid_edges: BTreeSet::new(),
        });
        id
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Whether the graph has no vertices.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Payload of `id`.
    pub fn value(&self, id: VertexId) -> &T {
        &self.vertices[id.0].value
    }

    /// All vertex handles in insertion order.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        (0..self.vertices.len()).map(VertexId)
    }

    /// Add a hard edge `from -> to`. Duplicates are ignored.
    pub fn add_edge(&mut self, from: VertexId, to: VertexId) {
        self.vertices[from.0].edges.insert(to);
    }

    /// Add a hybrid edge `from -> to`. Hybrid edges are not followed by
    /// traversal until merged into the hard set.
    pub fn add_hybrid_edge(&mut self, from: VertexId, to: VertexId) {
        self.vertices[from.0].hybrid_edges.insert(to);
    }

    /// Whether a hard edge `from -> to` exists.
    pub fn has_edge(&self, from: VertexId, to: VertexId) -> bool {
        self.vertices[from.0].edges.contains(&to)
    }

    /// Whether a hybrid edge `from -> to` exists.
    pub fn has_hybrid_edge(&self, from: VertexId, to: VertexId) -> bool {
        self.vertices[from.0].hybrid_edges.contains(&to)
    }

    /// Total number of hard edges.
    pub fn edge_count(&self) -> usize {
        self.vertices.iter().map(|v| v.edges.len()).sum()
    }

    /// Total number of hybrid edges.
    pub fn hybrid_edge_count(&self) -> usize {
        self.vertices.iter().map(|v| v.hybrid_edges.len()).sum()
    }

    /// Hard-edge successors of `id`, in ascending vertex order.
    pub fn neighbors(&self, id: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices[id.0].edges.iter().copied()
    }

    /// Fold every vertex's hybrid edges into its hard edges.
    pub fn merge_hybrid_edges(&mut self) {
        for vertex in &mut self.vertices {
            let hybrid = std::mem::take(&mut vertex.hybrid_edges);
            vertex.edges.extend(hybrid);
        }
    }

    /// Depth-first traversal rooted at `root`, following hard edges only.
    ///
    /// Skips immediately if `root` is already `Done` in `table`. The visitor's
    /// `enter`/`leave` callbacks bracket each vertex's subtree. Returns
    /// [`CycleDetected`] on the first back edge; the table is left partially
    /// colored in that case.
    pub fn dfs_from<V: DfsVisitor>(
        &self,
        root: VertexId,
        table: &mut VisitTable,
        visitor: &mut V,
    ) -> Result<(), CycleDetected> {
        if table.state(root) != VisitState::New {
            return Ok(());
        }

        // Each frame is a vertex plus a cursor into a snapshot of its
        // successors, taken when the frame is pushed.
        let mut stack: Vec<(VertexId, Vec<VertexId>, usize)> = Vec::new();

        table.set(root, VisitState::Open);
        visitor.enter(root);
        stack.push((root, self.neighbors(root).collect(), 0));

        loop {
            // Advance the cursor of the top frame, if it has successors left.
            let step = {
                let Some((vertex, successors, cursor)) = stack.last_mut() else {
                    break;
                };
                if *cursor < successors.len() {
                    let next = successors[*cursor];
                    *cursor += 1;
                    Some((*vertex, next))
                } else {
                    None
                }
            };

            match step {
                Some((vertex, next)) => match table.state(next) {
                    VisitState::Open => {
                        return Err(CycleDetected {
                            from: vertex,
                            to: next,
                        });
                    }
                    VisitState::Done => {}
                    VisitState::New => {
                        table.set(next, VisitState::Open);
                        visitor.enter(next);
                        stack.push((next, self.neighbors(next).collect(), 0));
                    }
                },
                None => {
                    if let Some((vertex, _, _)) = stack.pop() {
                        table.set(vertex, VisitState::Done);
                        visitor.leave(vertex);
                    }
                }
            }
        }

        Ok(())
    }

    /// Traverse the whole graph as one forest, rooting at each unvisited
    /// vertex in insertion order.
    pub fn dfs_all<V: DfsVisitor>(
        &self,
        table: &mut VisitTable,
        visitor: &mut V,
    ) -> Result<(), CycleDetected> {
        for id in self.vertex_ids() {
            self.dfs_from(id, table, visitor)?;
        }
        Ok(())
    }
}
