//! The consistency analyst: turns a completed operation history into a
//! verdict.
//!
//! The analyst decides whether a total order of the recorded operations
//! exists that (a) respects every real-time-certain ordering and (b) assigns
//! each read the value of the most recently ordered write, with no other
//! write legally interposable. It builds three edge classes over the same
//! vertex set — time, data, and hybrid — and looks for a cycle in their
//! union; a cycle is conclusive proof that no such order exists.
//!
//! Analysis is a one-shot batch pass over the whole collected history. It
//! must never run concurrently with load generation; by the time the analyst
//! owns the graph, generation has fully stopped.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

use tracing::info;

use crate::graph::{CycleDetected, DfsVisitor, DirectedGraph, NoopVisitor, VertexId, VisitTable};
use crate::record::OpRecord;
use crate::verdict::Violation;

/// Advisory per-phase diagnostics from one analysis pass.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// Vertices analyzed (operation records, including the synthetic initial
    /// write).
    pub vertices: usize,
    /// Time edges added (real-time-certain precedence).
    pub time_edges: usize,
    /// Data edges resolved (one dictator lookup per read).
    pub data_edges: usize,
    /// Distinct hybrid edges derived.
    pub hybrid_edges: usize,
    /// Wall time of the time-edge pass.
    pub time_phase: Duration,
    /// Wall time of the data-edge pass.
    pub data_phase: Duration,
    /// Wall time of the hybrid-edge pass.
    pub hybrid_phase: Duration,
    /// Wall time of the final cycle sweep.
    pub cycle_phase: Duration,
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} vertices, {} time edges ({:?}), {} data edges ({:?}), {} hybrid edges ({:?}), cycle sweep {:?}",
            self.vertices,
            self.time_edges,
            self.time_phase,
            self.data_edges,
            self.data_phase,
            self.hybrid_edges,
            self.hybrid_phase,
            self.cycle_phase,
        )
    }
}

/// Tracks the stack of currently open writers across the hybrid-edge
/// traversals and collects the edges to apply afterwards.
struct OpenWriterVisitor<'a> {
    graph: &'a DirectedGraph<OpRecord>,
    dictators: &'a HashMap<String, VertexId>,
    open_writers: Vec<VertexId>,
    met_writers: HashSet<VertexId>,
    seen: HashSet<(VertexId, VertexId)>,
    pending: Vec<(VertexId, VertexId)>,
}

impl DfsVisitor for OpenWriterVisitor<'_> {
    fn enter(&mut self, vertex: VertexId) {
        let record = self.graph.value(vertex);
        if record.is_read() {
            // The data pass already proved every read has a dictator.
            if let Some(&dictator) = self.dictators.get(&record.value) {
                for &writer in &self.open_writers {
                    if writer != dictator && self.seen.insert((writer, dictator)) {
                        self.pending.push((writer, dictator));
                    }
                }
            }
        } else {
            self.met_writers.insert(vertex);
            self.open_writers.push(vertex);
        }
    }

    fn leave(&mut self, vertex: VertexId) {
        if !self.graph.value(vertex).is_read() {
            self.open_writers.pop();
        }
    }
}

/// Decides atomicity of one recorded history.
#[derive(Debug, Default)]
pub struct ConsistencyAnalyst {
    graph: DirectedGraph<OpRecord>,
}

impl ConsistencyAnalyst {
    /// Create an analyst with an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a graph filled by the load generator.
    pub fn from_graph(graph: DirectedGraph<OpRecord>) -> Self {
        Self { graph }
    }

    /// Append one operation record as a fresh vertex.
    pub fn add_record(&mut self, record: OpRecord) -> VertexId {
        self.graph.add_vertex(record)
    }

    /// The underlying precedence graph.
    pub fn graph(&self) -> &DirectedGraph<OpRecord> {
        &self.graph
    }

    /// Run the full three-pass edge construction and cycle sweep.
    ///
    /// Returns the advisory report on a consistent history, or the first
    /// violation found. Running it again over the same vertex set yields the
    /// same verdict: edge sets deduplicate and every pass re-derives the same
    /// constraints.
    pub fn analyze(&mut self) -> Result<AnalysisReport, Violation> {
        let vertices = self.graph.len();

        let mut by_start: Vec<VertexId> = self.graph.vertex_ids().collect();
        by_start.sort_by_key(|&id| self.graph.value(id).start);
        let mut by_end_desc = by_start.clone();
        by_end_desc.sort_by(|&a, &b| self.graph.value(b).end.cmp(&self.graph.value(a).end));

        info!("adding time edges");
        let clock = Instant::now();
        let dictators = self.add_time_edges(&by_start, &by_end_desc);
        let time_edges = self.graph.edge_count();
        let time_phase = clock.elapsed();

        info!("adding data edges");
        let clock = Instant::now();
        let data_edges = self.add_data_edges(&by_start, &dictators)?;
        let data_phase = clock.elapsed();

        info!("adding hybrid edges");
        let clock = Instant::now();
        self.add_hybrid_edges(&by_start, &dictators)?;
        let hybrid_edges = self.graph.hybrid_edge_count();
        let hybrid_phase = clock.elapsed();

        info!("finding cycles");
        let clock = Instant::now();
        self.check_cycles()?;
        let cycle_phase = clock.elapsed();

        Ok(AnalysisReport {
            vertices,
            time_edges,
            data_edges,
            hybrid_edges,
            time_phase,
            data_phase,
            hybrid_phase,
            cycle_phase,
        })
    }

    /// Pass 1: real-time-certain precedence, plus dictator registration.
    ///
    /// For each "later" vertex in ascending `start` order, scan candidates in
    /// descending `end` order, skipping those that do not certainly precede
    /// it. Each qualifying candidate gets an edge; the running bound (the
    /// maximum candidate `start` seen) lets the scan stop as soon as a
    /// candidate's `end` no longer exceeds it, because everything further is
    /// already covered transitively through a closer predecessor.
    fn add_time_edges(
        &mut self,
        by_start: &[VertexId],
        by_end_desc: &[VertexId],
    ) -> HashMap<String, VertexId> {
        let mut dictators = HashMap::new();

        for &later in by_start {
            let (later_start, later_is_read, later_value) = {
                let record = self.graph.value(later);
                (record.start, record.is_read(), record.value.clone())
            };
            if !later_is_read {
                dictators.insert(later_value, later);
            }

            let mut left_bound = 0u64;
            for &earlier in by_end_desc {
                let (earlier_start, earlier_end) = {
                    let record = self.graph.value(earlier);
                    (record.start, record.end)
                };
                if earlier_end >= later_start {
                    continue;
                }
                if earlier_end > left_bound {
                    self.graph.add_edge(earlier, later);
                    left_bound = left_bound.max(earlier_start);
                } else {
                    break;
                }
            }
        }

        dictators
    }

    /// Pass 2: one edge from each read's dictator to the read. A read whose
    /// value was never written is itself conclusive.
    fn add_data_edges(
        &mut self,
        by_start: &[VertexId],
        dictators: &HashMap<String, VertexId>,
    ) -> Result<usize, Violation> {
        let mut resolved = 0;

        for &reader in by_start {
            let (is_read, value) = {
                let record = self.graph.value(reader);
                (record.is_read(), record.value.clone())
            };
            if !is_read {
                continue;
            }
            match dictators.get(&value) {
                Some(&writer) => {
                    self.graph.add_edge(writer, reader);
                    resolved += 1;
                }
                None => {
                    return Err(Violation::MissingDictator {
                        value,
                        read: self.graph.value(reader).clone(),
                    });
                }
            }
        }

        Ok(resolved)
    }

    /// Pass 3: derived precedence through observed writes.
    ///
    /// One traversal per not-yet-met write root, ascending by `start`, each
    /// with a fresh visit table; the open-writer stack and met-writer set are
    /// shared across roots. If a write W is an ancestor of a read attributed
    /// to dictator D, any legal total order must place W before D, so W gets
    /// a hybrid edge to D. Pending edges are applied after the traversals;
    /// the traversals themselves follow hard edges only.
    fn add_hybrid_edges(
        &mut self,
        by_start: &[VertexId],
        dictators: &HashMap<String, VertexId>,
    ) -> Result<(), Violation> {
        let mut visitor = OpenWriterVisitor {
            graph: &self.graph,
            dictators,
            open_writers: Vec::new(),
            met_writers: HashSet::new(),
            seen: HashSet::new(),
            pending: Vec::new(),
        };

        for &root in by_start {
            if self.graph.value(root).is_read() || visitor.met_writers.contains(&root) {
                continue;
            }
            let mut table = VisitTable::new(self.graph.len());
            if let Err(cycle) = self.graph.dfs_from(root, &mut table, &mut visitor) {
                return Err(self.cycle_violation(cycle));
            }
        }

        let pending = visitor.pending;
        for (from, to) in pending {
            self.graph.add_hybrid_edge(from, to);
        }
        Ok(())
    }

    /// Pass 4 and 5: fold hybrid edges into the hard set and sweep the whole
    /// graph for a back edge.
    fn check_cycles(&mut self) -> Result<(), Violation> {
        self.graph.merge_hybrid_edges();
        let mut table = VisitTable::new(self.graph.len());
        let mut visitor = NoopVisitor;
        self.graph
            .dfs_all(&mut table, &mut visitor)
            .map_err(|cycle| self.cycle_violation(cycle))
    }

    fn cycle_violation(&self, cycle: CycleDetected) -> Violation {
        Violation::Cycle {
            from: self.graph.value(cycle.from).clone(),
            to: self.graph.value(cycle.to).clone(),
        }
    }
}
