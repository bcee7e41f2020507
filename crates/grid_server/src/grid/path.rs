//! Dijkstra-based distance queries over a [`SpatialGraph`].
//!
//! Both queries share one relaxation loop. A cell is settled the first time
//! it is popped; stale queue entries for settled cells are skipped rather
//! than decreased in place. Every settled distance is added to a running
//! total, which is what a one-to-all query returns and what a one-to-one
//! query falls back to when the destination is never reached.
//!
//! All arithmetic is unsigned integer arithmetic. Queue entries are ordered
//! by `(distance, cell id)`, so pop order is fully determined by the graph.

use super::cell::CellId;
use super::graph::SpatialGraph;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// State of one single-source search.
#[derive(Debug)]
pub struct Search<'g> {
    graph: &'g SpatialGraph,
    queue: BinaryHeap<Reverse<(u64, CellId)>>,
    tentative: HashMap<CellId, u64>,
    settled: HashSet<CellId>,
    settled_total: u64,
}

impl<'g> Search<'g> {
    pub fn new(graph: &'g SpatialGraph, origin: CellId) -> Self {
        let mut queue = BinaryHeap::with_capacity(graph.len().max(16));
        queue.push(Reverse((0, origin)));

        let mut tentative = HashMap::with_capacity(graph.len());
        tentative.insert(origin, 0);

        Self {
            graph,
            queue,
            tentative,
            settled: HashSet::with_capacity(graph.len()),
            settled_total: 0,
        }
    }

    /// Runs the relaxation loop.
    ///
    /// With a `target` the loop stops as soon as the target is settled and
    /// returns its distance. Otherwise, or if the queue drains first, the
    /// sum of all settled distances is returned.
    pub fn run(&mut self, target: Option<CellId>) -> u64 {
        while let Some(Reverse((distance, current))) = self.queue.pop() {
            if !self.settled.insert(current) {
                continue;
            }
            self.settled_total = self.settled_total.saturating_add(distance);

            if target == Some(current) {
                return distance;
            }

            let Some(cell) = self.graph.cell(current) else {
                continue;
            };

            for (&neighbor, edge) in cell.edges() {
                if self.settled.contains(&neighbor) {
                    continue;
                }

                let candidate = distance.saturating_add(edge.weight());
                let improved = self
                    .tentative
                    .get(&neighbor)
                    .map_or(true, |&known| candidate < known);

                if improved {
                    self.tentative.insert(neighbor, candidate);
                    self.queue.push(Reverse((candidate, neighbor)));
                }
            }
        }

        self.settled_total
    }

    pub fn is_settled(&self, cell: CellId) -> bool {
        self.settled.contains(&cell)
    }

    /// Final distance of a settled cell.
    pub fn distance(&self, cell: CellId) -> Option<u64> {
        self.is_settled(cell)
            .then(|| self.tentative.get(&cell).copied())
            .flatten()
    }

    pub fn settled_count(&self) -> usize {
        self.settled.len()
    }

    /// Sum of the distances of every cell settled so far.
    pub fn settled_total(&self) -> u64 {
        self.settled_total
    }
}

/// Shortest distance from `origin` to `destination`.
///
/// When `destination` is unreachable the result is the settle-order total
/// of everything reachable from `origin`; use [`Search`] directly to tell
/// the two cases apart.
pub fn shortest_distance(graph: &SpatialGraph, origin: CellId, destination: CellId) -> u64 {
    Search::new(graph, origin).run(Some(destination))
}

/// Sum of the shortest distances of every cell reachable from `origin`,
/// accumulated in settle order by a single search.
pub fn total_distance(graph: &SpatialGraph, origin: CellId) -> u64 {
    Search::new(graph, origin).run(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Point;

    /// Cell `i` of the test graphs sits alone at x = i * 5000.
    fn cell(graph: &mut SpatialGraph, i: u32) -> CellId {
        graph.resolve(Point::new(i * 5_000, 0))
    }

    fn edge(graph: &mut SpatialGraph, from: u32, to: u32, weight: u64) {
        let a = cell(graph, from);
        let b = cell(graph, to);
        graph.add_edge(a, b, weight);
    }

    /// 0 -> 1 (4), 0 -> 2 (1), 2 -> 1 (2), 1 -> 3 (5), 2 -> 3 (8)
    fn diamond() -> SpatialGraph {
        let mut graph = SpatialGraph::new();
        edge(&mut graph, 0, 1, 4);
        edge(&mut graph, 0, 2, 1);
        edge(&mut graph, 2, 1, 2);
        edge(&mut graph, 1, 3, 5);
        edge(&mut graph, 2, 3, 8);
        graph
    }

    fn id(i: u32) -> CellId {
        CellId::containing(Point::new(i * 5_000, 0))
    }

    #[test]
    fn test_shortest_distance_matches_reference() {
        let graph = diamond();
        assert_eq!(shortest_distance(&graph, id(0), id(1)), 3);
        assert_eq!(shortest_distance(&graph, id(0), id(2)), 1);
        assert_eq!(shortest_distance(&graph, id(0), id(3)), 8);
        assert_eq!(shortest_distance(&graph, id(2), id(3)), 7);
    }

    #[test]
    fn test_origin_equals_destination() {
        let graph = diamond();
        assert_eq!(shortest_distance(&graph, id(1), id(1)), 0);
        assert_eq!(shortest_distance(&graph, id(0), id(0)), 0);
    }

    #[test]
    fn test_edges_are_directed() {
        let graph = diamond();
        let mut search = Search::new(&graph, id(3));
        // Cell 3 has no outgoing edges: only the origin settles.
        assert_eq!(search.run(Some(id(0))), 0);
        assert!(!search.is_settled(id(0)));
        assert_eq!(search.settled_count(), 1);
    }

    #[test]
    fn test_unreachable_destination_returns_settled_total() {
        let mut graph = diamond();
        cell(&mut graph, 9);

        let mut search = Search::new(&graph, id(0));
        let result = search.run(Some(id(9)));

        // 0 + 1 + 3 + 8 from settling cells 0, 2, 1, 3.
        assert_eq!(result, 12);
        assert!(!search.is_settled(id(9)));
        assert_eq!(search.distance(id(1)), Some(3));
    }

    #[test]
    fn test_total_distance_of_star() {
        let mut graph = SpatialGraph::new();
        let leaves = 6;
        for leaf in 1..=leaves {
            edge(&mut graph, 0, leaf, 25);
        }
        assert_eq!(total_distance(&graph, id(0)), u64::from(leaves) * 25);
    }

    #[test]
    fn test_total_distance_is_settle_order_sum() {
        let graph = diamond();
        // Settled distances from 0: {0: 0, 2: 1, 1: 3, 3: 8}.
        assert_eq!(total_distance(&graph, id(0)), 12);
        // From 1 only 3 is reachable.
        assert_eq!(total_distance(&graph, id(1)), 5);
    }

    #[test]
    fn test_unknown_origin_settles_alone() {
        let graph = diamond();
        let unknown = CellId::from_coords(999, 999);
        assert_eq!(total_distance(&graph, unknown), 0);
        assert_eq!(shortest_distance(&graph, unknown, id(0)), 0);
    }

    #[test]
    fn test_averaged_weights_are_used() {
        let mut graph = SpatialGraph::new();
        edge(&mut graph, 0, 1, 10);
        edge(&mut graph, 0, 1, 11);
        edge(&mut graph, 1, 2, 6);
        assert_eq!(shortest_distance(&graph, id(0), id(2)), 16);
    }
}
