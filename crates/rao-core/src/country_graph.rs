//! Country adjacency graph used to tell whether an action is electrically
//! close to a limiting element.

use std::collections::HashMap;

use petgraph::algo::dijkstra;
use petgraph::graph::{NodeIndex, UnGraph};

/// Undirected graph of countries sharing a boundary.
#[derive(Debug, Clone, Default)]
pub struct CountryGraph {
    graph: UnGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl CountryGraph {
    pub fn new<'a>(boundaries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut graph = CountryGraph::default();
        for (a, b) in boundaries {
            let na = graph.node(a);
            let nb = graph.node(b);
            if graph.graph.find_edge(na, nb).is_none() {
                graph.graph.add_edge(na, nb, ());
            }
        }
        graph
    }

    fn node(&mut self, country: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(country) {
            return *idx;
        }
        let idx = self.graph.add_node(country.to_string());
        self.index.insert(country.to_string(), idx);
        idx
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Number of boundaries crossed between two countries, `None` when they
    /// are not connected.
    pub fn boundary_distance(&self, from: &str, to: &str) -> Option<usize> {
        if from == to {
            return Some(0);
        }
        let start = *self.index.get(from)?;
        let goal = *self.index.get(to)?;
        let costs = dijkstra(&self.graph, start, Some(goal), |_| 1usize);
        costs.get(&goal).copied()
    }

    /// True when the two countries are at most `max_boundaries` apart.
    pub fn are_neighbours(&self, from: &str, to: &str, max_boundaries: usize) -> bool {
        self.boundary_distance(from, to)
            .is_some_and(|distance| distance <= max_boundaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> CountryGraph {
        CountryGraph::new([("FR", "BE"), ("BE", "NL"), ("NL", "DE"), ("FR", "BE")])
    }

    #[test]
    fn distance_counts_boundaries() {
        let graph = chain();
        assert_eq!(graph.boundary_distance("FR", "FR"), Some(0));
        assert_eq!(graph.boundary_distance("FR", "BE"), Some(1));
        assert_eq!(graph.boundary_distance("FR", "DE"), Some(3));
    }

    #[test]
    fn unknown_country_is_unreachable() {
        let graph = chain();
        assert_eq!(graph.boundary_distance("FR", "ES"), None);
        assert!(!graph.are_neighbours("FR", "ES", 10));
    }

    #[test]
    fn neighbourhood_respects_limit() {
        let graph = chain();
        assert!(graph.are_neighbours("FR", "NL", 2));
        assert!(!graph.are_neighbours("FR", "DE", 2));
    }
}
