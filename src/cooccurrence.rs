//! Keyword co-occurrence networks.
//!
//! Nodes are the tokens found in the most documents. An edge between two retained tokens is
//! weighted by the number of documents containing both (presence, not counts), so an edge weight
//! can never exceed the document frequency of either endpoint.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rayon::prelude::*;

use crate::StopList;
use crate::table::Document;

/// Pruning limits for one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphLimits {
    pub node_top_n: usize,
    pub edge_top_n: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub token: String,
    pub doc_freq: u64,
}

/// Undirected edge; `source < target` lexically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub weight: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CooccurrenceGraph {
    /// Sorted by doc_freq desc, token asc.
    pub nodes: Vec<Node>,
    /// Sorted by weight desc, then (source, target) asc.
    pub edges: Vec<Edge>,
}

impl CooccurrenceGraph {
    /// The `n` node tokens worth labelling when the graph is drawn.
    pub fn label_tokens(&self, n: usize) -> Vec<&str> {
        self.nodes.iter().take(n).map(|n| n.token.as_str()).collect()
    }

    pub fn doc_freq(&self, token: &str) -> Option<u64> {
        self.nodes.iter().find(|n| n.token == token).map(|n| n.doc_freq)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Number of distinct documents containing each non-excluded token.
pub fn document_frequency(docs: &[&Document], stop: &StopList) -> BTreeMap<String, u64> {
    let mut df: BTreeMap<String, u64> = BTreeMap::new();
    for doc in docs {
        for token in doc.tokens.keys().filter(|t| !stop.contains(t)) {
            *df.entry(token.clone()).or_insert(0) += 1;
        }
    }
    df
}

pub fn build_graph(docs: &[&Document], stop: &StopList, limits: GraphLimits) -> CooccurrenceGraph {
    let mut nodes: Vec<Node> = document_frequency(docs, stop)
        .into_iter()
        .map(|(token, doc_freq)| Node { token, doc_freq })
        .collect();
    nodes.sort_by(|a, b| b.doc_freq.cmp(&a.doc_freq).then_with(|| a.token.cmp(&b.token)));
    nodes.truncate(limits.node_top_n);

    let retained: BTreeSet<&str> = nodes.iter().map(|n| n.token.as_str()).collect();

    let pair_counts: HashMap<(&str, &str), u64> = docs
        .par_iter()
        .fold(HashMap::new, |mut acc, doc| {
            // BTreeMap keys are sorted, so every pair comes out as (smaller, larger).
            let present: Vec<&str> = doc
                .tokens
                .keys()
                .map(String::as_str)
                .filter(|t| retained.contains(t))
                .collect();
            for (i, a) in present.iter().enumerate() {
                for b in &present[i + 1..] {
                    *acc.entry((*a, *b)).or_insert(0) += 1;
                }
            }
            acc
        })
        .reduce(HashMap::new, |mut left, right| {
            for (pair, w) in right {
                *left.entry(pair).or_insert(0) += w;
            }
            left
        });

    let mut edges: Vec<Edge> = pair_counts
        .into_iter()
        .map(|((s, t), weight)| Edge {
            source: s.to_string(),
            target: t.to_string(),
            weight,
        })
        .collect();
    edges.sort_by(|a, b| {
        b.weight
            .cmp(&a.weight)
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.target.cmp(&b.target))
    });
    edges.truncate(limits.edge_top_n);

    CooccurrenceGraph { nodes, edges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{TokenRecord, TokenTable};

    fn corpus() -> TokenTable {
        let rows = [
            ("d1", &["housing", "rent", "bridge", "the"][..]),
            ("d2", &["housing", "rent"][..]),
            ("d3", &["housing", "zoning"][..]),
            ("d4", &["rent", "bridge"][..]),
            ("d5", &["ferry"][..]),
        ];
        let mut records = Vec::new();
        for (id, tokens) in rows {
            for t in tokens {
                records.push(TokenRecord::new(id, "news", None, *t, 5));
            }
        }
        TokenTable::from_records(records)
    }

    fn limits(node_top_n: usize, edge_top_n: usize) -> GraphLimits {
        GraphLimits { node_top_n, edge_top_n }
    }

    #[test]
    fn nodes_rank_by_document_frequency() {
        let table = corpus();
        let docs: Vec<&Document> = table.documents().iter().collect();
        let g = build_graph(&docs, &StopList::new(["the"]), limits(3, 10));
        let nodes: Vec<(&str, u64)> = g
            .nodes
            .iter()
            .map(|n| (n.token.as_str(), n.doc_freq))
            .collect();
        assert_eq!(nodes, vec![("housing", 3), ("rent", 3), ("bridge", 2)]);
        assert_eq!(g.label_tokens(2), vec!["housing", "rent"]);
    }

    #[test]
    fn edges_only_join_retained_tokens() {
        let table = corpus();
        let docs: Vec<&Document> = table.documents().iter().collect();
        let g = build_graph(&docs, &StopList::new(["the"]), limits(3, 10));
        let edges: Vec<(&str, &str, u64)> = g
            .edges
            .iter()
            .map(|e| (e.source.as_str(), e.target.as_str(), e.weight))
            .collect();
        assert_eq!(
            edges,
            vec![("bridge", "rent", 2), ("housing", "rent", 2), ("bridge", "housing", 1)]
        );
        for e in &g.edges {
            assert_ne!(e.source, e.target);
            let df_s = g.doc_freq(&e.source).unwrap();
            let df_t = g.doc_freq(&e.target).unwrap();
            assert!(e.weight <= df_s.min(df_t));
        }
    }

    #[test]
    fn edge_limit_keeps_heaviest() {
        let table = corpus();
        let docs: Vec<&Document> = table.documents().iter().collect();
        let g = build_graph(&docs, &StopList::default(), limits(10, 1));
        assert_eq!(g.edges.len(), 1);
        assert_eq!((g.edges[0].source.as_str(), g.edges[0].target.as_str()), ("bridge", "rent"));
    }

    #[test]
    fn empty_input_gives_empty_graph() {
        let g = build_graph(&[], &StopList::default(), limits(5, 5));
        assert!(g.is_empty());
        assert!(g.edges.is_empty());
    }
}
