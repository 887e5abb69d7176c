//! The world map: a directed multigraph over circuit kinds.

use std::io::Write;
use std::sync::Arc;

use rtlcross_circuit::{CircuitClass, CircuitKind};

use crate::translator::{Translator, registry};

struct Edge {
    src: CircuitKind,
    dst: CircuitKind,
    translator: Arc<dyn Translator>,
}

/// Every registered translator drawn as edges between circuit kinds.
pub struct WorldMap {
    edges: Vec<Edge>,
}

impl WorldMap {
    /// A map over an explicit translator set.
    #[must_use]
    pub fn new(translators: Vec<Arc<dyn Translator>>) -> Self {
        let mut edges = Vec::new();
        for translator in translators {
            for (src, dst) in translator.edges() {
                edges.push(Edge {
                    src,
                    dst,
                    translator: Arc::clone(&translator),
                });
            }
        }
        Self { edges }
    }

    /// A map over the full registry.
    #[must_use]
    pub fn full() -> Self {
        Self::new(registry())
    }

    /// Every simple edge path from `src` to any kind inside `sink`.
    #[must_use]
    pub fn travel(&self, src: CircuitKind, sink: CircuitClass) -> Vec<Vec<Arc<dyn Translator>>> {
        let mut paths = Vec::new();
        let mut visited = vec![src];
        let mut chain = Vec::new();
        self.dfs(src, sink, &mut visited, &mut chain, &mut paths);
        paths
    }

    fn dfs(
        &self,
        node: CircuitKind,
        sink: CircuitClass,
        visited: &mut Vec<CircuitKind>,
        chain: &mut Vec<Arc<dyn Translator>>,
        paths: &mut Vec<Vec<Arc<dyn Translator>>>,
    ) {
        for edge in &self.edges {
            if edge.src != node || visited.contains(&edge.dst) {
                continue;
            }
            chain.push(Arc::clone(&edge.translator));
            visited.push(edge.dst);
            if sink.matches(edge.dst) {
                paths.push(chain.clone());
            }
            self.dfs(edge.dst, sink, visited, chain, paths);
            visited.pop();
            chain.pop();
        }
    }

    /// Writes the edge list in `src-translator->dst: instance_count` form.
    pub fn dump_edges(&self, out: &mut impl Write) -> std::io::Result<()> {
        for edge in &self.edges {
            writeln!(
                out,
                "{}-{}->{}: {}",
                edge.src.name(),
                edge.translator.name(),
                edge.dst.name(),
                edge.translator.instance_count(),
            )?;
        }
        Ok(())
    }
}
