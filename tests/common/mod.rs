//! Shared test helpers for integration tests

use quicksilver_dfg::{
    run_fixup_phase_with_config, FixupConfig, FixupStats, Graph, NodeId, NodeType,
    ProfileSnapshot, UseKind,
};

/// Run the phase with the default x86_64 configuration
pub fn fixup(graph: &mut Graph, oracle: &ProfileSnapshot) -> FixupStats {
    run_fixup_phase_with_config(graph, oracle, &FixupConfig::default())
}

/// Opcodes of a block in order
pub fn ops(graph: &Graph, block: usize) -> Vec<NodeType> {
    graph
        .block(block)
        .map(|block| block.nodes.iter().map(|node| graph[*node].op()).collect())
        .unwrap_or_default()
}

/// Use kinds of a node's occupied child slots
pub fn use_kinds(graph: &Graph, node: NodeId) -> Vec<UseKind> {
    graph
        .edges(node)
        .into_iter()
        .filter_map(|slot| graph.edge(slot))
        .map(|edge| edge.use_kind)
        .collect()
}

/// Position of `node` in `block`
#[allow(dead_code)]
pub fn position(graph: &Graph, block: usize, node: NodeId) -> usize {
    graph
        .block(block)
        .and_then(|block| block.nodes.iter().position(|candidate| *candidate == node))
        .unwrap_or_else(|| panic!("{} is not in block #{}", node, block))
}
