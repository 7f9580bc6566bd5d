//! Textual graph dumps
//!
//! One line per node, in block order:
//!
//! ```text
//! Block #0:
//!   @2 = ArithAdd(Int32:@0, Int32:@1)  pred:Int32  bc#2
//! ```

use super::graph::Graph;
use super::node::{NodeFlags, NodeId, OpInfo};
use std::fmt;

/// Display adapter for one node in the context of its graph
pub struct NodeDump<'a> {
    graph: &'a Graph,
    node: NodeId,
}

impl Graph {
    pub fn dump_node(&self, node: NodeId) -> NodeDump<'_> {
        NodeDump { graph: self, node }
    }
}

impl fmt::Display for NodeDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.graph;
        let node = &graph[self.node];

        write!(f, "{} = {}(", self.node, node.op())?;
        let mut first = true;
        for index in 0..graph.child_slots(self.node) {
            let edge = graph.child(self.node, index);
            if edge.is_none() && !node.op().has_var_args() {
                continue;
            }
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            match edge {
                Some(edge) => write!(f, "{}", edge)?,
                None => write!(f, "-")?,
            }
        }
        write!(f, ")")?;

        match node.info() {
            OpInfo::None => {}
            OpInfo::Constant(value) => write!(f, "  {}", value)?,
            OpInfo::Variable(variable) => {
                let data = graph.variable(*variable);
                write!(f, "  {}(loc{}", variable, data.local)?;
                if data.is_profitable_to_unbox() {
                    write!(f, ", unboxed")?;
                }
                write!(f, ")")?;
            }
            OpInfo::ArrayMode(mode) => write!(f, "  {}", mode)?,
            OpInfo::Identifier(identifier) => match graph.identifier_name(*identifier) {
                Some(name) => write!(f, "  id:{}", name)?,
                None => write!(f, "  id#{}", identifier.0)?,
            },
            OpInfo::Structure(structure) => write!(f, "  struct#{}", structure.0)?,
            OpInfo::StructureAndArrayMode(structure, mode) => {
                write!(f, "  struct#{} {}", structure.0, mode)?
            }
            OpInfo::Indexing(shape) => write!(f, "  {:?}", shape)?,
            OpInfo::Branch { taken, not_taken } => {
                write!(f, "  T:#{} F:#{}", taken, not_taken)?
            }
            OpInfo::Jump(target) => write!(f, "  #{}", target)?,
            OpInfo::Switch(data) => {
                write!(f, "  {:?}[", data.kind)?;
                for (index, case) in data.cases.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}:#{}", case.value, case.target)?;
                }
                write!(f, "] default:#{}", data.fall_through)?;
            }
        }

        if !node.prediction().is_empty() {
            write!(f, "  pred:{}", node.prediction())?;
        }
        if node.flags().contains(NodeFlags::EXITS_FORWARD) {
            write!(f, "  forward")?;
        }
        write!(f, "  {}", node.origin())
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for index in 0..self.num_blocks() {
            let Some(block) = self.block(index) else {
                continue;
            };
            write!(f, "Block #{}", index)?;
            if !block.is_reachable {
                write!(f, " (unreachable)")?;
            }
            writeln!(f, ":")?;
            for &node in &block.nodes {
                writeln!(f, "  {}", self.dump_node(node))?;
            }
        }
        Ok(())
    }
}
