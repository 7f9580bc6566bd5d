//! The data-flow graph of one compilation
//!
//! The graph owns every node, the var-arg child table, the variable table and
//! the identifier table for the lifetime of a compilation. Nodes live in a
//! flat arena addressed by [`NodeId`]; blocks are ordered lists of ids. The
//! arena never shrinks, so ids stay valid while the phase rewrites blocks.

use super::array_mode::ArrayMode;
use super::edge::{Edge, EdgeRef, UseKind};
use super::node::{
    Arity, Children, IdentifierId, Node, NodeId, NodeType, OpInfo, PayloadKind, FIXED_CHILDREN,
};
use super::variable::{ArgumentPosition, VariableAccessData, VariableId};
use crate::error::{invariant_violation, Error, Result};
use crate::speculation::SpeculatedType;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};
use string_interner::{DefaultStringInterner, DefaultSymbol, Symbol};

/// Index of a basic block in the graph
pub type BlockIndex = usize;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BasicBlock {
    pub nodes: Vec<NodeId>,
    #[serde(default = "default_reachable")]
    pub is_reachable: bool,
}

fn default_reachable() -> bool {
    true
}

impl BasicBlock {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            is_reachable: true,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn at(&self, index: usize) -> NodeId {
        self.nodes[index]
    }
}

/// Shape of the graph's local variable accesses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GraphForm {
    LoadStore,
    #[default]
    ThreadedCps,
    Ssa,
}

/// Where the optimization fixpoint stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FixpointState {
    #[default]
    BeforeFixpoint,
    FixpointNotConverged,
    FixpointConverged,
}

/// Interned property names referenced by `GetById` and friends
#[derive(Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct IdentifierTable {
    interner: DefaultStringInterner,
}

impl IdentifierTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> IdentifierId {
        let symbol = self.interner.get_or_intern(name);
        IdentifierId(symbol.to_usize() as u32)
    }

    /// Look up an already interned name without adding it
    pub fn lookup(&self, name: &str) -> Option<IdentifierId> {
        self.interner
            .get(name)
            .map(|symbol| IdentifierId(symbol.to_usize() as u32))
    }

    pub fn name(&self, id: IdentifierId) -> Option<&str> {
        DefaultSymbol::try_from_usize(id.0 as usize).and_then(|symbol| self.interner.resolve(symbol))
    }

    pub fn len(&self) -> usize {
        self.interner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interner.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        (0..self.len())
            .filter_map(|index| self.name(IdentifierId(index as u32)))
            .map(str::to_owned)
            .collect()
    }
}

impl From<Vec<String>> for IdentifierTable {
    fn from(names: Vec<String>) -> Self {
        let mut table = IdentifierTable::new();
        for name in &names {
            table.intern(name);
        }
        table
    }
}

impl From<IdentifierTable> for Vec<String> {
    fn from(table: IdentifierTable) -> Self {
        table.names()
    }
}

impl Clone for IdentifierTable {
    fn clone(&self) -> Self {
        IdentifierTable::from(self.names())
    }
}

impl PartialEq for IdentifierTable {
    fn eq(&self, other: &Self) -> bool {
        self.names() == other.names()
    }
}

impl fmt::Debug for IdentifierTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// The data-flow graph
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Graph {
    nodes: Vec<Node>,
    blocks: Vec<Option<BasicBlock>>,
    #[serde(default)]
    var_arg_children: Vec<Option<Edge>>,
    #[serde(default)]
    variables: Vec<VariableAccessData>,
    #[serde(default)]
    argument_positions: Vec<ArgumentPosition>,
    #[serde(default)]
    identifiers: IdentifierTable,
    #[serde(default)]
    form: GraphForm,
    #[serde(default)]
    fixpoint_state: FixpointState,
}

impl Index<NodeId> for Graph {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }
}

impl IndexMut<NodeId> for Graph {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- Nodes and blocks ----

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId::new)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    /// Add a node to the arena without placing it in any block
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Add a node whose children live in the var-arg table
    pub fn add_var_args_node(&mut self, mut node: Node, children: &[Option<Edge>]) -> NodeId {
        node.children = Children::VarArgs {
            first: self.var_arg_children.len() as u32,
            count: children.len() as u32,
        };
        self.var_arg_children.extend_from_slice(children);
        self.add_node(node)
    }

    pub fn add_block(&mut self) -> BlockIndex {
        self.blocks.push(Some(BasicBlock::new()));
        self.blocks.len() - 1
    }

    /// Reserve a block index that holds no block (a block removed by CFG
    /// simplification)
    pub fn add_removed_block(&mut self) -> BlockIndex {
        self.blocks.push(None);
        self.blocks.len() - 1
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, index: BlockIndex) -> Option<&BasicBlock> {
        self.blocks.get(index).and_then(Option::as_ref)
    }

    pub fn block_mut(&mut self, index: BlockIndex) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(index).and_then(Option::as_mut)
    }

    /// Append a node to the end of a block
    pub fn append(&mut self, block: BlockIndex, node: Node) -> NodeId {
        let id = self.add_node(node);
        self.push_to_block(block, id);
        id
    }

    pub fn append_var_args(
        &mut self,
        block: BlockIndex,
        node: Node,
        children: &[Option<Edge>],
    ) -> NodeId {
        let id = self.add_var_args_node(node, children);
        self.push_to_block(block, id);
        id
    }

    #[track_caller]
    fn push_to_block(&mut self, block: BlockIndex, id: NodeId) {
        match self.block_mut(block) {
            Some(block) => block.nodes.push(id),
            None => invariant_violation(format_args!("no block #{}", block)),
        }
    }

    // ---- Edges ----

    /// Number of child slots of a node (fixed nodes always have three)
    pub fn child_slots(&self, node: NodeId) -> usize {
        match self[node].children {
            Children::Fixed(_) => FIXED_CHILDREN,
            Children::VarArgs { count, .. } => count as usize,
        }
    }

    /// Number of occupied child slots
    pub fn num_children(&self, node: NodeId) -> usize {
        (0..self.child_slots(node))
            .filter(|index| self.child(node, *index).is_some())
            .count()
    }

    pub fn edge(&self, slot: EdgeRef) -> Option<Edge> {
        match self[slot.node].children {
            Children::Fixed(ref children) => children.get(slot.index).copied().flatten(),
            Children::VarArgs { first, count } => {
                if slot.index >= count as usize {
                    return None;
                }
                self.var_arg_children[first as usize + slot.index]
            }
        }
    }

    pub fn child(&self, node: NodeId, index: usize) -> Option<Edge> {
        self.edge(EdgeRef::new(node, index))
    }

    /// The producer in a slot; the slot must be occupied
    #[track_caller]
    pub fn child_node(&self, node: NodeId, index: usize) -> NodeId {
        match self.child(node, index) {
            Some(edge) => edge.node,
            None => invariant_violation(format_args!(
                "{} ({}) has no child {}",
                node, self[node].op, index
            )),
        }
    }

    #[track_caller]
    pub fn set_edge(&mut self, slot: EdgeRef, edge: Option<Edge>) {
        match self.nodes[slot.node.index()].children {
            Children::Fixed(ref mut children) => match children.get_mut(slot.index) {
                Some(child) => *child = edge,
                None => invariant_violation(format_args!(
                    "{} has no child slot {}",
                    slot.node, slot.index
                )),
            },
            Children::VarArgs { first, count } => {
                if slot.index >= count as usize {
                    invariant_violation(format_args!(
                        "{} has no var-arg slot {}",
                        slot.node, slot.index
                    ));
                }
                self.var_arg_children[first as usize + slot.index] = edge;
            }
        }
    }

    /// Change the use kind of an occupied slot
    #[track_caller]
    pub fn set_use_kind(&mut self, slot: EdgeRef, use_kind: UseKind) {
        match self.edge(slot) {
            Some(edge) => self.set_edge(slot, Some(Edge::new(edge.node, use_kind))),
            None => invariant_violation(format_args!(
                "setting {} on empty slot {} of {}",
                use_kind, slot.index, slot.node
            )),
        }
    }

    /// Slots of a node that hold an edge
    pub fn edges(&self, node: NodeId) -> Vec<EdgeRef> {
        (0..self.child_slots(node))
            .map(|index| EdgeRef::new(node, index))
            .filter(|slot| self.edge(*slot).is_some())
            .collect()
    }

    /// Remove a fixed child, shifting the following children down
    pub fn remove_child(&mut self, node: NodeId, index: usize) {
        if let Children::Fixed(ref mut children) = self.nodes[node.index()].children {
            for slot in index..FIXED_CHILDREN - 1 {
                children[slot] = children[slot + 1];
            }
            children[FIXED_CHILDREN - 1] = None;
        } else {
            invariant_violation(format_args!("{} has var-arg children", node));
        }
    }

    /// Replace all fixed children of a node
    pub fn set_children(&mut self, node: NodeId, children: [Option<Edge>; FIXED_CHILDREN]) {
        self.nodes[node.index()].children = Children::Fixed(children);
    }

    /// Prediction of the producer behind a slot (empty for an empty slot)
    pub fn prediction_of(&self, slot: EdgeRef) -> SpeculatedType {
        self.edge(slot)
            .map(|edge| self[edge.node].prediction())
            .unwrap_or_default()
    }

    /// Whether executing the node may trigger an OSR exit
    pub fn can_exit(&self, node: NodeId) -> bool {
        let op = self[node].op();
        if op.inherently_can_exit() {
            return true;
        }
        let edges = self.edges(node);
        if edges
            .iter()
            .filter_map(|slot| self.edge(*slot))
            .any(|edge| edge.use_kind.needs_check())
        {
            return true;
        }
        op.is_overflow_checked_arith()
            && edges
                .iter()
                .filter_map(|slot| self.edge(*slot))
                .any(|edge| edge.use_kind.is_int32())
    }

    // ---- Variables ----

    pub fn add_variable(&mut self, data: VariableAccessData) -> VariableId {
        self.variables.push(data);
        VariableId::new(self.variables.len() as u32 - 1)
    }

    pub fn variable(&self, id: VariableId) -> &VariableAccessData {
        &self.variables[id.index()]
    }

    pub fn variable_mut(&mut self, id: VariableId) -> &mut VariableAccessData {
        &mut self.variables[id.index()]
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn variables(&self) -> &[VariableAccessData] {
        &self.variables
    }

    /// Variable record behind a `GetLocal`, if `node` is one
    pub fn local_read_variable(&self, node: NodeId) -> Option<VariableId> {
        let node = &self[node];
        match (node.op(), node.info()) {
            (NodeType::GetLocal, OpInfo::Variable(variable)) => Some(*variable),
            _ => None,
        }
    }

    pub fn add_argument_position(&mut self, position: ArgumentPosition) -> usize {
        self.argument_positions.push(position);
        self.argument_positions.len() - 1
    }

    pub fn argument_positions(&self) -> &[ArgumentPosition] {
        &self.argument_positions
    }

    /// Spread unboxing profitability across every argument position
    pub fn merge_argument_unboxing_awareness(&mut self) -> bool {
        let mut changed = false;
        for position in self.argument_positions.iter_mut().rev() {
            changed |= position.merge_unboxing_awareness(&mut self.variables);
        }
        changed
    }

    /// Spread argument-aware predictions across every argument position
    pub fn merge_argument_prediction_awareness(&mut self) -> bool {
        let mut changed = false;
        for position in self.argument_positions.iter_mut() {
            changed |= position.merge_prediction_awareness(&mut self.variables);
        }
        changed
    }

    // ---- Identifiers and phase state ----

    pub fn identifiers(&self) -> &IdentifierTable {
        &self.identifiers
    }

    pub fn identifiers_mut(&mut self) -> &mut IdentifierTable {
        &mut self.identifiers
    }

    pub fn identifier_name(&self, id: IdentifierId) -> Option<&str> {
        self.identifiers.name(id)
    }

    pub fn form(&self) -> GraphForm {
        self.form
    }

    pub fn set_form(&mut self, form: GraphForm) {
        self.form = form;
    }

    pub fn fixpoint_state(&self) -> FixpointState {
        self.fixpoint_state
    }

    pub fn set_fixpoint_state(&mut self, state: FixpointState) {
        self.fixpoint_state = state;
    }

    /// Array mode of a node, for nodes that carry one
    pub fn array_mode(&self, node: NodeId) -> Option<ArrayMode> {
        match self[node].info() {
            OpInfo::ArrayMode(mode) | OpInfo::StructureAndArrayMode(_, mode) => Some(*mode),
            _ => None,
        }
    }

    // ---- Validation ----

    /// Check the structural well-formedness of a graph built outside the
    /// compiler (deserialized or hand-built)
    pub fn validate(&self) -> Result<()> {
        for id in self.node_ids() {
            self.validate_node(id)?;
        }

        let mut placed = FxHashSet::default();
        for (index, block) in self.blocks.iter().enumerate() {
            let Some(block) = block else { continue };
            for &id in &block.nodes {
                if !self.contains_node(id) {
                    return Err(Error::Block {
                        block: index,
                        message: format!("lists missing node {}", id),
                    });
                }
                if !placed.insert(id) {
                    return Err(Error::Block {
                        block: index,
                        message: format!("node {} is placed twice", id),
                    });
                }
            }
        }

        for (index, position) in self.argument_positions.iter().enumerate() {
            if let Some(missing) = position
                .variables()
                .iter()
                .find(|variable| variable.index() >= self.variables.len())
            {
                return Err(Error::Graph(format!(
                    "argument position {} refers to missing {}",
                    index, missing
                )));
            }
        }

        Ok(())
    }

    fn validate_node(&self, id: NodeId) -> Result<()> {
        let node = &self[id];
        let op = node.op();

        match (op.arity(), &node.children) {
            (Arity::Fixed { min, max }, Children::Fixed(children)) => {
                let found = children.iter().take_while(|child| child.is_some()).count();
                let total = children.iter().filter(|child| child.is_some()).count();
                if found != total {
                    return Err(Error::Arity {
                        node: id,
                        op,
                        found: total,
                        expected: "children without holes".into(),
                    });
                }
                if found < min as usize || found > max as usize {
                    return Err(Error::Arity {
                        node: id,
                        op,
                        found,
                        expected: arity_range(min as u32, Some(max as u32)),
                    });
                }
            }
            (Arity::VarArgs { min, max }, Children::VarArgs { first, count }) => {
                if (*first as usize + *count as usize) > self.var_arg_children.len() {
                    return Err(Error::Graph(format!(
                        "{} var-arg range {}..{} is outside the child table",
                        id,
                        first,
                        first + count
                    )));
                }
                if *count < min || max.is_some_and(|max| *count > max) {
                    return Err(Error::Arity {
                        node: id,
                        op,
                        found: *count as usize,
                        expected: arity_range(min, max),
                    });
                }
            }
            (Arity::Fixed { .. }, Children::VarArgs { .. }) => {
                return Err(Error::payload(id, op, "fixed-arity opcode has var-arg children"));
            }
            (Arity::VarArgs { .. }, Children::Fixed(_)) => {
                return Err(Error::payload(id, op, "var-arg opcode has fixed children"));
            }
        }

        for slot in self.edges(id) {
            if let Some(edge) = self.edge(slot) {
                if !self.contains_node(edge.node) {
                    return Err(Error::DanglingEdge {
                        node: id,
                        target: edge.node,
                    });
                }
            }
        }

        let expected = op.payload_kind();
        let found = node.info().kind();
        let payload_ok = match expected {
            PayloadKind::Any => true,
            PayloadKind::ArrayMode => {
                matches!(found, PayloadKind::ArrayMode | PayloadKind::StructureAndArrayMode)
            }
            expected => expected == found,
        };
        if !payload_ok {
            return Err(Error::payload(
                id,
                op,
                format!("expected {:?} payload, found {:?}", expected, found),
            ));
        }

        match node.info() {
            OpInfo::Variable(variable) if variable.index() >= self.variables.len() => {
                return Err(Error::payload(id, op, format!("missing {}", variable)));
            }
            OpInfo::Branch { taken, not_taken } => {
                for target in [taken, not_taken] {
                    if *target >= self.blocks.len() {
                        return Err(Error::payload(id, op, format!("missing block #{}", target)));
                    }
                }
            }
            OpInfo::Jump(target) if *target >= self.blocks.len() => {
                return Err(Error::payload(id, op, format!("missing block #{}", target)));
            }
            OpInfo::Switch(data) => {
                let targets = data.cases.iter().map(|case| case.target);
                for target in targets.chain(std::iter::once(data.fall_through)) {
                    if target >= self.blocks.len() {
                        return Err(Error::payload(id, op, format!("missing block #{}", target)));
                    }
                }
            }
            OpInfo::Identifier(identifier) if self.identifiers.name(*identifier).is_none() => {
                return Err(Error::payload(
                    id,
                    op,
                    format!("unknown identifier #{}", identifier.0),
                ));
            }
            _ => {}
        }

        Ok(())
    }
}

fn arity_range(min: u32, max: Option<u32>) -> String {
    match max {
        Some(max) if max == min => min.to_string(),
        Some(max) => format!("{}..={}", min, max),
        None => format!("at least {}", min),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::node::CodeOrigin;

    fn constant(graph: &mut Graph, block: BlockIndex, value: i32) -> NodeId {
        graph.append(
            block,
            Node::new(NodeType::JSConstant, CodeOrigin::new(0))
                .with_info(OpInfo::Constant(crate::ir::JsConstant::Int32(value)))
                .with_prediction(SpeculatedType::INT32),
        )
    }

    #[test]
    fn test_identifier_table() {
        let mut table = IdentifierTable::new();
        let length = table.intern("length");
        let again = table.intern("length");
        let other = table.intern("byteLength");
        assert_eq!(length, again);
        assert_ne!(length, other);
        assert_eq!(table.name(other), Some("byteLength"));
        assert_eq!(table.lookup("byteOffset"), None);
        assert_eq!(table.names(), vec!["length".to_string(), "byteLength".to_string()]);
    }

    #[test]
    fn test_edge_slots() {
        let mut graph = Graph::new();
        let block = graph.add_block();
        let a = constant(&mut graph, block, 1);
        let b = constant(&mut graph, block, 2);
        let add = graph.append(
            block,
            Node::new(NodeType::ArithAdd, CodeOrigin::new(1))
                .with_edge(Edge::untyped(a))
                .with_edge(Edge::untyped(b)),
        );

        assert_eq!(graph.num_children(add), 2);
        assert_eq!(graph.child_node(add, 1), b);
        graph.set_use_kind(EdgeRef::new(add, 0), UseKind::Int32);
        assert_eq!(graph.child(add, 0), Some(Edge::new(a, UseKind::Int32)));
        assert!(graph.can_exit(add));

        graph.remove_child(add, 0);
        assert_eq!(graph.child(add, 0), Some(Edge::untyped(b)));
        assert_eq!(graph.child(add, 1), None);
    }

    #[test]
    fn test_var_arg_slots() {
        let mut graph = Graph::new();
        let block = graph.add_block();
        let a = constant(&mut graph, block, 1);
        let array = graph.append_var_args(
            block,
            Node::new(NodeType::NewArray, CodeOrigin::new(0))
                .with_info(OpInfo::Indexing(crate::ir::IndexingShape::Undecided)),
            &[Some(Edge::untyped(a)), Some(Edge::untyped(a))],
        );
        assert_eq!(graph.child_slots(array), 2);
        graph.set_use_kind(EdgeRef::new(array, 1), UseKind::Int32);
        assert_eq!(graph.child(array, 1).map(|e| e.use_kind), Some(UseKind::Int32));
        assert_eq!(graph.child(array, 0).map(|e| e.use_kind), Some(UseKind::Untyped));
        assert_eq!(graph.child(array, 2), None);
    }

    #[test]
    fn test_validate_rejects_arity_mismatch() {
        let mut graph = Graph::new();
        let block = graph.add_block();
        let a = constant(&mut graph, block, 1);
        graph.append(
            block,
            Node::new(NodeType::ArithAdd, CodeOrigin::new(0)).with_edge(Edge::untyped(a)),
        );
        assert!(matches!(graph.validate(), Err(Error::Arity { found: 1, .. })));
    }

    #[test]
    fn test_validate_rejects_dangling_edge() {
        let mut graph = Graph::new();
        let block = graph.add_block();
        graph.append(
            block,
            Node::new(NodeType::Return, CodeOrigin::new(0))
                .with_edge(Edge::untyped(NodeId::new(99))),
        );
        assert!(matches!(graph.validate(), Err(Error::DanglingEdge { .. })));
    }

    #[test]
    fn test_validate_rejects_missing_payload() {
        let mut graph = Graph::new();
        let block = graph.add_block();
        graph.append(block, Node::new(NodeType::JSConstant, CodeOrigin::new(0)));
        assert!(matches!(graph.validate(), Err(Error::Payload { .. })));
    }
}
