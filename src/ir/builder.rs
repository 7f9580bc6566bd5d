//! Graph construction helpers
//!
//! The bytecode parser is not part of this crate; tests, benches and tooling
//! build graphs with [`GraphBuilder`] instead. Every appended node gets the
//! next bytecode index as its origin unless one is set explicitly.

use super::array_mode::{ArrayMode, IndexingShape};
use super::edge::Edge;
use super::graph::{BlockIndex, Graph};
use super::node::{CodeOrigin, JsConstant, Node, NodeFlags, NodeId, NodeType, OpInfo};
use super::variable::{ArgumentPosition, VariableAccessData, VariableId};
use crate::speculation::SpeculatedType;

/// Builder for hand-written DFG graphs
#[derive(Debug)]
pub struct GraphBuilder {
    graph: Graph,
    current: BlockIndex,
    next_bytecode_index: u32,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    /// Create a builder positioned in a fresh entry block
    pub fn new() -> Self {
        let mut graph = Graph::new();
        let current = graph.add_block();
        Self {
            graph,
            current,
            next_bytecode_index: 0,
        }
    }

    pub fn finish(self) -> Graph {
        self.graph
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    // ---- Blocks ----

    pub fn current_block(&self) -> BlockIndex {
        self.current
    }

    /// Create a block without moving to it
    pub fn add_block(&mut self) -> BlockIndex {
        self.graph.add_block()
    }

    pub fn switch_to(&mut self, block: BlockIndex) {
        self.current = block;
    }

    pub fn mark_unreachable(&mut self, block: BlockIndex) {
        if let Some(block) = self.graph.block_mut(block) {
            block.is_reachable = false;
        }
    }

    // ---- Raw nodes ----

    fn next_origin(&mut self) -> CodeOrigin {
        let origin = CodeOrigin::new(self.next_bytecode_index);
        self.next_bytecode_index += 1;
        origin
    }

    /// Append a prepared node to the current block
    pub fn append(&mut self, node: Node) -> NodeId {
        self.graph.append(self.current, node)
    }

    /// Append `op` with untyped edges to `children`
    pub fn node(&mut self, op: NodeType, children: &[NodeId], prediction: SpeculatedType) -> NodeId {
        let origin = self.next_origin();
        let node = children
            .iter()
            .fold(Node::new(op, origin), |node, child| {
                node.with_edge(Edge::untyped(*child))
            })
            .with_prediction(prediction);
        self.append(node)
    }

    /// Append `op` with var-arg children
    pub fn var_args_node(
        &mut self,
        op: NodeType,
        children: &[Option<NodeId>],
        prediction: SpeculatedType,
        info: OpInfo,
    ) -> NodeId {
        let origin = self.next_origin();
        let edges: Vec<Option<Edge>> = children
            .iter()
            .map(|child| child.map(Edge::untyped))
            .collect();
        let node = Node::new(op, origin)
            .with_prediction(prediction)
            .with_info(info);
        self.graph.append_var_args(self.current, node, &edges)
    }

    pub fn merge_flags(&mut self, node: NodeId, flags: NodeFlags) -> NodeId {
        self.graph[node].merge_flags(flags);
        node
    }

    pub fn set_origin(&mut self, node: NodeId, origin: CodeOrigin) -> NodeId {
        self.graph[node].origin = origin;
        node
    }

    // ---- Constants ----

    pub fn constant(&mut self, value: JsConstant) -> NodeId {
        let origin = self.next_origin();
        let prediction = value.speculated_type();
        self.append(
            Node::new(NodeType::JSConstant, origin)
                .with_prediction(prediction)
                .with_info(OpInfo::Constant(value)),
        )
    }

    pub fn int32(&mut self, value: i32) -> NodeId {
        self.constant(JsConstant::Int32(value))
    }

    pub fn double(&mut self, value: f64) -> NodeId {
        self.constant(JsConstant::Double(value))
    }

    pub fn string(&mut self, value: &str) -> NodeId {
        self.constant(JsConstant::String(value.to_string()))
    }

    /// An opaque value with the given prediction (a call result)
    pub fn value(&mut self, prediction: SpeculatedType) -> NodeId {
        let origin = self.next_origin();
        let node = Node::new(NodeType::GetGlobalVar, origin).with_prediction(prediction);
        self.append(node)
    }

    // ---- Locals ----

    /// Add a variable record whose merged prediction is `prediction`
    pub fn variable(&mut self, local: i32, prediction: SpeculatedType) -> VariableId {
        let mut data = VariableAccessData::new(local);
        data.predict(prediction);
        self.graph.add_variable(data)
    }

    pub fn get_local(&mut self, variable: VariableId) -> NodeId {
        let origin = self.next_origin();
        let prediction = self.graph.variable(variable).prediction();
        self.append(
            Node::new(NodeType::GetLocal, origin)
                .with_prediction(prediction)
                .with_info(OpInfo::Variable(variable)),
        )
    }

    pub fn set_local(&mut self, variable: VariableId, value: NodeId) -> NodeId {
        let origin = self.next_origin();
        self.append(
            Node::new(NodeType::SetLocal, origin)
                .with_edge(Edge::untyped(value))
                .with_info(OpInfo::Variable(variable)),
        )
    }

    pub fn set_argument(&mut self, variable: VariableId) -> NodeId {
        let origin = self.next_origin();
        self.append(Node::new(NodeType::SetArgument, origin).with_info(OpInfo::Variable(variable)))
    }

    pub fn argument_position(&mut self, variables: &[VariableId]) -> usize {
        let mut position = ArgumentPosition::new();
        for variable in variables {
            position.add_variable(*variable);
        }
        self.graph.add_argument_position(position)
    }

    // ---- Operations ----

    pub fn unary(&mut self, op: NodeType, child: NodeId, prediction: SpeculatedType) -> NodeId {
        self.node(op, &[child], prediction)
    }

    pub fn binary(
        &mut self,
        op: NodeType,
        left: NodeId,
        right: NodeId,
        prediction: SpeculatedType,
    ) -> NodeId {
        self.node(op, &[left, right], prediction)
    }

    pub fn get_by_val(
        &mut self,
        base: NodeId,
        index: NodeId,
        mode: ArrayMode,
        prediction: SpeculatedType,
    ) -> NodeId {
        let node = self.node(NodeType::GetByVal, &[base, index], prediction);
        self.graph[node].set_array_mode(mode);
        node
    }

    pub fn put_by_val(
        &mut self,
        base: NodeId,
        index: NodeId,
        value: NodeId,
        mode: ArrayMode,
    ) -> NodeId {
        self.var_args_node(
            NodeType::PutByVal,
            &[Some(base), Some(index), Some(value), None],
            SpeculatedType::empty(),
            OpInfo::ArrayMode(mode),
        )
    }

    pub fn get_by_id(&mut self, base: NodeId, name: &str, prediction: SpeculatedType) -> NodeId {
        let identifier = self.graph.identifiers_mut().intern(name);
        let node = self.node(NodeType::GetById, &[base], prediction);
        self.graph[node].info = OpInfo::Identifier(identifier);
        node
    }

    pub fn new_array(&mut self, elements: &[NodeId], shape: IndexingShape) -> NodeId {
        let children: Vec<Option<NodeId>> = elements.iter().copied().map(Some).collect();
        self.var_args_node(
            NodeType::NewArray,
            &children,
            SpeculatedType::ARRAY,
            OpInfo::Indexing(shape),
        )
    }

    // ---- Terminals ----

    pub fn branch(&mut self, condition: NodeId, taken: BlockIndex, not_taken: BlockIndex) -> NodeId {
        let node = self.node(NodeType::Branch, &[condition], SpeculatedType::empty());
        self.graph[node].set_branch_targets(taken, not_taken);
        node
    }

    pub fn jump(&mut self, target: BlockIndex) -> NodeId {
        let origin = self.next_origin();
        self.append(Node::new(NodeType::Jump, origin).with_info(OpInfo::Jump(target)))
    }

    pub fn ret(&mut self, value: NodeId) -> NodeId {
        self.node(NodeType::Return, &[value], SpeculatedType::empty())
    }
}
