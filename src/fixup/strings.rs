//! String rules
//!
//! A `ValueAdd` with a string operand becomes a `MakeRope` once both
//! operands are known to be strings, with `ToString`/`ToPrimitive` inserted
//! for the operand that is not. String objects may only be unwrapped while
//! `String.prototype` still has its original `valueOf` and `toString`.

use super::{Cursor, FixupPhase};
use crate::ir::{CodeOrigin, Edge, EdgeRef, JsConstant, Node, NodeId, NodeType, UseKind};
use crate::profiling::ExitKind;
use crate::speculation::SpeculatedType;
use tracing::trace;

const MAX_ROPE_CHILDREN: usize = 3;

fn is_string_object_use(use_kind: UseKind) -> bool {
    matches!(
        use_kind,
        UseKind::StringObject | UseKind::StringOrStringObject
    )
}

impl FixupPhase<'_> {
    /// Whether a string object at `origin` can be treated as the string it
    /// wraps
    pub(super) fn can_optimize_string_object_access(&self, origin: CodeOrigin) -> bool {
        if self.oracle.has_exit_site(origin, ExitKind::NotStringObject) {
            return false;
        }
        let prototype = self.oracle.string_prototype(origin);
        prototype.transition_watchpoint_valid
            && !prototype.is_dictionary
            && prototype.value_of.is_string_value_of()
            && prototype.to_string.is_string_value_of()
    }

    pub(super) fn attempt_to_make_fast_string_add(
        &mut self,
        cur: Cursor,
        left: usize,
        right: usize,
        left_use_kind: UseKind,
    ) -> bool {
        let origin = self.origin(cur.node);
        if is_string_object_use(left_use_kind) && !self.can_optimize_string_object_access(origin) {
            return false;
        }

        let left_slot = cur.slot(left);
        let right_slot = cur.slot(right);
        let original_left = self.edge_at(left_slot).node;
        let original_right = self.edge_at(right_slot).node;

        self.convert_string_add_use(cur, left_slot, left_use_kind);

        let right_prediction = self.prediction(right_slot);
        if right_prediction.is_string() {
            self.convert_string_add_use(cur, right_slot, UseKind::String);
        } else if right_prediction.is_string_object()
            && self.can_optimize_string_object_access(origin)
        {
            self.convert_string_add_use(cur, right_slot, UseKind::StringObject);
        } else if right_prediction.is_string_or_string_object()
            && self.can_optimize_string_object_access(origin)
        {
            self.convert_string_add_use(cur, right_slot, UseKind::StringOrStringObject);
        } else {
            // Arbitrary value: ToPrimitive then ToString, in that order
            let to_primitive = self.insert(
                cur,
                Node::new(NodeType::ToPrimitive, origin)
                    .with_prediction(right_prediction.result_of_to_primitive())
                    .with_edge(Edge::untyped(original_right)),
            );
            let to_string = self.insert(
                cur,
                Node::new(NodeType::ToString, origin)
                    .with_prediction(SpeculatedType::STRING)
                    .with_edge(Edge::untyped(to_primitive)),
            );
            self.fixup_to_primitive(to_primitive);
            self.fixup_to_string(to_string);

            let use_kind = self.edge_at(right_slot).use_kind;
            self.graph
                .set_edge(right_slot, Some(Edge::new(to_string, use_kind)));
        }

        // Keep the original operands alive for OSR exit
        self.insert(
            cur,
            Node::new(NodeType::Phantom, origin)
                .with_edge(Edge::untyped(original_left))
                .with_edge(Edge::untyped(original_right)),
        );

        self.graph[cur.node].set_op_and_default_flags(NodeType::MakeRope);
        trace!(node = %cur.node, "add became a rope");
        self.fixup_make_rope(cur.node);
        true
    }

    /// Make an add operand usable as a rope child
    fn convert_string_add_use(&mut self, cur: Cursor, slot: EdgeRef, use_kind: UseKind) {
        let edge = self.edge_at(slot);
        self.observe_use_kind_on_node(edge.node, use_kind);

        if use_kind == UseKind::String {
            // Check it is a string once, then use it as known
            self.insert(
                cur,
                Node::new(NodeType::Phantom, self.origin(cur.node))
                    .with_edge(Edge::new(edge.node, UseKind::String)),
            );
            self.graph.set_use_kind(slot, UseKind::KnownString);
            return;
        }

        self.create_to_string(cur, slot, use_kind);
    }

    /// Route `slot` through a new `ToString` whose input uses `use_kind`
    pub(super) fn create_to_string(&mut self, cur: Cursor, slot: EdgeRef, use_kind: UseKind) {
        let edge = self.edge_at(slot);
        let to_string = self.insert(
            cur,
            Node::new(NodeType::ToString, self.origin(cur.node))
                .with_prediction(SpeculatedType::STRING)
                .with_edge(Edge::new(edge.node, use_kind)),
        );
        self.graph
            .set_edge(slot, Some(Edge::new(to_string, edge.use_kind)));
    }

    pub(super) fn fixup_make_rope(&mut self, node: NodeId) {
        let mut index = 0;
        while index < MAX_ROPE_CHILDREN {
            let slot = EdgeRef::new(node, index);
            let Some(edge) = self.graph.edge(slot) else {
                break;
            };
            self.graph.set_use_kind(slot, UseKind::KnownString);

            let is_empty_string = matches!(
                self.graph[edge.node].constant(),
                Some(JsConstant::String(value)) if value.is_empty()
            );
            if !is_empty_string {
                index += 1;
                continue;
            }
            // A rope of a single empty string is still that string
            if index == 0 && self.graph.child(node, 1).is_none() {
                break;
            }
            self.graph.remove_child(node, index);
        }

        if self.graph.child(node, 1).is_none() {
            self.graph[node].convert_to_identity();
        }
    }

    pub(super) fn fixup_to_primitive(&mut self, node: NodeId) {
        let slot = EdgeRef::new(node, 0);
        let prediction = self.prediction(slot);
        let origin = self.origin(node);

        if prediction.is_int32() {
            self.set_use_kind_and_unbox(slot, UseKind::Int32);
            self.graph[node].convert_to_identity();
        } else if prediction.is_string() {
            self.set_use_kind_and_unbox(slot, UseKind::String);
            self.graph[node].convert_to_identity();
        } else if prediction.is_string_object() && self.can_optimize_string_object_access(origin) {
            self.set_use_kind_and_unbox(slot, UseKind::StringObject);
            self.graph[node].convert_to_to_string();
        } else if prediction.is_string_or_string_object()
            && self.can_optimize_string_object_access(origin)
        {
            self.set_use_kind_and_unbox(slot, UseKind::StringOrStringObject);
            self.graph[node].convert_to_to_string();
        }
    }

    pub(super) fn fixup_to_string(&mut self, node: NodeId) {
        let slot = EdgeRef::new(node, 0);
        let prediction = self.prediction(slot);
        let origin = self.origin(node);

        if prediction.is_string() {
            self.set_use_kind_and_unbox(slot, UseKind::String);
            self.graph[node].convert_to_identity();
        } else if prediction.is_string_object() && self.can_optimize_string_object_access(origin) {
            self.set_use_kind_and_unbox(slot, UseKind::StringObject);
        } else if prediction.is_string_or_string_object()
            && self.can_optimize_string_object_access(origin)
        {
            self.set_use_kind_and_unbox(slot, UseKind::StringOrStringObject);
        } else if prediction.is_cell() {
            self.set_use_kind_and_unbox(slot, UseKind::Cell);
        }
    }
}
