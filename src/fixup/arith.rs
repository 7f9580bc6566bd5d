//! Arithmetic, bitwise and comparison rules

use super::{Cursor, FixupPhase, SpeculationDirection};
use crate::ir::{to_int32, Edge, EdgeRef, JsConstant, Node, NodeId, NodeType, OpInfo, UseKind};
use crate::speculation::SpeculatedType;
use tracing::trace;

/// Beyond this magnitude a double constant can't be truncated soundly
const MAX_TRUNCATABLE_CONSTANT: f64 = (1u64 << 48) as f64;

/// How an add or subtract may be specialized to int32
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum AddSpeculationMode {
    DontSpeculateInteger,
    SpeculateInteger,
    /// Integer add after replacing a double constant operand with its
    /// int32 truncation
    SpeculateIntegerAndTruncateConstants,
}

impl FixupPhase<'_> {
    pub(super) fn fixup_bitwise(&mut self, cur: Cursor) {
        self.fix_int_edge(cur.slot(0));
        self.fix_int_edge(cur.slot(1));
    }

    pub(super) fn fixup_value_to_int32(&mut self, cur: Cursor) {
        let slot = cur.slot(0);
        let prediction = self.prediction(slot);
        if prediction.is_int32() {
            self.set_use_kind_and_unbox(slot, UseKind::Int32);
            self.graph[cur.node].convert_to_identity();
            return;
        }
        if prediction.is_number() {
            self.set_use_kind_and_unbox(slot, UseKind::Number);
            return;
        }
        if prediction.is_boolean() {
            self.set_use_kind_and_unbox(slot, UseKind::Boolean);
            return;
        }
        self.set_use_kind_and_unbox(slot, UseKind::NotCell);
    }

    pub(super) fn fixup_value_add(&mut self, cur: Cursor) {
        if self.attempt_to_make_integer_add(cur) {
            return;
        }
        if self.both_number_expecting_defined(cur) {
            self.fix_both_double_edges(cur, UseKind::Number);
            return;
        }

        // Each attempt guards its own operand kinds, so the first match wins
        let attempts = [
            (0, 1, UseKind::String),
            (1, 0, UseKind::String),
            (0, 1, UseKind::StringObject),
            (1, 0, UseKind::StringObject),
            (0, 1, UseKind::StringOrStringObject),
            (1, 0, UseKind::StringOrStringObject),
        ];
        for (left, right, use_kind) in attempts {
            let prediction = self.prediction(cur.slot(left));
            let applies = match use_kind {
                UseKind::String => prediction.is_string(),
                UseKind::StringObject => prediction.is_string_object(),
                _ => prediction.is_string_or_string_object(),
            };
            if applies && self.attempt_to_make_fast_string_add(cur, left, right, use_kind) {
                return;
            }
        }
    }

    pub(super) fn fixup_arith_add(&mut self, cur: Cursor) {
        if self.attempt_to_make_integer_add(cur) {
            return;
        }
        self.fix_both_double_edges(cur, UseKind::Number);
    }

    pub(super) fn fixup_arith_negate(&mut self, cur: Cursor) {
        let slot = cur.slot(0);
        if self.prediction(slot).is_int32_for_arithmetic()
            && self.graph[cur.node].can_speculate_integer()
        {
            self.set_use_kind_and_unbox(slot, UseKind::Int32);
            return;
        }
        self.fix_double_edge(cur, slot, UseKind::Number, SpeculationDirection::Backward);
    }

    pub(super) fn fixup_arith_mul(&mut self, cur: Cursor) {
        if self.should_speculate_integer_for_arithmetic(cur) {
            self.set_both_use_kinds(cur, UseKind::Int32);
            return;
        }
        self.fix_both_double_edges(cur, UseKind::Number);
    }

    pub(super) fn fixup_arith_div(&mut self, cur: Cursor) {
        if !self.should_speculate_integer_for_arithmetic(cur) {
            self.fix_both_double_edges(cur, UseKind::Number);
            return;
        }
        if self.config.hardware_integer_division {
            self.set_both_use_kinds(cur, UseKind::Int32);
            return;
        }

        // No integer divide instruction: divide as doubles, then check the
        // quotient converts back to an int32 losslessly
        for index in 0..2 {
            self.inject_int32_to_double(
                cur,
                cur.slot(index),
                UseKind::Number,
                SpeculationDirection::Backward,
            );
        }
        let mut division = self.graph[cur.node].clone();
        division.set_prediction(SpeculatedType::DOUBLE);
        let division = self.insert(cur, division);

        self.graph[cur.node].set_op(NodeType::DoubleAsInt32);
        self.graph.set_children(
            cur.node,
            [Some(Edge::new(division, UseKind::KnownNumber)), None, None],
        );
        trace!(node = %cur.node, %division, "division split into double divide and check");
    }

    pub(super) fn fixup_arith_min_max(&mut self, cur: Cursor) {
        if self.should_speculate_integer_for_arithmetic(cur) {
            self.set_both_use_kinds(cur, UseKind::Int32);
            return;
        }
        self.fix_both_double_edges(cur, UseKind::Number);
    }

    pub(super) fn fixup_arith_abs(&mut self, cur: Cursor) {
        let slot = cur.slot(0);
        if self.prediction(slot).is_int32_for_arithmetic()
            && self.graph[cur.node].can_speculate_integer()
        {
            self.set_use_kind_and_unbox(slot, UseKind::Int32);
            return;
        }
        self.fix_double_edge(cur, slot, UseKind::Number, SpeculationDirection::Backward);
    }

    pub(super) fn fixup_compare(&mut self, cur: Cursor) {
        let left = self.prediction(cur.slot(0));
        let right = self.prediction(cur.slot(1));

        if left.is_int32() && right.is_int32() {
            self.set_both_use_kinds(cur, UseKind::Int32);
            return;
        }
        if left.is_number() && right.is_number() {
            self.fix_both_double_edges(cur, UseKind::Number);
            return;
        }
        // Relational compares stay generic for everything else
        if self.graph[cur.node].op() != NodeType::CompareEq {
            return;
        }
        if left.is_boolean() && right.is_boolean() {
            self.set_both_use_kinds(cur, UseKind::Boolean);
        } else if left.is_string_ident() && right.is_string_ident() {
            self.set_both_use_kinds(cur, UseKind::StringIdent);
        } else if left.is_string()
            && right.is_string()
            && self.config.can_specialize_string_equality()
        {
            self.set_both_use_kinds(cur, UseKind::String);
        } else if left.is_object() && right.is_object() {
            self.set_both_use_kinds(cur, UseKind::Object);
        } else if left.is_object() && right.is_object_or_other() {
            self.set_use_kind_and_unbox(cur.slot(0), UseKind::Object);
            self.set_use_kind_and_unbox(cur.slot(1), UseKind::ObjectOrOther);
        } else if left.is_object_or_other() && right.is_object() {
            self.set_use_kind_and_unbox(cur.slot(0), UseKind::ObjectOrOther);
            self.set_use_kind_and_unbox(cur.slot(1), UseKind::Object);
        }
    }

    pub(super) fn fixup_compare_strict_eq(&mut self, cur: Cursor) {
        let left = self.prediction(cur.slot(0));
        let right = self.prediction(cur.slot(1));

        if left.is_boolean() && right.is_boolean() {
            self.set_both_use_kinds(cur, UseKind::Boolean);
        } else if left.is_int32() && right.is_int32() {
            self.set_both_use_kinds(cur, UseKind::Int32);
        } else if left.is_number() && right.is_number() {
            self.fix_both_double_edges(cur, UseKind::Number);
        } else if left.is_string_ident() && right.is_string_ident() {
            self.set_both_use_kinds(cur, UseKind::StringIdent);
        } else if left.is_string()
            && right.is_string()
            && self.config.can_specialize_string_equality()
        {
            self.set_both_use_kinds(cur, UseKind::String);
        } else if left.is_object() && right.is_object() {
            self.set_both_use_kinds(cur, UseKind::Object);
        }
    }

    /// An int32 flowing into a double-consuming `Phantom`/`Identity` only
    /// needs an int32 check
    pub(super) fn fixup_phantom_or_identity(&mut self, cur: Cursor) {
        let slot = cur.slot(0);
        let Some(edge) = self.graph.edge(slot) else {
            return;
        };
        if edge.use_kind == UseKind::Number && self.prediction(slot).is_int32_for_arithmetic() {
            self.graph.set_use_kind(slot, UseKind::Int32);
        }
        self.observe_use_kind_on_edge(slot);
    }

    // ---- Integer add ----

    fn attempt_to_make_integer_add(&mut self, cur: Cursor) -> bool {
        let mode = self.add_speculation_mode(cur.node);
        if mode == AddSpeculationMode::DontSpeculateInteger {
            return false;
        }
        if mode == AddSpeculationMode::SpeculateIntegerAndTruncateConstants {
            let constant_slot = if self.graph[self.graph.child_node(cur.node, 0)].has_constant() {
                cur.slot(0)
            } else {
                cur.slot(1)
            };
            self.truncate_constant_to_int32(cur, constant_slot);
        }
        self.set_both_use_kinds(cur, UseKind::Int32);
        true
    }

    pub(super) fn add_speculation_mode(&self, add: NodeId) -> AddSpeculationMode {
        let left = self.graph.child_node(add, 0);
        let right = self.graph.child_node(add, 1);
        let left_is_int = self.graph[left].prediction().is_int32_expecting_defined();
        let right_is_int = self.graph[right].prediction().is_int32_expecting_defined();

        if self.graph[left].has_constant() {
            return self.add_immediate_speculation_mode(add, right_is_int, left);
        }
        if self.graph[right].has_constant() {
            return self.add_immediate_speculation_mode(add, left_is_int, right);
        }
        if left_is_int && right_is_int && self.graph[add].can_speculate_integer() {
            AddSpeculationMode::SpeculateInteger
        } else {
            AddSpeculationMode::DontSpeculateInteger
        }
    }

    /// Mode for an add whose `immediate` operand is a constant
    fn add_immediate_speculation_mode(
        &self,
        add: NodeId,
        variable_is_int: bool,
        immediate: NodeId,
    ) -> AddSpeculationMode {
        let Some(value) = self.graph[immediate].constant() else {
            return AddSpeculationMode::DontSpeculateInteger;
        };
        let Some(number) = value.as_number() else {
            return AddSpeculationMode::DontSpeculateInteger;
        };
        if !variable_is_int {
            return AddSpeculationMode::DontSpeculateInteger;
        }

        let node = &self.graph[add];
        if value.as_int32().is_some() {
            return if node.can_speculate_integer() {
                AddSpeculationMode::SpeculateInteger
            } else {
                AddSpeculationMode::DontSpeculateInteger
            };
        }
        if number > MAX_TRUNCATABLE_CONSTANT || number < -MAX_TRUNCATABLE_CONSTANT {
            return AddSpeculationMode::DontSpeculateInteger;
        }
        if node.can_truncate_integer() {
            AddSpeculationMode::SpeculateIntegerAndTruncateConstants
        } else {
            AddSpeculationMode::DontSpeculateInteger
        }
    }

    /// Point `slot` at a fresh int32 constant holding the truncation of its
    /// current constant
    fn truncate_constant_to_int32(&mut self, cur: Cursor, slot: EdgeRef) {
        let edge = self.edge_at(slot);
        let Some(value) = self.graph[edge.node].constant() else {
            return;
        };
        if matches!(value, JsConstant::Int32(_)) {
            return;
        }
        let Some(number) = value.as_number() else {
            return;
        };

        let truncated = to_int32(number);
        let constant = self.insert(
            cur,
            Node::new(NodeType::JSConstant, self.origin(cur.node))
                .with_prediction(SpeculatedType::INT32)
                .with_info(OpInfo::Constant(JsConstant::Int32(truncated))),
        );
        self.graph
            .set_edge(slot, Some(Edge::new(constant, edge.use_kind)));
        trace!(%number, %truncated, "truncated add constant");
    }

    // ---- Operand pairs ----

    fn should_speculate_integer_for_arithmetic(&self, cur: Cursor) -> bool {
        self.prediction(cur.slot(0)).is_int32_for_arithmetic()
            && self.prediction(cur.slot(1)).is_int32_for_arithmetic()
            && self.graph[cur.node].can_speculate_integer()
    }

    fn both_number_expecting_defined(&self, cur: Cursor) -> bool {
        self.prediction(cur.slot(0)).is_number_expecting_defined()
            && self.prediction(cur.slot(1)).is_number_expecting_defined()
    }

    pub(super) fn set_both_use_kinds(&mut self, cur: Cursor, use_kind: UseKind) {
        self.set_use_kind_and_unbox(cur.slot(0), use_kind);
        self.set_use_kind_and_unbox(cur.slot(1), use_kind);
    }

    fn fix_both_double_edges(&mut self, cur: Cursor, use_kind: UseKind) {
        for index in 0..2 {
            self.fix_double_edge(cur, cur.slot(index), use_kind, SpeculationDirection::Backward);
        }
    }
}
